//! CLI subcommands.

use rocketshoes_cart::{ApiError, CartError, Notice};
use thiserror::Error;

pub mod cart;
pub mod serve;

/// Errors surfaced by CLI commands.
#[derive(Debug, Error)]
pub enum CommandError {
    /// A cart operation was refused or failed; shown as the shopper notice.
    #[error("{notice}")]
    Rejected {
        notice: Notice,
        #[source]
        source: CartError,
    },

    /// Catalog client could not be built.
    #[error("Catalog client error: {0}")]
    Api(#[from] ApiError),

    /// Catalog fixture could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Catalog fixture is not valid JSON.
    #[error("Invalid catalog file: {0}")]
    Json(#[from] serde_json::Error),
}
