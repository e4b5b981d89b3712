//! RocketShoes CLI - Cart operations and a stand-in catalog API.
//!
//! # Usage
//!
//! ```bash
//! # Serve the catalog fixture on port 3333
//! rs-cart serve --db crates/cli/fixtures/server.json
//!
//! # Add a product, bump its quantity, look at the cart
//! rs-cart add 1
//! rs-cart update 1 3
//! rs-cart show
//!
//! # Remove it again
//! rs-cart remove 1
//! ```
//!
//! # Commands
//!
//! - `show` - Print the stored cart
//! - `add` / `remove` / `update` - Run one cart operation against the catalog
//! - `serve` - Serve `/stock/{id}` and `/products/{id}` from a JSON file

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::net::IpAddr;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use rocketshoes_cart::CartConfig;
use rocketshoes_core::ProductId;
use sentry::integrations::tracing as sentry_tracing;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

#[derive(Debug, Parser)]
#[command(name = "rs-cart")]
#[command(author, version, about = "RocketShoes cart tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print the stored cart
    Show,
    /// Add one unit of a product
    Add {
        /// Product ID
        product_id: ProductId,
    },
    /// Remove a product from the cart
    Remove {
        /// Product ID
        product_id: ProductId,
    },
    /// Set a product's quantity
    Update {
        /// Product ID
        product_id: ProductId,
        /// New quantity (zero or negative is ignored)
        #[arg(allow_hyphen_values = true)]
        amount: i64,
    },
    /// Serve a stand-in catalog API from a JSON file
    Serve {
        /// JSON file with `products` and `stock` arrays
        #[arg(short, long, default_value = "crates/cli/fixtures/server.json")]
        db: PathBuf,

        /// Bind address
        #[arg(long, default_value = "127.0.0.1")]
        host: IpAddr,

        /// Listen port
        #[arg(short, long, default_value_t = 3333)]
        port: u16,
    },
}

/// Initialize Sentry error tracking and return guard that must be kept alive.
fn init_sentry(config: &CartConfig) -> Option<sentry::ClientInitGuard> {
    let dsn = config.sentry_dsn.as_ref()?;

    let guard = sentry::init((
        dsn.as_str(),
        sentry::ClientOptions {
            release: sentry::release_name!(),
            attach_stacktrace: true,
            ..Default::default()
        },
    ));

    tracing::info!("Sentry initialized");
    Some(guard)
}

/// Filter tracing events to Sentry event types.
fn sentry_event_filter(metadata: &tracing::Metadata<'_>) -> sentry_tracing::EventFilter {
    match *metadata.level() {
        tracing::Level::ERROR | tracing::Level::WARN => sentry_tracing::EventFilter::Event,
        tracing::Level::INFO | tracing::Level::DEBUG => sentry_tracing::EventFilter::Breadcrumb,
        _ => sentry_tracing::EventFilter::Ignore,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Load configuration from environment (needed for Sentry init)
    let config = match CartConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            // Tracing is not set up yet
            #[allow(clippy::print_stderr)]
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    // Initialize Sentry (must be done before tracing subscriber)
    let _sentry_guard = init_sentry(&config);

    // Defaults to info level for our crates if RUST_LOG is not set
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "rocketshoes_cart=info,rs_cart=info".into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer().event_filter(sentry_event_filter))
        .init();

    if let Err(e) = run(cli, &config).await {
        match &e {
            commands::CommandError::Rejected { source, .. } => {
                tracing::error!(error = %source, "Command failed: {e}");
            }
            _ => tracing::error!("Command failed: {e}"),
        }
        std::process::exit(1);
    }
}

async fn run(cli: Cli, config: &CartConfig) -> Result<(), commands::CommandError> {
    match cli.command {
        Commands::Show => commands::cart::show(config)?,
        Commands::Add { product_id } => commands::cart::add(config, product_id).await?,
        Commands::Remove { product_id } => commands::cart::remove(config, product_id)?,
        Commands::Update { product_id, amount } => {
            commands::cart::update(config, product_id, amount).await?;
        }
        Commands::Serve { db, host, port } => commands::serve::run(&db, host, port).await?,
    }
    Ok(())
}
