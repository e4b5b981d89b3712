//! Cart commands.
//!
//! Each invocation loads the cart from `ROCKETSHOES_CART_PATH`, runs one
//! operation against the catalog at `ROCKETSHOES_API_URL` and exits.

use rocketshoes_cart::{
    Cart, CartConfig, CartError, CartManager, FileStorage, HttpCatalogClient, Operation,
    TracingNotifier, UpdateProductAmount,
};
use rocketshoes_core::{CurrencyCode, Price, ProductId};
use tracing::info;

use super::CommandError;

type CliCartManager = CartManager<HttpCatalogClient, FileStorage, TracingNotifier>;

fn open(config: &CartConfig) -> Result<CliCartManager, CommandError> {
    let api = HttpCatalogClient::new(config)?;
    let storage = FileStorage::new(&config.cart_path);
    Ok(CartManager::load(
        api,
        storage,
        TracingNotifier,
        config.storage_key.clone(),
    ))
}

fn rejected(operation: Operation) -> impl FnOnce(CartError) -> CommandError {
    move |source| CommandError::Rejected {
        notice: source.notice(operation),
        source,
    }
}

/// Print the stored cart.
///
/// # Errors
///
/// Returns an error if the catalog client cannot be built.
pub fn show(config: &CartConfig) -> Result<(), CommandError> {
    let manager = open(config)?;
    print_cart(manager.cart());
    Ok(())
}

/// Add one unit of a product.
///
/// # Errors
///
/// Returns `Rejected` carrying the shopper notice if the cart refused.
pub async fn add(config: &CartConfig, product_id: ProductId) -> Result<(), CommandError> {
    let mut manager = open(config)?;
    let cart = manager
        .try_add_product(product_id)
        .await
        .map_err(rejected(Operation::Add))?;
    print_cart(&cart);
    Ok(())
}

/// Remove a product.
///
/// # Errors
///
/// Returns `Rejected` carrying the shopper notice if the cart refused.
pub fn remove(config: &CartConfig, product_id: ProductId) -> Result<(), CommandError> {
    let mut manager = open(config)?;
    let cart = manager
        .try_remove_product(product_id)
        .map_err(rejected(Operation::Remove))?;
    print_cart(&cart);
    Ok(())
}

/// Set a product's quantity.
///
/// # Errors
///
/// Returns `Rejected` carrying the shopper notice if the cart refused.
pub async fn update(
    config: &CartConfig,
    product_id: ProductId,
    amount: i64,
) -> Result<(), CommandError> {
    let mut manager = open(config)?;
    let cart = manager
        .try_update_product_amount(UpdateProductAmount { product_id, amount })
        .await
        .map_err(rejected(Operation::Update))?;
    print_cart(&cart);
    Ok(())
}

fn print_cart(cart: &Cart) {
    for line in render(cart, CurrencyCode::BRL) {
        info!("{line}");
    }
}

/// One line per entry, then a summary line.
fn render(cart: &Cart, currency_code: CurrencyCode) -> Vec<String> {
    let mut lines: Vec<String> = cart
        .iter()
        .map(|entry| {
            format!(
                "#{:<4} {:<40} {:>3} x {:>12} = {:>12}",
                entry.product_id().as_i32(),
                entry.product.title,
                entry.amount,
                Price::new(entry.product.price, currency_code).display(),
                Price::new(entry.subtotal(), currency_code).display(),
            )
        })
        .collect();

    let noun = if cart.len() == 1 { "item" } else { "itens" };
    lines.push(format!(
        "{} {noun}, total {}",
        cart.len(),
        cart.total(currency_code).display()
    ));
    lines
}
