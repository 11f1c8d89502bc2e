// storefront/src/services/cart_service.rs

//! Cart operations. Stock checks here are advisory: the authoritative check
//! happens under row locks during checkout.

use crate::errors::{AppError, Result};
use crate::models::{CartItem, CartLineView, CartView, Product};
use crate::store::Store;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

fn require_positive_quantity(quantity: i32) -> Result<()> {
  if quantity < 1 {
    return Err(AppError::Validation("Quantity must be at least 1.".to_string()));
  }
  Ok(())
}

async fn existing_product(store: &dyn Store, product_id: Uuid) -> Result<Product> {
  store
    .product_by_id(product_id)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Product {} not found.", product_id)))
}

fn check_stock(product: &Product, requested: i32) -> Result<()> {
  if requested > product.stock {
    warn!(product_id = %product.id, requested, available = product.stock, "Not enough stock for cart line.");
    return Err(AppError::InsufficientStock {
      product_id: product.id,
      requested,
      available: product.stock,
    });
  }
  Ok(())
}

/// Adds `quantity` units of a product, creating the cart on first use.
/// A new line captures the current product price. The increment itself is
/// atomic in the store, so concurrent adds to the same line all count.
#[instrument(name = "cart::add_to_cart", skip(store), err(Display))]
pub async fn add_to_cart(store: &dyn Store, user_id: Uuid, product_id: Uuid, quantity: i32) -> Result<CartItem> {
  require_positive_quantity(quantity)?;
  let product = existing_product(store, product_id).await?;
  check_stock(&product, quantity)?;
  let cart = store.get_or_create_cart(user_id).await?;

  let item = store
    .add_cart_item(cart.id, product_id, quantity, product.price_cents, product.stock)
    .await
    .inspect_err(|e| {
      if let AppError::InsufficientStock { requested, available, .. } = e {
        warn!(%product_id, requested, available, "Not enough stock for cart line.");
      }
    })?;
  info!(cart_id = %cart.id, %product_id, quantity = item.quantity, "Cart line saved.");
  Ok(item)
}

/// The user's cart with unit prices refreshed from the catalog. Lines whose
/// price changed are rewritten so checkout charges the current price. The
/// rewrite only touches lines that still exist; a line cleared meanwhile
/// (by a checkout, say) is left out of the view.
#[instrument(name = "cart::view_cart", skip(store), err(Display))]
pub async fn view_cart(store: &dyn Store, user_id: Uuid) -> Result<CartView> {
  let Some(cart) = store.cart_for_user(user_id).await? else {
    return Ok(CartView::default());
  };

  let mut view = CartView {
    cart_id: Some(cart.id),
    ..CartView::default()
  };
  for item in store.cart_items(cart.id).await? {
    let Some(product) = store.product_by_id(item.product_id).await? else {
      debug!(product_id = %item.product_id, "Skipping line for a product that no longer exists.");
      continue;
    };
    if product.price_cents != item.unit_price_cents
      && !store
        .refresh_cart_item_price(cart.id, item.product_id, product.price_cents)
        .await?
    {
      debug!(product_id = %item.product_id, "Line left the cart before its price was refreshed.");
      continue;
    }
    let line_total_cents = product
      .price_cents
      .checked_mul(i64::from(item.quantity))
      .ok_or_else(|| AppError::Invariant("Cart line total overflows.".to_string()))?;
    view.total_cents = view
      .total_cents
      .checked_add(line_total_cents)
      .ok_or_else(|| AppError::Invariant("Cart total overflows.".to_string()))?;
    view.items.push(CartLineView {
      product_id: item.product_id,
      product_name: product.name,
      quantity: item.quantity,
      unit_price_cents: product.price_cents,
      line_total_cents,
    });
  }
  Ok(view)
}

#[instrument(name = "cart::update_item_quantity", skip(store), err(Display))]
pub async fn update_item_quantity(
  store: &dyn Store,
  user_id: Uuid,
  product_id: Uuid,
  quantity: i32,
) -> Result<CartItem> {
  require_positive_quantity(quantity)?;
  let missing = || AppError::NotFound(format!("Product {} is not in the cart.", product_id));

  let cart = store.cart_for_user(user_id).await?.ok_or_else(missing)?;
  let product = existing_product(store, product_id).await?;
  check_stock(&product, quantity)?;

  let item = store
    .set_cart_item_quantity(cart.id, product_id, quantity)
    .await?
    .ok_or_else(missing)?;
  info!(cart_id = %cart.id, %product_id, quantity, "Cart line quantity changed.");
  Ok(item)
}

#[instrument(name = "cart::remove_item", skip(store), err(Display))]
pub async fn remove_item(store: &dyn Store, user_id: Uuid, product_id: Uuid) -> Result<()> {
  let missing = || AppError::NotFound(format!("Product {} is not in the cart.", product_id));
  let cart = store.cart_for_user(user_id).await?.ok_or_else(missing)?;
  if !store.remove_cart_item(cart.id, product_id).await? {
    return Err(missing());
  }
  info!(cart_id = %cart.id, %product_id, "Cart line removed.");
  Ok(())
}
