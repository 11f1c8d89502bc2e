// storefront/src/models/cart.rs

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Cart {
  pub id: Uuid,
  pub user_id: Uuid,
  pub created_at: DateTime<Utc>,
}

/// One line of a cart. At most one per (cart, product).
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct CartItem {
  pub id: Uuid,
  pub cart_id: Uuid,
  pub product_id: Uuid,
  pub quantity: i32,
  /// Product price captured when the line was added, refreshed on view.
  pub unit_price_cents: i64,
  pub added_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CartLineView {
  pub product_id: Uuid,
  pub product_name: String,
  pub quantity: i32,
  pub unit_price_cents: i64,
  pub line_total_cents: i64,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct CartView {
  pub cart_id: Option<Uuid>,
  pub items: Vec<CartLineView>,
  pub total_cents: i64,
}
