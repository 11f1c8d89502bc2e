// storefront/src/store/mod.rs

//! Storage seam of the service.
//!
//! [`Store`] covers plain reads and single-statement writes. Work that must
//! be atomic (checkout, order status changes) goes through a [`StoreTx`]
//! obtained from [`Store::begin`]: row locks taken through it are held until
//! the transaction commits, rolls back, or is dropped, and dropping an
//! unfinished transaction discards everything it wrote.
//!
//! Lock order inside a transaction is cart row first, then product rows in
//! ascending id order. Callers that follow it cannot deadlock each other.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::errors::{AppError, Result};
use crate::models::{
  Cart, CartItem, NewOrderItem, NewProduct, NewUser, Order, OrderItem, OrderStatus, Product, ProductFilter,
  ProductPatch, Review, ReviewWithAuthor, User,
};

pub use memory::{FaultPoint, MemoryStore};
pub use postgres::PgStore;

/// Stock of one product as seen by the transaction holding its row lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockLease {
  pub product_id: Uuid,
  pub available: i32,
}

/// Review fields written on insert or update.
#[derive(Debug, Clone)]
pub struct ReviewDraft {
  pub title: String,
  pub description: String,
  pub rating: i32,
}

/// `requested` is widened so a sum past `i32::MAX` still reports as a shortfall.
fn insufficient_stock(product_id: Uuid, requested: i64, available: i32) -> AppError {
  AppError::InsufficientStock {
    product_id,
    requested: i32::try_from(requested).unwrap_or(i32::MAX),
    available,
  }
}

#[async_trait]
pub trait Store: Send + Sync {
  // --- users & tokens ---
  /// Fails with `Conflict` when the email is taken.
  async fn insert_user(&self, new_user: NewUser) -> Result<User>;
  async fn user_by_email(&self, email: &str) -> Result<Option<User>>;
  async fn user_by_id(&self, user_id: Uuid) -> Result<Option<User>>;
  async fn revoke_token(&self, token_id: Uuid, expires_at: DateTime<Utc>) -> Result<()>;
  async fn is_token_revoked(&self, token_id: Uuid) -> Result<bool>;

  // --- catalog ---
  /// Inserts all products or none. Fails with `Conflict` on a duplicate name.
  async fn insert_products(&self, products: Vec<NewProduct>) -> Result<Vec<Product>>;
  async fn product_by_id(&self, product_id: Uuid) -> Result<Option<Product>>;
  /// One page of the filtered catalog, newest first, plus the filtered count.
  async fn list_products(&self, filter: &ProductFilter, limit: i64, offset: i64) -> Result<(Vec<Product>, i64)>;
  async fn update_product(&self, product_id: Uuid, patch: &ProductPatch) -> Result<Option<Product>>;
  async fn delete_product(&self, product_id: Uuid) -> Result<bool>;

  // --- carts ---
  async fn cart_for_user(&self, user_id: Uuid) -> Result<Option<Cart>>;
  async fn get_or_create_cart(&self, user_id: Uuid) -> Result<Cart>;
  async fn cart_items(&self, cart_id: Uuid) -> Result<Vec<CartItem>>;
  /// Adds `quantity` units to the line for `product_id` in one atomic step,
  /// creating the line at `unit_price_cents` if it does not exist. Fails
  /// with `InsufficientStock` when the line would exceed `available`.
  async fn add_cart_item(
    &self,
    cart_id: Uuid,
    product_id: Uuid,
    quantity: i32,
    unit_price_cents: i64,
    available: i32,
  ) -> Result<CartItem>;
  /// Sets the quantity of an existing line. Never creates one: `None` when
  /// the line is gone, e.g. removed or cleared by a checkout.
  async fn set_cart_item_quantity(&self, cart_id: Uuid, product_id: Uuid, quantity: i32) -> Result<Option<CartItem>>;
  /// Rewrites the unit price of an existing line. Never creates one.
  async fn refresh_cart_item_price(&self, cart_id: Uuid, product_id: Uuid, unit_price_cents: i64) -> Result<bool>;
  async fn remove_cart_item(&self, cart_id: Uuid, product_id: Uuid) -> Result<bool>;

  // --- orders ---
  async fn order_by_id(&self, order_id: Uuid) -> Result<Option<Order>>;
  /// Newest first.
  async fn orders_for_user(&self, user_id: Uuid) -> Result<Vec<Order>>;
  async fn order_items(&self, order_id: Uuid) -> Result<Vec<OrderItem>>;

  // --- reviews ---
  async fn review_by_id(&self, review_id: Uuid) -> Result<Option<Review>>;
  async fn review_by_user_for_product(&self, user_id: Uuid, product_id: Uuid) -> Result<Option<Review>>;
  async fn insert_review(&self, user_id: Uuid, product_id: Uuid, draft: ReviewDraft) -> Result<Review>;
  async fn update_review(&self, review_id: Uuid, draft: ReviewDraft) -> Result<Option<Review>>;
  async fn delete_review(&self, review_id: Uuid) -> Result<bool>;
  async fn reviews_for_product(&self, product_id: Uuid) -> Result<Vec<ReviewWithAuthor>>;
  /// Recomputes and stores the product's mean rating and review count from
  /// its stored reviews, returning them.
  async fn refresh_rating(&self, product_id: Uuid) -> Result<(f64, i64)>;

  async fn begin(&self) -> Result<Box<dyn StoreTx>>;
}

/// A unit of work with all-or-nothing effect.
#[async_trait]
pub trait StoreTx: Send {
  /// Locks the user's cart row and returns it with its items.
  async fn load_cart(&mut self, user_id: Uuid) -> Result<Option<(Cart, Vec<CartItem>)>>;
  /// Locks the product row for the rest of the transaction. Locking an
  /// already locked product again returns the transaction's current view.
  async fn lock_stock(&mut self, product_id: Uuid) -> Result<StockLease>;
  /// Requires a prior `lock_stock` of the same product.
  async fn set_stock(&mut self, product_id: Uuid, stock: i32) -> Result<()>;
  async fn insert_order(&mut self, user_id: Uuid) -> Result<Order>;
  async fn insert_order_items(&mut self, order_id: Uuid, items: &[NewOrderItem]) -> Result<Vec<OrderItem>>;
  async fn set_order_total(&mut self, order_id: Uuid, total_cents: i64) -> Result<Order>;
  async fn clear_cart(&mut self, cart_id: Uuid) -> Result<u64>;
  async fn lock_order(&mut self, order_id: Uuid) -> Result<Option<Order>>;
  async fn set_order_status(&mut self, order_id: Uuid, status: OrderStatus) -> Result<Order>;
  async fn commit(self: Box<Self>) -> Result<()>;
  async fn rollback(self: Box<Self>) -> Result<()>;
}
