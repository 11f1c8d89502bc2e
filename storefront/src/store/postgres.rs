// storefront/src/store/postgres.rs

//! PostgreSQL backend. Runtime-checked queries with `FromRow` mapping.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder, Transaction};
use tracing::{event, instrument, Level};
use uuid::Uuid;

use super::{insufficient_stock, ReviewDraft, StockLease, Store, StoreTx};
use crate::errors::{AppError, Result};
use crate::models::{
  Cart, CartItem, NewOrderItem, NewProduct, NewUser, Order, OrderItem, OrderStatus, Product, ProductFilter,
  ProductPatch, Review, ReviewWithAuthor, User,
};

pub const SCHEMA_SQL: &str = include_str!("../../schema.sql");

const USER_COLUMNS: &str = "id, name, email, password_hash, role, created_at, updated_at";
const PRODUCT_COLUMNS: &str =
  "id, name, description, category, data, price_cents, stock, rating, review_count, created_at, updated_at";
const CART_ITEM_COLUMNS: &str = "id, cart_id, product_id, quantity, unit_price_cents, added_at, updated_at";
const ORDER_COLUMNS: &str = "id, user_id, status, total_cents, created_at, updated_at";
const ORDER_ITEM_COLUMNS: &str = "id, order_id, product_id, quantity, unit_price_cents";
const REVIEW_COLUMNS: &str = "id, product_id, user_id, title, description, rating, created_at, updated_at";

#[derive(Clone)]
pub struct PgStore {
  pool: PgPool,
}

impl PgStore {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }

  #[instrument(name = "PgStore::connect", skip(database_url), err(Display))]
  pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
    let pool = PgPoolOptions::new()
      .max_connections(max_connections)
      .connect(database_url)
      .await?;
    event!(Level::INFO, max_connections, "Connected to PostgreSQL.");
    Ok(Self::new(pool))
  }

  #[instrument(name = "PgStore::apply_schema", skip(self), err(Display))]
  pub async fn apply_schema(&self) -> Result<()> {
    sqlx::raw_sql(SCHEMA_SQL).execute(&self.pool).await?;
    event!(Level::INFO, "Schema applied.");
    Ok(())
  }
}

/// Maps unique-key violations to `Conflict`; everything else stays a storage error.
fn conflict_on_unique(err: sqlx::Error, what: &str) -> AppError {
  match &err {
    sqlx::Error::Database(db_err) if db_err.is_unique_violation() => AppError::Conflict(format!("{} already exists", what)),
    _ => AppError::Sqlx(err),
  }
}

#[async_trait]
impl Store for PgStore {
  async fn insert_user(&self, new_user: NewUser) -> Result<User> {
    sqlx::query_as::<_, User>(&format!(
      "INSERT INTO users (id, name, email, password_hash, role) VALUES ($1, $2, $3, $4, $5) RETURNING {USER_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(&new_user.name)
    .bind(&new_user.email)
    .bind(&new_user.password_hash)
    .bind(new_user.role)
    .fetch_one(&self.pool)
    .await
    .map_err(|e| conflict_on_unique(e, "An account with this email"))
  }

  async fn user_by_email(&self, email: &str) -> Result<Option<User>> {
    Ok(
      sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?,
    )
  }

  async fn user_by_id(&self, user_id: Uuid) -> Result<Option<User>> {
    Ok(
      sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?,
    )
  }

  async fn revoke_token(&self, token_id: Uuid, expires_at: DateTime<Utc>) -> Result<()> {
    sqlx::query("INSERT INTO revoked_tokens (token_id, expires_at) VALUES ($1, $2) ON CONFLICT (token_id) DO NOTHING")
      .bind(token_id)
      .bind(expires_at)
      .execute(&self.pool)
      .await?;
    // Expired entries can never match a valid token again.
    sqlx::query("DELETE FROM revoked_tokens WHERE expires_at < now()")
      .execute(&self.pool)
      .await?;
    Ok(())
  }

  async fn is_token_revoked(&self, token_id: Uuid) -> Result<bool> {
    Ok(
      sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM revoked_tokens WHERE token_id = $1)")
        .bind(token_id)
        .fetch_one(&self.pool)
        .await?,
    )
  }

  async fn insert_products(&self, products: Vec<NewProduct>) -> Result<Vec<Product>> {
    let mut tx = self.pool.begin().await?;
    let mut created = Vec::with_capacity(products.len());
    for product in products {
      let row = sqlx::query_as::<_, Product>(&format!(
        "INSERT INTO products (id, name, description, category, data, price_cents, stock) \
         VALUES ($1, $2, $3, $4, $5, $6, $7) RETURNING {PRODUCT_COLUMNS}"
      ))
      .bind(Uuid::new_v4())
      .bind(&product.name)
      .bind(&product.description)
      .bind(&product.category)
      .bind(&product.data)
      .bind(product.price_cents)
      .bind(product.stock)
      .fetch_one(&mut *tx)
      .await
      .map_err(|e| conflict_on_unique(e, &format!("Product '{}'", product.name)))?;
      created.push(row);
    }
    tx.commit().await?;
    Ok(created)
  }

  async fn product_by_id(&self, product_id: Uuid) -> Result<Option<Product>> {
    Ok(
      sqlx::query_as::<_, Product>(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"))
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?,
    )
  }

  async fn list_products(&self, filter: &ProductFilter, limit: i64, offset: i64) -> Result<(Vec<Product>, i64)> {
    fn push_filter<'a>(qb: &mut QueryBuilder<'a, Postgres>, filter: &'a ProductFilter) {
      qb.push(" WHERE TRUE");
      if let Some(min) = filter.min_price_cents {
        qb.push(" AND price_cents >= ").push_bind(min);
      }
      if let Some(max) = filter.max_price_cents {
        qb.push(" AND price_cents <= ").push_bind(max);
      }
      if let Some(category) = filter.category.as_deref() {
        qb.push(" AND LOWER(category) = LOWER(").push_bind(category).push(")");
      }
    }

    let mut count_qb = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM products");
    push_filter(&mut count_qb, filter);
    let total: i64 = count_qb.build_query_scalar::<i64>().fetch_one(&self.pool).await?;

    let mut page_qb = QueryBuilder::<Postgres>::new(format!("SELECT {PRODUCT_COLUMNS} FROM products"));
    push_filter(&mut page_qb, filter);
    page_qb
      .push(" ORDER BY created_at DESC, id DESC LIMIT ")
      .push_bind(limit)
      .push(" OFFSET ")
      .push_bind(offset);
    let products = page_qb.build_query_as::<Product>().fetch_all(&self.pool).await?;
    Ok((products, total))
  }

  async fn update_product(&self, product_id: Uuid, patch: &ProductPatch) -> Result<Option<Product>> {
    sqlx::query_as::<_, Product>(&format!(
      "UPDATE products SET \
         name = COALESCE($2, name), \
         description = COALESCE($3, description), \
         category = COALESCE($4, category), \
         data = COALESCE($5, data), \
         price_cents = COALESCE($6, price_cents), \
         stock = COALESCE($7, stock), \
         updated_at = now() \
       WHERE id = $1 RETURNING {PRODUCT_COLUMNS}"
    ))
    .bind(product_id)
    .bind(&patch.name)
    .bind(&patch.description)
    .bind(&patch.category)
    .bind(&patch.data)
    .bind(patch.price_cents)
    .bind(patch.stock)
    .fetch_optional(&self.pool)
    .await
    .map_err(|e| conflict_on_unique(e, "A product with this name"))
  }

  async fn delete_product(&self, product_id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM products WHERE id = $1")
      .bind(product_id)
      .execute(&self.pool)
      .await?;
    Ok(result.rows_affected() > 0)
  }

  async fn cart_for_user(&self, user_id: Uuid) -> Result<Option<Cart>> {
    Ok(
      sqlx::query_as::<_, Cart>("SELECT id, user_id, created_at FROM carts WHERE user_id = $1")
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?,
    )
  }

  async fn get_or_create_cart(&self, user_id: Uuid) -> Result<Cart> {
    // The no-op update makes RETURNING yield the existing row on conflict.
    Ok(
      sqlx::query_as::<_, Cart>(
        "INSERT INTO carts (id, user_id) VALUES ($1, $2) \
         ON CONFLICT (user_id) DO UPDATE SET user_id = EXCLUDED.user_id \
         RETURNING id, user_id, created_at",
      )
      .bind(Uuid::new_v4())
      .bind(user_id)
      .fetch_one(&self.pool)
      .await?,
    )
  }

  async fn cart_items(&self, cart_id: Uuid) -> Result<Vec<CartItem>> {
    Ok(
      sqlx::query_as::<_, CartItem>(&format!(
        "SELECT {CART_ITEM_COLUMNS} FROM cart_items WHERE cart_id = $1 ORDER BY added_at, id"
      ))
      .bind(cart_id)
      .fetch_all(&self.pool)
      .await?,
    )
  }

  async fn add_cart_item(
    &self,
    cart_id: Uuid,
    product_id: Uuid,
    quantity: i32,
    unit_price_cents: i64,
    available: i32,
  ) -> Result<CartItem> {
    if quantity > available {
      return Err(insufficient_stock(product_id, i64::from(quantity), available));
    }
    // The increment happens in the conflict arm, so concurrent adds never
    // overwrite each other. The guard keeps the sum within stock.
    let item = sqlx::query_as::<_, CartItem>(&format!(
      "INSERT INTO cart_items (id, cart_id, product_id, quantity, unit_price_cents) VALUES ($1, $2, $3, $4, $5) \
       ON CONFLICT (cart_id, product_id) DO UPDATE \
         SET quantity = cart_items.quantity + EXCLUDED.quantity, updated_at = now() \
         WHERE cart_items.quantity::BIGINT + EXCLUDED.quantity <= $6 \
       RETURNING {CART_ITEM_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(cart_id)
    .bind(product_id)
    .bind(quantity)
    .bind(unit_price_cents)
    .bind(i64::from(available))
    .fetch_optional(&self.pool)
    .await?;
    if let Some(item) = item {
      return Ok(item);
    }

    let current: i32 = sqlx::query_scalar("SELECT quantity FROM cart_items WHERE cart_id = $1 AND product_id = $2")
      .bind(cart_id)
      .bind(product_id)
      .fetch_optional(&self.pool)
      .await?
      .unwrap_or(0);
    Err(insufficient_stock(
      product_id,
      i64::from(current) + i64::from(quantity),
      available,
    ))
  }

  async fn set_cart_item_quantity(&self, cart_id: Uuid, product_id: Uuid, quantity: i32) -> Result<Option<CartItem>> {
    Ok(
      sqlx::query_as::<_, CartItem>(&format!(
        "UPDATE cart_items SET quantity = $3, updated_at = now() \
         WHERE cart_id = $1 AND product_id = $2 RETURNING {CART_ITEM_COLUMNS}"
      ))
      .bind(cart_id)
      .bind(product_id)
      .bind(quantity)
      .fetch_optional(&self.pool)
      .await?,
    )
  }

  async fn refresh_cart_item_price(&self, cart_id: Uuid, product_id: Uuid, unit_price_cents: i64) -> Result<bool> {
    let result = sqlx::query(
      "UPDATE cart_items SET unit_price_cents = $3, updated_at = now() WHERE cart_id = $1 AND product_id = $2",
    )
    .bind(cart_id)
    .bind(product_id)
    .bind(unit_price_cents)
    .execute(&self.pool)
    .await?;
    Ok(result.rows_affected() > 0)
  }

  async fn remove_cart_item(&self, cart_id: Uuid, product_id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM cart_items WHERE cart_id = $1 AND product_id = $2")
      .bind(cart_id)
      .bind(product_id)
      .execute(&self.pool)
      .await?;
    Ok(result.rows_affected() > 0)
  }

  async fn order_by_id(&self, order_id: Uuid) -> Result<Option<Order>> {
    Ok(
      sqlx::query_as::<_, Order>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?,
    )
  }

  async fn orders_for_user(&self, user_id: Uuid) -> Result<Vec<Order>> {
    Ok(
      sqlx::query_as::<_, Order>(&format!(
        "SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 ORDER BY created_at DESC, id DESC"
      ))
      .bind(user_id)
      .fetch_all(&self.pool)
      .await?,
    )
  }

  async fn order_items(&self, order_id: Uuid) -> Result<Vec<OrderItem>> {
    Ok(
      sqlx::query_as::<_, OrderItem>(&format!(
        "SELECT {ORDER_ITEM_COLUMNS} FROM order_items WHERE order_id = $1 ORDER BY product_id"
      ))
      .bind(order_id)
      .fetch_all(&self.pool)
      .await?,
    )
  }

  async fn review_by_id(&self, review_id: Uuid) -> Result<Option<Review>> {
    Ok(
      sqlx::query_as::<_, Review>(&format!("SELECT {REVIEW_COLUMNS} FROM reviews WHERE id = $1"))
        .bind(review_id)
        .fetch_optional(&self.pool)
        .await?,
    )
  }

  async fn review_by_user_for_product(&self, user_id: Uuid, product_id: Uuid) -> Result<Option<Review>> {
    Ok(
      sqlx::query_as::<_, Review>(&format!(
        "SELECT {REVIEW_COLUMNS} FROM reviews WHERE user_id = $1 AND product_id = $2"
      ))
      .bind(user_id)
      .bind(product_id)
      .fetch_optional(&self.pool)
      .await?,
    )
  }

  async fn insert_review(&self, user_id: Uuid, product_id: Uuid, draft: ReviewDraft) -> Result<Review> {
    sqlx::query_as::<_, Review>(&format!(
      "INSERT INTO reviews (id, product_id, user_id, title, description, rating) VALUES ($1, $2, $3, $4, $5, $6) \
       RETURNING {REVIEW_COLUMNS}"
    ))
    .bind(Uuid::new_v4())
    .bind(product_id)
    .bind(user_id)
    .bind(&draft.title)
    .bind(&draft.description)
    .bind(draft.rating)
    .fetch_one(&self.pool)
    .await
    .map_err(|e| conflict_on_unique(e, "A review by this user for this product"))
  }

  async fn update_review(&self, review_id: Uuid, draft: ReviewDraft) -> Result<Option<Review>> {
    Ok(
      sqlx::query_as::<_, Review>(&format!(
        "UPDATE reviews SET title = $2, description = $3, rating = $4, updated_at = now() \
         WHERE id = $1 RETURNING {REVIEW_COLUMNS}"
      ))
      .bind(review_id)
      .bind(&draft.title)
      .bind(&draft.description)
      .bind(draft.rating)
      .fetch_optional(&self.pool)
      .await?,
    )
  }

  async fn delete_review(&self, review_id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM reviews WHERE id = $1")
      .bind(review_id)
      .execute(&self.pool)
      .await?;
    Ok(result.rows_affected() > 0)
  }

  async fn reviews_for_product(&self, product_id: Uuid) -> Result<Vec<ReviewWithAuthor>> {
    Ok(
      sqlx::query_as::<_, ReviewWithAuthor>(
        "SELECT r.id, r.product_id, r.user_id, r.title, r.description, r.rating, r.created_at, r.updated_at, \
                u.name AS author_name \
         FROM reviews r JOIN users u ON u.id = r.user_id \
         WHERE r.product_id = $1 ORDER BY r.created_at DESC, r.id",
      )
      .bind(product_id)
      .fetch_all(&self.pool)
      .await?,
    )
  }

  async fn refresh_rating(&self, product_id: Uuid) -> Result<(f64, i64)> {
    let row: Option<(f64, i64)> = sqlx::query_as(
      "UPDATE products p SET rating = agg.avg_rating, review_count = agg.cnt, updated_at = now() \
       FROM (SELECT COALESCE(AVG(rating)::DOUBLE PRECISION, 0) AS avg_rating, COUNT(*) AS cnt \
             FROM reviews WHERE product_id = $1) agg \
       WHERE p.id = $1 RETURNING p.rating, p.review_count",
    )
    .bind(product_id)
    .fetch_optional(&self.pool)
    .await?;
    row.ok_or_else(|| AppError::NotFound(format!("Product with ID {} not found.", product_id)))
  }

  async fn begin(&self) -> Result<Box<dyn StoreTx>> {
    let tx = self.pool.begin().await?;
    Ok(Box::new(PgStoreTx { tx }))
  }
}

pub struct PgStoreTx {
  tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTx for PgStoreTx {
  async fn load_cart(&mut self, user_id: Uuid) -> Result<Option<(Cart, Vec<CartItem>)>> {
    let cart = sqlx::query_as::<_, Cart>("SELECT id, user_id, created_at FROM carts WHERE user_id = $1 FOR UPDATE")
      .bind(user_id)
      .fetch_optional(&mut *self.tx)
      .await?;
    let Some(cart) = cart else {
      return Ok(None);
    };
    let items = sqlx::query_as::<_, CartItem>(&format!(
      "SELECT {CART_ITEM_COLUMNS} FROM cart_items WHERE cart_id = $1 ORDER BY product_id"
    ))
    .bind(cart.id)
    .fetch_all(&mut *self.tx)
    .await?;
    Ok(Some((cart, items)))
  }

  async fn lock_stock(&mut self, product_id: Uuid) -> Result<StockLease> {
    let available: Option<i32> = sqlx::query_scalar("SELECT stock FROM products WHERE id = $1 FOR UPDATE")
      .bind(product_id)
      .fetch_optional(&mut *self.tx)
      .await?;
    available
      .map(|available| StockLease { product_id, available })
      .ok_or_else(|| AppError::NotFound(format!("Product with ID {} not found.", product_id)))
  }

  async fn set_stock(&mut self, product_id: Uuid, stock: i32) -> Result<()> {
    let result = sqlx::query("UPDATE products SET stock = $2, updated_at = now() WHERE id = $1")
      .bind(product_id)
      .bind(stock)
      .execute(&mut *self.tx)
      .await?;
    if result.rows_affected() == 0 {
      return Err(AppError::NotFound(format!("Product with ID {} not found.", product_id)));
    }
    Ok(())
  }

  async fn insert_order(&mut self, user_id: Uuid) -> Result<Order> {
    Ok(
      sqlx::query_as::<_, Order>(&format!(
        "INSERT INTO orders (id, user_id, status, total_cents) VALUES ($1, $2, $3, 0) RETURNING {ORDER_COLUMNS}"
      ))
      .bind(Uuid::new_v4())
      .bind(user_id)
      .bind(OrderStatus::Pending)
      .fetch_one(&mut *self.tx)
      .await?,
    )
  }

  async fn insert_order_items(&mut self, order_id: Uuid, items: &[NewOrderItem]) -> Result<Vec<OrderItem>> {
    let mut created = Vec::with_capacity(items.len());
    for item in items {
      let row = sqlx::query_as::<_, OrderItem>(&format!(
        "INSERT INTO order_items (id, order_id, product_id, quantity, unit_price_cents) VALUES ($1, $2, $3, $4, $5) \
         RETURNING {ORDER_ITEM_COLUMNS}"
      ))
      .bind(Uuid::new_v4())
      .bind(order_id)
      .bind(item.product_id)
      .bind(item.quantity)
      .bind(item.unit_price_cents)
      .fetch_one(&mut *self.tx)
      .await?;
      created.push(row);
    }
    Ok(created)
  }

  async fn set_order_total(&mut self, order_id: Uuid, total_cents: i64) -> Result<Order> {
    Ok(
      sqlx::query_as::<_, Order>(&format!(
        "UPDATE orders SET total_cents = $2, updated_at = now() WHERE id = $1 RETURNING {ORDER_COLUMNS}"
      ))
      .bind(order_id)
      .bind(total_cents)
      .fetch_one(&mut *self.tx)
      .await?,
    )
  }

  async fn clear_cart(&mut self, cart_id: Uuid) -> Result<u64> {
    let result = sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
      .bind(cart_id)
      .execute(&mut *self.tx)
      .await?;
    Ok(result.rows_affected())
  }

  async fn lock_order(&mut self, order_id: Uuid) -> Result<Option<Order>> {
    Ok(
      sqlx::query_as::<_, Order>(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE"))
        .bind(order_id)
        .fetch_optional(&mut *self.tx)
        .await?,
    )
  }

  async fn set_order_status(&mut self, order_id: Uuid, status: OrderStatus) -> Result<Order> {
    Ok(
      sqlx::query_as::<_, Order>(&format!(
        "UPDATE orders SET status = $2, updated_at = now() WHERE id = $1 RETURNING {ORDER_COLUMNS}"
      ))
      .bind(order_id)
      .bind(status)
      .fetch_one(&mut *self.tx)
      .await?,
    )
  }

  async fn commit(self: Box<Self>) -> Result<()> {
    self.tx.commit().await?;
    Ok(())
  }

  async fn rollback(self: Box<Self>) -> Result<()> {
    self.tx.rollback().await?;
    Ok(())
  }
}
