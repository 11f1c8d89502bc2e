// storefront/src/store/memory.rs

//! In-process backend for tests and `STORE_BACKEND=memory`.
//!
//! Mirrors the row-locking behaviour of the PostgreSQL backend: each cart,
//! product and order row has an async mutex, a transaction keeps the owned
//! guards of every row it locked, and its writes are staged until commit.
//! Commit applies the staged writes under the table lock while the row
//! guards are still held. Dropping a transaction releases its guards and
//! discards whatever it staged.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{event, Level};
use uuid::Uuid;

use super::{insufficient_stock, ReviewDraft, StockLease, Store, StoreTx};
use crate::errors::{AppError, Result};
use crate::models::{
  Cart, CartItem, NewOrderItem, NewProduct, NewUser, Order, OrderItem, OrderStatus, Product, ProductFilter,
  ProductPatch, Review, ReviewWithAuthor, User,
};

/// Points inside a transaction where a storage failure can be simulated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
  LoadCart,
  LockStock,
  InsertOrder,
  InsertOrderItems,
  SetOrderTotal,
  ClearCart,
  Commit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum RowKey {
  Cart(Uuid),
  Product(Uuid),
  Order(Uuid),
}

#[derive(Default)]
struct Tables {
  users: HashMap<Uuid, User>,
  revoked_tokens: HashMap<Uuid, DateTime<Utc>>,
  products: HashMap<Uuid, Product>,
  carts: HashMap<Uuid, Cart>,
  cart_items: HashMap<Uuid, CartItem>,
  orders: HashMap<Uuid, Order>,
  order_items: Vec<OrderItem>,
  reviews: HashMap<Uuid, Review>,
}

#[derive(Default)]
struct Shared {
  tables: Mutex<Tables>,
  row_locks: Mutex<HashMap<RowKey, Arc<AsyncMutex<()>>>>,
  faults: Mutex<HashSet<FaultPoint>>,
}

impl Shared {
  fn row_lock(&self, key: RowKey) -> Arc<AsyncMutex<()>> {
    self.row_locks.lock().entry(key).or_default().clone()
  }

  /// Drops the lock entries of `keys` that no task holds or waits on. Every
  /// holder and waiter owns a clone, and clones are only made under the map
  /// lock, so a count of one means the map is the last owner.
  fn release_rows(&self, keys: impl IntoIterator<Item = RowKey>) {
    let mut row_locks = self.row_locks.lock();
    for key in keys {
      if row_locks.get(&key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
        row_locks.remove(&key);
      }
    }
  }

  fn check_fault(&self, point: FaultPoint) -> Result<()> {
    if self.faults.lock().contains(&point) {
      event!(Level::WARN, ?point, "Injected storage fault triggered.");
      return Err(AppError::Sqlx(sqlx::Error::Protocol(format!(
        "injected fault at {:?}",
        point
      ))));
    }
    Ok(())
  }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
  shared: Arc<Shared>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Makes every transaction fail at `point` until [`clear_faults`](Self::clear_faults).
  pub fn inject_fault(&self, point: FaultPoint) {
    self.shared.faults.lock().insert(point);
  }

  pub fn clear_faults(&self) {
    self.shared.faults.lock().clear();
  }

  /// Number of committed orders across all users.
  pub fn order_count(&self) -> usize {
    self.shared.tables.lock().orders.len()
  }

  /// Runs `f` on the tables while holding the async lock of `key`, the way a
  /// single-statement write blocks behind a transaction's row lock.
  async fn with_row<R>(&self, key: RowKey, f: impl FnOnce(&mut Tables) -> R + Send) -> R {
    let lock = self.shared.row_lock(key);
    let result = {
      let _row_guard = lock.lock().await;
      let mut tables = self.shared.tables.lock();
      f(&mut tables)
    };
    drop(lock);
    self.shared.release_rows([key]);
    result
  }
}

fn product_not_found(product_id: Uuid) -> AppError {
  AppError::NotFound(format!("Product with ID {} not found.", product_id))
}

fn order_not_found(order_id: Uuid) -> AppError {
  AppError::NotFound(format!("Order with ID {} not found.", order_id))
}

#[async_trait]
impl Store for MemoryStore {
  async fn insert_user(&self, new_user: NewUser) -> Result<User> {
    let mut tables = self.shared.tables.lock();
    if tables.users.values().any(|u| u.email == new_user.email) {
      return Err(AppError::Conflict("An account with this email already exists".to_string()));
    }
    let now = Utc::now();
    let user = User {
      id: Uuid::new_v4(),
      name: new_user.name,
      email: new_user.email,
      password_hash: new_user.password_hash,
      role: new_user.role,
      created_at: now,
      updated_at: now,
    };
    tables.users.insert(user.id, user.clone());
    Ok(user)
  }

  async fn user_by_email(&self, email: &str) -> Result<Option<User>> {
    Ok(self.shared.tables.lock().users.values().find(|u| u.email == email).cloned())
  }

  async fn user_by_id(&self, user_id: Uuid) -> Result<Option<User>> {
    Ok(self.shared.tables.lock().users.get(&user_id).cloned())
  }

  async fn revoke_token(&self, token_id: Uuid, expires_at: DateTime<Utc>) -> Result<()> {
    let now = Utc::now();
    let mut tables = self.shared.tables.lock();
    tables.revoked_tokens.insert(token_id, expires_at);
    tables.revoked_tokens.retain(|_, exp| *exp >= now);
    Ok(())
  }

  async fn is_token_revoked(&self, token_id: Uuid) -> Result<bool> {
    Ok(self.shared.tables.lock().revoked_tokens.contains_key(&token_id))
  }

  async fn insert_products(&self, products: Vec<NewProduct>) -> Result<Vec<Product>> {
    let mut tables = self.shared.tables.lock();
    let mut seen = HashSet::new();
    for product in &products {
      if !seen.insert(product.name.as_str()) || tables.products.values().any(|p| p.name == product.name) {
        return Err(AppError::Conflict(format!("Product '{}' already exists", product.name)));
      }
    }
    let now = Utc::now();
    let created: Vec<Product> = products
      .into_iter()
      .map(|p| Product {
        id: Uuid::new_v4(),
        name: p.name,
        description: p.description,
        category: p.category,
        data: p.data,
        price_cents: p.price_cents,
        stock: p.stock,
        rating: 0.0,
        review_count: 0,
        created_at: now,
        updated_at: now,
      })
      .collect();
    for product in &created {
      tables.products.insert(product.id, product.clone());
    }
    Ok(created)
  }

  async fn product_by_id(&self, product_id: Uuid) -> Result<Option<Product>> {
    Ok(self.shared.tables.lock().products.get(&product_id).cloned())
  }

  async fn list_products(&self, filter: &ProductFilter, limit: i64, offset: i64) -> Result<(Vec<Product>, i64)> {
    let tables = self.shared.tables.lock();
    let mut matching: Vec<&Product> = tables.products.values().filter(|p| filter.matches(p)).collect();
    matching.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
    let total = matching.len() as i64;
    let page = matching
      .into_iter()
      .skip(offset.max(0) as usize)
      .take(limit.max(0) as usize)
      .cloned()
      .collect();
    Ok((page, total))
  }

  async fn update_product(&self, product_id: Uuid, patch: &ProductPatch) -> Result<Option<Product>> {
    let patch = patch.clone();
    self
      .with_row(RowKey::Product(product_id), move |tables| {
        if let Some(name) = &patch.name {
          if tables.products.values().any(|p| p.id != product_id && &p.name == name) {
            return Err(AppError::Conflict("A product with this name already exists".to_string()));
          }
        }
        let Some(product) = tables.products.get_mut(&product_id) else {
          return Ok(None);
        };
        patch.apply_to(product);
        product.updated_at = Utc::now();
        Ok(Some(product.clone()))
      })
      .await
  }

  async fn delete_product(&self, product_id: Uuid) -> Result<bool> {
    let deleted = self
      .with_row(RowKey::Product(product_id), move |tables| {
        if tables.products.remove(&product_id).is_none() {
          return false;
        }
        tables.cart_items.retain(|_, item| item.product_id != product_id);
        tables.reviews.retain(|_, review| review.product_id != product_id);
        true
      })
      .await;
    Ok(deleted)
  }

  async fn cart_for_user(&self, user_id: Uuid) -> Result<Option<Cart>> {
    Ok(self.shared.tables.lock().carts.values().find(|c| c.user_id == user_id).cloned())
  }

  async fn get_or_create_cart(&self, user_id: Uuid) -> Result<Cart> {
    let mut tables = self.shared.tables.lock();
    if let Some(cart) = tables.carts.values().find(|c| c.user_id == user_id) {
      return Ok(cart.clone());
    }
    let cart = Cart {
      id: Uuid::new_v4(),
      user_id,
      created_at: Utc::now(),
    };
    tables.carts.insert(cart.id, cart.clone());
    Ok(cart)
  }

  async fn cart_items(&self, cart_id: Uuid) -> Result<Vec<CartItem>> {
    let tables = self.shared.tables.lock();
    let mut items: Vec<CartItem> = tables
      .cart_items
      .values()
      .filter(|item| item.cart_id == cart_id)
      .cloned()
      .collect();
    items.sort_by(|a, b| a.added_at.cmp(&b.added_at).then_with(|| a.id.cmp(&b.id)));
    Ok(items)
  }

  async fn add_cart_item(
    &self,
    cart_id: Uuid,
    product_id: Uuid,
    quantity: i32,
    unit_price_cents: i64,
    available: i32,
  ) -> Result<CartItem> {
    self
      .with_row(RowKey::Cart(cart_id), move |tables| {
        let now = Utc::now();
        let existing = tables
          .cart_items
          .values_mut()
          .find(|item| item.cart_id == cart_id && item.product_id == product_id);
        let current = existing.as_ref().map_or(0, |item| item.quantity);
        let requested = i64::from(current) + i64::from(quantity);
        if requested > i64::from(available) {
          return Err(insufficient_stock(product_id, requested, available));
        }
        // Bounded by `available`, so it fits.
        let requested = requested as i32;
        if let Some(item) = existing {
          item.quantity = requested;
          item.updated_at = now;
          return Ok(item.clone());
        }
        let item = CartItem {
          id: Uuid::new_v4(),
          cart_id,
          product_id,
          quantity: requested,
          unit_price_cents,
          added_at: now,
          updated_at: now,
        };
        tables.cart_items.insert(item.id, item.clone());
        Ok(item)
      })
      .await
  }

  async fn set_cart_item_quantity(&self, cart_id: Uuid, product_id: Uuid, quantity: i32) -> Result<Option<CartItem>> {
    let updated = self
      .with_row(RowKey::Cart(cart_id), move |tables| {
        let item = tables
          .cart_items
          .values_mut()
          .find(|item| item.cart_id == cart_id && item.product_id == product_id)?;
        item.quantity = quantity;
        item.updated_at = Utc::now();
        Some(item.clone())
      })
      .await;
    Ok(updated)
  }

  async fn refresh_cart_item_price(&self, cart_id: Uuid, product_id: Uuid, unit_price_cents: i64) -> Result<bool> {
    let refreshed = self
      .with_row(RowKey::Cart(cart_id), move |tables| {
        let Some(item) = tables
          .cart_items
          .values_mut()
          .find(|item| item.cart_id == cart_id && item.product_id == product_id)
        else {
          return false;
        };
        item.unit_price_cents = unit_price_cents;
        item.updated_at = Utc::now();
        true
      })
      .await;
    Ok(refreshed)
  }

  async fn remove_cart_item(&self, cart_id: Uuid, product_id: Uuid) -> Result<bool> {
    let removed = self
      .with_row(RowKey::Cart(cart_id), move |tables| {
        let before = tables.cart_items.len();
        tables
          .cart_items
          .retain(|_, item| !(item.cart_id == cart_id && item.product_id == product_id));
        before != tables.cart_items.len()
      })
      .await;
    Ok(removed)
  }

  async fn order_by_id(&self, order_id: Uuid) -> Result<Option<Order>> {
    Ok(self.shared.tables.lock().orders.get(&order_id).cloned())
  }

  async fn orders_for_user(&self, user_id: Uuid) -> Result<Vec<Order>> {
    let tables = self.shared.tables.lock();
    let mut orders: Vec<Order> = tables.orders.values().filter(|o| o.user_id == user_id).cloned().collect();
    orders.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| b.id.cmp(&a.id)));
    Ok(orders)
  }

  async fn order_items(&self, order_id: Uuid) -> Result<Vec<OrderItem>> {
    let tables = self.shared.tables.lock();
    let mut items: Vec<OrderItem> = tables
      .order_items
      .iter()
      .filter(|item| item.order_id == order_id)
      .cloned()
      .collect();
    items.sort_by_key(|item| item.product_id);
    Ok(items)
  }

  async fn review_by_id(&self, review_id: Uuid) -> Result<Option<Review>> {
    Ok(self.shared.tables.lock().reviews.get(&review_id).cloned())
  }

  async fn review_by_user_for_product(&self, user_id: Uuid, product_id: Uuid) -> Result<Option<Review>> {
    Ok(
      self
        .shared
        .tables
        .lock()
        .reviews
        .values()
        .find(|r| r.user_id == user_id && r.product_id == product_id)
        .cloned(),
    )
  }

  async fn insert_review(&self, user_id: Uuid, product_id: Uuid, draft: ReviewDraft) -> Result<Review> {
    let mut tables = self.shared.tables.lock();
    if !tables.products.contains_key(&product_id) {
      return Err(product_not_found(product_id));
    }
    if tables
      .reviews
      .values()
      .any(|r| r.user_id == user_id && r.product_id == product_id)
    {
      return Err(AppError::Conflict(
        "A review by this user for this product already exists".to_string(),
      ));
    }
    let now = Utc::now();
    let review = Review {
      id: Uuid::new_v4(),
      product_id,
      user_id,
      title: draft.title,
      description: draft.description,
      rating: draft.rating,
      created_at: now,
      updated_at: now,
    };
    tables.reviews.insert(review.id, review.clone());
    Ok(review)
  }

  async fn update_review(&self, review_id: Uuid, draft: ReviewDraft) -> Result<Option<Review>> {
    let mut tables = self.shared.tables.lock();
    let Some(review) = tables.reviews.get_mut(&review_id) else {
      return Ok(None);
    };
    review.title = draft.title;
    review.description = draft.description;
    review.rating = draft.rating;
    review.updated_at = Utc::now();
    Ok(Some(review.clone()))
  }

  async fn delete_review(&self, review_id: Uuid) -> Result<bool> {
    Ok(self.shared.tables.lock().reviews.remove(&review_id).is_some())
  }

  async fn reviews_for_product(&self, product_id: Uuid) -> Result<Vec<ReviewWithAuthor>> {
    let tables = self.shared.tables.lock();
    let mut reviews: Vec<ReviewWithAuthor> = tables
      .reviews
      .values()
      .filter(|r| r.product_id == product_id)
      .filter_map(|r| {
        tables.users.get(&r.user_id).map(|u| ReviewWithAuthor {
          review: r.clone(),
          author_name: u.name.clone(),
        })
      })
      .collect();
    reviews.sort_by(|a, b| {
      b.review
        .created_at
        .cmp(&a.review.created_at)
        .then_with(|| a.review.id.cmp(&b.review.id))
    });
    Ok(reviews)
  }

  async fn refresh_rating(&self, product_id: Uuid) -> Result<(f64, i64)> {
    self
      .with_row(RowKey::Product(product_id), move |tables| -> Result<(f64, i64)> {
        let ratings: Vec<i32> = tables
          .reviews
          .values()
          .filter(|r| r.product_id == product_id)
          .map(|r| r.rating)
          .collect();
        let count = ratings.len() as i64;
        let mean = if count == 0 {
          0.0
        } else {
          ratings.iter().map(|&r| f64::from(r)).sum::<f64>() / count as f64
        };
        let product = tables
          .products
          .get_mut(&product_id)
          .ok_or_else(|| product_not_found(product_id))?;
        product.rating = mean;
        product.review_count = count;
        product.updated_at = Utc::now();
        Ok((mean, count))
      })
      .await
  }

  async fn begin(&self) -> Result<Box<dyn StoreTx>> {
    Ok(Box::new(MemoryStoreTx {
      shared: Arc::clone(&self.shared),
      rows: HeldRows {
        shared: Arc::clone(&self.shared),
        guards: HashMap::new(),
      },
      staged_stock: HashMap::new(),
      staged_orders: HashMap::new(),
      staged_order_items: Vec::new(),
      cleared_carts: HashSet::new(),
    }))
  }
}

/// Row guards of one transaction. Dropping it unlocks the rows and removes
/// their lock entries when no one else is waiting on them.
struct HeldRows {
  shared: Arc<Shared>,
  guards: HashMap<RowKey, OwnedMutexGuard<()>>,
}

impl Drop for HeldRows {
  fn drop(&mut self) {
    let keys: Vec<RowKey> = self.guards.drain().map(|(key, _guard)| key).collect();
    self.shared.release_rows(keys);
  }
}

pub struct MemoryStoreTx {
  shared: Arc<Shared>,
  rows: HeldRows,
  staged_stock: HashMap<Uuid, i32>,
  staged_orders: HashMap<Uuid, Order>,
  staged_order_items: Vec<OrderItem>,
  cleared_carts: HashSet<Uuid>,
}

impl MemoryStoreTx {
  /// Reentrant: a row this transaction already holds is not locked again.
  async fn lock_row(&mut self, key: RowKey) {
    if self.rows.guards.contains_key(&key) {
      return;
    }
    let lock = self.shared.row_lock(key);
    let guard = lock.lock_owned().await;
    self.rows.guards.insert(key, guard);
  }

  fn holds(&self, key: RowKey) -> bool {
    self.rows.guards.contains_key(&key)
  }

  /// The order as this transaction sees it: staged version first.
  fn current_order(&self, order_id: Uuid) -> Option<Order> {
    self
      .staged_orders
      .get(&order_id)
      .cloned()
      .or_else(|| self.shared.tables.lock().orders.get(&order_id).cloned())
  }
}

#[async_trait]
impl StoreTx for MemoryStoreTx {
  async fn load_cart(&mut self, user_id: Uuid) -> Result<Option<(Cart, Vec<CartItem>)>> {
    self.shared.check_fault(FaultPoint::LoadCart)?;
    let cart = self
      .shared
      .tables
      .lock()
      .carts
      .values()
      .find(|c| c.user_id == user_id)
      .cloned();
    let Some(cart) = cart else {
      return Ok(None);
    };
    self.lock_row(RowKey::Cart(cart.id)).await;

    let mut items: Vec<CartItem> = if self.cleared_carts.contains(&cart.id) {
      Vec::new()
    } else {
      self
        .shared
        .tables
        .lock()
        .cart_items
        .values()
        .filter(|item| item.cart_id == cart.id)
        .cloned()
        .collect()
    };
    items.sort_by_key(|item| item.product_id);
    Ok(Some((cart, items)))
  }

  async fn lock_stock(&mut self, product_id: Uuid) -> Result<StockLease> {
    self.shared.check_fault(FaultPoint::LockStock)?;
    self.lock_row(RowKey::Product(product_id)).await;
    let available = match self.staged_stock.get(&product_id) {
      Some(staged) => *staged,
      None => self
        .shared
        .tables
        .lock()
        .products
        .get(&product_id)
        .map(|p| p.stock)
        .ok_or_else(|| product_not_found(product_id))?,
    };
    Ok(StockLease { product_id, available })
  }

  async fn set_stock(&mut self, product_id: Uuid, stock: i32) -> Result<()> {
    if !self.holds(RowKey::Product(product_id)) {
      return Err(AppError::Invariant(format!(
        "stock of product {} written without holding its lock",
        product_id
      )));
    }
    if stock < 0 {
      return Err(AppError::Invariant(format!(
        "stock of product {} would become negative ({})",
        product_id, stock
      )));
    }
    self.staged_stock.insert(product_id, stock);
    Ok(())
  }

  async fn insert_order(&mut self, user_id: Uuid) -> Result<Order> {
    self.shared.check_fault(FaultPoint::InsertOrder)?;
    let now = Utc::now();
    let order = Order {
      id: Uuid::new_v4(),
      user_id,
      status: OrderStatus::Pending,
      total_cents: 0,
      created_at: now,
      updated_at: now,
    };
    self.lock_row(RowKey::Order(order.id)).await;
    self.staged_orders.insert(order.id, order.clone());
    Ok(order)
  }

  async fn insert_order_items(&mut self, order_id: Uuid, items: &[NewOrderItem]) -> Result<Vec<OrderItem>> {
    self.shared.check_fault(FaultPoint::InsertOrderItems)?;
    if self.current_order(order_id).is_none() {
      return Err(order_not_found(order_id));
    }
    let created: Vec<OrderItem> = items
      .iter()
      .map(|item| OrderItem {
        id: Uuid::new_v4(),
        order_id,
        product_id: item.product_id,
        quantity: item.quantity,
        unit_price_cents: item.unit_price_cents,
      })
      .collect();
    self.staged_order_items.extend(created.iter().cloned());
    Ok(created)
  }

  async fn set_order_total(&mut self, order_id: Uuid, total_cents: i64) -> Result<Order> {
    self.shared.check_fault(FaultPoint::SetOrderTotal)?;
    let mut order = self.current_order(order_id).ok_or_else(|| order_not_found(order_id))?;
    order.total_cents = total_cents;
    order.updated_at = Utc::now();
    self.staged_orders.insert(order_id, order.clone());
    Ok(order)
  }

  async fn clear_cart(&mut self, cart_id: Uuid) -> Result<u64> {
    self.shared.check_fault(FaultPoint::ClearCart)?;
    if !self.holds(RowKey::Cart(cart_id)) {
      return Err(AppError::Invariant(format!(
        "cart {} cleared without holding its lock",
        cart_id
      )));
    }
    if !self.cleared_carts.insert(cart_id) {
      return Ok(0);
    }
    let count = self
      .shared
      .tables
      .lock()
      .cart_items
      .values()
      .filter(|item| item.cart_id == cart_id)
      .count();
    Ok(count as u64)
  }

  async fn lock_order(&mut self, order_id: Uuid) -> Result<Option<Order>> {
    self.lock_row(RowKey::Order(order_id)).await;
    Ok(self.current_order(order_id))
  }

  async fn set_order_status(&mut self, order_id: Uuid, status: OrderStatus) -> Result<Order> {
    if !self.holds(RowKey::Order(order_id)) {
      return Err(AppError::Invariant(format!(
        "order {} updated without holding its lock",
        order_id
      )));
    }
    let mut order = self.current_order(order_id).ok_or_else(|| order_not_found(order_id))?;
    order.status = status;
    order.updated_at = Utc::now();
    self.staged_orders.insert(order_id, order.clone());
    Ok(order)
  }

  async fn commit(self: Box<Self>) -> Result<()> {
    self.shared.check_fault(FaultPoint::Commit)?;
    let MemoryStoreTx {
      shared,
      rows,
      staged_stock,
      staged_orders,
      staged_order_items,
      cleared_carts,
    } = *self;

    {
      let mut tables = shared.tables.lock();
      // Validate before touching anything so a failed commit changes nothing.
      if let Some(missing) = staged_stock.keys().find(|id| !tables.products.contains_key(id)) {
        return Err(product_not_found(*missing));
      }

      let now = Utc::now();
      for (product_id, stock) in &staged_stock {
        if let Some(product) = tables.products.get_mut(product_id) {
          product.stock = *stock;
          product.updated_at = now;
        }
      }
      tables.orders.extend(staged_orders);
      tables.order_items.extend(staged_order_items);
      tables.cart_items.retain(|_, item| !cleared_carts.contains(&item.cart_id));
    }

    event!(Level::DEBUG, rows_locked = rows.guards.len(), "Memory transaction committed.");
    drop(rows);
    Ok(())
  }

  async fn rollback(self: Box<Self>) -> Result<()> {
    event!(
      Level::DEBUG,
      rows_locked = self.rows.guards.len(),
      "Memory transaction rolled back."
    );
    Ok(())
  }
}
