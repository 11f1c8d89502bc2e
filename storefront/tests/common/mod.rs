// tests/common/mod.rs
#![allow(dead_code)]

use once_cell::sync::Lazy;
use std::sync::Arc;
use storefront::config::AppConfig;
use storefront::models::{NewProduct, NewUser, Product, User, UserRole};
use storefront::services::cart_service;
use storefront::state::AppState;
use storefront::store::{MemoryStore, Store};
use tracing::Level;
use uuid::Uuid;

static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer()
    .try_init()
    .ok();
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}

pub const TEST_JWT_SECRET: &str = "test-secret-test-secret-test-secret";

pub fn test_config() -> AppConfig {
  AppConfig::from_lookup(|name| {
    match name {
      "STORE_BACKEND" => Some("memory"),
      "JWT_SECRET" => Some(TEST_JWT_SECRET),
      _ => None,
    }
    .map(str::to_string)
  })
  .expect("test config should be valid")
}

/// Application state over a fresh memory store. The store handle is kept
/// separately for fault injection and direct inspection.
pub struct TestApp {
  pub store: MemoryStore,
  pub state: AppState,
}

impl TestApp {
  pub fn new() -> Self {
    setup_tracing();
    let store = MemoryStore::new();
    let state = storefront::build_state(&test_config(), Arc::new(store.clone()));
    Self { store, state }
  }

  pub fn store(&self) -> &dyn Store {
    &self.store
  }

  pub fn shared_store(&self) -> Arc<dyn Store> {
    self.state.store.clone()
  }
}

pub async fn seed_user(store: &dyn Store, name: &str, role: UserRole) -> User {
  store
    .insert_user(NewUser {
      name: name.to_string(),
      email: format!("{}-{}@example.com", name.to_lowercase(), Uuid::new_v4().simple()),
      password_hash: "unused".to_string(),
      role,
    })
    .await
    .expect("seed user")
}

pub async fn seed_product(store: &dyn Store, name: &str, price_cents: i64, stock: i32) -> Product {
  store
    .insert_products(vec![NewProduct {
      name: name.to_string(),
      description: format!("{} description", name),
      category: "General".to_string(),
      data: None,
      price_cents,
      stock,
    }])
    .await
    .expect("seed product")
    .remove(0)
}

pub async fn add_to_cart(store: &dyn Store, user_id: Uuid, product_id: Uuid, quantity: i32) {
  cart_service::add_to_cart(store, user_id, product_id, quantity)
    .await
    .expect("add to cart");
}

pub async fn stock_of(store: &dyn Store, product_id: Uuid) -> i32 {
  store
    .product_by_id(product_id)
    .await
    .expect("product lookup")
    .expect("product exists")
    .stock
}

pub async fn cart_quantities(store: &dyn Store, user_id: Uuid) -> Vec<(Uuid, i32)> {
  let Some(cart) = store.cart_for_user(user_id).await.expect("cart lookup") else {
    return Vec::new();
  };
  let mut lines: Vec<(Uuid, i32)> = store
    .cart_items(cart.id)
    .await
    .expect("cart items")
    .into_iter()
    .map(|item| (item.product_id, item.quantity))
    .collect();
  lines.sort();
  lines
}

/// Sets a product's stock directly, bypassing catalog validation.
pub async fn set_stock(store: &dyn Store, product_id: Uuid, stock: i32) {
  store
    .update_product(
      product_id,
      &storefront::models::ProductPatch {
        stock: Some(stock),
        ..Default::default()
      },
    )
    .await
    .expect("update stock")
    .expect("product exists");
}
