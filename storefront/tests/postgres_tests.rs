// tests/postgres_tests.rs
//! Runs against a real database:
//! `DATABASE_URL=postgres://... cargo test -p storefront --test postgres_tests -- --ignored`
mod common;

use common::*;
use futures_util::future::join_all;
use std::sync::Arc;
use storefront::errors::AppError;
use storefront::models::{ProductPatch, UserRole};
use storefront::services::{cart_service, order_service};
use storefront::state::AppState;
use storefront::store::{PgStore, ReviewDraft, Store};
use uuid::Uuid;

async fn pg_app() -> (PgStore, AppState) {
  setup_tracing();
  let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must point at a test database");
  let store = PgStore::connect(&database_url, 8)
    .await
    .expect("Failed to connect to PostgreSQL");
  store.apply_schema().await.expect("Failed to apply schema");
  let state = storefront::build_state(&test_config(), Arc::new(store.clone()));
  (store, state)
}

/// Product names are unique across the table, and the database outlives a run.
fn unique(name: &str) -> String {
  format!("{} {}", name, Uuid::new_v4().simple())
}

#[tokio::test]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn pg_checkout_moves_stock_and_empties_cart() {
  let (store, state) = pg_app().await;
  let user = seed_user(&store, "Pg Ada", UserRole::Customer).await;
  let lamp = seed_product(&store, &unique("Lamp"), 1_500, 5).await;
  let bulb = seed_product(&store, &unique("Bulb"), 299, 10).await;
  add_to_cart(&store, user.id, lamp.id, 2).await;
  add_to_cart(&store, user.id, bulb.id, 3).await;

  let placed = order_service::checkout(&state.flows, state.store.clone(), user.id)
    .await
    .unwrap();

  assert_eq!(placed.order.total_cents, 2 * 1_500 + 3 * 299);
  assert_eq!(store.order_items(placed.order.id).await.unwrap().len(), 2);
  assert_eq!(stock_of(&store, lamp.id).await, 3);
  assert_eq!(stock_of(&store, bulb.id).await, 7);
  assert!(cart_quantities(&store, user.id).await.is_empty());
}

#[tokio::test]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn pg_short_stock_leaves_everything_untouched() {
  let (store, state) = pg_app().await;
  let user = seed_user(&store, "Pg Bo", UserRole::Customer).await;
  let lamp = seed_product(&store, &unique("Lamp"), 1_500, 5).await;
  let bulb = seed_product(&store, &unique("Bulb"), 299, 3).await;
  add_to_cart(&store, user.id, lamp.id, 2).await;
  add_to_cart(&store, user.id, bulb.id, 3).await;
  set_stock(&store, bulb.id, 1).await;

  let err = order_service::checkout(&state.flows, state.store.clone(), user.id)
    .await
    .unwrap_err();

  match err {
    AppError::InsufficientStock {
      product_id,
      requested,
      available,
    } => {
      assert_eq!(product_id, bulb.id);
      assert_eq!((requested, available), (3, 1));
    }
    other => panic!("expected insufficient stock, got {other:?}"),
  }
  assert_eq!(stock_of(&store, lamp.id).await, 5);
  assert_eq!(stock_of(&store, bulb.id).await, 1);
  assert_eq!(cart_quantities(&store, user.id).await.len(), 2);
  assert!(store.orders_for_user(user.id).await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn pg_last_unit_goes_to_exactly_one_buyer() {
  let (store, state) = pg_app().await;
  let product = seed_product(&store, &unique("Last One"), 900, 1).await;
  let mut buyers = Vec::new();
  for i in 0..2 {
    let user = seed_user(&store, &format!("Pg Buyer{}", i), UserRole::Customer).await;
    add_to_cart(&store, user.id, product.id, 1).await;
    buyers.push(user.id);
  }

  let attempts = buyers.into_iter().map(|user_id| {
    let flows = state.flows.clone();
    let store = state.store.clone();
    tokio::spawn(async move { order_service::checkout(&flows, store, user_id).await })
  });
  let outcomes: Vec<_> = join_all(attempts).await.into_iter().map(|r| r.unwrap()).collect();

  assert_eq!(outcomes.iter().filter(|o| o.is_ok()).count(), 1);
  assert!(outcomes
    .iter()
    .filter_map(|o| o.as_ref().err())
    .all(|e| matches!(e, AppError::InsufficientStock { available: 0, .. })));
  assert_eq!(stock_of(&store, product.id).await, 0);
}

#[tokio::test]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn pg_rating_is_recomputed_from_stored_reviews() {
  let (store, _state) = pg_app().await;
  let product = seed_product(&store, &unique("Rated"), 1_000, 1).await;
  for rating in [4, 5] {
    let author = seed_user(&store, "Pg Critic", UserRole::Customer).await;
    store
      .insert_review(
        author.id,
        product.id,
        ReviewDraft {
          title: "Fine".to_string(),
          description: "Does the job".to_string(),
          rating,
        },
      )
      .await
      .unwrap();
  }

  assert_eq!(store.refresh_rating(product.id).await.unwrap(), (4.5, 2));
  let stored = store.product_by_id(product.id).await.unwrap().unwrap();
  assert_eq!((stored.rating, stored.review_count), (4.5, 2));

  assert!(matches!(
    store.refresh_rating(Uuid::new_v4()).await,
    Err(AppError::NotFound(_))
  ));
}

#[tokio::test]
#[ignore = "Requires PostgreSQL (DATABASE_URL)"]
async fn pg_cart_lines_accumulate_and_updates_never_insert() {
  let (store, _state) = pg_app().await;
  let user = seed_user(&store, "Pg Cy", UserRole::Customer).await;
  let pen = seed_product(&store, &unique("Pen"), 150, 3).await;
  let cart = store.get_or_create_cart(user.id).await.unwrap();

  assert!(!store.refresh_cart_item_price(cart.id, pen.id, 100).await.unwrap());
  assert!(store.set_cart_item_quantity(cart.id, pen.id, 2).await.unwrap().is_none());

  let adds = (0..3).map(|_| cart_service::add_to_cart(&store, user.id, pen.id, 1));
  for added in join_all(adds).await {
    added.unwrap();
  }
  assert_eq!(cart_quantities(&store, user.id).await, vec![(pen.id, 3)]);

  let err = cart_service::add_to_cart(&store, user.id, pen.id, 1).await.unwrap_err();
  assert!(matches!(
    err,
    AppError::InsufficientStock {
      requested: 4,
      available: 3,
      ..
    }
  ));

  store
    .update_product(
      pen.id,
      &ProductPatch {
        price_cents: Some(120),
        ..Default::default()
      },
    )
    .await
    .unwrap();
  let view = cart_service::view_cart(&store, user.id).await.unwrap();
  assert_eq!(view.total_cents, 360);
  assert_eq!(store.cart_items(cart.id).await.unwrap()[0].unit_price_cents, 120);
}
