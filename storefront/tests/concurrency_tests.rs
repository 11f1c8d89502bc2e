// tests/concurrency_tests.rs
mod common;

use common::*;
use futures_util::future::join_all;
use serial_test::serial;
use storefront::errors::AppError;
use storefront::models::UserRole;
use storefront::services::{cart_service, order_service};
use storefront::store::Store;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn last_unit_goes_to_exactly_one_buyer() {
  let app = TestApp::new();
  let product = seed_product(app.store(), "Last One", 4_200, 1).await;
  let alice = seed_user(app.store(), "Alice", UserRole::Customer).await;
  let bob = seed_user(app.store(), "Bob", UserRole::Customer).await;
  add_to_cart(app.store(), alice.id, product.id, 1).await;
  add_to_cart(app.store(), bob.id, product.id, 1).await;

  let handles: Vec<_> = [alice.id, bob.id]
    .into_iter()
    .map(|user_id| {
      let flows = app.state.flows.clone();
      let store = app.shared_store();
      tokio::spawn(async move { order_service::checkout(&flows, store, user_id).await })
    })
    .collect();

  let outcomes: Vec<_> = join_all(handles).await.into_iter().map(|h| h.unwrap()).collect();
  let successes = outcomes.iter().filter(|o| o.is_ok()).count();
  let shortfalls = outcomes
    .iter()
    .filter(|o| matches!(o, Err(AppError::InsufficientStock { available: 0, .. })))
    .count();

  assert_eq!(successes, 1, "outcomes: {:?}", outcomes);
  assert_eq!(shortfalls, 1, "outcomes: {:?}", outcomes);
  assert_eq!(stock_of(app.store(), product.id).await, 0);
  assert_eq!(app.store.order_count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn concurrent_checkouts_never_oversell() {
  let app = TestApp::new();
  let initial_stock = 7;
  let product = seed_product(app.store(), "Contended", 1_000, initial_stock).await;
  let side = seed_product(app.store(), "Side", 250, 100).await;

  let mut buyers = Vec::new();
  for i in 0..12 {
    let user = seed_user(app.store(), &format!("Buyer{}", i), UserRole::Customer).await;
    let quantity = 1 + (i % 2);
    add_to_cart(app.store(), user.id, product.id, quantity).await;
    // Half the carts also touch a second product, in either id order.
    if i % 3 == 0 {
      add_to_cart(app.store(), user.id, side.id, 1).await;
    }
    buyers.push((user.id, quantity));
  }

  let handles: Vec<_> = buyers
    .iter()
    .map(|&(user_id, quantity)| {
      let flows = app.state.flows.clone();
      let store = app.shared_store();
      tokio::spawn(async move { (quantity, order_service::checkout(&flows, store, user_id).await) })
    })
    .collect();

  let mut sold = 0;
  for handle in join_all(handles).await {
    let (quantity, outcome) = handle.unwrap();
    match outcome {
      Ok(placed) => {
        sold += quantity;
        let sum: i64 = placed
          .items
          .iter()
          .map(|i| i64::from(i.quantity) * i.unit_price_cents)
          .sum();
        assert_eq!(sum, placed.order.total_cents);
      }
      Err(AppError::InsufficientStock { .. }) => {}
      Err(other) => panic!("unexpected checkout error: {:?}", other),
    }
  }

  let remaining = stock_of(app.store(), product.id).await;
  assert!(remaining >= 0);
  assert_eq!(remaining, initial_stock - sold);
  assert!(sold <= initial_stock);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
#[serial]
async fn disjoint_carts_all_succeed() {
  let app = TestApp::new();
  let mut handles = Vec::new();
  for i in 0..6 {
    let user = seed_user(app.store(), &format!("Solo{}", i), UserRole::Customer).await;
    let product = seed_product(app.store(), &format!("Own Product {}", i), 100, 1).await;
    add_to_cart(app.store(), user.id, product.id, 1).await;
    let flows = app.state.flows.clone();
    let store = app.shared_store();
    handles.push(tokio::spawn(async move {
      order_service::checkout(&flows, store, user.id).await
    }));
  }

  for handle in join_all(handles).await {
    handle.unwrap().unwrap();
  }
  assert_eq!(app.store.order_count(), 6);
}

#[tokio::test]
async fn checkout_waits_for_a_concurrent_stock_holder() {
  let app = TestApp::new();
  let user = seed_user(app.store(), "Waiter", UserRole::Customer).await;
  let product = seed_product(app.store(), "Held", 500, 3).await;
  add_to_cart(app.store(), user.id, product.id, 2).await;

  let mut holder = app.store().begin().await.unwrap();
  let lease = holder.lock_stock(product.id).await.unwrap();
  holder.set_stock(product.id, lease.available - 2).await.unwrap();

  let flows = app.state.flows.clone();
  let store = app.shared_store();
  let waiting = tokio::spawn(async move { order_service::checkout(&flows, store, user.id).await });

  tokio::task::yield_now().await;
  assert!(!waiting.is_finished());
  holder.commit().await.unwrap();

  // The waiting checkout sees the holder's committed decrement: 1 left.
  let err = waiting.await.unwrap().unwrap_err();
  assert!(matches!(
    err,
    AppError::InsufficientStock {
      requested: 2,
      available: 1,
      ..
    }
  ));
}

#[tokio::test]
async fn concurrent_adds_to_one_line_all_count() {
  let app = TestApp::new();
  let user_id = seed_user(app.store(), "Adder", UserRole::Customer).await.id;
  let product_id = seed_product(app.store(), "Popular", 100, 10).await.id;
  add_to_cart(app.store(), user_id, product_id, 1).await;

  // Both adds read the line while the cart row is held elsewhere.
  let mut holder = app.store().begin().await.unwrap();
  holder.load_cart(user_id).await.unwrap().unwrap();

  let adds: Vec<_> = (0..2)
    .map(|_| {
      let store = app.shared_store();
      tokio::spawn(async move { cart_service::add_to_cart(store.as_ref(), user_id, product_id, 1).await })
    })
    .collect();
  tokio::time::sleep(std::time::Duration::from_millis(50)).await;
  assert!(adds.iter().all(|add| !add.is_finished()));

  holder.rollback().await.unwrap();
  for add in join_all(adds).await {
    add.unwrap().unwrap();
  }
  assert_eq!(cart_quantities(app.store(), user_id).await, vec![(product_id, 3)]);
}

#[tokio::test]
async fn concurrent_adds_never_exceed_stock() {
  let app = TestApp::new();
  let user_id = seed_user(app.store(), "Greedy", UserRole::Customer).await.id;
  let product_id = seed_product(app.store(), "Scarce", 100, 3).await.id;

  let adds: Vec<_> = (0..5)
    .map(|_| {
      let store = app.shared_store();
      tokio::spawn(async move { cart_service::add_to_cart(store.as_ref(), user_id, product_id, 1).await })
    })
    .collect();

  let mut accepted = 0;
  for add in join_all(adds).await {
    match add.unwrap() {
      Ok(_) => accepted += 1,
      Err(e) => assert!(matches!(e, AppError::InsufficientStock { available: 3, .. })),
    }
  }
  assert_eq!(accepted, 3);
  assert_eq!(cart_quantities(app.store(), user_id).await, vec![(product_id, 3)]);
}
