// storefront/src/pipelines/checkout_pipeline.rs

//! Checkout: turns the user's cart into a pending order in one
//! transaction.
//!
//! Every step works through the transaction held in the context's
//! [`TxSlot`](crate::pipelines::contexts::TxSlot). A failing step triggers
//! the failure hook, which rolls the transaction back; if the run is
//! dropped instead (client went away), dropping the slot rolls it back.

use crate::errors::AppError;
use crate::models::NewOrderItem;
use crate::pipelines::contexts::CheckoutCtxData;
use crate::store::StockLease;
use shopflow::{ContextData, FailedStep, FlowRegistry, Pipeline, PipelineControl};
use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

pub const CHECKOUT_STEPS: [&str; 8] = [
  "begin_transaction",
  "load_cart",
  "reserve_stock",
  "create_order",
  "snapshot_line_items",
  "settle_total",
  "clear_cart",
  "commit_transaction",
];

fn no_open_tx(step: &str) -> AppError {
  AppError::Invariant(format!("checkout step '{}' ran without an open transaction", step))
}

fn no_order(step: &str) -> AppError {
  AppError::Invariant(format!("checkout step '{}' ran before the order was created", step))
}

/// Sums `quantity × unit price` over `lines` with overflow checks.
/// Sums line totals, where `None` marks a line whose own total overflowed.
fn checked_total<I>(line_totals: I) -> Result<i64, AppError>
where
  I: IntoIterator<Item = Option<i64>>,
{
  line_totals.into_iter().try_fold(0i64, |acc, line| {
    line
      .and_then(|line| acc.checked_add(line))
      .ok_or_else(|| AppError::Invariant("order total overflows".to_string()))
  })
}

pub fn build_checkout_pipeline() -> Pipeline<CheckoutCtxData, AppError> {
  let step_defs: Vec<(&str, bool, Option<_>)> = CHECKOUT_STEPS.iter().map(|name| (*name, false, None)).collect();
  let mut p = Pipeline::<CheckoutCtxData, AppError>::new(&step_defs).named("checkout");

  p.on_root("begin_transaction", |ctx_data: ContextData<CheckoutCtxData>| {
    Box::pin(async move {
      let (store, slot, user_id) = {
        let guard = ctx_data.read();
        (guard.store.clone(), guard.tx.clone(), guard.user_id)
      };
      let tx = store.begin().await?;
      *slot.lock().await = Some(tx);
      debug!(%user_id, "Checkout transaction opened.");
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  // Locks the cart row, which serializes checkouts of the same cart.
  p.on_root("load_cart", |ctx_data: ContextData<CheckoutCtxData>| {
    Box::pin(async move {
      let (slot, user_id) = {
        let guard = ctx_data.read();
        (guard.tx.clone(), guard.user_id)
      };
      let loaded = {
        let mut tx_guard = slot.lock().await;
        let tx = tx_guard.as_mut().ok_or_else(|| no_open_tx("load_cart"))?;
        tx.load_cart(user_id).await?
      };

      let (cart, lines) = match loaded {
        Some((cart, lines)) if !lines.is_empty() => (cart, lines),
        _ => {
          info!(%user_id, "Checkout of an empty cart.");
          return Err(AppError::EmptyCart);
        }
      };
      debug!(cart_id = %cart.id, lines = lines.len(), "Cart loaded for checkout.");
      ctx_data.update(|ctx| {
        ctx.cart_id = Some(cart.id);
        ctx.lines = lines;
      });
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  // Locks every product in ascending id order, verifies all of them, and
  // only then decrements. A shortfall anywhere leaves every stock untouched.
  p.on_root("reserve_stock", |ctx_data: ContextData<CheckoutCtxData>| {
    Box::pin(async move {
      let (slot, wanted) = {
        let guard = ctx_data.read();
        let mut wanted: BTreeMap<Uuid, i32> = BTreeMap::new();
        for line in &guard.lines {
          let total = wanted.entry(line.product_id).or_insert(0);
          *total = total
            .checked_add(line.quantity)
            .ok_or_else(|| AppError::Invariant("cart quantity overflows".to_string()))?;
        }
        (guard.tx.clone(), wanted)
      };

      let reserved = {
        let mut tx_guard = slot.lock().await;
        let tx = tx_guard.as_mut().ok_or_else(|| no_open_tx("reserve_stock"))?;

        let mut verified: Vec<(StockLease, i32)> = Vec::with_capacity(wanted.len());
        for (&product_id, &requested) in &wanted {
          let lease = tx.lock_stock(product_id).await?;
          if lease.available < requested {
            warn!(%product_id, requested, available = lease.available, "Insufficient stock at checkout.");
            return Err(AppError::InsufficientStock {
              product_id,
              requested,
              available: lease.available,
            });
          }
          verified.push((lease, requested));
        }
        for (lease, requested) in &verified {
          tx.set_stock(lease.product_id, lease.available - requested).await?;
        }
        verified.len()
      };

      debug!(products = reserved, "Stock reserved.");
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  p.on_root("create_order", |ctx_data: ContextData<CheckoutCtxData>| {
    Box::pin(async move {
      let (slot, user_id) = {
        let guard = ctx_data.read();
        (guard.tx.clone(), guard.user_id)
      };
      let order = {
        let mut tx_guard = slot.lock().await;
        let tx = tx_guard.as_mut().ok_or_else(|| no_open_tx("create_order"))?;
        tx.insert_order(user_id).await?
      };
      debug!(order_id = %order.id, "Order row created.");
      ctx_data.write().order = Some(order);
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  // Line items copy the cart lines verbatim, so later catalog price changes
  // never reach a placed order.
  p.on_root("snapshot_line_items", |ctx_data: ContextData<CheckoutCtxData>| {
    Box::pin(async move {
      let (slot, order_id, new_items) = {
        let guard = ctx_data.read();
        let order_id = guard.order.as_ref().map(|o| o.id).ok_or_else(|| no_order("snapshot_line_items"))?;
        let new_items: Vec<NewOrderItem> = guard
          .lines
          .iter()
          .map(|line| NewOrderItem {
            product_id: line.product_id,
            quantity: line.quantity,
            unit_price_cents: line.unit_price_cents,
          })
          .collect();
        (guard.tx.clone(), order_id, new_items)
      };
      let items = {
        let mut tx_guard = slot.lock().await;
        let tx = tx_guard.as_mut().ok_or_else(|| no_open_tx("snapshot_line_items"))?;
        tx.insert_order_items(order_id, &new_items).await?
      };
      ctx_data.write().items = items;
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  p.on_root("settle_total", |ctx_data: ContextData<CheckoutCtxData>| {
    Box::pin(async move {
      let (slot, order_id, items_total, cart_total) = {
        let guard = ctx_data.read();
        let order_id = guard.order.as_ref().map(|o| o.id).ok_or_else(|| no_order("settle_total"))?;
        let items_total = checked_total(guard.items.iter().map(|i| i.line_total_cents()));
        let cart_total = checked_total(
          guard
            .lines
            .iter()
            .map(|l| l.unit_price_cents.checked_mul(i64::from(l.quantity))),
        );
        (guard.tx.clone(), order_id, items_total, cart_total)
      };

      let total = match (items_total, cart_total) {
        (Ok(items_total), Ok(cart_total)) if items_total == cart_total => items_total,
        (Ok(items_total), Ok(cart_total)) => {
          error!(%order_id, items_total, cart_total, "Order total disagrees with the cart.");
          return Err(AppError::Invariant(format!(
            "order {} totals {} but its cart totals {}",
            order_id, items_total, cart_total
          )));
        }
        (Err(e), _) | (_, Err(e)) => {
          error!(%order_id, error = %e, "Order total could not be computed.");
          return Err(e);
        }
      };

      let order = {
        let mut tx_guard = slot.lock().await;
        let tx = tx_guard.as_mut().ok_or_else(|| no_open_tx("settle_total"))?;
        tx.set_order_total(order_id, total).await?
      };
      ctx_data.write().order = Some(order);
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  p.on_root("clear_cart", |ctx_data: ContextData<CheckoutCtxData>| {
    Box::pin(async move {
      let (slot, cart_id) = {
        let guard = ctx_data.read();
        let cart_id = guard
          .cart_id
          .ok_or_else(|| AppError::Invariant("checkout step 'clear_cart' ran without a cart".to_string()))?;
        (guard.tx.clone(), cart_id)
      };
      let removed = {
        let mut tx_guard = slot.lock().await;
        let tx = tx_guard.as_mut().ok_or_else(|| no_open_tx("clear_cart"))?;
        tx.clear_cart(cart_id).await?
      };
      debug!(%cart_id, removed, "Cart emptied.");
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  p.on_root("commit_transaction", |ctx_data: ContextData<CheckoutCtxData>| {
    Box::pin(async move {
      let slot = ctx_data.read().tx.clone();
      let tx = slot.lock().await.take().ok_or_else(|| no_open_tx("commit_transaction"))?;
      tx.commit().await?;

      let (order_id, total_cents) = ctx_data.update(|ctx| {
        ctx.committed = true;
        (ctx.order.as_ref().map(|o| o.id), ctx.order.as_ref().map(|o| o.total_cents))
      });
      info!(order_id = ?order_id, total_cents = ?total_cents, "Checkout committed.");
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  p.on_failure(|ctx_data: ContextData<CheckoutCtxData>, failed: FailedStep| {
    Box::pin(async move {
      let slot = ctx_data.read().tx.clone();
      let open = slot.lock().await.take();
      match open {
        Some(tx) => match tx.rollback().await {
          Ok(()) => info!(step = %failed.step_name, error = %failed.error, "Checkout rolled back."),
          Err(rollback_err) => error!(
            step = %failed.step_name,
            error = %rollback_err,
            "Checkout rollback failed; the store discards the transaction on its own."
          ),
        },
        None => debug!(step = %failed.step_name, "Checkout failed with no open transaction."),
      }
    })
  });

  p
}

pub fn register_checkout_pipeline(registry: &FlowRegistry<AppError>) {
  registry.register_pipeline(build_checkout_pipeline());
  tracing::info!("Checkout pipeline registered.");
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn declares_the_checkout_steps_in_order() {
    let p = build_checkout_pipeline();
    assert_eq!(p.name(), "checkout");
    assert_eq!(p.step_names(), CHECKOUT_STEPS.to_vec());
  }

  #[test]
  fn checked_total_sums_and_detects_overflow() {
    assert_eq!(checked_total([Some(1000), Some(250)]).unwrap(), 1250);
    assert_eq!(checked_total(std::iter::empty()).unwrap(), 0);
    assert!(matches!(checked_total([Some(1), None]), Err(AppError::Invariant(_))));
    assert!(matches!(
      checked_total([Some(i64::MAX), Some(1)]),
      Err(AppError::Invariant(_))
    ));
  }
}
