// storefront/src/services/order_service.rs

use crate::errors::{AppError, Result};
use crate::models::{Order, OrderStatus, OrderWithItems, UserRole};
use crate::pipelines::contexts::CheckoutCtxData;
use crate::store::Store;
use shopflow::{ContextData, FlowRegistry, PipelineResult};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

/// Places an order from the user's cart through the registered checkout
/// pipeline.
#[instrument(name = "orders::checkout", skip(flows, store), err(Display))]
pub async fn checkout(flows: &FlowRegistry<AppError>, store: Arc<dyn Store>, user_id: Uuid) -> Result<OrderWithItems> {
  let ctx_data = ContextData::new(CheckoutCtxData::new(store, user_id));

  match flows.run(ctx_data.clone()).await? {
    PipelineResult::Completed => {
      let guard = ctx_data.read();
      let order = match (&guard.order, guard.committed) {
        (Some(order), true) => order.clone(),
        _ => {
          return Err(AppError::Internal(
            "Checkout completed without a committed order.".to_string(),
          ))
        }
      };
      Ok(OrderWithItems {
        order,
        items: guard.items.clone(),
      })
    }
    PipelineResult::Stopped => {
      warn!(%user_id, "Checkout pipeline stopped before committing.");
      Err(AppError::Internal("Checkout was halted by an internal step.".to_string()))
    }
  }
}

async fn with_items(store: &dyn Store, order: Order) -> Result<OrderWithItems> {
  let items = store.order_items(order.id).await?;
  Ok(OrderWithItems { order, items })
}

#[instrument(name = "orders::order_history", skip(store), err(Display))]
pub async fn order_history(store: &dyn Store, user_id: Uuid) -> Result<Vec<OrderWithItems>> {
  let orders = store.orders_for_user(user_id).await?;
  let mut history = Vec::with_capacity(orders.len());
  for order in orders {
    history.push(with_items(store, order).await?);
  }
  Ok(history)
}

/// Owners and admins see an order; anyone else gets `NotFound`, so order
/// ids of other users cannot be discovered.
#[instrument(name = "orders::get_order", skip(store), err(Display))]
pub async fn get_order(store: &dyn Store, user_id: Uuid, role: UserRole, order_id: Uuid) -> Result<OrderWithItems> {
  let order = store
    .order_by_id(order_id)
    .await?
    .filter(|order| order.user_id == user_id || role == UserRole::Admin)
    .ok_or_else(|| AppError::NotFound(format!("Order {} not found.", order_id)))?;
  with_items(store, order).await
}

/// Moves an order to `to` under its row lock. `owner`, when set, restricts
/// the change to that user's orders.
async fn transition_order(store: &dyn Store, order_id: Uuid, to: OrderStatus, owner: Option<Uuid>) -> Result<Order> {
  let mut tx = store.begin().await?;

  let outcome = async {
    let order = tx
      .lock_order(order_id)
      .await?
      .filter(|order| owner.map_or(true, |owner| order.user_id == owner))
      .ok_or_else(|| AppError::NotFound(format!("Order {} not found.", order_id)))?;
    let next = order.status.transition(to)?;
    tx.set_order_status(order_id, next).await
  }
  .await;

  match outcome {
    Ok(order) => {
      tx.commit().await?;
      info!(%order_id, status = %order.status, "Order status changed.");
      Ok(order)
    }
    Err(e) => {
      if let Err(rollback_err) = tx.rollback().await {
        warn!(%order_id, error = %rollback_err, "Rollback after a refused status change failed.");
      }
      Err(e)
    }
  }
}

#[instrument(name = "orders::ship_order", skip(store), err(Display))]
pub async fn ship_order(store: &dyn Store, order_id: Uuid) -> Result<Order> {
  transition_order(store, order_id, OrderStatus::Shipped, None).await
}

/// Admins may cancel any pending order, customers only their own.
/// Cancelling does not return stock.
#[instrument(name = "orders::cancel_order", skip(store), err(Display))]
pub async fn cancel_order(store: &dyn Store, user_id: Uuid, role: UserRole, order_id: Uuid) -> Result<Order> {
  let owner = (role != UserRole::Admin).then_some(user_id);
  transition_order(store, order_id, OrderStatus::Cancelled, owner).await
}
