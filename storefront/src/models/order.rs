// storefront/src/models/order.rs

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, Type as SqlxType};
use std::fmt;
use uuid::Uuid;

use crate::errors::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, SqlxType)]
#[sqlx(type_name = "order_status_enum", rename_all = "lowercase")]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderStatus {
  Pending,
  Shipped,
  Cancelled,
}

impl OrderStatus {
  /// Validates `self -> to`. Only a pending order may move, and only to
  /// shipped or cancelled.
  pub fn transition(self, to: OrderStatus) -> Result<OrderStatus, AppError> {
    match (self, to) {
      (OrderStatus::Pending, OrderStatus::Shipped) | (OrderStatus::Pending, OrderStatus::Cancelled) => Ok(to),
      (from, to) => Err(AppError::InvalidStateTransition { from, to }),
    }
  }
}

impl fmt::Display for OrderStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      OrderStatus::Pending => "PENDING",
      OrderStatus::Shipped => "SHIPPED",
      OrderStatus::Cancelled => "CANCELLED",
    })
  }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Order {
  pub id: Uuid,
  pub user_id: Uuid,
  pub status: OrderStatus,
  pub total_cents: i64,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

/// Immutable snapshot of a cart line taken when the order was placed.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct OrderItem {
  pub id: Uuid,
  pub order_id: Uuid,
  pub product_id: Uuid,
  pub quantity: i32,
  pub unit_price_cents: i64,
}

impl OrderItem {
  /// `None` on overflow.
  pub fn line_total_cents(&self) -> Option<i64> {
    i64::from(self.quantity).checked_mul(self.unit_price_cents)
  }
}

#[derive(Debug, Clone)]
pub struct NewOrderItem {
  pub product_id: Uuid,
  pub quantity: i32,
  pub unit_price_cents: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrderWithItems {
  #[serde(flatten)]
  pub order: Order,
  pub items: Vec<OrderItem>,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn pending_orders_can_ship_or_cancel() {
    assert_eq!(OrderStatus::Pending.transition(OrderStatus::Shipped).unwrap(), OrderStatus::Shipped);
    assert_eq!(
      OrderStatus::Pending.transition(OrderStatus::Cancelled).unwrap(),
      OrderStatus::Cancelled
    );
  }

  #[test]
  fn terminal_states_reject_every_move() {
    for from in [OrderStatus::Shipped, OrderStatus::Cancelled] {
      for to in [OrderStatus::Pending, OrderStatus::Shipped, OrderStatus::Cancelled] {
        match from.transition(to) {
          Err(AppError::InvalidStateTransition { from: f, to: t }) => {
            assert_eq!((f, t), (from, to));
          }
          other => panic!("{from} -> {to} should be rejected, got {other:?}"),
        }
      }
    }
  }

  #[test]
  fn pending_to_pending_is_not_a_transition() {
    assert!(OrderStatus::Pending.transition(OrderStatus::Pending).is_err());
  }
}
