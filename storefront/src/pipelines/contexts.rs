// storefront/src/pipelines/contexts.rs

//! Data structs the pipelines run over. Handlers receive them wrapped in
//! `shopflow::ContextData`.

use crate::models::{CartItem, Order, OrderItem, User, UserRole};
use crate::services::auth_service::{IssuedToken, TokenService};
use crate::store::{Store, StoreTx};
use std::sync::Arc;
use tokio::sync::Mutex as AsyncMutex;
use uuid::Uuid;

/// Holder of the open transaction of a run. The transaction is awaited on
/// while held, so it sits behind an async mutex instead of the context's
/// own lock. `None` before begin and after commit or rollback.
pub type TxSlot = Arc<AsyncMutex<Option<Box<dyn StoreTx>>>>;

pub struct SignupCtxData {
  pub store: Arc<dyn Store>,
  pub name: String,
  pub email: String,
  pub password: String,
  pub role: UserRole,
  pub created_user: Option<User>,
}

pub struct SigninCtxData {
  pub store: Arc<dyn Store>,
  pub tokens: TokenService,
  pub email: String,
  pub password: String,
  pub user: Option<User>,
  pub issued: Option<IssuedToken>,
}

pub struct CheckoutCtxData {
  pub store: Arc<dyn Store>,
  pub user_id: Uuid,
  pub tx: TxSlot,
  pub cart_id: Option<Uuid>,
  /// Cart lines as loaded under the cart row lock.
  pub lines: Vec<CartItem>,
  pub order: Option<Order>,
  pub items: Vec<OrderItem>,
  pub committed: bool,
}

impl CheckoutCtxData {
  pub fn new(store: Arc<dyn Store>, user_id: Uuid) -> Self {
    Self {
      store,
      user_id,
      tx: Arc::new(AsyncMutex::new(None)),
      cart_id: None,
      lines: Vec::new(),
      order: None,
      items: Vec::new(),
      committed: false,
    }
  }
}
