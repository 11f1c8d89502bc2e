// storefront/src/web/handlers/order_handlers.rs

use actix_web::{web, HttpResponse};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::errors::AppError;
use crate::services::order_service;
use crate::state::AppState;
use crate::web::extractors::{AdminUser, AuthenticatedUser};

#[instrument(name = "handler::checkout", skip(app_state, auth_user), fields(user_id = %auth_user.user_id))]
pub async fn checkout_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let placed = order_service::checkout(&app_state.flows, app_state.store.clone(), auth_user.user_id).await?;
  info!(order_id = %placed.order.id, total_cents = placed.order.total_cents, "Order placed.");
  Ok(HttpResponse::Created().json(placed))
}

#[instrument(name = "handler::order_history", skip(app_state, auth_user), fields(user_id = %auth_user.user_id))]
pub async fn order_history_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let orders = order_service::order_history(app_state.store.as_ref(), auth_user.user_id).await?;
  Ok(HttpResponse::Ok().json(orders))
}

#[instrument(name = "handler::get_order", skip(app_state, auth_user), fields(user_id = %auth_user.user_id))]
pub async fn get_order_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  let order = order_service::get_order(
    app_state.store.as_ref(),
    auth_user.user_id,
    auth_user.role,
    path.into_inner(),
  )
  .await?;
  Ok(HttpResponse::Ok().json(order))
}

#[instrument(name = "handler::ship_order", skip(app_state, admin), fields(admin_id = %admin.0.user_id))]
pub async fn ship_order_handler(
  app_state: web::Data<AppState>,
  admin: AdminUser,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  let order = order_service::ship_order(app_state.store.as_ref(), path.into_inner()).await?;
  Ok(HttpResponse::Ok().json(order))
}

#[instrument(name = "handler::cancel_order", skip(app_state, auth_user), fields(user_id = %auth_user.user_id))]
pub async fn cancel_order_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  let order = order_service::cancel_order(
    app_state.store.as_ref(),
    auth_user.user_id,
    auth_user.role,
    path.into_inner(),
  )
  .await?;
  Ok(HttpResponse::Ok().json(order))
}
