// storefront/src/web/handlers/cart_handlers.rs

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use tracing::instrument;
use uuid::Uuid;

use crate::errors::AppError;
use crate::services::cart_service;
use crate::state::AppState;
use crate::web::extractors::AuthenticatedUser;

#[derive(Deserialize, Debug, Default)]
pub struct AddToCartPayload {
  pub quantity: Option<i32>,
}

#[derive(Deserialize, Debug)]
pub struct SetQuantityPayload {
  pub quantity: i32,
}

#[instrument(name = "handler::view_cart", skip(app_state, auth_user), fields(user_id = %auth_user.user_id))]
pub async fn view_cart_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  let cart = cart_service::view_cart(app_state.store.as_ref(), auth_user.user_id).await?;
  Ok(HttpResponse::Ok().json(cart))
}

/// The body is optional; without one a single unit is added.
#[instrument(name = "handler::add_to_cart", skip(app_state, auth_user, payload), fields(user_id = %auth_user.user_id))]
pub async fn add_to_cart_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  path: web::Path<Uuid>,
  payload: Option<web::Json<AddToCartPayload>>,
) -> Result<HttpResponse, AppError> {
  let quantity = payload.and_then(|p| p.into_inner().quantity).unwrap_or(1);
  let item = cart_service::add_to_cart(app_state.store.as_ref(), auth_user.user_id, path.into_inner(), quantity).await?;
  Ok(HttpResponse::Ok().json(item))
}

#[instrument(name = "handler::update_cart_item", skip(app_state, auth_user, payload), fields(user_id = %auth_user.user_id))]
pub async fn update_cart_item_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  path: web::Path<Uuid>,
  payload: web::Json<SetQuantityPayload>,
) -> Result<HttpResponse, AppError> {
  let item = cart_service::update_item_quantity(
    app_state.store.as_ref(),
    auth_user.user_id,
    path.into_inner(),
    payload.quantity,
  )
  .await?;
  Ok(HttpResponse::Ok().json(item))
}

#[instrument(name = "handler::remove_cart_item", skip(app_state, auth_user), fields(user_id = %auth_user.user_id))]
pub async fn remove_cart_item_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  cart_service::remove_item(app_state.store.as_ref(), auth_user.user_id, path.into_inner()).await?;
  Ok(HttpResponse::NoContent().finish())
}
