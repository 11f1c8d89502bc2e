// storefront/src/web/handlers/product_handlers.rs

use actix_web::{web, HttpResponse};
use tracing::instrument;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{NewProduct, ProductPatch};
use crate::services::catalog_service::{self, ProductQuery};
use crate::state::AppState;
use crate::web::extractors::AdminUser;

#[instrument(name = "handler::list_products", skip(app_state))]
pub async fn list_products_handler(
  app_state: web::Data<AppState>,
  query: web::Query<ProductQuery>,
) -> Result<HttpResponse, AppError> {
  let page = catalog_service::list_products(app_state.store.as_ref(), query.into_inner()).await?;
  Ok(HttpResponse::Ok().json(page))
}

#[instrument(name = "handler::get_product", skip(app_state))]
pub async fn get_product_handler(
  app_state: web::Data<AppState>,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  let product = catalog_service::get_product(app_state.store.as_ref(), path.into_inner()).await?;
  Ok(HttpResponse::Ok().json(product))
}

#[instrument(name = "handler::create_products", skip(app_state, admin, payload), fields(admin_id = %admin.0.user_id))]
pub async fn create_products_handler(
  app_state: web::Data<AppState>,
  admin: AdminUser,
  payload: web::Json<Vec<NewProduct>>,
) -> Result<HttpResponse, AppError> {
  let created = catalog_service::create_products(app_state.store.as_ref(), payload.into_inner()).await?;
  Ok(HttpResponse::Created().json(created))
}

#[instrument(name = "handler::update_product", skip(app_state, admin, payload), fields(admin_id = %admin.0.user_id))]
pub async fn update_product_handler(
  app_state: web::Data<AppState>,
  admin: AdminUser,
  path: web::Path<Uuid>,
  payload: web::Json<ProductPatch>,
) -> Result<HttpResponse, AppError> {
  let updated =
    catalog_service::update_product(app_state.store.as_ref(), path.into_inner(), payload.into_inner()).await?;
  Ok(HttpResponse::Ok().json(updated))
}

#[instrument(name = "handler::delete_product", skip(app_state, admin), fields(admin_id = %admin.0.user_id))]
pub async fn delete_product_handler(
  app_state: web::Data<AppState>,
  admin: AdminUser,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  catalog_service::delete_product(app_state.store.as_ref(), path.into_inner()).await?;
  Ok(HttpResponse::NoContent().finish())
}
