// storefront/src/web/handlers/review_handlers.rs

use actix_web::{web, HttpResponse};
use tracing::instrument;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{NewReview, ReviewPatch};
use crate::services::review_service;
use crate::state::AppState;
use crate::web::extractors::AuthenticatedUser;

#[instrument(name = "handler::list_reviews", skip(app_state))]
pub async fn list_reviews_handler(
  app_state: web::Data<AppState>,
  path: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
  let reviews = review_service::list_reviews(app_state.store.as_ref(), path.into_inner()).await?;
  Ok(HttpResponse::Ok().json(reviews))
}

#[instrument(name = "handler::submit_review", skip(app_state, auth_user, payload), fields(user_id = %auth_user.user_id))]
pub async fn submit_review_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  path: web::Path<Uuid>,
  payload: web::Json<NewReview>,
) -> Result<HttpResponse, AppError> {
  let review = review_service::submit_review(
    app_state.store.as_ref(),
    app_state.review_limiter.as_ref(),
    auth_user.user_id,
    path.into_inner(),
    payload.into_inner(),
  )
  .await?;
  Ok(HttpResponse::Created().json(review))
}

#[instrument(name = "handler::update_review", skip(app_state, auth_user, payload), fields(user_id = %auth_user.user_id))]
pub async fn update_review_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  path: web::Path<(Uuid, Uuid)>,
  payload: web::Json<ReviewPatch>,
) -> Result<HttpResponse, AppError> {
  let (product_id, review_id) = path.into_inner();
  let review = review_service::update_review(
    app_state.store.as_ref(),
    auth_user.user_id,
    product_id,
    review_id,
    payload.into_inner(),
  )
  .await?;
  Ok(HttpResponse::Ok().json(review))
}

#[instrument(name = "handler::delete_review", skip(app_state, auth_user), fields(user_id = %auth_user.user_id))]
pub async fn delete_review_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
  path: web::Path<(Uuid, Uuid)>,
) -> Result<HttpResponse, AppError> {
  let (product_id, review_id) = path.into_inner();
  review_service::delete_review(
    app_state.store.as_ref(),
    auth_user.user_id,
    auth_user.role,
    product_id,
    review_id,
  )
  .await?;
  Ok(HttpResponse::NoContent().finish())
}
