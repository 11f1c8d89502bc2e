// storefront/src/services/review_service.rs

//! Product reviews. Every mutation is followed by a recomputation of the
//! product's rating aggregates from the stored reviews.

use crate::errors::{AppError, Result};
use crate::models::{rating_in_range, NewReview, Review, ReviewPatch, ReviewWithAuthor, UserRole, MAX_RATING, MIN_RATING};
use crate::services::rate_limit::RateLimiter;
use crate::store::{ReviewDraft, Store};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

fn validate_draft(draft: &ReviewDraft) -> Result<()> {
  if !rating_in_range(draft.rating) {
    return Err(AppError::Validation(format!(
      "Rating must be between {} and {}.",
      MIN_RATING, MAX_RATING
    )));
  }
  if draft.title.trim().is_empty() {
    return Err(AppError::Validation("Review title is required.".to_string()));
  }
  Ok(())
}

async fn require_product(store: &dyn Store, product_id: Uuid) -> Result<()> {
  match store.product_by_id(product_id).await? {
    Some(_) => Ok(()),
    None => Err(AppError::NotFound(format!("Product {} not found.", product_id))),
  }
}

/// Loads a review and checks it belongs to `product_id`.
async fn review_of_product(store: &dyn Store, product_id: Uuid, review_id: Uuid) -> Result<Review> {
  store
    .review_by_id(review_id)
    .await?
    .filter(|review| review.product_id == product_id)
    .ok_or_else(|| AppError::NotFound(format!("Review {} not found.", review_id)))
}

async fn refresh_aggregates(store: &dyn Store, product_id: Uuid) -> Result<()> {
  let (rating, review_count) = store.refresh_rating(product_id).await?;
  debug!(%product_id, rating, review_count, "Rating aggregates refreshed.");
  Ok(())
}

/// Creates the user's review of a product, or replaces it if one exists.
#[instrument(name = "reviews::submit_review", skip(store, limiter, review), err(Display))]
pub async fn submit_review(
  store: &dyn Store,
  limiter: &dyn RateLimiter,
  user_id: Uuid,
  product_id: Uuid,
  review: NewReview,
) -> Result<Review> {
  let draft = ReviewDraft {
    title: review.title,
    description: review.description,
    rating: review.rating,
  };
  validate_draft(&draft)?;
  require_product(store, product_id).await?;

  if !limiter.try_acquire(user_id) {
    return Err(AppError::RateLimited);
  }

  let saved = match store.review_by_user_for_product(user_id, product_id).await? {
    Some(existing) => store.update_review(existing.id, draft).await?,
    None => match store.insert_review(user_id, product_id, draft.clone()).await {
      Ok(created) => Some(created),
      // Lost a race with a concurrent first submission; overwrite it.
      Err(AppError::Conflict(_)) => match store.review_by_user_for_product(user_id, product_id).await? {
        Some(existing) => store.update_review(existing.id, draft).await?,
        None => None,
      },
      Err(other) => return Err(other),
    },
  };
  let saved = saved.ok_or_else(|| AppError::Internal("Review vanished while being saved.".to_string()))?;

  refresh_aggregates(store, product_id).await?;
  info!(review_id = %saved.id, %product_id, "Review saved.");
  Ok(saved)
}

#[instrument(name = "reviews::update_review", skip(store, patch), err(Display))]
pub async fn update_review(
  store: &dyn Store,
  user_id: Uuid,
  product_id: Uuid,
  review_id: Uuid,
  patch: ReviewPatch,
) -> Result<Review> {
  let current = review_of_product(store, product_id, review_id).await?;
  if current.user_id != user_id {
    warn!(%review_id, %user_id, "Update of someone else's review refused.");
    return Err(AppError::Forbidden("Only the author can edit this review.".to_string()));
  }

  let draft = ReviewDraft {
    title: patch.title.unwrap_or(current.title),
    description: patch.description.unwrap_or(current.description),
    rating: patch.rating.unwrap_or(current.rating),
  };
  validate_draft(&draft)?;

  let updated = store
    .update_review(review_id, draft)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Review {} not found.", review_id)))?;
  refresh_aggregates(store, product_id).await?;
  info!(%review_id, "Review updated.");
  Ok(updated)
}

/// The author or an admin may delete a review.
#[instrument(name = "reviews::delete_review", skip(store), err(Display))]
pub async fn delete_review(
  store: &dyn Store,
  user_id: Uuid,
  role: UserRole,
  product_id: Uuid,
  review_id: Uuid,
) -> Result<()> {
  let current = review_of_product(store, product_id, review_id).await?;
  if current.user_id != user_id && role != UserRole::Admin {
    warn!(%review_id, %user_id, "Delete of someone else's review refused.");
    return Err(AppError::Forbidden("Only the author can delete this review.".to_string()));
  }
  if !store.delete_review(review_id).await? {
    return Err(AppError::NotFound(format!("Review {} not found.", review_id)));
  }
  refresh_aggregates(store, product_id).await?;
  info!(%review_id, "Review deleted.");
  Ok(())
}

#[instrument(name = "reviews::list_reviews", skip(store), err(Display))]
pub async fn list_reviews(store: &dyn Store, product_id: Uuid) -> Result<Vec<ReviewWithAuthor>> {
  require_product(store, product_id).await?;
  store.reviews_for_product(product_id).await
}
