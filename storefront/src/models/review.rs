// storefront/src/models/review.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

pub const MIN_RATING: i32 = 1;
pub const MAX_RATING: i32 = 5;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Review {
  pub id: Uuid,
  pub product_id: Uuid,
  pub user_id: Uuid,
  pub title: String,
  pub description: String,
  pub rating: i32,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct ReviewWithAuthor {
  #[serde(flatten)]
  #[sqlx(flatten)]
  pub review: Review,
  pub author_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewReview {
  pub title: String,
  pub description: String,
  pub rating: i32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReviewPatch {
  pub title: Option<String>,
  pub description: Option<String>,
  pub rating: Option<i32>,
}

pub fn rating_in_range(rating: i32) -> bool {
  (MIN_RATING..=MAX_RATING).contains(&rating)
}
