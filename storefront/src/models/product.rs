// storefront/src/models/product.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::review::ReviewWithAuthor;

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Product {
  pub id: Uuid,
  pub name: String,
  pub description: String,
  pub category: String,
  /// Free-form attributes supplied by the catalog admin.
  pub data: Option<String>,
  pub price_cents: i64,
  pub stock: i32,
  pub rating: f64,
  pub review_count: i64,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewProduct {
  pub name: String,
  pub description: String,
  pub category: String,
  #[serde(default)]
  pub data: Option<String>,
  pub price_cents: i64,
  pub stock: i32,
}

/// Partial update; absent fields keep their stored value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductPatch {
  pub name: Option<String>,
  pub description: Option<String>,
  pub category: Option<String>,
  pub data: Option<String>,
  pub price_cents: Option<i64>,
  pub stock: Option<i32>,
}

impl ProductPatch {
  pub fn is_empty(&self) -> bool {
    self.name.is_none()
      && self.description.is_none()
      && self.category.is_none()
      && self.data.is_none()
      && self.price_cents.is_none()
      && self.stock.is_none()
  }

  pub fn apply_to(&self, product: &mut Product) {
    if let Some(name) = &self.name {
      product.name = name.clone();
    }
    if let Some(description) = &self.description {
      product.description = description.clone();
    }
    if let Some(category) = &self.category {
      product.category = category.clone();
    }
    if let Some(data) = &self.data {
      product.data = Some(data.clone());
    }
    if let Some(price_cents) = self.price_cents {
      product.price_cents = price_cents;
    }
    if let Some(stock) = self.stock {
      product.stock = stock;
    }
  }
}

/// Listing filter. Price bounds are inclusive, category matching ignores case.
#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
  pub min_price_cents: Option<i64>,
  pub max_price_cents: Option<i64>,
  pub category: Option<String>,
}

impl ProductFilter {
  pub fn matches(&self, product: &Product) -> bool {
    self.min_price_cents.map_or(true, |min| product.price_cents >= min)
      && self.max_price_cents.map_or(true, |max| product.price_cents <= max)
      && self
        .category
        .as_deref()
        .map_or(true, |category| product.category.eq_ignore_ascii_case(category))
  }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductPage {
  pub products: Vec<Product>,
  pub total_items: i64,
  pub total_pages: i64,
  pub current_page: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductWithReviews {
  #[serde(flatten)]
  pub product: Product,
  pub reviews: Vec<ReviewWithAuthor>,
}
