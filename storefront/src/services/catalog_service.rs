// storefront/src/services/catalog_service.rs

use crate::errors::{AppError, Result};
use crate::models::{NewProduct, Product, ProductFilter, ProductPage, ProductPatch, ProductWithReviews};
use crate::store::Store;
use serde::Deserialize;
use tracing::{info, instrument, warn};
use uuid::Uuid;

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Query string of the catalog listing. Prices are in cents.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductQuery {
  pub page: Option<i64>,
  pub limit: Option<i64>,
  pub min_price: Option<i64>,
  pub max_price: Option<i64>,
  pub category: Option<String>,
}

fn require_text(field: &str, value: &str) -> Result<()> {
  if value.trim().is_empty() {
    return Err(AppError::Validation(format!("Product {} is required.", field)));
  }
  Ok(())
}

fn validate_new_product(product: &NewProduct) -> Result<()> {
  require_text("name", &product.name)?;
  require_text("description", &product.description)?;
  require_text("category", &product.category)?;
  if product.price_cents <= 0 {
    return Err(AppError::Validation(format!(
      "Price of '{}' must be greater than zero.",
      product.name
    )));
  }
  if product.stock <= 0 {
    return Err(AppError::Validation(format!(
      "Initial stock of '{}' must be greater than zero.",
      product.name
    )));
  }
  Ok(())
}

#[instrument(name = "catalog::create_products", skip(store, products), fields(count = products.len()), err(Display))]
pub async fn create_products(store: &dyn Store, products: Vec<NewProduct>) -> Result<Vec<Product>> {
  if products.is_empty() {
    return Err(AppError::Validation("At least one product is required.".to_string()));
  }
  for product in &products {
    validate_new_product(product)?;
  }
  let created = store.insert_products(products).await?;
  info!(count = created.len(), "Products created.");
  Ok(created)
}

#[instrument(name = "catalog::get_product", skip(store), err(Display))]
pub async fn get_product(store: &dyn Store, product_id: Uuid) -> Result<ProductWithReviews> {
  let product = store
    .product_by_id(product_id)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Product {} not found.", product_id)))?;
  let reviews = store.reviews_for_product(product_id).await?;
  Ok(ProductWithReviews { product, reviews })
}

#[instrument(name = "catalog::list_products", skip(store), err(Display))]
pub async fn list_products(store: &dyn Store, query: ProductQuery) -> Result<ProductPage> {
  let limit = match query.limit {
    Some(limit) if limit >= 1 => limit.min(MAX_PAGE_SIZE),
    Some(limit) => return Err(AppError::Validation(format!("Invalid limit {}.", limit))),
    None => DEFAULT_PAGE_SIZE,
  };
  let requested_page = query.page.unwrap_or(1).max(1);

  for price in [query.min_price, query.max_price].into_iter().flatten() {
    if price < 0 {
      return Err(AppError::Validation("Price bounds cannot be negative.".to_string()));
    }
  }
  if let (Some(min), Some(max)) = (query.min_price, query.max_price) {
    if min > max {
      return Err(AppError::Validation("min_price cannot exceed max_price.".to_string()));
    }
  }

  let filter = ProductFilter {
    min_price_cents: query.min_price,
    max_price_cents: query.max_price,
    category: query.category.filter(|c| !c.trim().is_empty()),
  };

  let offset = (requested_page - 1).saturating_mul(limit);
  let (mut products, total_items) = store.list_products(&filter, limit, offset).await?;
  let total_pages = ((total_items + limit - 1) / limit).max(1);
  let current_page = requested_page.min(total_pages);

  // A page past the end falls back to the last page.
  if current_page != requested_page {
    let (last_page, _) = store.list_products(&filter, limit, (current_page - 1) * limit).await?;
    products = last_page;
  }

  Ok(ProductPage {
    products,
    total_items,
    total_pages,
    current_page,
  })
}

#[instrument(name = "catalog::update_product", skip(store, patch), err(Display))]
pub async fn update_product(store: &dyn Store, product_id: Uuid, patch: ProductPatch) -> Result<Product> {
  if patch.is_empty() {
    return Err(AppError::Validation("No fields to update.".to_string()));
  }
  for (field, value) in [
    ("name", &patch.name),
    ("description", &patch.description),
    ("category", &patch.category),
  ] {
    if let Some(value) = value {
      require_text(field, value)?;
    }
  }
  if patch.price_cents.is_some_and(|price| price <= 0) {
    return Err(AppError::Validation("Price must be greater than zero.".to_string()));
  }
  if patch.stock.is_some_and(|stock| stock < 0) {
    return Err(AppError::Validation("Stock cannot be negative.".to_string()));
  }

  let updated = store
    .update_product(product_id, &patch)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("Product {} not found.", product_id)))?;
  info!(%product_id, "Product updated.");
  Ok(updated)
}

#[instrument(name = "catalog::delete_product", skip(store), err(Display))]
pub async fn delete_product(store: &dyn Store, product_id: Uuid) -> Result<()> {
  if !store.delete_product(product_id).await? {
    warn!(%product_id, "Delete of unknown product.");
    return Err(AppError::NotFound(format!("Product {} not found.", product_id)));
  }
  info!(%product_id, "Product deleted.");
  Ok(())
}
