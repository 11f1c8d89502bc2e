// storefront/src/web/routes.rs

use actix_web::{web, HttpResponse};

use crate::errors::AppError;
use crate::web::handlers::{auth_handlers, cart_handlers, order_handlers, product_handlers, review_handlers};

async fn health_check_handler() -> HttpResponse {
  HttpResponse::Ok().json(serde_json::json!({ "status": "ok" }))
}

// Malformed bodies, queries and path ids surface as validation errors with
// the same JSON shape as every other error.
fn json_config() -> web::JsonConfig {
  web::JsonConfig::default().error_handler(|err, _req| AppError::Validation(err.to_string()).into())
}

fn query_config() -> web::QueryConfig {
  web::QueryConfig::default().error_handler(|err, _req| AppError::Validation(err.to_string()).into())
}

fn path_config() -> web::PathConfig {
  web::PathConfig::default().error_handler(|err, _req| AppError::Validation(err.to_string()).into())
}

pub fn configure_app_routes(cfg: &mut web::ServiceConfig) {
  cfg.service(
    web::scope("/api/v1")
      .app_data(json_config())
      .app_data(query_config())
      .app_data(path_config())
      .route("/health", web::get().to(health_check_handler))
      // Authentication
      .route("/register", web::post().to(auth_handlers::register_handler))
      .route("/login", web::post().to(auth_handlers::login_handler))
      .route("/logout", web::post().to(auth_handlers::logout_handler))
      // Catalog and reviews
      .service(
        web::scope("/products")
          .route("", web::get().to(product_handlers::list_products_handler))
          .route("", web::post().to(product_handlers::create_products_handler))
          .route("/{product_id}", web::get().to(product_handlers::get_product_handler))
          .route("/{product_id}", web::patch().to(product_handlers::update_product_handler))
          .route("/{product_id}", web::delete().to(product_handlers::delete_product_handler))
          .route("/{product_id}/reviews", web::get().to(review_handlers::list_reviews_handler))
          .route("/{product_id}/reviews", web::post().to(review_handlers::submit_review_handler))
          .route(
            "/{product_id}/reviews/{review_id}",
            web::patch().to(review_handlers::update_review_handler),
          )
          .route(
            "/{product_id}/reviews/{review_id}",
            web::delete().to(review_handlers::delete_review_handler),
          ),
      )
      // Cart
      .service(
        web::scope("/cart")
          .route("", web::get().to(cart_handlers::view_cart_handler))
          .route("/{product_id}", web::post().to(cart_handlers::add_to_cart_handler))
          .route("/{product_id}", web::patch().to(cart_handlers::update_cart_item_handler))
          .route("/{product_id}", web::delete().to(cart_handlers::remove_cart_item_handler)),
      )
      // Checkout and orders
      .route("/checkout", web::post().to(order_handlers::checkout_handler))
      .service(
        web::scope("/orders")
          .route("", web::get().to(order_handlers::order_history_handler))
          .route("/{order_id}", web::get().to(order_handlers::get_order_handler))
          .route("/{order_id}/ship", web::post().to(order_handlers::ship_order_handler))
          .route("/{order_id}/cancel", web::post().to(order_handlers::cancel_order_handler)),
      ),
  );
}
