// storefront/src/services/mod.rs

//! Business operations behind the HTTP handlers. Functions take the store
//! (and whatever else they need) explicitly so they can be driven without a
//! web server.

pub mod auth_service;
pub mod cart_service;
pub mod catalog_service;
pub mod order_service;
pub mod rate_limit;
pub mod review_service;
