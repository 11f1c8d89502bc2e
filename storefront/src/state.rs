// storefront/src/state.rs

use crate::errors::AppError;
use crate::services::auth_service::TokenService;
use crate::services::rate_limit::RateLimiter;
use crate::store::Store;
use shopflow::FlowRegistry;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
  pub store: Arc<dyn Store>,
  pub flows: Arc<FlowRegistry<AppError>>,
  pub tokens: TokenService,
  pub review_limiter: Arc<dyn RateLimiter>,
}
