// storefront/src/lib.rs

//! Storefront backend: catalog, carts, checkout, orders and reviews behind
//! a JSON API.

pub mod config;
pub mod errors;
pub mod models;
pub mod pipelines;
pub mod services;
pub mod state;
pub mod store;
pub mod web;

use crate::config::{AppConfig, LogFormat, StoreBackend};
use crate::errors::{AppError, Result};
use crate::services::auth_service::TokenService;
use crate::services::rate_limit::{RateLimiter, WindowedRateLimiter};
use crate::state::AppState;
use crate::store::{MemoryStore, PgStore, Store};
use shopflow::FlowRegistry;
use std::sync::Arc;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

/// Installs the global tracing subscriber. `RUST_LOG` overrides the default
/// `info` level.
pub fn init_tracing(format: LogFormat) {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
  let builder = tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_span_events(FmtSpan::CLOSE);
  match format {
    LogFormat::Json => builder.json().init(),
    LogFormat::Pretty => builder.init(),
  }
}

/// Opens the configured store backend, applying the bootstrap schema first
/// when asked to.
pub async fn open_store(config: &AppConfig) -> Result<Arc<dyn Store>> {
  match config.store_backend {
    StoreBackend::Memory => {
      tracing::warn!("Using the in-memory store; data is lost on shutdown.");
      Ok(Arc::new(MemoryStore::new()))
    }
    StoreBackend::Postgres => {
      let url = config
        .database_url
        .as_deref()
        .ok_or_else(|| AppError::Config("DATABASE_URL is not set".to_string()))?;
      let pg = PgStore::connect(url, config.database_max_connections).await?;
      if config.apply_schema {
        pg.apply_schema().await?;
      }
      Ok(Arc::new(pg))
    }
  }
}

/// Wires the shared application state around an opened store and
/// registers every pipeline.
pub fn build_state(config: &AppConfig, store: Arc<dyn Store>) -> AppState {
  let flows = Arc::new(FlowRegistry::<AppError>::new());
  pipelines::register_all_pipelines(&flows);

  let tokens = TokenService::new(config.jwt_secret.as_bytes(), config.jwt_ttl);
  let review_limiter: Arc<dyn RateLimiter> = Arc::new(WindowedRateLimiter::new(
    config.review_rate_limit,
    config.review_rate_window,
  ));

  AppState {
    store,
    flows,
    tokens,
    review_limiter,
  }
}
