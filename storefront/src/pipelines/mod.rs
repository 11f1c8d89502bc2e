// storefront/src/pipelines/mod.rs

//! The multi-step workflows of the service, declared as `shopflow`
//! pipelines and registered once at startup.

use crate::errors::AppError;
use shopflow::FlowRegistry;

pub mod contexts;

pub mod checkout_pipeline;
pub mod signin_pipeline;
pub mod signup_pipeline;

pub fn register_all_pipelines(registry: &FlowRegistry<AppError>) {
  tracing::info!("Registering pipelines...");

  signup_pipeline::register_signup_pipeline(registry);
  signin_pipeline::register_signin_pipeline(registry);
  checkout_pipeline::register_checkout_pipeline(registry);

  tracing::info!("All application pipelines registered.");
}
