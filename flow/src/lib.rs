// shopflow/src/lib.rs

//! shopflow: small async step pipelines for request workflows.
//!
//! A workflow is declared as an ordered list of named steps. Each step can
//! carry `before`, `on` and `after` handlers that operate on a shared
//! [`ContextData`]. Handlers decide whether the pipeline continues or stops,
//! and any handler error aborts the run after the pipeline's failure hooks
//! have been given a chance to clean up (roll back a transaction, release a
//! reservation, ...).
//!
//! ```ignore
//! let mut p = Pipeline::<CheckoutCtx, AppError>::new(&[
//!   ("begin", false, None),
//!   ("reserve", false, None),
//! ]);
//! p.on_root("begin", |ctx| Box::pin(async move { /* ... */ Ok(PipelineControl::Continue) }));
//! p.on_failure(|ctx, failed| Box::pin(async move { /* rollback */ }));
//!
//! let registry = FlowRegistry::<AppError>::new();
//! registry.register_pipeline(p);
//! registry.run(ContextData::new(ctx)).await?;
//! ```

pub mod core;
pub mod error;
pub mod pipeline;
pub mod registry;

pub use crate::core::context_data::ContextData;
pub use crate::core::control::{PipelineControl, PipelineResult};
pub use crate::core::handler::{FailedStep, FailureHook, Handler, StepFuture};
pub use crate::core::step::{SkipCondition, StepDef};

pub use crate::pipeline::definition::Pipeline;

pub use crate::error::{FlowError, FlowResult};

pub use crate::registry::FlowRegistry;
