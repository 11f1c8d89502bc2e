// shopflow/src/core/handler.rs

//! Boxed handler and hook types stored by a [`Pipeline`](crate::Pipeline).

use crate::core::context_data::ContextData;
use crate::core::control::PipelineControl;
use std::future::Future;
use std::pin::Pin;

/// Future produced by a step handler.
pub type StepFuture<Err> = Pin<Box<dyn Future<Output = Result<PipelineControl, Err>> + Send>>;

/// A step handler: receives a handle to the run's context and resolves to a
/// [`PipelineControl`] or the pipeline's error type.
pub type Handler<TData, Err> = Box<dyn Fn(ContextData<TData>) -> StepFuture<Err> + Send + Sync>;

/// Describes the handler failure that aborted a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedStep {
  pub step_name: String,
  /// `Display` rendering of the error. The error value itself is returned to
  /// the caller of `run`, so hooks only get its description.
  pub error: String,
}

/// Cleanup hook run after a handler error, before the error is returned.
/// Hooks cannot fail; they are expected to log their own problems.
pub type FailureHook<TData> =
  Box<dyn Fn(ContextData<TData>, FailedStep) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;
