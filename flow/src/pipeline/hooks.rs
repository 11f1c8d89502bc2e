// shopflow/src/pipeline/hooks.rs

//! Handler registration: `before`/`on`/`after` per step, plus failure hooks
//! for the whole pipeline.

use crate::core::context_data::ContextData;
use crate::core::control::PipelineControl;
use crate::core::handler::{FailedStep, FailureHook, Handler};
use crate::error::FlowError;
use crate::pipeline::definition::Pipeline;
use std::collections::HashMap;
use std::future::Future;
use tracing::{event, Level};

#[derive(Clone, Copy, Debug)]
enum Phase {
  Before,
  On,
  After,
}

impl<TData, Err> Pipeline<TData, Err>
where
  TData: Send + Sync + 'static,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  fn phase_map(&mut self, phase: Phase) -> &mut HashMap<String, Vec<Handler<TData, Err>>> {
    match phase {
      Phase::Before => &mut self.before,
      Phase::On => &mut self.on,
      Phase::After => &mut self.after,
    }
  }

  fn push_handler<F, E>(
    &mut self,
    phase: Phase,
    step_name: &str,
    handler_fn: impl Fn(ContextData<TData>) -> F + Send + Sync + 'static,
  ) where
    F: Future<Output = Result<PipelineControl, E>> + Send + 'static,
    E: Into<Err> + Send + 'static,
  {
    self.require_step(step_name);
    let boxed: Handler<TData, Err> = Box::new(move |ctx| {
      let fut = handler_fn(ctx);
      Box::pin(async move { fut.await.map_err(Into::into) })
    });
    self.phase_map(phase).entry(step_name.to_string()).or_default().push(boxed);
    event!(Level::TRACE, pipeline = %self.name, step = step_name, ?phase, "Handler registered.");
  }

  /// Adds a handler that runs before the step's `on` handlers.
  ///
  /// The handler's error type only needs to convert into the pipeline's
  /// `Err`, so handlers may return `FlowError`, `anyhow`-backed errors, or
  /// the application error directly.
  pub fn before_root<F, E>(
    &mut self,
    step_name: &str,
    handler_fn: impl Fn(ContextData<TData>) -> F + Send + Sync + 'static,
  ) where
    F: Future<Output = Result<PipelineControl, E>> + Send + 'static,
    E: Into<Err> + Send + 'static,
  {
    self.push_handler(Phase::Before, step_name, handler_fn);
  }

  /// Adds a main handler for the step.
  pub fn on_root<F, E>(
    &mut self,
    step_name: &str,
    handler_fn: impl Fn(ContextData<TData>) -> F + Send + Sync + 'static,
  ) where
    F: Future<Output = Result<PipelineControl, E>> + Send + 'static,
    E: Into<Err> + Send + 'static,
  {
    self.push_handler(Phase::On, step_name, handler_fn);
  }

  /// Adds a handler that runs once the step's `on` handlers have continued.
  pub fn after_root<F, E>(
    &mut self,
    step_name: &str,
    handler_fn: impl Fn(ContextData<TData>) -> F + Send + Sync + 'static,
  ) where
    F: Future<Output = Result<PipelineControl, E>> + Send + 'static,
    E: Into<Err> + Send + 'static,
  {
    self.push_handler(Phase::After, step_name, handler_fn);
  }

  /// Registers a hook that runs, in registration order, whenever a run
  /// fails (a handler error or a required step without handlers). The error
  /// is returned to the caller after every hook finished.
  pub fn on_failure<F>(&mut self, hook: impl Fn(ContextData<TData>, FailedStep) -> F + Send + Sync + 'static)
  where
    F: Future<Output = ()> + Send + 'static,
  {
    let boxed: FailureHook<TData> = Box::new(move |ctx, failed| Box::pin(hook(ctx, failed)));
    self.failure_hooks.push(boxed);
  }
}
