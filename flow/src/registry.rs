// shopflow/src/registry.rs

//! `FlowRegistry<E>`: pipelines keyed by their context data type.
//!
//! An application registers one pipeline per context type at startup and
//! later runs whichever pipeline matches the `ContextData<T>` it builds for
//! a request. Every run reports errors as the application error type `E`.

use crate::core::context_data::ContextData;
use crate::core::control::PipelineResult;
use crate::error::FlowError;
use crate::pipeline::definition::Pipeline;

use async_trait::async_trait;
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{event, instrument, Level};

#[async_trait]
trait ErasedRunner<E>: Send + Sync
where
  E: std::error::Error + Send + Sync + 'static,
{
  fn pipeline_name(&self) -> &str;

  async fn run_erased(&self, ctx: Box<dyn Any + Send>) -> Result<PipelineResult, E>;
}

struct TypedRunner<TData, HandlerErr, E>
where
  TData: Send + Sync + 'static,
  HandlerErr: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  pipeline: Pipeline<TData, HandlerErr>,
  _app_err: PhantomData<fn() -> E>,
}

#[async_trait]
impl<TData, HandlerErr, E> ErasedRunner<E> for TypedRunner<TData, HandlerErr, E>
where
  TData: Send + Sync + 'static,
  HandlerErr: std::error::Error + From<FlowError> + Send + Sync + 'static,
  E: std::error::Error + From<HandlerErr> + From<FlowError> + Send + Sync + 'static,
{
  fn pipeline_name(&self) -> &str {
    self.pipeline.name()
  }

  async fn run_erased(&self, ctx: Box<dyn Any + Send>) -> Result<PipelineResult, E> {
    let typed = ctx.downcast::<ContextData<TData>>().map_err(|_| {
      E::from(FlowError::TypeMismatch {
        site: "FlowRegistry::run".to_string(),
        expected_type: std::any::type_name::<ContextData<TData>>().to_string(),
      })
    })?;
    self.pipeline.run(*typed).await.map_err(E::from)
  }
}

/// Type-keyed pipeline registry. Cheap to share behind an `Arc`.
pub struct FlowRegistry<E = FlowError>
where
  E: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  runners: RwLock<HashMap<TypeId, Arc<dyn ErasedRunner<E>>>>,
}

impl<E> FlowRegistry<E>
where
  E: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  pub fn new() -> Self {
    Self {
      runners: RwLock::new(HashMap::new()),
    }
  }

  /// Registers `pipeline` for its context type, replacing any pipeline
  /// previously registered for the same type.
  pub fn register_pipeline<TData, HandlerErr>(&self, pipeline: Pipeline<TData, HandlerErr>)
  where
    TData: Send + Sync + 'static,
    HandlerErr: std::error::Error + From<FlowError> + Send + Sync + 'static,
    E: From<HandlerErr>,
  {
    let name = pipeline.name().to_string();
    let runner = TypedRunner::<TData, HandlerErr, E> {
      pipeline,
      _app_err: PhantomData,
    };
    let replaced = self
      .runners
      .write()
      .insert(TypeId::of::<TData>(), Arc::new(runner))
      .is_some();
    event!(Level::DEBUG, pipeline = %name, replaced, "Pipeline registered.");
  }

  pub fn is_registered<TData: Send + Sync + 'static>(&self) -> bool {
    self.runners.read().contains_key(&TypeId::of::<TData>())
  }

  /// Runs the pipeline registered for `TData`.
  #[instrument(name = "FlowRegistry::run", skip_all, fields(context_type = %std::any::type_name::<TData>()))]
  pub async fn run<TData>(&self, ctx_data: ContextData<TData>) -> Result<PipelineResult, E>
  where
    TData: Send + Sync + 'static,
  {
    let runner = self.runners.read().get(&TypeId::of::<TData>()).cloned();
    let Some(runner) = runner else {
      let type_name = std::any::type_name::<TData>().to_string();
      event!(Level::ERROR, %type_name, "No pipeline registered for context type.");
      return Err(E::from(FlowError::PipelineNotRegistered { type_name }));
    };
    event!(Level::DEBUG, pipeline = runner.pipeline_name(), "Dispatching run.");
    runner.run_erased(Box::new(ctx_data)).await
  }
}

impl<E> Default for FlowRegistry<E>
where
  E: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  fn default() -> Self {
    Self::new()
  }
}
