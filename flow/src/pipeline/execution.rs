// shopflow/src/pipeline/execution.rs

//! `Pipeline::run`: walks the steps in order and drives their handlers.

use crate::core::context_data::ContextData;
use crate::core::control::{PipelineControl, PipelineResult};
use crate::core::handler::{FailedStep, Handler};
use crate::core::step::StepDef;
use crate::error::FlowError;
use crate::pipeline::definition::Pipeline;
use std::time::Instant;
use tracing::{event, instrument, span, Instrument, Level};

enum StepOutcome {
  Continue,
  Stopped,
}

impl<TData, Err> Pipeline<TData, Err>
where
  TData: Send + Sync + 'static,
  Err: std::error::Error + From<FlowError> + Send + Sync + 'static,
{
  /// Executes every step against `ctx_data`.
  ///
  /// On the first error the failure hooks run (in registration order) and
  /// the error is returned. A handler returning [`PipelineControl::Stop`]
  /// ends the run with [`PipelineResult::Stopped`] without firing hooks.
  ///
  /// Dropping the returned future abandons the run between awaits; whatever
  /// the context owns is dropped with its last handle.
  #[instrument(
    name = "Pipeline::run",
    skip_all,
    fields(pipeline = %self.name, num_steps = self.steps.len()),
    err(Display)
  )]
  pub async fn run(&self, ctx_data: ContextData<TData>) -> Result<PipelineResult, Err> {
    let started = Instant::now();
    for (step_idx, step_def) in self.steps.iter().enumerate() {
      let step_span = span!(
        Level::INFO,
        "pipeline_step",
        step_name = step_def.name.as_str(),
        step_index = step_idx,
        optional = step_def.optional
      );
      let outcome = self.run_step(step_def, ctx_data.clone()).instrument(step_span).await;
      match outcome {
        Ok(StepOutcome::Continue) => {}
        Ok(StepOutcome::Stopped) => {
          event!(Level::INFO, step = %step_def.name, "Pipeline stopped by a handler.");
          return Ok(PipelineResult::Stopped);
        }
        Err(e) => {
          event!(Level::WARN, step = %step_def.name, error = %e, "Step failed; running failure hooks.");
          self
            .fire_failure_hooks(
              &ctx_data,
              FailedStep {
                step_name: step_def.name.clone(),
                error: e.to_string(),
              },
            )
            .await;
          return Err(e);
        }
      }
    }
    event!(
      Level::DEBUG,
      elapsed_ms = started.elapsed().as_millis() as u64,
      "Pipeline completed."
    );
    Ok(PipelineResult::Completed)
  }

  async fn run_step(&self, step_def: &StepDef<TData>, ctx_data: ContextData<TData>) -> Result<StepOutcome, Err> {
    if let Some(skip_if) = &step_def.skip_if {
      if skip_if(ctx_data.clone()) {
        event!(Level::DEBUG, "Step skipped by its skip condition.");
        return Ok(StepOutcome::Continue);
      }
    }

    let name = step_def.name.as_str();
    let phases = [
      ("before", self.before.get(name)),
      ("on", self.on.get(name)),
      ("after", self.after.get(name)),
    ];

    let handler_count: usize = phases.iter().map(|(_, hs)| hs.map_or(0, Vec::len)).sum();
    if handler_count == 0 {
      if step_def.optional {
        event!(Level::DEBUG, "Optional step has no handlers; skipping.");
        return Ok(StepOutcome::Continue);
      }
      event!(Level::ERROR, "Required step has no handlers.");
      return Err(Err::from(FlowError::HandlerMissing {
        step_name: step_def.name.clone(),
      }));
    }

    let started = Instant::now();
    for (phase, handlers) in phases {
      let Some(handlers) = handlers else { continue };
      if let StepOutcome::Stopped = run_handlers(phase, handlers, &ctx_data).await? {
        return Ok(StepOutcome::Stopped);
      }
    }
    event!(
      Level::DEBUG,
      elapsed_ms = started.elapsed().as_millis() as u64,
      "Step finished."
    );
    Ok(StepOutcome::Continue)
  }

  async fn fire_failure_hooks(&self, ctx_data: &ContextData<TData>, failed: FailedStep) {
    for hook in &self.failure_hooks {
      hook(ctx_data.clone(), failed.clone()).await;
    }
  }
}

async fn run_handlers<TData, Err>(
  phase: &'static str,
  handlers: &[Handler<TData, Err>],
  ctx_data: &ContextData<TData>,
) -> Result<StepOutcome, Err>
where
  TData: Send + Sync + 'static,
  Err: std::error::Error + Send + Sync + 'static,
{
  for (handler_idx, handler_fn) in handlers.iter().enumerate() {
    let handler_span = span!(Level::DEBUG, "step_handler", phase, handler_index = handler_idx);
    match handler_fn(ctx_data.clone()).instrument(handler_span).await {
      Ok(PipelineControl::Continue) => {}
      Ok(PipelineControl::Stop) => return Ok(StepOutcome::Stopped),
      Err(e) => {
        event!(Level::ERROR, phase, error = %e, "Handler failed.");
        return Err(e);
      }
    }
  }
  Ok(StepOutcome::Continue)
}
