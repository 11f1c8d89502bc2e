// shopflow/src/core/control.rs

//! Flow-control signals returned by handlers and the outcome of a run.

/// Returned by every handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineControl {
  /// Run the next handler (or step).
  Continue,
  /// Halt the run here. Remaining handlers and steps are not executed and
  /// failure hooks do not fire; the run reports [`PipelineResult::Stopped`].
  Stop,
}

/// Outcome of a run that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineResult {
  Completed,
  Stopped,
}

impl PipelineResult {
  pub fn is_completed(self) -> bool {
    matches!(self, PipelineResult::Completed)
  }
}
