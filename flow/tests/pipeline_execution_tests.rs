// tests/pipeline_execution_tests.rs
mod common;

use common::*;
use shopflow::{ContextData, FailedStep, FlowError, Pipeline, PipelineControl, PipelineResult};
use serial_test::serial;
use std::sync::atomic::Ordering;
use std::sync::Arc;

#[tokio::test]
#[serial]
async fn test_pipeline_runs_steps_in_order() {
  setup_tracing();
  let mut pipeline =
    Pipeline::<TestContext, TestError>::new(&[("step1", false, None), ("step2", false, None), ("step3", false, None)]);

  pipeline.on_root("step1", create_simple_handler("step1", " S1"));
  pipeline.on_root("step2", create_simple_handler("step2", " S2"));
  pipeline.on_root("step3", create_simple_handler("step3", " S3"));

  let ctx = ContextData::new(TestContext::default());
  let result = pipeline.run(ctx.clone()).await;

  assert_eq!(result.unwrap(), PipelineResult::Completed);

  let guard = ctx.read();
  assert_eq!(guard.counter, 3);
  assert_eq!(guard.message, " S1 S2 S3");
  assert_eq!(guard.steps_executed, vec!["step1", "step2", "step3"]);
}

#[tokio::test]
#[serial]
async fn test_pipeline_stops_on_pipeline_control_stop() {
  setup_tracing();
  let mut pipeline = Pipeline::<TestContext, TestError>::new(&[
    ("stepA", false, None),
    ("stopStep", false, None),
    ("stepC", false, None),
  ]);

  pipeline.on_root("stepA", create_simple_handler("stepA", "A"));
  pipeline.on_root("stopStep", |ctx: ContextData<TestContext>| {
    Box::pin(async move {
      ctx.write().steps_executed.push("stopStep".to_string());
      Ok::<PipelineControl, FlowError>(PipelineControl::Stop)
    })
  });
  pipeline.on_root("stepC", create_simple_handler("stepC", "C"));

  let ctx = ContextData::new(TestContext::default());
  let result = pipeline.run(ctx.clone()).await;

  assert_eq!(result.unwrap(), PipelineResult::Stopped);

  let guard = ctx.read();
  assert_eq!(guard.counter, 1);
  assert_eq!(guard.message, "A");
  assert_eq!(guard.steps_executed, vec!["stepA", "stopStep"]);
}

#[tokio::test]
#[serial]
async fn test_pipeline_propagates_handler_error() {
  setup_tracing();
  let mut pipeline = Pipeline::<TestContext, TestError>::new(&[
    ("good_step", false, None),
    ("bad_step", false, None),
    ("another_step", false, None),
  ]);

  pipeline.on_root("good_step", create_simple_handler("good_step", "Good"));
  pipeline.on_root("bad_step", create_failing_handler("bad_step", "I am a bad step!"));
  pipeline.on_root("another_step", create_simple_handler("another_step", "NeverRun"));

  let ctx = ContextData::new(TestContext::default());
  let result = pipeline.run(ctx.clone()).await;

  assert_eq!(result.unwrap_err(), TestError::Handler("I am a bad step!".to_string()));

  let guard = ctx.read();
  assert_eq!(guard.counter, 1);
  assert_eq!(guard.message, "Good");
  assert_eq!(guard.steps_executed, vec!["good_step", "bad_step"]);
}

#[tokio::test]
#[serial]
async fn test_pipeline_skips_step_if_condition_met() {
  setup_tracing();
  let mut pipeline = Pipeline::<TestContext, TestError>::new(&[
    ("step1", false, None),
    (
      "step_to_skip",
      false,
      Some(Arc::new(|ctx: ContextData<TestContext>| ctx.read().counter > 0)),
    ),
    ("step3", false, None),
  ]);

  pipeline.on_root("step1", create_simple_handler("step1", " S1"));
  pipeline.on_root("step_to_skip", create_simple_handler("step_to_skip", " SKIPPED_THIS"));
  pipeline.on_root("step3", create_simple_handler("step3", " S3"));

  let ctx = ContextData::new(TestContext::default());
  let result = pipeline.run(ctx.clone()).await;

  assert_eq!(result.unwrap(), PipelineResult::Completed);
  let guard = ctx.read();
  assert_eq!(guard.counter, 2);
  assert_eq!(guard.message, " S1 S3");
  assert_eq!(guard.steps_executed, vec!["step1", "step3"]);
}

#[tokio::test]
#[serial]
async fn test_optional_step_missing_handler_succeeds() {
  setup_tracing();
  let pipeline = Pipeline::<TestContext, TestError>::new(&[("optional_step_no_handler", true, None)]);

  let ctx = ContextData::new(TestContext::default());
  let result = pipeline.run(ctx.clone()).await;

  assert_eq!(result.unwrap(), PipelineResult::Completed);
}

#[tokio::test]
#[serial]
async fn test_before_on_after_execution_order() {
  setup_tracing();
  let mut pipeline = Pipeline::<TestContext, TestError>::new(&[("main_step", false, None)]);

  pipeline.before_root("main_step", create_simple_handler("before_main", "Before;"));
  pipeline.on_root("main_step", create_simple_handler("on_main", "On;"));
  pipeline.after_root("main_step", create_simple_handler("after_main", "After;"));

  let ctx = ContextData::new(TestContext::default());
  pipeline.run(ctx.clone()).await.unwrap();

  let guard = ctx.read();
  assert_eq!(guard.counter, 3);
  assert_eq!(guard.message, "Before;On;After;");
  assert_eq!(guard.steps_executed, vec!["before_main", "on_main", "after_main"]);
}

#[tokio::test]
#[serial]
async fn test_stop_in_on_phase_skips_after_handlers() {
  setup_tracing();
  let mut pipeline = Pipeline::<TestContext, TestError>::new(&[("main_step", false, None)]);

  pipeline.on_root("main_step", create_simple_handler("on_main", "On;"));
  pipeline.after_root("main_step", create_simple_handler("after_main", "After;"));

  let ctx = ContextData::new(TestContext {
    should_stop_at: Some("on_main".to_string()),
    ..Default::default()
  });
  let result = pipeline.run(ctx.clone()).await;

  assert_eq!(result.unwrap(), PipelineResult::Stopped);
  assert_eq!(ctx.read().steps_executed, vec!["on_main"]);
}

#[tokio::test]
#[serial]
async fn test_failure_hooks_run_on_error_in_registration_order() {
  setup_tracing();
  reset_counters();
  let mut pipeline = Pipeline::<TestContext, TestError>::new(&[("reserve", false, None), ("commit", false, None)]);

  pipeline.on_root("reserve", create_simple_handler("reserve", "R;"));
  pipeline.on_root("commit", create_failing_handler("commit", "storage went away"));
  pipeline.on_failure(|ctx: ContextData<TestContext>, failed: FailedStep| async move {
    HOOK_EXEC_COUNTER.fetch_add(1, Ordering::SeqCst);
    let mut guard = ctx.write();
    guard.rolled_back = true;
    guard.failed_step = Some(failed.step_name);
  });
  pipeline.on_failure(|ctx: ContextData<TestContext>, failed: FailedStep| async move {
    HOOK_EXEC_COUNTER.fetch_add(1, Ordering::SeqCst);
    assert!(ctx.read().rolled_back, "first hook must run before the second");
    assert!(failed.error.contains("storage went away"));
  });

  let ctx = ContextData::new(TestContext::default());
  let result = pipeline.run(ctx.clone()).await;

  assert_eq!(result.unwrap_err(), TestError::Handler("storage went away".to_string()));
  assert_eq!(HOOK_EXEC_COUNTER.load(Ordering::SeqCst), 2);
  let guard = ctx.read();
  assert!(guard.rolled_back);
  assert_eq!(guard.failed_step.as_deref(), Some("commit"));
}

#[tokio::test]
#[serial]
async fn test_failure_hooks_do_not_run_on_success_or_stop() {
  setup_tracing();
  reset_counters();
  let mut pipeline = Pipeline::<TestContext, TestError>::new(&[("only", false, None)]);
  pipeline.on_root("only", create_simple_handler("only", "x"));
  pipeline.on_failure(|_ctx: ContextData<TestContext>, _failed: FailedStep| async move {
    HOOK_EXEC_COUNTER.fetch_add(1, Ordering::SeqCst);
  });

  pipeline.run(ContextData::new(TestContext::default())).await.unwrap();
  let stopped = pipeline
    .run(ContextData::new(TestContext {
      should_stop_at: Some("only".to_string()),
      ..Default::default()
    }))
    .await
    .unwrap();

  assert_eq!(stopped, PipelineResult::Stopped);
  assert_eq!(HOOK_EXEC_COUNTER.load(Ordering::SeqCst), 0);
}

#[tokio::test]
#[serial]
async fn test_inserted_steps_run_in_position() {
  setup_tracing();
  let mut pipeline = Pipeline::<TestContext, TestError>::new(&[("first", false, None), ("last", false, None)]);
  pipeline.insert_after_step("first", "middle", false, None).unwrap();
  pipeline.insert_before_step("first", "zeroth", true, None).unwrap();

  assert_eq!(pipeline.step_names(), vec!["zeroth", "first", "middle", "last"]);

  pipeline.on_root("first", create_simple_handler("first", "1"));
  pipeline.on_root("middle", create_simple_handler("middle", "2"));
  pipeline.on_root("last", create_simple_handler("last", "3"));

  let ctx = ContextData::new(TestContext::default());
  pipeline.run(ctx.clone()).await.unwrap();
  assert_eq!(ctx.read().message, "123");
}

#[tokio::test]
#[serial]
async fn test_removed_step_and_its_handlers_are_gone() {
  setup_tracing();
  let mut pipeline = Pipeline::<TestContext, TestError>::new(&[("keep", false, None), ("drop_me", false, None)]);
  pipeline.on_root("keep", create_simple_handler("keep", "k"));
  pipeline.on_root("drop_me", create_simple_handler("drop_me", "d"));

  pipeline.remove_step("drop_me").unwrap();
  assert!(!pipeline.has_step("drop_me"));

  let ctx = ContextData::new(TestContext::default());
  pipeline.run(ctx.clone()).await.unwrap();
  assert_eq!(ctx.read().steps_executed, vec!["keep"]);
}

#[tokio::test]
#[serial]
async fn test_skip_condition_can_be_replaced_after_construction() {
  setup_tracing();
  let mut pipeline = Pipeline::<TestContext, TestError>::new(&[("maybe", false, None)]);
  pipeline.on_root("maybe", create_simple_handler("maybe", "m"));
  pipeline
    .set_skip_condition("maybe", Some(Arc::new(|_ctx: ContextData<TestContext>| true)))
    .unwrap();

  let ctx = ContextData::new(TestContext::default());
  pipeline.run(ctx.clone()).await.unwrap();
  assert!(ctx.read().steps_executed.is_empty());
}

#[test]
#[should_panic(expected = "declared twice")]
fn test_duplicate_step_names_panic() {
  let _ = Pipeline::<TestContext, TestError>::new(&[("dup", false, None), ("dup", true, None)]);
}

#[test]
#[should_panic(expected = "is not part of pipeline")]
fn test_handler_for_unknown_step_panics() {
  let mut pipeline = Pipeline::<TestContext, TestError>::new(&[("real", false, None)]);
  pipeline.on_root("imaginary", create_simple_handler("imaginary", ""));
}

#[test]
fn test_pipeline_named_overrides_label() {
  let pipeline = Pipeline::<TestContext, TestError>::new(&[("a", false, None)]);
  assert_eq!(pipeline.name(), "TestContext");
  let pipeline = pipeline.named("checkout");
  assert_eq!(pipeline.name(), "checkout");
}
