// storefront/src/pipelines/signup_pipeline.rs

use crate::errors::AppError;
use crate::models::NewUser;
use crate::pipelines::contexts::SignupCtxData;
use crate::services::auth_service::{self, MIN_PASSWORD_LEN};
use shopflow::{ContextData, FlowRegistry, Pipeline, PipelineControl};
use tracing::{event, info, warn, Level};

pub fn build_signup_pipeline() -> Pipeline<SignupCtxData, AppError> {
  let mut signup_p = Pipeline::<SignupCtxData, AppError>::new(&[
    ("validate_signup_input", false, None),
    ("check_existing_user", false, None),
    ("create_user", false, None),
  ])
  .named("signup");

  // Emails are compared case-insensitively, so they are stored lowercased.
  signup_p.on_root("validate_signup_input", |ctx_data: ContextData<SignupCtxData>| {
    Box::pin(async move {
      let (name, email, password_len) = {
        let guard = ctx_data.read();
        (guard.name.trim().to_string(), guard.email.trim().to_lowercase(), guard.password.chars().count())
      };

      event!(Level::DEBUG, %email, "Validating signup input.");
      if name.is_empty() {
        return Err(AppError::Validation("Name is required.".to_string()));
      }
      if !auth_service::is_valid_email(&email) {
        warn!(%email, "Rejected signup with a malformed email.");
        return Err(AppError::Validation("A valid email address is required.".to_string()));
      }
      if password_len < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
          "Password must be at least {} characters long.",
          MIN_PASSWORD_LEN
        )));
      }

      ctx_data.update(|ctx| {
        ctx.name = name;
        ctx.email = email;
      });
      Ok(PipelineControl::Continue)
    })
  });

  // Fast path for the common duplicate; the unique index still decides
  // races in `create_user`.
  signup_p.on_root("check_existing_user", |ctx_data: ContextData<SignupCtxData>| {
    Box::pin(async move {
      let (store, email) = {
        let guard = ctx_data.read();
        (guard.store.clone(), guard.email.clone())
      };

      if store.user_by_email(&email).await?.is_some() {
        warn!(%email, "Signup with an email that is already registered.");
        return Err(AppError::Conflict("An account with this email already exists.".to_string()));
      }
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  signup_p.on_root("create_user", |ctx_data: ContextData<SignupCtxData>| {
    Box::pin(async move {
      let (store, new_user_fields, password) = {
        let guard = ctx_data.read();
        (
          guard.store.clone(),
          (guard.name.clone(), guard.email.clone(), guard.role),
          guard.password.clone(),
        )
      };
      let (name, email, role) = new_user_fields;

      let password_hash = auth_service::hash_password(&password)?;
      let user = store
        .insert_user(NewUser {
          name,
          email,
          password_hash,
          role,
        })
        .await?;

      info!(user_id = %user.id, role = %user.role, "User registered.");
      ctx_data.write().created_user = Some(user);
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  signup_p
}

pub fn register_signup_pipeline(registry: &FlowRegistry<AppError>) {
  registry.register_pipeline(build_signup_pipeline());
  tracing::info!("Sign-up pipeline registered.");
}
