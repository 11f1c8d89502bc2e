// storefront/src/pipelines/signin_pipeline.rs

use crate::errors::AppError;
use crate::pipelines::contexts::SigninCtxData;
use crate::services::auth_service;
use shopflow::{ContextData, FlowRegistry, Pipeline, PipelineControl};
use tracing::{event, warn, Level};

// Unknown email and wrong password must be indistinguishable to the caller.
fn bad_credentials() -> AppError {
  AppError::Auth("Invalid email or password.".to_string())
}

pub fn build_signin_pipeline() -> Pipeline<SigninCtxData, AppError> {
  let mut signin_p = Pipeline::<SigninCtxData, AppError>::new(&[
    ("validate_signin_input", false, None),
    ("fetch_user_by_email", false, None),
    ("verify_password", false, None),
    ("issue_token", false, None),
  ])
  .named("signin");

  signin_p.on_root("validate_signin_input", |ctx_data: ContextData<SigninCtxData>| {
    Box::pin(async move {
      let (email, password_is_empty) = {
        let guard = ctx_data.read();
        (guard.email.trim().to_lowercase(), guard.password.is_empty())
      };

      if email.is_empty() || password_is_empty {
        return Err(AppError::Validation("Email and password are required.".to_string()));
      }
      ctx_data.write().email = email;
      Ok(PipelineControl::Continue)
    })
  });

  signin_p.on_root("fetch_user_by_email", |ctx_data: ContextData<SigninCtxData>| {
    Box::pin(async move {
      let (store, email) = {
        let guard = ctx_data.read();
        (guard.store.clone(), guard.email.clone())
      };

      match store.user_by_email(&email).await? {
        Some(user) => {
          event!(Level::DEBUG, user_id = %user.id, "User found for signin.");
          ctx_data.write().user = Some(user);
          Ok::<_, AppError>(PipelineControl::Continue)
        }
        None => {
          warn!(%email, "Signin for an unknown email.");
          Err(bad_credentials())
        }
      }
    })
  });

  signin_p.on_root("verify_password", |ctx_data: ContextData<SigninCtxData>| {
    Box::pin(async move {
      let (stored_hash, password, user_id) = {
        let guard = ctx_data.read();
        let user = guard
          .user
          .as_ref()
          .ok_or_else(|| AppError::Internal("Signin reached password check without a user.".to_string()))?;
        (user.password_hash.clone(), guard.password.clone(), user.id)
      };

      if auth_service::verify_password(&stored_hash, &password)? {
        Ok::<_, AppError>(PipelineControl::Continue)
      } else {
        warn!(%user_id, "Password mismatch on signin.");
        Err(bad_credentials())
      }
    })
  });

  signin_p.on_root("issue_token", |ctx_data: ContextData<SigninCtxData>| {
    Box::pin(async move {
      let (tokens, user_id, role) = {
        let guard = ctx_data.read();
        let user = guard
          .user
          .as_ref()
          .ok_or_else(|| AppError::Internal("Signin reached token issue without a user.".to_string()))?;
        (guard.tokens.clone(), user.id, user.role)
      };

      let issued = tokens.issue(user_id, role)?;
      event!(Level::INFO, %user_id, token_id = %issued.token_id, "Session token issued.");
      ctx_data.write().issued = Some(issued);
      Ok::<_, AppError>(PipelineControl::Continue)
    })
  });

  signin_p
}

pub fn register_signin_pipeline(registry: &FlowRegistry<AppError>) {
  registry.register_pipeline(build_signin_pipeline());
  tracing::info!("Sign-in pipeline registered.");
}
