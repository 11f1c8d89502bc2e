// storefront/src/web/handlers/auth_handlers.rs

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use shopflow::{ContextData, PipelineResult};
use tracing::{info, instrument, warn};

use crate::errors::AppError;
use crate::models::UserRole;
use crate::pipelines::contexts::{SigninCtxData, SignupCtxData};
use crate::state::AppState;
use crate::web::extractors::AuthenticatedUser;

#[derive(Deserialize, Debug)]
pub struct RegisterPayload {
  pub name: String,
  pub email: String,
  pub password: String,
  #[serde(default)]
  pub role: Option<UserRole>,
}

#[derive(Deserialize, Debug)]
pub struct LoginPayload {
  pub email: String,
  pub password: String,
}

#[instrument(name = "handler::register", skip(app_state, req_payload), fields(req_email = %req_payload.email))]
pub async fn register_handler(
  app_state: web::Data<AppState>,
  req_payload: web::Json<RegisterPayload>,
) -> Result<HttpResponse, AppError> {
  let payload = req_payload.into_inner();
  let ctx_data = ContextData::new(SignupCtxData {
    store: app_state.store.clone(),
    name: payload.name,
    email: payload.email,
    password: payload.password,
    role: payload.role.unwrap_or_default(),
    created_user: None,
  });

  match app_state.flows.run(ctx_data.clone()).await? {
    PipelineResult::Completed => {
      let user = ctx_data
        .write()
        .created_user
        .take()
        .ok_or_else(|| AppError::Internal("Signup completed without creating a user.".to_string()))?;
      info!(user_id = %user.id, "Signup successful.");
      Ok(HttpResponse::Created().json(user))
    }
    PipelineResult::Stopped => {
      warn!("Signup pipeline was stopped by a handler.");
      Err(AppError::Internal("Signup process was halted by an internal step.".to_string()))
    }
  }
}

#[instrument(name = "handler::login", skip(app_state, req_payload), fields(req_email = %req_payload.email))]
pub async fn login_handler(
  app_state: web::Data<AppState>,
  req_payload: web::Json<LoginPayload>,
) -> Result<HttpResponse, AppError> {
  let payload = req_payload.into_inner();
  let ctx_data = ContextData::new(SigninCtxData {
    store: app_state.store.clone(),
    tokens: app_state.tokens.clone(),
    email: payload.email,
    password: payload.password,
    user: None,
    issued: None,
  });

  match app_state.flows.run(ctx_data.clone()).await? {
    PipelineResult::Completed => {
      let guard = ctx_data.read();
      let (user, issued) = match (&guard.user, &guard.issued) {
        (Some(user), Some(issued)) => (user, issued),
        _ => return Err(AppError::Auth("Signin completed without a session token.".to_string())),
      };
      info!(user_id = %user.id, "Signin successful.");
      Ok(HttpResponse::Ok().json(json!({
        "token": issued.token,
        "token_type": "Bearer",
        "expires_at": issued.expires_at,
        "user": user,
      })))
    }
    PipelineResult::Stopped => {
      warn!("Signin pipeline was stopped by a handler.");
      Err(AppError::Auth("Authentication process was unexpectedly halted.".to_string()))
    }
  }
}

/// Revokes the presented token. Other tokens of the same user stay valid.
#[instrument(name = "handler::logout", skip(app_state, auth_user), fields(user_id = %auth_user.user_id))]
pub async fn logout_handler(
  app_state: web::Data<AppState>,
  auth_user: AuthenticatedUser,
) -> Result<HttpResponse, AppError> {
  app_state
    .store
    .revoke_token(auth_user.token_id, auth_user.expires_at)
    .await?;
  info!(token_id = %auth_user.token_id, "Token revoked.");
  Ok(HttpResponse::Ok().json(json!({ "message": "Logged out." })))
}
