// storefront/src/web/extractors.rs

//! Request extractors for bearer-token authentication.

use actix_web::dev::Payload;
use actix_web::http::header::AUTHORIZATION;
use actix_web::{web, FromRequest, HttpRequest};
use chrono::{DateTime, Utc};
use futures_util::future::LocalBoxFuture;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::UserRole;
use crate::state::AppState;

/// The caller, identified by a valid, unrevoked `Authorization: Bearer`
/// token.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
  pub user_id: Uuid,
  pub role: UserRole,
  pub token_id: Uuid,
  pub expires_at: DateTime<Utc>,
}

impl AuthenticatedUser {
  pub fn is_admin(&self) -> bool {
    self.role == UserRole::Admin
  }
}

fn bearer_token(req: &HttpRequest) -> Result<String, AppError> {
  let header = req
    .headers()
    .get(AUTHORIZATION)
    .ok_or_else(|| AppError::Auth("Missing Authorization header.".to_string()))?;
  let value = header
    .to_str()
    .map_err(|_| AppError::Auth("Malformed Authorization header.".to_string()))?;
  match value.split_once(' ') {
    Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() => {
      Ok(token.trim().to_string())
    }
    _ => Err(AppError::Auth("Expected a Bearer token.".to_string())),
  }
}

impl FromRequest for AuthenticatedUser {
  type Error = AppError;
  type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

  fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
    let state = req.app_data::<web::Data<AppState>>().cloned();
    let token = bearer_token(req);

    Box::pin(async move {
      let state = state.ok_or_else(|| AppError::Internal("Application state is not configured.".to_string()))?;
      let token = token?;

      let claims = state.tokens.validate(&token).map_err(|e| {
        debug!(error = %e, "Bearer token rejected.");
        AppError::Auth("Invalid or expired token.".to_string())
      })?;
      if state.store.is_token_revoked(claims.jti).await? {
        warn!(token_id = %claims.jti, "Revoked token presented.");
        return Err(AppError::Auth("Token has been revoked.".to_string()));
      }

      Ok(AuthenticatedUser {
        user_id: claims.sub,
        role: claims.role,
        token_id: claims.jti,
        expires_at: claims.expires_at(),
      })
    })
  }
}

/// An [`AuthenticatedUser`] with the admin role. Other roles get 403.
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthenticatedUser);

impl FromRequest for AdminUser {
  type Error = AppError;
  type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

  fn from_request(req: &HttpRequest, payload: &mut Payload) -> Self::Future {
    let authenticated = AuthenticatedUser::from_request(req, payload);
    Box::pin(async move {
      let user = authenticated.await?;
      if !user.is_admin() {
        warn!(user_id = %user.user_id, "Admin route refused.");
        return Err(AppError::Forbidden("Administrator role required.".to_string()));
      }
      Ok(AdminUser(user))
    })
  }
}
