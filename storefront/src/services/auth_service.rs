// storefront/src/services/auth_service.rs

//! Password hashing, bearer token issuance/validation and credential
//! shape checks.

use crate::errors::AppError;
use crate::models::UserRole;
use argon2::{
  password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
  Argon2,
};
use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, instrument};
use uuid::Uuid;

pub const MIN_PASSWORD_LEN: usize = 8;

/// Hashes a plain-text password with Argon2 and a fresh random salt.
#[instrument(name = "auth_service::hash_password", skip(password), err(Display))]
pub fn hash_password(password: &str) -> Result<String, AppError> {
  if password.is_empty() {
    return Err(AppError::Validation("Password cannot be empty.".to_string()));
  }

  let salt = SaltString::generate(&mut OsRng);
  match Argon2::default().hash_password(password.as_bytes(), &salt) {
    Ok(hash) => {
      debug!("Password hashed.");
      Ok(hash.to_string())
    }
    Err(argon_err) => {
      error!(error = %argon_err, "Argon2 password hashing failed.");
      Err(AppError::Internal(format!("Password hashing failed: {}", argon_err)))
    }
  }
}

/// Checks `provided_password` against a stored Argon2 hash.
///
/// Returns `Ok(false)` on a mismatch. A hash that cannot be parsed is an
/// internal error, not a failed login.
#[instrument(
  name = "auth_service::verify_password",
  skip(stored_hash, provided_password),
  err(Display),
  fields(hash_len = stored_hash.len())
)]
pub fn verify_password(stored_hash: &str, provided_password: &str) -> Result<bool, AppError> {
  if provided_password.is_empty() {
    return Ok(false);
  }

  let parsed_hash = PasswordHash::new(stored_hash).map_err(|parse_err| {
    error!(error = %parse_err, "Stored password hash is malformed.");
    AppError::Internal(format!("Invalid stored password hash: {}", parse_err))
  })?;

  match Argon2::default().verify_password(provided_password.as_bytes(), &parsed_hash) {
    Ok(()) => Ok(true),
    Err(argon2::password_hash::Error::Password) => {
      debug!("Password mismatch.");
      Ok(false)
    }
    Err(other) => {
      error!(error = %other, "Argon2 password verification failed.");
      Err(AppError::Internal(format!("Password verification failed: {}", other)))
    }
  }
}

/// `local@domain.tld`: one `@`, non-empty local part, a dot inside the
/// domain with something on both sides, no whitespace.
pub fn is_valid_email(email: &str) -> bool {
  if email.chars().any(char::is_whitespace) {
    return false;
  }
  let Some((local, domain)) = email.split_once('@') else {
    return false;
  };
  if local.is_empty() || domain.contains('@') {
    return false;
  }
  match domain.rsplit_once('.') {
    Some((host, tld)) => !host.is_empty() && tld.len() >= 2 && tld.chars().all(|c| c.is_ascii_alphabetic()),
    None => false,
  }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Claims {
  pub sub: Uuid,
  pub role: UserRole,
  pub jti: Uuid,
  pub iat: i64,
  pub exp: i64,
}

impl Claims {
  pub fn expires_at(&self) -> DateTime<Utc> {
    Utc.timestamp_opt(self.exp, 0).single().unwrap_or_else(Utc::now)
  }
}

#[derive(Debug, Clone)]
pub struct IssuedToken {
  pub token: String,
  pub token_id: Uuid,
  pub expires_at: DateTime<Utc>,
}

/// HS256 signer/validator for session tokens.
#[derive(Clone)]
pub struct TokenService {
  encoding: EncodingKey,
  decoding: DecodingKey,
  validation: Validation,
  ttl: Duration,
}

impl TokenService {
  pub fn new(secret: &[u8], ttl: Duration) -> Self {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.leeway = 0;
    Self {
      encoding: EncodingKey::from_secret(secret),
      decoding: DecodingKey::from_secret(secret),
      validation,
      ttl,
    }
  }

  #[instrument(name = "TokenService::issue", skip(self), err(Display))]
  pub fn issue(&self, user_id: Uuid, role: UserRole) -> Result<IssuedToken, AppError> {
    let ttl = chrono::Duration::from_std(self.ttl)
      .map_err(|e| AppError::Internal(format!("Token TTL out of range: {}", e)))?;
    let issued_at = Utc::now();
    let expires_at = issued_at + ttl;
    let claims = Claims {
      sub: user_id,
      role,
      jti: Uuid::new_v4(),
      iat: issued_at.timestamp(),
      exp: expires_at.timestamp(),
    };
    let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;
    debug!(token_id = %claims.jti, "Token issued.");
    Ok(IssuedToken {
      token,
      token_id: claims.jti,
      expires_at,
    })
  }

  /// Verifies signature and expiry. Revocation is checked by the caller,
  /// which has access to the store.
  pub fn validate(&self, token: &str) -> Result<Claims, AppError> {
    let data = decode::<Claims>(token, &self.decoding, &self.validation)?;
    Ok(data.claims)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const SECRET: &[u8] = b"0123456789abcdef0123456789abcdef";

  #[test]
  fn hash_then_verify() {
    let hash = hash_password("correct horse").unwrap();
    assert!(verify_password(&hash, "correct horse").unwrap());
    assert!(!verify_password(&hash, "wrong horse").unwrap());
    assert!(!verify_password(&hash, "").unwrap());
  }

  #[test]
  fn malformed_hash_is_internal() {
    assert!(matches!(verify_password("not-a-hash", "pw"), Err(AppError::Internal(_))));
  }

  #[test]
  fn email_shapes() {
    assert!(is_valid_email("ada@example.com"));
    assert!(is_valid_email("a.b+c@mail.example.org"));
    assert!(!is_valid_email("ada@example"));
    assert!(!is_valid_email("@example.com"));
    assert!(!is_valid_email("ada@@example.com"));
    assert!(!is_valid_email("ada @example.com"));
    assert!(!is_valid_email("ada@.com"));
  }

  #[test]
  fn issued_tokens_validate() {
    let tokens = TokenService::new(SECRET, Duration::from_secs(3600));
    let user = Uuid::new_v4();
    let issued = tokens.issue(user, UserRole::Admin).unwrap();
    let claims = tokens.validate(&issued.token).unwrap();
    assert_eq!(claims.sub, user);
    assert_eq!(claims.role, UserRole::Admin);
    assert_eq!(claims.jti, issued.token_id);
    assert_eq!(claims.expires_at().timestamp(), issued.expires_at.timestamp());
  }

  #[test]
  fn tokens_signed_with_another_secret_are_rejected() {
    let ours = TokenService::new(SECRET, Duration::from_secs(3600));
    let theirs = TokenService::new(b"ffffffffffffffffffffffffffffffff", Duration::from_secs(3600));
    let issued = theirs.issue(Uuid::new_v4(), UserRole::Customer).unwrap();
    assert!(matches!(ours.validate(&issued.token), Err(AppError::Token(_))));
  }

  #[test]
  fn expired_tokens_are_rejected() {
    let tokens = TokenService::new(SECRET, Duration::from_secs(0));
    let issued = tokens.issue(Uuid::new_v4(), UserRole::Customer).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(1100));
    assert!(tokens.validate(&issued.token).is_err());
  }
}
