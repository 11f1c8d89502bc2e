// storefront/src/config.rs

use crate::errors::{AppError, Result};
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
  Postgres,
  Memory,
}

impl FromStr for StoreBackend {
  type Err = AppError;

  fn from_str(s: &str) -> Result<Self> {
    match s.trim().to_ascii_lowercase().as_str() {
      "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
      "memory" => Ok(StoreBackend::Memory),
      other => Err(AppError::Config(format!(
        "Invalid STORE_BACKEND '{}': expected 'postgres' or 'memory'",
        other
      ))),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
  Pretty,
  Json,
}

#[derive(Clone)]
pub struct AppConfig {
  pub server_host: String,
  pub server_port: u16,
  pub store_backend: StoreBackend,
  /// Required when `store_backend` is Postgres.
  pub database_url: Option<String>,
  pub database_max_connections: u32,
  pub apply_schema: bool,
  pub jwt_secret: String,
  pub jwt_ttl: Duration,
  pub review_rate_limit: usize,
  pub review_rate_window: Duration,
  pub log_format: LogFormat,
}

// The secret never reaches the logs.
impl std::fmt::Debug for AppConfig {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("AppConfig")
      .field("server_host", &self.server_host)
      .field("server_port", &self.server_port)
      .field("store_backend", &self.store_backend)
      .field("database_url", &self.database_url.as_ref().map(|_| "[REDACTED]"))
      .field("database_max_connections", &self.database_max_connections)
      .field("apply_schema", &self.apply_schema)
      .field("jwt_secret", &"[REDACTED]")
      .field("jwt_ttl", &self.jwt_ttl)
      .field("review_rate_limit", &self.review_rate_limit)
      .field("review_rate_window", &self.review_rate_window)
      .field("log_format", &self.log_format)
      .finish()
  }
}

pub const MIN_JWT_SECRET_LEN: usize = 32;

impl AppConfig {
  pub fn from_env() -> Result<Self> {
    dotenv().ok();
    Self::from_lookup(|name| env::var(name).ok())
  }

  /// Builds the config from an arbitrary variable source. `from_env` is this
  /// over the process environment.
  pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
    let get_or = |name: &str, default: &str| lookup(name).unwrap_or_else(|| default.to_string());

    let server_host = get_or("SERVER_HOST", "127.0.0.1");
    let server_port = parse_var::<u16>("SERVER_PORT", &get_or("SERVER_PORT", "8080"))?;
    let store_backend: StoreBackend = get_or("STORE_BACKEND", "postgres").parse()?;
    let database_url = lookup("DATABASE_URL").filter(|url| !url.trim().is_empty());
    if store_backend == StoreBackend::Postgres && database_url.is_none() {
      return Err(AppError::Config(
        "Missing environment variable 'DATABASE_URL' (required for the postgres backend)".to_string(),
      ));
    }
    let database_max_connections =
      parse_var::<u32>("DATABASE_MAX_CONNECTIONS", &get_or("DATABASE_MAX_CONNECTIONS", "10"))?;
    let apply_schema = parse_var::<bool>("APPLY_SCHEMA", &get_or("APPLY_SCHEMA", "false"))?;

    let jwt_secret =
      lookup("JWT_SECRET").ok_or_else(|| AppError::Config("Missing environment variable 'JWT_SECRET'".to_string()))?;
    if jwt_secret.len() < MIN_JWT_SECRET_LEN {
      return Err(AppError::Config(format!(
        "JWT_SECRET must be at least {} bytes long",
        MIN_JWT_SECRET_LEN
      )));
    }
    let jwt_ttl = Duration::from_secs(parse_var::<u64>("JWT_TTL_SECS", &get_or("JWT_TTL_SECS", "86400"))?);

    let review_rate_limit = parse_var::<usize>("REVIEW_RATE_LIMIT", &get_or("REVIEW_RATE_LIMIT", "5"))?;
    let review_rate_window = Duration::from_secs(parse_var::<u64>(
      "REVIEW_RATE_WINDOW_SECS",
      &get_or("REVIEW_RATE_WINDOW_SECS", "60"),
    )?);
    if review_rate_limit == 0 || review_rate_window.is_zero() {
      return Err(AppError::Config(
        "REVIEW_RATE_LIMIT and REVIEW_RATE_WINDOW_SECS must be positive".to_string(),
      ));
    }

    let log_format = match get_or("LOG_FORMAT", "pretty").to_ascii_lowercase().as_str() {
      "json" => LogFormat::Json,
      "pretty" | "text" => LogFormat::Pretty,
      other => return Err(AppError::Config(format!("Invalid LOG_FORMAT '{}'", other))),
    };

    Ok(Self {
      server_host,
      server_port,
      store_backend,
      database_url,
      database_max_connections,
      apply_schema,
      jwt_secret,
      jwt_ttl,
      review_rate_limit,
      review_rate_window,
      log_format,
    })
  }

  pub fn bind_address(&self) -> String {
    format!("{}:{}", self.server_host, self.server_port)
  }
}

fn parse_var<T>(name: &str, raw: &str) -> Result<T>
where
  T: FromStr,
  T::Err: std::fmt::Display,
{
  raw
    .trim()
    .parse::<T>()
    .map_err(|e| AppError::Config(format!("Invalid {} value '{}': {}", name, raw, e)))
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashMap;

  fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    move |name| map.get(name).cloned()
  }

  const SECRET: &str = "0123456789abcdef0123456789abcdef";

  #[test]
  fn memory_backend_needs_no_database_url() {
    let cfg = AppConfig::from_lookup(lookup_from(&[("STORE_BACKEND", "memory"), ("JWT_SECRET", SECRET)])).unwrap();
    assert_eq!(cfg.store_backend, StoreBackend::Memory);
    assert_eq!(cfg.server_port, 8080);
    assert_eq!(cfg.review_rate_limit, 5);
    assert_eq!(cfg.review_rate_window, Duration::from_secs(60));
    assert_eq!(cfg.jwt_ttl, Duration::from_secs(86_400));
    assert!(!cfg.apply_schema);
  }

  #[test]
  fn postgres_backend_requires_database_url() {
    let err = AppConfig::from_lookup(lookup_from(&[("JWT_SECRET", SECRET)])).unwrap_err();
    assert!(matches!(err, AppError::Config(ref m) if m.contains("DATABASE_URL")));
  }

  #[test]
  fn short_jwt_secret_is_rejected() {
    let err = AppConfig::from_lookup(lookup_from(&[("STORE_BACKEND", "memory"), ("JWT_SECRET", "short")])).unwrap_err();
    assert!(matches!(err, AppError::Config(_)));
  }

  #[test]
  fn invalid_port_is_a_config_error() {
    let err = AppConfig::from_lookup(lookup_from(&[
      ("STORE_BACKEND", "memory"),
      ("JWT_SECRET", SECRET),
      ("SERVER_PORT", "eighty"),
    ]))
    .unwrap_err();
    assert!(matches!(err, AppError::Config(ref m) if m.contains("SERVER_PORT")));
  }

  #[test]
  fn debug_output_redacts_secrets() {
    let cfg = AppConfig::from_lookup(lookup_from(&[
      ("DATABASE_URL", "postgres://user:pw@localhost/shop"),
      ("JWT_SECRET", SECRET),
    ]))
    .unwrap();
    let rendered = format!("{:?}", cfg);
    assert!(!rendered.contains(SECRET));
    assert!(!rendered.contains("pw@localhost"));
  }
}
