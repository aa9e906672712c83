//! API server configuration.

use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use solari_core::audit::DEFAULT_RECENT_LIMIT;
use solari_core::auth::AuthError;
use solari_core::auth::jwt::{DEFAULT_ACCESS_TOKEN_TTL_SECS, SigningKeyMaterial, resolve_jwt_secret};
use solari_core::session::{DEFAULT_REFRESH_TTL_SECS, DEFAULT_STORE_TIMEOUT};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var}: {reason}")]
    Invalid { var: &'static str, reason: String },

    #[error("signing key: {0}")]
    SigningKey(#[from] AuthError),
}

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:3100").
    pub bind_addr: String,
    /// PostgreSQL connection URL.
    pub pg_connection_url: String,
    /// `iss` claim and discovery issuer.
    pub issuer: String,
    pub signing: SigningKeyMaterial,
    pub access_token_ttl_secs: i64,
    /// Lifetime of refresh tokens and of the sessions that own them.
    pub refresh_token_ttl_secs: i64,
    /// YAML file listing users and clients.
    pub directory_path: PathBuf,
    /// Bound on a single durable-storage call.
    pub store_timeout: Duration,
    /// Default number of events in an audit summary.
    pub audit_recent_limit: usize,
}

impl ApiConfig {
    /// Defaults for everything except issuer and key material.
    pub fn new(issuer: impl Into<String>, signing: SigningKeyMaterial) -> Self {
        Self {
            bind_addr: "127.0.0.1:3100".into(),
            pg_connection_url: "postgres://localhost:5432/solari".into(),
            issuer: issuer.into(),
            signing,
            access_token_ttl_secs: DEFAULT_ACCESS_TOKEN_TTL_SECS,
            refresh_token_ttl_secs: DEFAULT_REFRESH_TTL_SECS,
            directory_path: PathBuf::from("directory.yaml"),
            store_timeout: DEFAULT_STORE_TIMEOUT,
            audit_recent_limit: DEFAULT_RECENT_LIMIT,
        }
    }

    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable                 | Default                              |
    /// |--------------------------|--------------------------------------|
    /// | `BIND_ADDR`              | `127.0.0.1:3100`                     |
    /// | `DATABASE_URL`           | `postgres://localhost:5432/solari`   |
    /// | `SOLARI_ISSUER`          | `http://127.0.0.1:3100`              |
    /// | `SOLARI_SIGNING_MODE`    | `hs256` (or `eddsa`)                 |
    /// | `JWT_SECRET` / `AUTH_SECRET` | generated & persisted to file    |
    /// | `SOLARI_SIGNING_KEY`     | generated per process                |
    /// | `SOLARI_SIGNING_KEY_ID`  | derived from the public key          |
    /// | `ACCESS_TOKEN_TTL_SECS`  | `1800`                               |
    /// | `REFRESH_TOKEN_TTL_SECS` | `2592000`                            |
    /// | `SOLARI_DIRECTORY`       | `directory.yaml`                     |
    /// | `STORE_TIMEOUT_MS`       | `5000`                               |
    /// | `AUDIT_RECENT_LIMIT`     | `50`                                 |
    pub fn from_env() -> Result<Self, ConfigError> {
        let signing = signing_from_env()?;
        let mut config = Self::new(
            env_or("SOLARI_ISSUER", "http://127.0.0.1:3100"),
            signing,
        );
        config.bind_addr = env_or("BIND_ADDR", &config.bind_addr);
        config.pg_connection_url = env_or("DATABASE_URL", &config.pg_connection_url);
        config.access_token_ttl_secs =
            parse_env("ACCESS_TOKEN_TTL_SECS", config.access_token_ttl_secs)?;
        config.refresh_token_ttl_secs =
            parse_env("REFRESH_TOKEN_TTL_SECS", config.refresh_token_ttl_secs)?;
        config.directory_path = std::env::var_os("SOLARI_DIRECTORY")
            .map(PathBuf::from)
            .unwrap_or(config.directory_path);
        config.store_timeout = Duration::from_millis(parse_env(
            "STORE_TIMEOUT_MS",
            config.store_timeout.as_millis() as u64,
        )?);
        config.audit_recent_limit = parse_env("AUDIT_RECENT_LIMIT", config.audit_recent_limit)?;

        if config.access_token_ttl_secs <= 0 {
            return Err(invalid("ACCESS_TOKEN_TTL_SECS", "must be positive"));
        }
        if config.refresh_token_ttl_secs <= config.access_token_ttl_secs {
            return Err(invalid(
                "REFRESH_TOKEN_TTL_SECS",
                "must exceed ACCESS_TOKEN_TTL_SECS",
            ));
        }
        if config.store_timeout.is_zero() {
            return Err(invalid("STORE_TIMEOUT_MS", "must be positive"));
        }
        Ok(config)
    }
}

fn signing_from_env() -> Result<SigningKeyMaterial, ConfigError> {
    let mode = env_or("SOLARI_SIGNING_MODE", "hs256").to_ascii_lowercase();
    match mode.as_str() {
        "hs256" => Ok(SigningKeyMaterial::Hs256 {
            secret: resolve_jwt_secret().into_bytes(),
        }),
        "eddsa" => {
            let kid = std::env::var("SOLARI_SIGNING_KEY_ID")
                .ok()
                .filter(|k| !k.is_empty());
            match std::env::var("SOLARI_SIGNING_KEY") {
                Ok(seed) if !seed.is_empty() => {
                    Ok(SigningKeyMaterial::ed25519_from_base64(&seed, kid)?)
                }
                _ => {
                    warn!("SOLARI_SIGNING_KEY not set; using an ephemeral Ed25519 key");
                    Ok(SigningKeyMaterial::generate_ed25519())
                }
            }
        }
        other => Err(invalid(
            "SOLARI_SIGNING_MODE",
            format!("expected hs256 or eddsa, got '{other}'"),
        )),
    }
}

fn invalid(var: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        var,
        reason: reason.into(),
    }
}

fn env_or(var: &str, default: &str) -> String {
    std::env::var(var)
        .ok()
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env<T>(var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match std::env::var(var) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e: T::Err| invalid(var, e.to_string())),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_fills_defaults() {
        let config = ApiConfig::new(
            "https://auth.test",
            SigningKeyMaterial::Hs256 {
                secret: b"s".to_vec(),
            },
        );
        assert_eq!(config.access_token_ttl_secs, 1800);
        assert_eq!(config.refresh_token_ttl_secs, 30 * 24 * 60 * 60);
        assert_eq!(config.audit_recent_limit, 50);
        assert_eq!(config.store_timeout, Duration::from_secs(5));
    }

    #[test]
    fn parse_env_falls_back_when_unset() {
        let value: u64 = parse_env("SOLARI_TEST_SURELY_UNSET_VAR", 7).unwrap();
        assert_eq!(value, 7);
    }
}
