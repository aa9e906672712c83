//! Authentication domain models.
//!
//! These are internal domain models, distinct from the API request/response
//! shapes in `solari_api::models` (which follow the wire naming).

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Scope that unlocks the administrative endpoints.
pub const ADMIN_SCOPE: &str = "admin";

/// Boolean feature flags attached to a user and copied into tokens.
pub type Entitlements = BTreeMap<String, bool>;

/// Coarse account standing carried in every issued token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskState {
    #[default]
    Ok,
    Restricted,
    Banned,
}

impl RiskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskState::Ok => "ok",
            RiskState::Restricted => "restricted",
            RiskState::Banned => "banned",
        }
    }
}

impl fmt::Display for RiskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RiskState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ok" => Ok(RiskState::Ok),
            "restricted" => Ok(RiskState::Restricted),
            "banned" => Ok(RiskState::Banned),
            other => Err(format!("unknown risk state '{other}'")),
        }
    }
}

/// A registered OAuth-style client. Loaded from the directory file and never
/// mutated at runtime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub client_id: String,
    pub allowed_scopes: BTreeSet<String>,
    /// Used when the caller does not request scopes.
    #[serde(default)]
    pub default_scopes: Option<BTreeSet<String>>,
}

/// Second-factor settings for a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MfaSettings {
    pub enabled: bool,
    /// Expected verification code. Delivery is handled outside this service.
    #[serde(default)]
    pub code: Option<String>,
}

/// Directory user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub password_hash: String,
    #[serde(default)]
    pub scopes: BTreeSet<String>,
    #[serde(default)]
    pub risk: RiskState,
    #[serde(default)]
    pub entitlements: Entitlements,
    #[serde(default)]
    pub mfa: Option<MfaSettings>,
}

impl User {
    /// Whether a second factor must be presented after the password.
    pub fn mfa_enabled(&self) -> bool {
        self.mfa.as_ref().is_some_and(|m| m.enabled)
    }
}

/// One client-authenticated login. Parent of zero or more refresh tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub client_id: String,
    /// Snapshot of the resolved scopes at issuance or last refresh.
    pub scopes: Vec<String>,
    /// Scopes the caller asked for at login, if any. Refresh resolves these
    /// again against the current user and client.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_scopes: Option<Vec<String>>,
    pub risk: RiskState,
    pub entitlements: Entitlements,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Everything the store needs to open a session.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub user_id: String,
    pub client_id: String,
    pub scopes: Vec<String>,
    pub requested_scopes: Option<Vec<String>>,
    pub risk: RiskState,
    pub entitlements: Entitlements,
}

/// Re-resolved grant state written to a session on refresh.
#[derive(Debug, Clone)]
pub struct SessionRefresh {
    pub scopes: Vec<String>,
    pub risk: RiskState,
    pub entitlements: Entitlements,
}

/// Single-use refresh credential. `id` is the bearer secret itself; only its
/// hash is persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshToken {
    pub id: String,
    pub session_id: String,
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
}

impl RefreshToken {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Claims embedded in signed access credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Issuer URL.
    pub iss: String,
    /// Subject (user ID).
    pub sub: String,
    /// Audience (client ID).
    pub aud: String,
    /// Granted scopes.
    pub scp: Vec<String>,
    pub risk: RiskState,
    #[serde(default)]
    pub ent: Entitlements,
    /// Session ID.
    pub sid: String,
    /// Issued at (unix timestamp).
    pub iat: i64,
    /// Expiry (unix timestamp).
    pub exp: i64,
    pub jti: String,
}

impl AccessClaims {
    pub fn has_scope(&self, scope: &str) -> bool {
        self.scp.iter().any(|s| s == scope)
    }
}
