//! Audit log models.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Security-relevant event kinds recorded by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuditEventType {
    AuthSuccess,
    AuthFailed,
    TokenRefreshed,
    RefreshFailed,
    SessionRevoked,
    PermissionsUpdated,
    ExpiredCleanup,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEventType::AuthSuccess => "AUTH_SUCCESS",
            AuditEventType::AuthFailed => "AUTH_FAILED",
            AuditEventType::TokenRefreshed => "TOKEN_REFRESHED",
            AuditEventType::RefreshFailed => "REFRESH_FAILED",
            AuditEventType::SessionRevoked => "SESSION_REVOKED",
            AuditEventType::PermissionsUpdated => "PERMISSIONS_UPDATED",
            AuditEventType::ExpiredCleanup => "EXPIRED_CLEANUP",
        }
    }
}

impl fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional subject fields attached to an audit record.
#[derive(Debug, Clone, Default)]
pub struct AuditContext {
    pub user_id: Option<String>,
    pub client_id: Option<String>,
    pub metadata: Option<serde_json::Value>,
}

impl AuditContext {
    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn client(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = Some(client_id.into());
        self
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Append-only audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub id: Uuid,
    pub event_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Counts plus the most recent events, most recent first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditSummary {
    pub total: u64,
    pub by_type: BTreeMap<String, u64>,
    pub recent: Vec<AuditEvent>,
}
