//! Permission update and broadcast models.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::auth::{Entitlements, RiskState};

/// Administrative mutation of a user's grants. Absent fields are left as-is.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PermissionUpdate {
    #[serde(alias = "userId")]
    pub user_id: String,
    #[serde(default)]
    pub scopes: Option<BTreeSet<String>>,
    #[serde(default)]
    pub risk: Option<RiskState>,
    #[serde(default)]
    pub entitlements: Option<Entitlements>,
}

/// Event pushed to every permission-stream observer after an update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionEvent {
    pub user_id: String,
    pub scopes: Vec<String>,
    pub risk: RiskState,
    pub entitlements: Entitlements,
    pub updated_at: DateTime<Utc>,
}
