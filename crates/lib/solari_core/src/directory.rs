//! User and client directory.
//!
//! Clients are immutable once loaded. Users are mutated only by
//! administrative permission updates and are never deleted here. The
//! directory is loaded from a YAML file at startup:
//!
//! ```yaml
//! clients:
//!   - client_id: app1
//!     allowed_scopes: [read, write, admin]
//!     default_scopes: [read]
//! users:
//!   - id: u-alice
//!     email: alice@x.com
//!     password_hash: "$2b$10$..."
//!     scopes: [read, write]
//!     risk: ok
//!     entitlements: { beta: true }
//!     mfa: { enabled: false }
//! ```

use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;

use crate::auth::AuthError;
use crate::models::auth::{Client, User};
use crate::models::permissions::PermissionUpdate;

/// Directory loading errors.
#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("IO error reading directory file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Directory file is not valid YAML: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid directory: {0}")]
    Invalid(String),
}

/// On-disk shape of the directory file.
#[derive(Debug, Default, Deserialize)]
pub struct DirectoryFile {
    #[serde(default)]
    pub clients: Vec<Client>,
    #[serde(default)]
    pub users: Vec<User>,
}

#[derive(Debug, Default)]
struct DirectoryState {
    users: HashMap<String, User>,
    /// Lower-cased email → user id.
    emails: HashMap<String, String>,
    clients: HashMap<String, Client>,
}

/// In-process view of the configured users and clients.
#[derive(Debug)]
pub struct Directory {
    state: RwLock<DirectoryState>,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

impl Directory {
    /// Build a directory, rejecting duplicate ids/emails and client default
    /// scopes that fall outside the allowed set.
    pub fn new(clients: Vec<Client>, users: Vec<User>) -> Result<Self, DirectoryError> {
        let mut state = DirectoryState::default();

        for client in clients {
            if let Some(defaults) = &client.default_scopes
                && !defaults.is_subset(&client.allowed_scopes)
            {
                return Err(DirectoryError::Invalid(format!(
                    "client '{}' has default scopes outside its allowed scopes",
                    client.client_id
                )));
            }
            if state.clients.contains_key(&client.client_id) {
                return Err(DirectoryError::Invalid(format!(
                    "duplicate client id '{}'",
                    client.client_id
                )));
            }
            state.clients.insert(client.client_id.clone(), client);
        }

        for user in users {
            let email = normalize_email(&user.email);
            if email.is_empty() {
                return Err(DirectoryError::Invalid(format!(
                    "user '{}' has an empty email",
                    user.id
                )));
            }
            if state.emails.contains_key(&email) {
                return Err(DirectoryError::Invalid(format!("duplicate email '{email}'")));
            }
            if state.users.contains_key(&user.id) {
                return Err(DirectoryError::Invalid(format!(
                    "duplicate user id '{}'",
                    user.id
                )));
            }
            state.emails.insert(email, user.id.clone());
            state.users.insert(user.id.clone(), user);
        }

        Ok(Self {
            state: RwLock::new(state),
        })
    }

    /// Parse a directory from YAML text.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, DirectoryError> {
        let file: DirectoryFile = serde_yaml::from_str(yaml)?;
        Self::new(file.clients, file.users)
    }

    /// Load a directory file from disk.
    pub fn load(path: &Path) -> Result<Self, DirectoryError> {
        let yaml = std::fs::read_to_string(path)?;
        let directory = Self::from_yaml_str(&yaml)?;
        info!(path = %path.display(), "loaded user/client directory");
        Ok(directory)
    }

    pub async fn client(&self, client_id: &str) -> Option<Client> {
        self.state.read().await.clients.get(client_id).cloned()
    }

    pub async fn user(&self, user_id: &str) -> Option<User> {
        self.state.read().await.users.get(user_id).cloned()
    }

    /// Case-insensitive email lookup.
    pub async fn user_by_email(&self, email: &str) -> Option<User> {
        let state = self.state.read().await;
        state
            .emails
            .get(&normalize_email(email))
            .and_then(|id| state.users.get(id))
            .cloned()
    }

    /// Apply an administrative permission update, returning the new user state.
    pub async fn update_permissions(&self, update: &PermissionUpdate) -> Result<User, AuthError> {
        let mut state = self.state.write().await;
        let user = state
            .users
            .get_mut(&update.user_id)
            .ok_or(AuthError::UnknownUser)?;
        if let Some(scopes) = &update.scopes {
            user.scopes = scopes.clone();
        }
        if let Some(risk) = update.risk {
            user.risk = risk;
        }
        if let Some(entitlements) = &update.entitlements {
            user.entitlements = entitlements.clone();
        }
        Ok(user.clone())
    }

    pub async fn counts(&self) -> (usize, usize) {
        let state = self.state.read().await;
        (state.users.len(), state.clients.len())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::models::auth::RiskState;

    const YAML: &str = r#"
clients:
  - client_id: app1
    allowed_scopes: [read, write, admin]
  - client_id: app2
    allowed_scopes: [read]
    default_scopes: [read]
users:
  - id: u-alice
    email: Alice@X.com
    password_hash: "$2b$04$invalidinvalidinvalidinvalidinvalidinvalidinvalidinv"
    scopes: [read, write]
    entitlements: { beta: true }
"#;

    #[tokio::test]
    async fn lookup_by_email_is_case_insensitive() {
        let dir = Directory::from_yaml_str(YAML).unwrap();
        let user = dir.user_by_email("alice@x.COM").await.unwrap();
        assert_eq!(user.id, "u-alice");
        assert!(dir.user_by_email("bob@x.com").await.is_none());
    }

    #[tokio::test]
    async fn load_reads_file_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(YAML.as_bytes()).unwrap();
        let dir = Directory::load(file.path()).unwrap();
        assert_eq!(dir.counts().await, (1, 2));
        assert!(dir.client("app2").await.unwrap().default_scopes.is_some());
    }

    #[test]
    fn rejects_defaults_outside_allowed() {
        let yaml = r#"
clients:
  - client_id: bad
    allowed_scopes: [read]
    default_scopes: [write]
"#;
        let err = Directory::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(err, DirectoryError::Invalid(_)));
    }

    #[test]
    fn rejects_duplicate_emails_ignoring_case() {
        let yaml = r#"
users:
  - { id: a, email: a@x.com, password_hash: h }
  - { id: b, email: A@X.COM, password_hash: h }
"#;
        assert!(Directory::from_yaml_str(yaml).is_err());
    }

    #[tokio::test]
    async fn update_permissions_touches_only_given_fields() {
        let dir = Directory::from_yaml_str(YAML).unwrap();
        let updated = dir
            .update_permissions(&PermissionUpdate {
                user_id: "u-alice".into(),
                risk: Some(RiskState::Restricted),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(updated.risk, RiskState::Restricted);
        assert_eq!(updated.scopes.len(), 2);
        assert_eq!(updated.entitlements.get("beta"), Some(&true));

        let missing = dir
            .update_permissions(&PermissionUpdate {
                user_id: "nobody".into(),
                ..Default::default()
            })
            .await;
        assert!(matches!(missing, Err(AuthError::UnknownUser)));
    }
}
