//! # solari_core
//!
//! Core authentication domain logic for Solari: the user/client directory,
//! credential verification, scope resolution, token signing, the session
//! store, the audit log, and the permission broadcast channel.

pub mod audit;
pub mod auth;
pub mod broadcast;
pub mod directory;
pub mod migrate;
pub mod models;
pub mod session;
pub mod uuid;

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_not_empty() {
        assert!(!version().is_empty());
    }
}
