//! Credential verification: email + password, then the optional second factor.

use tracing::{debug, warn};

use super::AuthError;
use crate::directory::Directory;
use crate::models::auth::User;

/// bcrypt cost factor for newly hashed passwords.
const BCRYPT_COST: u32 = 10;

/// Hash a password with bcrypt (cost 10).
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    bcrypt::hash(password, BCRYPT_COST)
        .map_err(|e| AuthError::Internal(format!("bcrypt hash: {e}")))
}

/// Verify a password against a bcrypt hash.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    bcrypt::verify(password, hash).map_err(|e| AuthError::Internal(format!("bcrypt verify: {e}")))
}

/// Check a login attempt against the directory.
///
/// Unknown emails and wrong passwords both yield `InvalidCredentials`. The
/// password is always checked before the second factor, so a wrong password
/// never reveals whether MFA is enabled. No side effects: auditing is the
/// caller's decision.
pub async fn verify_credentials(
    directory: &Directory,
    email: &str,
    password: &str,
    mfa_code: Option<&str>,
) -> Result<User, AuthError> {
    let Some(user) = directory.user_by_email(email).await else {
        debug!("credential check: no user for email");
        return Err(AuthError::InvalidCredentials);
    };

    match verify_password(password, &user.password_hash) {
        Ok(true) => {}
        Ok(false) => return Err(AuthError::InvalidCredentials),
        Err(e) => {
            // A corrupt stored hash must not surface as a distinct error.
            warn!(user_id = %user.id, "stored password hash unusable: {e}");
            return Err(AuthError::InvalidCredentials);
        }
    }

    if let Some(mfa) = user.mfa.as_ref().filter(|m| m.enabled) {
        let Some(presented) = mfa_code.map(str::trim).filter(|c| !c.is_empty()) else {
            return Err(AuthError::MfaRequired);
        };
        if mfa.code.as_deref() != Some(presented) {
            return Err(AuthError::InvalidMfaCode);
        }
    }

    Ok(user)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::models::auth::{MfaSettings, RiskState};

    fn user(id: &str, email: &str, password: &str, mfa: Option<MfaSettings>) -> User {
        User {
            id: id.into(),
            email: email.into(),
            password_hash: bcrypt::hash(password, 4).unwrap(),
            scopes: BTreeSet::from(["read".to_string()]),
            risk: RiskState::Ok,
            entitlements: Default::default(),
            mfa,
        }
    }

    fn directory() -> Directory {
        Directory::new(
            vec![],
            vec![
                user("u1", "alice@x.com", "correct horse", None),
                user(
                    "u2",
                    "bob@x.com",
                    "battery staple",
                    Some(MfaSettings {
                        enabled: true,
                        code: Some("123456".into()),
                    }),
                ),
            ],
        )
        .unwrap()
    }

    #[test]
    fn hash_then_verify() {
        let hash = hash_password("s3cret-pass").unwrap();
        assert!(verify_password("s3cret-pass", &hash).unwrap());
        assert!(!verify_password("other", &hash).unwrap());
    }

    #[tokio::test]
    async fn accepts_correct_password_case_insensitive_email() {
        let dir = directory();
        let u = verify_credentials(&dir, "ALICE@x.com", "correct horse", None)
            .await
            .unwrap();
        assert_eq!(u.id, "u1");
    }

    #[tokio::test]
    async fn unknown_email_and_wrong_password_are_indistinguishable() {
        let dir = directory();
        let missing = verify_credentials(&dir, "nobody@x.com", "x", None).await;
        let wrong = verify_credentials(&dir, "alice@x.com", "x", None).await;
        assert!(matches!(missing, Err(AuthError::InvalidCredentials)));
        assert!(matches!(wrong, Err(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn password_is_checked_before_mfa() {
        let dir = directory();
        let r = verify_credentials(&dir, "bob@x.com", "wrong", None).await;
        assert!(matches!(r, Err(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn mfa_required_then_checked() {
        let dir = directory();
        let r = verify_credentials(&dir, "bob@x.com", "battery staple", None).await;
        assert!(matches!(r, Err(AuthError::MfaRequired)));

        let r = verify_credentials(&dir, "bob@x.com", "battery staple", Some("000000")).await;
        assert!(matches!(r, Err(AuthError::InvalidMfaCode)));

        let u = verify_credentials(&dir, "bob@x.com", "battery staple", Some("123456"))
            .await
            .unwrap();
        assert_eq!(u.id, "u2");
    }

    #[tokio::test]
    async fn corrupt_hash_reads_as_invalid_credentials() {
        let mut broken = user("u3", "carol@x.com", "pw", None);
        broken.password_hash = "not-a-bcrypt-hash".into();
        let dir = Directory::new(vec![], vec![broken]).unwrap();
        let r = verify_credentials(&dir, "carol@x.com", "pw", None).await;
        assert!(matches!(r, Err(AuthError::InvalidCredentials)));
    }
}
