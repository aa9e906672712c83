//! Scope resolution.
//!
//! The final scope set for a token is
//! `candidate ∩ client.allowed_scopes ∩ user.scopes`, where the candidate set
//! is the caller's request if present, else the client's default scopes, else
//! the user's own scopes. An empty request or empty default list counts as
//! absent. An empty result is an error: zero-scope tokens are never issued.

use std::collections::BTreeSet;

use super::AuthError;
use crate::models::auth::{Client, User};

/// Resolve the scopes a token may carry. Output is sorted and de-duplicated.
pub fn resolve_scopes(
    user: &User,
    client: &Client,
    requested: Option<&[String]>,
) -> Result<Vec<String>, AuthError> {
    let requested: Option<BTreeSet<&str>> = requested
        .filter(|r| !r.is_empty())
        .map(|r| r.iter().map(String::as_str).collect());

    let candidate: BTreeSet<&str> = match (requested, &client.default_scopes) {
        (Some(requested), _) => requested,
        (None, Some(defaults)) if !defaults.is_empty() => {
            defaults.iter().map(String::as_str).collect()
        }
        _ => user.scopes.iter().map(String::as_str).collect(),
    };

    let resolved: Vec<String> = candidate
        .into_iter()
        .filter(|s| client.allowed_scopes.contains(*s) && user.scopes.contains(*s))
        .map(str::to_string)
        .collect();

    if resolved.is_empty() {
        return Err(AuthError::NoScopesForClient);
    }
    Ok(resolved)
}

/// Split an OAuth `scope` parameter (space separated) into a list.
pub fn parse_scope_param(scope: Option<&str>) -> Option<Vec<String>> {
    let scopes: Vec<String> = scope?
        .split_whitespace()
        .map(str::to_string)
        .collect();
    (!scopes.is_empty()).then_some(scopes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::auth::RiskState;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn alice() -> User {
        User {
            id: "u-alice".into(),
            email: "alice@x.com".into(),
            password_hash: String::new(),
            scopes: set(&["read", "write"]),
            risk: RiskState::Ok,
            entitlements: Default::default(),
            mfa: None,
        }
    }

    fn app1(defaults: Option<&[&str]>) -> Client {
        Client {
            client_id: "app1".into(),
            allowed_scopes: set(&["read", "write", "admin"]),
            default_scopes: defaults.map(set),
        }
    }

    fn req(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn requested_scopes_drop_what_the_user_lacks() {
        let requested = req(&["write", "admin"]);
        let scopes = resolve_scopes(&alice(), &app1(None), Some(&requested)).unwrap();
        assert_eq!(scopes, vec!["write"]);
    }

    #[test]
    fn client_defaults_apply_without_request() {
        let scopes = resolve_scopes(&alice(), &app1(Some(&["read"])), None).unwrap();
        assert_eq!(scopes, vec!["read"]);
    }

    #[test]
    fn user_scopes_are_last_resort() {
        let scopes = resolve_scopes(&alice(), &app1(None), None).unwrap();
        assert_eq!(scopes, vec!["read", "write"]);
    }

    #[test]
    fn empty_request_counts_as_absent() {
        let scopes = resolve_scopes(&alice(), &app1(Some(&["read"])), Some(&[])).unwrap();
        assert_eq!(scopes, vec!["read"]);
    }

    #[test]
    fn duplicates_collapse_and_order_is_irrelevant() {
        let a = resolve_scopes(&alice(), &app1(None), Some(&req(&["write", "read", "write"])))
            .unwrap();
        let b = resolve_scopes(&alice(), &app1(None), Some(&req(&["read", "write"]))).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, vec!["read", "write"]);
    }

    #[test]
    fn empty_intersection_is_an_error() {
        let requested = req(&["admin"]);
        let err = resolve_scopes(&alice(), &app1(None), Some(&requested)).unwrap_err();
        assert!(matches!(err, AuthError::NoScopesForClient));

        let narrow = Client {
            client_id: "reports".into(),
            allowed_scopes: set(&["reports"]),
            default_scopes: None,
        };
        assert!(resolve_scopes(&alice(), &narrow, None).is_err());
    }

    #[test]
    fn result_is_always_within_both_sets() {
        let user = alice();
        let pool = ["read", "write", "admin", "billing", "x"];
        // Every subset of the pool as a request, against every default choice.
        for mask in 0u32..(1 << pool.len()) {
            let requested: Vec<String> = pool
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, s)| s.to_string())
                .collect();
            for client in [app1(None), app1(Some(&["read"])), app1(Some(&["admin"]))] {
                match resolve_scopes(&user, &client, Some(&requested)) {
                    Ok(scopes) => {
                        assert!(!scopes.is_empty());
                        for s in &scopes {
                            assert!(client.allowed_scopes.contains(s));
                            assert!(user.scopes.contains(s));
                        }
                    }
                    Err(e) => assert!(matches!(e, AuthError::NoScopesForClient)),
                }
            }
        }
    }

    #[test]
    fn scope_param_splits_on_whitespace() {
        assert_eq!(
            parse_scope_param(Some("read  write")),
            Some(vec!["read".to_string(), "write".to_string()])
        );
        assert_eq!(parse_scope_param(Some("   ")), None);
        assert_eq!(parse_scope_param(None), None);
    }
}
