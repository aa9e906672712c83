//! In-memory implementation of the session store.
//!
//! Not durable: all sessions are lost on restart. Every operation runs under
//! a single mutex, so compound operations (cascading delete, rotation,
//! cleanup) are atomic with respect to each other.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use super::{
    CleanupReport, Rotation, RotationOutcome, SessionPolicy, SessionStore, StoreError,
    StoreResult, generate_refresh_token, generate_session_id, hash_refresh_token,
};
use crate::models::auth::{NewSession, RefreshToken, Session, SessionRefresh};

#[derive(Debug, Clone)]
struct StoredToken {
    session_id: String,
    user_id: String,
    expires_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct State {
    sessions: HashMap<String, Session>,
    /// Keyed by token hash; plaintext tokens are never kept.
    tokens: HashMap<String, StoredToken>,
}

impl State {
    /// Remove a session and its tokens. Returns (session existed, tokens removed).
    fn remove_session(&mut self, session_id: &str) -> (bool, u64) {
        let existed = self.sessions.remove(session_id).is_some();
        let before = self.tokens.len();
        self.tokens.retain(|_, t| t.session_id != session_id);
        (existed, (before - self.tokens.len()) as u64)
    }

    fn live_session(&mut self, session_id: &str, now: DateTime<Utc>) -> Option<&mut Session> {
        if self
            .sessions
            .get(session_id)
            .is_some_and(|s| s.is_expired_at(now))
        {
            self.remove_session(session_id);
            return None;
        }
        self.sessions.get_mut(session_id)
    }

    fn insert_token(
        &mut self,
        session_id: &str,
        user_id: &str,
        expires_at: DateTime<Utc>,
    ) -> RefreshToken {
        let plaintext = generate_refresh_token();
        self.tokens.insert(
            hash_refresh_token(&plaintext),
            StoredToken {
                session_id: session_id.to_string(),
                user_id: user_id.to_string(),
                expires_at,
            },
        );
        RefreshToken {
            id: plaintext,
            session_id: session_id.to_string(),
            user_id: user_id.to_string(),
            expires_at,
        }
    }

    fn sorted_live<'a>(
        &'a self,
        now: DateTime<Utc>,
        filter: impl Fn(&Session) -> bool + 'a,
    ) -> Vec<Session> {
        let mut sessions: Vec<Session> = self
            .sessions
            .values()
            .filter(|s| !s.is_expired_at(now) && filter(s))
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        sessions
    }
}

/// In-memory session store.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    policy: SessionPolicy,
    state: Mutex<State>,
}

impl InMemorySessionStore {
    pub fn new(policy: SessionPolicy) -> Self {
        Self {
            policy,
            state: Mutex::new(State::default()),
        }
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn create_session(&self, new: NewSession) -> StoreResult<Session> {
        let now = Utc::now();
        let session = Session {
            id: generate_session_id(),
            user_id: new.user_id,
            client_id: new.client_id,
            scopes: new.scopes,
            requested_scopes: new.requested_scopes,
            risk: new.risk,
            entitlements: new.entitlements,
            created_at: now,
            expires_at: now + self.policy.session_ttl,
        };
        self.state
            .lock()
            .await
            .sessions
            .insert(session.id.clone(), session.clone());
        Ok(session)
    }

    async fn get_session(&self, session_id: &str) -> StoreResult<Option<Session>> {
        let mut state = self.state.lock().await;
        Ok(state.live_session(session_id, Utc::now()).cloned())
    }

    async fn delete_session(&self, session_id: &str) -> StoreResult<bool> {
        let (existed, _) = self.state.lock().await.remove_session(session_id);
        Ok(existed)
    }

    async fn create_refresh_token(
        &self,
        session_id: &str,
        user_id: &str,
    ) -> StoreResult<RefreshToken> {
        let now = Utc::now();
        let mut state = self.state.lock().await;
        if state.live_session(session_id, now).is_none() {
            return Err(StoreError::MissingSession);
        }
        Ok(state.insert_token(session_id, user_id, now + self.policy.refresh_ttl))
    }

    async fn get_refresh_token(&self, token: &str) -> StoreResult<Option<RefreshToken>> {
        let hash = hash_refresh_token(token);
        let mut state = self.state.lock().await;
        let Some(stored) = state.tokens.get(&hash).cloned() else {
            return Ok(None);
        };
        if stored.expires_at <= Utc::now() {
            state.tokens.remove(&hash);
            return Ok(None);
        }
        Ok(Some(RefreshToken {
            id: token.to_string(),
            session_id: stored.session_id,
            user_id: stored.user_id,
            expires_at: stored.expires_at,
        }))
    }

    async fn delete_refresh_token(&self, token: &str) -> StoreResult<bool> {
        let hash = hash_refresh_token(token);
        Ok(self.state.lock().await.tokens.remove(&hash).is_some())
    }

    async fn delete_refresh_tokens_for_session(&self, session_id: &str) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        let before = state.tokens.len();
        state.tokens.retain(|_, t| t.session_id != session_id);
        Ok(state.tokens.len() < before)
    }

    async fn rotate_refresh_token(
        &self,
        token: &str,
        refresh: SessionRefresh,
    ) -> StoreResult<RotationOutcome> {
        let now = Utc::now();
        let hash = hash_refresh_token(token);
        let mut state = self.state.lock().await;

        let Some(old) = state.tokens.remove(&hash) else {
            return Ok(RotationOutcome::UnknownToken);
        };
        if old.expires_at <= now {
            return Ok(RotationOutcome::UnknownToken);
        }

        let session_ttl = self.policy.session_ttl;
        let Some(session) = state.live_session(&old.session_id, now) else {
            return Ok(RotationOutcome::SessionGone);
        };
        session.scopes = refresh.scopes;
        session.risk = refresh.risk;
        session.entitlements = refresh.entitlements;
        session.expires_at = now + session_ttl;
        let session = session.clone();

        let refresh_token =
            state.insert_token(&session.id, &old.user_id, now + self.policy.refresh_ttl);
        Ok(RotationOutcome::Rotated(Rotation {
            session,
            refresh_token,
        }))
    }

    async fn get_user_sessions(&self, user_id: &str) -> StoreResult<Vec<Session>> {
        let state = self.state.lock().await;
        Ok(state.sorted_live(Utc::now(), |s| s.user_id == user_id))
    }

    async fn list_sessions(&self) -> StoreResult<Vec<Session>> {
        let state = self.state.lock().await;
        Ok(state.sorted_live(Utc::now(), |_| true))
    }

    async fn cleanup_expired(&self) -> StoreResult<CleanupReport> {
        let now = Utc::now();
        let mut state = self.state.lock().await;
        let expired: Vec<String> = state
            .sessions
            .values()
            .filter(|s| s.is_expired_at(now))
            .map(|s| s.id.clone())
            .collect();

        let mut report = CleanupReport::default();
        for id in &expired {
            let (_, tokens) = state.remove_session(id);
            report.sessions_deleted += 1;
            report.tokens_deleted += tokens;
        }
        let before = state.tokens.len();
        state.tokens.retain(|_, t| t.expires_at > now);
        report.tokens_deleted += (before - state.tokens.len()) as u64;
        Ok(report)
    }

    async fn health_check(&self) -> StoreResult<()> {
        Ok(())
    }

    fn is_durable(&self) -> bool {
        false
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::models::auth::{Entitlements, RiskState};

    fn new_session(user_id: &str) -> NewSession {
        NewSession {
            user_id: user_id.into(),
            client_id: "app1".into(),
            scopes: vec!["read".into()],
            requested_scopes: None,
            risk: RiskState::Ok,
            entitlements: Entitlements::new(),
        }
    }

    fn refresh() -> SessionRefresh {
        SessionRefresh {
            scopes: vec!["read".into(), "write".into()],
            risk: RiskState::Restricted,
            entitlements: Entitlements::from([("beta".to_string(), true)]),
        }
    }

    fn expired_policy() -> SessionPolicy {
        SessionPolicy {
            session_ttl: chrono::Duration::zero(),
            refresh_ttl: chrono::Duration::zero(),
        }
    }

    #[tokio::test]
    async fn create_and_get_session() {
        let store = InMemorySessionStore::default();
        let s = store.create_session(new_session("u1")).await.unwrap();
        let got = store.get_session(&s.id).await.unwrap().unwrap();
        assert_eq!(got, s);
        assert!(store.get_session("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_session_is_deleted_on_lookup_once() {
        let store = InMemorySessionStore::new(expired_policy());
        let s = store.create_session(new_session("u1")).await.unwrap();
        assert!(store.get_session(&s.id).await.unwrap().is_none());
        // Already gone: a second delete finds nothing.
        assert!(!store.delete_session(&s.id).await.unwrap());
    }

    #[tokio::test]
    async fn expired_refresh_token_is_deleted_on_lookup() {
        let store = InMemorySessionStore::new(SessionPolicy {
            session_ttl: chrono::Duration::hours(1),
            refresh_ttl: chrono::Duration::zero(),
        });
        let s = store.create_session(new_session("u1")).await.unwrap();
        let rt = store.create_refresh_token(&s.id, "u1").await.unwrap();
        assert!(store.get_refresh_token(&rt.id).await.unwrap().is_none());
        assert!(!store.delete_refresh_token(&rt.id).await.unwrap());
    }

    #[tokio::test]
    async fn refresh_token_requires_live_session() {
        let store = InMemorySessionStore::default();
        let err = store.create_refresh_token("nope", "u1").await.unwrap_err();
        assert!(matches!(err, StoreError::MissingSession));
    }

    #[tokio::test]
    async fn deleting_session_cascades_to_tokens() {
        let store = InMemorySessionStore::default();
        let s = store.create_session(new_session("u1")).await.unwrap();
        let a = store.create_refresh_token(&s.id, "u1").await.unwrap();
        let b = store.create_refresh_token(&s.id, "u1").await.unwrap();
        assert!(store.delete_session(&s.id).await.unwrap());
        assert!(store.get_refresh_token(&a.id).await.unwrap().is_none());
        assert!(store.get_refresh_token(&b.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn delete_tokens_for_session_reports_whether_any_existed() {
        let store = InMemorySessionStore::default();
        let s = store.create_session(new_session("u1")).await.unwrap();
        assert!(!store.delete_refresh_tokens_for_session(&s.id).await.unwrap());
        store.create_refresh_token(&s.id, "u1").await.unwrap();
        assert!(store.delete_refresh_tokens_for_session(&s.id).await.unwrap());
        assert!(store.get_session(&s.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn rotation_is_single_use() {
        let store = InMemorySessionStore::default();
        let s = store.create_session(new_session("u1")).await.unwrap();
        let rt = store.create_refresh_token(&s.id, "u1").await.unwrap();

        let RotationOutcome::Rotated(rotation) =
            store.rotate_refresh_token(&rt.id, refresh()).await.unwrap()
        else {
            panic!("first rotation must succeed");
        };
        assert_ne!(rotation.refresh_token.id, rt.id);
        assert_eq!(rotation.session.scopes, vec!["read", "write"]);
        assert_eq!(rotation.session.risk, RiskState::Restricted);
        assert!(rotation.session.expires_at >= s.expires_at);

        assert!(matches!(
            store.rotate_refresh_token(&rt.id, refresh()).await.unwrap(),
            RotationOutcome::UnknownToken
        ));
        assert!(store.get_refresh_token(&rt.id).await.unwrap().is_none());
        assert!(
            store
                .get_refresh_token(&rotation.refresh_token.id)
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn concurrent_rotation_has_one_winner() {
        let store = Arc::new(InMemorySessionStore::default());
        let s = store.create_session(new_session("u1")).await.unwrap();
        let rt = store.create_refresh_token(&s.id, "u1").await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            let token = rt.id.clone();
            handles.push(tokio::spawn(async move {
                store.rotate_refresh_token(&token, refresh()).await.unwrap()
            }));
        }
        let mut winners = 0;
        for h in handles {
            if matches!(h.await.unwrap(), RotationOutcome::Rotated(_)) {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn user_sessions_are_live_and_newest_first() {
        let store = InMemorySessionStore::default();
        let first = store.create_session(new_session("u1")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = store.create_session(new_session("u1")).await.unwrap();
        store.create_session(new_session("u2")).await.unwrap();

        let sessions = store.get_user_sessions("u1").await.unwrap();
        let ids: Vec<&str> = sessions.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec![second.id.as_str(), first.id.as_str()]);
        assert_eq!(store.list_sessions().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn cleanup_counts_sessions_and_tokens() {
        let store = InMemorySessionStore::new(expired_policy());
        // Tokens cannot be minted for an already-expired session, so seed the
        // state directly.
        let s = store.create_session(new_session("u1")).await.unwrap();
        {
            let mut state = store.state.lock().await;
            state.insert_token(&s.id, "u1", Utc::now() + chrono::Duration::hours(1));
            state.insert_token("orphan", "u2", Utc::now() - chrono::Duration::hours(1));
        }
        let report = store.cleanup_expired().await.unwrap();
        assert_eq!(
            report,
            CleanupReport {
                sessions_deleted: 1,
                tokens_deleted: 2
            }
        );
        assert_eq!(store.cleanup_expired().await.unwrap(), CleanupReport::default());
    }
}
