//! Auth gateway: the flows behind every endpoint.
//!
//! Password grant runs client lookup, credential check (password, then MFA),
//! scope resolution, session creation, refresh-token creation and finally
//! signing. If anything after session creation fails the session is deleted
//! again, so no half-issued login survives. Refresh signs the new access
//! credential first and only then rotates the refresh token atomically, so a
//! failed signature never consumes the caller's token.
//!
//! Native and OAuth flows share this code. The only difference is that the
//! OAuth flow does not audit failed attempts.

use std::sync::Arc;

use chrono::Utc;
use serde_json::json;
use solari_core::audit::AuditLog;
use solari_core::auth::AuthError;
use solari_core::auth::credentials::verify_credentials;
use solari_core::auth::jwt::{AccessGrant, TokenSigner};
use solari_core::auth::scopes::resolve_scopes;
use solari_core::broadcast::{PermissionChannel, PermissionSubscription};
use solari_core::directory::Directory;
use solari_core::models::audit::{AuditContext, AuditEventType, AuditSummary};
use solari_core::models::auth::{AccessClaims, NewSession, RefreshToken, Session, SessionRefresh};
use solari_core::models::permissions::PermissionUpdate;
use solari_core::session::{CleanupReport, RotationOutcome, SessionStore};
use tracing::{debug, info, warn};

use crate::models::{PermissionsResponse, TokenResponse, UserInfoResponse};

/// Which surface a grant came through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantOrigin {
    Native,
    OAuth,
}

impl GrantOrigin {
    fn as_str(self) -> &'static str {
        match self {
            GrantOrigin::Native => "native",
            GrantOrigin::OAuth => "oauth",
        }
    }

    fn audits_failures(self) -> bool {
        self == GrantOrigin::Native
    }
}

/// Inputs to the password grant.
#[derive(Debug, Clone, Copy)]
pub struct PasswordGrant<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub client_id: &'a str,
    pub scopes: Option<&'a [String]>,
    pub mfa_code: Option<&'a str>,
}

/// A successful grant plus the subject it was issued to.
struct Issued {
    user_id: String,
    response: TokenResponse,
}

pub struct AuthGateway {
    directory: Arc<Directory>,
    sessions: Arc<dyn SessionStore>,
    signer: TokenSigner,
    audit: AuditLog,
    permissions: PermissionChannel,
}

impl AuthGateway {
    pub fn new(
        directory: Arc<Directory>,
        sessions: Arc<dyn SessionStore>,
        signer: TokenSigner,
        audit: AuditLog,
    ) -> Self {
        Self {
            directory,
            sessions,
            signer,
            audit,
            permissions: PermissionChannel::new(),
        }
    }

    pub fn signer(&self) -> &TokenSigner {
        &self.signer
    }

    pub fn sessions(&self) -> &dyn SessionStore {
        self.sessions.as_ref()
    }

    pub fn permissions(&self) -> &PermissionChannel {
        &self.permissions
    }

    pub async fn password_grant(
        &self,
        grant: PasswordGrant<'_>,
        origin: GrantOrigin,
    ) -> Result<TokenResponse, AuthError> {
        match self.issue_for_password(&grant).await {
            Ok(issued) => {
                info!(user_id = %issued.user_id, client_id = grant.client_id, sid = %issued.response.sid, "password grant issued");
                self.record(
                    AuditEventType::AuthSuccess,
                    AuditContext::default()
                        .user(&issued.user_id)
                        .client(grant.client_id)
                        .metadata(json!({
                            "flow": origin.as_str(),
                            "sid": issued.response.sid,
                            "scopes": issued.response.scp,
                        })),
                )
                .await;
                Ok(issued.response)
            }
            Err(e) => {
                debug!(client_id = grant.client_id, code = e.code(), "password grant rejected");
                if origin.audits_failures() {
                    self.record(
                        AuditEventType::AuthFailed,
                        AuditContext::default()
                            .client(grant.client_id)
                            .metadata(json!({ "reason": e.code(), "flow": origin.as_str() })),
                    )
                    .await;
                }
                Err(e)
            }
        }
    }

    async fn issue_for_password(&self, grant: &PasswordGrant<'_>) -> Result<Issued, AuthError> {
        if grant.email.trim().is_empty()
            || grant.password.is_empty()
            || grant.client_id.trim().is_empty()
        {
            return Err(AuthError::InvalidRequest(
                "email, password and client_id are required".into(),
            ));
        }
        let client = self
            .directory
            .client(grant.client_id)
            .await
            .ok_or(AuthError::UnknownClient)?;
        let user =
            verify_credentials(&self.directory, grant.email, grant.password, grant.mfa_code)
                .await?;
        let scopes = resolve_scopes(&user, &client, grant.scopes)?;

        let session = self
            .sessions
            .create_session(NewSession {
                user_id: user.id.clone(),
                client_id: client.client_id.clone(),
                scopes,
                requested_scopes: grant
                    .scopes
                    .filter(|s| !s.is_empty())
                    .map(<[String]>::to_vec),
                risk: user.risk,
                entitlements: user.entitlements.clone(),
            })
            .await?;

        let refresh_token = match self.sessions.create_refresh_token(&session.id, &user.id).await
        {
            Ok(token) => token,
            Err(e) => {
                self.discard_session(&session.id).await;
                return Err(e.into());
            }
        };

        match self.sign_for(&session) {
            Ok((access_token, claims)) => Ok(Issued {
                user_id: user.id,
                response: token_response(access_token, claims, &refresh_token, &self.signer),
            }),
            Err(e) => {
                self.discard_session(&session.id).await;
                Err(e)
            }
        }
    }

    pub async fn refresh_grant(
        &self,
        refresh_token: &str,
        client_id: Option<&str>,
        origin: GrantOrigin,
    ) -> Result<TokenResponse, AuthError> {
        match self.issue_for_refresh(refresh_token, client_id).await {
            Ok(issued) => {
                self.record(
                    AuditEventType::TokenRefreshed,
                    AuditContext::default()
                        .user(&issued.user_id)
                        .client(&issued.response.aud)
                        .metadata(json!({
                            "flow": origin.as_str(),
                            "sid": issued.response.sid,
                            "scopes": issued.response.scp,
                        })),
                )
                .await;
                Ok(issued.response)
            }
            Err(e) => {
                debug!(code = e.code(), "refresh grant rejected");
                if origin.audits_failures() {
                    let mut context = AuditContext::default()
                        .metadata(json!({ "reason": e.code(), "flow": origin.as_str() }));
                    if let Some(client_id) = client_id {
                        context = context.client(client_id);
                    }
                    self.record(AuditEventType::RefreshFailed, context).await;
                }
                Err(e)
            }
        }
    }

    async fn issue_for_refresh(
        &self,
        refresh_token: &str,
        client_id: Option<&str>,
    ) -> Result<Issued, AuthError> {
        if refresh_token.trim().is_empty() {
            return Err(AuthError::InvalidRequest("refresh_token is required".into()));
        }
        let stored = self
            .sessions
            .get_refresh_token(refresh_token)
            .await?
            .ok_or(AuthError::InvalidRefreshToken)?;
        let session = self
            .sessions
            .get_session(&stored.session_id)
            .await?
            .ok_or(AuthError::InvalidSession)?;
        if let Some(client_id) = client_id.filter(|c| !c.is_empty())
            && client_id != session.client_id
        {
            return Err(AuthError::InvalidRefreshToken);
        }

        // Resolve the login request again against the current directory.
        let user = self
            .directory
            .user(&session.user_id)
            .await
            .ok_or(AuthError::InvalidRefreshToken)?;
        let client = self
            .directory
            .client(&session.client_id)
            .await
            .ok_or(AuthError::UnknownClient)?;
        let scopes = resolve_scopes(&user, &client, session.requested_scopes.as_deref())?;

        let refreshed = Session {
            scopes: scopes.clone(),
            risk: user.risk,
            entitlements: user.entitlements.clone(),
            ..session
        };
        let (access_token, claims) = self.sign_for(&refreshed)?;

        let rotation = match self
            .sessions
            .rotate_refresh_token(
                refresh_token,
                SessionRefresh {
                    scopes,
                    risk: user.risk,
                    entitlements: user.entitlements,
                },
            )
            .await?
        {
            RotationOutcome::Rotated(rotation) => rotation,
            RotationOutcome::UnknownToken => return Err(AuthError::InvalidRefreshToken),
            RotationOutcome::SessionGone => return Err(AuthError::InvalidSession),
        };

        Ok(Issued {
            user_id: user.id,
            response: token_response(
                access_token,
                claims,
                &rotation.refresh_token,
                &self.signer,
            ),
        })
    }

    fn sign_for(&self, session: &Session) -> Result<(String, AccessClaims), AuthError> {
        self.signer.sign(&AccessGrant {
            user_id: &session.user_id,
            client_id: &session.client_id,
            session_id: &session.id,
            scopes: &session.scopes,
            risk: session.risk,
            entitlements: &session.entitlements,
        })
    }

    /// Roll back a session whose grant could not be completed.
    async fn discard_session(&self, session_id: &str) {
        if let Err(e) = self.sessions.delete_session(session_id).await {
            warn!(session_id, "failed to roll back session: {e}");
        }
    }

    /// Delete a session and every refresh token it owns.
    pub async fn revoke_session(
        &self,
        session_id: &str,
        actor: &AccessClaims,
    ) -> Result<bool, AuthError> {
        if session_id.trim().is_empty() {
            return Err(AuthError::InvalidRequest("session_id is required".into()));
        }
        let session = self.sessions.get_session(session_id).await?;
        let revoked = self.sessions.delete_session(session_id).await?;
        if revoked {
            let mut context = AuditContext::default().metadata(json!({
                "sid": session_id,
                "revokedBy": actor.sub,
            }));
            if let Some(session) = session {
                context = context.user(session.user_id).client(session.client_id);
            }
            self.record(AuditEventType::SessionRevoked, context).await;
            info!(session_id, revoked_by = %actor.sub, "session revoked");
        }
        Ok(revoked)
    }

    /// Revoke the caller's own session.
    pub async fn logout(&self, caller: &AccessClaims) -> Result<bool, AuthError> {
        let revoked = self.sessions.delete_session(&caller.sid).await?;
        if revoked {
            self.record(
                AuditEventType::SessionRevoked,
                AuditContext::default()
                    .user(&caller.sub)
                    .client(&caller.aud)
                    .metadata(json!({ "sid": caller.sid, "reason": "logout" })),
            )
            .await;
        }
        Ok(revoked)
    }

    pub async fn list_sessions(&self, user_id: Option<&str>) -> Result<Vec<Session>, AuthError> {
        let sessions = match user_id.filter(|u| !u.is_empty()) {
            Some(user_id) => self.sessions.get_user_sessions(user_id).await?,
            None => self.sessions.list_sessions().await?,
        };
        Ok(sessions)
    }

    /// Delete expired sessions and refresh tokens.
    pub async fn cleanup_expired(&self) -> Result<CleanupReport, AuthError> {
        let report = self.sessions.cleanup_expired().await?;
        if report.sessions_deleted > 0 || report.tokens_deleted > 0 {
            info!(
                sessions = report.sessions_deleted,
                tokens = report.tokens_deleted,
                "expired sessions cleaned up"
            );
            self.record(
                AuditEventType::ExpiredCleanup,
                AuditContext::default().metadata(json!({
                    "sessionsDeleted": report.sessions_deleted,
                    "tokensDeleted": report.tokens_deleted,
                })),
            )
            .await;
        }
        Ok(report)
    }

    /// Apply an update, then notify every open observer.
    pub async fn update_permissions(
        &self,
        update: PermissionUpdate,
        actor: &AccessClaims,
    ) -> Result<PermissionsResponse, AuthError> {
        if update.user_id.trim().is_empty() {
            return Err(AuthError::InvalidRequest("user_id is required".into()));
        }
        if update.scopes.is_none() && update.risk.is_none() && update.entitlements.is_none() {
            return Err(AuthError::InvalidRequest(
                "at least one of scopes, risk, entitlements is required".into(),
            ));
        }

        let user = self.directory.update_permissions(&update).await?;
        let scopes: Vec<String> = user.scopes.iter().cloned().collect();
        let report = self.permissions.publish(
            &user.id,
            scopes.clone(),
            user.risk,
            user.entitlements.clone(),
        );

        self.record(
            AuditEventType::PermissionsUpdated,
            AuditContext::default().user(&user.id).metadata(json!({
                "scopes": scopes,
                "risk": user.risk,
                "entitlements": user.entitlements,
                "updatedBy": actor.sub,
            })),
        )
        .await;

        Ok(PermissionsResponse {
            user_id: user.id,
            scopes,
            risk: user.risk,
            entitlements: user.entitlements,
            notified: report.delivered,
        })
    }

    pub fn subscribe_permissions(&self) -> PermissionSubscription {
        self.permissions.subscribe()
    }

    /// Signature, issuer and expiry only; no storage lookup.
    pub fn verify_bearer(&self, token: &str) -> Result<AccessClaims, AuthError> {
        self.signer.verify(token)
    }

    pub async fn userinfo(&self, claims: &AccessClaims) -> UserInfoResponse {
        let email = self.directory.user(&claims.sub).await.map(|u| u.email);
        UserInfoResponse {
            sub: claims.sub.clone(),
            email,
            aud: claims.aud.clone(),
            scp: claims.scp.clone(),
            risk: claims.risk,
            entitlements: claims.ent.clone(),
            sid: claims.sid.clone(),
        }
    }

    pub async fn audit_summary(&self, recent_limit: usize) -> Result<AuditSummary, AuthError> {
        Ok(self.audit.summary(recent_limit).await?)
    }

    /// Audit writes never fail the request they describe.
    async fn record(&self, event_type: AuditEventType, context: AuditContext) {
        if let Err(e) = self.audit.record(event_type, context).await {
            warn!(event_type = %event_type, "audit write failed: {e}");
        }
    }
}

fn token_response(
    access_token: String,
    claims: AccessClaims,
    refresh_token: &RefreshToken,
    signer: &TokenSigner,
) -> TokenResponse {
    TokenResponse {
        token_type: "Bearer".to_string(),
        access_token,
        refresh_token: refresh_token.id.clone(),
        expires_in: signer.ttl_secs(),
        refresh_expires_in: (refresh_token.expires_at - Utc::now()).num_seconds().max(0),
        aud: claims.aud,
        scp: claims.scp,
        sid: claims.sid,
    }
}
