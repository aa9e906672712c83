//! Access credential signing and verification.
//!
//! Two signing modes are supported:
//! - `Hs256`: shared secret, nothing is published.
//! - `EdDsa`: Ed25519 key pair; the public half is exported as a JWK so
//!   relying parties can verify tokens without contacting this service.
//!
//! Verification checks signature, issuer and expiry only. Any failure is
//! reported as [`AuthError::InvalidToken`] without saying which check failed.

use std::fmt;
use std::path::PathBuf;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{Duration, Utc};
use ed25519_dalek::SigningKey as Ed25519SigningKey;
use ed25519_dalek::pkcs8::EncodePrivateKey;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::distr::Alphanumeric;
use rand::{Rng, rng};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use super::AuthError;
use crate::models::auth::{AccessClaims, Entitlements, RiskState};

/// Default access token lifetime: 30 minutes.
pub const DEFAULT_ACCESS_TOKEN_TTL_SECS: i64 = 30 * 60;

/// Ed25519 seed length in bytes.
pub const ED25519_SEED_LEN: usize = 32;

/// Key material for the configured signing mode.
#[derive(Clone)]
pub enum SigningKeyMaterial {
    Hs256 { secret: Vec<u8> },
    EdDsa { kid: String, seed: [u8; ED25519_SEED_LEN] },
}

impl SigningKeyMaterial {
    /// Fresh random Ed25519 key. The `kid` is derived from the public key.
    pub fn generate_ed25519() -> Self {
        let mut seed = [0u8; ED25519_SEED_LEN];
        rng().fill(&mut seed);
        let kid = ed25519_kid(&seed);
        SigningKeyMaterial::EdDsa { kid, seed }
    }

    /// Decode a base64url Ed25519 seed, deriving the `kid` when not supplied.
    pub fn ed25519_from_base64(seed_b64: &str, kid: Option<String>) -> Result<Self, AuthError> {
        let bytes = URL_SAFE_NO_PAD
            .decode(seed_b64.trim().trim_end_matches('='))
            .map_err(|e| AuthError::Internal(format!("signing key is not base64url: {e}")))?;
        let seed: [u8; ED25519_SEED_LEN] = bytes.try_into().map_err(|_| {
            AuthError::Internal(format!("signing key must be {ED25519_SEED_LEN} bytes"))
        })?;
        let kid = kid.unwrap_or_else(|| ed25519_kid(&seed));
        Ok(SigningKeyMaterial::EdDsa { kid, seed })
    }
}

impl fmt::Debug for SigningKeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SigningKeyMaterial::Hs256 { .. } => f.write_str("Hs256 { secret: <redacted> }"),
            SigningKeyMaterial::EdDsa { kid, .. } => f
                .debug_struct("EdDsa")
                .field("kid", kid)
                .field("seed", &"<redacted>")
                .finish(),
        }
    }
}

/// Short stable key id: first 16 hex chars of SHA-256 over the public key.
fn ed25519_kid(seed: &[u8; ED25519_SEED_LEN]) -> String {
    let public = Ed25519SigningKey::from_bytes(seed).verifying_key().to_bytes();
    let digest = Sha256::digest(public);
    digest[..8].iter().map(|b| format!("{b:02x}")).collect()
}

/// A published verification key (RFC 7517).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,
    pub kid: String,
    pub alg: String,
    #[serde(rename = "use")]
    pub use_field: String,
    pub crv: String,
    pub x: String,
}

/// JWKS document. Empty in shared-secret mode.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwkSet {
    pub keys: Vec<Jwk>,
}

/// What a freshly minted credential should say about its holder.
#[derive(Debug, Clone)]
pub struct AccessGrant<'a> {
    pub user_id: &'a str,
    pub client_id: &'a str,
    pub session_id: &'a str,
    pub scopes: &'a [String],
    pub risk: RiskState,
    pub entitlements: &'a Entitlements,
}

/// Signs and verifies access credentials.
pub struct TokenSigner {
    issuer: String,
    ttl: Duration,
    algorithm: Algorithm,
    kid: Option<String>,
    encoding: EncodingKey,
    decoding: DecodingKey,
    jwks: JwkSet,
}

impl TokenSigner {
    pub fn new(
        issuer: impl Into<String>,
        material: SigningKeyMaterial,
        ttl_secs: i64,
    ) -> Result<Self, AuthError> {
        if ttl_secs <= 0 {
            return Err(AuthError::Internal("access token TTL must be positive".into()));
        }
        let issuer = issuer.into();
        let ttl = Duration::seconds(ttl_secs);
        match material {
            SigningKeyMaterial::Hs256 { secret } => {
                if secret.is_empty() {
                    return Err(AuthError::Internal("HS256 secret must not be empty".into()));
                }
                Ok(Self {
                    issuer,
                    ttl,
                    algorithm: Algorithm::HS256,
                    kid: None,
                    encoding: EncodingKey::from_secret(&secret),
                    decoding: DecodingKey::from_secret(&secret),
                    jwks: JwkSet::default(),
                })
            }
            SigningKeyMaterial::EdDsa { kid, seed } => {
                let signing_key = Ed25519SigningKey::from_bytes(&seed);
                // jsonwebtoken wants PKCS8 DER for the private half and the
                // raw `x` component for the public half.
                let der = signing_key
                    .to_pkcs8_der()
                    .map_err(|e| AuthError::Internal(format!("encode Ed25519 key: {e}")))?;
                let x = URL_SAFE_NO_PAD.encode(signing_key.verifying_key().to_bytes());
                let decoding = DecodingKey::from_ed_components(&x)
                    .map_err(|e| AuthError::Internal(format!("decode Ed25519 key: {e}")))?;
                let jwks = JwkSet {
                    keys: vec![Jwk {
                        kty: "OKP".to_string(),
                        kid: kid.clone(),
                        alg: "EdDSA".to_string(),
                        use_field: "sig".to_string(),
                        crv: "Ed25519".to_string(),
                        x,
                    }],
                };
                Ok(Self {
                    issuer,
                    ttl,
                    algorithm: Algorithm::EdDSA,
                    kid: Some(kid),
                    encoding: EncodingKey::from_ed_der(der.as_bytes()),
                    decoding,
                    jwks,
                })
            }
        }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    pub fn ttl_secs(&self) -> i64 {
        self.ttl.num_seconds()
    }

    /// `"HS256"` or `"EdDSA"`.
    pub fn algorithm_name(&self) -> &'static str {
        match self.algorithm {
            Algorithm::EdDSA => "EdDSA",
            _ => "HS256",
        }
    }

    /// Public verification keys. Empty for shared-secret signing.
    pub fn jwks(&self) -> &JwkSet {
        &self.jwks
    }

    /// Mint a signed access credential.
    pub fn sign(&self, grant: &AccessGrant<'_>) -> Result<(String, AccessClaims), AuthError> {
        let now = Utc::now();
        let claims = AccessClaims {
            iss: self.issuer.clone(),
            sub: grant.user_id.to_string(),
            aud: grant.client_id.to_string(),
            scp: grant.scopes.to_vec(),
            risk: grant.risk,
            ent: grant.entitlements.clone(),
            sid: grant.session_id.to_string(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
            jti: generate_jti(),
        };
        let mut header = Header::new(self.algorithm);
        header.kid = self.kid.clone();
        let token = encode(&header, &claims, &self.encoding)
            .map_err(|e| AuthError::Internal(format!("jwt encode: {e}")))?;
        Ok((token, claims))
    }

    /// Verify signature, issuer and expiry. Never consults storage.
    pub fn verify(&self, token: &str) -> Result<AccessClaims, AuthError> {
        let mut validation = Validation::new(self.algorithm);
        validation.set_issuer(&[self.issuer.as_str()]);
        validation.set_required_spec_claims(&["exp", "iss", "sub"]);
        // Audience is the client the token was minted for; every client's
        // tokens are accepted here and callers check `aud` themselves.
        validation.validate_aud = false;
        validation.leeway = 0;
        decode::<AccessClaims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                debug!("access token rejected: {e}");
                AuthError::InvalidToken
            })
    }
}

fn generate_jti() -> String {
    rng()
        .sample_iter(&Alphanumeric)
        .take(24)
        .map(char::from)
        .collect()
}

/// Resolve the HS256 secret: env var `JWT_SECRET` → `AUTH_SECRET` → persisted file.
pub fn resolve_jwt_secret() -> String {
    if let Ok(secret) = std::env::var("JWT_SECRET")
        && !secret.is_empty()
    {
        return secret;
    }
    if let Ok(secret) = std::env::var("AUTH_SECRET")
        && !secret.is_empty()
    {
        return secret;
    }
    let secret_path = jwt_secret_path();
    if let Ok(existing) = std::fs::read_to_string(&secret_path) {
        let trimmed = existing.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    let secret: String = rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect();
    if let Some(parent) = secret_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let _ = std::fs::write(&secret_path, &secret);
    info!(path = %secret_path.display(), "generated new JWT secret");
    secret
}

/// Path to the persisted JWT secret file.
fn jwt_secret_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("solari")
        .join("jwt-secret")
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    const ISSUER: &str = "https://auth.solari.test";

    fn hs_signer(ttl: i64) -> TokenSigner {
        TokenSigner::new(
            ISSUER,
            SigningKeyMaterial::Hs256 {
                secret: b"test-secret".to_vec(),
            },
            ttl,
        )
        .unwrap()
    }

    fn ed_signer() -> TokenSigner {
        TokenSigner::new(
            ISSUER,
            SigningKeyMaterial::EdDsa {
                kid: "k1".into(),
                seed: [5u8; 32],
            },
            DEFAULT_ACCESS_TOKEN_TTL_SECS,
        )
        .unwrap()
    }

    fn grant<'a>(scopes: &'a [String], ent: &'a Entitlements) -> AccessGrant<'a> {
        AccessGrant {
            user_id: "u-alice",
            client_id: "app1",
            session_id: "sess-1",
            scopes,
            risk: RiskState::Restricted,
            entitlements: ent,
        }
    }

    #[test]
    fn hs256_sign_then_verify_keeps_claims() {
        let signer = hs_signer(DEFAULT_ACCESS_TOKEN_TTL_SECS);
        let scopes = vec!["read".to_string()];
        let ent = BTreeMap::from([("beta".to_string(), true)]);
        let (token, minted) = signer.sign(&grant(&scopes, &ent)).unwrap();
        let claims = signer.verify(&token).unwrap();
        assert_eq!(claims, minted);
        assert_eq!(claims.aud, "app1");
        assert_eq!(claims.sid, "sess-1");
        assert_eq!(claims.risk, RiskState::Restricted);
        assert_eq!(claims.exp - claims.iat, DEFAULT_ACCESS_TOKEN_TTL_SECS);
        assert!(signer.jwks().keys.is_empty());
    }

    #[test]
    fn eddsa_publishes_matching_jwk() {
        let signer = ed_signer();
        let scopes = vec!["read".to_string()];
        let ent = Entitlements::new();
        let (token, _) = signer.sign(&grant(&scopes, &ent)).unwrap();
        assert!(signer.verify(&token).is_ok());

        let header = jsonwebtoken::decode_header(&token).unwrap();
        assert_eq!(header.alg, Algorithm::EdDSA);
        assert_eq!(header.kid.as_deref(), Some("k1"));

        let jwk = &signer.jwks().keys[0];
        assert_eq!(jwk.kty, "OKP");
        assert_eq!(jwk.crv, "Ed25519");
        let key = DecodingKey::from_ed_components(&jwk.x).unwrap();
        let mut validation = Validation::new(Algorithm::EdDSA);
        validation.validate_aud = false;
        assert!(decode::<AccessClaims>(&token, &key, &validation).is_ok());
    }

    #[test]
    fn wrong_issuer_wrong_key_and_garbage_all_collapse() {
        let signer = hs_signer(DEFAULT_ACCESS_TOKEN_TTL_SECS);
        let scopes = vec!["read".to_string()];
        let ent = Entitlements::new();
        let (token, _) = signer.sign(&grant(&scopes, &ent)).unwrap();

        let other_issuer = TokenSigner::new(
            "https://elsewhere.test",
            SigningKeyMaterial::Hs256 {
                secret: b"test-secret".to_vec(),
            },
            60,
        )
        .unwrap();
        let other_key = TokenSigner::new(
            ISSUER,
            SigningKeyMaterial::Hs256 {
                secret: b"another".to_vec(),
            },
            60,
        )
        .unwrap();

        assert!(matches!(other_issuer.verify(&token), Err(AuthError::InvalidToken)));
        assert!(matches!(other_key.verify(&token), Err(AuthError::InvalidToken)));
        assert!(matches!(signer.verify("not.a.jwt"), Err(AuthError::InvalidToken)));
        assert!(matches!(ed_signer().verify(&token), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn expired_token_is_invalid() {
        let signer = hs_signer(1);
        let now = Utc::now().timestamp();
        let claims = AccessClaims {
            iss: ISSUER.into(),
            sub: "u".into(),
            aud: "app1".into(),
            scp: vec!["read".into()],
            risk: RiskState::Ok,
            ent: Entitlements::new(),
            sid: "s".into(),
            iat: now - 120,
            exp: now - 60,
            jti: "j".into(),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"test-secret"),
        )
        .unwrap();
        assert!(matches!(signer.verify(&token), Err(AuthError::InvalidToken)));
    }

    #[test]
    fn seed_decoding_checks_length_and_derives_kid() {
        let seed_b64 = URL_SAFE_NO_PAD.encode([7u8; 32]);
        let SigningKeyMaterial::EdDsa { kid, .. } =
            SigningKeyMaterial::ed25519_from_base64(&seed_b64, None).unwrap()
        else {
            panic!("expected EdDSA material");
        };
        assert_eq!(kid.len(), 16);
        assert!(SigningKeyMaterial::ed25519_from_base64("AAAA", None).is_err());
    }

    #[test]
    fn debug_output_hides_key_material() {
        let rendered = format!("{:?}", SigningKeyMaterial::Hs256 { secret: b"hunter2".to_vec() });
        assert!(!rendered.contains("hunter2"));
    }

    #[test]
    fn zero_ttl_is_rejected() {
        assert!(
            TokenSigner::new(
                ISSUER,
                SigningKeyMaterial::Hs256 {
                    secret: b"s".to_vec()
                },
                0
            )
            .is_err()
        );
    }
}
