//! Token signing and caching for App Store Connect API keys.
//!
//! Every request carries a short-lived ES256 JWT signed with the team's API
//! key. [`CredentialSigner`] caches the current token and only signs again
//! when the cached one is close to expiry or has been invalidated after the
//! service rejected it.

use crate::config::Credentials;
use crate::errors::{AppStoreConnectError, AppStoreConnectResult};
use crate::observability::TracingHooks;
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Token lifetime. Twenty minutes is the longest the service accepts.
pub const TOKEN_LIFETIME_SECS: i64 = 20 * 60;

/// Cached tokens with less than this many seconds left are re-signed.
pub const REFRESH_MARGIN_SECS: i64 = 2 * 60;

/// Audience claim expected by the service.
pub const AUDIENCE: &str = "appstoreconnect-v1";

/// JWT claims for App Store Connect API keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Issuer id.
    pub iss: String,
    /// Issued at (Unix timestamp).
    pub iat: i64,
    /// Expiration (Unix timestamp).
    pub exp: i64,
    /// Audience.
    pub aud: String,
}

impl Claims {
    /// Builds claims for a token issued at `now`.
    pub fn new(issuer_id: &str, now: i64) -> Self {
        Self {
            iss: issuer_id.to_string(),
            iat: now,
            exp: now + TOKEN_LIFETIME_SECS,
            aud: AUDIENCE.to_string(),
        }
    }
}

/// Signing primitive behind [`CredentialSigner`].
pub trait TokenSigner: Send + Sync {
    /// Signs the claims and returns the compact JWT.
    fn sign(&self, claims: &Claims) -> AppStoreConnectResult<String>;
}

/// ES256 signer using a PKCS#8 `.p8` key.
pub struct Es256Signer {
    key_id: String,
    key: EncodingKey,
}

impl Es256Signer {
    /// Parses the private key. Fails with a configuration error if it is not
    /// a valid EC PEM.
    pub fn new(
        key_id: impl Into<String>,
        private_key: &SecretString,
    ) -> AppStoreConnectResult<Self> {
        let key = EncodingKey::from_ec_pem(private_key.expose_secret().as_bytes()).map_err(|e| {
            AppStoreConnectError::configuration(format!("Failed to parse private key: {}", e))
        })?;

        Ok(Self {
            key_id: key_id.into(),
            key,
        })
    }
}

impl TokenSigner for Es256Signer {
    fn sign(&self, claims: &Claims) -> AppStoreConnectResult<String> {
        let mut header = Header::new(Algorithm::ES256);
        header.kid = Some(self.key_id.clone());

        encode(&header, claims, &self.key).map_err(|e| {
            AppStoreConnectError::configuration(format!("Failed to sign token: {}", e))
        })
    }
}

/// A signed token and its absolute expiry.
#[derive(Debug, Clone)]
struct SignedCredential {
    token: SecretString,
    expires_at: i64,
}

impl SignedCredential {
    fn is_usable_at(&self, now: i64) -> bool {
        self.expires_at - now > REFRESH_MARGIN_SECS
    }
}

/// Issues and caches bearer tokens.
///
/// Shared by every concurrent call of a client. Two calls racing past an
/// expired cache may both sign; the later write wins and both tokens are
/// valid.
pub struct CredentialSigner {
    issuer_id: String,
    signer: Arc<dyn TokenSigner>,
    cache: RwLock<Option<SignedCredential>>,
}

impl CredentialSigner {
    /// Creates a signer from API key credentials.
    ///
    /// Missing fields or an unparseable key are reported here, before any
    /// request is attempted.
    pub fn new(credentials: &Credentials) -> AppStoreConnectResult<Self> {
        credentials.validate()?;
        let signer = Es256Signer::new(credentials.key_id.clone(), &credentials.private_key)?;
        Ok(Self::with_signer(credentials.issuer_id.clone(), Arc::new(signer)))
    }

    /// Creates a signer around a custom signing primitive.
    pub fn with_signer(issuer_id: impl Into<String>, signer: Arc<dyn TokenSigner>) -> Self {
        Self {
            issuer_id: issuer_id.into(),
            signer,
            cache: RwLock::new(None),
        }
    }

    /// Returns a token with more than [`REFRESH_MARGIN_SECS`] left, signing a
    /// new one if the cache cannot provide it.
    pub async fn issue_token(&self) -> AppStoreConnectResult<String> {
        let now = Utc::now().timestamp();

        {
            let cache = self.cache.read().await;
            if let Some(ref cached) = *cache {
                if cached.is_usable_at(now) {
                    return Ok(cached.token.expose_secret().clone());
                }
            }
        }

        let claims = Claims::new(&self.issuer_id, now);
        let token = self.signer.sign(&claims)?;

        *self.cache.write().await = Some(SignedCredential {
            token: SecretString::new(token.clone()),
            expires_at: claims.exp,
        });
        TracingHooks::on_token_signed(claims.exp);

        Ok(token)
    }

    /// Drops the cached token so the next call signs a fresh one.
    pub async fn invalidate(&self) {
        *self.cache.write().await = None;
        TracingHooks::on_token_invalidated();
    }

    /// Returns the `Authorization` header value.
    pub async fn authorization_header_value(&self) -> AppStoreConnectResult<String> {
        Ok(format!("Bearer {}", self.issue_token().await?))
    }

    /// Expiry of the cached token, if one is cached.
    pub async fn cached_expiry(&self) -> Option<i64> {
        self.cache.read().await.as_ref().map(|c| c.expires_at)
    }
}

impl std::fmt::Debug for CredentialSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialSigner")
            .field("issuer_id", &self.issuer_id)
            .finish_non_exhaustive()
    }
}
