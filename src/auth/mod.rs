//! Caller identity.
//!
//! [`AuthResolver`] turns a request into an [`AuthContext`]. It finds a
//! bearer credential in the `Authorization` header or a session cookie and
//! asks an [`IdentityProvider`] to verify it.
//!
//! # Fail-open
//!
//! Resolution never fails. A missing, malformed, expired or unverifiable
//! credential, a provider error, and a provider that does not answer within
//! the timeout all resolve to [`AuthContext::anonymous`]. Whether anonymous
//! callers may proceed is decided by the route's
//! [`AuthGate`](crate::middleware::AuthGate), not here. This trades strict
//! rejection of a flaky identity provider for availability: with the provider
//! down, hard-gated routes answer 401 and soft-gated routes serve anonymous
//! output.

mod jwt;
mod keys;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use http::header::{AUTHORIZATION, COOKIE, HeaderName};
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::request::Request;

pub use jwt::{JwtProvider, JwtSettings};
pub use keys::{JwksSource, KeyCache, KeySet, KeySource, StaticKeys, VerifyKey};

/// Default session cookie name.
pub const SESSION_COOKIE: &str = "__session";

/// A verified caller, as reported by an [`IdentityProvider`].
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub user_id: String,
    pub claims: Map<String, Value>,
}

/// Why a credential could not be verified.
#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("malformed token: {0}")]
    Malformed(String),

    #[error("token rejected: {0}")]
    Rejected(String),

    #[error("no verification key for kid {0:?}")]
    UnknownKey(Option<String>),

    /// The provider or its key material could not be reached.
    #[error("identity provider unavailable: {0}")]
    Unavailable(String),
}

/// Verifies a raw credential.
///
/// Implement this to plug in an identity service; [`JwtProvider`] covers
/// JWT-issuing providers. Test doubles implement it directly.
#[async_trait]
pub trait IdentityProvider: Send + Sync + 'static {
    async fn verify(&self, token: &str) -> Result<Identity, VerifyError>;
}

/// Who is calling, as far as this request is concerned.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthContext {
    user_id: Option<String>,
    claims: Map<String, Value>,
}

impl AuthContext {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn authenticated(identity: Identity) -> Self {
        Self { user_id: Some(identity.user_id), claims: identity.claims }
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }

    /// Raw claims from the verified credential. Empty when anonymous.
    pub fn claims(&self) -> &Map<String, Value> {
        &self.claims
    }

    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.claims.get(name)
    }
}

/// Finds and verifies the caller's credential.
pub struct AuthResolver {
    provider: Arc<dyn IdentityProvider>,
    header: HeaderName,
    cookie: String,
    timeout: Duration,
}

impl std::fmt::Debug for AuthResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthResolver")
            .field("header", &self.header)
            .field("cookie", &self.cookie)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl AuthResolver {
    /// Reads `Authorization`, then the `__session` cookie, and gives the
    /// provider five seconds to answer.
    pub fn new(provider: impl IdentityProvider) -> Self {
        Self::from_arc(Arc::new(provider))
    }

    pub fn from_arc(provider: Arc<dyn IdentityProvider>) -> Self {
        Self {
            provider,
            header: AUTHORIZATION,
            cookie: SESSION_COOKIE.to_owned(),
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_header(mut self, header: HeaderName) -> Self {
        self.header = header;
        self
    }

    pub fn with_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.cookie = cookie.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Resolves the caller. Never fails; see the module docs.
    pub async fn resolve(&self, req: &Request) -> AuthContext {
        let Some(token) = self.credential(req) else {
            return AuthContext::anonymous();
        };

        match tokio::time::timeout(self.timeout, self.provider.verify(token)).await {
            Ok(Ok(identity)) => {
                debug!(user_id = %identity.user_id, "credential verified");
                AuthContext::authenticated(identity)
            }
            Ok(Err(VerifyError::Unavailable(reason))) => {
                warn!(%reason, "identity provider unavailable, treating caller as anonymous");
                AuthContext::anonymous()
            }
            Ok(Err(e)) => {
                debug!(error = %e, "credential rejected, treating caller as anonymous");
                AuthContext::anonymous()
            }
            Err(_) => {
                warn!(timeout_ms = self.timeout.as_millis() as u64, "identity provider timed out, treating caller as anonymous");
                AuthContext::anonymous()
            }
        }
    }

    /// Bearer token from the configured header, else the session cookie.
    fn credential<'r>(&self, req: &'r Request) -> Option<&'r str> {
        let bearer = req
            .headers()
            .get(&self.header)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| {
                let (scheme, token) = v.trim().split_once(' ')?;
                scheme.eq_ignore_ascii_case("bearer").then(|| token.trim())
            })
            .filter(|t| !t.is_empty());

        bearer.or_else(|| {
            req.headers()
                .get_all(COOKIE)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .flat_map(|v| v.split(';'))
                .filter_map(|pair| pair.trim().split_once('='))
                .find(|(name, _)| *name == self.cookie)
                .map(|(_, value)| value.trim())
                .filter(|t| !t.is_empty())
        })
    }
}
