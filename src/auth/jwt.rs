//! JWT verification against cached provider keys.

use std::time::Duration;

use async_trait::async_trait;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, Validation, decode, decode_header};
use serde_json::{Map, Value};

use super::keys::{KeyCache, KeySource};
use super::{Identity, IdentityProvider, VerifyError};

/// What a token must satisfy besides a valid signature.
#[derive(Debug, Clone)]
pub struct JwtSettings {
    /// Accepted `alg` values. Anything else is rejected before key lookup.
    pub algorithms: Vec<Algorithm>,
    pub issuer: Option<String>,
    pub audience: Option<String>,
    /// Clock skew tolerance for `exp` and `nbf`.
    pub leeway: Duration,
}

impl Default for JwtSettings {
    fn default() -> Self {
        Self {
            algorithms: vec![Algorithm::RS256],
            issuer: None,
            audience: None,
            leeway: Duration::from_secs(5),
        }
    }
}

impl JwtSettings {
    /// HMAC-SHA256 tokens with no issuer or audience requirement.
    pub fn hs256() -> Self {
        Self { algorithms: vec![Algorithm::HS256], ..Self::default() }
    }
}

/// Verifies JWTs issued by an identity provider; `sub` becomes the user id.
#[derive(Debug)]
pub struct JwtProvider<S> {
    keys: KeyCache<S>,
    settings: JwtSettings,
}

impl<S: KeySource> JwtProvider<S> {
    pub fn new(keys: KeyCache<S>, settings: JwtSettings) -> Self {
        Self { keys, settings }
    }

    pub fn keys(&self) -> &KeyCache<S> {
        &self.keys
    }

    /// `alg` has already passed the allow-list. Only it is handed to the
    /// decoder, which rejects lists that mix key families.
    fn validation(&self, alg: Algorithm) -> Validation {
        let mut validation = Validation::new(alg);
        validation.leeway = self.settings.leeway.as_secs();
        validation.validate_nbf = true;
        if let Some(issuer) = &self.settings.issuer {
            validation.set_issuer(&[issuer]);
        }
        match &self.settings.audience {
            Some(audience) => validation.set_audience(&[audience]),
            None => validation.validate_aud = false,
        }
        validation
    }
}

#[async_trait]
impl<S: KeySource> IdentityProvider for JwtProvider<S> {
    async fn verify(&self, token: &str) -> Result<Identity, VerifyError> {
        let header = decode_header(token).map_err(|e| VerifyError::Malformed(e.to_string()))?;
        if !self.settings.algorithms.contains(&header.alg) {
            return Err(VerifyError::Rejected(format!("algorithm {:?} is not accepted", header.alg)));
        }

        let key = self.keys.find(header.kid.as_deref()).await?;
        let data = decode::<Map<String, Value>>(token, &key.key, &self.validation(header.alg))
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidToken | ErrorKind::Base64(_) | ErrorKind::Json(_) | ErrorKind::Utf8(_) => {
                    VerifyError::Malformed(e.to_string())
                }
                _ => VerifyError::Rejected(e.to_string()),
            })?;

        let claims = data.claims;
        let user_id = claims
            .get("sub")
            .and_then(Value::as_str)
            .filter(|sub| !sub.is_empty())
            .ok_or_else(|| VerifyError::Rejected("token has no subject".to_owned()))?
            .to_owned();

        Ok(Identity { user_id, claims })
    }
}
