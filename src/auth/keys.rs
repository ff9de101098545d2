//! Verification key material and its cache.

use std::sync::Arc;
use std::time::{Duration, Instant};

use arc_swap::ArcSwap;
use async_trait::async_trait;
use jsonwebtoken::DecodingKey;
use jsonwebtoken::jwk::JwkSet;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use super::VerifyError;

/// One key a token may be verified against.
#[derive(Clone)]
pub struct VerifyKey {
    /// `None` matches any `kid`, including tokens without one.
    pub kid: Option<String>,
    pub key: DecodingKey,
}

impl std::fmt::Debug for VerifyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerifyKey").field("kid", &self.kid).finish_non_exhaustive()
    }
}

/// An immutable snapshot of the provider's keys.
#[derive(Debug, Default)]
pub struct KeySet {
    keys: Vec<VerifyKey>,
    fetched_at: Option<Instant>,
    /// Set when the latest fetch attempt failed; cleared by the next success.
    failed_at: Option<Instant>,
}

impl KeySet {
    fn fetched(keys: Vec<VerifyKey>) -> Self {
        Self { keys, fetched_at: Some(Instant::now()), failed_at: None }
    }

    /// The same keys, stamped with a failed attempt.
    fn after_failure(&self) -> Self {
        Self { keys: self.keys.clone(), fetched_at: self.fetched_at, failed_at: Some(Instant::now()) }
    }

    pub fn len(&self) -> usize { self.keys.len() }
    pub fn is_empty(&self) -> bool { self.keys.is_empty() }

    /// The first key matching `kid`.
    pub fn find(&self, kid: Option<&str>) -> Option<&VerifyKey> {
        self.keys.iter().find(|k| match (&k.kid, kid) {
            (None, _) => true,
            (Some(have), Some(want)) => have == want,
            (Some(_), None) => false,
        })
    }

    fn older_than(&self, age: Duration) -> bool {
        self.fetched_at.is_none_or(|at| at.elapsed() >= age)
    }

    fn attempted_within(&self, window: Duration) -> bool {
        self.fetched_at.max(self.failed_at).is_some_and(|at| at.elapsed() < window)
    }

    fn failed_within(&self, window: Duration) -> bool {
        self.failed_at.is_some_and(|at| at.elapsed() < window)
    }
}

/// `set`, unless no fetch has ever succeeded.
fn usable(set: Arc<KeySet>) -> Result<Arc<KeySet>, VerifyError> {
    match set.fetched_at {
        Some(_) => Ok(set),
        None => Err(VerifyError::Unavailable("verification keys could not be fetched".to_owned())),
    }
}

/// Where key material comes from.
#[async_trait]
pub trait KeySource: Send + Sync + 'static {
    async fn fetch(&self) -> Result<Vec<VerifyKey>, VerifyError>;
}

// ── Sources ───────────────────────────────────────────────────────────────────

/// A fixed HMAC secret. Useful for self-issued tokens and tests.
#[derive(Clone)]
pub struct StaticKeys {
    keys: Vec<VerifyKey>,
}

impl std::fmt::Debug for StaticKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticKeys").field("keys", &self.keys.len()).finish()
    }
}

impl StaticKeys {
    pub fn hmac(secret: &[u8]) -> Self {
        Self { keys: vec![VerifyKey { kid: None, key: DecodingKey::from_secret(secret) }] }
    }

    pub fn new(keys: Vec<VerifyKey>) -> Self {
        Self { keys }
    }
}

#[async_trait]
impl KeySource for StaticKeys {
    async fn fetch(&self) -> Result<Vec<VerifyKey>, VerifyError> {
        Ok(self.keys.clone())
    }
}

/// A JSON Web Key Set published by the identity provider.
#[derive(Debug, Clone)]
pub struct JwksSource {
    url: String,
    client: reqwest::Client,
}

impl JwksSource {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, VerifyError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VerifyError::Unavailable(e.to_string()))?;
        Ok(Self { url: url.into(), client })
    }
}

#[async_trait]
impl KeySource for JwksSource {
    async fn fetch(&self) -> Result<Vec<VerifyKey>, VerifyError> {
        let unavailable = |e: reqwest::Error| VerifyError::Unavailable(e.to_string());
        let set: JwkSet = self
            .client
            .get(&self.url)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(unavailable)?
            .json()
            .await
            .map_err(unavailable)?;

        let keys = set
            .keys
            .iter()
            .filter_map(|jwk| match DecodingKey::from_jwk(jwk) {
                Ok(key) => Some(VerifyKey { kid: jwk.common.key_id.clone(), key }),
                Err(e) => {
                    warn!(kid = ?jwk.common.key_id, error = %e, "skipping unusable JWK");
                    None
                }
            })
            .collect();
        Ok(keys)
    }
}

// ── Cache ─────────────────────────────────────────────────────────────────────

/// Read-mostly cache of a [`KeySource`].
///
/// Readers load the current [`KeySet`] without locking. The set is replaced
/// whole, so a reader sees either the old or the new keys.
///
/// - An expired set (older than `ttl`) is refreshed by one caller while the
///   others keep verifying against the expired keys.
/// - A token naming a `kid` the set lacks triggers a refresh and waits for
///   it, at most once per `cooldown`.
/// - At most one refresh is in flight; callers queued behind it reuse its
///   result instead of fetching again.
/// - A failed refresh keeps the previous keys and is not retried for
///   `cooldown`.
pub struct KeyCache<S> {
    source: S,
    ttl: Duration,
    cooldown: Duration,
    current: ArcSwap<KeySet>,
    refresh: Mutex<()>,
}

impl<S> std::fmt::Debug for KeyCache<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyCache")
            .field("ttl", &self.ttl)
            .field("cooldown", &self.cooldown)
            .field("keys", &self.current.load().len())
            .finish_non_exhaustive()
    }
}

/// Key sets that never change need no refresh.
impl KeyCache<StaticKeys> {
    pub fn fixed(keys: StaticKeys) -> Self {
        Self::new(keys, Duration::MAX, Duration::MAX)
    }
}

impl<S: KeySource> KeyCache<S> {
    pub fn new(source: S, ttl: Duration, cooldown: Duration) -> Self {
        Self {
            source,
            ttl,
            cooldown,
            current: ArcSwap::from_pointee(KeySet::default()),
            refresh: Mutex::new(()),
        }
    }

    /// The current key set, refreshed first if it has expired.
    pub async fn keys(&self) -> Result<Arc<KeySet>, VerifyError> {
        let current = self.current.load_full();
        if !current.older_than(self.ttl) {
            return Ok(current);
        }
        if current.failed_within(self.cooldown) {
            return usable(current);
        }
        if current.fetched_at.is_none() {
            return self.refresh(&current).await;
        }

        match self.refresh.try_lock() {
            Ok(guard) => self.refresh_locked(guard, &current).await,
            Err(_) => Ok(current),
        }
    }

    /// The key for `kid`, refetching once if the cached set lacks it.
    pub async fn find(&self, kid: Option<&str>) -> Result<VerifyKey, VerifyError> {
        let keys = self.keys().await?;
        if let Some(key) = keys.find(kid) {
            return Ok(key.clone());
        }
        if keys.attempted_within(self.cooldown) {
            return Err(VerifyError::UnknownKey(kid.map(str::to_owned)));
        }

        debug!(?kid, "unknown kid, refreshing keys");
        let keys = self.refresh(&keys).await?;
        keys.find(kid)
            .cloned()
            .ok_or_else(|| VerifyError::UnknownKey(kid.map(str::to_owned)))
    }

    async fn refresh(&self, observed: &Arc<KeySet>) -> Result<Arc<KeySet>, VerifyError> {
        let guard = self.refresh.lock().await;
        self.refresh_locked(guard, observed).await
    }

    /// Replaces `observed` with a fresh fetch, unless another caller already
    /// replaced it while this one waited for the lock.
    async fn refresh_locked(&self, _guard: MutexGuard<'_, ()>, observed: &Arc<KeySet>) -> Result<Arc<KeySet>, VerifyError> {
        let current = self.current.load_full();
        if !Arc::ptr_eq(&current, observed) {
            return usable(current);
        }

        match self.source.fetch().await {
            Ok(keys) => {
                info!(keys = keys.len(), "verification keys refreshed");
                let fresh = Arc::new(KeySet::fetched(keys));
                self.current.store(Arc::clone(&fresh));
                Ok(fresh)
            }
            Err(e) => {
                let kept = Arc::new(current.after_failure());
                self.current.store(Arc::clone(&kept));
                if kept.fetched_at.is_some() {
                    warn!(error = %e, "key refresh failed, keeping previous keys");
                    Ok(kept)
                } else {
                    warn!(error = %e, "initial key fetch failed");
                    Err(e)
                }
            }
        }
    }
}
