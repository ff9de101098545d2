//! Per-request context bag.
//!
//! Owned by exactly one in-flight dispatch and dropped with its request.
//! Chain steps write into it; later steps and the handler read back out.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::auth::AuthContext;
use crate::error::Error;
use crate::middleware::Target;

#[derive(Debug, Default)]
pub struct Context {
    auth: Option<AuthContext>,
    validated: HashMap<Target, Value>,
    extensions: http::Extensions,
}

impl Context {
    pub(crate) fn set_auth(&mut self, auth: AuthContext) {
        self.auth = Some(auth);
    }

    /// The auth context stored by an [`AuthGate`](crate::middleware::AuthGate).
    ///
    /// Reading it on a route without a gate is a programming error and
    /// surfaces as a fault.
    pub fn auth(&self) -> Result<&AuthContext, Error> {
        self.auth.as_ref().ok_or_else(|| Error::MissingContext("auth".to_owned()))
    }

    pub(crate) fn set_valid(&mut self, target: Target, value: Value) {
        self.validated.insert(target, value);
    }

    /// The raw validated value for `target`.
    pub fn valid_value(&self, target: Target) -> Result<&Value, Error> {
        self.validated
            .get(&target)
            .ok_or_else(|| Error::MissingContext(format!("validated {target}")))
    }

    /// The validated value for `target`, deserialized into `T`.
    pub fn valid<T: DeserializeOwned>(&self, target: Target) -> Result<T, Error> {
        let value = self.valid_value(target)?.clone();
        serde_json::from_value(value).map_err(|source| Error::Extract { target, source })
    }

    /// Stores an arbitrary value for later steps, one per type.
    pub fn insert<T: Clone + Send + Sync + 'static>(&mut self, value: T) -> Option<T> {
        self.extensions.insert(value)
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions.get::<T>()
    }
}
