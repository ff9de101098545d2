//! Middleware layer.
//!
//! A route's chain is an ordered list of steps followed by its handler. Each
//! step sees the request (and its context bag) and either continues or ends
//! the chain with a [`Response`]:
//!
//! ```text
//! AuthGate ──Continue──▶ Validate(body) ──Continue──▶ handler ──▶ Response
//!    │                        │
//!    └─Break(401)             └─Break(400)
//! ```
//!
//! Built-in steps:
//! - [`AuthGate`] resolves the caller, soft or hard
//! - [`Validate`] checks params, query or body against a [`Schema`](crate::schema::Schema)
//! - [`guard`] wraps a synchronous closure for custom checks

mod auth;
mod validate;

use std::fmt;
use std::ops::ControlFlow;

use async_trait::async_trait;

use crate::error::Error;
use crate::request::Request;
use crate::response::Response;

pub use auth::{AuthGate, GateMode};
pub use validate::{Target, Validate};

/// What a step decided: `Continue(())` to run the next step, `Break(response)`
/// to end the chain.
pub type Flow = ControlFlow<Response>;

/// One step of a route's chain.
///
/// Expected failures (bad input, missing credentials) become a
/// `Break(response)`. Only unexpected faults are returned as `Err`; the
/// dispatcher answers those with a generic 500.
#[async_trait]
pub trait Middleware: Send + Sync + 'static {
    async fn handle(&self, req: &mut Request) -> Result<Flow, Error>;

    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Whether this step calls out to anything beyond the request itself.
    /// Steps that return `false` are deterministic for a given request.
    fn performs_io(&self) -> bool {
        false
    }
}

/// Builds a step from a synchronous check. Returning `Some(response)` ends
/// the chain with that response.
///
/// ```rust
/// use http::StatusCode;
/// use tollgate::Response;
/// use tollgate::middleware::guard;
///
/// let json_only = guard("json_only", |req| {
///     let is_json = req.header("content-type").is_some_and(|v| v.starts_with("application/json"));
///     (!is_json).then(|| Response::message(StatusCode::UNSUPPORTED_MEDIA_TYPE, "Expected JSON"))
/// });
/// # let _ = json_only;
/// ```
pub fn guard<F>(name: &'static str, check: F) -> Guard<F>
where
    F: Fn(&Request) -> Option<Response> + Send + Sync + 'static,
{
    Guard { name, check }
}

/// A step built with [`guard`].
pub struct Guard<F> {
    name: &'static str,
    check: F,
}

impl<F> fmt::Debug for Guard<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Guard").field("name", &self.name).finish_non_exhaustive()
    }
}

#[async_trait]
impl<F> Middleware for Guard<F>
where
    F: Fn(&Request) -> Option<Response> + Send + Sync + 'static,
{
    async fn handle(&self, req: &mut Request) -> Result<Flow, Error> {
        Ok(match (self.check)(req) {
            Some(response) => Flow::Break(response),
            None => Flow::Continue(()),
        })
    }

    fn name(&self) -> &'static str {
        self.name
    }
}
