use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{Flow, Middleware};
use crate::auth::AuthResolver;
use crate::error::Error;
use crate::request::Request;
use crate::response::Response;

/// What an [`AuthGate`] does with an anonymous caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateMode {
    /// Continue; the handler decides what anonymous callers see.
    Soft,
    /// Stop with `401 {"message":"Unauthorized"}`.
    Hard,
}

/// Resolves the caller and stores the [`AuthContext`](crate::auth::AuthContext)
/// in the request context for later steps and the handler.
#[derive(Debug, Clone)]
pub struct AuthGate {
    resolver: Arc<AuthResolver>,
    mode: GateMode,
}

impl AuthGate {
    pub fn new(resolver: Arc<AuthResolver>, mode: GateMode) -> Self {
        Self { resolver, mode }
    }

    pub fn soft(resolver: Arc<AuthResolver>) -> Self {
        Self::new(resolver, GateMode::Soft)
    }

    pub fn hard(resolver: Arc<AuthResolver>) -> Self {
        Self::new(resolver, GateMode::Hard)
    }
}

#[async_trait]
impl Middleware for AuthGate {
    async fn handle(&self, req: &mut Request) -> Result<Flow, Error> {
        let auth = self.resolver.resolve(req).await;
        let anonymous = !auth.is_authenticated();
        req.context_mut().set_auth(auth);

        if anonymous && self.mode == GateMode::Hard {
            debug!("anonymous caller stopped at hard gate");
            return Ok(Flow::Break(Response::unauthorized()));
        }
        Ok(Flow::Continue(()))
    }

    fn name(&self) -> &'static str {
        match self.mode {
            GateMode::Soft => "soft_auth_gate",
            GateMode::Hard => "hard_auth_gate",
        }
    }

    fn performs_io(&self) -> bool {
        true
    }
}
