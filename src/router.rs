//! Route table and dispatcher.
//!
//! Routes are declared up front and compiled once by [`RouterBuilder::build`]
//! into an immutable [`Router`]. Lookup is a linear scan in registration
//! order and the **first** route whose method and pattern match wins. There
//! is no specificity ranking: register `/accounts/summary` before
//! `/accounts/{id}` or the parameter route will shadow it.

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use http::Method;
use tracing::{Instrument, debug, error, info, info_span};

use crate::auth::AuthResolver;
use crate::error::Error;
use crate::handler::{BoxedHandler, Handler};
use crate::middleware::{AuthGate, Flow, GateMode, Middleware, Target, Validate};
use crate::pattern::Pattern;
use crate::request::Request;
use crate::response::Response;
use crate::schema::Schema;

/// Base path applied when none is configured.
pub const DEFAULT_BASE_PATH: &str = "/api";

// ── Declarations ──────────────────────────────────────────────────────────────

/// A route under construction: method, pattern and the steps that run before
/// its handler. Finish it with [`Route::to`].
///
/// ```rust
/// use tollgate::{Request, Response, Route};
/// use tollgate::schema::{Field, Schema};
///
/// async fn hello(req: Request) -> Result<Response, tollgate::Error> {
///     # let _ = req;
///     Ok(Response::json(r#"{"message":"Hello"}"#))
/// }
///
/// let endpoint = Route::get("/hello/{test}")
///     .validate_params(Schema::new().field(Field::string("test")))
///     .to(hello);
/// # let _ = endpoint;
/// ```
pub struct Route {
    method: Method,
    pattern: String,
    steps: Vec<Arc<dyn Middleware>>,
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("method", &self.method)
            .field("pattern", &self.pattern)
            .field("steps", &self.steps.iter().map(|s| s.name()).collect::<Vec<_>>())
            .finish()
    }
}

impl Route {
    pub fn new(method: Method, pattern: &str) -> Self {
        Self { method, pattern: pattern.to_owned(), steps: Vec::new() }
    }

    pub fn get(pattern: &str) -> Self { Self::new(Method::GET, pattern) }
    pub fn post(pattern: &str) -> Self { Self::new(Method::POST, pattern) }
    pub fn put(pattern: &str) -> Self { Self::new(Method::PUT, pattern) }
    pub fn patch(pattern: &str) -> Self { Self::new(Method::PATCH, pattern) }
    pub fn delete(pattern: &str) -> Self { Self::new(Method::DELETE, pattern) }

    /// Appends a step. Steps run in the order they were added.
    pub fn layer(mut self, step: impl Middleware) -> Self {
        self.steps.push(Arc::new(step));
        self
    }

    pub fn gate(self, resolver: &Arc<AuthResolver>, mode: GateMode) -> Self {
        self.layer(AuthGate::new(Arc::clone(resolver), mode))
    }

    /// Anonymous callers are answered with 401 before any later step runs.
    pub fn hard_gate(self, resolver: &Arc<AuthResolver>) -> Self {
        self.gate(resolver, GateMode::Hard)
    }

    /// The caller is resolved but anonymous callers continue.
    pub fn soft_gate(self, resolver: &Arc<AuthResolver>) -> Self {
        self.gate(resolver, GateMode::Soft)
    }

    pub fn validate(self, target: Target, schema: Schema) -> Self {
        self.layer(Validate::new(target, schema))
    }

    pub fn validate_params(self, schema: Schema) -> Self { self.validate(Target::Params, schema) }
    pub fn validate_query(self, schema: Schema) -> Self { self.validate(Target::Query, schema) }
    pub fn validate_body(self, schema: Schema) -> Self { self.validate(Target::Body, schema) }

    /// Terminates the chain with `handler`.
    pub fn to(self, handler: impl Handler) -> Endpoint {
        Endpoint { route: self, handler: handler.into_boxed_handler() }
    }
}

/// A complete route declaration, ready for [`RouterBuilder::route`].
pub struct Endpoint {
    route: Route,
    handler: BoxedHandler,
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint").field("route", &self.route).finish_non_exhaustive()
    }
}

// ── Builder ───────────────────────────────────────────────────────────────────

/// Collects route declarations; [`build`](Self::build) compiles them.
#[derive(Debug)]
pub struct RouterBuilder {
    base_path: String,
    endpoints: Vec<Endpoint>,
}

impl RouterBuilder {
    /// Mounts every route under `base_path`. `""` or `"/"` mounts at the root.
    pub fn base_path(mut self, base_path: &str) -> Self {
        self.base_path = base_path.trim_end_matches('/').to_owned();
        self
    }

    pub fn route(mut self, endpoint: Endpoint) -> Self {
        self.endpoints.push(endpoint);
        self
    }

    /// Parses every pattern. The first malformed one fails the whole table.
    pub fn build(self) -> Result<Router, Error> {
        if !self.base_path.is_empty() && !self.base_path.starts_with('/') {
            return Err(Error::invalid_route(&self.base_path, "base path must start with `/`"));
        }

        let routes = self
            .endpoints
            .into_iter()
            .map(|Endpoint { route, handler }| {
                Ok(CompiledRoute {
                    method: route.method,
                    pattern: Pattern::parse(&route.pattern)?,
                    steps: route.steps,
                    handler,
                })
            })
            .collect::<Result<Vec<_>, Error>>()?;

        info!(base_path = %self.base_path, routes = routes.len(), "route table built");
        Ok(Router { base_path: self.base_path, routes })
    }
}

// ── Router ────────────────────────────────────────────────────────────────────

struct CompiledRoute {
    method: Method,
    pattern: Pattern,
    steps: Vec<Arc<dyn Middleware>>,
    handler: BoxedHandler,
}

impl CompiledRoute {
    /// Runs the chain. Exactly one of the steps or the handler produces the response.
    async fn run(&self, mut req: Request) -> Result<Response, Error> {
        for step in &self.steps {
            debug!(step = step.name(), io = step.performs_io(), "running step");
            if let Flow::Break(response) = step.handle(&mut req).await? {
                debug!(step = step.name(), status = response.status_code().as_u16(), "step ended the chain");
                return Ok(response);
            }
        }
        self.handler.call(req).await
    }
}

/// The immutable route table. Share it behind an `Arc`; lookups take no locks.
pub struct Router {
    base_path: String,
    routes: Vec<CompiledRoute>,
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("base_path", &self.base_path)
            .field(
                "routes",
                &self.routes.iter().map(|r| format!("{} {}", r.method, r.pattern.as_str())).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl Router {
    pub fn builder() -> RouterBuilder {
        RouterBuilder { base_path: DEFAULT_BASE_PATH.to_owned(), endpoints: Vec::new() }
    }

    pub fn base_path(&self) -> &str {
        &self.base_path
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Routes one request and produces its one response.
    ///
    /// - no matching route: `404`, and no step runs
    /// - a step or the handler fails or panics: `500` with a generic body
    pub async fn dispatch(&self, mut req: Request) -> Response {
        let span = info_span!("dispatch", method = %req.method, path = %req.path);

        async move {
            let started = Instant::now();

            let Some((route, params)) = self.lookup(&req.method, &req.path) else {
                debug!("no route matched");
                let response = Response::not_found();
                info!(status = response.status_code().as_u16(), "request completed");
                return response;
            };
            req.params = params;

            let response = match AssertUnwindSafe(route.run(req)).catch_unwind().await {
                Ok(Ok(response)) => response,
                Ok(Err(e)) => {
                    error!(route = route.pattern.as_str(), error = %e, "chain fault");
                    Response::internal_error()
                }
                Err(panic) => {
                    let reason = panic
                        .downcast_ref::<&str>()
                        .map(|s| (*s).to_owned())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_default();
                    error!(route = route.pattern.as_str(), %reason, "chain panicked");
                    Response::internal_error()
                }
            };

            info!(
                route = route.pattern.as_str(),
                status = response.status_code().as_u16(),
                latency_us = started.elapsed().as_micros() as u64,
                "request completed"
            );
            response
        }
        .instrument(span)
        .await
    }

    /// [`dispatch`](Self::dispatch), abandoned as soon as `cancelled`
    /// resolves. The chain stops at its next await point, its context is
    /// dropped, and `None` is returned instead of a partial response.
    pub async fn dispatch_until<C>(&self, req: Request, cancelled: C) -> Option<Response>
    where
        C: Future<Output = ()>,
    {
        tokio::select! {
            biased;
            () = cancelled => {
                debug!("request cancelled");
                None
            }
            response = self.dispatch(req) => Some(response),
        }
    }

    fn lookup(&self, method: &Method, path: &str) -> Option<(&CompiledRoute, HashMap<String, String>)> {
        let path = self.strip_base_path(path)?;
        self.routes
            .iter()
            .filter(|r| r.method == *method)
            .find_map(|r| r.pattern.matches(path).map(|params| (r, params)))
    }

    /// The path relative to the base path; `None` when it lies outside.
    fn strip_base_path<'p>(&self, path: &'p str) -> Option<&'p str> {
        let rest = path.strip_prefix(self.base_path.as_str())?;
        match rest {
            "" => Some("/"),
            _ if rest.starts_with('/') => Some(rest),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use http::StatusCode;

    use super::*;

    async fn named(req: Request) -> Response {
        let name = req.param("name").unwrap_or("static").to_owned();
        Response::json(serde_json::json!({ "matched": name }).to_string())
    }

    fn body(res: &Response) -> serde_json::Value {
        serde_json::from_slice(res.body()).unwrap()
    }

    #[tokio::test]
    async fn first_registered_route_wins() {
        let router = Router::builder()
            .route(Route::get("/accounts/{name}").to(named))
            .route(Route::get("/accounts/summary").to(named))
            .build()
            .unwrap();

        let res = router.dispatch(Request::new(Method::GET, "/api/accounts/summary")).await;
        assert_eq!(body(&res)["matched"], "summary");
    }

    #[tokio::test]
    async fn base_path_is_stripped_and_required() {
        let router = Router::builder()
            .base_path("/api/")
            .route(Route::get("/").to(named))
            .route(Route::get("/accounts").to(named))
            .build()
            .unwrap();

        assert_eq!(router.base_path(), "/api");
        assert_eq!(router.dispatch(Request::new(Method::GET, "/api")).await.status_code(), StatusCode::OK);
        assert_eq!(router.dispatch(Request::new(Method::GET, "/api/accounts")).await.status_code(), StatusCode::OK);
        assert_eq!(router.dispatch(Request::new(Method::GET, "/accounts")).await.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(router.dispatch(Request::new(Method::GET, "/apiaccounts")).await.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn method_must_match() {
        let router = Router::builder().route(Route::post("/accounts").to(named)).build().unwrap();
        let res = router.dispatch(Request::new(Method::GET, "/api/accounts")).await;
        assert_eq!(res.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(res.body(), br#"{"message":"Not Found"}"#);
    }

    #[tokio::test]
    async fn root_base_path_mounts_at_root() {
        let router = Router::builder().base_path("/").route(Route::get("/healthz").to(named)).build().unwrap();
        assert_eq!(router.dispatch(Request::new(Method::GET, "/healthz")).await.status_code(), StatusCode::OK);
    }

    #[test]
    fn malformed_pattern_fails_the_build() {
        let err = Router::builder().route(Route::get("/a/{*rest}/b").to(named)).build().unwrap_err();
        assert!(matches!(err, Error::InvalidRoute { .. }));

        let err = Router::builder().base_path("api").build().unwrap_err();
        assert!(matches!(err, Error::InvalidRoute { .. }));
    }

    #[tokio::test]
    async fn handler_panic_becomes_500() {
        async fn boom(_req: Request) -> Response {
            panic!("ledger exploded")
        }

        let router = Router::builder().route(Route::get("/boom").to(boom)).build().unwrap();
        let res = router.dispatch(Request::new(Method::GET, "/api/boom")).await;
        assert_eq!(res.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(res.body(), br#"{"message":"Internal Server Error"}"#);
    }
}
