//! # tollgate
//!
//! An authenticated, validated request pipeline for JSON APIs behind a
//! reverse proxy.
//!
//! Every request goes through the same short path:
//!
//! 1. **Match.** The route table is scanned in registration order and the
//!    first route whose method and pattern fit wins. No match is a `404`
//!    before anything else runs.
//! 2. **Chain.** The route's steps run in order: typically an [`AuthGate`]
//!    followed by [`Validate`] steps for params, query and body. Any step may
//!    end the chain with its own response (`401`, `400`).
//! 3. **Handle.** The handler reads the caller and the validated inputs from
//!    the request context and produces the one response.
//!
//! Faults and panics anywhere in the chain become a generic `500`; their
//! details go to the logs, never to the client.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use tollgate::auth::{AuthResolver, JwtProvider, JwtSettings, KeyCache, StaticKeys};
//! use tollgate::middleware::Target;
//! use tollgate::schema::{Field, Schema};
//! use tollgate::{Error, Json, Request, Route, Router, Server};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Error> {
//!     let keys = KeyCache::fixed(StaticKeys::hmac(b"dev-secret"));
//!     let provider = JwtProvider::new(keys, JwtSettings::hs256());
//!     let auth = Arc::new(AuthResolver::new(provider));
//!
//!     let app = Router::builder()
//!         .route(Route::get("/hello/{test}")
//!             .validate_params(Schema::new().field(Field::string("test")))
//!             .to(hello))
//!         .route(Route::get("/me").hard_gate(&auth).to(me))
//!         .build()?;
//!
//!     Server::bind("0.0.0.0:3000").serve(app).await
//! }
//!
//! async fn hello(req: Request) -> Result<Json<serde_json::Value>, Error> {
//!     let params: serde_json::Value = req.valid(Target::Params)?;
//!     Ok(Json(serde_json::json!({ "message": "Hello", "test": params["test"] })))
//! }
//!
//! async fn me(req: Request) -> Result<Json<serde_json::Value>, Error> {
//!     let user_id = req.auth()?.user_id().unwrap_or_default().to_owned();
//!     Ok(Json(serde_json::json!({ "userId": user_id })))
//! }
//! ```

mod context;
mod error;
mod handler;
mod pattern;
mod request;
mod response;
mod router;
mod server;

pub mod auth;
pub mod config;
pub mod health;
pub mod middleware;
pub mod schema;

pub use auth::AuthContext;
pub use config::AppConfig;
pub use context::Context;
pub use error::Error;
pub use handler::Handler;
pub use middleware::{AuthGate, GateMode, Middleware, Target, Validate};
pub use request::Request;
pub use response::{IntoOutcome, IntoResponse, Json, Response, ResponseBuilder, WithStatus};
pub use router::{DEFAULT_BASE_PATH, Endpoint, Route, Router, RouterBuilder};
pub use server::Server;
