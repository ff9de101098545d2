//! Health-check handlers.
//!
//! | Probe | Suggested path | Body |
//! |---|---|---|
//! | Liveness | `/healthz` | `{"status":"ok"}` |
//! | Readiness | `/readyz` | `{"status":"ready"}` |
//!
//! Neither runs auth or validation. Register them without steps:
//!
//! ```rust
//! use tollgate::{Route, Router, health};
//!
//! let app = Router::builder()
//!     .route(Route::get("/healthz").to(health::liveness))
//!     .route(Route::get("/readyz").to(health::readiness))
//!     .build()
//!     .unwrap();
//! # let _ = app;
//! ```
//!
//! Replace `readiness` with your own handler if the service must check its
//! dependencies first.

use crate::{Request, Response};

/// Always `200 {"status":"ok"}`: answering at all means the process is alive.
pub async fn liveness(_req: Request) -> Response {
    Response::json(r#"{"status":"ok"}"#)
}

pub async fn readiness(_req: Request) -> Response {
    Response::json(r#"{"status":"ready"}"#)
}
