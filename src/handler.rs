//! Handler trait and type erasure.
//!
//! The route table holds handlers of different concrete types side by side,
//! so each one is wrapped once at registration and stored behind a trait
//! object:
//!
//! ```text
//! async fn list(req: Request) -> Result<Json<Vec<Account>>, Error>   ← user writes this
//!        ↓ Route::get("/accounts").to(list)
//! list.into_boxed_handler()                                          ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(list))                                          ← stored as BoxedHandler
//!        ↓
//! handler.call(req)  at request time                                 ← one vtable dispatch
//!        ↓
//! Box::pin(async { list(req).await.into_outcome() })                 ← BoxFuture
//! ```
//!
//! # Faults
//!
//! The erased future resolves to `Result<Response, Error>`, whatever the
//! handler itself returns:
//!
//! - a bare [`Response`], [`Json`](crate::Json) or other
//!   [`IntoOutcome`] value becomes `Ok`;
//! - `Ok(value)` from a `Result`-returning handler is converted the same way;
//! - `Err(e)` is converted with `Into<Error>` and passed up unchanged.
//!
//! The handler never builds the `500` itself. [`Router::dispatch`](crate::Router::dispatch)
//! receives the `Err`, logs it with the route pattern, and answers
//! `{"message":"Internal Server Error"}`. Panics take the same exit. Expected
//! outcomes such as `404` or `409` should be returned as responses, not errors.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::Error;
use crate::request::Request;
use crate::response::{IntoOutcome, Response};

/// A heap-allocated, type-erased future that resolves to a response or a fault.
#[doc(hidden)]
pub type BoxFuture = Pin<Box<dyn Future<Output = Result<Response, Error>> + Send + 'static>>;

#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, req: Request) -> BoxFuture;
}

/// A type-erased handler shared across concurrent requests.
#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

/// Implemented for every valid terminal handler.
///
/// You never implement this yourself. It is satisfied by any `async fn` with
/// the signature:
///
/// ```text
/// async fn name(req: Request) -> impl IntoOutcome
/// ```
///
/// The handler receives the request after every step of its chain has
/// continued, so validated inputs and the auth context are already in
/// `req.context()`.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
}

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoOutcome + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoOutcome + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoOutcome + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture {
        let fut = (self.0)(req);
        Box::pin(async move { fut.await.into_outcome() })
    }
}
