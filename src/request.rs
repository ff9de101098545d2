//! Incoming HTTP request type.

use std::collections::HashMap;

use bytes::Bytes;
use http::header::{HeaderValue, IntoHeaderName};
use http::{HeaderMap, Method};
use serde::de::DeserializeOwned;

use crate::auth::AuthContext;
use crate::context::Context;
use crate::error::Error;
use crate::middleware::Target;

/// An incoming HTTP request plus the context bag its chain fills in.
///
/// Path parameters and query values are plain strings here. The
/// [`Validate`](crate::middleware::Validate) step is the only place they are
/// coerced into other types.
#[derive(Debug)]
pub struct Request {
    pub(crate) method: Method,
    pub(crate) path: String,
    pub(crate) headers: HeaderMap,
    pub(crate) body: Bytes,
    pub(crate) params: HashMap<String, String>,
    pub(crate) query: HashMap<String, String>,
    pub(crate) context: Context,
}

impl Request {
    /// Builds a request for `uri`, which may carry a query string.
    ///
    /// ```rust
    /// use http::Method;
    /// use tollgate::Request;
    ///
    /// let req = Request::new(Method::GET, "/api/transactions?from=2024-01-01");
    /// assert_eq!(req.path(), "/api/transactions");
    /// assert_eq!(req.query("from"), Some("2024-01-01"));
    /// ```
    pub fn new(method: Method, uri: &str) -> Self {
        let (path, query) = match uri.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (uri, None),
        };
        Self {
            method,
            path: path.to_owned(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            params: HashMap::new(),
            query: query.map(parse_query).unwrap_or_default(),
            context: Context::default(),
        }
    }

    pub fn with_header(mut self, name: impl IntoHeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub(crate) fn from_parts(parts: http::request::Parts, body: Bytes) -> Self {
        let mut req = Self::new(parts.method, parts.uri.path());
        req.query = parts.uri.query().map(parse_query).unwrap_or_default();
        req.headers = parts.headers;
        req.body = body;
        req
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn path(&self) -> &str { &self.path }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }
    pub fn params(&self) -> &HashMap<String, String> { &self.params }
    pub fn queries(&self) -> &HashMap<String, String> { &self.query }
    pub fn context(&self) -> &Context { &self.context }
    pub fn context_mut(&mut self) -> &mut Context { &mut self.context }

    /// Case-insensitive header lookup. Values that are not visible ASCII are skipped.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/accounts/{id}`, `req.param("id")` on `/accounts/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Returns a query value. When a key repeats, the last value wins.
    pub fn query(&self, key: &str) -> Option<&str> {
        self.query.get(key).map(String::as_str)
    }

    /// Shorthand for `req.context().auth()`.
    pub fn auth(&self) -> Result<&AuthContext, Error> {
        self.context.auth()
    }

    /// Shorthand for `req.context().valid(target)`.
    pub fn valid<T: DeserializeOwned>(&self, target: Target) -> Result<T, Error> {
        self.context.valid(target)
    }
}

fn parse_query(query: &str) -> HashMap<String, String> {
    url::form_urlencoded::parse(query.as_bytes()).into_owned().collect()
}
