//! Outgoing HTTP response type and the conversion traits handlers return through.
//!
//! Every body tollgate produces is a JSON object. Build a [`Response`] in your
//! handler, or return [`Json`] and let serde do it.

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};
use http_body_util::Full;
use serde::Serialize;

use crate::error::Error;
use crate::schema::ValidationErrors;

const APPLICATION_JSON: &str = "application/json";

// ── Response ─────────────────────────────────────────────────────────────────

/// An outgoing HTTP response.
///
/// # Shortcuts
///
/// ```rust
/// use http::StatusCode;
/// use tollgate::Response;
///
/// Response::json(br#"{"id":1}"#.to_vec());
/// Response::message(StatusCode::NOT_FOUND, "Not Found");
/// Response::status(StatusCode::NO_CONTENT);
/// ```
///
/// # Builder (custom status or headers)
///
/// ```rust
/// use http::StatusCode;
/// use tollgate::Response;
///
/// Response::builder()
///     .status(StatusCode::CREATED)
///     .header("location", "/api/accounts/42")
///     .json(br#"{"id":"42"}"#.to_vec());
/// ```
#[derive(Debug, Clone)]
pub struct Response {
    pub(crate) body: Bytes,
    pub(crate) headers: HeaderMap,
    pub(crate) status: StatusCode,
}

impl Response {
    /// `200 OK` with a pre-serialized JSON body.
    pub fn json(body: impl Into<Bytes>) -> Self {
        Self::builder().json(body)
    }

    /// Response with no body.
    pub fn status(code: StatusCode) -> Self {
        Self { body: Bytes::new(), headers: HeaderMap::new(), status: code }
    }

    /// The standard error body: `{"message": "..."}`.
    pub fn message(code: StatusCode, message: &str) -> Self {
        let body = serde_json::json!({ "message": message });
        Self::builder().status(code).json(body.to_string())
    }

    /// Builder for responses that need a custom status or extra headers.
    pub fn builder() -> ResponseBuilder {
        ResponseBuilder { headers: HeaderMap::new(), status: StatusCode::OK }
    }

    pub fn status_code(&self) -> StatusCode { self.status }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn body(&self) -> &[u8] { &self.body }

    pub(crate) fn not_found() -> Self {
        Self::message(StatusCode::NOT_FOUND, "Not Found")
    }

    pub(crate) fn unauthorized() -> Self {
        Self::message(StatusCode::UNAUTHORIZED, "Unauthorized")
    }

    pub(crate) fn internal_error() -> Self {
        Self::message(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")
    }

    /// `400` carrying every field error found in one validation pass.
    pub(crate) fn validation_failed(errors: &ValidationErrors) -> Self {
        let body = serde_json::json!({
            "message": "Validation failed",
            "errors": errors,
        });
        Self::builder().status(StatusCode::BAD_REQUEST).json(body.to_string())
    }

    pub(crate) fn into_inner(self) -> http::Response<Full<Bytes>> {
        let mut res = http::Response::new(Full::new(self.body));
        *res.status_mut() = self.status;
        *res.headers_mut() = self.headers;
        res
    }
}

// ── ResponseBuilder ───────────────────────────────────────────────────────────

/// Fluent builder for [`Response`].
///
/// Obtain via [`Response::builder()`]. Defaults to `200 OK`.
#[derive(Debug)]
pub struct ResponseBuilder {
    headers: HeaderMap,
    status: StatusCode,
}

impl ResponseBuilder {
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code;
        self
    }

    /// Appends a header. Names or values that are not valid HTTP are dropped
    /// with a warning rather than failing the response.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            _ => tracing::warn!(header = name, "dropping invalid response header"),
        }
        self
    }

    /// Terminate with a JSON body (`application/json`).
    pub fn json(mut self, body: impl Into<Bytes>) -> Response {
        self.headers.insert(CONTENT_TYPE, HeaderValue::from_static(APPLICATION_JSON));
        Response { body: body.into(), headers: self.headers, status: self.status }
    }

    /// Terminate with no body (e.g. `204 No Content`).
    pub fn no_body(self) -> Response {
        Response { body: Bytes::new(), headers: self.headers, status: self.status }
    }
}

// ── IntoResponse ──────────────────────────────────────────────────────────────

/// Infallible conversion into an HTTP [`Response`].
pub trait IntoResponse {
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response { self }
}

/// Return a status directly from a handler: `return StatusCode::NO_CONTENT`
impl IntoResponse for StatusCode {
    fn into_response(self) -> Response { Response::status(self) }
}

// ── IntoOutcome ───────────────────────────────────────────────────────────────

/// What a handler may return: anything that becomes a [`Response`], a
/// [`Json`] value, or a `Result` of either whose error is a fault.
///
/// An `Err` never reaches the client as-is. The dispatcher logs it and
/// answers with a generic `500`.
pub trait IntoOutcome {
    fn into_outcome(self) -> Result<Response, Error>;
}

impl<T: IntoResponse> IntoOutcome for T {
    fn into_outcome(self) -> Result<Response, Error> { Ok(self.into_response()) }
}

impl<T, E> IntoOutcome for Result<T, E>
where
    T: IntoOutcome,
    E: Into<Error>,
{
    fn into_outcome(self) -> Result<Response, Error> {
        self.map_err(Into::into)?.into_outcome()
    }
}

// ── Json ──────────────────────────────────────────────────────────────────────

/// A serde-serializable body, sent as `200 OK` unless a status is attached.
///
/// ```rust
/// use http::StatusCode;
/// use tollgate::Json;
///
/// let created = Json(serde_json::json!({ "id": "acc_1" })).with_status(StatusCode::CREATED);
/// # let _ = created;
/// ```
#[derive(Debug, Clone)]
pub struct Json<T>(pub T);

impl<T: Serialize> Json<T> {
    pub fn with_status(self, status: StatusCode) -> WithStatus<T> {
        WithStatus { status, body: self.0 }
    }
}

/// A [`Json`] body with an explicit status.
#[derive(Debug, Clone)]
pub struct WithStatus<T> {
    status: StatusCode,
    body: T,
}

impl<T: Serialize> IntoOutcome for Json<T> {
    fn into_outcome(self) -> Result<Response, Error> {
        self.with_status(StatusCode::OK).into_outcome()
    }
}

impl<T: Serialize> IntoOutcome for WithStatus<T> {
    fn into_outcome(self) -> Result<Response, Error> {
        let bytes = serde_json::to_vec(&self.body).map_err(Error::Serialize)?;
        Ok(Response::builder().status(self.status).json(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_body_is_a_json_object() {
        let res = Response::message(StatusCode::UNAUTHORIZED, "Unauthorized");
        assert_eq!(res.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(res.body(), br#"{"message":"Unauthorized"}"#);
        assert_eq!(res.headers()[CONTENT_TYPE], APPLICATION_JSON);
    }

    #[test]
    fn invalid_header_is_dropped() {
        let res = Response::builder().header("bad header", "x").no_body();
        assert!(res.headers().is_empty());
    }

    #[test]
    fn json_serializes_with_status() {
        let res = Json(serde_json::json!({ "id": 7 }))
            .with_status(StatusCode::CREATED)
            .into_outcome()
            .unwrap();
        assert_eq!(res.status_code(), StatusCode::CREATED);
        assert_eq!(res.body(), br#"{"id":7}"#);
    }

    #[test]
    fn err_stays_a_fault() {
        let out: Result<Response, Error> = Err(Error::MissingContext("auth".into()));
        assert!(out.into_outcome().is_err());
    }
}
