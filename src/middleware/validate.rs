use std::fmt;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use super::{Flow, Middleware};
use crate::error::Error;
use crate::request::Request;
use crate::response::Response;
use crate::schema::Schema;

/// The part of a request a [`Validate`] step checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    Params,
    Query,
    Body,
}

impl Target {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Params => "params",
            Self::Query => "query",
            Self::Body => "body",
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Checks one target against a schema and stores the coerced value in the
/// context, where handlers read it with `req.valid::<T>(target)`.
///
/// Failures end the chain with `400` and the full list of field errors.
#[derive(Debug, Clone)]
pub struct Validate {
    target: Target,
    schema: Schema,
}

impl Validate {
    pub fn new(target: Target, schema: Schema) -> Self {
        Self { target, schema }
    }

    pub fn params(schema: Schema) -> Self { Self::new(Target::Params, schema) }
    pub fn query(schema: Schema) -> Self { Self::new(Target::Query, schema) }
    pub fn body(schema: Schema) -> Self { Self::new(Target::Body, schema) }

    /// The raw input for this step's target. `Err` carries a response for
    /// bodies that are not JSON at all.
    fn input(&self, req: &Request) -> Result<Value, Response> {
        match self.target {
            Target::Params => Ok(strings(req.params())),
            Target::Query => Ok(strings(req.queries())),
            // An empty body is treated as `{}` so each missing field gets its own error.
            Target::Body if req.body().iter().all(u8::is_ascii_whitespace) => Ok(Value::Object(Map::new())),
            Target::Body => serde_json::from_slice(req.body()).map_err(|e| {
                debug!(error = %e, "request body is not JSON");
                Response::message(http::StatusCode::BAD_REQUEST, "Malformed JSON body")
            }),
        }
    }
}

fn strings<'a>(map: impl IntoIterator<Item = (&'a String, &'a String)>) -> Value {
    Value::Object(
        map.into_iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect(),
    )
}

#[async_trait]
impl Middleware for Validate {
    async fn handle(&self, req: &mut Request) -> Result<Flow, Error> {
        let input = match self.input(req) {
            Ok(input) => input,
            Err(response) => return Ok(Flow::Break(response)),
        };

        match self.schema.validate(&input) {
            Ok(valid) => {
                req.context_mut().set_valid(self.target, valid);
                Ok(Flow::Continue(()))
            }
            Err(errors) => {
                debug!(input = %self.target, %errors, "validation failed");
                Ok(Flow::Break(Response::validation_failed(&errors)))
            }
        }
    }

    fn name(&self) -> &'static str {
        match self.target {
            Target::Params => "validate_params",
            Target::Query => "validate_query",
            Target::Body => "validate_body",
        }
    }
}

#[cfg(test)]
mod tests {
    use http::{Method, StatusCode};
    use serde_json::json;

    use super::*;
    use crate::schema::Field;

    fn break_response(flow: Flow) -> Response {
        match flow {
            Flow::Break(res) => res,
            Flow::Continue(()) => panic!("expected the step to stop the chain"),
        }
    }

    #[tokio::test]
    async fn params_are_validated_as_strings() {
        let step = Validate::params(Schema::new().field(Field::string("test")));
        let mut req = Request::new(Method::GET, "/hello/123");
        req.params.insert("test".into(), "123".into());

        assert!(step.handle(&mut req).await.unwrap().is_continue());
        assert_eq!(req.context().valid_value(Target::Params).unwrap(), &json!({ "test": "123" }));
    }

    #[tokio::test]
    async fn query_values_coerce_only_when_declared() {
        let step = Validate::query(
            Schema::new()
                .field(Field::number("page").coerce())
                .field(Field::string("q").optional()),
        );
        let mut req = Request::new(Method::GET, "/transactions?page=3&q=42");

        assert!(step.handle(&mut req).await.unwrap().is_continue());
        assert_eq!(
            req.context().valid_value(Target::Query).unwrap(),
            &json!({ "page": 3, "q": "42" })
        );
    }

    #[tokio::test]
    async fn body_errors_are_batched() {
        let step = Validate::body(
            Schema::new()
                .field(Field::string("name"))
                .field(Field::number("amount")),
        );
        let mut req = Request::new(Method::POST, "/transactions").with_body("{}");

        let res = break_response(step.handle(&mut req).await.unwrap());
        assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
        let body: Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(
            body,
            json!({
                "message": "Validation failed",
                "errors": [
                    { "field": "name", "code": "required" },
                    { "field": "amount", "code": "required" },
                ],
            })
        );
        assert!(req.context().valid_value(Target::Body).is_err());
    }

    #[tokio::test]
    async fn empty_body_reports_each_missing_field() {
        let step = Validate::body(Schema::new().field(Field::string("name")));
        let mut req = Request::new(Method::POST, "/accounts");

        let res = break_response(step.handle(&mut req).await.unwrap());
        let body: Value = serde_json::from_slice(res.body()).unwrap();
        assert_eq!(body["errors"], json!([{ "field": "name", "code": "required" }]));
    }

    #[tokio::test]
    async fn malformed_json_is_a_bad_request() {
        let step = Validate::body(Schema::new());
        let mut req = Request::new(Method::POST, "/accounts").with_body("{not json");

        let res = break_response(step.handle(&mut req).await.unwrap());
        assert_eq!(res.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(res.body(), br#"{"message":"Malformed JSON body"}"#);
    }
}
