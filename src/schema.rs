//! Declarative input schemas.
//!
//! A [`Schema`] is a list of tagged field descriptors. The validator walks
//! every descriptor against a raw JSON value and either returns a coerced copy
//! of the value or every field error it found, never just the first one.
//!
//! ```rust
//! use serde_json::json;
//! use tollgate::schema::{Field, Format, Schema};
//!
//! let schema = Schema::new()
//!     .field(Field::string("name").format(Format::NonEmpty))
//!     .field(Field::number("amount").coerce())
//!     .field(Field::string("notes").optional());
//!
//! let valid = schema.validate(&json!({ "name": "Rent", "amount": "1200" })).unwrap();
//! assert_eq!(valid, json!({ "name": "Rent", "amount": 1200 }));
//!
//! let errors = schema.validate(&json!({ "amount": "twelve" })).unwrap_err();
//! assert_eq!(errors.len(), 2);
//! ```
//!
//! Schemas also deserialize from configuration, one table per field:
//!
//! ```toml
//! [[fields]]
//! name = "amount"
//! kind = "number"
//! coerce = true
//! ```

use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

/// Path reported when the value itself, rather than one of its fields, is wrong.
pub const ROOT: &str = "$";

// ── Descriptors ───────────────────────────────────────────────────────────────

/// The expected shape of an object.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Schema {
    #[serde(default)]
    pub fields: Vec<Field>,
    /// Reject keys that no field declares.
    #[serde(default)]
    pub deny_unknown: bool,
}

/// One named entry of a [`Schema`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Field {
    pub name: String,
    #[serde(default = "required_by_default")]
    pub required: bool,
    #[serde(flatten)]
    pub kind: Kind,
}

fn required_by_default() -> bool {
    true
}

/// The type a field must hold. Tagged by `kind` when deserialized.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Kind {
    String {
        #[serde(default)]
        format: Option<Format>,
    },
    /// With `coerce`, a string holding a number is accepted and converted.
    Number {
        #[serde(default)]
        coerce: bool,
    },
    /// With `coerce`, the strings `"true"` and `"false"` are accepted.
    Boolean {
        #[serde(default)]
        coerce: bool,
    },
    Object(Schema),
    Array { items: Box<Kind> },
}

/// Extra constraints on a string field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Format {
    NonEmpty,
    Email,
    Uuid,
    /// Calendar date, `YYYY-MM-DD`.
    Date,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, field: Field) -> Self {
        self.fields.push(field);
        self
    }

    pub fn deny_unknown(mut self) -> Self {
        self.deny_unknown = true;
        self
    }

    /// Checks `value` against every descriptor.
    ///
    /// On success the returned value holds only declared fields, coerced to
    /// their declared types. Absent optional fields are left out.
    pub fn validate(&self, value: &Value) -> ValidationResult<Value> {
        let mut errors = Vec::new();
        let out = self.check(value, ROOT, &mut errors);
        if errors.is_empty() { Ok(out) } else { Err(ValidationErrors(errors)) }
    }

    /// [`validate`](Self::validate), then deserialize into `T`.
    ///
    /// A value that passes the schema but does not fit `T` is reported as a
    /// single `invalid_type` error at the root.
    pub fn validate_as<T: DeserializeOwned>(&self, value: &Value) -> ValidationResult<T> {
        let valid = self.validate(value)?;
        serde_json::from_value(valid).map_err(|e| {
            ValidationErrors(vec![FieldError::new(ROOT, ErrorCode::InvalidType, "object", e.to_string())])
        })
    }

    fn check(&self, value: &Value, path: &str, errors: &mut Vec<FieldError>) -> Value {
        let Some(input) = value.as_object() else {
            errors.push(FieldError::new(path, ErrorCode::InvalidType, "object", received(value)));
            return Value::Null;
        };

        let mut out = Map::new();
        for field in &self.fields {
            let path = join(path, &field.name);
            match input.get(&field.name) {
                None | Some(Value::Null) if !field.required => {}
                None | Some(Value::Null) => {
                    errors.push(FieldError::new(&path, ErrorCode::Required, field.kind.expected(), "nothing"));
                }
                Some(raw) => {
                    if let Some(valid) = field.kind.check(raw, &path, errors) {
                        out.insert(field.name.clone(), valid);
                    }
                }
            }
        }

        if self.deny_unknown {
            for key in input.keys().filter(|k| !self.fields.iter().any(|f| &f.name == *k)) {
                errors.push(FieldError::new(&join(path, key), ErrorCode::UnrecognizedKey, "nothing", "a value"));
            }
        }

        Value::Object(out)
    }
}

impl Field {
    pub fn new(name: impl Into<String>, kind: Kind) -> Self {
        Self { name: name.into(), required: true, kind }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::new(name, Kind::String { format: None })
    }

    pub fn number(name: impl Into<String>) -> Self {
        Self::new(name, Kind::Number { coerce: false })
    }

    pub fn boolean(name: impl Into<String>) -> Self {
        Self::new(name, Kind::Boolean { coerce: false })
    }

    pub fn object(name: impl Into<String>, schema: Schema) -> Self {
        Self::new(name, Kind::Object(schema))
    }

    pub fn array(name: impl Into<String>, items: Kind) -> Self {
        Self::new(name, Kind::Array { items: Box::new(items) })
    }

    /// The field may be absent or `null`.
    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    /// Accept string input for number and boolean fields. No effect on other kinds.
    pub fn coerce(mut self) -> Self {
        if let Kind::Number { coerce } | Kind::Boolean { coerce } = &mut self.kind {
            *coerce = true;
        }
        self
    }

    /// Constrain a string field. No effect on other kinds.
    pub fn format(mut self, format: Format) -> Self {
        if let Kind::String { format: slot } = &mut self.kind {
            *slot = Some(format);
        }
        self
    }
}

impl Kind {
    fn expected(&self) -> &'static str {
        match self {
            Self::String { format: Some(format) } => format.expected(),
            Self::String { format: None } => "string",
            Self::Number { .. } => "number",
            Self::Boolean { .. } => "boolean",
            Self::Object(_) => "object",
            Self::Array { .. } => "array",
        }
    }

    /// Returns the coerced value, or `None` after recording an error.
    fn check(&self, raw: &Value, path: &str, errors: &mut Vec<FieldError>) -> Option<Value> {
        let invalid = |code| FieldError::new(path, code, self.expected(), received(raw));

        match (self, raw) {
            (Self::String { format }, Value::String(s)) => match format {
                Some(format) if !format.accepts(s) => {
                    errors.push(invalid(ErrorCode::InvalidFormat));
                    None
                }
                _ => Some(raw.clone()),
            },
            (Self::Number { .. }, Value::Number(_)) | (Self::Boolean { .. }, Value::Bool(_)) => Some(raw.clone()),
            (Self::Number { coerce: true }, Value::String(s)) => match parse_number(s) {
                Some(n) => Some(Value::Number(n)),
                None => {
                    errors.push(invalid(ErrorCode::InvalidFormat));
                    None
                }
            },
            (Self::Boolean { coerce: true }, Value::String(s)) => match s.as_str() {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => {
                    errors.push(invalid(ErrorCode::InvalidFormat));
                    None
                }
            },
            (Self::Object(schema), Value::Object(_)) => Some(schema.check(raw, path, errors)),
            (Self::Array { items }, Value::Array(values)) => {
                let before = errors.len();
                let out: Vec<Value> = values
                    .iter()
                    .enumerate()
                    .filter_map(|(i, v)| items.check(v, &join(path, &i.to_string()), errors))
                    .collect();
                (errors.len() == before).then_some(Value::Array(out))
            }
            _ => {
                errors.push(invalid(ErrorCode::InvalidType));
                None
            }
        }
    }
}

impl Format {
    fn expected(self) -> &'static str {
        match self {
            Self::NonEmpty => "non-empty string",
            Self::Email => "email address",
            Self::Uuid => "uuid",
            Self::Date => "date (YYYY-MM-DD)",
        }
    }

    fn accepts(self, s: &str) -> bool {
        match self {
            Self::NonEmpty => !s.trim().is_empty(),
            Self::Email => is_email(s),
            Self::Uuid => uuid::Uuid::parse_str(s).is_ok(),
            Self::Date => chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok(),
        }
    }
}

fn is_email(s: &str) -> bool {
    let Some((local, domain)) = s.split_once('@') else { return false };
    !local.is_empty()
        && !domain.contains('@')
        && domain.split('.').count() >= 2
        && domain.split('.').all(|label| !label.is_empty())
        && !s.chars().any(char::is_whitespace)
}

fn parse_number(s: &str) -> Option<Number> {
    if let Ok(i) = s.parse::<i64>() {
        return Some(Number::from(i));
    }
    s.parse::<f64>().ok().and_then(Number::from_f64)
}

fn join(parent: &str, key: &str) -> String {
    if parent == ROOT { key.to_owned() } else { format!("{parent}.{key}") }
}

/// Type name of a value. Values themselves are never echoed back.
fn received(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ── Results ───────────────────────────────────────────────────────────────────

pub type ValidationResult<T> = Result<T, ValidationErrors>;

/// Machine-readable reason a field was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Required,
    InvalidType,
    InvalidFormat,
    UnrecognizedKey,
}

/// One rejected field.
///
/// Only `field` and `code` are serialized; `expected` and `received` are for
/// logs and tests.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub code: ErrorCode,
    #[serde(skip)]
    pub expected: String,
    #[serde(skip)]
    pub received: String,
}

impl FieldError {
    fn new(field: &str, code: ErrorCode, expected: &str, received: impl Into<String>) -> Self {
        Self { field: field.to_owned(), code, expected: expected.to_owned(), received: received.into() }
    }
}

/// Every error found in one validation pass, in descriptor order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(Vec<FieldError>);

impl ValidationErrors {
    pub fn len(&self) -> usize { self.0.len() }
    pub fn is_empty(&self) -> bool { self.0.is_empty() }
    pub fn iter(&self) -> std::slice::Iter<'_, FieldError> { self.0.iter() }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}: expected {}, received {}", e.field, e.expected, e.received)?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

impl<'a> IntoIterator for &'a ValidationErrors {
    type Item = &'a FieldError;
    type IntoIter = std::slice::Iter<'a, FieldError>;

    fn into_iter(self) -> Self::IntoIter { self.0.iter() }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn codes(errors: &ValidationErrors) -> Vec<(&str, ErrorCode)> {
        errors.iter().map(|e| (e.field.as_str(), e.code)).collect()
    }

    #[test]
    fn numeric_string_stays_a_string() {
        let schema = Schema::new().field(Field::string("test"));
        let valid = schema.validate(&json!({ "test": "123" })).unwrap();
        assert_eq!(valid, json!({ "test": "123" }));
    }

    #[test]
    fn number_without_coerce_rejects_strings() {
        let schema = Schema::new().field(Field::number("amount"));
        let errors = schema.validate(&json!({ "amount": "12" })).unwrap_err();
        assert_eq!(codes(&errors), [("amount", ErrorCode::InvalidType)]);
    }

    #[test]
    fn coercion_is_opt_in_per_field() {
        let schema = Schema::new()
            .field(Field::number("page").coerce())
            .field(Field::number("ratio").coerce())
            .field(Field::boolean("archived").coerce());
        let valid = schema
            .validate(&json!({ "page": "2", "ratio": "0.5", "archived": "false" }))
            .unwrap();
        assert_eq!(valid, json!({ "page": 2, "ratio": 0.5, "archived": false }));

        let errors = schema
            .validate(&json!({ "page": "two", "ratio": 1, "archived": "no" }))
            .unwrap_err();
        assert_eq!(
            codes(&errors),
            [("page", ErrorCode::InvalidFormat), ("archived", ErrorCode::InvalidFormat)]
        );
    }

    #[test]
    fn all_errors_are_reported_in_one_pass() {
        let schema = Schema::new()
            .field(Field::string("name"))
            .field(Field::number("amount"))
            .field(Field::string("date").format(Format::Date));
        let errors = schema.validate(&json!({ "date": "2024-02-30" })).unwrap_err();
        assert_eq!(
            codes(&errors),
            [
                ("name", ErrorCode::Required),
                ("amount", ErrorCode::Required),
                ("date", ErrorCode::InvalidFormat),
            ]
        );
    }

    #[test]
    fn optional_fields_may_be_absent_or_null() {
        let schema = Schema::new()
            .field(Field::string("notes").optional())
            .field(Field::string("payee").optional());
        let valid = schema.validate(&json!({ "notes": null })).unwrap();
        assert_eq!(valid, json!({}));
    }

    #[test]
    fn null_required_field_is_required() {
        let schema = Schema::new().field(Field::string("name"));
        let errors = schema.validate(&json!({ "name": null })).unwrap_err();
        assert_eq!(codes(&errors), [("name", ErrorCode::Required)]);
    }

    #[test]
    fn unknown_fields_are_dropped_unless_denied() {
        let schema = Schema::new().field(Field::string("id"));
        let input = json!({ "id": "a", "extra": true });
        assert_eq!(schema.validate(&input).unwrap(), json!({ "id": "a" }));

        let errors = schema.deny_unknown().validate(&input).unwrap_err();
        assert_eq!(codes(&errors), [("extra", ErrorCode::UnrecognizedKey)]);
    }

    #[test]
    fn nested_paths_are_dotted() {
        let schema = Schema::new()
            .field(Field::object("payee", Schema::new().field(Field::string("email").format(Format::Email))))
            .field(Field::array("ids", Kind::String { format: Some(Format::Uuid) }));
        let errors = schema
            .validate(&json!({
                "payee": { "email": "not-an-email" },
                "ids": ["67e55044-10b1-426f-9247-bb680e5fe0c8", 4],
            }))
            .unwrap_err();
        assert_eq!(
            codes(&errors),
            [("payee.email", ErrorCode::InvalidFormat), ("ids.1", ErrorCode::InvalidType)]
        );
    }

    #[test]
    fn non_object_root_is_reported_at_root() {
        let errors = Schema::new().validate(&json!([1, 2])).unwrap_err();
        assert_eq!(codes(&errors), [(ROOT, ErrorCode::InvalidType)]);
        assert_eq!(errors.iter().next().unwrap().received, "array");
    }

    #[test]
    fn serialized_errors_carry_field_and_code_only() {
        let errors = Schema::new().field(Field::string("name")).validate(&json!({})).unwrap_err();
        assert_eq!(
            serde_json::to_value(&errors).unwrap(),
            json!([{ "field": "name", "code": "required" }])
        );
    }

    #[test]
    fn validate_as_returns_typed_value() {
        #[derive(Deserialize)]
        struct Page {
            page: i64,
            q: Option<String>,
        }

        let schema = Schema::new().field(Field::number("page").coerce()).field(Field::string("q").optional());
        let page: Page = schema.validate_as(&json!({ "page": "3" })).unwrap();
        assert_eq!(page.page, 3);
        assert!(page.q.is_none());
    }

    #[test]
    fn formats() {
        assert!(Format::Email.accepts("ana@example.com"));
        assert!(!Format::Email.accepts("ana@example"));
        assert!(!Format::Email.accepts("ana @example.com"));
        assert!(Format::Date.accepts("2024-02-29"));
        assert!(!Format::Date.accepts("2023-02-29"));
        assert!(!Format::NonEmpty.accepts("   "));
        assert!(!Format::Uuid.accepts("123"));
    }

    #[test]
    fn deserializes_from_toml() {
        let schema: Schema = toml::from_str(
            r#"
            deny_unknown = true

            [[fields]]
            name = "amount"
            kind = "number"
            coerce = true

            [[fields]]
            name = "date"
            kind = "string"
            format = "date"
            required = false

            [[fields]]
            name = "ids"
            kind = "array"
            items = { kind = "string", format = "uuid" }
            "#,
        )
        .unwrap();

        assert_eq!(
            schema,
            Schema::new()
                .field(Field::number("amount").coerce())
                .field(Field::string("date").format(Format::Date).optional())
                .field(Field::array("ids", Kind::String { format: Some(Format::Uuid) }))
                .deny_unknown()
        );
    }
}
