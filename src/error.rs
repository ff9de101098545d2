//! Unified error type.

use std::error::Error as StdError;

use thiserror::Error;

use crate::middleware::Target;

/// The error type returned by tollgate's fallible operations.
///
/// Client mistakes (404, 401, 400) are expressed as HTTP
/// [`Response`](crate::Response) values, not as `Error`s. This type surfaces
/// startup failures (bad routes, bad config, binding a port) and faults inside
/// a chain. The dispatcher turns any fault into a generic 500; the detail
/// stays in the logs.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid socket address `{0}`")]
    InvalidAddress(String),

    #[error("invalid route `{pattern}`: {reason}")]
    InvalidRoute { pattern: String, reason: String },

    /// A step read from the request context before anything stored there.
    #[error("`{0}` was read from the request context before it was stored")]
    MissingContext(String),

    /// The validated value does not deserialize into the type the handler asked for.
    #[error("validated {target} does not fit the requested type: {source}")]
    Extract {
        target: Target,
        #[source]
        source: serde_json::Error,
    },

    #[error("response serialization: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error("config: {0}")]
    Config(String),

    #[error("config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// Any other fault raised by application code.
    #[error("internal: {0}")]
    Internal(#[source] Box<dyn StdError + Send + Sync>),
}

impl Error {
    /// Wraps an application error so a handler can return it with `?`.
    pub fn internal(err: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self::Internal(err.into())
    }

    pub(crate) fn invalid_route(pattern: &str, reason: impl Into<String>) -> Self {
        Self::InvalidRoute { pattern: pattern.to_owned(), reason: reason.into() }
    }
}
