//! Path patterns.
//!
//! - literal segments: `/accounts`
//! - named single-segment parameters: `/accounts/{id}`
//! - a trailing catch-all holding one or more segments: `/files/{*path}`
//!
//! Matching is exact: no trailing-slash folding and no percent-decoding of
//! parameter values.

use std::collections::HashMap;

use crate::error::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
    CatchAll(String),
}

#[derive(Debug, Clone)]
pub(crate) struct Pattern {
    raw: String,
    segments: Vec<Segment>,
}

impl Pattern {
    pub(crate) fn parse(raw: &str) -> Result<Self, Error> {
        let Some(rest) = raw.strip_prefix('/') else {
            return Err(Error::invalid_route(raw, "must start with `/`"));
        };

        let parts: Vec<&str> = rest.split('/').collect();
        let mut segments = Vec::with_capacity(parts.len());
        let mut names: Vec<&str> = Vec::new();

        for (i, part) in parts.iter().enumerate() {
            let segment = match part.strip_prefix('{').and_then(|p| p.strip_suffix('}')) {
                Some(inner) => {
                    let (name, catch_all) = match inner.strip_prefix('*') {
                        Some(name) => (name, true),
                        None => (inner, false),
                    };
                    if !is_name(name) {
                        return Err(Error::invalid_route(raw, format!("invalid parameter name `{inner}`")));
                    }
                    if names.contains(&name) {
                        return Err(Error::invalid_route(raw, format!("duplicate parameter `{name}`")));
                    }
                    if catch_all && i + 1 != parts.len() {
                        return Err(Error::invalid_route(raw, "catch-all must be the last segment"));
                    }
                    names.push(name);
                    if catch_all { Segment::CatchAll(name.to_owned()) } else { Segment::Param(name.to_owned()) }
                }
                None if part.contains(['{', '}']) => {
                    return Err(Error::invalid_route(raw, format!("unbalanced braces in `{part}`")));
                }
                None => Segment::Literal((*part).to_owned()),
            };
            segments.push(segment);
        }

        Ok(Self { raw: raw.to_owned(), segments })
    }

    pub(crate) fn as_str(&self) -> &str {
        &self.raw
    }

    /// The parameters bound by `path`, or `None` when it does not match.
    pub(crate) fn matches(&self, path: &str) -> Option<HashMap<String, String>> {
        let rest = path.strip_prefix('/')?;
        let parts: Vec<&str> = rest.split('/').collect();
        let mut params = HashMap::new();

        for (i, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Literal(lit) => {
                    if parts.get(i) != Some(&lit.as_str()) {
                        return None;
                    }
                }
                Segment::Param(name) => {
                    let value = parts.get(i).filter(|v| !v.is_empty())?;
                    params.insert(name.clone(), (*value).to_owned());
                }
                Segment::CatchAll(name) => {
                    let tail = parts.get(i..).map(|p| p.join("/")).filter(|t| !t.is_empty())?;
                    params.insert(name.clone(), tail);
                    return Some(params);
                }
            }
        }

        (parts.len() == self.segments.len()).then_some(params)
    }
}

fn is_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
