//! Startup configuration.
//!
//! Read once, before the route table is built. Nothing here is consulted per
//! request.
//!
//! ```toml
//! base_path = "/api"
//!
//! [server]
//! addr = "0.0.0.0:3000"
//! max_body_bytes = 1048576
//!
//! [auth]
//! cookie = "__session"
//! verify_timeout_ms = 2000
//!
//! [auth.jwt]
//! jwks_url = "https://clerk.example.com/.well-known/jwks.json"
//! issuer = "https://clerk.example.com"
//!
//! [[routes]]
//! name = "transactions.list"
//! method = "GET"
//! path = "/transactions"
//! gate = "hard"
//!
//! [[routes.query.fields]]
//! name = "from"
//! kind = "string"
//! format = "date"
//! required = false
//! ```

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use http::{HeaderName, Method};
use jsonwebtoken::Algorithm;
use serde::Deserialize;

use crate::auth::{AuthResolver, IdentityProvider, JwksSource, JwtProvider, JwtSettings, KeyCache, SESSION_COOKIE, StaticKeys};
use crate::error::Error;
use crate::middleware::GateMode;
use crate::router::{DEFAULT_BASE_PATH, Route};
use crate::schema::Schema;
use crate::server::{DEFAULT_MAX_BODY_BYTES, Server};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub base_path: String,
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub routes: Vec<RouteConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_path: DEFAULT_BASE_PATH.to_owned(),
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            routes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: String,
    /// Larger request bodies are answered `413`.
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { addr: "0.0.0.0:3000".to_owned(), max_body_bytes: DEFAULT_MAX_BODY_BYTES }
    }
}

impl ServerConfig {
    pub fn server(&self) -> Server {
        Server::bind(self.addr.as_str()).max_body_bytes(self.max_body_bytes)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Header carrying `Bearer <token>`.
    pub header: String,
    /// Session cookie checked when the header is absent.
    pub cookie: String,
    pub verify_timeout_ms: u64,
    pub jwt: JwtConfig,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            header: "authorization".to_owned(),
            cookie: SESSION_COOKIE.to_owned(),
            verify_timeout_ms: 2_000,
            jwt: JwtConfig::default(),
        }
    }
}

/// Where verification keys come from and what tokens must satisfy.
///
/// Set `jwks_url` for a provider that publishes a key set, or `secret` for
/// HMAC-signed tokens.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JwtConfig {
    pub jwks_url: Option<String>,
    pub secret: Option<String>,
    pub issuer: Option<String>,
    pub audience: Option<String>,
    /// `alg` names such as `"RS256"`. Defaults to `RS256` for a key set and
    /// `HS256` for a secret.
    pub algorithms: Vec<String>,
    pub key_ttl_secs: u64,
    pub refresh_cooldown_secs: u64,
    pub fetch_timeout_ms: u64,
    pub leeway_secs: u64,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            jwks_url: None,
            secret: None,
            issuer: None,
            audience: None,
            algorithms: Vec::new(),
            key_ttl_secs: 3_600,
            refresh_cooldown_secs: 30,
            fetch_timeout_ms: 2_000,
            leeway_secs: 5,
        }
    }
}

/// One route's gate and validation, bound to a handler by `name`.
#[derive(Debug, Clone, Deserialize)]
pub struct RouteConfig {
    pub name: String,
    pub method: String,
    pub path: String,
    #[serde(default)]
    pub gate: Option<GateMode>,
    #[serde(default)]
    pub params: Option<Schema>,
    #[serde(default)]
    pub query: Option<Schema>,
    #[serde(default)]
    pub body: Option<Schema>,
}

impl AppConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, Error> {
        Ok(toml::from_str(s)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("reading {}: {e}", path.display())))?;
        Self::from_toml_str(&raw)
    }

    /// The declared route `name`, with its gate and validators attached in
    /// that order: gate, params, query, body. Finish it with [`Route::to`].
    pub fn route(&self, name: &str, resolver: &Arc<AuthResolver>) -> Result<Route, Error> {
        let decl = self
            .routes
            .iter()
            .find(|r| r.name == name)
            .ok_or_else(|| Error::Config(format!("no route named `{name}`")))?;
        decl.to_route(resolver)
    }

    /// Builds the resolver described by `[auth]`.
    pub fn resolver(&self) -> Result<Arc<AuthResolver>, Error> {
        let auth = &self.auth;
        let provider = auth.jwt.provider()?;
        let header = HeaderName::try_from(auth.header.as_str())
            .map_err(|_| Error::Config(format!("invalid auth header `{}`", auth.header)))?;

        Ok(Arc::new(
            AuthResolver::from_arc(provider)
                .with_header(header)
                .with_cookie(auth.cookie.clone())
                .with_timeout(Duration::from_millis(auth.verify_timeout_ms)),
        ))
    }
}

impl RouteConfig {
    pub fn to_route(&self, resolver: &Arc<AuthResolver>) -> Result<Route, Error> {
        let method = Method::from_bytes(self.method.to_ascii_uppercase().as_bytes())
            .map_err(|_| Error::Config(format!("route `{}`: invalid method `{}`", self.name, self.method)))?;

        let mut route = Route::new(method, &self.path);
        if let Some(mode) = self.gate {
            route = route.gate(resolver, mode);
        }
        if let Some(schema) = &self.params {
            route = route.validate_params(schema.clone());
        }
        if let Some(schema) = &self.query {
            route = route.validate_query(schema.clone());
        }
        if let Some(schema) = &self.body {
            route = route.validate_body(schema.clone());
        }
        Ok(route)
    }
}

impl JwtConfig {
    fn provider(&self) -> Result<Arc<dyn IdentityProvider>, Error> {
        let ttl = Duration::from_secs(self.key_ttl_secs);
        let cooldown = Duration::from_secs(self.refresh_cooldown_secs);

        match (&self.jwks_url, &self.secret) {
            (Some(url), None) => {
                let source = JwksSource::new(url.clone(), Duration::from_millis(self.fetch_timeout_ms))
                    .map_err(|e| Error::Config(e.to_string()))?;
                let settings = self.settings(Algorithm::RS256)?;
                Ok(Arc::new(JwtProvider::new(KeyCache::new(source, ttl, cooldown), settings)))
            }
            (None, Some(secret)) => {
                let settings = self.settings(Algorithm::HS256)?;
                Ok(Arc::new(JwtProvider::new(KeyCache::fixed(StaticKeys::hmac(secret.as_bytes())), settings)))
            }
            (Some(_), Some(_)) => Err(Error::Config("auth.jwt: set either `jwks_url` or `secret`, not both".to_owned())),
            (None, None) => Err(Error::Config("auth.jwt: one of `jwks_url` or `secret` is required".to_owned())),
        }
    }

    fn settings(&self, default_alg: Algorithm) -> Result<JwtSettings, Error> {
        let algorithms = if self.algorithms.is_empty() {
            vec![default_alg]
        } else {
            self.algorithms
                .iter()
                .map(|name| {
                    name.parse::<Algorithm>()
                        .map_err(|_| Error::Config(format!("auth.jwt: unknown algorithm `{name}`")))
                })
                .collect::<Result<_, _>>()?
        };

        Ok(JwtSettings {
            algorithms,
            issuer: self.issuer.clone(),
            audience: self.audience.clone(),
            leeway: Duration::from_secs(self.leeway_secs),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;
    use crate::schema::Field;

    const SAMPLE: &str = r#"
        base_path = "/api"

        [auth]
        verify_timeout_ms = 500

        [auth.jwt]
        secret = "a-test-secret-that-is-long-enough"
        issuer = "https://clerk.example.com"

        [[routes]]
        name = "hello.param"
        method = "get"
        path = "/hello/{test}"

        [[routes.params.fields]]
        name = "test"
        kind = "string"

        [[routes]]
        name = "accounts.create"
        method = "POST"
        path = "/accounts"
        gate = "hard"

        [routes.body]
        deny_unknown = true

        [[routes.body.fields]]
        name = "name"
        kind = "string"
        format = "non_empty"
    "#;

    #[test]
    fn defaults_apply_to_an_empty_file() {
        let config = AppConfig::from_toml_str("").unwrap();
        assert_eq!(config.base_path, "/api");
        assert_eq!(config.server.addr, "0.0.0.0:3000");
        assert_eq!(config.server.max_body_bytes, 1024 * 1024);
        assert_eq!(config.auth.cookie, "__session");
        assert!(config.routes.is_empty());
    }

    #[test]
    fn routes_and_schemas_are_declarative() {
        let config = AppConfig::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.auth.verify_timeout_ms, 500);

        let create = config.routes.iter().find(|r| r.name == "accounts.create").unwrap();
        assert_eq!(create.gate, Some(GateMode::Hard));
        assert_eq!(
            create.body,
            Some(Schema::new().field(Field::string("name").format(crate::schema::Format::NonEmpty)).deny_unknown())
        );
    }

    #[test]
    fn declared_route_gets_its_steps() {
        let config = AppConfig::from_toml_str(SAMPLE).unwrap();
        let resolver = config.resolver().unwrap();

        let route = config.route("accounts.create", &resolver).unwrap();
        let described = format!("{route:?}");
        assert!(described.contains("hard_auth_gate"));
        assert!(described.contains("validate_body"));

        let route = config.route("hello.param", &resolver).unwrap();
        assert!(format!("{route:?}").contains("GET"));

        assert!(matches!(config.route("missing", &resolver), Err(Error::Config(_))));
    }

    #[test]
    fn key_source_must_be_unambiguous() {
        let both = AppConfig::from_toml_str(
            r#"
            [auth.jwt]
            secret = "s"
            jwks_url = "https://clerk.example.com/.well-known/jwks.json"
            "#,
        )
        .unwrap();
        assert!(matches!(both.resolver(), Err(Error::Config(_))));

        assert!(matches!(AppConfig::default().resolver(), Err(Error::Config(_))));
    }

    #[test]
    fn unknown_algorithm_is_a_config_error() {
        let config = AppConfig::from_toml_str(
            r#"
            [auth.jwt]
            secret = "s"
            algorithms = ["HS256", "XX999"]
            "#,
        )
        .unwrap();
        assert!(matches!(config.resolver(), Err(Error::Config(msg)) if msg.contains("XX999")));
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let config = AppConfig::load(file.path()).unwrap();
        assert_eq!(config.routes.len(), 2);

        assert!(matches!(AppConfig::load("/nonexistent/tollgate.toml"), Err(Error::Config(_))));
    }

    #[test]
    fn body_limit_reaches_the_server() {
        let config = AppConfig::from_toml_str("[server]\nmax_body_bytes = 4096").unwrap();
        assert_eq!(config.server.max_body_bytes, 4096);
        assert_eq!(config.server.addr, "0.0.0.0:3000");
        assert!(format!("{:?}", config.server.server()).contains("max_body_bytes: 4096"));
    }

    #[test]
    fn malformed_toml_is_reported() {
        assert!(matches!(AppConfig::from_toml_str("base_path = ["), Err(Error::ConfigParse(_))));
    }
}
