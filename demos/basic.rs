//! A small finance API: public greetings, hard-gated accounts, a soft-gated
//! transaction feed, and health checks.
//!
//! Run with:
//!   RUST_LOG=info,tollgate=debug cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/api/hello
//!   curl http://localhost:3000/api/hello/123
//!   curl http://localhost:3000/api/accounts                       # 401
//!   curl -H "authorization: Bearer $TOKEN" http://localhost:3000/api/accounts
//!   curl -X POST http://localhost:3000/api/accounts \
//!        -H "authorization: Bearer $TOKEN" \
//!        -d '{"name":"Checking","currency":"EUR"}'
//!   curl 'http://localhost:3000/api/transactions?from=2024-01-01'
//!   curl http://localhost:3000/api/healthz
//!
//! `$TOKEN` is any HS256 JWT signed with `dev-secret-change-me` whose `sub`
//! names the user.

use http::StatusCode;
use serde::{Deserialize, Serialize};
use tollgate::{AppConfig, Error, Json, Request, Route, Router, Server, Target, health};
use tracing_subscriber::EnvFilter;

const CONFIG: &str = r#"
base_path = "/api"

[server]
addr = "0.0.0.0:3000"

[auth]
verify_timeout_ms = 1000

[auth.jwt]
secret = "dev-secret-change-me"

[[routes]]
name = "hello.param"
method = "GET"
path = "/hello/{test}"

[[routes.params.fields]]
name = "test"
kind = "string"
format = "non_empty"

[[routes]]
name = "accounts.list"
method = "GET"
path = "/accounts"
gate = "hard"

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

[[routes.body.fields]]
name = "currency"
kind = "string"

[[routes.body.fields]]
name = "opening_balance"
kind = "number"
coerce = true
required = false

[[routes]]
name = "transactions.list"
method = "GET"
path = "/transactions"
gate = "soft"

[[routes.query.fields]]
name = "from"
kind = "string"
format = "date"
required = false

[[routes.query.fields]]
name = "limit"
kind = "number"
coerce = true
required = false
"#;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

    let config = AppConfig::from_toml_str(CONFIG)?;
    let auth = config.resolver()?;

    let app = Router::builder()
        .base_path(&config.base_path)
        .route(Route::get("/hello").to(hello))
        .route(config.route("hello.param", &auth)?.to(hello_param))
        .route(config.route("accounts.list", &auth)?.to(list_accounts))
        .route(config.route("accounts.create", &auth)?.to(create_account))
        .route(config.route("transactions.list", &auth)?.to(list_transactions))
        .route(Route::get("/healthz").to(health::liveness))
        .route(Route::get("/readyz").to(health::readiness))
        .build()?;

    config.server.server().serve(app).await
}

#[derive(Serialize)]
struct Greeting {
    message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    test: Option<String>,
}

// GET /api/hello
async fn hello(_req: Request) -> Json<Greeting> {
    Json(Greeting { message: "Hello", test: None })
}

#[derive(Deserialize)]
struct HelloParams {
    test: String,
}

// GET /api/hello/{test}
async fn hello_param(req: Request) -> Result<Json<Greeting>, Error> {
    let params: HelloParams = req.valid(Target::Params)?;
    Ok(Json(Greeting { message: "Hello", test: Some(params.test) }))
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Account {
    id: String,
    name: String,
    currency: String,
    balance: f64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AccountList {
    user_id: String,
    accounts: Vec<Account>,
}

// GET /api/accounts (hard gate: the caller is always authenticated here)
async fn list_accounts(req: Request) -> Result<Json<AccountList>, Error> {
    let user_id = req.auth()?.user_id().unwrap_or_default().to_owned();
    Ok(Json(AccountList {
        user_id,
        accounts: vec![Account { id: "acc_1".into(), name: "Checking".into(), currency: "EUR".into(), balance: 1250.0 }],
    }))
}

#[derive(Deserialize)]
struct NewAccount {
    name: String,
    currency: String,
    opening_balance: Option<f64>,
}

// POST /api/accounts
async fn create_account(req: Request) -> Result<tollgate::WithStatus<Account>, Error> {
    let input: NewAccount = req.valid(Target::Body)?;
    let account = Account {
        id: "acc_2".into(),
        name: input.name,
        currency: input.currency,
        balance: input.opening_balance.unwrap_or(0.0),
    };
    Ok(Json(account).with_status(StatusCode::CREATED))
}

#[derive(Deserialize)]
struct TransactionQuery {
    from: Option<String>,
    limit: Option<f64>,
}

// GET /api/transactions (soft gate: anonymous callers see the public sample)
async fn list_transactions(req: Request) -> Result<Json<serde_json::Value>, Error> {
    let query: TransactionQuery = req.valid(Target::Query)?;
    let auth = req.auth()?;

    let scope = if auth.is_authenticated() { "personal" } else { "sample" };
    Ok(Json(serde_json::json!({
        "scope": scope,
        "from": query.from,
        "limit": query.limit.unwrap_or(50.0),
        "transactions": [],
    })))
}
