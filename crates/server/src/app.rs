use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use axum::http::{header, HeaderName, Method};
use axum::routing::{get, post};
use axum::Router;
use kommo_agent::{ToolContext, ToolRegistry};
use kommo_core::{CacheTtls, SessionGuard, TtlCache};
use kommo_crm::{CrmConnector, CrmError, SheetsSource};
use secrecy::SecretString;
use tower_http::cors::{Any, CorsLayer};

use crate::auth::Credentials;
use crate::{health, legacy, rpc};

/// One session guard per CRM account, created on first use.
///
/// Lead ids are only unique within an account, so a lead opened on one subdomain
/// must never authorize writes on another.
#[derive(Default)]
pub struct TenantSessions {
    guards: Mutex<HashMap<String, Arc<SessionGuard>>>,
}

impl TenantSessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn guard(&self, subdomain: &str) -> Arc<SessionGuard> {
        // Entries are only ever inserted whole, so a poisoned map is still consistent.
        let mut guards = self.guards.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        guards.entry(subdomain.to_string()).or_insert_with(|| Arc::new(SessionGuard::new())).clone()
    }

    pub fn len(&self) -> usize {
        self.guards.lock().unwrap_or_else(|poisoned| poisoned.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// State shared by every route. The cache is process-wide with per-tenant keys, session
/// guards are per tenant, and each request gets its own CRM client for the caller's account.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ToolRegistry>,
    pub sessions: Arc<TenantSessions>,
    pub cache: Arc<TtlCache>,
    pub connector: Arc<dyn CrmConnector>,
    pub sheets: Option<Arc<dyn SheetsSource>>,
    pub ttls: CacheTtls,
    pub password: SecretString,
}

impl AppState {
    pub fn new(connector: Arc<dyn CrmConnector>, password: SecretString) -> Self {
        Self {
            registry: Arc::new(ToolRegistry::with_default_tools()),
            sessions: Arc::new(TenantSessions::new()),
            cache: Arc::new(TtlCache::new()),
            connector,
            sheets: None,
            ttls: CacheTtls::default(),
            password,
        }
    }

    pub fn with_sheets(mut self, sheets: Arc<dyn SheetsSource>) -> Self {
        self.sheets = Some(sheets);
        self
    }

    pub fn with_ttls(mut self, ttls: CacheTtls) -> Self {
        self.ttls = ttls;
        self
    }

    /// Session guard of one account.
    pub fn session_for(&self, subdomain: &str) -> Arc<SessionGuard> {
        self.sessions.guard(subdomain)
    }

    /// Tool context for the caller's account. The session guard and cached reference
    /// data are both scoped to the subdomain.
    pub fn tenant_context(&self, credentials: &Credentials) -> Result<ToolContext, CrmError> {
        let crm = self.connector.connect(&credentials.base_url(), credentials.access_token.clone())?;
        let session = self.session_for(&credentials.subdomain);
        let mut ctx = ToolContext::new(session, self.cache.clone(), crm)
            .with_ttls(self.ttls)
            .with_cache_namespace(credentials.subdomain.clone());
        if let Some(sheets) = &self.sheets {
            ctx = ctx.with_sheets(sheets.clone());
        }
        Ok(ctx)
    }
}

fn cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, HeaderName::from_static("mcp-session-id")])
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health::index))
        .route("/health", get(health::health))
        .route("/mcp", post(rpc::handle).delete(rpc::close))
        .route("/tools", get(legacy::list_tools))
        .route("/execute", post(legacy::execute))
        .layer(cors())
        .with_state(state)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::{Arc, Mutex};

    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use axum::Router;
    use kommo_crm::{CrmApi, CrmConnector, CrmError, InMemoryCrm};
    use secrecy::{ExposeSecret, SecretString};
    use serde_json::Value;
    use tower::ServiceExt;

    use super::{router, AppState};

    pub const TOKEN: &str = "Bearer s3cret|acme|kommo-token";

    /// Hands out one in-memory CRM and records the accounts it was asked for.
    pub struct FakeConnector {
        pub crm: Arc<InMemoryCrm>,
        pub accounts: Mutex<Vec<(String, String)>>,
    }

    impl CrmConnector for FakeConnector {
        fn connect(&self, base_url: &str, access_token: SecretString) -> Result<Arc<dyn CrmApi>, CrmError> {
            if let Ok(mut accounts) = self.accounts.lock() {
                accounts.push((base_url.to_string(), access_token.expose_secret().to_string()));
            }
            Ok(self.crm.clone())
        }
    }

    pub fn app() -> (Router, Arc<FakeConnector>, AppState) {
        let connector =
            Arc::new(FakeConnector { crm: Arc::new(InMemoryCrm::new()), accounts: Mutex::new(Vec::new()) });
        let state = AppState::new(connector.clone(), SecretString::from("s3cret".to_string()));
        (router(state.clone()), connector, state)
    }

    pub async fn send(router: Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = router.oneshot(request).await.expect("router should respond");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body should be readable");
        let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).expect("json body") };
        (status, body)
    }

    pub fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .header("authorization", TOKEN)
            .body(Body::from(body.to_string()))
            .expect("request should build")
    }
}
