use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::{CrmApi, CrmError, HttpMethod, Query, SheetsSource};

#[derive(Clone, Debug, PartialEq)]
pub struct RecordedCall {
    pub method: HttpMethod,
    pub endpoint: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl RecordedCall {
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query.iter().find(|(name, _)| name == key).map(|(_, value)| value.as_str())
    }
}

#[derive(Clone, Debug)]
enum Reply {
    Json(Value),
    Status(u16),
}

#[derive(Clone, Debug)]
struct Route {
    method: HttpMethod,
    endpoint: String,
    when: Option<(String, String)>,
    reply: Reply,
}

impl Route {
    fn matches(&self, method: HttpMethod, endpoint: &str, query: &Query) -> bool {
        if self.method != method || self.endpoint != endpoint {
            return false;
        }
        match &self.when {
            Some((key, value)) => query.get(key) == Some(value.as_str()),
            None => true,
        }
    }
}

/// Canned-response [`CrmApi`] that records every call.
///
/// Routes registered with a query condition take precedence over plain routes; among
/// equals the most recently registered wins. Unrouted calls fail with a 404.
#[derive(Debug, Default)]
pub struct InMemoryCrm {
    routes: Mutex<Vec<Route>>,
    calls: Mutex<Vec<RecordedCall>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl InMemoryCrm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, method: HttpMethod, endpoint: &str, payload: Value) -> &Self {
        self.push(method, endpoint, None, Reply::Json(payload))
    }

    pub fn respond_when(
        &self,
        method: HttpMethod,
        endpoint: &str,
        query: (&str, &str),
        payload: Value,
    ) -> &Self {
        let when = Some((query.0.to_string(), query.1.to_string()));
        self.push(method, endpoint, when, Reply::Json(payload))
    }

    pub fn fail(&self, method: HttpMethod, endpoint: &str, status: u16) -> &Self {
        self.push(method, endpoint, None, Reply::Status(status))
    }

    pub fn fail_when(
        &self,
        method: HttpMethod,
        endpoint: &str,
        query: (&str, &str),
        status: u16,
    ) -> &Self {
        let when = Some((query.0.to_string(), query.1.to_string()));
        self.push(method, endpoint, when, Reply::Status(status))
    }

    fn push(
        &self,
        method: HttpMethod,
        endpoint: &str,
        when: Option<(String, String)>,
        reply: Reply,
    ) -> &Self {
        lock(&self.routes).push(Route { method, endpoint: endpoint.to_string(), when, reply });
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        lock(&self.calls).clone()
    }

    pub fn calls_to(&self, method: HttpMethod, endpoint: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.method == method && call.endpoint == endpoint)
            .collect()
    }

    pub fn writes(&self) -> Vec<RecordedCall> {
        self.calls().into_iter().filter(|call| call.method != HttpMethod::Get).collect()
    }

    fn dispatch(
        &self,
        method: HttpMethod,
        endpoint: &str,
        query: &Query,
        body: Option<&Value>,
    ) -> Result<Value, CrmError> {
        lock(&self.calls).push(RecordedCall {
            method,
            endpoint: endpoint.to_string(),
            query: query.pairs().to_vec(),
            body: body.cloned(),
        });

        let reply = {
            let routes = lock(&self.routes);
            let conditional = routes
                .iter()
                .rev()
                .find(|route| route.when.is_some() && route.matches(method, endpoint, query));
            let plain = || {
                routes
                    .iter()
                    .rev()
                    .find(|route| route.when.is_none() && route.matches(method, endpoint, query))
            };
            conditional.or_else(plain).map(|route| route.reply.clone())
        };

        match reply {
            Some(Reply::Json(payload)) => Ok(payload),
            Some(Reply::Status(status)) => Err(CrmError::from_status(status, None)),
            None => Err(CrmError::from_status(
                404,
                Some(format!("no canned response for {} {endpoint}", method.as_str())),
            )),
        }
    }
}

#[async_trait]
impl CrmApi for InMemoryCrm {
    async fn get(&self, endpoint: &str, query: &Query) -> Result<Value, CrmError> {
        self.dispatch(HttpMethod::Get, endpoint, query, None)
    }

    async fn post(&self, endpoint: &str, body: &Value) -> Result<Value, CrmError> {
        self.dispatch(HttpMethod::Post, endpoint, &Query::new(), Some(body))
    }

    async fn patch(&self, endpoint: &str, body: &Value) -> Result<Value, CrmError> {
        self.dispatch(HttpMethod::Patch, endpoint, &Query::new(), Some(body))
    }
}

/// Fixed-grid [`SheetsSource`]. The first row is treated as the header, like the real sheet.
#[derive(Debug, Default)]
pub struct InMemorySheets {
    rows: Mutex<Vec<Vec<String>>>,
    failure: Mutex<Option<u16>>,
}

impl InMemorySheets {
    pub fn new(rows: Vec<Vec<String>>) -> Self {
        Self { rows: Mutex::new(rows), failure: Mutex::new(None) }
    }

    pub fn fail_with(&self, status: u16) {
        *lock(&self.failure) = Some(status);
    }
}

#[async_trait]
impl SheetsSource for InMemorySheets {
    async fn rows(&self) -> Result<Vec<Vec<String>>, CrmError> {
        if let Some(status) = *lock(&self.failure) {
            return Err(CrmError::Sheets { status, body: json!({"error": "unavailable"}).to_string() });
        }
        Ok(lock(&self.rows).clone())
    }
}
