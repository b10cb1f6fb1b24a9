//! In-process stand-ins for the Rancher API, scrape endpoints and the error
//! webhook, served by axum on ephemeral ports.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU16, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use axum::{
    extract::{Path, Query, State},
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use crate::config::{Config, RancherConfig};

pub const TEST_TOKEN: &str = "access:secret";

/// Base64 of `access:secret`
const TEST_AUTHORIZATION: &str = "Basic YWNjZXNzOnNlY3JldA==";

async fn serve(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn not_found() -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({"type": "error", "status": 404, "code": "NotFound", "message": "Not Found"})),
    )
}

#[derive(Default)]
struct RancherState {
    projects: Value,
    services: HashMap<String, Value>,
    stacks: HashMap<String, Value>,
    project_queries: Vec<String>,
    stack_hits: HashMap<String, usize>,
}

type SharedRancher = Arc<Mutex<RancherState>>;

fn authorized(headers: &HeaderMap) -> Result<(), (StatusCode, Json<Value>)> {
    match headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()) {
        Some(TEST_AUTHORIZATION) => Ok(()),
        _ => Err((
            StatusCode::UNAUTHORIZED,
            Json(json!({"type": "error", "status": 401, "code": "Unauthorized", "message": ""})),
        )),
    }
}

async fn projects(
    State(state): State<SharedRancher>,
    headers: HeaderMap,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    authorized(&headers)?;
    let mut state = state.lock().unwrap();
    state
        .project_queries
        .push(params.get("name").cloned().unwrap_or_default());
    Ok(Json(state.projects.clone()))
}

async fn services(
    State(state): State<SharedRancher>,
    headers: HeaderMap,
    Path(project_id): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    authorized(&headers)?;
    let state = state.lock().unwrap();
    state
        .services
        .get(&project_id)
        .cloned()
        .map(Json)
        .ok_or_else(not_found)
}

async fn stack(
    State(state): State<SharedRancher>,
    headers: HeaderMap,
    Path(stack_id): Path<String>,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    authorized(&headers)?;
    let mut state = state.lock().unwrap();
    *state.stack_hits.entry(stack_id.clone()).or_default() += 1;
    state
        .stacks
        .get(&stack_id)
        .cloned()
        .map(Json)
        .ok_or_else(not_found)
}

/// Fake Rancher `v2-beta` API expecting `TEST_TOKEN` as Basic credentials
pub struct MockRancher {
    addr: SocketAddr,
    state: SharedRancher,
}

impl MockRancher {
    pub async fn spawn() -> Self {
        let state = SharedRancher::default();
        state.lock().unwrap().projects = json!({"type": "collection", "data": []});

        let app = Router::new()
            .route("/v2-beta/projects", get(projects))
            .route("/v2-beta/projects/:id/services", get(services))
            .route("/v2-beta/stacks/:id", get(stack))
            .with_state(state.clone());

        Self {
            addr: serve(app).await,
            state,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn stack_link(&self, stack_id: &str) -> String {
        format!("{}/v2-beta/stacks/{}", self.url(), stack_id)
    }

    pub fn rancher_config(&self) -> RancherConfig {
        RancherConfig {
            url: self.url(),
            token: TEST_TOKEN.to_string(),
            ..Default::default()
        }
    }

    pub fn set_projects(&self, body: Value) {
        self.state.lock().unwrap().projects = body;
    }

    pub fn set_services(&self, project_id: &str, body: Value) {
        self.state
            .lock()
            .unwrap()
            .services
            .insert(project_id.to_string(), body);
    }

    pub fn set_stack(&self, stack_id: &str, body: Value) {
        self.state
            .lock()
            .unwrap()
            .stacks
            .insert(stack_id.to_string(), body);
    }

    pub fn project_queries(&self) -> Vec<String> {
        self.state.lock().unwrap().project_queries.clone()
    }

    pub fn stack_hits(&self, stack_id: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .stack_hits
            .get(stack_id)
            .copied()
            .unwrap_or(0)
    }
}

#[derive(Default)]
struct ScrapeState {
    status: AtomicU16,
    hits: AtomicUsize,
}

async fn metrics(State(state): State<Arc<ScrapeState>>) -> StatusCode {
    state.hits.fetch_add(1, Ordering::SeqCst);
    StatusCode::from_u16(state.status.load(Ordering::SeqCst))
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
}

/// Scrape endpoint answering `/metrics` with a configurable status
pub struct MockScrape {
    addr: SocketAddr,
    state: Arc<ScrapeState>,
}

impl MockScrape {
    pub async fn spawn(status: u16) -> Self {
        let state = Arc::new(ScrapeState::default());
        state.status.store(status, Ordering::SeqCst);

        let app = Router::new()
            .route("/metrics", get(metrics))
            .with_state(state.clone());

        Self {
            addr: serve(app).await,
            state,
        }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn set_status(&self, status: u16) {
        self.state.status.store(status, Ordering::SeqCst);
    }

    pub fn hits(&self) -> usize {
        self.state.hits.load(Ordering::SeqCst)
    }
}

async fn record_event(State(events): State<Arc<Mutex<Vec<Value>>>>, Json(event): Json<Value>) -> StatusCode {
    events.lock().unwrap().push(event);
    StatusCode::ACCEPTED
}

/// Collects error events POSTed to `/events`
pub struct MockWebhook {
    addr: SocketAddr,
    events: Arc<Mutex<Vec<Value>>>,
}

impl MockWebhook {
    pub async fn spawn() -> Self {
        let events = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route("/events", post(record_event))
            .with_state(events.clone());

        Self {
            addr: serve(app).await,
            events,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}/events", self.addr)
    }

    pub fn events(&self) -> Vec<Value> {
        self.events.lock().unwrap().clone()
    }
}

/// Valid configuration for project "infra" on `mock`
pub fn test_config(mock: &MockRancher, file: PathBuf) -> Config {
    let mut config = Config::default();
    config.rancher = mock.rancher_config();
    config.rancher.project = "infra".to_string();
    config.output.file = file;
    config.discovery.probe_timeout_secs = 2;
    config
}
