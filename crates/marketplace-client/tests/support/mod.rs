//! Mock marketplace backend for client tests
//!
//! Serves the token endpoints plus a catch-all "protected" route that accepts
//! exactly one access token (`valid_access`) and answers 401 otherwise.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Json;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use marketplace_auth::CredentialStore;
use marketplace_client::ApiClient;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::Notify;
use transport::ReqwestTransport;

pub struct Shared {
    pub valid_access: Mutex<String>,
    pub refresh_reply: Mutex<(StatusCode, Value)>,
    pub refresh_calls: AtomicUsize,
    pub refresh_bodies: Mutex<Vec<Value>>,
    pub unauthorized: AtomicUsize,
    pub authorized: AtomicUsize,
    /// Refresh answers only after this many 401s have been served.
    pub hold_refresh_until: AtomicUsize,
    /// When set, refresh additionally waits for `release`.
    pub gated: AtomicBool,
    pub release: Notify,
    /// Reject every protected request regardless of token.
    pub reject_all: AtomicBool,
    /// `(content-type, body)` of every protected request, accepted or not.
    pub received: Mutex<Vec<(String, String)>>,
}

impl Shared {
    pub fn set_valid_access(&self, token: &str) {
        *self.valid_access.lock().unwrap() = token.to_string();
    }

    pub fn set_refresh_reply(&self, status: StatusCode, body: Value) {
        *self.refresh_reply.lock().unwrap() = (status, body);
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn unauthorized(&self) -> usize {
        self.unauthorized.load(Ordering::SeqCst)
    }

    pub fn authorized(&self) -> usize {
        self.authorized.load(Ordering::SeqCst)
    }
}

pub struct Backend {
    pub base_url: String,
    pub shared: Arc<Shared>,
}

impl Backend {
    /// Start a backend that accepts `valid_access` and refreshes to it.
    pub async fn start(valid_access: &str) -> Self {
        let shared = Arc::new(Shared {
            valid_access: Mutex::new(valid_access.to_string()),
            refresh_reply: Mutex::new((StatusCode::OK, json!({ "access": valid_access }))),
            refresh_calls: AtomicUsize::new(0),
            refresh_bodies: Mutex::new(Vec::new()),
            unauthorized: AtomicUsize::new(0),
            authorized: AtomicUsize::new(0),
            hold_refresh_until: AtomicUsize::new(0),
            gated: AtomicBool::new(false),
            release: Notify::new(),
            reject_all: AtomicBool::new(false),
            received: Mutex::new(Vec::new()),
        });

        let app = axum::Router::new()
            .route("/api/auth/token/", post(obtain))
            .route("/api/auth/token/refresh/", post(refresh))
            .route("/api/auth/token/verify/", post(verify))
            .fallback(protected)
            .with_state(shared.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{addr}/api"),
            shared,
        }
    }

    pub fn client(&self, store: Arc<CredentialStore>) -> ApiClient {
        ApiClient::new(Arc::new(transport_for(&self.base_url)), store)
    }
}

pub fn transport_for(base_url: &str) -> ReqwestTransport {
    ReqwestTransport::new(reqwest::Client::new(), base_url, Duration::from_secs(5))
}

pub async fn store_with(access: &str, refresh: &str) -> Arc<CredentialStore> {
    let store = Arc::new(CredentialStore::in_memory());
    store.set_pair(access.into(), refresh.into()).await;
    store
}

/// Poll `condition` until it holds, panicking after two seconds.
pub async fn wait_for(mut condition: impl FnMut() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}

async fn obtain(Json(body): Json<Value>) -> Response {
    if body["username"] == "thandi" && body["password"] == "hunter2" {
        Json(json!({ "access": "A1", "refresh": "R1" })).into_response()
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "detail": "No active account found with the given credentials" })),
        )
            .into_response()
    }
}

async fn refresh(State(shared): State<Arc<Shared>>, Json(body): Json<Value>) -> Response {
    shared.refresh_calls.fetch_add(1, Ordering::SeqCst);
    shared.refresh_bodies.lock().unwrap().push(body);

    let hold = shared.hold_refresh_until.load(Ordering::SeqCst);
    if hold > 0 {
        wait_for(|| shared.unauthorized() >= hold).await;
        // Give the client time to queue the last 401 behind this refresh
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    if shared.gated.load(Ordering::SeqCst) {
        shared.release.notified().await;
    }

    let (status, reply) = shared.refresh_reply.lock().unwrap().clone();
    (status, Json(reply)).into_response()
}

async fn verify(State(shared): State<Arc<Shared>>, Json(body): Json<Value>) -> Response {
    let valid = shared.valid_access.lock().unwrap().clone();
    if body["token"] == valid.as_str() {
        Json(json!({})).into_response()
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "detail": "Token is invalid or expired", "code": "token_not_valid" })),
        )
            .into_response()
    }
}

async fn protected(State(shared): State<Arc<Shared>>, request: Request) -> Response {
    let path = request.uri().path().to_string();
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::to_string);
    let content_type = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let body = axum::body::to_bytes(request.into_body(), 1024 * 1024)
        .await
        .unwrap();
    shared
        .received
        .lock()
        .unwrap()
        .push((content_type, String::from_utf8_lossy(&body).into_owned()));

    let valid = shared.valid_access.lock().unwrap().clone();
    let accepted = !shared.reject_all.load(Ordering::SeqCst) && token.as_deref() == Some(valid.as_str());
    if !accepted {
        shared.unauthorized.fetch_add(1, Ordering::SeqCst);
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "detail": "Given token not valid for any token type",
                "code": "token_not_valid",
            })),
        )
            .into_response();
    }
    shared.authorized.fetch_add(1, Ordering::SeqCst);

    match path.as_str() {
        "/api/auth/me/" => Json(json!({
            "user": { "id": 7, "username": "thandi" },
            "roles": ["buyer", "vendor"],
            "vendor_id": 3,
        }))
        .into_response(),
        p if p.ends_with("/missing/") => {
            (StatusCode::NOT_FOUND, Json(json!({ "detail": "Not found." }))).into_response()
        }
        _ => Json(json!({ "path": path, "token": token })).into_response(),
    }
}
