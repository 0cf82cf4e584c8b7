//! In-process mock of the work queue and its file server.
//!
//! Serves `GET /queue`, `PUT /queue/{id}` and `GET /files/{name}` on a random
//! port and records everything the agent sends.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::extract::{Path as UrlPath, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, put};
use secrecy::SecretString;
use serde_json::{Value, json};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use queue_agent::config::{AgentConfig, Credentials};

pub const USERNAME: &str = "agent";
pub const PASSWORD: &str = "secret";
/// `Basic base64("agent:secret")`.
pub const EXPECTED_AUTH: &str = "Basic YWdlbnQ6c2VjcmV0";

#[derive(Debug)]
pub struct MockState {
    /// Body for the next poll; taken on use. `None` answers "no work".
    pub next_job: Mutex<Option<Value>>,
    pub poll_status: Mutex<u16>,
    pub update_status: Mutex<u16>,
    /// `(job id, JSON body)` of every update, in arrival order.
    pub updates: Mutex<Vec<(String, Value)>>,
    pub files: Mutex<HashMap<String, Vec<u8>>>,
    /// `Authorization` header of every request.
    pub auth: Mutex<Vec<Option<String>>>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            next_job: Mutex::new(None),
            poll_status: Mutex::new(200),
            update_status: Mutex::new(200),
            updates: Mutex::new(Vec::new()),
            files: Mutex::new(HashMap::new()),
            auth: Mutex::new(Vec::new()),
        }
    }
}

pub struct MockQueue {
    pub addr: SocketAddr,
    pub state: Arc<MockState>,
}

impl MockQueue {
    pub fn queue_url(&self) -> String {
        format!("http://{}/queue", self.addr)
    }

    pub fn file_url(&self, name: &str) -> String {
        format!("http://{}/files/{name}", self.addr)
    }

    pub fn offer(&self, job: Value) {
        *self.state.next_job.lock().unwrap() = Some(job);
    }

    pub fn serve_file(&self, name: &str, bytes: impl Into<Vec<u8>>) {
        self.state
            .files
            .lock()
            .unwrap()
            .insert(name.to_string(), bytes.into());
    }

    pub fn updates(&self) -> Vec<(String, Value)> {
        self.state.updates.lock().unwrap().clone()
    }

    /// Status values pushed so far, in order.
    pub fn statuses(&self) -> Vec<String> {
        self.updates()
            .into_iter()
            .filter_map(|(_, body)| body.get("status").and_then(Value::as_str).map(str::to_string))
            .collect()
    }

    pub fn credentials(&self) -> Credentials {
        credentials()
    }

    /// Agent config rooted at `home`, pointed at this mock.
    pub fn config(&self, home: &std::path::Path) -> AgentConfig {
        let mut config = AgentConfig::new(home, self.queue_url(), credentials());
        config.worker_command = "echo".to_string();
        config.http_timeout = Duration::from_secs(5);
        config.finalize_poll_interval = Duration::from_millis(10);
        config.finalize_timeout = Some(Duration::from_secs(5));
        config
    }
}

pub fn credentials() -> Credentials {
    Credentials {
        username: USERNAME.to_string(),
        password: SecretString::from(PASSWORD),
    }
}

fn record_auth(state: &MockState, headers: &HeaderMap) {
    let value = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    state.auth.lock().unwrap().push(value);
}

fn status(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap()
}

async fn poll(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    record_auth(&state, &headers);
    let code = *state.poll_status.lock().unwrap();
    if code != 200 {
        return status(code).into_response();
    }
    let body = state
        .next_job
        .lock()
        .unwrap()
        .take()
        .unwrap_or_else(|| json!({"newJob": false}));
    Json(body).into_response()
}

async fn update(
    State(state): State<Arc<MockState>>,
    UrlPath(job_id): UrlPath<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> StatusCode {
    record_auth(&state, &headers);
    state.updates.lock().unwrap().push((job_id, body));
    status(*state.update_status.lock().unwrap())
}

async fn file(
    State(state): State<Arc<MockState>>,
    UrlPath(name): UrlPath<String>,
    headers: HeaderMap,
) -> Response {
    record_auth(&state, &headers);
    match state.files.lock().unwrap().get(&name) {
        Some(bytes) => bytes.clone().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// Start the mock on a random port.
pub async fn start_mock_queue() -> MockQueue {
    let state = Arc::new(MockState::default());
    let app = Router::new()
        .route("/queue", get(poll))
        .route("/queue/{job_id}", put(update))
        .route("/files/{name}", get(file))
        .with_state(Arc::clone(&state));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockQueue { addr, state }
}

/// Serve `chunks` KiB-sized chunks to each connection, `delay` apart.
/// Returns the URL of the file.
pub async fn start_slow_file_server(chunks: usize, delay: Duration) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let mut request = [0u8; 4096];
                let _ = socket.read(&mut request).await;

                let head = format!(
                    "HTTP/1.1 200 OK\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
                    chunks * 1024
                );
                if socket.write_all(head.as_bytes()).await.is_err() {
                    return;
                }
                for _ in 0..chunks {
                    tokio::time::sleep(delay).await;
                    if socket.write_all(&[b'x'; 1024]).await.is_err() {
                        return;
                    }
                }
            });
        }
    });

    format!("http://{addr}/files/big.jar")
}
