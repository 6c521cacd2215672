//! Fake Kubernetes API server for ConfigMap store tests.
//!
//! Serves the two ConfigMap endpoints the catalog uses on `127.0.0.1:0`,
//! backed by a [`MemoryRecordStore`]:
//!
//! - `GET /api/v1/namespaces/{ns}/configmaps/{name}`
//! - `PATCH` on the same path with a JSON merge patch; a stale
//!   `metadata.resourceVersion` gets `409 Conflict`
//!
//! Transient `503` responses can be queued to exercise transport retries.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

use axum::Router;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde_json::{Value, json};
use tokio::sync::oneshot;

use prodcat_core::error::{Error, Result};
use prodcat_core::store::{MemoryRecordStore, RecordData, RecordKey, RecordStore, WriteResult};

#[derive(Clone)]
struct ServerState {
    store: MemoryRecordStore,
    unavailable: Arc<AtomicU32>,
    requests: Arc<AtomicUsize>,
}

impl ServerState {
    fn begin_request(&self) -> Option<Response> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let injected = self
            .unavailable
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        injected.then(|| status(StatusCode::SERVICE_UNAVAILABLE, "injected unavailability"))
    }
}

/// Local HTTP server emulating the Kubernetes ConfigMap API.
pub struct FakeKubeApi {
    state: ServerState,
    base_url: String,
    shutdown_tx: Option<oneshot::Sender<()>>,
    _task: tokio::task::JoinHandle<()>,
}

impl std::fmt::Debug for FakeKubeApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FakeKubeApi")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl FakeKubeApi {
    /// Starts a server on `127.0.0.1:0` with no ConfigMaps.
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot be bound or its address read.
    pub async fn start() -> Result<Self> {
        let state = ServerState {
            store: MemoryRecordStore::new(),
            unavailable: Arc::new(AtomicU32::new(0)),
            requests: Arc::new(AtomicUsize::new(0)),
        };

        let app = Router::new()
            .route(
                "/api/v1/namespaces/:namespace/configmaps/:name",
                get(get_config_map).patch(patch_config_map),
            )
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| Error::storage(format!("failed to bind fake kube listener: {e}")))?;

        let addr: SocketAddr = listener.local_addr().map_err(|e| Error::Internal {
            message: format!("failed to read listener addr: {e}"),
        })?;

        let base_url = format!("http://{addr}");
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            let _ = server.await;
        });

        Ok(Self {
            state,
            base_url,
            shutdown_tx: Some(shutdown_tx),
            _task: task,
        })
    }

    /// Returns the server base URL (e.g., `http://127.0.0.1:12345`).
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Creates or replaces a ConfigMap, returning its resource version.
    pub fn seed(&self, key: &RecordKey, data: RecordData) -> String {
        self.state.store.put(key, data).expect("seed config map")
    }

    /// Returns a ConfigMap's current data.
    #[must_use]
    pub fn snapshot(&self, key: &RecordKey) -> Option<RecordData> {
        self.state.store.snapshot(key).expect("snapshot config map")
    }

    /// Answers the next `count` requests with `503 Service Unavailable`.
    pub fn fail_next(&self, count: u32) {
        self.state.unavailable.fetch_add(count, Ordering::SeqCst);
    }

    /// Total requests received, including failed ones.
    #[must_use]
    pub fn request_count(&self) -> usize {
        self.state.requests.load(Ordering::SeqCst)
    }
}

impl Drop for FakeKubeApi {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

fn status(code: StatusCode, message: &str) -> Response {
    (
        code,
        axum::Json(json!({
            "kind": "Status",
            "apiVersion": "v1",
            "status": "Failure",
            "message": message,
            "code": code.as_u16(),
        })),
    )
        .into_response()
}

fn config_map(key: &RecordKey, data: &RecordData, resource_version: &str) -> Response {
    axum::Json(json!({
        "kind": "ConfigMap",
        "apiVersion": "v1",
        "metadata": {
            "name": key.name,
            "namespace": key.namespace,
            "resourceVersion": resource_version,
        },
        "data": data,
    }))
    .into_response()
}

async fn get_config_map(
    State(state): State<ServerState>,
    Path((namespace, name)): Path<(String, String)>,
) -> Response {
    if let Some(response) = state.begin_request() {
        return response;
    }

    let key = RecordKey::new(name, namespace);
    match state.store.read(&key).await {
        Ok(record) => config_map(&key, &record.data, &record.resource_version),
        Err(e) if e.is_not_found() => status(StatusCode::NOT_FOUND, &e.to_string()),
        Err(e) => status(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}

async fn patch_config_map(
    State(state): State<ServerState>,
    Path((namespace, name)): Path<(String, String)>,
    body: Bytes,
) -> Response {
    if let Some(response) = state.begin_request() {
        return response;
    }

    let Ok(patch) = serde_json::from_slice::<Value>(&body) else {
        return status(StatusCode::BAD_REQUEST, "invalid JSON patch");
    };

    let key = RecordKey::new(name, namespace);
    let current = match state.store.read(&key).await {
        Ok(record) => record,
        Err(e) if e.is_not_found() => return status(StatusCode::NOT_FOUND, &e.to_string()),
        Err(e) => return status(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    };

    if let Some(expected) = patch
        .pointer("/metadata/resourceVersion")
        .and_then(Value::as_str)
    {
        if expected != current.resource_version {
            return status(StatusCode::CONFLICT, "the object has been modified");
        }
    }

    let mut data = current.data;
    if let Some(entries) = patch.get("data").and_then(Value::as_object) {
        for (entry, value) in entries {
            match value {
                Value::Null => {
                    data.remove(entry);
                }
                Value::String(text) => {
                    data.insert(entry.clone(), text.clone());
                }
                _ => return status(StatusCode::UNPROCESSABLE_ENTITY, "data values must be strings"),
            }
        }
    }

    match state
        .store
        .write_if(&key, &current.resource_version, data.clone())
        .await
    {
        Ok(WriteResult::Success { resource_version }) => {
            config_map(&key, &data, &resource_version)
        }
        Ok(WriteResult::Conflict { .. }) => {
            status(StatusCode::CONFLICT, "the object has been modified")
        }
        Err(e) => status(StatusCode::INTERNAL_SERVER_ERROR, &e.to_string()),
    }
}
