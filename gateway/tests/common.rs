//! Shared test scaffolding: an in-process fake backing service, wired up
//! the same way the gateway's own registry talks to real services —
//! `{ service { name version schema } }` introspection, then plain
//! `{"query": ...}` POSTs for everything else.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

type Handler = dyn Fn(&str) -> serde_json::Value + Send + Sync;

struct FakeServiceState {
    name: &'static str,
    version: &'static str,
    schema: &'static str,
    calls: Arc<AtomicUsize>,
    handle: Arc<Handler>,
}

async fn handle(State(state): State<Arc<FakeServiceState>>, Json(body): Json<serde_json::Value>) -> Json<serde_json::Value> {
    state.calls.fetch_add(1, Ordering::SeqCst);
    let query = body.get("query").and_then(|v| v.as_str()).unwrap_or_default();
    if query.contains("service {") {
        return Json(serde_json::json!({
            "data": {
                "service": {
                    "name": state.name,
                    "version": state.version,
                    "schema": state.schema,
                }
            }
        }));
    }
    Json((state.handle)(query))
}

/// Spawns a fake backing service on an ephemeral localhost port and
/// returns its base URL plus a shared counter of requests it received
/// (introspection polls included).
pub async fn spawn_fake_service(
    name: &'static str,
    version: &'static str,
    schema: &'static str,
    handle_query: impl Fn(&str) -> serde_json::Value + Send + Sync + 'static,
) -> (String, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let state = Arc::new(FakeServiceState {
        name,
        version,
        schema,
        calls: Arc::clone(&calls),
        handle: Arc::new(handle_query),
    });
    let app = Router::new().route("/", post(handle)).with_state(state);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind fake service");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("fake service crashed");
    });
    (format!("http://{addr}/"), calls)
}

/// Blocks until the registry has completed its first merge, or panics
/// after a few seconds — the polling coordinator in `gateway::registry`
/// runs its initial pass without waiting for a full tick, so this should
/// resolve almost immediately in tests.
pub async fn wait_ready(registry: &gateway::registry::ServiceRegistry) {
    let mut ready = registry.ready_signal();
    if registry.is_ready() {
        return;
    }
    tokio::time::timeout(std::time::Duration::from_secs(5), ready.changed())
        .await
        .expect("registry never became ready")
        .expect("ready channel closed");
}
