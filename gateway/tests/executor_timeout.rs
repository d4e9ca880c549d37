//! End-to-end timeout handling: a backing service that never answers the
//! root query must surface the contract error message and still respond
//! with HTTP 200, rather than hanging the client (spec.md §4.5, §7).

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use gateway::registry::ServiceRegistry;
use gateway::wire::inbound::{public_router, AppState};
use std::time::Duration;
use tokio::sync::watch;
use tower::ServiceExt;

const SCHEMA: &str = r#"
directive @boundary on OBJECT | FIELD_DEFINITION
type Service { name: String! version: String! schema: String! }
type Query {
    service: Service!
    movies: [Movie!]!
}
type Movie {
    id: ID!
    title: String!
}
"#;

/// Answers the introspection poll immediately but hangs forever on every
/// other query, so the executor's deadline is what ends the request.
async fn spawn_slow_service() -> String {
    async fn handle(Json(body): Json<serde_json::Value>) -> Json<serde_json::Value> {
        let query = body.get("query").and_then(|v| v.as_str()).unwrap_or_default();
        if query.contains("service {") {
            return Json(serde_json::json!({
                "data": { "service": { "name": "movies", "version": "1.0.0", "schema": SCHEMA } }
            }));
        }
        std::future::pending::<()>().await;
        unreachable!()
    }
    let app = Router::new().route("/", post(handle));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/")
}

#[tokio::test(flavor = "multi_thread")]
async fn downstream_timeout_surfaces_as_a_graphql_error() {
    let url = spawn_slow_service().await;
    let registry = ServiceRegistry::new(vec![url], reqwest::Client::new());
    let (_shutdown_tx, shutdown_rx) = watch::channel(());
    registry.spawn_polling(Duration::from_secs(60), shutdown_rx);
    common::wait_ready(&registry).await;

    let state = AppState {
        registry,
        plugins: std::sync::Arc::new(gateway::plugin::PluginPipeline::default()),
        http: reqwest::Client::new(),
        max_requests_per_operation: 50,
        max_request_bytes: 2 * 1024 * 1024,
        max_response_time: Duration::from_millis(100),
    };
    let router = public_router(state);

    let request = Request::builder()
        .method("POST")
        .uri("/query")
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&serde_json::json!({
            "query": "query { movies { title } }"
        })).unwrap()))
        .unwrap();

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

    let errors = body["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["message"], "downstream request timed out");
    assert!(body.get("data").is_none());
}
