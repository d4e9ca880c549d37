//! End-to-end federation join: two fake backing services, joined on a
//! `Movie` boundary type, driven through the real public HTTP router.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use gateway::registry::ServiceRegistry;
use gateway::wire::inbound::{public_router, AppState};
use std::time::Duration;
use tokio::sync::watch;
use tower::ServiceExt;

const MOVIES_SCHEMA: &str = r#"
directive @boundary on OBJECT | FIELD_DEFINITION
type Service { name: String! version: String! schema: String! }
type Query {
    service: Service!
    movies: [Movie!]!
    movie(id: ID!): Movie @boundary
}
type Movie @boundary {
    id: ID!
    title: String!
}
"#;

const REVIEWS_SCHEMA: &str = r#"
directive @boundary on OBJECT | FIELD_DEFINITION
type Service { name: String! version: String! schema: String! }
type Query {
    service: Service!
    movie(id: ID!): Movie @boundary
}
type Movie @boundary {
    id: ID!
    compTitles: [String!]!
}
"#;

async fn app_state() -> (AppState, std::sync::Arc<std::sync::atomic::AtomicUsize>, std::sync::Arc<std::sync::atomic::AtomicUsize>) {
    let (movies_url, movies_calls) = common::spawn_fake_service("movies", "1.0.0", MOVIES_SCHEMA, |query| {
        if query.contains("movies") {
            serde_json::json!({ "data": { "movies": [
                { "id": "1", "title": "Arrival" },
                { "id": "2", "title": "Contact" },
            ] } })
        } else {
            serde_json::json!({ "data": {} })
        }
    })
    .await;

    let (reviews_url, reviews_calls) = common::spawn_fake_service("reviews", "1.0.0", REVIEWS_SCHEMA, |query| {
        assert!(query.contains("_bramble_id"), "child query must request the bramble join fields");
        serde_json::json!({ "data": { "_0": { "_bramble_id": "1", "compTitles": ["Contact"] }, "_1": { "_bramble_id": "2", "compTitles": ["Arrival"] } } })
    })
    .await;

    let registry = ServiceRegistry::new(vec![movies_url, reviews_url], reqwest::Client::new());
    let (_shutdown_tx, shutdown_rx) = watch::channel(());
    registry.spawn_polling(Duration::from_secs(60), shutdown_rx);
    common::wait_ready(&registry).await;

    let state = AppState {
        registry,
        plugins: std::sync::Arc::new(gateway::plugin::PluginPipeline::default()),
        http: reqwest::Client::new(),
        max_requests_per_operation: 50,
        max_request_bytes: 2 * 1024 * 1024,
        max_response_time: Duration::from_secs(5),
    };
    (state, movies_calls, reviews_calls)
}

#[tokio::test(flavor = "multi_thread")]
async fn joins_across_services_on_boundary_type() {
    let (state, movies_calls, reviews_calls) = app_state().await;
    let router = public_router(state);

    let request = Request::builder()
        .method("POST")
        .uri("/query")
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&serde_json::json!({
            "query": "query { movies { title compTitles } }"
        })).unwrap()))
        .unwrap();

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

    let movies = body["data"]["movies"].as_array().unwrap();
    assert_eq!(movies.len(), 2);
    assert_eq!(movies[0]["title"], "Arrival");
    assert_eq!(movies[0]["compTitles"], serde_json::json!(["Contact"]));
    assert_eq!(movies[1]["compTitles"], serde_json::json!(["Arrival"]));

    // One request each for the root fetch; the introspection polls that
    // ran before this query already bumped the counters once.
    assert_eq!(movies_calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    assert_eq!(reviews_calls.load(std::sync::atomic::Ordering::SeqCst), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn empty_insertion_point_never_calls_the_child_service() {
    let (movies_url, movies_calls) = common::spawn_fake_service("movies", "1.0.0", MOVIES_SCHEMA, |_| {
        serde_json::json!({ "data": { "movies": [] } })
    })
    .await;
    let (reviews_url, reviews_calls) = common::spawn_fake_service("reviews", "1.0.0", REVIEWS_SCHEMA, |_| {
        panic!("reviews service must not be called when there are no movies to join against")
    })
    .await;

    let registry = ServiceRegistry::new(vec![movies_url, reviews_url], reqwest::Client::new());
    let (_shutdown_tx, shutdown_rx) = watch::channel(());
    registry.spawn_polling(Duration::from_secs(60), shutdown_rx);
    common::wait_ready(&registry).await;

    let before_reviews_calls = reviews_calls.load(std::sync::atomic::Ordering::SeqCst);

    let state = AppState {
        registry,
        plugins: std::sync::Arc::new(gateway::plugin::PluginPipeline::default()),
        http: reqwest::Client::new(),
        max_requests_per_operation: 50,
        max_request_bytes: 2 * 1024 * 1024,
        max_response_time: Duration::from_secs(5),
    };
    let router = public_router(state);

    let request = Request::builder()
        .method("POST")
        .uri("/query")
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&serde_json::json!({
            "query": "query { movies { title compTitles } }"
        })).unwrap()))
        .unwrap();

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["data"]["movies"], serde_json::json!([]));

    assert_eq!(reviews_calls.load(std::sync::atomic::Ordering::SeqCst), before_reviews_calls, "no new calls to reviews");
    assert!(movies_calls.load(std::sync::atomic::Ordering::SeqCst) >= 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn debug_header_attaches_variables_query_and_plan_extensions() {
    let (state, _movies_calls, _reviews_calls) = app_state().await;
    let router = public_router(state);

    let request = Request::builder()
        .method("POST")
        .uri("/query")
        .header("content-type", "application/json")
        .header("x-gateway-debug", "true")
        .body(Body::from(serde_json::to_vec(&serde_json::json!({
            "query": "query { movies { title } }",
            "variables": { "unused": 1 },
        })).unwrap()))
        .unwrap();

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();

    assert_eq!(body["extensions"]["variables"], serde_json::json!({"unused": 1}));
    assert_eq!(body["extensions"]["query"], "query { movies { title } }");
    assert!(body["extensions"]["plan"].as_str().unwrap().contains("Step"));
}

#[tokio::test(flavor = "multi_thread")]
async fn no_debug_header_omits_extensions_entirely() {
    let (state, _movies_calls, _reviews_calls) = app_state().await;
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
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert!(body.get("extensions").is_none());
}
