//! End-to-end permission filtering: a plugin that injects restricted
//! `OperationPermissions` into the request context, verified against the
//! exact wire error wording contracts rely on.

mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use federation::{AllowedFields, OperationPermissions};
use gateway::context::RequestContext;
use gateway::error::GatewayError;
use gateway::plugin::{Plugin, PluginPipeline};
use gateway::registry::ServiceRegistry;
use gateway::wire::inbound::{public_router, AppState};
use http::HeaderMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tower::ServiceExt;

const MOVIES_SCHEMA: &str = r#"
directive @boundary on OBJECT | FIELD_DEFINITION
type Service { name: String! version: String! schema: String! }
type Query {
    service: Service!
    movies: [Movie!]!
}
type Movie {
    id: ID!
    title: String!
    compTitles: [String!]!
}
"#;

/// Restricts every request to `{ movies { title } }`, mirroring the
/// gateway's own authentication-plugin extension point rather than
/// calling `federation::permissions` directly.
struct RestrictivePlugin;

#[async_trait::async_trait]
impl Plugin for RestrictivePlugin {
    async fn new(_config: serde_json::Value) -> Result<Self, tower::BoxError> {
        Ok(Self)
    }

    async fn on_graphql_request(&self, context: &RequestContext, _headers: &HeaderMap) -> Result<(), GatewayError> {
        let movie_fields = AllowedFields::from_json(&serde_json::json!({ "title": "*" }));
        let mut query_fields = indexmap::IndexMap::new();
        query_fields.insert("movies".to_string(), movie_fields);
        context.add_permissions(OperationPermissions {
            query: AllowedFields::Fields(query_fields),
            mutation: AllowedFields::none(),
            subscription: AllowedFields::none(),
        });
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn disallowed_field_is_stripped_with_the_contract_error_message() {
    let (movies_url, _calls) = common::spawn_fake_service("movies", "1.0.0", MOVIES_SCHEMA, |_| {
        serde_json::json!({ "data": { "movies": [{ "id": "1", "title": "Arrival" }] } })
    })
    .await;

    let registry = ServiceRegistry::new(vec![movies_url], reqwest::Client::new());
    let (_shutdown_tx, shutdown_rx) = watch::channel(());
    registry.spawn_polling(Duration::from_secs(60), shutdown_rx);
    common::wait_ready(&registry).await;

    let plugins = Arc::new(PluginPipeline::new(vec![Arc::new(RestrictivePlugin)]));
    let state = AppState {
        registry,
        plugins,
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

    let movies = body["data"]["movies"].as_array().unwrap();
    assert_eq!(movies[0]["title"], "Arrival");
    assert!(movies[0].get("compTitles").is_none());

    let errors = body["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0]["message"], "user do not have permission to access field query.movies.compTitles");
}
