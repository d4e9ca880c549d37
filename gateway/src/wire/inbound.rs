//! C8 — inbound wire adapter (spec.md §4.8, §6).
//!
//! `POST /query` accepts a plain GraphQL-over-HTTP JSON envelope, or a
//! `multipart/form-data` request per the GraphQL multipart request spec
//! (<https://github.com/jaydenseric/graphql-multipart-request-spec>).
//! `GET /playground` serves a static page; `GET /health` answers `OK`
//! once the registry has completed its first merge.

use crate::context::RequestContext;
use crate::error::{GatewayError, GraphqlError};
use crate::executor::{execute, CancelOnDrop, Executor};
use crate::plugin::PluginPipeline;
use crate::registry::ServiceRegistry;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use federation::permissions;
use federation::plan::plan_operation;
use futures::TryStreamExt;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ServiceRegistry>,
    pub plugins: Arc<PluginPipeline>,
    pub http: reqwest::Client,
    pub max_requests_per_operation: usize,
    pub max_request_bytes: usize,
    pub max_response_time: Duration,
}

pub fn public_router(state: AppState) -> Router {
    let plugins = Arc::clone(&state.plugins);
    let router = Router::new()
        .route("/query", post(handle_query))
        .route("/playground", get(playground))
        .with_state(state);
    plugins.public_mux(router)
}

pub fn private_router(state: AppState) -> Router {
    let plugins = Arc::clone(&state.plugins);
    let router = Router::new().route("/health", get(health)).with_state(state);
    plugins.private_mux(router)
}

#[derive(Debug, Clone, Deserialize)]
struct GraphqlRequestBody {
    query: String,
    #[serde(default)]
    variables: IndexMap<String, serde_json::Value>,
    #[serde(default, rename = "operationName")]
    operation_name: Option<String>,
}

#[derive(Debug, Serialize)]
struct GraphqlResponseBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    errors: Vec<GraphqlError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    extensions: Option<serde_json::Map<String, serde_json::Value>>,
}

/// The header a client sets to opt into `variables`/`query`/`plan` debug
/// extensions (spec.md §6, SPEC_FULL.md §11) — a plugin can reach the same
/// effect by calling `RequestContext::set_debug` directly instead.
const DEBUG_HEADER: &str = "x-gateway-debug";

fn debug_requested(headers: &HeaderMap) -> bool {
    headers
        .get(DEBUG_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    if state.registry.is_ready() {
        (StatusCode::OK, "OK")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "schema not ready")
    }
}

async fn playground() -> Html<&'static str> {
    Html(include_str!("../playground.html"))
}

async fn handle_query(State(state): State<AppState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let content_type = parts
        .headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    let parsed = if content_type.starts_with("multipart/form-data") {
        parse_multipart_request(body, &content_type, state.max_request_bytes).await
    } else {
        parse_json_request(body, state.max_request_bytes).await
    };

    let body = match parsed {
        Ok(body) => body,
        Err(error) => return error_response(StatusCode::BAD_REQUEST, error.into_graphql_errors()),
    };

    run_operation(state, parts.headers, body).await
}

async fn parse_json_request(body: Body, max_request_bytes: usize) -> Result<GraphqlRequestBody, GatewayError> {
    let bytes = axum::body::to_bytes(body, max_request_bytes)
        .await
        .map_err(|_| GatewayError::BodyTooLarge)?;
    serde_json::from_slice(&bytes).map_err(|error| GatewayError::MalformedRequest(error.to_string()))
}

/// Parses the three-part multipart shape the GraphQL multipart request
/// spec defines: an
/// `operations` field (the GraphQL request JSON, file variables set to
/// `null`), a `map` field (`{fileFieldName: ["variables.path", ...]}`),
/// and one part per uploaded file. `max_request_bytes` bounds the total
/// size read across all parts (spec.md §5).
async fn parse_multipart_request(body: Body, content_type: &str, max_request_bytes: usize) -> Result<GraphqlRequestBody, GatewayError> {
    let boundary = multer::parse_boundary(content_type).map_err(|error| GatewayError::MalformedRequest(error.to_string()))?;
    let stream = body.into_data_stream().map_err(std::io::Error::other);
    let mut multipart = multer::Multipart::with_constraints(
        stream,
        boundary,
        multer::Constraints::new().size_limit(multer::SizeLimit::new().whole_stream(max_request_bytes as u64)),
    );

    let mut operations: Option<serde_json::Value> = None;
    let mut file_map: Option<IndexMap<String, Vec<String>>> = None;
    let mut files: IndexMap<String, serde_json::Value> = IndexMap::new();

    while let Some(field) = multipart.next_field().await.map_err(|error| GatewayError::MalformedRequest(error.to_string()))? {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "operations" => {
                let text = field.text().await.map_err(|error| GatewayError::MalformedRequest(error.to_string()))?;
                operations = Some(serde_json::from_str(&text).map_err(|error| GatewayError::MalformedRequest(error.to_string()))?);
            }
            "map" => {
                let text = field.text().await.map_err(|error| GatewayError::MalformedRequest(error.to_string()))?;
                file_map = Some(serde_json::from_str(&text).map_err(|error| GatewayError::MalformedRequest(error.to_string()))?);
            }
            other => {
                let filename = field.file_name().map(str::to_string);
                let content_type = field.content_type().map(|m| m.to_string());
                let bytes = field.bytes().await.map_err(|error| GatewayError::MalformedRequest(error.to_string()))?;
                files.insert(
                    other.to_string(),
                    serde_json::json!({ "filename": filename, "contentType": content_type, "size": bytes.len() }),
                );
            }
        }
    }

    let operations = operations.ok_or_else(|| GatewayError::MalformedRequest("multipart request missing `operations` field".to_string()))?;
    let mut parsed: GraphqlRequestBody =
        serde_json::from_value(operations).map_err(|error| GatewayError::MalformedRequest(error.to_string()))?;

    if let Some(file_map) = file_map {
        for (file_field, variable_paths) in file_map {
            let Some(value) = files.get(&file_field) else { continue };
            for path in variable_paths {
                set_variable_path(&mut parsed.variables, &path, value.clone());
            }
        }
    }

    Ok(parsed)
}

/// Writes `value` at a dotted `variables.*` path such as `variables.0.file`
/// or `variables.input.avatar`.
fn set_variable_path(variables: &mut IndexMap<String, serde_json::Value>, path: &str, value: serde_json::Value) {
    let mut segments = path.trim_start_matches("variables.").split('.');
    let Some(first) = segments.next() else { return };
    let mut target = variables.entry(first.to_string()).or_insert(serde_json::Value::Null);
    for segment in segments {
        if target.is_null() {
            *target = serde_json::Value::Object(serde_json::Map::new());
        }
        let serde_json::Value::Object(map) = target else { return };
        target = map.entry(segment.to_string()).or_insert(serde_json::Value::Null);
    }
    *target = value;
}

async fn run_operation(state: AppState, headers: HeaderMap, body: GraphqlRequestBody) -> Response {
    let Some(schema) = state.registry.snapshot().await else {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, vec![GraphqlError::new("no merged schema is available yet")]);
    };

    let context = RequestContext::new();
    if debug_requested(&headers) {
        context.set_debug(true);
    }
    if let Err(error) = state.plugins.run_graphql_request(&context, &headers).await {
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, error.into_graphql_errors());
    }

    let mut document = match federation::parse_operation(&body.query) {
        Ok(document) => document,
        Err(error) => return error_response(StatusCode::OK, GatewayError::Plan(error).into_graphql_errors()),
    };

    let permissions = context.permissions();
    let permission_errors: Vec<GraphqlError> = permissions::filter_operation(&permissions, &mut document, body.operation_name.as_deref())
        .iter()
        .map(GraphqlError::from_federation)
        .collect();

    let Some(operation) = document.operation(body.operation_name.as_deref()).cloned() else {
        return error_response(StatusCode::OK, vec![GraphqlError::new("no matching operation in document")]);
    };

    let plan = match plan_operation(&operation, &document.fragments, &schema, &body.variables) {
        Ok(plan) => plan,
        Err(error) => {
            let mut errors = permission_errors;
            errors.extend(GatewayError::Plan(error).into_graphql_errors());
            return error_response(StatusCode::OK, errors);
        }
    };

    let extensions = context.debug().then(|| debug_extensions(&body, &plan));

    // One cancel channel per request: if the client disconnects before
    // `execute` finishes, axum/hyper drop this whole async fn's future,
    // which drops `cancel_guard` without reaching `disarm()` below and
    // flips `cancel_rx` for every upstream call still in flight.
    let (cancel_tx, cancel_rx) = watch::channel(false);
    let cancel_guard = CancelOnDrop::new(cancel_tx);
    let executor = Executor::new(
        state.http.clone(),
        context.outgoing_headers(),
        state.max_requests_per_operation,
        state.max_response_time,
        cancel_rx,
    );
    let outcome = execute(&plan, operation.operation_type, &schema, &executor).await;
    cancel_guard.disarm();

    let mut errors = permission_errors;
    errors.extend(outcome.errors);
    let has_data = !outcome.data.is_null();
    let response = GraphqlResponseBody {
        data: if has_data || errors.is_empty() { Some(outcome.data) } else { None },
        errors,
        extensions,
    };
    (StatusCode::OK, Json(response)).into_response()
}

/// `variables`/`query`/`plan` debug extensions (spec.md §6).
fn debug_extensions(body: &GraphqlRequestBody, plan: &federation::plan::QueryPlan) -> serde_json::Map<String, serde_json::Value> {
    let mut extensions = serde_json::Map::new();
    extensions.insert("variables".to_string(), serde_json::to_value(&body.variables).unwrap_or(serde_json::Value::Null));
    extensions.insert("query".to_string(), serde_json::Value::String(body.query.clone()));
    extensions.insert("plan".to_string(), serde_json::Value::String(format!("{plan:#?}")));
    extensions
}

fn error_response(status: StatusCode, errors: Vec<GraphqlError>) -> Response {
    (status, Json(GraphqlResponseBody { data: None, errors, extensions: None })).into_response()
}
