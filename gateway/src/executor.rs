//! C5 — query executor (spec.md §4.5).
//!
//! Walks a `QueryPlan` depth-first, dispatching one HTTP request per
//! `Step` to its backing service and stitching the response back into
//! its parent at `insertion_path`. Siblings at the same level fire
//! concurrently, bounded by a semaphore sized to
//! `max-requests-per-operation`; an insertion point with no objects at it
//! never triggers its child step's request at all.

use crate::error::{ErrorLocation, GraphqlError};
use federation::ast::{print_selection_set, OperationType, Selection, SelectionSet, TypeRef};
use federation::plan::{BoundaryFetch, QueryPlan, Step, BRAMBLE_ID, BRAMBLE_TYPENAME};
use federation::GatewaySchema;
use http::HeaderValue;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A fully stitched response: `data` plus every error collected along the
/// way, downstream and gateway-local alike (spec.md §4.5 step 4: "errors
/// accumulate, they never abort the whole operation").
pub struct ExecutionOutcome {
    pub data: serde_json::Value,
    pub errors: Vec<GraphqlError>,
}

/// Everything the executor needs to reach backing services, threaded
/// through from one inbound request (spec.md §5: bounded per-operation
/// concurrency, a deadline, and cancellation on client disconnect).
///
/// `deadline` is computed once, when the executor is built — immediately
/// before it walks the whole `QueryPlan` — rather than re-derived per
/// upstream call. A root fetch plus two levels of children therefore share
/// one `max-response-time` budget for the whole operation instead of each
/// hop getting its own fresh window.
pub struct Executor {
    http: reqwest::Client,
    outgoing_headers: HashMap<String, HeaderValue>,
    semaphore: Arc<Semaphore>,
    deadline: tokio::time::Instant,
    cancel: watch::Receiver<bool>,
}

impl Executor {
    pub fn new(
        http: reqwest::Client,
        outgoing_headers: HashMap<String, HeaderValue>,
        max_requests_per_operation: usize,
        max_response_time: Duration,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        Self {
            http,
            outgoing_headers,
            semaphore: Arc::new(Semaphore::new(max_requests_per_operation.max(1))),
            deadline: tokio::time::Instant::now() + max_response_time,
            cancel,
        }
    }

    fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    async fn post(&self, service_url: &str, query: String) -> Result<serde_json::Value, GraphqlError> {
        if self.is_cancelled() {
            return Err(GraphqlError::cancelled());
        }
        let _permit = self.semaphore.acquire().await.expect("executor semaphore is never closed");

        let mut request = self.http.post(service_url).json(&serde_json::json!({ "query": query }));
        for (name, value) in &self.outgoing_headers {
            request = request.header(name, value.clone());
        }

        tokio::select! {
            biased;
            _ = wait_cancelled(self.cancel.clone()) => Err(GraphqlError::cancelled()),
            result = tokio::time::timeout_at(self.deadline, request.send()) => {
                match result {
                    Err(_elapsed) => Err(GraphqlError::timeout()),
                    Ok(Err(send_error)) => Err(GraphqlError::new(send_error.to_string())),
                    Ok(Ok(response)) => response
                        .json::<serde_json::Value>()
                        .await
                        .map_err(|error| GraphqlError::new(format!("malformed response body: {error}"))),
                }
            }
        }
    }
}

/// Attaches the sub-query context spec.md §4.5 step 4 / §6 require on every
/// upstream failure — transport failures and GraphQL errors a service
/// itself returned alike — without touching the preserved message.
/// `service_url` doubles as `serviceName`: a Step only carries the URL it
/// dispatches to, not the separate friendly name the registry tracks.
fn attach_upstream_context(error: GraphqlError, query: &str, selection_path: &str, service_url: &str) -> GraphqlError {
    error
        .with_extension("selectionSet", query)
        .with_extension("selectionPath", selection_path)
        .with_extension("serviceName", service_url)
        .with_extension("serviceUrl", service_url)
}

fn path_string(path: &[String]) -> String {
    path.join(".")
}

/// Turns the drop of an in-flight request's own future into a cancellation
/// signal for its `Executor`. Axum/hyper drop a handler's future outright,
/// without ever polling it to completion, when the client disconnects
/// before a response is produced — holding one of these for the span of
/// `execute()` means that drop flips `cancel` and every upstream call still
/// in flight observes it through [`wait_cancelled`]. Call [`disarm`] once
/// the operation has produced a response normally, so the guard's own drop
/// at the end of the handler doesn't send a cancellation signal no one
/// needs anymore.
///
/// [`disarm`]: CancelOnDrop::disarm
pub struct CancelOnDrop(Option<watch::Sender<bool>>);

impl CancelOnDrop {
    pub fn new(tx: watch::Sender<bool>) -> Self {
        Self(Some(tx))
    }

    pub fn disarm(mut self) {
        self.0 = None;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if let Some(tx) = self.0.take() {
            let _ = tx.send(true);
        }
    }
}

async fn wait_cancelled(mut cancel: watch::Receiver<bool>) {
    loop {
        if *cancel.borrow() {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Runs the whole plan and returns the stitched result (spec.md §4.5).
pub async fn execute(
    plan: &QueryPlan,
    operation_type: OperationType,
    schema: &GatewaySchema,
    executor: &Executor,
) -> ExecutionOutcome {
    let keyword = match operation_type {
        OperationType::Query => "query",
        OperationType::Mutation => "mutation",
        OperationType::Subscription => "subscription",
    };
    let query = format!("{keyword} {}", print_selection_set(&plan.root.selection_set));

    let mut errors = Vec::new();
    let mut data = match executor.post(&plan.root.service_url, query.clone()).await {
        Ok(body) => {
            let (data, mut response_errors) = split_response(body, &query, "", &plan.root.service_url);
            errors.append(&mut response_errors);
            data
        }
        Err(error) => {
            errors.push(attach_upstream_context(error, &query, "", &plan.root.service_url));
            serde_json::Value::Null
        }
    };

    stitch(&mut data, &plan.root.children, executor, &mut errors).await;

    // GraphQL null propagation (spec.md §4.5, §8): a null at a field whose
    // schema type is non-null bubbles up to the nearest nullable ancestor;
    // with no ancestor left to absorb it, the whole `data` is null.
    let root_ty = TypeRef::NonNull(Box::new(TypeRef::Named(plan.root_type.clone())));
    if propagate_nulls(&mut data, &root_ty, &plan.client_selection, &schema.schema) {
        data = serde_json::Value::Null;
    }

    ExecutionOutcome { data, errors }
}

/// Fetches and splices in every child of `children` found within `data`,
/// then recurses into their own children against the freshly fetched
/// objects. Boxed because it recurses through an `async fn`.
fn stitch<'a>(
    data: &'a mut serde_json::Value,
    children: &'a [Step],
    executor: &'a Executor,
    errors: &'a mut Vec<GraphqlError>,
) -> BoxFuture<'a, ()> {
    Box::pin(async move {
        struct Pending<'a> {
            child: &'a Step,
            ids: Vec<String>,
        }

        let mut pending = Vec::new();
        for child in children {
            let mut ids = Vec::new();
            collect_ids_at_path(data, &child.insertion_path.0, &mut ids);
            ids.sort();
            ids.dedup();
            // spec.md §4.5: a child step whose insertion point resolved to
            // no objects is never executed.
            if ids.is_empty() {
                continue;
            }
            pending.push(Pending { child, ids });
        }

        if pending.is_empty() {
            return;
        }

        let fetched = futures::future::join_all(pending.into_iter().map(|p| async move {
            let query = build_child_query(p.child, &p.ids);
            let result = executor.post(&p.child.service_url, query.clone()).await;
            (p.child, p.ids, query, result)
        }))
        .await;

        for (child, ids, query, result) in fetched {
            let field_keys = own_field_keys(child);
            seed_null_fields(data, &child.insertion_path.0, &field_keys);
            let path = path_string(&child.insertion_path.0);

            let mut child_data = match result {
                Ok(body) => {
                    let (child_data, mut response_errors) = split_response(body, &query, &path, &child.service_url);
                    errors.append(&mut response_errors);
                    child_data
                }
                Err(error) => {
                    errors.push(attach_upstream_context(error, &query, &path, &child.service_url));
                    continue;
                }
            };

            stitch(&mut child_data, &child.children, executor, errors).await;

            let by_id = extract_by_id(&child_data, child, &ids);
            merge_at_path_by_id(data, &child.insertion_path.0, &by_id);
        }
    })
}

fn keyword_query(selection: &str) -> String {
    format!("query {selection}")
}

/// Builds the sub-query for a boundary fetch: either one plural request
/// with `ids: [...]`, or N aliased singular requests in a single document
/// (spec.md §4.4 `BoundaryFetch`, §4.5 step 1).
fn build_child_query(child: &Step, ids: &[String]) -> String {
    let selection = print_selection_set(&child.selection_set);
    match &child.boundary_fetch {
        Some(BoundaryFetch::Plural { field_name }) => {
            let literal = ids.iter().map(|id| quote(id)).collect::<Vec<_>>().join(",");
            format!("query {{ {field_name}(ids:[{literal}]) {selection} }}")
        }
        Some(BoundaryFetch::Singular { field_name }) => {
            let mut out = String::from("query {");
            for (index, id) in ids.iter().enumerate() {
                if index > 0 {
                    out.push(' ');
                }
                out.push_str(&format!("_{index}: {field_name}(id:{}) {selection}", quote(id)));
            }
            out.push('}');
            out
        }
        None => keyword_query(&selection),
    }
}

fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

/// The response keys a step's own selection set asks for, excluding the
/// synthetic join-key fields (used to seed `null` placeholders before a
/// failed fetch, so the response still carries the keys the client asked
/// for).
fn own_field_keys(step: &Step) -> Vec<String> {
    step.selection_set
        .iter()
        .filter_map(|selection| match selection {
            federation::ast::Selection::Field(field) => {
                let key = field.response_key();
                if key == BRAMBLE_ID || key == BRAMBLE_TYPENAME {
                    None
                } else {
                    Some(key.to_string())
                }
            }
            _ => None,
        })
        .collect()
}

/// Carries forward a service's own `locations: [{line, column}]` on an
/// error it returned, rather than dropping it — the upstream error is
/// already positioned against the sub-query we sent it.
fn upstream_locations(item: &serde_json::Value) -> Vec<ErrorLocation> {
    item.get("locations")
        .and_then(|l| l.as_array())
        .map(|entries| {
            entries
                .iter()
                .filter_map(|entry| {
                    let line = entry.get("line")?.as_u64()? as usize;
                    let column = entry.get("column")?.as_u64()? as usize;
                    Some(ErrorLocation { line, column })
                })
                .collect()
        })
        .unwrap_or_default()
}

fn split_response(body: serde_json::Value, query: &str, selection_path: &str, service_url: &str) -> (serde_json::Value, Vec<GraphqlError>) {
    let data = body.get("data").cloned().unwrap_or(serde_json::Value::Null);
    let errors = body
        .get("errors")
        .and_then(|e| e.as_array())
        .map(|items| {
            items
                .iter()
                .map(|item| {
                    let error = GraphqlError {
                        message: item.get("message").and_then(|m| m.as_str()).unwrap_or("upstream error").to_string(),
                        path: item
                            .get("path")
                            .and_then(|p| p.as_array())
                            .map(|p| p.iter().filter_map(|v| v.as_str().map(|s| s.to_string())).collect()),
                        locations: upstream_locations(&item),
                        extensions: serde_json::Map::new(),
                    };
                    attach_upstream_context(error, query, selection_path, service_url)
                })
                .collect()
        })
        .unwrap_or_default();
    (data, errors)
}

/// Recursively applies GraphQL null propagation (spec.md §4.5, §8) to an
/// already-stitched value against the client's own selection (the plan's
/// `client_selection`, not any one Step's split-up selection set) and the
/// merged schema's field nullability. Returns whether `value`'s own slot
/// must be discarded by the caller — only possible when `ty` itself is
/// non-null; a nullable `ty` always absorbs a deeper violation by nulling
/// its own value in place and reporting nothing upward.
fn propagate_nulls(
    value: &mut serde_json::Value,
    ty: &TypeRef,
    selections: &SelectionSet,
    schema: &federation::ast::SchemaDocument,
) -> bool {
    match ty {
        TypeRef::NonNull(inner) => {
            if value.is_null() {
                return true;
            }
            absorb_nulls(value, inner, selections, schema);
            false
        }
        _ => {
            absorb_nulls(value, ty, selections, schema);
            false
        }
    }
}

/// Mutates a value of a known-nullable type in place so that any deeper
/// non-null violation is absorbed here rather than bubbling further.
/// `ty` is never `NonNull` — callers only reach here once the wrapper has
/// been stripped by [`propagate_nulls`].
fn absorb_nulls(value: &mut serde_json::Value, ty: &TypeRef, selections: &SelectionSet, schema: &federation::ast::SchemaDocument) {
    if value.is_null() {
        return;
    }
    match ty {
        TypeRef::NonNull(_) => unreachable!("callers only pass nullable types to absorb_nulls"),
        TypeRef::List(element_ty) => {
            if let serde_json::Value::Array(items) = value {
                for item in items.iter_mut() {
                    if propagate_nulls(item, element_ty, selections, schema) {
                        *item = serde_json::Value::Null;
                    }
                }
            }
        }
        TypeRef::Named(type_name) => {
            if let serde_json::Value::Object(map) = value {
                if let Some(type_def) = schema.get(type_name) {
                    for selection in selections.iter() {
                        propagate_into_object(selection, map, type_def, schema);
                    }
                }
            }
        }
    }
}

fn propagate_into_object(
    selection: &Selection,
    map: &mut serde_json::Map<String, serde_json::Value>,
    type_def: &federation::ast::TypeDefinition,
    schema: &federation::ast::SchemaDocument,
) {
    match selection {
        Selection::Field(field) => {
            let key = field.response_key();
            if key == "__typename" {
                return;
            }
            let Some(field_def) = type_def.fields.get(&field.name) else { return };
            let Some(slot) = map.get_mut(key) else { return };
            if propagate_nulls(slot, &field_def.ty, &field.selection_set, schema) {
                *slot = serde_json::Value::Null;
            }
        }
        // Inline fragments select against the same object; named fragments
        // are already flattened away by the planner before a `QueryPlan`
        // (and thus `client_selection`) is ever built.
        Selection::InlineFragment(inline) => {
            for inner in inline.selection_set.iter() {
                propagate_into_object(inner, map, type_def, schema);
            }
        }
        Selection::FragmentSpread(_) => {}
    }
}

fn collect_ids_at_path(value: &serde_json::Value, path: &[String], out: &mut Vec<String>) {
    if path.is_empty() {
        match value {
            serde_json::Value::Array(items) => {
                for item in items {
                    if let Some(id) = item.get("id").and_then(|v| v.as_str()) {
                        out.push(id.to_string());
                    }
                }
            }
            serde_json::Value::Object(_) => {
                if let Some(id) = value.get("id").and_then(|v| v.as_str()) {
                    out.push(id.to_string());
                }
            }
            _ => {}
        }
        return;
    }
    match value {
        serde_json::Value::Array(items) => {
            for item in items {
                collect_ids_at_path(item, path, out);
            }
        }
        serde_json::Value::Object(map) => {
            if let Some(next) = map.get(&path[0]) {
                collect_ids_at_path(next, &path[1..], out);
            }
        }
        _ => {}
    }
}

/// Inserts `null` for any of `field_keys` not already present on every
/// object at `path`, so a field the client asked for stays in the
/// response (as `null`) even if the service that owns it never answers.
fn seed_null_fields(value: &mut serde_json::Value, path: &[String], field_keys: &[String]) {
    if path.is_empty() {
        match value {
            serde_json::Value::Array(items) => {
                for item in items.iter_mut() {
                    seed_one(item, field_keys);
                }
            }
            serde_json::Value::Object(_) => seed_one(value, field_keys),
            _ => {}
        }
        return;
    }
    match value {
        serde_json::Value::Array(items) => {
            for item in items.iter_mut() {
                seed_null_fields(item, path, field_keys);
            }
        }
        serde_json::Value::Object(map) => {
            if let Some(next) = map.get_mut(&path[0]) {
                seed_null_fields(next, &path[1..], field_keys);
            }
        }
        _ => {}
    }
}

fn seed_one(target: &mut serde_json::Value, field_keys: &[String]) {
    if let serde_json::Value::Object(map) = target {
        for key in field_keys {
            map.entry(key.clone()).or_insert(serde_json::Value::Null);
        }
    }
}

fn extract_by_id(data: &serde_json::Value, child: &Step, ids: &[String]) -> HashMap<String, serde_json::Value> {
    let mut out = HashMap::new();
    match &child.boundary_fetch {
        Some(BoundaryFetch::Plural { field_name }) => {
            if let Some(items) = data.get(field_name).and_then(|v| v.as_array()) {
                for item in items {
                    if let Some(id) = item.get(BRAMBLE_ID).and_then(|v| v.as_str()) {
                        out.insert(id.to_string(), item.clone());
                    }
                }
            }
        }
        Some(BoundaryFetch::Singular { .. }) => {
            for (index, id) in ids.iter().enumerate() {
                if let Some(item) = data.get(format!("_{index}")) {
                    if !item.is_null() {
                        out.insert(id.clone(), item.clone());
                    }
                }
            }
        }
        None => {}
    }
    out
}

fn merge_at_path_by_id(value: &mut serde_json::Value, path: &[String], by_id: &HashMap<String, serde_json::Value>) {
    if path.is_empty() {
        match value {
            serde_json::Value::Array(items) => {
                for item in items.iter_mut() {
                    merge_one_by_id(item, by_id);
                }
            }
            serde_json::Value::Object(_) => merge_one_by_id(value, by_id),
            _ => {}
        }
        return;
    }
    match value {
        serde_json::Value::Array(items) => {
            for item in items.iter_mut() {
                merge_at_path_by_id(item, path, by_id);
            }
        }
        serde_json::Value::Object(map) => {
            if let Some(next) = map.get_mut(&path[0]) {
                merge_at_path_by_id(next, &path[1..], by_id);
            }
        }
        _ => {}
    }
}

fn merge_one_by_id(target: &mut serde_json::Value, by_id: &HashMap<String, serde_json::Value>) {
    let id = target.get("id").and_then(|v| v.as_str()).map(|s| s.to_string());
    let Some(id) = id else { return };
    // No matching id in the child response: the fields were already
    // seeded `null` by `seed_null_fields`, so partial failure surfaces as
    // null fields rather than a missing object (spec.md §4.5 step 4).
    if let Some(source) = by_id.get(&id) {
        merge_object(target, source);
    }
}

fn merge_object(target: &mut serde_json::Value, source: &serde_json::Value) {
    if let (serde_json::Value::Object(target_map), serde_json::Value::Object(source_map)) = (target, source) {
        for (key, value) in source_map {
            if key == BRAMBLE_ID || key == BRAMBLE_TYPENAME {
                continue;
            }
            target_map.insert(key.clone(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use federation::plan::InsertionPath;
    use federation::ast::SelectionSet;

    fn leaf_step(service_url: &str, field_name: &str, kind_plural: bool) -> Step {
        Step {
            service_url: service_url.to_string(),
            parent_type: "Movie".to_string(),
            insertion_path: InsertionPath(vec!["movie".to_string()]),
            selection_set: SelectionSet::default(),
            boundary_fetch: Some(if kind_plural {
                BoundaryFetch::Plural { field_name: field_name.to_string() }
            } else {
                BoundaryFetch::Singular { field_name: field_name.to_string() }
            }),
            children: Vec::new(),
        }
    }

    #[test]
    fn builds_plural_boundary_query_with_ids_array() {
        let child = leaf_step("http://b", "movies", true);
        let query = build_child_query(&child, &["1".to_string(), "2".to_string()]);
        assert_eq!(query, "query { movies(ids:[\"1\",\"2\"]) {} }");
    }

    #[test]
    fn builds_singular_boundary_query_with_aliased_fields() {
        let child = leaf_step("http://b", "movie", false);
        let query = build_child_query(&child, &["1".to_string(), "2".to_string()]);
        assert_eq!(query, "query {_0: movie(id:\"1\") {} _1: movie(id:\"2\") {}}");
    }

    #[test]
    fn collects_ids_through_an_array_insertion_point() {
        let data = serde_json::json!({ "movies": [{"id": "1"}, {"id": "2"}, {}] });
        let mut out = Vec::new();
        collect_ids_at_path(&data, &["movies".to_string()], &mut out);
        assert_eq!(out, vec!["1".to_string(), "2".to_string()]);
    }

    #[test]
    fn merges_plural_response_back_by_bramble_id() {
        let mut data = serde_json::json!({ "movie": { "id": "1" } });
        let mut by_id = HashMap::new();
        by_id.insert("1".to_string(), serde_json::json!({ "_bramble_id": "1", "release": 1999 }));
        merge_at_path_by_id(&mut data, &["movie".to_string()], &by_id);
        assert_eq!(data["movie"]["release"], 1999);
        assert!(data["movie"].get("_bramble_id").is_none());
    }

    #[test]
    fn seeds_missing_fields_as_null_before_merge() {
        let mut data = serde_json::json!({ "movie": { "id": "1" } });
        seed_null_fields(&mut data, &["movie".to_string()], &["release".to_string()]);
        assert_eq!(data["movie"]["release"], serde_json::Value::Null);
    }

    #[test]
    fn dropping_an_armed_cancel_guard_flips_the_receiver() {
        let (tx, rx) = watch::channel(false);
        let guard = CancelOnDrop::new(tx);
        assert!(!*rx.borrow());
        drop(guard);
        assert!(*rx.borrow());
    }

    #[test]
    fn disarming_a_cancel_guard_suppresses_the_send() {
        let (tx, rx) = watch::channel(false);
        let guard = CancelOnDrop::new(tx);
        guard.disarm();
        assert!(!*rx.borrow());
    }

    #[test]
    fn split_response_carries_forward_upstream_error_locations() {
        let body = serde_json::json!({
            "data": null,
            "errors": [{ "message": "boom", "locations": [{"line": 2, "column": 5}] }]
        });
        let (_, errors) = split_response(body, "query { movie { id } }", "movie", "http://b");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].locations.len(), 1);
        assert_eq!(errors[0].locations[0].line, 2);
        assert_eq!(errors[0].locations[0].column, 5);
    }

    #[test]
    fn split_response_without_locations_leaves_the_vec_empty() {
        let body = serde_json::json!({ "data": null, "errors": [{ "message": "boom" }] });
        let (_, errors) = split_response(body, "query { movie { id } }", "movie", "http://b");
        assert!(errors[0].locations.is_empty());
    }

    #[test]
    fn attach_upstream_context_sets_all_four_extensions() {
        let error = attach_upstream_context(GraphqlError::new("boom"), "query { movie { id } }", "movie", "http://b");
        assert_eq!(error.extensions.get("selectionSet").unwrap(), "query { movie { id } }");
        assert_eq!(error.extensions.get("selectionPath").unwrap(), "movie");
        assert_eq!(error.extensions.get("serviceName").unwrap(), "http://b");
        assert_eq!(error.extensions.get("serviceUrl").unwrap(), "http://b");
    }

    fn schema_with(sdl: &str) -> federation::ast::SchemaDocument {
        federation::ast::parse_schema(sdl).unwrap()
    }

    fn selection_of(query: &str) -> SelectionSet {
        federation::ast::parse_operation(query).unwrap().operations[0].selection_set.clone()
    }

    #[test]
    fn null_at_non_null_field_nulls_the_nearest_nullable_ancestor() {
        // `Movie.title` is non-null; `Query.movie` is nullable, so a null
        // title nulls the whole movie object rather than just `title`.
        let schema = schema_with("type Movie { id: ID! title: String! } type Query { movie: Movie }");
        let selections = selection_of("{ movie { id title } }");
        let mut data = serde_json::json!({ "movie": { "id": "1", "title": null } });
        let root_ty = TypeRef::Named("Query".to_string());
        let discard = propagate_nulls(&mut data, &root_ty, &selections, &schema);
        assert!(!discard);
        assert_eq!(data["movie"], serde_json::Value::Null);
    }

    #[test]
    fn null_with_no_nullable_ancestor_nulls_the_whole_response() {
        // Both `Query.movie` and `Movie.title` are non-null here, so the
        // violation has nowhere to stop and the caller must null `data`.
        let schema = schema_with("type Movie { id: ID! title: String! } type Query { movie: Movie! }");
        let selections = selection_of("{ movie { id title } }");
        let mut data = serde_json::json!({ "movie": { "id": "1", "title": null } });
        let root_ty = TypeRef::NonNull(Box::new(TypeRef::Named("Query".to_string())));
        let discard = propagate_nulls(&mut data, &root_ty, &selections, &schema);
        assert!(discard);
    }

    #[test]
    fn null_at_a_nullable_field_does_not_bubble() {
        let schema = schema_with("type Movie { id: ID! title: String } type Query { movie: Movie }");
        let selections = selection_of("{ movie { id title } }");
        let mut data = serde_json::json!({ "movie": { "id": "1", "title": null } });
        let root_ty = TypeRef::Named("Query".to_string());
        let discard = propagate_nulls(&mut data, &root_ty, &selections, &schema);
        assert!(!discard);
        assert_eq!(data["movie"]["id"], "1");
        assert_eq!(data["movie"]["title"], serde_json::Value::Null);
    }

    #[test]
    fn null_inside_a_list_element_nulls_only_that_element() {
        let schema = schema_with("type Movie { id: ID! title: String! } type Query { movies: [Movie] }");
        let selections = selection_of("{ movies { id title } }");
        let mut data = serde_json::json!({ "movies": [{ "id": "1", "title": "A" }, { "id": "2", "title": null }] });
        let root_ty = TypeRef::Named("Query".to_string());
        propagate_nulls(&mut data, &root_ty, &selections, &schema);
        assert_eq!(data["movies"][0]["title"], "A");
        assert_eq!(data["movies"][1], serde_json::Value::Null);
    }
}
