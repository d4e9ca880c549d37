//! Query planner.
//!
//! Splits a filtered operation into a tree of `Step`s, each targeting one
//! backing service, joined at boundary types. Planning never makes network
//! calls; it only consults the merged `GatewaySchema`.

use crate::ast::{FieldSelection, FragmentDefinition, OperationDefinition, Selection, SelectionSet};
use crate::model::{BoundaryQueryKind, GatewaySchema};
use federation_error::{codes, FederationError, FederationResult, SingleFederationError};
use indexmap::{IndexMap, IndexSet};

/// Where a child step's results are spliced back into its parent's.
/// `path` is the sequence of response keys from the parent step's root
/// object down to the field whose selection the child resolves.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsertionPath(pub Vec<String>);

impl InsertionPath {
    pub fn push(&self, key: &str) -> InsertionPath {
        let mut path = self.0.clone();
        path.push(key.to_string());
        InsertionPath(path)
    }
}

/// How a non-root step fetches the objects it joins against.
#[derive(Debug, Clone)]
pub enum BoundaryFetch {
    /// One request with `ids: [...]` against the service's plural boundary
    /// query.
    Plural { field_name: String },
    /// N aliased singular subselections (`_0: foo(id:"…") _1: foo(id:"…")`)
    /// in a single request.
    Singular { field_name: String },
}

/// One node of the plan tree.
#[derive(Debug, Clone)]
pub struct Step {
    pub service_url: String,
    pub parent_type: String,
    pub insertion_path: InsertionPath,
    pub selection_set: SelectionSet,
    pub boundary_fetch: Option<BoundaryFetch>,
    pub children: Vec<Step>,
}

/// Synthetic fields prepended to a child step's selection set so the
/// executor can key results back to the parent.
pub const BRAMBLE_ID: &str = "_bramble_id";
pub const BRAMBLE_TYPENAME: &str = "_bramble__typename";

#[derive(Debug)]
pub struct QueryPlan {
    pub root: Step,
    /// The skip/include-pruned selection the client actually asked for,
    /// against `root_type` — distinct from any one Step's own
    /// `selection_set`, since a single client-visible field can be split
    /// across the root Step and one or more children. The executor replays
    /// GraphQL null-propagation (spec.md §4.5, §8) against this tree once
    /// the whole plan has been stitched together.
    pub client_selection: SelectionSet,
    pub root_type: String,
}

struct PlanningContext<'a> {
    schema: &'a GatewaySchema,
    fragments: &'a IndexMap<String, FragmentDefinition>,
    variables: &'a IndexMap<String, serde_json::Value>,
}

/// Builds the plan for `operation` against `schema`. `variables` is the
/// concrete variable map used to evaluate `@skip`/`@include` at plan time.
pub fn plan_operation(
    operation: &OperationDefinition,
    fragments: &IndexMap<String, FragmentDefinition>,
    schema: &GatewaySchema,
    variables: &IndexMap<String, serde_json::Value>,
) -> FederationResult<QueryPlan> {
    let root_type = match operation.operation_type {
        crate::ast::OperationType::Query => schema.schema.query_type.clone(),
        crate::ast::OperationType::Mutation => schema
            .schema
            .mutation_type
            .clone()
            .ok_or_else(|| FederationError::single(codes::PLAN_UNREACHABLE_FIELD, "schema has no mutation root"))?,
        crate::ast::OperationType::Subscription => schema
            .schema
            .subscription_type
            .clone()
            .ok_or_else(|| FederationError::single(codes::PLAN_UNREACHABLE_FIELD, "schema has no subscription root"))?,
    };

    let context = PlanningContext {
        schema,
        fragments,
        variables,
    };

    let pruned = prune_skip_include(&operation.selection_set, &context);
    let first_field = pruned
        .iter()
        .find_map(|s| match s {
            Selection::Field(f) if f.name != "__typename" => Some(f),
            _ => None,
        })
        .ok_or_else(|| FederationError::single(codes::PLAN_UNREACHABLE_FIELD, "operation selects no resolvable field"))?;

    let candidates = schema.services_for(&root_type, &first_field.name);
    let root_service = candidates
        .first()
        .ok_or_else(|| {
            FederationError::single(
                codes::PLAN_UNREACHABLE_FIELD,
                format!("field `{root_type}.{}` is not resolvable by any service", first_field.name),
            )
        })?
        .to_string();

    let mut root_step = Step {
        service_url: root_service.clone(),
        parent_type: root_type.clone(),
        insertion_path: InsertionPath::default(),
        selection_set: SelectionSet::default(),
        boundary_fetch: None,
        children: Vec::new(),
    };

    let mut seen = IndexSet::new();
    fill_step(
        &mut root_step,
        &pruned,
        &root_type,
        &InsertionPath::default(),
        &context,
        &mut seen,
    )?;

    if operation.operation_type == crate::ast::OperationType::Mutation {
        let distinct_services: IndexSet<&str> = root_step
            .selection_set
            .iter()
            .filter_map(|s| match s {
                Selection::Field(f) => schema.services_for(&root_type, &f.name).first().copied(),
                _ => None,
            })
            .collect();
        if distinct_services.len() > 1 {
            return Err(FederationError::single(
                codes::PLAN_MULTI_SERVICE_MUTATION,
                "mutation root selection spans more than one service",
            ));
        }
    }

    let client_selection = expand_fragments_deep(&pruned, &root_type, &context);

    Ok(QueryPlan {
        root: root_step,
        client_selection,
        root_type,
    })
}

/// Walks `selections` (already fragment-expanded and skip/include pruned)
/// and either folds a field into `step` or opens a child step for it.
fn fill_step(
    step: &mut Step,
    selections: &SelectionSet,
    enclosing_type: &str,
    path: &InsertionPath,
    context: &PlanningContext,
    seen: &mut IndexSet<String>,
) -> FederationResult<()> {
    for selection in selections.iter() {
        match selection {
            Selection::Field(field) => {
                if field.name == "__typename" {
                    let key = dedupe_key(enclosing_type, field);
                    if seen.insert(key) {
                        step.selection_set.0.push(Selection::Field(field.clone()));
                    }
                    continue;
                }

                let resolvable_here = context.schema.locations.resolves(enclosing_type, &field.name, &step.service_url);
                if resolvable_here {
                    let key = dedupe_key(enclosing_type, field);
                    if !seen.insert(key) {
                        continue;
                    }
                    let mut folded = field.clone();
                    let child_type = field.ty_inner_name(enclosing_type, context.schema);
                    if let Some(child_type) = child_type {
                        let mut nested_seen = IndexSet::new();
                        let expanded = expand_fragments(&field.selection_set, &child_type, context);
                        folded.selection_set = SelectionSet::default();
                        let child_path = path.push(field.response_key());
                        fold_into_same_step(
                            step,
                            &mut folded,
                            &expanded,
                            &child_type,
                            &child_path,
                            context,
                            &mut nested_seen,
                        )?;
                    }
                    step.selection_set.0.push(Selection::Field(folded));
                    continue;
                }

                let mut local = std::mem::take(&mut step.selection_set);
                let result = open_child_step(step, &mut local.0, field, enclosing_type, path, context);
                step.selection_set = local;
                result?;
            }
            Selection::InlineFragment(inline) => {
                let target_type = inline.type_condition.clone().unwrap_or_else(|| enclosing_type.to_string());
                fill_step(step, &inline.selection_set, &target_type, path, context, seen)?;
            }
            Selection::FragmentSpread(spread) => {
                if let Some(fragment) = context.fragments.get(&spread.name) {
                    fill_step(step, &fragment.selection_set, &fragment.type_condition, path, context, seen)?;
                }
            }
        }
    }
    Ok(())
}

/// Fills a field's nested selection set in place, recursing within the
/// same Step for as long as the enclosing service can keep resolving.
#[allow(clippy::too_many_arguments)]
fn fold_into_same_step(
    step: &mut Step,
    field: &mut FieldSelection,
    selections: &SelectionSet,
    enclosing_type: &str,
    path: &InsertionPath,
    context: &PlanningContext,
    seen: &mut IndexSet<String>,
) -> FederationResult<()> {
    let mut nested = SelectionSet::default();
    for selection in selections.iter() {
        match selection {
            Selection::Field(inner) => {
                if inner.name == "__typename" {
                    nested.0.push(Selection::Field(inner.clone()));
                    continue;
                }
                let resolvable_here = context.schema.locations.resolves(enclosing_type, &inner.name, &step.service_url);
                if resolvable_here {
                    let mut folded = inner.clone();
                    if let Some(child_type) = inner.ty_inner_name(enclosing_type, context.schema) {
                        let expanded = expand_fragments(&inner.selection_set, &child_type, context);
                        let child_path = path.push(inner.response_key());
                        fold_into_same_step(step, &mut folded, &expanded, &child_type, &child_path, context, seen)?;
                    }
                    nested.0.push(Selection::Field(folded));
                } else {
                    open_child_step(step, &mut nested.0, inner, enclosing_type, path, context)?;
                }
            }
            Selection::InlineFragment(inline) => {
                let target_type = inline.type_condition.clone().unwrap_or_else(|| enclosing_type.to_string());
                let mut scratch = Step {
                    service_url: step.service_url.clone(),
                    parent_type: step.parent_type.clone(),
                    insertion_path: step.insertion_path.clone(),
                    selection_set: SelectionSet::default(),
                    boundary_fetch: None,
                    children: Vec::new(),
                };
                fill_step(&mut scratch, &inline.selection_set, &target_type, path, context, seen)?;
                nested.0.extend(scratch.selection_set.0);
                step.children.extend(scratch.children);
            }
            Selection::FragmentSpread(spread) => {
                if let Some(fragment) = context.fragments.get(&spread.name) {
                    let mut scratch = Step {
                        service_url: step.service_url.clone(),
                        parent_type: step.parent_type.clone(),
                        insertion_path: step.insertion_path.clone(),
                        selection_set: SelectionSet::default(),
                        boundary_fetch: None,
                        children: Vec::new(),
                    };
                    fill_step(&mut scratch, &fragment.selection_set, &fragment.type_condition, path, context, seen)?;
                    nested.0.extend(scratch.selection_set.0);
                    step.children.extend(scratch.children);
                }
            }
        }
    }
    field.selection_set = nested;
    Ok(())
}

/// Opens (or reuses) a child Step anchored at the nearest enclosing
/// boundary type, for a field the current Step's service cannot resolve.
fn open_child_step(
    step: &mut Step,
    current_level: &mut Vec<Selection>,
    field: &FieldSelection,
    enclosing_type: &str,
    path: &InsertionPath,
    context: &PlanningContext,
) -> FederationResult<()> {
    let type_def = context.schema.schema.get(enclosing_type);
    let is_boundary = type_def.map(|t| t.is_boundary()).unwrap_or(false);
    if !is_boundary {
        let mut error = SingleFederationError::new(
            codes::PLAN_UNREACHABLE_FIELD,
            format!("field `{enclosing_type}.{}` is not reachable from any service in this plan", field.name),
        );
        if let Some(location) = field.location {
            error = error.at(location);
        }
        return Err(error.into());
    }

    // The parent step needs this boundary type's `id` at the same level so
    // the executor has a join key before fetching the child: a child step is
    // always anchored at the nearest enclosing boundary type's `id`.
    let already_has_id = current_level
        .iter()
        .any(|s| matches!(s, Selection::Field(f) if f.name == "id" && f.alias.is_none()));
    if !already_has_id {
        current_level.push(Selection::Field(FieldSelection {
            alias: None,
            name: "id".to_string(),
            arguments: IndexMap::new(),
            directives: Vec::new(),
            selection_set: SelectionSet::default(),
            location: None,
        }));
    }

    let candidates: Vec<&str> = context
        .schema
        .services_for(enclosing_type, &field.name)
        .into_iter()
        .collect();
    // Tie-break: prefer the enclosing Step's own service when it can serve
    // this field too; otherwise the first by URL.
    let chosen = candidates
        .iter()
        .find(|url| **url == step.service_url)
        .or_else(|| candidates.first())
        .ok_or_else(|| {
            let mut error = SingleFederationError::new(
                codes::PLAN_UNREACHABLE_FIELD,
                format!("field `{enclosing_type}.{}` is not resolvable by any service", field.name),
            );
            if let Some(location) = field.location {
                error = error.at(location);
            }
            FederationError::from(error)
        })?
        .to_string();

    // Build the field once, fully folded against a service-local insertion
    // path, before deciding which child Step it lands in. Grandchild Steps
    // opened while folding (e.g. a third service joined two hops down) are
    // collected separately and re-parented below.
    let mut folded = field.clone();
    let mut grandchildren = Vec::new();
    if let Some(child_type) = field.ty_inner_name(enclosing_type, context.schema) {
        let expanded = expand_fragments(&field.selection_set, &child_type, context);
        let mut nested_seen = IndexSet::new();
        let mut scratch = Step {
            service_url: chosen.clone(),
            parent_type: enclosing_type.to_string(),
            insertion_path: InsertionPath::default(),
            selection_set: SelectionSet::default(),
            boundary_fetch: None,
            children: Vec::new(),
        };
        fold_into_same_step(
            &mut scratch,
            &mut folded,
            &expanded,
            &child_type,
            &InsertionPath::default(),
            context,
            &mut nested_seen,
        )?;
        grandchildren = scratch.children;
    }

    if let Some(existing) = step
        .children
        .iter_mut()
        .find(|c| c.service_url == chosen && c.insertion_path == *path)
    {
        existing.selection_set.0.push(Selection::Field(folded));
        existing.children.extend(grandchildren);
        return Ok(());
    }

    let boundary_queries = context.schema.boundary_queries.for_type(enclosing_type);
    let field_name = boundary_queries
        .and_then(|m| m.get(&chosen))
        .map(|q| q.field_name.clone())
        .unwrap_or_default();
    let kind = boundary_queries.and_then(|m| m.get(&chosen)).map(|q| q.kind);

    let mut child = Step {
        service_url: chosen,
        parent_type: enclosing_type.to_string(),
        insertion_path: path.clone(),
        selection_set: SelectionSet(vec![
            bramble_field(BRAMBLE_ID, "id"),
            bramble_field(BRAMBLE_TYPENAME, "__typename"),
        ]),
        boundary_fetch: Some(match kind {
            Some(BoundaryQueryKind::Plural) => BoundaryFetch::Plural { field_name },
            _ => BoundaryFetch::Singular { field_name },
        }),
        children: grandchildren,
    };
    child.selection_set.0.push(Selection::Field(folded));
    step.children.push(child);
    Ok(())
}

/// A synthetic aliased field, e.g. `_bramble_id: id`, so the executor can
/// read the join key back out of the response under a name that never
/// collides with a field the client asked for.
fn bramble_field(alias: &str, name: &str) -> Selection {
    Selection::Field(FieldSelection {
        alias: Some(alias.to_string()),
        name: name.to_string(),
        arguments: IndexMap::new(),
        directives: Vec::new(),
        selection_set: SelectionSet::default(),
        location: None,
    })
}

/// Flattens named/inline fragments applicable to `type_name` into a plain
/// selection list. Overlapping fields across a
/// fragment and its enclosing selection are left for `fill_step`'s
/// `seen`-set to de-duplicate by canonical name+argument hash.
fn expand_fragments(set: &SelectionSet, type_name: &str, context: &PlanningContext) -> SelectionSet {
    let mut out = Vec::new();
    for selection in set.iter() {
        match selection {
            Selection::FragmentSpread(spread) => {
                if let Some(fragment) = context.fragments.get(&spread.name) {
                    if fragment.type_condition == type_name || fragment.type_condition.is_empty() {
                        out.extend(expand_fragments(&fragment.selection_set, type_name, context).0);
                    } else {
                        out.push(selection.clone());
                    }
                }
            }
            Selection::InlineFragment(inline) => match &inline.type_condition {
                Some(tc) if tc == type_name => {
                    out.extend(expand_fragments(&inline.selection_set, type_name, context).0);
                }
                None => {
                    out.extend(expand_fragments(&inline.selection_set, type_name, context).0);
                }
                Some(_) => out.push(selection.clone()),
            },
            other => out.push(other.clone()),
        }
    }
    SelectionSet(out)
}

/// Fully resolves named/inline fragments at every nesting level against
/// known field types, so the result is the plain field tree the client
/// asked for with no `Selection::FragmentSpread`/`InlineFragment` left —
/// the shape `propagate_nulls` (gateway::executor) walks against the
/// merged schema without needing the fragments map itself. Fragments
/// narrowing to a different concrete type than `type_name` (interface/union
/// type-casing) are left as `InlineFragment`s, since there is no single
/// schema type to recurse into for them here.
fn expand_fragments_deep(set: &SelectionSet, type_name: &str, context: &PlanningContext) -> SelectionSet {
    let flattened = expand_fragments(set, type_name, context);
    let mut out = Vec::new();
    for selection in flattened.iter() {
        match selection {
            Selection::Field(field) => {
                let mut field = field.clone();
                if let Some(child_type) = field.ty_inner_name(type_name, context.schema) {
                    field.selection_set = expand_fragments_deep(&field.selection_set, &child_type, context);
                }
                out.push(Selection::Field(field));
            }
            other => out.push(other.clone()),
        }
    }
    SelectionSet(out)
}

fn dedupe_key(enclosing_type: &str, field: &FieldSelection) -> String {
    let mut args: Vec<(&String, String)> = field.arguments.iter().map(|(k, v)| (k, format!("{v:?}"))).collect();
    args.sort_by(|a, b| a.0.cmp(b.0));
    format!("{enclosing_type}.{}({:?})", field.response_key(), args)
}

/// Evaluates `@skip`/`@include` against `variables` and drops pruned
/// subtrees at plan time, before any service is ever called.
fn prune_skip_include(set: &SelectionSet, context: &PlanningContext) -> SelectionSet {
    let mut out = Vec::new();
    for selection in set.iter() {
        if is_pruned(selection_directives(selection), context) {
            continue;
        }
        let pruned = match selection {
            Selection::Field(field) => {
                let mut field = field.clone();
                field.selection_set = prune_skip_include(&field.selection_set, context);
                Selection::Field(field)
            }
            Selection::InlineFragment(inline) => {
                let mut inline = inline.clone();
                inline.selection_set = prune_skip_include(&inline.selection_set, context);
                Selection::InlineFragment(inline)
            }
            Selection::FragmentSpread(spread) => Selection::FragmentSpread(spread.clone()),
        };
        out.push(pruned);
    }
    SelectionSet(out)
}

fn selection_directives(selection: &Selection) -> &[crate::ast::Directive] {
    match selection {
        Selection::Field(f) => &f.directives,
        Selection::InlineFragment(i) => &i.directives,
        Selection::FragmentSpread(s) => &s.directives,
    }
}

fn is_pruned(directives: &[crate::ast::Directive], context: &PlanningContext) -> bool {
    for directive in directives {
        let Some(if_arg) = directive.argument("if") else { continue };
        let Some(resolved) = if_arg.resolve(context.variables) else { continue };
        let Some(value) = resolved.as_bool() else { continue };
        match directive.name.as_str() {
            "skip" if value => return true,
            "include" if !value => return true,
            _ => {}
        }
    }
    false
}

impl FieldSelection {
    /// The object type this field's value has, if it refers to a declared
    /// type (used to recurse into its nested selection set).
    fn ty_inner_name(&self, enclosing_type: &str, schema: &GatewaySchema) -> Option<String> {
        let field_def = schema.schema.get(enclosing_type)?.fields.get(&self.name)?;
        Some(field_def.ty.inner_name().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{parse_operation, parse_schema};
    use crate::merge::merge_services;
    use crate::model::{Service, ServiceStatus};

    fn service(url: &str, sdl: &str) -> Service {
        Service {
            name: url.to_string(),
            version: "1.0.0".to_string(),
            schema_source: sdl.to_string(),
            service_url: url.to_string(),
            status: ServiceStatus::Ok,
            parsed_schema: Some(parse_schema(sdl).unwrap()),
        }
    }

    fn two_service_schema() -> GatewaySchema {
        let a = service(
            "http://a",
            r#"
            directive @boundary on OBJECT | FIELD_DEFINITION
            type Service { name: String! version: String! schema: String! }
            type Query { service: Service! movie(id: ID!): Movie @boundary }
            type Movie @boundary { id: ID! title: String }
            "#,
        );
        let b = service(
            "http://b",
            r#"
            directive @boundary on OBJECT | FIELD_DEFINITION
            type Service { name: String! version: String! schema: String! }
            type Query { service: Service! movies(ids: [ID!]!): [Movie]! @boundary }
            type Movie @boundary { id: ID! release: Int }
            "#,
        );
        merge_services(&[a, b]).unwrap()
    }

    #[test]
    fn splits_cross_service_selection_into_a_child_step() {
        let schema = two_service_schema();
        let document = parse_operation("{ movie(id: \"1\") { id title release } }").unwrap();
        let op = &document.operations[0];
        let variables = IndexMap::new();
        let plan = plan_operation(op, &document.fragments, &schema, &variables).unwrap();
        assert_eq!(plan.root.service_url, "http://a");
        assert_eq!(plan.root.children.len(), 1);
        let child = &plan.root.children[0];
        assert_eq!(child.service_url, "http://b");
        assert_eq!(child.insertion_path, InsertionPath(vec!["movie".to_string()]));
        let response_keys: Vec<&str> = child
            .selection_set
            .iter()
            .filter_map(|s| match s {
                Selection::Field(f) => Some(f.response_key()),
                _ => None,
            })
            .collect();
        assert!(response_keys.contains(&BRAMBLE_ID));
        assert!(response_keys.contains(&BRAMBLE_TYPENAME));
        assert!(response_keys.contains(&"release"));
    }

    #[test]
    fn unreachable_field_error_carries_the_field_s_source_location() {
        let schema = two_service_schema();
        // No service exposes `bogus` on `Movie`, so planning fails; the
        // error should point at where the client wrote the field.
        let document = parse_operation("{\n  movie(id: \"1\") {\n    id\n    bogus\n  }\n}").unwrap();
        let op = &document.operations[0];
        let variables = IndexMap::new();
        let error = plan_operation(op, &document.fragments, &schema, &variables).unwrap_err();
        let location = error.errors()[0].location.expect("unreachable field errors carry a location");
        assert_eq!(location.line, 4);
        assert_eq!(location.column, 5);
    }

    #[test]
    fn skip_directive_prunes_the_field_at_plan_time() {
        let schema = two_service_schema();
        let document = parse_operation("{ movie(id: \"1\") { id title @skip(if: true) } }").unwrap();
        let op = &document.operations[0];
        let variables = IndexMap::new();
        let plan = plan_operation(op, &document.fragments, &schema, &variables).unwrap();
        let Selection::Field(movie) = &plan.root.selection_set.0[0] else {
            panic!("expected field");
        };
        let names: Vec<&str> = movie
            .selection_set
            .iter()
            .filter_map(|s| match s {
                Selection::Field(f) => Some(f.name.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(names, vec!["id"]);
    }
}
