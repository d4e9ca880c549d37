//! Permission model: per-role field-level access control.
//!
//! Two operations: filtering the published schema down to what a role can
//! see, and stripping disallowed fields out of an incoming operation's
//! selection sets (including inside fragments, each visited once and
//! cached).

use crate::ast::{FragmentDefinition, OperationDocument, OperationType, Selection, SelectionSet};
use crate::model::{AllowedFields, GatewaySchema};
use federation_error::{codes, MultipleFederationErrors, SingleFederationError};
use indexmap::{IndexMap, IndexSet};
use std::collections::HashMap;

/// Filters the merged schema down to the types/fields reachable under
/// `allowed`, starting from `Query`/`Mutation`/`Subscription`. Types left
/// with no remaining fields are dropped; unions are trimmed to allowed
/// members; input types referenced by a remaining argument are kept whole —
/// input objects are all-or-nothing, never field-filtered themselves.
pub fn filter_schema(permissions: &crate::model::OperationPermissions, gateway_schema: &GatewaySchema) -> crate::ast::SchemaDocument {
    let schema = &gateway_schema.schema;
    let mut kept_types: IndexMap<String, crate::ast::TypeDefinition> = IndexMap::new();
    let mut needed_input_types: IndexSet<String> = IndexSet::new();

    for (root_name, allowed) in [
        (Some(schema.query_type.as_str()), &permissions.query),
        (schema.mutation_type.as_deref(), &permissions.mutation),
        (schema.subscription_type.as_deref(), &permissions.subscription),
    ] {
        let Some(root_name) = root_name else { continue };
        let Some(root) = schema.get(root_name) else { continue };
        filter_type(root, allowed, schema, &mut kept_types, &mut needed_input_types);
    }

    // Input types are pulled in whole, transitively.
    let mut frontier: Vec<String> = needed_input_types.iter().cloned().collect();
    while let Some(name) = frontier.pop() {
        if kept_types.contains_key(&name) {
            continue;
        }
        let Some(type_def) = schema.get(&name) else { continue };
        kept_types.insert(name.clone(), type_def.clone());
        for field in type_def.fields.values() {
            let referenced = field.ty.inner_name().to_string();
            if schema.get(&referenced).map(|t| t.kind == crate::ast::TypeKind::InputObject).unwrap_or(false)
                && !kept_types.contains_key(&referenced)
            {
                frontier.push(referenced);
            }
        }
    }

    crate::ast::SchemaDocument {
        types: kept_types,
        directive_defs: schema.directive_defs.clone(),
        query_type: schema.query_type.clone(),
        mutation_type: schema.mutation_type.clone(),
        subscription_type: schema.subscription_type.clone(),
    }
}

fn filter_type(
    type_def: &crate::ast::TypeDefinition,
    allowed: &AllowedFields,
    schema: &crate::ast::SchemaDocument,
    kept_types: &mut IndexMap<String, crate::ast::TypeDefinition>,
    needed_input_types: &mut IndexSet<String>,
) {
    if kept_types.contains_key(&type_def.name) {
        return;
    }

    match type_def.kind {
        crate::ast::TypeKind::Union => {
            let members = if allowed.is_all_allowed() {
                type_def.union_members.clone()
            } else {
                type_def
                    .union_members
                    .iter()
                    .filter(|m| allowed.allows(m))
                    .cloned()
                    .collect()
            };
            let mut trimmed = type_def.clone();
            trimmed.union_members = members;
            kept_types.insert(type_def.name.clone(), trimmed);
            return;
        }
        crate::ast::TypeKind::Scalar | crate::ast::TypeKind::Enum => {
            kept_types.insert(type_def.name.clone(), type_def.clone());
            return;
        }
        _ => {}
    }

    let mut kept_fields = IndexMap::new();
    for (name, field) in &type_def.fields {
        if !allowed.allows(name) {
            continue;
        }
        kept_fields.insert(name.clone(), field.clone());
        for argument in &field.arguments {
            if schema.get(argument.ty.inner_name()).map(|t| t.kind == crate::ast::TypeKind::InputObject).unwrap_or(false) {
                needed_input_types.insert(argument.ty.inner_name().to_string());
            }
        }
        let child_allowed = allowed.child(name);
        if let Some(referenced) = schema.get(field.ty.inner_name()) {
            filter_type(referenced, &child_allowed, schema, kept_types, needed_input_types);
        }
    }

    if kept_fields.is_empty() && type_def.kind != crate::ast::TypeKind::InputObject {
        // Types with no remaining fields are dropped entirely.
        return;
    }

    let mut trimmed = type_def.clone();
    trimmed.fields = kept_fields;
    kept_types.insert(type_def.name.clone(), trimmed);
}

/// Strips disallowed fields from the operation's selected root, including
/// inside named/inline fragments. Fragments are traversed once and cached
/// by `(fragment name, allowed-fields identity)` so shared fragments are
/// not re-walked per use site.
pub fn filter_operation(
    permissions: &crate::model::OperationPermissions,
    document: &mut OperationDocument,
    operation_name: Option<&str>,
) -> Vec<SingleFederationError> {
    let mut errors = MultipleFederationErrors::new();
    let target_index = document
        .operations
        .iter()
        .position(|op| match operation_name {
            Some(name) => op.name.as_deref() == Some(name),
            None => true,
        });
    let Some(index) = target_index else {
        return Vec::new();
    };

    let (root_allowed, root_keyword) = match document.operations[index].operation_type {
        OperationType::Query => (&permissions.query, "query"),
        OperationType::Mutation => (&permissions.mutation, "mutation"),
        OperationType::Subscription => (&permissions.subscription, "subscription"),
    };
    let root_allowed = root_allowed.clone();

    let fragments = document.fragments.clone();
    let mut filtered_fragments: HashMap<String, SelectionSet> = HashMap::new();
    let selection_set = std::mem::take(&mut document.operations[index].selection_set);
    let filtered = filter_selection_set(
        selection_set,
        &root_allowed,
        &fragments,
        root_keyword,
        &mut filtered_fragments,
        &mut errors,
    );
    document.operations[index].selection_set = filtered;

    // Every fragment visited through a spread now holds its filtered body;
    // write it back so the planner expands the same filtered selection set
    // the errors above were computed from, not the original one.
    for (name, filtered_body) in filtered_fragments {
        if let Some(fragment) = document.fragments.get_mut(&name) {
            fragment.selection_set = filtered_body;
        }
    }

    errors.errors
}

fn filter_selection_set(
    set: SelectionSet,
    allowed: &AllowedFields,
    fragments: &IndexMap<String, FragmentDefinition>,
    path: &str,
    visited_fragments: &mut HashMap<String, SelectionSet>,
    errors: &mut MultipleFederationErrors,
) -> SelectionSet {
    let mut kept = Vec::new();
    for selection in set.0 {
        match selection {
            Selection::Field(mut field) => {
                if !allowed.allows(&field.name) {
                    let mut error = SingleFederationError::new(
                        codes::PERMISSION_DENIED_FIELD,
                        format!("user do not have permission to access field {path}.{}", field.name),
                    );
                    if let Some(location) = field.location {
                        error = error.at(location);
                    }
                    errors.push(error);
                    continue;
                }
                let child_path = format!("{path}.{}", field.name);
                let child_allowed = allowed.child(&field.name);
                field.selection_set = filter_selection_set(
                    field.selection_set,
                    &child_allowed,
                    fragments,
                    &child_path,
                    visited_fragments,
                    errors,
                );
                kept.push(Selection::Field(field));
            }
            Selection::InlineFragment(mut inline) => {
                inline.selection_set = filter_selection_set(
                    inline.selection_set,
                    allowed,
                    fragments,
                    path,
                    visited_fragments,
                    errors,
                );
                kept.push(Selection::InlineFragment(inline));
            }
            Selection::FragmentSpread(spread) => {
                // Fragments are filtered once per name; subsequent spreads of
                // the same fragment reuse the first visit's filtered body
                // rather than re-walking it, avoiding quadratic blowup on
                // documents with many spreads of the same fragment. The
                // filtered body is handed back to the caller, which writes
                // it into the document's fragment table so the planner
                // expands the same filtered selection set these diagnostics
                // were computed from.
                if !visited_fragments.contains_key(&spread.name) {
                    if let Some(fragment) = fragments.get(&spread.name) {
                        // Inserted before recursing so a malformed, cyclic
                        // fragment spread can't recurse forever.
                        visited_fragments.insert(spread.name.clone(), SelectionSet(Vec::new()));
                        let filtered_body = filter_selection_set(
                            fragment.selection_set.clone(),
                            allowed,
                            fragments,
                            path,
                            visited_fragments,
                            errors,
                        );
                        visited_fragments.insert(spread.name.clone(), filtered_body);
                    }
                }
                kept.push(Selection::FragmentSpread(spread));
            }
        }
    }
    SelectionSet(kept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::parse_operation;

    fn permissions_allowing_id_and_title() -> crate::model::OperationPermissions {
        let allowed = AllowedFields::from_json(&serde_json::json!({"movie": ["id", "title"]}));
        crate::model::OperationPermissions {
            query: allowed,
            mutation: AllowedFields::none(),
            subscription: AllowedFields::none(),
        }
    }

    #[test]
    fn strips_disallowed_field_and_reports_one_error() {
        let mut document = parse_operation("{ movie(id: \"1\") { id title compTitles } }").unwrap();
        let permissions = permissions_allowing_id_and_title();
        let errors = filter_operation(&permissions, &mut document, None);
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0].message,
            "user do not have permission to access field query.movie.compTitles"
        );
        let Selection::Field(movie) = &document.operations[0].selection_set.0[0] else {
            panic!("expected field");
        };
        let names: Vec<&str> = movie
            .selection_set
            .iter()
            .map(|s| match s {
                Selection::Field(f) => f.name.as_str(),
                _ => "",
            })
            .collect();
        assert_eq!(names, vec!["id", "title"]);
    }

    #[test]
    fn typename_is_always_allowed() {
        assert!(AllowedFields::none().allows("__typename"));
    }

    #[test]
    fn disallowed_field_inside_a_named_fragment_is_stripped_from_the_fragment_body() {
        let mut document = parse_operation(
            "{ movie(id: \"1\") { ...MovieFields } } fragment MovieFields on Movie { id title compTitles }",
        )
        .unwrap();
        let permissions = permissions_allowing_id_and_title();
        let errors = filter_operation(&permissions, &mut document, None);
        assert_eq!(errors.len(), 1);
        assert_eq!(
            errors[0].message,
            "user do not have permission to access field query.movie.compTitles"
        );

        let fragment = document.fragments.get("MovieFields").unwrap();
        let names: Vec<&str> = fragment
            .selection_set
            .iter()
            .map(|s| match s {
                Selection::Field(f) => f.name.as_str(),
                _ => "",
            })
            .collect();
        assert_eq!(names, vec!["id", "title"], "fragment body itself must be filtered, not just the diagnostics");
    }

    #[test]
    fn fragment_spread_twice_is_only_filtered_once() {
        let mut document = parse_operation(
            "{ a: movie(id: \"1\") { ...MovieFields } b: movie(id: \"2\") { ...MovieFields } } fragment MovieFields on Movie { id title compTitles }",
        )
        .unwrap();
        let permissions = permissions_allowing_id_and_title();
        let errors = filter_operation(&permissions, &mut document, None);
        // The fragment body is only walked once regardless of how many
        // spread sites reference it, so only one diagnostic is emitted.
        assert_eq!(errors.len(), 1);
        let fragment = document.fragments.get("MovieFields").unwrap();
        assert_eq!(fragment.selection_set.iter().count(), 2);
    }
}
