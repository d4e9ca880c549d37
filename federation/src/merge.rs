//! Schema merger.
//!
//! Produces one gateway schema from N validated service schemas, and the
//! `Locations`/`BoundaryQueries` lookup tables the planner depends on.
//! Iteration is always over services sorted by url and types/fields in
//! document order, so the merged schema is deterministic given the same
//! input set regardless of the order services happen to register in.

use crate::ast::{DirectiveDefinition, FieldDefinition, SchemaDocument, TypeDefinition, TypeKind};
use crate::model::{BoundaryQueries, BoundaryQuery, BoundaryQueryKind, GatewaySchema, Locations, Service};
use federation_error::{codes, FederationError, FederationResult};
use indexmap::IndexMap;

const INTERNAL_QUERY_FIELDS: &[&str] = &["service", "node"];

/// Merges the schemas of every `Ok` service. Services in `Error` status are
/// skipped outright — a service that starts failing has its types removed
/// from the merged schema on the next successful global merge.
pub fn merge_services(services: &[Service]) -> FederationResult<GatewaySchema> {
    let mut ok_services: Vec<&Service> = services
        .iter()
        .filter(|s| matches!(s.status, crate::model::ServiceStatus::Ok) && s.parsed_schema.is_some())
        .collect();
    ok_services.sort_by(|a, b| a.service_url.cmp(&b.service_url));

    let mut merged_types: IndexMap<String, TypeDefinition> = IndexMap::new();
    let mut directive_defs: IndexMap<String, DirectiveDefinition> = IndexMap::new();
    let mut locations = Locations::new();
    let mut boundary_queries = BoundaryQueries::new();

    for service in &ok_services {
        let schema = service.parsed_schema.as_ref().expect("filtered above");
        for (name, def) in &schema.directive_defs {
            directive_defs.entry(name.clone()).or_insert_with(|| def.clone());
        }

        for type_def in schema.types.values() {
            merge_type(
                type_def,
                &service.service_url,
                schema,
                &mut merged_types,
                &mut locations,
            )?;
        }

        // Record this service's boundary queries.
        if let Some(query_type) = schema.get(&schema.query_type) {
            for field in query_type.fields.values() {
                if field.directive("boundary").is_none() {
                    continue;
                }
                let boundary_type = field.ty.inner_name().to_string();
                let is_plural = field.arguments.first().map(|a| a.name == "ids").unwrap_or(false);
                let (kind, arg_name) = if is_plural {
                    (BoundaryQueryKind::Plural, "ids".to_string())
                } else {
                    (BoundaryQueryKind::Singular, "id".to_string())
                };
                boundary_queries.insert(
                    &boundary_type,
                    &service.service_url,
                    BoundaryQuery {
                        kind,
                        field_name: field.name.clone(),
                        arg_name,
                    },
                );
            }
        }
    }

    // Every boundary type must have at least one boundary query.
    for type_def in merged_types.values() {
        if type_def.kind == TypeKind::Object
            && type_def.is_boundary()
            && boundary_queries.for_type(&type_def.name).is_none()
        {
            return Err(FederationError::single(
                codes::BOUNDARY_QUERY_MISSING,
                format!(
                    "boundary type `{}` has no service exposing a boundary query for it",
                    type_def.name
                ),
            ));
        }
    }

    strip_scaffolding(&mut merged_types);

    let schema = SchemaDocument {
        types: merged_types,
        directive_defs,
        query_type: "Query".to_string(),
        mutation_type: Some("Mutation".to_string()),
        subscription_type: Some("Subscription".to_string()),
    };

    crate::validator::validate_post_merge(&schema)?;

    Ok(GatewaySchema {
        schema,
        locations,
        boundary_queries,
    })
}

fn merge_type(
    incoming: &TypeDefinition,
    service_url: &str,
    service_schema: &SchemaDocument,
    merged: &mut IndexMap<String, TypeDefinition>,
    locations: &mut Locations,
) -> FederationResult<()> {
    let is_root = incoming.name == service_schema.query_type
        || Some(&incoming.name) == service_schema.mutation_type.as_ref()
        || Some(&incoming.name) == service_schema.subscription_type.as_ref();

    match merged.get_mut(&incoming.name) {
        None => {
            for field in incoming.fields.values() {
                locations.insert(&incoming.name, &field.name, service_url);
            }
            merged.insert(incoming.name.clone(), incoming.clone());
            Ok(())
        }
        Some(existing) => {
            if existing.kind != incoming.kind {
                return Err(FederationError::single(
                    codes::MERGE_KIND_MISMATCH,
                    format!(
                        "type `{}` is a {} in one service and a {} in another",
                        incoming.name, existing.kind, incoming.kind
                    ),
                ));
            }
            if existing.kind != TypeKind::Object || is_root || existing.is_boundary() || incoming.is_boundary() {
                // Root types and boundary types merge additively. A type only
                // needs one service to declare `@boundary` on it; later
                // services contributing fields to it don't have to redeclare
                // the directive on their own partial type.
                merge_fields_additive(existing, incoming, service_url, &incoming.name, locations)?;
            } else {
                // Non-boundary object types must be structurally identical.
                if !fields_structurally_equal(&existing.fields, &incoming.fields) {
                    return Err(FederationError::single(
                        codes::MERGE_STRUCTURAL_MISMATCH,
                        format!(
                            "non-boundary type `{}` is declared differently across services",
                            incoming.name
                        ),
                    ));
                }
                for field in incoming.fields.values() {
                    locations.insert(&incoming.name, &field.name, service_url);
                }
            }
            Ok(())
        }
    }
}

fn merge_fields_additive(
    existing: &mut TypeDefinition,
    incoming: &TypeDefinition,
    service_url: &str,
    type_name: &str,
    locations: &mut Locations,
) -> FederationResult<()> {
    for field in incoming.fields.values() {
        locations.insert(type_name, &field.name, service_url);
        // Every service declares its own `service` query and its own
        // boundary queries under the same field name only by coincidence;
        // neither goes through the ordinary conflict check, since they are
        // stripped from the public schema anyway.
        let is_scaffolding =
            type_name == "Query" && (field.name == "service" || field.name == "node" || field.directive("boundary").is_some());
        match existing.fields.get(&field.name) {
            None => {
                existing.fields.insert(field.name.clone(), field.clone());
            }
            Some(_) if is_scaffolding => continue,
            Some(current) => {
                if field.name == "id" {
                    continue;
                }
                let already_elsewhere = locations
                    .services_for(type_name, &field.name)
                    .iter()
                    .any(|url| *url != service_url);
                if already_elsewhere && !existing.is_boundary() {
                    return Err(FederationError::single(
                        codes::MERGE_FIELD_CONFLICT,
                        format!(
                            "field `{type_name}.{}` is declared by more than one service",
                            field.name
                        ),
                    ));
                }
                if already_elsewhere && field.ty != current.ty {
                    // Two services resolving the same non-id scalar field of
                    // a boundary type with incompatible types is rejected.
                    return Err(FederationError::single(
                        codes::MERGE_AMBIGUOUS_BOUNDARY_FIELD,
                        format!(
                            "field `{type_name}.{}` is resolved by more than one service with incompatible types",
                            field.name
                        ),
                    ));
                }
                if already_elsewhere {
                    return Err(FederationError::single(
                        codes::MERGE_AMBIGUOUS_BOUNDARY_FIELD,
                        format!(
                            "field `{type_name}.{}` is resolved by more than one service",
                            field.name
                        ),
                    ));
                }
            }
        }
    }
    Ok(())
}

fn fields_structurally_equal(
    a: &IndexMap<String, FieldDefinition>,
    b: &IndexMap<String, FieldDefinition>,
) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().all(|(name, field)| {
        b.get(name)
            .map(|other| field.ty == other.ty && arg_types_equal(field, other))
            .unwrap_or(false)
    })
}

fn arg_types_equal(a: &FieldDefinition, b: &FieldDefinition) -> bool {
    if a.arguments.len() != b.arguments.len() {
        return false;
    }
    a.arguments.iter().zip(b.arguments.iter()).all(|(x, y)| x.name == y.name && x.ty == y.ty)
}

/// Removes federation scaffolding (`service`, boundary queries, `node`)
/// from root `Query` — retained in `Locations` but never exposed on the
/// public merged schema.
fn strip_scaffolding(types: &mut IndexMap<String, TypeDefinition>) {
    if let Some(query) = types.get_mut("Query") {
        query.fields.retain(|name, field| {
            !INTERNAL_QUERY_FIELDS.contains(&name.as_str()) && field.directive("boundary").is_none()
        });
    }
    types.shift_remove("Service");
}
