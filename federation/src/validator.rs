//! C1 — schema validator (spec.md §4.1).
//!
//! Runs once per service schema (all nine rules) and again on the merged
//! schema (rule 9 only, via [`validate_post_merge`]). Every rule is a
//! separable predicate returning the first failure it finds; the caller
//! (C6's registry, or the merger) treats the first error as fatal to the
//! offending schema.

use crate::ast::{SchemaDocument, TypeKind};
use federation_error::{codes, FederationError, FederationResult, SingleFederationError};

/// Runs rules 1-8 of spec.md §4.1 against one service's schema, in order,
/// stopping at the first failure.
pub fn validate_service_schema(schema: &SchemaDocument) -> FederationResult<()> {
    validate_boundary_directive(schema)?;
    validate_boundary_objects(schema)?;
    validate_boundary_queries(schema)?;
    validate_node_interface(schema)?;
    validate_service_type(schema)?;
    validate_namespace_directive(schema)?;
    validate_namespaces(schema)?;
    validate_root_renaming(schema)?;
    validate_naming_conventions(schema)?;
    Ok(())
}

/// Rule 9: the schema produced by stripping federation scaffolding must
/// still be internally consistent (every referenced named type exists).
/// Run against the merged schema after scaffolding removal.
pub fn validate_post_merge(schema: &SchemaDocument) -> FederationResult<()> {
    for type_def in schema.types.values() {
        for field in type_def.fields.values() {
            let referenced = field.ty.inner_name();
            if !schema.types.contains_key(referenced) && !is_builtin_scalar(referenced) {
                return Err(FederationError::single(
                    codes::POST_MERGE_INVALID,
                    format!(
                        "merged schema is invalid: type `{}` field `{}` references unknown type `{}`",
                        type_def.name, field.name, referenced
                    ),
                ));
            }
            for argument in &field.arguments {
                let referenced = argument.ty.inner_name();
                if !schema.types.contains_key(referenced) && !is_builtin_scalar(referenced) {
                    return Err(FederationError::single(
                        codes::POST_MERGE_INVALID,
                        format!(
                            "merged schema is invalid: argument `{}` of `{}.{}` references unknown type `{}`",
                            argument.name, type_def.name, field.name, referenced
                        ),
                    ));
                }
            }
        }
    }
    Ok(())
}

fn is_builtin_scalar(name: &str) -> bool {
    matches!(name, "ID" | "String" | "Int" | "Float" | "Boolean")
}

// Rule 1: `@boundary` directive definition shape.
fn validate_boundary_directive(schema: &SchemaDocument) -> FederationResult<()> {
    let Some(def) = schema.directive_def("boundary") else {
        return Ok(());
    };
    if !def.arguments.is_empty() {
        return Err(FederationError::single(
            codes::BOUNDARY_DIRECTIVE_ARGS,
            "@boundary directive must not take arguments",
        ));
    }
    let valid_single_location = def.locations == ["OBJECT"];
    let valid_dual_location = {
        let mut locations = def.locations.clone();
        locations.sort();
        locations == ["FIELD_DEFINITION", "OBJECT"]
    };
    if !valid_single_location && !valid_dual_location {
        return Err(FederationError::single(
            codes::BOUNDARY_DIRECTIVE_LOCATION,
            "@boundary directive must be declared `on OBJECT | FIELD_DEFINITION` (or `on OBJECT` in legacy single-location mode)",
        ));
    }
    Ok(())
}

// Rule 2: every `@boundary` object has exactly one required `id: ID!` field.
fn validate_boundary_objects(schema: &SchemaDocument) -> FederationResult<()> {
    for type_def in schema.types.values() {
        if type_def.kind != TypeKind::Object || !type_def.is_boundary() {
            continue;
        }
        match type_def.fields.get("id") {
            Some(field) if field.ty == crate::ast::TypeRef::NonNull(Box::new(crate::ast::TypeRef::Named("ID".to_string()))) => {}
            _ => {
                return Err(FederationError::single(
                    codes::BOUNDARY_OBJECT_ID_FIELD,
                    format!(
                        "boundary type `{}` must declare a required `id: ID!` field",
                        type_def.name
                    ),
                ));
            }
        }
    }
    Ok(())
}

// Rule 3: boundary query signatures, one per boundary type per service.
fn validate_boundary_queries(schema: &SchemaDocument) -> FederationResult<()> {
    let Some(query_type) = schema.get(&schema.query_type) else {
        return Ok(());
    };
    let boundary_type_names: Vec<&str> = schema
        .types
        .values()
        .filter(|t| t.kind == TypeKind::Object && t.is_boundary())
        .map(|t| t.name.as_str())
        .collect();

    for boundary_type in &boundary_type_names {
        let mut matches = Vec::new();
        for field in query_type.fields.values() {
            if field.directive("boundary").is_none() {
                continue;
            }
            if field.ty.inner_name() != *boundary_type {
                continue;
            }
            matches.push(field);
        }
        if matches.is_empty() {
            return Err(FederationError::single(
                codes::BOUNDARY_QUERY_MISSING,
                format!(
                    "service exposes boundary type `{boundary_type}` but declares no boundary query for it"
                ),
            ));
        }
        if matches.len() > 1 {
            return Err(FederationError::single(
                codes::BOUNDARY_QUERY_DUPLICATE,
                format!(
                    "service declares more than one boundary query for type `{boundary_type}`"
                ),
            ));
        }
        validate_boundary_query_signature(matches[0], boundary_type)?;
    }
    Ok(())
}

fn validate_boundary_query_signature(
    field: &crate::ast::FieldDefinition,
    boundary_type: &str,
) -> FederationResult<()> {
    use crate::ast::TypeRef;

    if field.arguments.len() != 1 {
        return Err(FederationError::single(
            codes::BOUNDARY_QUERY_ARG_SHAPE,
            "boundary query argument must be of type `ID!` or `[ID!]!`",
        ));
    }
    let argument = &field.arguments[0];
    let id_nonnull = TypeRef::NonNull(Box::new(TypeRef::Named("ID".to_string())));
    let ids_nonnull_list = TypeRef::NonNull(Box::new(TypeRef::List(Box::new(id_nonnull.clone()))));

    if argument.name == "id" && argument.ty == id_nonnull {
        // singular: `foo(id: ID!): Foo` — nullable return.
        if field.ty.is_non_null() {
            return Err(FederationError::single(
                codes::BOUNDARY_QUERY_RETURN_SHAPE,
                "boundary query must return a nullable type, or a non-null list of a nullable type",
            ));
        }
        return Ok(());
    }
    if argument.name == "ids" && argument.ty == ids_nonnull_list {
        // plural: `foo(ids: [ID!]!): [Foo]!` — non-null list of nullable elements.
        let expected_return = TypeRef::NonNull(Box::new(TypeRef::List(Box::new(TypeRef::Named(
            boundary_type.to_string(),
        )))));
        if field.ty != expected_return {
            return Err(FederationError::single(
                codes::BOUNDARY_QUERY_RETURN_SHAPE,
                "boundary query must return a nullable type, or a non-null list of a nullable type",
            ));
        }
        return Ok(());
    }
    tracing::debug!(boundary_type, argument = %argument.name, "boundary query signature rejected");
    Err(FederationError::single(
        codes::BOUNDARY_QUERY_ARG_SHAPE,
        "boundary query argument must be of type `ID!` or `[ID!]!`",
    ))
}

// Rule 4: legacy `Node` interface, if present.
fn validate_node_interface(schema: &SchemaDocument) -> FederationResult<()> {
    let Some(node) = schema.get("Node") else {
        return Ok(());
    };
    if node.kind != TypeKind::Interface {
        return Err(FederationError::single(
            codes::NODE_INTERFACE_SHAPE,
            "`Node` must be declared as `interface Node { id: ID! }` with no other fields",
        ));
    }
    let id_nonnull = crate::ast::TypeRef::NonNull(Box::new(crate::ast::TypeRef::Named("ID".to_string())));
    if node.fields.len() != 1 || node.fields.get("id").map(|f| &f.ty) != Some(&id_nonnull) {
        return Err(FederationError::single(
            codes::NODE_INTERFACE_SHAPE,
            "`Node` must be declared as `interface Node { id: ID! }` with no other fields",
        ));
    }
    Ok(())
}

// Rule 5: `Service` object + `service` query.
fn validate_service_type(schema: &SchemaDocument) -> FederationResult<()> {
    let service = schema.get("Service").ok_or_else(|| {
        FederationError::single(
            codes::SERVICE_TYPE_MISSING,
            "service schema must declare `type Service { name: String! version: String! schema: String! }`",
        )
    })?;
    let expected: [(&str, &str); 3] = [
        ("name", "String!"),
        ("version", "String!"),
        ("schema", "String!"),
    ];
    for (field_name, ty) in expected {
        match service.fields.get(field_name) {
            Some(field) if field.ty.to_string() == ty => {}
            _ => {
                return Err(FederationError::single(
                    codes::SERVICE_TYPE_MISSING,
                    "service schema must declare `type Service { name: String! version: String! schema: String! }`",
                ));
            }
        }
    }

    let query_type = schema.get(&schema.query_type).ok_or_else(|| {
        FederationError::single(
            codes::SERVICE_QUERY_MISSING,
            "service schema must declare `Query.service: Service!` taking no arguments",
        )
    })?;
    match query_type.fields.get("service") {
        Some(field)
            if field.ty.to_string() == "Service!" && field.arguments.is_empty() => {}
        _ => {
            return Err(FederationError::single(
                codes::SERVICE_QUERY_MISSING,
                "service schema must declare `Query.service: Service!` taking no arguments",
            ));
        }
    }
    Ok(())
}

// Rule 6: `@namespace` directive shape.
fn validate_namespace_directive(schema: &SchemaDocument) -> FederationResult<()> {
    let Some(def) = schema.directive_def("namespace") else {
        return Ok(());
    };
    if !def.arguments.is_empty() {
        return Err(FederationError::single(
            codes::NAMESPACE_DIRECTIVE_ARGS,
            "@namespace directive must not take arguments",
        ));
    }
    if def.locations != ["OBJECT"] {
        return Err(FederationError::single(
            codes::NAMESPACE_DIRECTIVE_ARGS,
            "@namespace directive must be declared `on OBJECT`",
        ));
    }
    Ok(())
}

// Rule 6 (continued): namespace suffix/ascendence/nullability invariants.
fn validate_namespaces(schema: &SchemaDocument) -> FederationResult<()> {
    let root_suffixes = [
        schema.query_type.clone(),
        schema.mutation_type.clone().unwrap_or_default(),
        schema.subscription_type.clone().unwrap_or_default(),
    ];

    for type_def in schema.types.values() {
        if !type_def.is_namespace() {
            continue;
        }
        if !root_suffixes.iter().any(|root| !root.is_empty() && type_def.name.ends_with(root.as_str())) {
            return Err(FederationError::single(
                codes::NAMESPACE_NAME_SUFFIX,
                format!(
                    "namespace type `{}` must end in the suffix of a root type (`Query`, `Mutation` or `Subscription`)",
                    type_def.name
                ),
            ));
        }
        for field in type_def.fields.values() {
            if !schema.get(field.ty.inner_name()).map(|t| t.is_namespace()).unwrap_or(false) {
                continue;
            }
            if !field.ty.is_non_null() {
                return Err(FederationError::single(
                    codes::NAMESPACE_FIELD_NULLABLE,
                    format!(
                        "field `{}.{}` returns a namespace type and must be non-null",
                        type_def.name, field.name
                    ),
                ));
            }
        }
    }

    // Namespace types may only appear as fields of other namespace types or
    // of a root.
    let roots: Vec<&str> = vec![&schema.query_type]
        .into_iter()
        .chain(schema.mutation_type.as_deref())
        .chain(schema.subscription_type.as_deref())
        .map(|s| s.as_str())
        .collect();
    for type_def in schema.types.values() {
        for field in type_def.fields.values() {
            let target_is_namespace = schema.get(field.ty.inner_name()).map(|t| t.is_namespace()).unwrap_or(false);
            if !target_is_namespace {
                continue;
            }
            let owner_ok = type_def.is_namespace() || roots.contains(&type_def.name.as_str());
            if !owner_ok {
                return Err(FederationError::single(
                    codes::NAMESPACE_ASCENDENCE,
                    format!(
                        "namespace type `{}` may only appear as a field of another namespace type or of a root, but is used by `{}`",
                        field.ty.inner_name(),
                        type_def.name
                    ),
                ));
            }
        }
    }
    Ok(())
}

// Rule 7: root renaming is forbidden.
fn validate_root_renaming(schema: &SchemaDocument) -> FederationResult<()> {
    if schema.query_type != "Query" {
        return Err(FederationError::single(
            codes::ROOT_RENAMED,
            "the query root type must literally be named `Query`",
        ));
    }
    if let Some(mutation) = &schema.mutation_type {
        if mutation != "Mutation" {
            return Err(FederationError::single(
                codes::ROOT_RENAMED,
                "the mutation root type must literally be named `Mutation`",
            ));
        }
    }
    if let Some(subscription) = &schema.subscription_type {
        if subscription != "Subscription" {
            return Err(FederationError::single(
                codes::ROOT_RENAMED,
                "the subscription root type must literally be named `Subscription`",
            ));
        }
    }
    Ok(())
}

// Rule 8: naming conventions.
fn validate_naming_conventions(schema: &SchemaDocument) -> FederationResult<()> {
    for type_def in schema.types.values() {
        if !is_pascal_case(&type_def.name) {
            return Err(FederationError::single(
                codes::NAMING_CONVENTION,
                format!("type `{}` must be named in PascalCase", type_def.name),
            ));
        }
        if type_def.kind == TypeKind::Enum {
            for value in &type_def.enum_values {
                if !is_all_caps(value) {
                    return Err(FederationError::single(
                        codes::NAMING_CONVENTION,
                        format!(
                            "enum value `{}.{}` must be ALL_CAPS",
                            type_def.name, value
                        ),
                    ));
                }
            }
        }
        for field in type_def.fields.values() {
            if !is_camel_case(&field.name) {
                return Err(FederationError::single(
                    codes::NAMING_CONVENTION,
                    format!(
                        "field `{}.{}` must be named in camelCase",
                        type_def.name, field.name
                    ),
                ));
            }
            for argument in &field.arguments {
                if !is_camel_case(&argument.name) {
                    return Err(FederationError::single(
                        codes::NAMING_CONVENTION,
                        format!(
                            "argument `{}` of `{}.{}` must be named in camelCase",
                            argument.name, type_def.name, field.name
                        ),
                    ));
                }
            }
        }
    }
    Ok(())
}

fn is_pascal_case(name: &str) -> bool {
    name.chars().next().map(|c| c.is_ascii_uppercase()).unwrap_or(false)
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_camel_case(name: &str) -> bool {
    name.chars().next().map(|c| c.is_ascii_lowercase() || c == '_').unwrap_or(false)
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_all_caps(name: &str) -> bool {
    name.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::parse_schema;

    fn valid_service_schema(extra_type: &str) -> String {
        format!(
            r#"
            directive @boundary on OBJECT | FIELD_DEFINITION
            type Service {{ name: String! version: String! schema: String! }}
            type Query {{
                service: Service!
                movie(id: ID!): Movie @boundary
            }}
            type Movie @boundary {{
                id: ID!
                title: String
            }}
            {extra_type}
            "#
        )
    }

    #[test]
    fn accepts_a_well_formed_service_schema() {
        let schema = parse_schema(&valid_service_schema("")).unwrap();
        validate_service_schema(&schema).unwrap();
    }

    #[test]
    fn rejects_boundary_object_missing_id() {
        let schema = parse_schema(
            r#"
            directive @boundary on OBJECT | FIELD_DEFINITION
            type Service { name: String! version: String! schema: String! }
            type Query { service: Service! }
            type Movie @boundary { title: String }
            "#,
        )
        .unwrap();
        let err = validate_service_schema(&schema).unwrap_err();
        assert_eq!(err.errors()[0].code, codes::BOUNDARY_OBJECT_ID_FIELD);
    }

    #[test]
    fn rejects_duplicate_boundary_query() {
        let schema = parse_schema(
            r#"
            directive @boundary on OBJECT | FIELD_DEFINITION
            type Service { name: String! version: String! schema: String! }
            type Query {
                service: Service!
                movieA(id: ID!): Movie @boundary
                movieB(id: ID!): Movie @boundary
            }
            type Movie @boundary { id: ID! title: String }
            "#,
        )
        .unwrap();
        let err = validate_service_schema(&schema).unwrap_err();
        assert_eq!(err.errors()[0].code, codes::BOUNDARY_QUERY_DUPLICATE);
    }

    #[test]
    fn rejects_renamed_root() {
        let schema = parse_schema(
            r#"
            schema { query: RootQuery }
            type Service { name: String! version: String! schema: String! }
            type RootQuery { service: Service! }
            "#,
        )
        .unwrap();
        let err = validate_service_schema(&schema).unwrap_err();
        assert_eq!(err.errors()[0].code, codes::ROOT_RENAMED);
    }

    #[test]
    fn rejects_non_pascal_case_type_names() {
        let schema = parse_schema(
            r#"
            type Service { name: String! version: String! schema: String! }
            type Query { service: Service! lowerCasedType: movie }
            type movie { id: ID! }
            "#,
        )
        .unwrap();
        let err = validate_service_schema(&schema).unwrap_err();
        assert_eq!(err.errors()[0].code, codes::NAMING_CONVENTION);
    }
}
