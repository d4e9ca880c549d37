//! A small, self-contained GraphQL schema/operation model.
//!
//! The lexing and parsing itself is delegated to `apollo-parser` — this
//! module walks its concrete syntax tree once and produces
//! the plain, owned types the rest of this crate (validator, merger,
//! planner) works over. Keeping our own model rather than threading
//! `apollo-parser`'s CST through every component mirrors how
//! `apollo-federation` builds its own `FederationSchema` on top of
//! `apollo-compiler`'s `Schema` instead of re-deriving everything from the
//! parser tree at every call site.

use apollo_parser::ast::AstNode;
use apollo_parser::{ast, Parser};
use federation_error::{FederationError, SingleFederationError};
use indexmap::IndexMap;
use std::fmt;

/// A GraphQL type reference: `Foo`, `Foo!`, `[Foo]`, `[Foo!]!`, ...
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeRef {
    Named(String),
    List(Box<TypeRef>),
    NonNull(Box<TypeRef>),
}

impl TypeRef {
    pub fn is_non_null(&self) -> bool {
        matches!(self, TypeRef::NonNull(_))
    }

    pub fn is_list(&self) -> bool {
        match self {
            TypeRef::NonNull(inner) => inner.is_list(),
            TypeRef::List(_) => true,
            TypeRef::Named(_) => false,
        }
    }

    /// The type with one non-null wrapper removed, if any.
    pub fn nullable(&self) -> TypeRef {
        match self {
            TypeRef::NonNull(inner) => (**inner).clone(),
            other => other.clone(),
        }
    }

    /// The innermost named type, stripping all `!`/`[]` wrappers.
    pub fn inner_name(&self) -> &str {
        match self {
            TypeRef::Named(name) => name,
            TypeRef::List(inner) | TypeRef::NonNull(inner) => inner.inner_name(),
        }
    }
}

impl fmt::Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeRef::Named(name) => write!(f, "{name}"),
            TypeRef::List(inner) => write!(f, "[{inner}]"),
            TypeRef::NonNull(inner) => write!(f, "{inner}!"),
        }
    }
}

/// A (de-duplicated) GraphQL value literal. Input objects/lists are kept
/// around for argument forwarding even though the planner only inspects
/// scalars, enums and variables directly (boolean literals for
/// `@skip`/`@include`, `ID`/`[ID!]` for boundary query arguments).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Enum(String),
    Variable(String),
    List(Vec<Value>),
    Object(IndexMap<String, Value>),
}

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Resolves variable references against a variables map; everything
    /// else is returned unchanged.
    pub fn resolve<'a>(&'a self, variables: &'a IndexMap<String, serde_json::Value>) -> Option<ResolvedValue<'a>> {
        match self {
            Value::Variable(name) => variables.get(name).map(ResolvedValue::Json),
            other => Some(ResolvedValue::Literal(other)),
        }
    }
}

/// A value after variable substitution: either a literal from the document
/// or a JSON value taken from the operation's variables map.
pub enum ResolvedValue<'a> {
    Literal(&'a Value),
    Json(&'a serde_json::Value),
}

impl<'a> ResolvedValue<'a> {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ResolvedValue::Literal(v) => v.as_bool(),
            ResolvedValue::Json(v) => v.as_bool(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Directive {
    pub name: String,
    pub arguments: IndexMap<String, Value>,
}

impl Directive {
    pub fn argument(&self, name: &str) -> Option<&Value> {
        self.arguments.get(name)
    }
}

#[derive(Debug, Clone)]
pub struct InputValueDefinition {
    pub name: String,
    pub ty: TypeRef,
    pub default_value: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct FieldDefinition {
    pub name: String,
    pub arguments: Vec<InputValueDefinition>,
    pub ty: TypeRef,
    pub directives: Vec<Directive>,
}

impl FieldDefinition {
    pub fn directive(&self, name: &str) -> Option<&Directive> {
        self.directives.iter().find(|d| d.name == name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Object,
    Interface,
    Union,
    Enum,
    Scalar,
    InputObject,
}

impl fmt::Display for TypeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TypeKind::Object => "object",
            TypeKind::Interface => "interface",
            TypeKind::Union => "union",
            TypeKind::Enum => "enum",
            TypeKind::Scalar => "scalar",
            TypeKind::InputObject => "input object",
        };
        write!(f, "{s}")
    }
}

#[derive(Debug, Clone)]
pub struct TypeDefinition {
    pub name: String,
    pub kind: TypeKind,
    /// Object/interface fields, in document order.
    pub fields: IndexMap<String, FieldDefinition>,
    pub interfaces: Vec<String>,
    pub union_members: Vec<String>,
    pub enum_values: Vec<String>,
    pub directives: Vec<Directive>,
}

impl TypeDefinition {
    pub fn directive(&self, name: &str) -> Option<&Directive> {
        self.directives.iter().find(|d| d.name == name)
    }

    pub fn is_boundary(&self) -> bool {
        self.directive("boundary").is_some()
    }

    pub fn is_namespace(&self) -> bool {
        self.directive("namespace").is_some()
    }
}

/// A custom directive's declared shape (`directive @foo(...) on ...`).
#[derive(Debug, Clone)]
pub struct DirectiveDefinition {
    pub name: String,
    pub locations: Vec<String>,
    pub arguments: Vec<InputValueDefinition>,
}

/// A fully parsed schema document: named types plus the root operation
/// type names (defaulting to `Query`/`Mutation`/`Subscription`).
#[derive(Debug, Clone)]
pub struct SchemaDocument {
    pub types: IndexMap<String, TypeDefinition>,
    pub directive_defs: IndexMap<String, DirectiveDefinition>,
    pub query_type: String,
    pub mutation_type: Option<String>,
    pub subscription_type: Option<String>,
}

impl SchemaDocument {
    pub fn get(&self, name: &str) -> Option<&TypeDefinition> {
        self.types.get(name)
    }

    pub fn directive_def(&self, name: &str) -> Option<&DirectiveDefinition> {
        self.directive_defs.get(name)
    }
}

pub fn parse_schema(source: &str) -> Result<SchemaDocument, FederationError> {
    let tree = Parser::new(source).parse();
    if tree.errors().len() > 0 {
        let message = tree
            .errors()
            .map(|e| e.message().to_string())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(FederationError::single(
            "SCHEMA_PARSE_ERROR",
            format!("could not parse schema: {message}"),
        ));
    }
    let document = tree.document();

    let mut types = IndexMap::new();
    let mut directive_defs = IndexMap::new();
    let mut query_type = "Query".to_string();
    let mut mutation_type: Option<String> = Some("Mutation".to_string());
    let mut subscription_type: Option<String> = Some("Subscription".to_string());
    let mut saw_schema_definition = false;

    for definition in document.definitions() {
        match definition {
            ast::Definition::SchemaDefinition(schema_def) => {
                saw_schema_definition = true;
                mutation_type = None;
                subscription_type = None;
                for op_type in schema_def.root_operation_type_definitions() {
                    let Some(named_type) = op_type.named_type() else {
                        continue;
                    };
                    let Some(name) = named_type.name() else {
                        continue;
                    };
                    let name = name.text().to_string();
                    match op_type.operation_type() {
                        Some(t) if t.query_token().is_some() => query_type = name,
                        Some(t) if t.mutation_token().is_some() => mutation_type = Some(name),
                        Some(t) if t.subscription_token().is_some() => {
                            subscription_type = Some(name)
                        }
                        _ => {}
                    }
                }
            }
            ast::Definition::ObjectTypeDefinition(object) => {
                let type_def = convert_object(&object);
                types.insert(type_def.name.clone(), type_def);
            }
            ast::Definition::ObjectTypeExtension(extension) => {
                let name = extension
                    .name()
                    .map(|n| n.text().to_string())
                    .unwrap_or_default();
                let additional_fields = extension
                    .fields_definition()
                    .map(|f| convert_fields(&f))
                    .unwrap_or_default();
                let entry = types.entry(name.clone()).or_insert_with(|| TypeDefinition {
                    name: name.clone(),
                    kind: TypeKind::Object,
                    fields: IndexMap::new(),
                    interfaces: Vec::new(),
                    union_members: Vec::new(),
                    enum_values: Vec::new(),
                    directives: Vec::new(),
                });
                for (field_name, field) in additional_fields {
                    entry.fields.insert(field_name, field);
                }
            }
            ast::Definition::InterfaceTypeDefinition(iface) => {
                let name = iface.name().map(|n| n.text().to_string()).unwrap_or_default();
                let fields = iface
                    .fields_definition()
                    .map(|f| convert_fields(&f))
                    .unwrap_or_default();
                types.insert(
                    name.clone(),
                    TypeDefinition {
                        name,
                        kind: TypeKind::Interface,
                        fields,
                        interfaces: Vec::new(),
                        union_members: Vec::new(),
                        enum_values: Vec::new(),
                        directives: iface
                            .directives()
                            .map(|d| convert_directives(&d))
                            .unwrap_or_default(),
                    },
                );
            }
            ast::Definition::UnionTypeDefinition(union_def) => {
                let name = union_def
                    .name()
                    .map(|n| n.text().to_string())
                    .unwrap_or_default();
                let members = union_def
                    .union_member_types()
                    .map(|members| {
                        members
                            .named_types()
                            .filter_map(|t| t.name().map(|n| n.text().to_string()))
                            .collect()
                    })
                    .unwrap_or_default();
                types.insert(
                    name.clone(),
                    TypeDefinition {
                        name,
                        kind: TypeKind::Union,
                        fields: IndexMap::new(),
                        interfaces: Vec::new(),
                        union_members: members,
                        enum_values: Vec::new(),
                        directives: Vec::new(),
                    },
                );
            }
            ast::Definition::EnumTypeDefinition(enum_def) => {
                let name = enum_def
                    .name()
                    .map(|n| n.text().to_string())
                    .unwrap_or_default();
                let values = enum_def
                    .enum_values_definition()
                    .map(|values| {
                        values
                            .enum_value_definitions()
                            .filter_map(|v| v.enum_value().and_then(|e| e.name()).map(|n| n.text().to_string()))
                            .collect()
                    })
                    .unwrap_or_default();
                types.insert(
                    name.clone(),
                    TypeDefinition {
                        name,
                        kind: TypeKind::Enum,
                        fields: IndexMap::new(),
                        interfaces: Vec::new(),
                        union_members: Vec::new(),
                        enum_values: values,
                        directives: Vec::new(),
                    },
                );
            }
            ast::Definition::ScalarTypeDefinition(scalar) => {
                let name = scalar.name().map(|n| n.text().to_string()).unwrap_or_default();
                types.insert(
                    name.clone(),
                    TypeDefinition {
                        name,
                        kind: TypeKind::Scalar,
                        fields: IndexMap::new(),
                        interfaces: Vec::new(),
                        union_members: Vec::new(),
                        enum_values: Vec::new(),
                        directives: Vec::new(),
                    },
                );
            }
            ast::Definition::InputObjectTypeDefinition(input) => {
                let name = input.name().map(|n| n.text().to_string()).unwrap_or_default();
                let fields = input
                    .input_fields_definition()
                    .map(|defs| {
                        defs.input_value_definitions()
                            .map(|v| {
                                let ivd = convert_input_value(&v);
                                (
                                    ivd.name.clone(),
                                    FieldDefinition {
                                        name: ivd.name,
                                        arguments: Vec::new(),
                                        ty: ivd.ty,
                                        directives: Vec::new(),
                                    },
                                )
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                types.insert(
                    name.clone(),
                    TypeDefinition {
                        name,
                        kind: TypeKind::InputObject,
                        fields,
                        interfaces: Vec::new(),
                        union_members: Vec::new(),
                        enum_values: Vec::new(),
                        directives: Vec::new(),
                    },
                );
            }
            ast::Definition::DirectiveDefinition(directive_def) => {
                let name = directive_def
                    .name()
                    .map(|n| n.text().to_string())
                    .unwrap_or_default();
                let locations = directive_def
                    .directive_locations()
                    .map(|locs| {
                        locs.syntax()
                            .text()
                            .to_string()
                            .split('|')
                            .map(|s| s.trim().trim_start_matches('@').to_string())
                            .filter(|s| !s.is_empty())
                            .collect()
                    })
                    .unwrap_or_default();
                let arguments = directive_def
                    .arguments_definition()
                    .map(|args| args.input_value_definitions().map(|v| convert_input_value(&v)).collect())
                    .unwrap_or_default();
                directive_defs.insert(
                    name.clone(),
                    DirectiveDefinition {
                        name,
                        locations,
                        arguments,
                    },
                );
            }
            _ => {}
        }
    }

    if !saw_schema_definition && !types.contains_key("Query") {
        // Schemas that only declare an implicit `Query` root and never
        // wrote a `schema { ... }` block are still valid.
    }

    Ok(SchemaDocument {
        types,
        directive_defs,
        query_type,
        mutation_type,
        subscription_type,
    })
}

fn convert_object(object: &ast::ObjectTypeDefinition) -> TypeDefinition {
    let name = object.name().map(|n| n.text().to_string()).unwrap_or_default();
    let fields = object
        .fields_definition()
        .map(|f| convert_fields(&f))
        .unwrap_or_default();
    let interfaces = object
        .implements_interfaces()
        .map(|impls| {
            impls
                .named_types()
                .filter_map(|t| t.name().map(|n| n.text().to_string()))
                .collect()
        })
        .unwrap_or_default();
    let directives = object
        .directives()
        .map(|d| convert_directives(&d))
        .unwrap_or_default();
    TypeDefinition {
        name,
        kind: TypeKind::Object,
        fields,
        interfaces,
        union_members: Vec::new(),
        enum_values: Vec::new(),
        directives,
    }
}

fn convert_fields(fields_def: &ast::FieldsDefinition) -> IndexMap<String, FieldDefinition> {
    let mut out = IndexMap::new();
    for field in fields_def.field_definitions() {
        let name = field.name().map(|n| n.text().to_string()).unwrap_or_default();
        let ty = field
            .ty()
            .map(|t| convert_type(&t))
            .unwrap_or(TypeRef::Named("String".to_string()));
        let arguments = field
            .arguments_definition()
            .map(|args| args.input_value_definitions().map(|v| convert_input_value(&v)).collect())
            .unwrap_or_default();
        let directives = field
            .directives()
            .map(|d| convert_directives(&d))
            .unwrap_or_default();
        out.insert(
            name.clone(),
            FieldDefinition {
                name,
                arguments,
                ty,
                directives,
            },
        );
    }
    out
}

fn convert_input_value(value: &ast::InputValueDefinition) -> InputValueDefinition {
    let name = value.name().map(|n| n.text().to_string()).unwrap_or_default();
    let ty = value
        .ty()
        .map(|t| convert_type(&t))
        .unwrap_or(TypeRef::Named("String".to_string()));
    let default_value = value.default_value().and_then(|d| d.value()).map(|v| convert_value(&v));
    InputValueDefinition {
        name,
        ty,
        default_value,
    }
}

fn convert_type(ty: &ast::Type) -> TypeRef {
    match ty {
        ast::Type::NamedType(named) => {
            TypeRef::Named(named.name().map(|n| n.text().to_string()).unwrap_or_default())
        }
        ast::Type::ListType(list) => {
            let inner = list
                .ty()
                .map(|t| convert_type(&t))
                .unwrap_or(TypeRef::Named("String".to_string()));
            TypeRef::List(Box::new(inner))
        }
        ast::Type::NonNullType(non_null) => {
            let inner = if let Some(named) = non_null.named_type() {
                TypeRef::Named(named.name().map(|n| n.text().to_string()).unwrap_or_default())
            } else if let Some(list) = non_null.list_type() {
                let inner = list
                    .ty()
                    .map(|t| convert_type(&t))
                    .unwrap_or(TypeRef::Named("String".to_string()));
                TypeRef::List(Box::new(inner))
            } else {
                TypeRef::Named("String".to_string())
            };
            TypeRef::NonNull(Box::new(inner))
        }
    }
}

fn convert_directives(directives: &ast::Directives) -> Vec<Directive> {
    directives
        .directives()
        .map(|d| {
            let name = d.name().map(|n| n.text().to_string()).unwrap_or_default();
            let arguments = d
                .arguments()
                .map(|args| {
                    args.arguments()
                        .filter_map(|a| {
                            let name = a.name()?.text().to_string();
                            let value = convert_value(&a.value()?);
                            Some((name, value))
                        })
                        .collect()
                })
                .unwrap_or_default();
            Directive { name, arguments }
        })
        .collect()
}

fn convert_value(value: &ast::Value) -> Value {
    match value {
        ast::Value::NullValue(_) => Value::Null,
        ast::Value::BooleanValue(b) => Value::Bool(b.true_token().is_some()),
        ast::Value::IntValue(i) => Value::Int(i.text().parse().unwrap_or_default()),
        ast::Value::FloatValue(f) => Value::Float(f.text().parse().unwrap_or_default()),
        ast::Value::StringValue(s) => Value::String(s.to_string()),
        ast::Value::EnumValue(e) => {
            Value::Enum(e.name().map(|n| n.text().to_string()).unwrap_or_default())
        }
        ast::Value::Variable(v) => {
            Value::Variable(v.name().map(|n| n.text().to_string()).unwrap_or_default())
        }
        ast::Value::ListValue(list) => {
            Value::List(list.values().map(|v| convert_value(&v)).collect())
        }
        ast::Value::ObjectValue(object) => {
            let mut map = IndexMap::new();
            for field in object.object_fields() {
                if let (Some(name), Some(value)) = (field.name(), field.value()) {
                    map.insert(name.text().to_string(), convert_value(&value));
                }
            }
            Value::Object(map)
        }
    }
}

// --- Operations ---------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationType {
    Query,
    Mutation,
    Subscription,
}

#[derive(Debug, Clone)]
pub struct VariableDefinition {
    pub name: String,
    pub ty: TypeRef,
}

#[derive(Debug, Clone)]
pub struct FieldSelection {
    pub alias: Option<String>,
    pub name: String,
    pub arguments: IndexMap<String, Value>,
    pub directives: Vec<Directive>,
    pub selection_set: SelectionSet,
    /// Where this field was written in the client's document. `None` for
    /// fields the planner synthesizes itself (e.g. the injected `id` join
    /// key), which have no position of their own.
    pub location: Option<federation_error::SourceLocation>,
}

impl FieldSelection {
    /// The name the response key uses: the alias if present, else the name.
    pub fn response_key(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone)]
pub struct InlineFragment {
    pub type_condition: Option<String>,
    pub directives: Vec<Directive>,
    pub selection_set: SelectionSet,
}

#[derive(Debug, Clone)]
pub struct FragmentSpread {
    pub name: String,
    pub directives: Vec<Directive>,
}

#[derive(Debug, Clone)]
pub enum Selection {
    Field(FieldSelection),
    InlineFragment(InlineFragment),
    FragmentSpread(FragmentSpread),
}

#[derive(Debug, Clone, Default)]
pub struct SelectionSet(pub Vec<Selection>);

impl SelectionSet {
    pub fn iter(&self) -> std::slice::Iter<'_, Selection> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct FragmentDefinition {
    pub name: String,
    pub type_condition: String,
    pub directives: Vec<Directive>,
    pub selection_set: SelectionSet,
}

#[derive(Debug, Clone)]
pub struct OperationDefinition {
    pub operation_type: OperationType,
    pub name: Option<String>,
    pub variables: Vec<VariableDefinition>,
    pub selection_set: SelectionSet,
}

#[derive(Debug, Clone, Default)]
pub struct OperationDocument {
    pub operations: Vec<OperationDefinition>,
    pub fragments: IndexMap<String, FragmentDefinition>,
}

impl OperationDocument {
    /// The operation to execute: the named one if `operation_name` is
    /// given, otherwise the sole operation (ambiguity with >1 anonymous
    /// operations is a caller error, not modeled here).
    pub fn operation(&self, operation_name: Option<&str>) -> Option<&OperationDefinition> {
        match operation_name {
            Some(name) => self
                .operations
                .iter()
                .find(|op| op.name.as_deref() == Some(name)),
            None => self.operations.first(),
        }
    }
}

pub fn parse_operation(source: &str) -> Result<OperationDocument, FederationError> {
    let tree = Parser::new(source).parse();
    if tree.errors().len() > 0 {
        let message = tree
            .errors()
            .map(|e| e.message().to_string())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(FederationError::single(
            "OPERATION_PARSE_ERROR",
            format!("could not parse operation: {message}"),
        ));
    }
    let document = tree.document();
    let mut operations = Vec::new();
    let mut fragments = IndexMap::new();

    for definition in document.definitions() {
        match definition {
            ast::Definition::OperationDefinition(op) => {
                let operation_type = match op.operation_type() {
                    Some(t) if t.mutation_token().is_some() => OperationType::Mutation,
                    Some(t) if t.subscription_token().is_some() => OperationType::Subscription,
                    _ => OperationType::Query,
                };
                let name = op.name().map(|n| n.text().to_string());
                let variables = op
                    .variable_definitions()
                    .map(|defs| {
                        defs.variable_definitions()
                            .filter_map(|v| {
                                let name = v.variable()?.name()?.text().to_string();
                                let ty = v.ty().map(|t| convert_type(&t))?;
                                Some(VariableDefinition { name, ty })
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                let selection_set = op
                    .selection_set()
                    .map(|s| convert_selection_set(&s, source))
                    .unwrap_or_default();
                operations.push(OperationDefinition {
                    operation_type,
                    name,
                    variables,
                    selection_set,
                });
            }
            ast::Definition::FragmentDefinition(frag) => {
                let name = frag.fragment_name().and_then(|n| n.name()).map(|n| n.text().to_string()).unwrap_or_default();
                let type_condition = frag
                    .type_condition()
                    .and_then(|t| t.named_type())
                    .and_then(|t| t.name())
                    .map(|n| n.text().to_string())
                    .unwrap_or_default();
                let directives = frag
                    .directives()
                    .map(|d| convert_directives(&d))
                    .unwrap_or_default();
                let selection_set = frag
                    .selection_set()
                    .map(|s| convert_selection_set(&s, source))
                    .unwrap_or_default();
                fragments.insert(
                    name.clone(),
                    FragmentDefinition {
                        name,
                        type_condition,
                        directives,
                        selection_set,
                    },
                );
            }
            _ => {}
        }
    }

    if operations.is_empty() {
        return Err(FederationError::single(
            "OPERATION_PARSE_ERROR",
            "document contains no executable operation",
        ));
    }

    Ok(OperationDocument {
        operations,
        fragments,
    })
}

fn convert_selection_set(set: &ast::SelectionSet, source: &str) -> SelectionSet {
    let mut selections = Vec::new();
    for selection in set.selections() {
        match selection {
            ast::Selection::Field(field) => {
                let location = Some(locate(source, u32::from(field.syntax().text_range().start()) as usize));
                let alias = field
                    .alias()
                    .and_then(|a| a.name())
                    .map(|n| n.text().to_string());
                let name = field.name().map(|n| n.text().to_string()).unwrap_or_default();
                let arguments = field
                    .arguments()
                    .map(|args| {
                        args.arguments()
                            .filter_map(|a| {
                                let name = a.name()?.text().to_string();
                                let value = convert_value(&a.value()?);
                                Some((name, value))
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                let directives = field
                    .directives()
                    .map(|d| convert_directives(&d))
                    .unwrap_or_default();
                let selection_set = field
                    .selection_set()
                    .map(|s| convert_selection_set(&s, source))
                    .unwrap_or_default();
                selections.push(Selection::Field(FieldSelection {
                    alias,
                    name,
                    arguments,
                    directives,
                    selection_set,
                    location,
                }));
            }
            ast::Selection::InlineFragment(inline) => {
                let type_condition = inline
                    .type_condition()
                    .and_then(|t| t.named_type())
                    .and_then(|t| t.name())
                    .map(|n| n.text().to_string());
                let directives = inline
                    .directives()
                    .map(|d| convert_directives(&d))
                    .unwrap_or_default();
                let selection_set = inline
                    .selection_set()
                    .map(|s| convert_selection_set(&s, source))
                    .unwrap_or_default();
                selections.push(Selection::InlineFragment(InlineFragment {
                    type_condition,
                    directives,
                    selection_set,
                }));
            }
            ast::Selection::FragmentSpread(spread) => {
                let name = spread
                    .fragment_name()
                    .and_then(|n| n.name())
                    .map(|n| n.text().to_string())
                    .unwrap_or_default();
                let directives = spread
                    .directives()
                    .map(|d| convert_directives(&d))
                    .unwrap_or_default();
                selections.push(Selection::FragmentSpread(FragmentSpread { name, directives }));
            }
        }
    }
    SelectionSet(selections)
}

/// Converts a byte offset into `source` to a 1-based `(line, column)` pair,
/// matching the GraphQL response `locations` convention.
fn locate(source: &str, offset: usize) -> federation_error::SourceLocation {
    let offset = offset.min(source.len());
    let prefix = &source[..offset];
    let line = prefix.matches('\n').count() + 1;
    let column = match prefix.rfind('\n') {
        Some(pos) => offset - pos,
        None => offset + 1,
    };
    federation_error::SourceLocation { line, column }
}

/// Renders a selection set back to GraphQL text. Used by the executor to
/// build the sub-query sent to each service.
pub fn print_selection_set(set: &SelectionSet) -> String {
    let mut out = String::new();
    print_selection_set_into(set, &mut out);
    out
}

fn print_selection_set_into(set: &SelectionSet, out: &mut String) {
    out.push('{');
    for (i, selection) in set.0.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        match selection {
            Selection::Field(field) => {
                if let Some(alias) = &field.alias {
                    out.push_str(alias);
                    out.push(':');
                }
                out.push_str(&field.name);
                if !field.arguments.is_empty() {
                    out.push('(');
                    for (i, (name, value)) in field.arguments.iter().enumerate() {
                        if i > 0 {
                            out.push(',');
                        }
                        out.push_str(name);
                        out.push(':');
                        print_value_into(value, out);
                    }
                    out.push(')');
                }
                if !field.selection_set.is_empty() {
                    out.push(' ');
                    print_selection_set_into(&field.selection_set, out);
                }
            }
            Selection::InlineFragment(inline) => {
                out.push_str("... ");
                if let Some(tc) = &inline.type_condition {
                    out.push_str("on ");
                    out.push_str(tc);
                    out.push(' ');
                }
                print_selection_set_into(&inline.selection_set, out);
            }
            Selection::FragmentSpread(spread) => {
                out.push_str("...");
                out.push_str(&spread.name);
            }
        }
    }
    out.push('}');
}

fn print_value_into(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Int(i) => out.push_str(&i.to_string()),
        Value::Float(f) => out.push_str(&f.to_string()),
        Value::String(s) => {
            out.push('"');
            out.push_str(&s.replace('\\', "\\\\").replace('"', "\\\""));
            out.push('"');
        }
        Value::Enum(e) => out.push_str(e),
        Value::Variable(v) => {
            out.push('$');
            out.push_str(v);
        }
        Value::List(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                print_value_into(item, out);
            }
            out.push(']');
        }
        Value::Object(fields) => {
            out.push('{');
            for (i, (name, value)) in fields.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(name);
                out.push(':');
                print_value_into(value, out);
            }
            out.push('}');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_object_type_with_boundary_directive() {
        let schema = parse_schema(
            r#"
            directive @boundary on OBJECT | FIELD_DEFINITION
            type Movie @boundary {
                id: ID!
                title: String
            }
            type Query {
                movie(id: ID!): Movie @boundary
            }
            "#,
        )
        .unwrap();
        let movie = schema.get("Movie").unwrap();
        assert!(movie.is_boundary());
        assert_eq!(movie.fields.len(), 2);
        assert!(movie.fields["id"].ty.is_non_null());
    }

    #[test]
    fn prints_selection_set_with_alias_and_args() {
        let doc = parse_operation(r#"{ movie(id: "1") { id title } }"#).unwrap();
        let printed = print_selection_set(&doc.operations[0].selection_set);
        assert_eq!(printed, r#"{movie(id:"1") {id title}}"#);
    }

    #[test]
    fn captures_the_line_and_column_of_each_field() {
        let doc = parse_operation("{\n  movie(id: \"1\") {\n    title\n  }\n}").unwrap();
        let Selection::Field(movie) = &doc.operations[0].selection_set.0[0] else {
            panic!("expected field");
        };
        let location = movie.location.unwrap();
        assert_eq!(location.line, 2);
        assert_eq!(location.column, 3);

        let Selection::Field(title) = &movie.selection_set.0[0] else {
            panic!("expected field");
        };
        let location = title.location.unwrap();
        assert_eq!(location.line, 3);
        assert_eq!(location.column, 5);
    }

    #[test]
    fn locate_handles_the_first_character_of_the_source() {
        assert_eq!(locate("query", 0), federation_error::SourceLocation { line: 1, column: 1 });
    }
}
