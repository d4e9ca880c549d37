//! The shared data model: services, the merged gateway schema and its
//! lookup tables, boundary queries and the permission tree.

use crate::ast::SchemaDocument;
use indexmap::{IndexMap, IndexSet};
use std::fmt;

/// One backing service tracked by the registry; the federation crate only
/// cares about its name, url and last successfully parsed schema.
#[derive(Debug, Clone)]
pub struct Service {
    pub name: String,
    pub version: String,
    pub schema_source: String,
    pub service_url: String,
    pub status: ServiceStatus,
    pub parsed_schema: Option<SchemaDocument>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatus {
    Ok,
    Error,
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceStatus::Ok => write!(f, "OK"),
            ServiceStatus::Error => write!(f, "Error"),
        }
    }
}

/// The one boundary query a service exposes for a boundary type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryQueryKind {
    Singular,
    Plural,
}

#[derive(Debug, Clone)]
pub struct BoundaryQuery {
    pub kind: BoundaryQueryKind,
    pub field_name: String,
    pub arg_name: String,
}

/// `(typeName, fieldName) -> {serviceURL}`. A field may legitimately be
/// resolvable by more than one service only for a boundary type's `id`
/// field; the merger (C2) rejects every other ambiguity up front, so by
/// the time a `GatewaySchema` exists this invariant always holds.
#[derive(Debug, Clone, Default)]
pub struct Locations {
    entries: IndexMap<(String, String), IndexSet<String>>,
}

impl Locations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, type_name: &str, field_name: &str, service_url: &str) {
        self.entries
            .entry((type_name.to_string(), field_name.to_string()))
            .or_default()
            .insert(service_url.to_string());
    }

    pub fn services_for(&self, type_name: &str, field_name: &str) -> Vec<&str> {
        self.entries
            .get(&(type_name.to_string(), field_name.to_string()))
            .map(|set| set.iter().map(|s| s.as_str()).collect())
            .unwrap_or_default()
    }

    pub fn resolves(&self, type_name: &str, field_name: &str, service_url: &str) -> bool {
        self.entries
            .get(&(type_name.to_string(), field_name.to_string()))
            .map(|set| set.contains(service_url))
            .unwrap_or(false)
    }
}

/// `BoundaryQueries[typeName][serviceURL]`.
#[derive(Debug, Clone, Default)]
pub struct BoundaryQueries {
    entries: IndexMap<String, IndexMap<String, BoundaryQuery>>,
}

impl BoundaryQueries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, type_name: &str, service_url: &str, query: BoundaryQuery) {
        self.entries
            .entry(type_name.to_string())
            .or_default()
            .insert(service_url.to_string(), query);
    }

    pub fn for_type(&self, type_name: &str) -> Option<&IndexMap<String, BoundaryQuery>> {
        self.entries.get(type_name)
    }

    pub fn get(&self, type_name: &str, service_url: &str) -> Option<&BoundaryQuery> {
        self.entries.get(type_name)?.get(service_url)
    }

    /// Services that expose a boundary query for this type, deterministically
    /// ordered by URL.
    pub fn services_for(&self, type_name: &str) -> Vec<&str> {
        let mut urls: Vec<&str> = self
            .entries
            .get(type_name)
            .map(|m| m.keys().map(|s| s.as_str()).collect())
            .unwrap_or_default();
        urls.sort_unstable();
        urls
    }
}

/// The merged schema plus the two lookup tables the planner consults.
#[derive(Debug, Clone)]
pub struct GatewaySchema {
    pub schema: SchemaDocument,
    pub locations: Locations,
    pub boundary_queries: BoundaryQueries,
}

impl GatewaySchema {
    /// Services, sorted by URL, that can resolve `(type_name, field_name)`.
    /// The planner's deterministic tie-break picks the first of this list.
    pub fn services_for(&self, type_name: &str, field_name: &str) -> Vec<&str> {
        let mut urls = self.locations.services_for(type_name, field_name);
        urls.sort_unstable();
        urls
    }
}

/// `AllowedFields`: either allow-everything, or a recursive whitelist of
/// fields.
#[derive(Debug, Clone, PartialEq)]
pub enum AllowedFields {
    AllAllowed,
    Fields(IndexMap<String, AllowedFields>),
}

impl AllowedFields {
    pub fn none() -> Self {
        AllowedFields::Fields(IndexMap::new())
    }

    pub fn is_all_allowed(&self) -> bool {
        matches!(self, AllowedFields::AllAllowed)
    }

    /// Whether `field` is reachable at all under this node (either the
    /// whole node is allow-all, or the field is a key of the map).
    pub fn allows(&self, field: &str) -> bool {
        if field == "__typename" {
            return true;
        }
        match self {
            AllowedFields::AllAllowed => true,
            AllowedFields::Fields(map) => map.contains_key(field),
        }
    }

    /// The sub-tree of allowed fields reachable through `field`.
    pub fn child(&self, field: &str) -> AllowedFields {
        match self {
            AllowedFields::AllAllowed => AllowedFields::AllAllowed,
            AllowedFields::Fields(map) => map
                .get(field)
                .cloned()
                .unwrap_or_else(AllowedFields::none),
        }
    }

    /// `AllAllowed ∪ X = AllAllowed`; otherwise recursive key-wise union.
    pub fn merge(&self, other: &AllowedFields) -> AllowedFields {
        match (self, other) {
            (AllowedFields::AllAllowed, _) | (_, AllowedFields::AllAllowed) => {
                AllowedFields::AllAllowed
            }
            (AllowedFields::Fields(a), AllowedFields::Fields(b)) => {
                let mut merged = a.clone();
                for (key, value) in b {
                    merged
                        .entry(key.clone())
                        .and_modify(|existing| *existing = existing.merge(value))
                        .or_insert_with(|| value.clone());
                }
                AllowedFields::Fields(merged)
            }
        }
    }

    /// JSON sugar: `"*"` → allow-all, a JSON array of strings → allow-all
    /// for each named leaf, a JSON object → recurse.
    pub fn from_json(value: &serde_json::Value) -> AllowedFields {
        match value {
            serde_json::Value::String(s) if s == "*" => AllowedFields::AllAllowed,
            serde_json::Value::Array(items) => {
                let mut map = IndexMap::new();
                for item in items {
                    if let Some(name) = item.as_str() {
                        map.insert(name.to_string(), AllowedFields::AllAllowed);
                    }
                }
                AllowedFields::Fields(map)
            }
            serde_json::Value::Object(fields) => {
                let mut map = IndexMap::new();
                for (key, value) in fields {
                    map.insert(key.clone(), AllowedFields::from_json(value));
                }
                AllowedFields::Fields(map)
            }
            _ => AllowedFields::none(),
        }
    }

    /// Inverse of `from_json`, with sorted keys so the output is
    /// deterministic byte-for-byte.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            AllowedFields::AllAllowed => serde_json::Value::String("*".to_string()),
            AllowedFields::Fields(map) => {
                let mut sorted: Vec<(&String, &AllowedFields)> = map.iter().collect();
                sorted.sort_by(|a, b| a.0.cmp(b.0));
                let mut object = serde_json::Map::new();
                for (key, value) in sorted {
                    object.insert(key.clone(), value.to_json());
                }
                serde_json::Value::Object(object)
            }
        }
    }
}

/// `OperationPermissions`: one `AllowedFields` tree per root operation
/// type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperationPermissions {
    pub query: AllowedFields,
    pub mutation: AllowedFields,
    pub subscription: AllowedFields,
}

impl Default for AllowedFields {
    fn default() -> Self {
        AllowedFields::none()
    }
}

impl OperationPermissions {
    pub fn allow_all() -> Self {
        Self {
            query: AllowedFields::AllAllowed,
            mutation: AllowedFields::AllAllowed,
            subscription: AllowedFields::AllAllowed,
        }
    }

    /// Key-wise union across all three roots (spec.md §4.3 `MergePermissions`).
    pub fn merge(&self, other: &OperationPermissions) -> OperationPermissions {
        OperationPermissions {
            query: self.query.merge(&other.query),
            mutation: self.mutation.merge(&other.mutation),
            subscription: self.subscription.merge(&other.subscription),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_allowed_absorbs_in_merge() {
        let a = AllowedFields::AllAllowed;
        let b = AllowedFields::from_json(&serde_json::json!({"title": "*"}));
        assert_eq!(a.merge(&b), AllowedFields::AllAllowed);
        assert_eq!(b.merge(&a), AllowedFields::AllAllowed);
    }

    #[test]
    fn recursive_union_merges_keys() {
        let a = AllowedFields::from_json(&serde_json::json!({"movie": ["id", "title"]}));
        let b = AllowedFields::from_json(&serde_json::json!({"movie": ["release"]}));
        let merged = a.merge(&b);
        assert!(merged.child("movie").allows("id"));
        assert!(merged.child("movie").allows("title"));
        assert!(merged.child("movie").allows("release"));
    }

    #[test]
    fn json_round_trip_sorts_keys() {
        let original = serde_json::json!({"b": "*", "a": "*"});
        let allowed = AllowedFields::from_json(&original);
        let rendered = allowed.to_json();
        assert_eq!(rendered.to_string(), r#"{"a":"*","b":"*"}"#);
    }
}
