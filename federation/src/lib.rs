//! Schema validation, merging, permission filtering and query planning for
//! a GraphQL federation gateway.
//!
//! This crate is pure: no network I/O, no clock, no filesystem. The
//! `gateway` binary crate owns the registry, executor and wire adapters
//! built on top of it.

pub mod ast;
pub mod merge;
pub mod model;
pub mod permissions;
pub mod plan;
pub mod validator;

pub use ast::{parse_operation, parse_schema, OperationDocument, SchemaDocument};
pub use model::{AllowedFields, GatewaySchema, OperationPermissions, Service, ServiceStatus};
pub use plan::{plan_operation, QueryPlan, Step};
