//! C8 — wire adapters (spec.md §4.8): the inbound GraphQL-over-HTTP
//! surface and the outbound HTTP client shared by the registry and the
//! executor.

pub mod inbound;
pub mod outbound;
