//! Error primitives shared by schema validation, merging, permission
//! filtering and query planning.
//!
//! The wording produced here is part of the gateway's public contract:
//! clients and operators match on these strings, so once a message for a
//! given `code` ships it must never change (see SPEC_FULL.md §12).

use std::fmt;
use std::fmt::Write as _;

/// Position in the original schema or operation document a diagnostic
/// points at. `None` when the error has no single source location (e.g.
/// cross-service ambiguity errors).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

/// One federation diagnostic: a stable `code`, a human-readable `message`
/// and an optional source location.
#[derive(Debug, Clone, thiserror::Error, serde::Serialize)]
#[error("{message}")]
pub struct SingleFederationError {
    pub code: &'static str,
    pub message: String,
    pub location: Option<SourceLocation>,
}

impl SingleFederationError {
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            location: None,
        }
    }

    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }
}

/// A batch of diagnostics, used where a caller wants to surface more than
/// the first failure (e.g. permission filtering strips many fields at
/// once).
#[derive(Debug, Clone, Default, thiserror::Error)]
pub struct MultipleFederationErrors {
    pub errors: Vec<SingleFederationError>,
}

impl MultipleFederationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, error: SingleFederationError) {
        self.errors.push(error);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for MultipleFederationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "the following errors occurred:")?;
        for error in &self.errors {
            write!(f, "\n\n  - ")?;
            for c in error.to_string().chars() {
                if c == '\n' {
                    write!(f, "\n    ")?;
                } else {
                    f.write_char(c)?;
                }
            }
        }
        Ok(())
    }
}

/// Top-level error returned by the federation crate: a single failure
/// (schema validation stops at the first one, per spec.md §4.1) or a batch.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FederationError {
    #[error(transparent)]
    Single(#[from] SingleFederationError),
    #[error(transparent)]
    Multiple(#[from] MultipleFederationErrors),
}

impl FederationError {
    pub fn single(code: &'static str, message: impl Into<String>) -> Self {
        Self::Single(SingleFederationError::new(code, message))
    }

    /// Every diagnostic carried by this error, flattened.
    pub fn errors(&self) -> Vec<&SingleFederationError> {
        match self {
            Self::Single(e) => vec![e],
            Self::Multiple(e) => e.errors.iter().collect(),
        }
    }
}

pub type FederationResult<T> = Result<T, FederationError>;

/// Stable error codes. Mirrors the numbered rules in spec.md §4.1 and the
/// merge rules in §4.2 so a failure can be traced back to the rule that
/// produced it without parsing the message.
pub mod codes {
    pub const BOUNDARY_DIRECTIVE_LOCATION: &str = "BOUNDARY_DIRECTIVE_LOCATION";
    pub const BOUNDARY_DIRECTIVE_ARGS: &str = "BOUNDARY_DIRECTIVE_ARGS";
    pub const BOUNDARY_OBJECT_ID_FIELD: &str = "BOUNDARY_OBJECT_ID_FIELD";
    pub const BOUNDARY_QUERY_MISSING: &str = "BOUNDARY_QUERY_MISSING";
    pub const BOUNDARY_QUERY_DUPLICATE: &str = "BOUNDARY_QUERY_DUPLICATE";
    pub const BOUNDARY_QUERY_ARG_SHAPE: &str = "BOUNDARY_QUERY_ARG_SHAPE";
    pub const BOUNDARY_QUERY_RETURN_SHAPE: &str = "BOUNDARY_QUERY_RETURN_SHAPE";
    pub const NODE_INTERFACE_SHAPE: &str = "NODE_INTERFACE_SHAPE";
    pub const SERVICE_TYPE_MISSING: &str = "SERVICE_TYPE_MISSING";
    pub const SERVICE_QUERY_MISSING: &str = "SERVICE_QUERY_MISSING";
    pub const NAMESPACE_DIRECTIVE_ARGS: &str = "NAMESPACE_DIRECTIVE_ARGS";
    pub const NAMESPACE_NAME_SUFFIX: &str = "NAMESPACE_NAME_SUFFIX";
    pub const NAMESPACE_ASCENDENCE: &str = "NAMESPACE_ASCENDENCE";
    pub const NAMESPACE_FIELD_NULLABLE: &str = "NAMESPACE_FIELD_NULLABLE";
    pub const ROOT_RENAMED: &str = "ROOT_RENAMED";
    pub const NAMING_CONVENTION: &str = "NAMING_CONVENTION";
    pub const POST_MERGE_INVALID: &str = "POST_MERGE_INVALID";

    pub const MERGE_KIND_MISMATCH: &str = "MERGE_KIND_MISMATCH";
    pub const MERGE_FIELD_CONFLICT: &str = "MERGE_FIELD_CONFLICT";
    pub const MERGE_STRUCTURAL_MISMATCH: &str = "MERGE_STRUCTURAL_MISMATCH";
    pub const MERGE_AMBIGUOUS_BOUNDARY_FIELD: &str = "MERGE_AMBIGUOUS_BOUNDARY_FIELD";

    pub const PLAN_UNREACHABLE_FIELD: &str = "PLAN_UNREACHABLE_FIELD";
    pub const PLAN_MULTI_SERVICE_MUTATION: &str = "PLAN_MULTI_SERVICE_MUTATION";

    pub const PERMISSION_DENIED_FIELD: &str = "PERMISSION_DENIED_FIELD";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multiple_errors_formats_each_on_its_own_bullet() {
        let mut errors = MultipleFederationErrors::new();
        errors.push(SingleFederationError::new(codes::PERMISSION_DENIED_FIELD, "a"));
        errors.push(SingleFederationError::new(codes::PERMISSION_DENIED_FIELD, "b"));
        let rendered = errors.to_string();
        assert!(rendered.contains("- a"));
        assert!(rendered.contains("- b"));
    }

    #[test]
    fn empty_multiple_errors_converts_to_ok() {
        assert!(MultipleFederationErrors::new().into_result().is_ok());
    }
}
