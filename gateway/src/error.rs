//! The gateway-facing error taxonomy (spec.md §7). These wrap
//! `federation::FederationError` plus the executor's own upstream/timeout/
//! cancellation failures, and know how to render themselves as GraphQL
//! response errors.

use federation_error::{SingleFederationError, SourceLocation};
use serde::Serialize;

/// One entry of a GraphQL response's `errors` array.
#[derive(Debug, Clone, Serialize)]
pub struct GraphqlError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<ErrorLocation>,
    #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
    pub extensions: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorLocation {
    pub line: usize,
    pub column: usize,
}

impl From<SourceLocation> for ErrorLocation {
    fn from(location: SourceLocation) -> Self {
        Self { line: location.line, column: location.column }
    }
}

impl GraphqlError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: None,
            locations: Vec::new(),
            extensions: serde_json::Map::new(),
        }
    }

    pub fn with_path(mut self, path: Vec<String>) -> Self {
        self.path = Some(path);
        self
    }

    pub fn with_extension(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.extensions.insert(key.to_string(), value.into());
        self
    }

    /// The literal message every timeout produces (spec.md §4.5, §7).
    pub fn timeout() -> Self {
        Self::new("downstream request timed out")
    }

    pub fn cancelled() -> Self {
        Self::new("the operation was cancelled")
    }

    pub fn from_federation(error: &SingleFederationError) -> Self {
        let mut graphql_error = Self::new(error.message.clone()).with_extension("code", error.code);
        if let Some(location) = error.location {
            graphql_error.locations.push(location.into());
        }
        graphql_error
    }

    /// One error per stripped field (spec.md §4.3 / §8 scenario 5), with the
    /// exact wording the permission filter produces.
    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(message)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("the incoming operation cannot be planned: {0}")]
    Plan(#[from] federation_error::FederationError),
    #[error("request body exceeds the configured size limit")]
    BodyTooLarge,
    #[error("could not parse request body: {0}")]
    MalformedRequest(String),
    #[error("no merged schema is available yet")]
    SchemaNotReady,
}

impl GatewayError {
    pub fn into_graphql_errors(self) -> Vec<GraphqlError> {
        match self {
            GatewayError::Plan(federation_error) => federation_error
                .errors()
                .into_iter()
                .map(GraphqlError::from_federation)
                .collect(),
            other => vec![GraphqlError::new(other.to_string())],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_error_uses_the_literal_message() {
        assert_eq!(GraphqlError::timeout().message, "downstream request timed out");
    }
}
