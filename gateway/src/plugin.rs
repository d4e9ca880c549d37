//! C7 — plugin pipeline (spec.md §4.7).
//!
//! Plugins are the gateway's only extension point: each one is built from
//! its own config subtree, gets a chance to wrap the public/private axum
//! routers, and reads/writes the per-request `RequestContext` —
//! `add_outgoing_requests_header` and `add_permissions` are "the only
//! inter-plugin protocol" (spec.md §4.7).

use crate::context::RequestContext;
use crate::error::GatewayError;
use axum::Router;
use http::HeaderMap;
use std::sync::Arc;
use tower::BoxError;

#[async_trait::async_trait]
pub trait Plugin: Send + Sync + 'static {
    /// Builds the plugin from its config subtree (spec.md §4.7
    /// `Configure`); `null` when the gateway config names the plugin
    /// with no subtree of its own.
    async fn new(config: serde_json::Value) -> Result<Self, BoxError>
    where
        Self: Sized;

    /// Wraps the router serving client-facing routes (`/query`,
    /// `/playground`), in registration order (spec.md §4.7
    /// `ApplyMiddlewarePublicMux`).
    fn apply_middleware_public_mux(&self, router: Router) -> Router {
        router
    }

    /// Wraps the router serving operator-facing routes (`/health`).
    fn apply_middleware_private_mux(&self, router: Router) -> Router {
        router
    }

    /// Runs once per inbound GraphQL request, before planning (spec.md
    /// §4.7 `GraphqlQueryPath`). `request_headers` are the client's
    /// original headers; plugins populate `context` for C3/C5 to read.
    async fn on_graphql_request(&self, _context: &RequestContext, _request_headers: &HeaderMap) -> Result<(), GatewayError> {
        Ok(())
    }
}

/// The ordered set of plugins configured for one gateway instance
/// (spec.md §4.7: plugins run in the order the config lists them).
#[derive(Default, Clone)]
pub struct PluginPipeline {
    plugins: Vec<Arc<dyn Plugin>>,
}

impl PluginPipeline {
    pub fn new(plugins: Vec<Arc<dyn Plugin>>) -> Self {
        Self { plugins }
    }

    pub fn public_mux(&self, router: Router) -> Router {
        self.plugins.iter().fold(router, |router, plugin| plugin.apply_middleware_public_mux(router))
    }

    pub fn private_mux(&self, router: Router) -> Router {
        self.plugins.iter().fold(router, |router, plugin| plugin.apply_middleware_private_mux(router))
    }

    pub async fn run_graphql_request(&self, context: &RequestContext, request_headers: &HeaderMap) -> Result<(), GatewayError> {
        for plugin in &self.plugins {
            plugin.on_graphql_request(context, request_headers).await?;
        }
        Ok(())
    }
}

/// Forwards a configured allowlist of inbound headers to every upstream
/// call (spec.md §11 supplemented "headers" plugin), e.g.:
/// ```yaml
/// plugins:
///   headers:
///     forward: [authorization, x-request-id]
/// ```
pub struct HeadersPlugin {
    forward: Vec<String>,
}

#[async_trait::async_trait]
impl Plugin for HeadersPlugin {
    async fn new(config: serde_json::Value) -> Result<Self, BoxError> {
        let forward = config
            .get("forward")
            .and_then(|v| v.as_array())
            .map(|items| items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
            .unwrap_or_default();
        Ok(Self { forward })
    }

    async fn on_graphql_request(&self, context: &RequestContext, request_headers: &HeaderMap) -> Result<(), GatewayError> {
        for name in &self.forward {
            if let Some(value) = request_headers.get(name) {
                context.add_outgoing_requests_header(name, value.clone());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn headers_plugin_forwards_only_configured_names() {
        let plugin = HeadersPlugin::new(serde_json::json!({ "forward": ["authorization"] })).await.unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer abc".parse().unwrap());
        headers.insert("x-other", "nope".parse().unwrap());
        let context = RequestContext::new();
        plugin.on_graphql_request(&context, &headers).await.unwrap();
        let forwarded = context.outgoing_headers();
        assert!(forwarded.contains_key("authorization"));
        assert!(!forwarded.contains_key("x-other"));
    }
}
