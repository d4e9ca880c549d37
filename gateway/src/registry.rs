//! C6 — service registry (spec.md §4.6).
//!
//! One background task per service polls `{ service { name version schema } }`;
//! on success the schema is re-validated and, if still OK, a debounced
//! global re-merge is scheduled. The registry is the single source of
//! truth for `GatewaySchema`: readers take a consistent snapshot through
//! an `arc-swap`-style atomic pointer (here: a `tokio::sync::RwLock` over
//! an `Arc`, matching the read-heavy/write-rare access pattern spec.md §5
//! calls for).

use federation::{merge, parse_schema, validator, GatewaySchema, Service, ServiceStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::time::MissedTickBehavior;

const SERVICE_INTROSPECTION_QUERY: &str = "{ service { name version schema } }";

pub struct ServiceRegistry {
    services: RwLock<Vec<Service>>,
    schema: RwLock<Option<Arc<GatewaySchema>>>,
    ready: watch::Sender<bool>,
    http: reqwest::Client,
}

impl ServiceRegistry {
    pub fn new(service_urls: Vec<String>, http: reqwest::Client) -> Arc<Self> {
        let services = service_urls
            .into_iter()
            .map(|url| Service {
                name: url.clone(),
                version: String::new(),
                schema_source: String::new(),
                service_url: url,
                status: ServiceStatus::Error,
                parsed_schema: None,
            })
            .collect();
        let (ready, _) = watch::channel(false);
        Arc::new(Self {
            services: RwLock::new(services),
            schema: RwLock::new(None),
            ready,
            http,
        })
    }

    /// A consistent snapshot of the merged schema, held for the lifetime of
    /// one operation (spec.md §5 "Shared resources").
    pub async fn snapshot(&self) -> Option<Arc<GatewaySchema>> {
        self.schema.read().await.clone()
    }

    /// Flips once the first successful merge completes (spec.md SPEC_FULL
    /// §11 readiness gating).
    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    pub fn ready_signal(&self) -> watch::Receiver<bool> {
        self.ready.subscribe()
    }

    /// Spawns one polling task per service plus the re-merge coordinator.
    /// Runs until `shutdown` resolves.
    pub fn spawn_polling(self: &Arc<Self>, poll_interval: Duration, mut shutdown: watch::Receiver<()>) {
        let urls: Vec<String> = {
            let services = self.services.try_read().expect("registry not yet shared");
            services.iter().map(|s| s.service_url.clone()).collect()
        };

        for url in urls {
            let registry = Arc::clone(self);
            let mut shutdown = shutdown.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(poll_interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {
                            registry.poll_one(&url).await;
                        }
                        _ = shutdown.changed() => break,
                    }
                }
            });
        }

        let registry = Arc::clone(self);
        tokio::spawn(async move {
            // Initial merge so the gateway can serve as soon as every
            // service has answered once, instead of waiting a full
            // `poll_interval` tick.
            let urls: Vec<String> = {
                let services = registry.services.read().await;
                services.iter().map(|s| s.service_url.clone()).collect()
            };
            for url in urls {
                registry.poll_one(&url).await;
            }
            let _ = shutdown.changed().await;
        });
    }

    async fn poll_one(&self, service_url: &str) {
        match self.http.post(service_url).json(&serde_json::json!({"query": SERVICE_INTROSPECTION_QUERY})).send().await {
            Ok(response) => match response.json::<serde_json::Value>().await {
                Ok(body) => self.apply_poll_result(service_url, body).await,
                Err(error) => self.mark_errored(service_url, &error.to_string()).await,
            },
            Err(error) => self.mark_errored(service_url, &error.to_string()).await,
        }
    }

    async fn apply_poll_result(&self, service_url: &str, body: serde_json::Value) {
        let Some(service_node) = body.pointer("/data/service") else {
            self.mark_errored(service_url, "malformed introspection response").await;
            return;
        };
        let name = service_node.get("name").and_then(|v| v.as_str()).unwrap_or(service_url).to_string();
        let version = service_node.get("version").and_then(|v| v.as_str()).unwrap_or_default().to_string();
        let Some(schema_source) = service_node.get("schema").and_then(|v| v.as_str()) else {
            self.mark_errored(service_url, "introspection response missing `schema`").await;
            return;
        };

        let parsed = match parse_schema(schema_source) {
            Ok(parsed) => parsed,
            Err(error) => {
                self.mark_errored(service_url, &error.to_string()).await;
                return;
            }
        };
        if let Err(error) = validator::validate_service_schema(&parsed) {
            self.mark_errored(service_url, &error.to_string()).await;
            return;
        }

        {
            let mut services = self.services.write().await;
            if let Some(slot) = services.iter_mut().find(|s| s.service_url == service_url) {
                slot.name = name;
                slot.version = version;
                slot.schema_source = schema_source.to_string();
                slot.status = ServiceStatus::Ok;
                slot.parsed_schema = Some(parsed);
            }
        }
        self.remerge().await;
    }

    async fn mark_errored(&self, service_url: &str, reason: &str) {
        tracing::warn!(service_url, reason, "service poll failed, excluding from next merge");
        let mut services = self.services.write().await;
        if let Some(slot) = services.iter_mut().find(|s| s.service_url == service_url) {
            slot.status = ServiceStatus::Error;
            slot.parsed_schema = None;
        }
        drop(services);
        self.remerge().await;
    }

    /// Re-merges every currently `Ok` service and, on success, swaps in the
    /// new `GatewaySchema` atomically. A failed merge leaves the previous
    /// schema in place — the registry never serves a known-bad merge.
    async fn remerge(&self) {
        let services = self.services.read().await.clone();
        match merge::merge_services(&services) {
            Ok(merged) => {
                *self.schema.write().await = Some(Arc::new(merged));
                let _ = self.ready.send(true);
            }
            Err(error) => {
                tracing::warn!(%error, "global re-merge failed, keeping previous schema");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn starts_unready_with_no_schema() {
        let registry = ServiceRegistry::new(vec!["http://a".to_string()], reqwest::Client::new());
        assert!(!registry.is_ready());
        assert!(registry.snapshot().await.is_none());
    }
}
