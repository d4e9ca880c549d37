//! Configuration loading (spec.md §6 "CLI / env"), layered: built-in
//! defaults, then a YAML/JSON config file, then environment variables,
//! then CLI flags — each layer overriding the previous.

use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// `gateway --config path/to/gateway.yaml --log debug`
#[derive(Debug, Parser)]
#[command(name = "gateway", about = "GraphQL federation gateway")]
pub struct Cli {
    /// Path to a YAML or JSON config file.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Tracing filter, e.g. `info`, `gateway=debug`.
    #[arg(long, default_value = "info")]
    pub log: String,

    /// Overrides `addr` from the config file.
    #[arg(long)]
    pub addr: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Listen address (spec.md §6: default `:8080`).
    pub addr: String,
    pub services: Vec<String>,
    pub max_requests_per_operation: usize,
    pub max_request_bytes: usize,
    #[serde(with = "humantime_serde")]
    pub max_response_time: Duration,
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    pub plugins: serde_json::Value,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            addr: ":8080".to_string(),
            services: Vec::new(),
            max_requests_per_operation: 50,
            max_request_bytes: 2 * 1024 * 1024,
            max_response_time: Duration::from_secs(30),
            poll_interval: Duration::from_secs(5),
            plugins: serde_json::Value::Object(serde_json::Map::new()),
        }
    }
}

impl GatewayConfig {
    /// Loads defaults, merges in the config file named on the CLI (if
    /// any), then applies the `ADDR` environment variable and `--addr`
    /// flag, in that increasing order of precedence.
    pub fn load(cli: &Cli) -> anyhow::Result<Self> {
        let mut config = match &cli.config {
            Some(path) => {
                let contents = std::fs::read_to_string(path)
                    .map_err(|e| anyhow::anyhow!("could not read config file {}: {e}", path.display()))?;
                if path.extension().and_then(|e| e.to_str()) == Some("json") {
                    serde_json::from_str(&contents)?
                } else {
                    serde_yaml::from_str(&contents)?
                }
            }
            None => GatewayConfig::default(),
        };

        if let Ok(addr) = std::env::var("ADDR") {
            config.addr = addr;
        }
        if let Some(addr) = &cli.addr {
            config.addr = addr.clone();
        }

        Ok(config)
    }

    /// The plugin subtree named `name`, or `null` if the config declares
    /// none (spec.md §4.7: `Configure` is called with the plugin's config
    /// subtree).
    pub fn plugin_config(&self, name: &str) -> serde_json::Value {
        self.plugins.get(name).cloned().unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_values() {
        let config = GatewayConfig::default();
        assert_eq!(config.addr, ":8080");
        assert_eq!(config.max_requests_per_operation, 50);
        assert_eq!(config.poll_interval, Duration::from_secs(5));
    }

    #[test]
    fn plugin_config_defaults_to_null() {
        let config = GatewayConfig::default();
        assert_eq!(config.plugin_config("headers"), serde_json::Value::Null);
    }
}
