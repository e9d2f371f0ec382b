//! Agent configuration
//!
//! Read from an optional file named by `CATALOG_CONFIG`, then overlaid by
//! `CATALOG_*` environment variables. Nested keys use `__`, e.g.
//! `CATALOG_NODE__OS_DISK_SIZE_GB=64`.

use anyhow::{Context, Result};
use catalog_lib::{NodeConfig, ProviderOptions};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_PATH_ENV: &str = "CATALOG_CONFIG";

const ENV_PREFIX: &str = "CATALOG";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Cluster identity attached to lifecycle logs
    pub cluster_name: String,

    /// Port for the catalog, health and metrics endpoints
    pub api_port: u16,

    /// JSON array of shapes for the configured region
    pub shapes_path: PathBuf,

    /// JSON price table; without one no shape has offerings
    pub prices_path: Option<PathBuf>,

    /// How often expired cache entries and unavailable offerings are dropped
    pub sweep_interval_secs: u64,

    /// How often the price table is reloaded from disk
    pub price_reload_interval_secs: u64,

    pub provider: ProviderOptions,

    /// Node class the served catalog is resolved for
    pub node: NodeConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            cluster_name: "default".to_string(),
            api_port: 8080,
            shapes_path: PathBuf::from("/etc/catalog/shapes.json"),
            prices_path: None,
            sweep_interval_secs: 30,
            price_reload_interval_secs: 300,
            provider: ProviderOptions::default(),
            node: NodeConfig::default(),
        }
    }
}

impl AgentConfig {
    /// Load from the file named by `CATALOG_CONFIG`, if set, and the environment
    pub fn load() -> Result<Self> {
        let path = std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from);
        Self::load_from(path.as_deref())
    }

    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let settings = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read agent configuration")?;

        let config: AgentConfig = settings
            .try_deserialize()
            .context("Invalid agent configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.provider
            .validate()
            .context("Invalid provider options")?;
        self.node.validate().context("Invalid node configuration")?;
        if self.sweep_interval_secs == 0 {
            anyhow::bail!("sweep_interval_secs must be positive");
        }
        if self.price_reload_interval_secs == 0 {
            anyhow::bail!("price_reload_interval_secs must be positive");
        }
        Ok(())
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn price_reload_interval(&self) -> Duration {
        Duration::from_secs(self.price_reload_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog_lib::{ImageFamily, NetworkMode};
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = AgentConfig::default();
        assert_eq!(config.api_port, 8080);
        assert_eq!(config.node.os_disk_size_gb, 128);
        assert_eq!(config.provider.region, "westus2");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("agent.toml");
        std::fs::write(
            &path,
            r#"
cluster_name = "fleet-a"
api_port = 9090
shapes_path = "/data/shapes.json"
prices_path = "/data/prices.json"

[provider]
region = "eastus"
network_mode = "nodesubnet"

[node]
image_family = "AzureLinux"
os_disk_size_gb = 64

[node.kubelet]
max_pods = 50
"#,
        )
        .unwrap();

        let config = AgentConfig::load_from(Some(&path)).unwrap();
        assert_eq!(config.cluster_name, "fleet-a");
        assert_eq!(config.api_port, 9090);
        assert_eq!(config.prices_path, Some(PathBuf::from("/data/prices.json")));
        assert_eq!(config.provider.region, "eastus");
        assert_eq!(config.provider.network_mode, NetworkMode::NodeSubnet);
        assert_eq!(config.node.image_family, ImageFamily::AzureLinux);
        assert_eq!(config.node.os_disk_size_gb, 64);
        assert_eq!(config.node.kubelet.max_pods, Some(50));
        // Untouched sections keep their defaults
        assert_eq!(config.sweep_interval_secs, 30);
        assert!(!config.node.encryption_at_host);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("agent.toml");
        std::fs::write(&path, "[node]\nos_disk_size_gb = 0\n").unwrap();
        assert!(AgentConfig::load_from(Some(&path)).is_err());

        assert!(AgentConfig::load_from(Some(&temp_dir.path().join("missing.toml"))).is_err());
    }
}
