//! Catalog configuration
//!
//! `ProviderOptions` is process-wide and fixed at construction time.
//! `NodeConfig` describes the node class a catalog is resolved for and may
//! differ between requests; every field of it that changes the produced
//! catalog is folded into the catalog cache key.

use crate::error::{CatalogError, CatalogResult};
use crate::shapes::{GpuAllowList, HyperVGeneration, RestrictionSet};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::time::Duration;

/// Shape catalogs change rarely, refresh them about once a day
pub const DEFAULT_SHAPE_CACHE_TTL: Duration = Duration::from_secs(23 * 60 * 60);

/// Upper bound on how long one assembled catalog is reused
pub const DEFAULT_CATALOG_TTL: Duration = Duration::from_secs(5 * 60);

/// Share of VM memory lost to the hypervisor
pub const DEFAULT_VM_MEMORY_OVERHEAD_PERCENT: f64 = 0.075;

pub const DEFAULT_OS_DISK_SIZE_GB: u64 = 128;

/// How pod IPs are assigned, which bounds the default pod density
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkMode {
    /// No managed CNI; the cluster brings its own
    #[serde(rename = "none")]
    NoPlugin,
    /// Pod IPs come from a private overlay range
    #[default]
    Overlay,
    /// Pod IPs are allocated from the node subnet
    NodeSubnet,
    /// Anything else, including kubenet
    #[serde(other)]
    Kubenet,
}

impl NetworkMode {
    pub fn default_max_pods(&self) -> u64 {
        match self {
            NetworkMode::NoPlugin => 250,
            NetworkMode::Overlay => 250,
            NetworkMode::NodeSubnet => 30,
            NetworkMode::Kubenet => 110,
        }
    }
}

/// Disk controller types the node image can boot from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiskControllerMode {
    #[default]
    Scsi,
    /// SCSI and NVMe
    Nvme,
}

/// Node image family
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImageFamily {
    #[default]
    Ubuntu2204,
    AzureLinux,
}

impl ImageFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageFamily::Ubuntu2204 => "Ubuntu2204",
            ImageFamily::AzureLinux => "AzureLinux",
        }
    }

    /// HyperV generations this family publishes images for on `arch`
    /// (normalized architecture, e.g. `amd64`)
    pub fn supported_generations(&self, arch: &str) -> &'static [HyperVGeneration] {
        match (self, arch) {
            (_, "arm64") => &[HyperVGeneration::V2],
            (_, "amd64") => &[HyperVGeneration::V1, HyperVGeneration::V2],
            _ => &[],
        }
    }

    /// Whether an image of this family can boot a shape with the given
    /// architecture and supported generations
    pub fn is_compatible(&self, arch: &str, generations: &[HyperVGeneration]) -> bool {
        self.supported_generations(arch)
            .iter()
            .any(|g| generations.contains(g))
    }
}

/// Process-wide options for the catalog provider
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderOptions {
    pub region: String,
    pub network_mode: NetworkMode,
    pub vm_memory_overhead_percent: f64,
    pub disk_controller_mode: DiskControllerMode,
    pub shape_cache_ttl_secs: u64,
    pub catalog_ttl_secs: u64,
    pub restrictions: RestrictionSet,
    pub gpu_allow_list: GpuAllowList,
}

impl Default for ProviderOptions {
    fn default() -> Self {
        Self {
            region: "westus2".to_string(),
            network_mode: NetworkMode::default(),
            vm_memory_overhead_percent: DEFAULT_VM_MEMORY_OVERHEAD_PERCENT,
            disk_controller_mode: DiskControllerMode::default(),
            shape_cache_ttl_secs: DEFAULT_SHAPE_CACHE_TTL.as_secs(),
            catalog_ttl_secs: DEFAULT_CATALOG_TTL.as_secs(),
            restrictions: RestrictionSet::default(),
            gpu_allow_list: GpuAllowList::default(),
        }
    }
}

impl ProviderOptions {
    pub fn shape_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.shape_cache_ttl_secs)
    }

    pub fn catalog_ttl(&self) -> Duration {
        Duration::from_secs(self.catalog_ttl_secs)
    }

    pub fn validate(&self) -> CatalogResult<()> {
        if self.region.is_empty() {
            return Err(CatalogError::Config("region must not be empty".into()));
        }
        if !(0.0..1.0).contains(&self.vm_memory_overhead_percent) {
            return Err(CatalogError::Config(format!(
                "vm_memory_overhead_percent must be in [0, 1), got {}",
                self.vm_memory_overhead_percent
            )));
        }
        Ok(())
    }
}

/// Kubelet settings of the node class
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct KubeletConfig {
    pub max_pods: Option<u32>,
    pub pods_per_core: Option<u32>,
    pub cpu_manager_policy: Option<String>,
    pub topology_manager_policy: Option<String>,
    pub image_gc_high_threshold_percent: Option<u8>,
    pub image_gc_low_threshold_percent: Option<u8>,
}

impl KubeletConfig {
    /// Stable digest of the kubelet settings, for cache keys
    pub fn hash(&self) -> CatalogResult<String> {
        let encoded = serde_json::to_vec(self)
            .map_err(|e| CatalogError::Config(format!("failed to encode kubelet config: {}", e)))?;
        let digest = Sha256::digest(&encoded);
        Ok(hex::encode(&digest[..8]))
    }
}

/// Node class a catalog is resolved for
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub image_family: ImageFamily,
    pub os_disk_size_gb: u64,
    pub encryption_at_host: bool,
    pub kubelet: KubeletConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            image_family: ImageFamily::default(),
            os_disk_size_gb: DEFAULT_OS_DISK_SIZE_GB,
            encryption_at_host: false,
            kubelet: KubeletConfig::default(),
        }
    }
}

impl NodeConfig {
    pub fn validate(&self) -> CatalogResult<()> {
        if self.os_disk_size_gb == 0 {
            return Err(CatalogError::Config("os_disk_size_gb must be positive".into()));
        }
        Ok(())
    }
}
