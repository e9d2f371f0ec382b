//! Typed accessors and predicates over a shape's capability map
//!
//! The platform reports every capability as a string. Parsing, unit
//! conversion and defaulting happen here so the rest of the pipeline
//! works with typed values. Every accessor is total: a missing or
//! malformed capability reads as "unsupported" (false, zero or empty).

use crate::models::Shape;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Capability names as reported by the platform
pub mod keys {
    pub const VCPUS: &str = "vCPUs";
    /// Labelled GB by the platform but actually GiB
    pub const MEMORY_GB: &str = "MemoryGB";
    pub const GPUS: &str = "GPUs";
    pub const PREMIUM_IO: &str = "PremiumIO";
    pub const ENCRYPTION_AT_HOST: &str = "EncryptionAtHostSupported";
    pub const ACCELERATED_NETWORKING: &str = "AcceleratedNetworkingEnabled";
    pub const HYPERV_GENERATIONS: &str = "HyperVGenerations";
    pub const EPHEMERAL_OS_DISK: &str = "EphemeralOSDiskSupported";
    pub const EPHEMERAL_PLACEMENTS: &str = "SupportedEphemeralOSDiskPlacements";
    pub const CACHED_DISK_BYTES: &str = "CachedDiskBytes";
    /// MiB, despite the name
    pub const MAX_RESOURCE_VOLUME_MB: &str = "MaxResourceVolumeMB";
    pub const NVME_DISK_SIZE_MIB: &str = "NvmeDiskSizeInMiB";
    pub const DISK_CONTROLLER_TYPES: &str = "DiskControllerTypes";
}

/// Name prefixes of confidential-compute shapes
const CONFIDENTIAL_PREFIXES: &[&str] = &["Standard_DC", "Standard_EC"];

/// Suffix carried by promotional shapes that otherwise match a regular shape
const PROMO_SUFFIX: &str = "_promo";

/// Platform architecture name -> Kubernetes architecture name
const ARCHITECTURES: &[(&str, &str)] = &[("x64", "amd64"), ("Arm64", "arm64")];

/// Map a platform architecture to its Kubernetes name; unknown values pass through
pub fn normalize_architecture(arch: &str) -> String {
    ARCHITECTURES
        .iter()
        .find(|(platform, _)| *platform == arch)
        .map(|(_, normalized)| normalized.to_string())
        .unwrap_or_else(|| arch.to_string())
}

/// VM generation the hypervisor boots the shape as
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum HyperVGeneration {
    V1,
    V2,
}

impl HyperVGeneration {
    pub fn as_str(&self) -> &'static str {
        match self {
            HyperVGeneration::V1 => "V1",
            HyperVGeneration::V2 => "V2",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "V1" => Some(HyperVGeneration::V1),
            "V2" => Some(HyperVGeneration::V2),
            _ => None,
        }
    }
}

impl fmt::Display for HyperVGeneration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Disk controller interface a shape can attach its OS disk through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiskController {
    Scsi,
    Nvme,
}

/// GPU model attached to an allow-listed shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GpuModel {
    pub manufacturer: String,
    pub name: String,
}

/// Shapes whose GPUs the node image has drivers for
///
/// Keys are shape names, matched case-insensitively with any promotional
/// suffix removed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GpuAllowList {
    entries: HashMap<String, GpuModel>,
}

const DEFAULT_GPU_SHAPES: &[(&str, &str, &str)] = &[
    ("Standard_NC6s_v3", "nvidia", "V100"),
    ("Standard_NC12s_v3", "nvidia", "V100"),
    ("Standard_NC24s_v3", "nvidia", "V100"),
    ("Standard_NC24rs_v3", "nvidia", "V100"),
    ("Standard_ND40rs_v2", "nvidia", "V100"),
    ("Standard_NC4as_T4_v3", "nvidia", "T4"),
    ("Standard_NC8as_T4_v3", "nvidia", "T4"),
    ("Standard_NC16as_T4_v3", "nvidia", "T4"),
    ("Standard_NC64as_T4_v3", "nvidia", "T4"),
    ("Standard_NC24ads_A100_v4", "nvidia", "A100"),
    ("Standard_NC48ads_A100_v4", "nvidia", "A100"),
    ("Standard_NC96ads_A100_v4", "nvidia", "A100"),
    ("Standard_ND96asr_v4", "nvidia", "A100"),
    ("Standard_ND96amsr_A100_v4", "nvidia", "A100"),
    ("Standard_NC40ads_H100_v5", "nvidia", "H100"),
    ("Standard_NC80adis_H100_v5", "nvidia", "H100"),
    ("Standard_ND96isr_H100_v5", "nvidia", "H100"),
    ("Standard_NV6ads_A10_v5", "nvidia", "A10"),
    ("Standard_NV12ads_A10_v5", "nvidia", "A10"),
    ("Standard_NV18ads_A10_v5", "nvidia", "A10"),
    ("Standard_NV36ads_A10_v5", "nvidia", "A10"),
    ("Standard_NV72ads_A10_v5", "nvidia", "A10"),
];

impl Default for GpuAllowList {
    fn default() -> Self {
        Self::from_entries(
            DEFAULT_GPU_SHAPES
                .iter()
                .map(|(name, manufacturer, model)| {
                    (
                        name.to_string(),
                        GpuModel {
                            manufacturer: manufacturer.to_string(),
                            name: model.to_string(),
                        },
                    )
                }),
        )
    }
}

impl GpuAllowList {
    pub fn from_entries(entries: impl IntoIterator<Item = (String, GpuModel)>) -> Self {
        Self {
            entries: entries
                .into_iter()
                .map(|(name, model)| (normalize_shape_name(&name), model))
                .collect(),
        }
    }

    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn lookup(&self, shape_name: &str) -> Option<&GpuModel> {
        self.entries.get(&normalize_shape_name(shape_name))
    }

    pub fn contains(&self, shape_name: &str) -> bool {
        self.lookup(shape_name).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Lowercase a shape name and strip a promotional suffix
pub fn normalize_shape_name(name: &str) -> String {
    let lower = name.to_ascii_lowercase();
    match lower.strip_suffix(PROMO_SUFFIX) {
        Some(stripped) => stripped.to_string(),
        None => lower,
    }
}

impl Shape {
    pub fn capability(&self, key: &str) -> Option<&str> {
        self.capabilities.get(key).map(|v| v.trim())
    }

    pub fn capability_bool(&self, key: &str) -> bool {
        self.capability(key)
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    pub fn capability_u64(&self, key: &str) -> Option<u64> {
        self.capability(key).and_then(|v| v.parse().ok())
    }

    pub fn capability_f64(&self, key: &str) -> Option<f64> {
        self.capability(key)
            .and_then(|v| v.parse::<f64>().ok())
            .filter(|v| v.is_finite() && *v >= 0.0)
    }

    /// Comma separated capability as trimmed, non-empty items
    pub fn capability_list(&self, key: &str) -> Vec<&str> {
        self.capability(key)
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn vcpus(&self) -> u64 {
        self.capability_u64(keys::VCPUS).unwrap_or(0)
    }

    pub fn memory_gib(&self) -> f64 {
        self.capability_f64(keys::MEMORY_GB).unwrap_or(0.0)
    }

    /// Memory in MiB, correcting the platform's GB label
    pub fn memory_mib(&self) -> u64 {
        (self.memory_gib() * 1024.0).round() as u64
    }

    pub fn gpu_count(&self) -> u64 {
        self.capability_u64(keys::GPUS).unwrap_or(0)
    }

    pub fn has_gpu(&self) -> bool {
        self.gpu_count() > 0
    }

    pub fn supports_premium_storage(&self) -> bool {
        self.capability_bool(keys::PREMIUM_IO)
    }

    pub fn supports_encryption_at_host(&self) -> bool {
        self.capability_bool(keys::ENCRYPTION_AT_HOST)
    }

    pub fn supports_accelerated_networking(&self) -> bool {
        self.capability_bool(keys::ACCELERATED_NETWORKING)
    }

    /// Supported generations, sorted and de-duplicated
    pub fn hyperv_generations(&self) -> Vec<HyperVGeneration> {
        let mut generations: Vec<HyperVGeneration> = self
            .capability_list(keys::HYPERV_GENERATIONS)
            .into_iter()
            .filter_map(HyperVGeneration::parse)
            .collect();
        generations.sort();
        generations.dedup();
        generations
    }

    pub fn is_confidential(&self) -> bool {
        CONFIDENTIAL_PREFIXES
            .iter()
            .any(|prefix| self.name.starts_with(prefix))
    }

    pub fn disk_controllers(&self) -> Vec<DiskController> {
        self.capability_list(keys::DISK_CONTROLLER_TYPES)
            .into_iter()
            .filter_map(|c| match c.to_ascii_uppercase().as_str() {
                "SCSI" => Some(DiskController::Scsi),
                "NVME" => Some(DiskController::Nvme),
                _ => None,
            })
            .collect()
    }

    /// Kubernetes architecture name of this shape
    pub fn normalized_architecture(&self) -> String {
        normalize_architecture(&self.architecture)
    }
}
