//! Ephemeral OS disk placement
//!
//! A shape can back an ephemeral OS disk with local NVMe, its cache disk
//! or its resource (temp) disk. The selector picks the first usable
//! medium in that order and reports how large the OS disk may be.

use super::capabilities::keys;
use super::size::ShapeSize;
use crate::config::DEFAULT_OS_DISK_SIZE_GB;
use crate::models::{Shape, GIB};
use serde::{Deserialize, Serialize};

/// Series whose capability flags claim ephemeral OS disk support that
/// provisioning rejects
const EPHEMERAL_UNSUPPORTED_SERIES: &str = "Dpdsv6";

/// Placement value listed by shapes that can host the OS disk on NVMe
const NVME_PLACEMENT: &str = "NvmeDisk";

/// Local medium backing the OS disk
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EphemeralPlacement {
    /// No local backing; the OS disk is a managed disk
    #[default]
    None,
    Nvme,
    CacheDisk,
    ResourceDisk,
}

/// Maximum ephemeral OS disk size and the medium backing it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EphemeralDisk {
    pub max_size_gb: u64,
    pub placement: EphemeralPlacement,
}

impl EphemeralDisk {
    pub const NONE: EphemeralDisk = EphemeralDisk {
        max_size_gb: 0,
        placement: EphemeralPlacement::None,
    };

    fn new(max_size_gb: u64, placement: EphemeralPlacement) -> Self {
        Self {
            max_size_gb,
            placement,
        }
    }
}

fn supports_ephemeral_os_disk(shape: &Shape) -> bool {
    if !shape.capability_bool(keys::EPHEMERAL_OS_DISK) {
        return false;
    }
    match ShapeSize::parse(&shape.name) {
        Ok(size) => size.series() != EPHEMERAL_UNSUPPORTED_SERIES,
        Err(_) => true,
    }
}

fn lists_nvme_placement(shape: &Shape) -> bool {
    shape
        .capability_list(keys::EPHEMERAL_PLACEMENTS)
        .iter()
        .any(|p| p.eq_ignore_ascii_case(NVME_PLACEMENT))
}

/// Pick the ephemeral OS disk medium for a shape
pub fn ephemeral_disk(shape: &Shape) -> EphemeralDisk {
    if !supports_ephemeral_os_disk(shape) {
        return EphemeralDisk::NONE;
    }

    let nvme_gb = shape.capability_u64(keys::NVME_DISK_SIZE_MIB).unwrap_or(0) / 1024;
    if nvme_gb > 0 && lists_nvme_placement(shape) {
        return EphemeralDisk::new(nvme_gb, EphemeralPlacement::Nvme);
    }

    let cache_gb = shape.capability_u64(keys::CACHED_DISK_BYTES).unwrap_or(0) / GIB;
    if cache_gb > 0 {
        return EphemeralDisk::new(cache_gb, EphemeralPlacement::CacheDisk);
    }

    let resource_gb = shape
        .capability_u64(keys::MAX_RESOURCE_VOLUME_MB)
        .unwrap_or(0)
        / 1024;
    if resource_gb > 0 {
        return EphemeralDisk::new(resource_gb, EphemeralPlacement::ResourceDisk);
    }

    EphemeralDisk::NONE
}

/// OS disk a node of this instance type boots with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OsDiskPlan {
    pub size_gb: u64,
    pub placement: EphemeralPlacement,
}

impl OsDiskPlan {
    pub fn is_ephemeral(&self) -> bool {
        self.placement != EphemeralPlacement::None
    }
}

/// Use the ephemeral medium only when the requested OS disk fits on it
///
/// A request larger than the ephemeral maximum falls back to a managed disk
/// of [`DEFAULT_OS_DISK_SIZE_GB`]. Shapes without any ephemeral medium keep
/// the requested size on a managed disk.
pub fn select_os_disk(requested_gb: u64, disk: EphemeralDisk) -> OsDiskPlan {
    match disk.placement {
        EphemeralPlacement::None => OsDiskPlan {
            size_gb: requested_gb,
            placement: EphemeralPlacement::None,
        },
        placement if requested_gb <= disk.max_size_gb => OsDiskPlan {
            size_gb: requested_gb,
            placement,
        },
        _ => OsDiskPlan {
            size_gb: DEFAULT_OS_DISK_SIZE_GB,
            placement: EphemeralPlacement::None,
        },
    }
}
