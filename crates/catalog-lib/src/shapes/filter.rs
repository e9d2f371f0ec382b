//! Shape catalog filter
//!
//! Reduces the full shape list to the shapes nodes can actually be built
//! from. Filtering depends only on the shape and static configuration;
//! launch availability is layered on later through offerings.

use super::capabilities::{DiskController, GpuAllowList};
use super::size::ShapeSize;
use crate::config::DiskControllerMode;
use crate::models::Shape;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

pub const MIN_VCPUS: u64 = 2;

pub const MIN_MEMORY_GIB: f64 = 3.5;

/// Shapes the platform does not allow as cluster nodes
const PLATFORM_RESTRICTED: &[&str] = &[
    "Basic_A0",
    "Basic_A1",
    "Basic_A2",
    "Basic_A3",
    "Basic_A4",
    "Standard_A0",
    "Standard_A1",
    "Standard_A1_v2",
    "Standard_B1ls",
    "Standard_B1ms",
    "Standard_B1s",
    "Standard_F1",
    "Standard_F1s",
];

/// Shape names excluded regardless of their capabilities
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RestrictionSet {
    /// Imposed by the platform
    pub platform: BTreeSet<String>,
    /// Imposed by this deployment; empty unless configured
    pub system: BTreeSet<String>,
}

impl Default for RestrictionSet {
    fn default() -> Self {
        Self {
            platform: PLATFORM_RESTRICTED.iter().map(|s| s.to_string()).collect(),
            system: BTreeSet::new(),
        }
    }
}

impl RestrictionSet {
    pub fn is_restricted(&self, name: &str) -> bool {
        self.platform.contains(name) || self.system.contains(name)
    }
}

/// Why a shape was left out of the catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExclusionReason {
    Restricted,
    TooFewCpus,
    TooLittleMemory,
    ConstrainedCpu,
    Confidential,
    LocationRestricted,
    UnsupportedGpu,
    DiskController,
}

impl fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            ExclusionReason::Restricted => "restricted name",
            ExclusionReason::TooFewCpus => "fewer than minimum vCPUs",
            ExclusionReason::TooLittleMemory => "less than minimum memory",
            ExclusionReason::ConstrainedCpu => "constrained vCPU shape",
            ExclusionReason::Confidential => "confidential compute shape",
            ExclusionReason::LocationRestricted => "restricted in region",
            ExclusionReason::UnsupportedGpu => "GPU not on allow-list",
            ExclusionReason::DiskController => "incompatible disk controller",
        };
        f.write_str(reason)
    }
}

/// Static inclusion rules for shapes
#[derive(Debug, Clone)]
pub struct ShapeFilter {
    restrictions: RestrictionSet,
    gpu_allow_list: GpuAllowList,
    disk_controller_mode: DiskControllerMode,
}

impl ShapeFilter {
    pub fn new(
        restrictions: RestrictionSet,
        gpu_allow_list: GpuAllowList,
        disk_controller_mode: DiskControllerMode,
    ) -> Self {
        Self {
            restrictions,
            gpu_allow_list,
            disk_controller_mode,
        }
    }

    /// Checks that need nothing but the shape itself
    pub fn check(&self, shape: &Shape) -> Result<(), ExclusionReason> {
        if self.restrictions.is_restricted(&shape.name) {
            return Err(ExclusionReason::Restricted);
        }
        if shape.vcpus() < MIN_VCPUS {
            return Err(ExclusionReason::TooFewCpus);
        }
        if shape.memory_gib() < MIN_MEMORY_GIB {
            return Err(ExclusionReason::TooLittleMemory);
        }
        if ShapeSize::parse(&shape.name).is_ok_and(|size| size.is_constrained()) {
            return Err(ExclusionReason::ConstrainedCpu);
        }
        if shape.is_confidential() {
            return Err(ExclusionReason::Confidential);
        }
        if shape.has_gpu() && !self.gpu_allow_list.contains(&shape.name) {
            return Err(ExclusionReason::UnsupportedGpu);
        }
        if !self.disk_controller_compatible(shape) {
            return Err(ExclusionReason::DiskController);
        }
        Ok(())
    }

    fn disk_controller_compatible(&self, shape: &Shape) -> bool {
        let controllers = shape.disk_controllers();
        if controllers.is_empty() || controllers.contains(&DiskController::Scsi) {
            return true;
        }
        self.disk_controller_mode == DiskControllerMode::Nvme
            && controllers.contains(&DiskController::Nvme)
    }

    /// Keep the shapes passing every check, keyed by name
    pub fn retain(
        &self,
        shapes: Vec<Shape>,
        location_restricted: impl Fn(&Shape) -> bool,
    ) -> BTreeMap<String, Arc<Shape>> {
        let mut retained = BTreeMap::new();

        for shape in shapes {
            let verdict = self.check(&shape).and_then(|_| {
                if location_restricted(&shape) {
                    Err(ExclusionReason::LocationRestricted)
                } else {
                    Ok(())
                }
            });
            match verdict {
                Ok(()) => {
                    retained.insert(shape.name.clone(), Arc::new(shape));
                }
                Err(reason) => {
                    debug!(shape = %shape.name, %reason, "Excluding shape");
                }
            }
        }

        retained
    }
}
