//! Core data models for the instance-type catalog

use crate::requirements::Requirements;
use crate::shapes::OsDiskPlan;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Bytes in one mebibyte
pub const MIB: u64 = 1024 * 1024;

/// Bytes in one gibibyte
pub const GIB: u64 = 1024 * MIB;

/// Static descriptor of a compute shape as reported by the shape source
///
/// Shapes are never mutated by the catalog; typed accessors over the
/// capability map live in [`crate::shapes::capabilities`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shape {
    /// Full shape name, e.g. `Standard_D4s_v3`
    pub name: String,
    /// Resource family reported by the platform, e.g. `standardDSv3Family`
    #[serde(default)]
    pub family: String,
    /// Platform CPU architecture string, e.g. `x64` or `Arm64`
    #[serde(default)]
    pub architecture: String,
    /// Raw capability name -> value pairs
    #[serde(default)]
    pub capabilities: BTreeMap<String, String>,
    /// Region -> zone identifiers (without region prefix) the shape is offered in
    #[serde(default)]
    pub zones: BTreeMap<String, Vec<String>>,
    /// Regions in which this subscription may not launch the shape
    #[serde(default)]
    pub restricted_regions: Vec<String>,
}

/// Quantities for the fixed set of schedulable resources
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceList {
    pub cpu_millicores: u64,
    pub memory_bytes: u64,
    pub pods: u64,
    pub ephemeral_storage_bytes: u64,
    pub gpus: u64,
}

impl ResourceList {
    pub fn saturating_sub(&self, other: &ResourceList) -> ResourceList {
        ResourceList {
            cpu_millicores: self.cpu_millicores.saturating_sub(other.cpu_millicores),
            memory_bytes: self.memory_bytes.saturating_sub(other.memory_bytes),
            pods: self.pods.saturating_sub(other.pods),
            ephemeral_storage_bytes: self
                .ephemeral_storage_bytes
                .saturating_sub(other.ephemeral_storage_bytes),
            gpus: self.gpus.saturating_sub(other.gpus),
        }
    }

    pub fn saturating_add(&self, other: &ResourceList) -> ResourceList {
        ResourceList {
            cpu_millicores: self.cpu_millicores.saturating_add(other.cpu_millicores),
            memory_bytes: self.memory_bytes.saturating_add(other.memory_bytes),
            pods: self.pods.saturating_add(other.pods),
            ephemeral_storage_bytes: self
                .ephemeral_storage_bytes
                .saturating_add(other.ephemeral_storage_bytes),
            gpus: self.gpus.saturating_add(other.gpus),
        }
    }
}

/// Resources withheld from a node's allocatable capacity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Overhead {
    pub kube_reserved: ResourceList,
    pub system_reserved: ResourceList,
    pub eviction_threshold: ResourceList,
}

impl Overhead {
    pub fn total(&self) -> ResourceList {
        self.kube_reserved
            .saturating_add(&self.system_reserved)
            .saturating_add(&self.eviction_threshold)
    }
}

/// Purchasing mode for capacity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CapacityType {
    OnDemand,
    Spot,
}

impl CapacityType {
    pub const ALL: [CapacityType; 2] = [CapacityType::OnDemand, CapacityType::Spot];

    pub fn as_str(&self) -> &'static str {
        match self {
            CapacityType::OnDemand => "on-demand",
            CapacityType::Spot => "spot",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "on-demand" => Some(CapacityType::OnDemand),
            "spot" => Some(CapacityType::Spot),
            _ => None,
        }
    }
}

impl fmt::Display for CapacityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One (zone, capacity type) launch option for an instance type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Offering {
    /// Region-prefixed zone, or empty for shapes that are not zonal
    pub zone: String,
    pub capacity_type: CapacityType,
    pub price: f64,
    pub available: bool,
}

/// Offerings of one instance type, at most one per (zone, capacity type)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Offerings(pub Vec<Offering>);

impl Offerings {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Offering> {
        self.0.iter()
    }

    pub fn available(&self) -> impl Iterator<Item = &Offering> {
        self.0.iter().filter(|o| o.available)
    }

    /// Cheapest available offering
    pub fn cheapest(&self) -> Option<&Offering> {
        self.available()
            .min_by(|a, b| a.price.total_cmp(&b.price))
    }

    /// Distinct zones across all offerings, sorted
    pub fn zones(&self) -> Vec<String> {
        let mut zones: Vec<String> = self.0.iter().map(|o| o.zone.clone()).collect();
        zones.sort();
        zones.dedup();
        zones
    }

    /// Distinct capacity types across all offerings, sorted
    pub fn capacity_types(&self) -> Vec<CapacityType> {
        let mut types: Vec<CapacityType> = self.0.iter().map(|o| o.capacity_type).collect();
        types.sort();
        types.dedup();
        types
    }
}

/// A fully annotated instance type as served to the scheduler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceType {
    pub name: String,
    pub requirements: Requirements,
    pub capacity: ResourceList,
    pub overhead: Overhead,
    pub offerings: Offerings,
    pub os_disk: OsDiskPlan,
}

impl InstanceType {
    /// Capacity left for workloads after all reservations
    pub fn allocatable(&self) -> ResourceList {
        self.capacity.saturating_sub(&self.overhead.total())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offering(zone: &str, capacity_type: CapacityType, price: f64, available: bool) -> Offering {
        Offering {
            zone: zone.to_string(),
            capacity_type,
            price,
            available,
        }
    }

    #[test]
    fn test_cheapest_ignores_unavailable() {
        let offerings = Offerings(vec![
            offering("westus2-1", CapacityType::Spot, 0.02, false),
            offering("westus2-1", CapacityType::OnDemand, 0.10, true),
            offering("westus2-2", CapacityType::Spot, 0.03, true),
        ]);

        let cheapest = offerings.cheapest().unwrap();
        assert_eq!(cheapest.zone, "westus2-2");
        assert_eq!(cheapest.capacity_type, CapacityType::Spot);
    }

    #[test]
    fn test_zones_and_capacity_types_are_distinct() {
        let offerings = Offerings(vec![
            offering("westus2-2", CapacityType::Spot, 0.03, true),
            offering("westus2-1", CapacityType::OnDemand, 0.10, true),
            offering("westus2-1", CapacityType::Spot, 0.02, true),
        ]);

        assert_eq!(offerings.zones(), vec!["westus2-1", "westus2-2"]);
        assert_eq!(
            offerings.capacity_types(),
            vec![CapacityType::OnDemand, CapacityType::Spot]
        );
    }

    #[test]
    fn test_capacity_type_round_trips_through_str() {
        for ct in CapacityType::ALL {
            assert_eq!(CapacityType::parse(ct.as_str()), Some(ct));
        }
        assert_eq!(CapacityType::parse("reserved"), None);
    }

    #[test]
    fn test_overhead_total_and_allocatable_saturate() {
        let overhead = Overhead {
            kube_reserved: ResourceList {
                cpu_millicores: 140,
                memory_bytes: 1638 * MIB,
                ..Default::default()
            },
            system_reserved: ResourceList::default(),
            eviction_threshold: ResourceList {
                memory_bytes: 750 * MIB,
                ..Default::default()
            },
        };
        let total = overhead.total();
        assert_eq!(total.cpu_millicores, 140);
        assert_eq!(total.memory_bytes, 2388 * MIB);

        let tiny = ResourceList {
            cpu_millicores: 100,
            memory_bytes: GIB,
            ..Default::default()
        };
        let left = tiny.saturating_sub(&total);
        assert_eq!(left.cpu_millicores, 0);
        assert_eq!(left.memory_bytes, 0);
    }
}
