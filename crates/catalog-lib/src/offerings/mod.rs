//! Offering matrix
//!
//! Expands each shape into one offering per (zone, capacity type) pair,
//! priced from the price feed and flagged with launch availability.

mod pricing;
mod unavailable;

pub use pricing::{PriceEntry, StaticPriceProvider};
pub use unavailable::{UnavailableEntry, UnavailableOfferings, DEFAULT_UNAVAILABLE_TTL};

use crate::models::{CapacityType, Offering, Offerings, Shape};

/// Price feed for shapes
pub trait PriceProvider: Send + Sync {
    fn on_demand_price(&self, shape: &str) -> Option<f64>;

    fn spot_price(&self, shape: &str) -> Option<f64>;

    fn price(&self, shape: &str, capacity_type: CapacityType) -> Option<f64> {
        match capacity_type {
            CapacityType::OnDemand => self.on_demand_price(shape),
            CapacityType::Spot => self.spot_price(shape),
        }
    }
}

/// Record of offerings that recently failed to launch
pub trait UnavailabilityTracker: Send + Sync {
    fn is_unavailable(&self, shape: &str, zone: &str, capacity_type: CapacityType) -> bool;

    /// Bumped on every change to the tracked set
    fn seq_num(&self) -> u64;
}

/// Region-prefixed zones of a shape, or the single empty zone when the
/// shape is not zonal in `region`
pub fn zones(shape: &Shape, region: &str) -> Vec<String> {
    let mut zones: Vec<String> = shape
        .zones
        .get(region)
        .map(|zones| {
            zones
                .iter()
                .filter(|z| !z.is_empty())
                .map(|z| format!("{}-{}", region, z))
                .collect()
        })
        .unwrap_or_default();
    zones.sort();
    zones.dedup();

    if zones.is_empty() {
        zones.push(String::new());
    }
    zones
}

/// All offerings of a shape
///
/// A (zone, capacity type) pair without a price has no offering.
pub fn generate(
    shape: &Shape,
    region: &str,
    pricing: &dyn PriceProvider,
    tracker: &dyn UnavailabilityTracker,
) -> Offerings {
    let mut offerings = Vec::new();

    for zone in zones(shape, region) {
        for capacity_type in CapacityType::ALL {
            let Some(price) = pricing.price(&shape.name, capacity_type) else {
                continue;
            };
            offerings.push(Offering {
                available: !tracker.is_unavailable(&shape.name, &zone, capacity_type),
                zone: zone.clone(),
                capacity_type,
                price,
            });
        }
    }

    Offerings(offerings)
}
