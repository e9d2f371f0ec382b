//! Instance-type resolution and availability for fleet autoscaling
//!
//! This crate turns a raw catalog of compute shapes into the annotated,
//! availability-aware instance-type catalog a scheduler packs workloads
//! against:
//! - Shape filtering and typed capability access
//! - Scheduling requirement derivation
//! - Capacity and reserved overhead
//! - Zone and capacity-type offerings with prices and availability
//! - Change-aware caching of the assembled catalog
//! - Health checks and observability

pub mod catalog;
pub mod config;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod offerings;
pub mod requirements;
pub mod resources;
pub mod shapes;

#[cfg(test)]
mod fixtures;

pub use catalog::{InstanceTypeProvider, SkipReason, TtlCache};
pub use config::{ImageFamily, KubeletConfig, NetworkMode, NodeConfig, ProviderOptions};
pub use error::{CatalogError, CatalogResult};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{CatalogMetrics, StructuredLogger};
pub use offerings::{
    PriceProvider, StaticPriceProvider, UnavailabilityTracker, UnavailableOfferings,
};
pub use requirements::{Operator, Requirement, Requirements};
pub use shapes::{FileShapeSource, ShapeCatalog, ShapeSource};
