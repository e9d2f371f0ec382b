//! Shared test fixtures

use crate::models::Shape;
use crate::offerings::StaticPriceProvider;
use crate::shapes::{keys, ShapeSource};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub const REGION: &str = "westus2";

pub struct ShapeBuilder {
    shape: Shape,
}

impl ShapeBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            shape: Shape {
                name: name.to_string(),
                family: String::new(),
                architecture: String::new(),
                capabilities: BTreeMap::new(),
                zones: BTreeMap::new(),
                restricted_regions: Vec::new(),
            },
        }
    }

    /// A typical general-purpose x64 shape offered in three zones
    pub fn general(name: &str, vcpus: u64, memory_gib: f64) -> Self {
        Self::new(name)
            .family("standardDSv3Family")
            .architecture("x64")
            .capability(keys::VCPUS, &vcpus.to_string())
            .capability(keys::MEMORY_GB, &memory_gib.to_string())
            .capability(keys::PREMIUM_IO, "True")
            .capability(keys::ACCELERATED_NETWORKING, "True")
            .capability(keys::ENCRYPTION_AT_HOST, "True")
            .capability(keys::HYPERV_GENERATIONS, "V1,V2")
            .zones(REGION, &["1", "2", "3"])
    }

    pub fn family(mut self, family: &str) -> Self {
        self.shape.family = family.to_string();
        self
    }

    pub fn architecture(mut self, arch: &str) -> Self {
        self.shape.architecture = arch.to_string();
        self
    }

    pub fn capability(mut self, key: &str, value: &str) -> Self {
        self.shape
            .capabilities
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn without_capability(mut self, key: &str) -> Self {
        self.shape.capabilities.remove(key);
        self
    }

    pub fn zones(mut self, region: &str, zones: &[&str]) -> Self {
        self.shape.zones.insert(
            region.to_string(),
            zones.iter().map(|z| z.to_string()).collect(),
        );
        self
    }

    pub fn restricted_in(mut self, region: &str) -> Self {
        self.shape.restricted_regions.push(region.to_string());
        self
    }

    pub fn build(self) -> Shape {
        self.shape
    }
}

/// In-memory shape source that counts upstream calls
#[derive(Default)]
pub struct StaticShapeSource {
    shapes: Mutex<Vec<Shape>>,
    calls: AtomicUsize,
    failing: AtomicBool,
    delay: Option<Duration>,
}

impl StaticShapeSource {
    pub fn new(shapes: Vec<Shape>) -> Self {
        Self {
            shapes: Mutex::new(shapes),
            ..Default::default()
        }
    }

    pub fn with_delay(shapes: Vec<Shape>, delay: Duration) -> Self {
        Self {
            shapes: Mutex::new(shapes),
            delay: Some(delay),
            ..Default::default()
        }
    }

    pub fn set_shapes(&self, shapes: Vec<Shape>) {
        *self.shapes.lock().unwrap() = shapes;
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ShapeSource for StaticShapeSource {
    async fn list(
        &self,
        _region: &str,
        include: &(dyn for<'s> Fn(&'s Shape) -> bool + Send + Sync),
    ) -> Result<Vec<Shape>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            anyhow::bail!("shape source unreachable");
        }
        let shapes = self.shapes.lock().unwrap().clone();
        Ok(shapes.into_iter().filter(|s| include(s)).collect())
    }

    fn has_location_restriction(&self, shape: &Shape, region: &str) -> bool {
        shape.restricted_regions.iter().any(|r| r == region)
    }
}

/// Price table with both tiers priced for every given shape
pub fn prices_for(shapes: &[Shape]) -> StaticPriceProvider {
    let pricing = StaticPriceProvider::new();
    for (i, shape) in shapes.iter().enumerate() {
        let on_demand = 0.1 * (i + 1) as f64;
        pricing.set_on_demand(&shape.name, on_demand);
        pricing.set_spot(&shape.name, on_demand / 5.0);
    }
    pricing
}
