//! Instance-type catalog
//!
//! Assembles one [`InstanceType`] per retained shape and caches the result
//! under a key composed of every input the result depends on. Any input
//! change yields a new key, so entries are never invalidated in place.

use super::cache::TtlCache;
use crate::config::{NodeConfig, ProviderOptions};
use crate::error::CatalogResult;
use crate::models::{InstanceType, Shape, GIB};
use crate::observability::CatalogMetrics;
use crate::offerings::{self, PriceProvider, UnavailabilityTracker};
use crate::requirements;
use crate::resources;
use crate::shapes::{
    ephemeral_disk, select_os_disk, ShapeCatalog, ShapeFilter, ShapeMap, ShapeSize, ShapeSource,
};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// A cached catalog; callers always receive their own copy of the list
type CatalogEntry = Arc<Vec<Arc<InstanceType>>>;

/// Why a retained shape has no instance type in a built catalog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    InvalidName,
    UnknownArchitecture,
    EncryptionAtHost,
    ImageIncompatible,
    NoOfferings,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::InvalidName => "invalid_name",
            SkipReason::UnknownArchitecture => "unknown_architecture",
            SkipReason::EncryptionAtHost => "encryption_at_host",
            SkipReason::ImageIncompatible => "image_incompatible",
            SkipReason::NoOfferings => "no_offerings",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct InstanceTypeProvider {
    options: ProviderOptions,
    shapes: ShapeCatalog,
    pricing: Arc<dyn PriceProvider>,
    unavailable: Arc<dyn UnavailabilityTracker>,
    cache: TtlCache<CatalogEntry>,
    /// Serializes rebuilds so concurrent misses on one key build once
    build_lock: Mutex<()>,
    metrics: CatalogMetrics,
}

impl InstanceTypeProvider {
    pub fn new(
        options: ProviderOptions,
        source: Arc<dyn ShapeSource>,
        pricing: Arc<dyn PriceProvider>,
        unavailable: Arc<dyn UnavailabilityTracker>,
    ) -> CatalogResult<Self> {
        options.validate()?;

        let filter = ShapeFilter::new(
            options.restrictions.clone(),
            options.gpu_allow_list.clone(),
            options.disk_controller_mode,
        );
        let shapes = ShapeCatalog::new(
            source,
            options.region.clone(),
            filter,
            options.shape_cache_ttl(),
        );

        Ok(Self {
            options,
            shapes,
            pricing,
            unavailable,
            cache: TtlCache::new(),
            build_lock: Mutex::new(()),
            metrics: CatalogMetrics::new(),
        })
    }

    pub fn options(&self) -> &ProviderOptions {
        &self.options
    }

    pub fn shapes(&self) -> &ShapeCatalog {
        &self.shapes
    }

    /// Instance types for a node class, sorted by name
    pub async fn list(&self, node: &NodeConfig) -> CatalogResult<Vec<Arc<InstanceType>>> {
        node.validate()?;

        let filtered = self.shapes.get().await?;
        let key = self.cache_key(filtered.seq_num, node)?;

        if let Some(cached) = self.cache.get(&key) {
            self.metrics.inc_cache_hits();
            debug!(cache_key = %key, instance_types = cached.len(), "Catalog cache hit");
            return Ok(cached.as_ref().clone());
        }

        let _guard = self.build_lock.lock().await;
        if let Some(cached) = self.cache.get(&key) {
            self.metrics.inc_cache_hits();
            debug!(cache_key = %key, "Catalog built by concurrent caller");
            return Ok(cached.as_ref().clone());
        }

        self.metrics.inc_cache_misses();
        debug!(cache_key = %key, "Catalog cache miss");

        let built = Arc::new(self.build(&filtered.shapes, node));
        self.cache
            .set(key, built.clone(), self.options.catalog_ttl());
        self.metrics.set_instance_types(built.len() as i64);

        Ok(built.as_ref().clone())
    }

    /// Raw metadata of one retained shape
    pub async fn get_shape(&self, name: &str) -> CatalogResult<Arc<Shape>> {
        self.shapes.lookup(name).await
    }

    /// Cache key for a shape-set generation and node class
    pub fn cache_key(&self, shapes_seq: u64, node: &NodeConfig) -> CatalogResult<String> {
        let max_pods = node
            .kubelet
            .max_pods
            .map(|p| p.to_string())
            .unwrap_or_default();
        Ok(format!(
            "{}-{}-{}-{}-{}-{}-{}",
            shapes_seq,
            self.unavailable.seq_num(),
            node.kubelet.hash()?,
            node.image_family.as_str(),
            node.os_disk_size_gb,
            max_pods,
            node.encryption_at_host,
        ))
    }

    /// Drop expired catalog entries
    pub fn sweep(&self) -> usize {
        self.cache.sweep()
    }

    fn build(&self, shapes: &ShapeMap, node: &NodeConfig) -> Vec<Arc<InstanceType>> {
        let start = Instant::now();
        let mut instance_types = Vec::with_capacity(shapes.len());
        let mut skipped = 0usize;

        // ShapeMap is ordered by name, so the output is too
        for shape in shapes.values() {
            match self.build_one(shape, node) {
                Ok(instance_type) => instance_types.push(Arc::new(instance_type)),
                Err(reason) => {
                    skipped += 1;
                    self.metrics.inc_shapes_skipped(reason.as_str());
                }
            }
        }

        info!(
            region = %self.options.region,
            image_family = node.image_family.as_str(),
            instance_types = instance_types.len(),
            skipped,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Built instance type catalog"
        );
        instance_types
    }

    fn build_one(&self, shape: &Shape, node: &NodeConfig) -> Result<InstanceType, SkipReason> {
        let size = match ShapeSize::parse(&shape.name) {
            Ok(size) => size,
            Err(e) => {
                warn!(shape = %shape.name, error = %e, "Skipping shape with unparseable name");
                return Err(SkipReason::InvalidName);
            }
        };

        let arch = shape.normalized_architecture();
        if arch.is_empty() {
            warn!(shape = %shape.name, "Skipping shape without an architecture");
            return Err(SkipReason::UnknownArchitecture);
        }

        if node.encryption_at_host && !shape.supports_encryption_at_host() {
            debug!(shape = %shape.name, "Skipping shape without encryption at host");
            return Err(SkipReason::EncryptionAtHost);
        }

        if !node
            .image_family
            .is_compatible(&arch, &shape.hyperv_generations())
        {
            debug!(
                shape = %shape.name,
                image_family = node.image_family.as_str(),
                arch = %arch,
                "Skipping shape incompatible with node image"
            );
            return Err(SkipReason::ImageIncompatible);
        }

        let offerings = offerings::generate(
            shape,
            &self.options.region,
            self.pricing.as_ref(),
            self.unavailable.as_ref(),
        );
        if offerings.is_empty() {
            debug!(shape = %shape.name, "Skipping shape without offerings");
            return Err(SkipReason::NoOfferings);
        }

        let ephemeral = ephemeral_disk(shape);
        let requirements = requirements::compute(
            shape,
            &size,
            &self.options.region,
            &offerings,
            self.options.gpu_allow_list.lookup(&shape.name),
            ephemeral,
        );

        let os_disk = select_os_disk(node.os_disk_size_gb, ephemeral);
        let mut capacity = resources::capacity(shape, &self.options, node);
        capacity.ephemeral_storage_bytes = os_disk.size_gb * GIB;

        Ok(InstanceType {
            name: shape.name.clone(),
            requirements,
            capacity,
            overhead: resources::overhead(shape),
            offerings,
            os_disk,
        })
    }
}
