//! Compute shapes: the upstream source, typed capability access, disk
//! placement and the filtered shape catalog

pub mod capabilities;
mod catalog;
mod disk;
mod filter;
mod size;

pub use capabilities::{
    keys, normalize_architecture, normalize_shape_name, DiskController, GpuAllowList, GpuModel,
    HyperVGeneration,
};
pub use catalog::{FilteredShapes, ShapeCatalog, ShapeMap};
pub use disk::{ephemeral_disk, select_os_disk, EphemeralDisk, EphemeralPlacement, OsDiskPlan};
pub use filter::{ExclusionReason, RestrictionSet, ShapeFilter, MIN_MEMORY_GIB, MIN_VCPUS};
pub use size::ShapeSize;

use crate::models::Shape;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Upstream source of raw shape descriptors
///
/// Listing is slow and is cached by [`ShapeCatalog`].
#[async_trait]
pub trait ShapeSource: Send + Sync {
    /// List the shapes offered in `region` that pass `include`
    async fn list(
        &self,
        region: &str,
        include: &(dyn for<'s> Fn(&'s Shape) -> bool + Send + Sync),
    ) -> Result<Vec<Shape>>;

    /// Whether launching `shape` in `region` is restricted for this account
    fn has_location_restriction(&self, shape: &Shape, region: &str) -> bool;
}

/// Shape source backed by a JSON file holding an array of shapes
pub struct FileShapeSource {
    path: PathBuf,
}

impl FileShapeSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ShapeSource for FileShapeSource {
    async fn list(
        &self,
        region: &str,
        include: &(dyn for<'s> Fn(&'s Shape) -> bool + Send + Sync),
    ) -> Result<Vec<Shape>> {
        let raw = tokio::fs::read(&self.path)
            .await
            .with_context(|| format!("Failed to read shapes from {}", self.path.display()))?;
        let shapes: Vec<Shape> = serde_json::from_slice(&raw)
            .with_context(|| format!("Failed to parse shapes in {}", self.path.display()))?;

        let total = shapes.len();
        let listed: Vec<Shape> = shapes
            .into_iter()
            .filter(|s| s.zones.contains_key(region) || s.zones.is_empty())
            .filter(|s| include(s))
            .collect();

        debug!(
            path = %self.path.display(),
            total,
            listed = listed.len(),
            "Listed shapes from file"
        );
        Ok(listed)
    }

    fn has_location_restriction(&self, shape: &Shape, region: &str) -> bool {
        shape
            .restricted_regions
            .iter()
            .any(|r| r.eq_ignore_ascii_case(region))
    }
}
