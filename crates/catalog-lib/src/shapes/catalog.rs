//! Filtered shape catalog
//!
//! Holds the filtered shape set between refreshes. Refreshes are
//! collapsed behind a single lock so concurrent callers trigger at most
//! one upstream listing, and a sequence number is bumped whenever the
//! retained set actually changes.

use super::filter::ShapeFilter;
use super::ShapeSource;
use crate::error::{CatalogError, CatalogResult};
use crate::models::Shape;
use crate::observability::CatalogMetrics;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

/// Retained shapes keyed by name
pub type ShapeMap = BTreeMap<String, Arc<Shape>>;

/// A snapshot of the filtered shape set and the generation it belongs to
#[derive(Debug, Clone)]
pub struct FilteredShapes {
    pub shapes: Arc<ShapeMap>,
    pub seq_num: u64,
}

struct Snapshot {
    shapes: Arc<ShapeMap>,
    seq_num: u64,
    refreshed_at: Instant,
}

impl Snapshot {
    fn filtered(&self) -> FilteredShapes {
        FilteredShapes {
            shapes: self.shapes.clone(),
            seq_num: self.seq_num,
        }
    }
}

pub struct ShapeCatalog {
    source: Arc<dyn ShapeSource>,
    region: String,
    filter: ShapeFilter,
    ttl: Duration,
    state: RwLock<Option<Snapshot>>,
    seq: AtomicU64,
    refresh_lock: Mutex<()>,
    metrics: CatalogMetrics,
}

impl ShapeCatalog {
    pub fn new(
        source: Arc<dyn ShapeSource>,
        region: impl Into<String>,
        filter: ShapeFilter,
        ttl: Duration,
    ) -> Self {
        Self {
            source,
            region: region.into(),
            filter,
            ttl,
            state: RwLock::new(None),
            seq: AtomicU64::new(0),
            refresh_lock: Mutex::new(()),
            metrics: CatalogMetrics::new(),
        }
    }

    /// Generation of the retained set; only increases
    pub fn seq_num(&self) -> u64 {
        self.seq.load(Ordering::SeqCst)
    }

    /// Shapes and their generation, read together under one lock
    async fn fresh(&self) -> Option<FilteredShapes> {
        let state = self.state.read().await;
        state
            .as_ref()
            .filter(|s| s.refreshed_at.elapsed() < self.ttl)
            .map(Snapshot::filtered)
    }

    /// Current filtered shapes, refreshing from upstream when stale
    pub async fn get(&self) -> CatalogResult<FilteredShapes> {
        if let Some(current) = self.fresh().await {
            return Ok(current);
        }

        let _guard = self.refresh_lock.lock().await;
        // Someone else may have refreshed while we waited for the lock
        if let Some(current) = self.fresh().await {
            debug!("Shape catalog refreshed by concurrent caller");
            return Ok(current);
        }

        self.fetch().await
    }

    /// Refresh from upstream regardless of age
    pub async fn refresh(&self) -> CatalogResult<FilteredShapes> {
        let _guard = self.refresh_lock.lock().await;
        self.fetch().await
    }

    async fn fetch(&self) -> CatalogResult<FilteredShapes> {
        let start = Instant::now();
        info!(region = %self.region, "Refreshing shape catalog");

        let filter = &self.filter;
        let listed = self
            .source
            .list(&self.region, &|s: &Shape| filter.check(s).is_ok())
            .await
            .map_err(|e| {
                self.metrics.inc_refresh_errors();
                CatalogError::ShapeSource(e)
            })?;

        let listed_count = listed.len();
        let current = self.apply(listed).await;

        self.metrics
            .observe_refresh_latency(start.elapsed().as_secs_f64());
        self.metrics.set_shapes_retained(current.shapes.len() as i64);
        info!(
            region = %self.region,
            listed = listed_count,
            retained = current.shapes.len(),
            seq_num = current.seq_num,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Shape catalog refreshed"
        );

        Ok(current)
    }

    /// Filter `shapes` and install them as the current set
    pub async fn apply(&self, shapes: Vec<Shape>) -> FilteredShapes {
        let source = &self.source;
        let region = &self.region;
        let retained = self
            .filter
            .retain(shapes, |s| source.has_location_restriction(s, region));

        let mut state = self.state.write().await;
        let changed = match state.as_ref() {
            Some(previous) => *previous.shapes != retained,
            None => true,
        };
        // The seq is bumped under the write lock so it always travels with its set
        let seq_num = if changed {
            let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;
            debug!(seq_num = seq, retained = retained.len(), "Retained shape set changed");
            seq
        } else {
            self.seq.load(Ordering::SeqCst)
        };

        let snapshot = Snapshot {
            shapes: Arc::new(retained),
            seq_num,
            refreshed_at: Instant::now(),
        };
        let current = snapshot.filtered();
        *state = Some(snapshot);
        current
    }

    /// Look up one retained shape by name
    pub async fn lookup(&self, name: &str) -> CatalogResult<Arc<Shape>> {
        let current = self.get().await?;
        current
            .shapes
            .get(name)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(name.to_string()))
    }
}
