//! Observability for the instance-type catalog
//!
//! Provides:
//! - Prometheus metrics (cache hits/misses, shape refresh latency, catalog size)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for shape refresh latency (in seconds)
const REFRESH_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

static GLOBAL_METRICS: OnceLock<CatalogMetricsInner> = OnceLock::new();

struct CatalogMetricsInner {
    cache_hits: IntCounter,
    cache_misses: IntCounter,
    refresh_latency_seconds: Histogram,
    refresh_errors: IntCounter,
    shapes_retained: IntGauge,
    instance_types: IntGauge,
    shapes_skipped: IntCounterVec,
}

impl CatalogMetricsInner {
    fn new() -> Self {
        Self {
            cache_hits: register_int_counter!(
                "instance_catalog_cache_hits_total",
                "Catalog requests served from the assembled-catalog cache"
            )
            .expect("Failed to register cache_hits"),

            cache_misses: register_int_counter!(
                "instance_catalog_cache_misses_total",
                "Catalog requests that rebuilt the instance-type list"
            )
            .expect("Failed to register cache_misses"),

            refresh_latency_seconds: register_histogram!(
                "instance_catalog_shape_refresh_latency_seconds",
                "Time spent listing and filtering shapes from upstream",
                REFRESH_BUCKETS.to_vec()
            )
            .expect("Failed to register refresh_latency_seconds"),

            refresh_errors: register_int_counter!(
                "instance_catalog_shape_refresh_errors_total",
                "Upstream shape listings that failed"
            )
            .expect("Failed to register refresh_errors"),

            shapes_retained: register_int_gauge!(
                "instance_catalog_shapes_retained",
                "Shapes retained after filtering"
            )
            .expect("Failed to register shapes_retained"),

            instance_types: register_int_gauge!(
                "instance_catalog_instance_types",
                "Instance types in the most recently built catalog"
            )
            .expect("Failed to register instance_types"),

            shapes_skipped: register_int_counter_vec!(
                "instance_catalog_shapes_skipped_total",
                "Retained shapes left out of a built catalog",
                &["reason"]
            )
            .expect("Failed to register shapes_skipped"),
        }
    }
}

/// Catalog metrics for Prometheus exposition
///
/// A lightweight handle to the global metrics; clones share the same
/// underlying collectors.
#[derive(Clone)]
pub struct CatalogMetrics {
    _private: (),
}

impl Default for CatalogMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl CatalogMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(CatalogMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &CatalogMetricsInner {
        GLOBAL_METRICS.get_or_init(CatalogMetricsInner::new)
    }

    pub fn inc_cache_hits(&self) {
        self.inner().cache_hits.inc();
    }

    pub fn inc_cache_misses(&self) {
        self.inner().cache_misses.inc();
    }

    pub fn observe_refresh_latency(&self, duration_secs: f64) {
        self.inner().refresh_latency_seconds.observe(duration_secs);
    }

    pub fn inc_refresh_errors(&self) {
        self.inner().refresh_errors.inc();
    }

    pub fn set_shapes_retained(&self, count: i64) {
        self.inner().shapes_retained.set(count);
    }

    pub fn set_instance_types(&self, count: i64) {
        self.inner().instance_types.set(count);
    }

    /// Count a shape skipped during a catalog build
    pub fn inc_shapes_skipped(&self, reason: &str) {
        self.inner()
            .shapes_skipped
            .with_label_values(&[reason])
            .inc();
    }
}

/// Structured logger for catalog lifecycle events
///
/// Attaches the region and cluster identity to every event.
#[derive(Clone)]
pub struct StructuredLogger {
    region: String,
    cluster_name: String,
}

impl StructuredLogger {
    pub fn new(region: impl Into<String>, cluster_name: impl Into<String>) -> Self {
        Self {
            region: region.into(),
            cluster_name: cluster_name.into(),
        }
    }

    pub fn log_startup(&self, version: &str, shape_source: &str) {
        info!(
            event = "catalog_started",
            region = %self.region,
            cluster = %self.cluster_name,
            version = %version,
            shape_source = %shape_source,
            "Instance catalog agent started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "catalog_shutdown",
            region = %self.region,
            cluster = %self.cluster_name,
            reason = %reason,
            "Instance catalog agent shutting down"
        );
    }

    /// Log the outcome of a shape catalog refresh
    pub fn log_refresh(&self, retained: usize, seq_num: u64, error: Option<&str>) {
        match error {
            None => info!(
                event = "shapes_refreshed",
                region = %self.region,
                cluster = %self.cluster_name,
                retained = retained,
                seq_num = seq_num,
                "Shape catalog refreshed"
            ),
            Some(error) => warn!(
                event = "shapes_refresh_failed",
                region = %self.region,
                cluster = %self.cluster_name,
                seq_num = seq_num,
                error = %error,
                "Shape catalog refresh failed, serving previous set"
            ),
        }
    }

    /// Log an offering marked unavailable after a launch failure
    pub fn log_unavailable(&self, shape: &str, zone: &str, capacity_type: &str, reason: &str) {
        warn!(
            event = "offering_unavailable",
            region = %self.region,
            cluster = %self.cluster_name,
            shape = %shape,
            zone = %zone,
            capacity_type = %capacity_type,
            reason = %reason,
            "Offering marked unavailable"
        );
    }
}
