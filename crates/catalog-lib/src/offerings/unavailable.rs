//! Offerings that recently failed to launch
//!
//! The provisioning actuator marks a (shape, zone, capacity type) when a
//! launch fails for lack of capacity. Entries expire on their own; expired
//! entries stop counting immediately and are dropped by [`sweep`].
//!
//! [`sweep`]: UnavailableOfferings::sweep

use super::UnavailabilityTracker;
use crate::models::CapacityType;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info};

pub const DEFAULT_UNAVAILABLE_TTL: Duration = Duration::from_secs(3 * 60);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct OfferingKey {
    shape: String,
    zone: String,
    capacity_type: CapacityType,
}

#[derive(Debug, Clone)]
struct Mark {
    reason: String,
    marked_at: DateTime<Utc>,
    expires: Instant,
}

/// One tracked unavailable offering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnavailableEntry {
    pub shape: String,
    pub zone: String,
    pub capacity_type: CapacityType,
    pub reason: String,
    pub marked_at: DateTime<Utc>,
}

pub struct UnavailableOfferings {
    entries: DashMap<OfferingKey, Mark>,
    ttl: Duration,
    seq: AtomicU64,
}

impl Default for UnavailableOfferings {
    fn default() -> Self {
        Self::new()
    }
}

impl UnavailableOfferings {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_UNAVAILABLE_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            seq: AtomicU64::new(0),
        }
    }

    fn bump(&self) -> u64 {
        self.seq.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Mark an offering unavailable for the default TTL
    pub fn mark_unavailable(
        &self,
        shape: &str,
        zone: &str,
        capacity_type: CapacityType,
        reason: &str,
    ) {
        self.mark_unavailable_for(shape, zone, capacity_type, reason, self.ttl);
    }

    pub fn mark_unavailable_for(
        &self,
        shape: &str,
        zone: &str,
        capacity_type: CapacityType,
        reason: &str,
        ttl: Duration,
    ) {
        let key = OfferingKey {
            shape: shape.to_string(),
            zone: zone.to_string(),
            capacity_type,
        };
        self.entries.insert(
            key,
            Mark {
                reason: reason.to_string(),
                marked_at: Utc::now(),
                expires: Instant::now() + ttl,
            },
        );
        let seq = self.bump();
        info!(
            shape = %shape,
            zone = %zone,
            capacity_type = %capacity_type,
            reason = %reason,
            ttl_secs = ttl.as_secs(),
            seq_num = seq,
            "Marked offering unavailable"
        );
    }

    /// Forget one offering; returns whether it was tracked
    pub fn delete(&self, shape: &str, zone: &str, capacity_type: CapacityType) -> bool {
        let key = OfferingKey {
            shape: shape.to_string(),
            zone: zone.to_string(),
            capacity_type,
        };
        let removed = self.entries.remove(&key).is_some();
        if removed {
            self.bump();
            debug!(
                shape = %shape,
                zone = %zone,
                capacity_type = %capacity_type,
                "Offering available again"
            );
        }
        removed
    }

    /// Forget every tracked offering
    pub fn flush(&self) {
        let count = self.entries.len();
        self.entries.clear();
        self.bump();
        info!(flushed = count, "Flushed unavailable offerings");
    }

    /// Drop expired entries; returns how many were removed
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, mark| mark.expires > now);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            self.bump();
            debug!(removed, "Swept expired unavailable offerings");
        }
        removed
    }

    /// Unexpired entries, ordered by shape, zone and capacity type
    pub fn list(&self) -> Vec<UnavailableEntry> {
        let now = Instant::now();
        let mut entries: Vec<UnavailableEntry> = self
            .entries
            .iter()
            .filter(|e| e.value().expires > now)
            .map(|e| UnavailableEntry {
                shape: e.key().shape.clone(),
                zone: e.key().zone.clone(),
                capacity_type: e.key().capacity_type,
                reason: e.value().reason.clone(),
                marked_at: e.value().marked_at,
            })
            .collect();
        entries.sort_by(|a, b| {
            (&a.shape, &a.zone, a.capacity_type).cmp(&(&b.shape, &b.zone, b.capacity_type))
        });
        entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl UnavailabilityTracker for UnavailableOfferings {
    fn is_unavailable(&self, shape: &str, zone: &str, capacity_type: CapacityType) -> bool {
        let key = OfferingKey {
            shape: shape.to_string(),
            zone: zone.to_string(),
            capacity_type,
        };
        self.entries
            .get(&key)
            .is_some_and(|mark| mark.expires > Instant::now())
    }

    fn seq_num(&self) -> u64 {
        self.seq.load(Ordering::SeqCst)
    }
}
