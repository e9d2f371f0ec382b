//! In-memory price table

use super::PriceProvider;
use anyhow::{Context, Result};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{debug, info};

/// Hourly prices of one shape
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PriceEntry {
    #[serde(default)]
    pub on_demand: Option<f64>,
    #[serde(default)]
    pub spot: Option<f64>,
}

/// Price table keyed by shape name, updatable while in use
#[derive(Debug, Default)]
pub struct StaticPriceProvider {
    on_demand: DashMap<String, f64>,
    spot: DashMap<String, f64>,
}

fn valid_price(price: f64) -> bool {
    price.is_finite() && price >= 0.0
}

impl StaticPriceProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_on_demand(&self, shape: &str, price: f64) {
        if valid_price(price) {
            self.on_demand.insert(shape.to_string(), price);
        }
    }

    pub fn set_spot(&self, shape: &str, price: f64) {
        if valid_price(price) {
            self.spot.insert(shape.to_string(), price);
        }
    }

    /// Replace every price with the given table
    ///
    /// New prices are upserted before stale ones are dropped, so a shape
    /// priced in both tables is never observed without a price.
    pub fn replace(&self, prices: HashMap<String, PriceEntry>) {
        let mut on_demand = HashSet::new();
        let mut spot = HashSet::new();
        for (shape, entry) in &prices {
            if let Some(price) = entry.on_demand.filter(|p| valid_price(*p)) {
                self.on_demand.insert(shape.clone(), price);
                on_demand.insert(shape.as_str());
            }
            if let Some(price) = entry.spot.filter(|p| valid_price(*p)) {
                self.spot.insert(shape.clone(), price);
                spot.insert(shape.as_str());
            }
        }
        self.on_demand.retain(|shape, _| on_demand.contains(shape.as_str()));
        self.spot.retain(|shape, _| spot.contains(shape.as_str()));

        debug!(
            on_demand = self.on_demand.len(),
            spot = self.spot.len(),
            "Price table replaced"
        );
    }

    /// Parse a JSON object of shape name -> `{ "on_demand": .., "spot": .. }`
    pub fn from_json(raw: &[u8]) -> Result<Self> {
        let prices: HashMap<String, PriceEntry> =
            serde_json::from_slice(raw).context("Failed to parse price table")?;
        let provider = Self::new();
        provider.replace(prices);
        Ok(provider)
    }

    /// Reload prices from a JSON file
    pub async fn load(&self, path: &Path) -> Result<usize> {
        let raw = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read prices from {}", path.display()))?;
        let prices: HashMap<String, PriceEntry> = serde_json::from_slice(&raw)
            .with_context(|| format!("Failed to parse prices in {}", path.display()))?;
        let count = prices.len();
        self.replace(prices);
        info!(path = %path.display(), shapes = count, "Loaded price table");
        Ok(count)
    }

    /// Number of shapes with at least an on-demand price
    pub fn len(&self) -> usize {
        self.on_demand.len()
    }

    pub fn is_empty(&self) -> bool {
        self.on_demand.is_empty() && self.spot.is_empty()
    }
}

impl PriceProvider for StaticPriceProvider {
    fn on_demand_price(&self, shape: &str) -> Option<f64> {
        self.on_demand.get(shape).map(|p| *p)
    }

    fn spot_price(&self, shape: &str) -> Option<f64> {
        self.spot.get(shape).map(|p| *p)
    }
}
