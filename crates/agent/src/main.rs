//! Catalog Agent - serves the instance-type catalog
//!
//! Loads shapes and prices, resolves the instance-type catalog for the
//! configured node class and exposes it with health and metrics over HTTP.

use anyhow::{Context, Result};
use catalog_agent::{api, config};
use catalog_lib::{
    health::{components, HealthRegistry},
    observability::{CatalogMetrics, StructuredLogger},
    FileShapeSource, InstanceTypeProvider, StaticPriceProvider, UnavailableOfferings,
};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Load the price table, recording the outcome on the pricing component
async fn load_prices(
    config: &config::AgentConfig,
    pricing: &StaticPriceProvider,
    health: &HealthRegistry,
) {
    let Some(path) = &config.prices_path else {
        health
            .set_degraded(components::PRICING, "No price table configured")
            .await;
        return;
    };

    match pricing.load(path).await {
        Ok(0) => {
            health
                .set_degraded(components::PRICING, "Price table is empty")
                .await
        }
        Ok(_) => health.set_healthy(components::PRICING).await,
        Err(e) => {
            warn!(error = %e, "Failed to load prices, keeping previous table");
            health
                .set_degraded(components::PRICING, format!("{:#}", e))
                .await;
        }
    }
}

/// Load the shape catalog; the agent is ready once this succeeds
async fn load_shapes(
    provider: &InstanceTypeProvider,
    health: &HealthRegistry,
    logger: &StructuredLogger,
) -> bool {
    let result = provider.shapes().get().await;
    match &result {
        Ok(filtered) => logger.log_refresh(filtered.shapes.len(), filtered.seq_num, None),
        Err(e) => {
            let error = e.to_string();
            logger.log_refresh(0, provider.shapes().seq_num(), Some(&error));
        }
    }
    health.record(components::SHAPE_SOURCE, &result).await;

    if result.is_ok() {
        health.set_ready(true).await;
    }
    result.is_ok()
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting catalog-agent");

    let config = config::AgentConfig::load().context("Failed to load configuration")?;
    info!(
        cluster = %config.cluster_name,
        region = %config.provider.region,
        shapes_path = %config.shapes_path.display(),
        "Agent configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::SHAPE_SOURCE).await;
    health_registry.register(components::PRICING).await;
    health_registry.register(components::CATALOG).await;

    let _metrics = CatalogMetrics::new();

    let logger = StructuredLogger::new(&config.provider.region, &config.cluster_name);
    logger.log_startup(AGENT_VERSION, &config.shapes_path.display().to_string());

    let source = Arc::new(FileShapeSource::new(&config.shapes_path));
    let pricing = Arc::new(StaticPriceProvider::new());
    let unavailable = Arc::new(UnavailableOfferings::new());
    load_prices(&config, &pricing, &health_registry).await;

    let provider = Arc::new(
        InstanceTypeProvider::new(
            config.provider.clone(),
            source,
            pricing.clone(),
            unavailable.clone(),
        )
        .context("Failed to create instance type provider")?,
    );

    let mut ready = load_shapes(&provider, &health_registry, &logger).await;

    let app_state = Arc::new(api::AppState {
        provider: provider.clone(),
        unavailable: unavailable.clone(),
        node: config.node.clone(),
        health_registry: health_registry.clone(),
        logger: logger.clone(),
    });
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    // Sweeps expired entries, reloads prices and retries the initial shape load
    let maintenance = {
        let health_registry = health_registry.clone();
        let logger = logger.clone();
        let config = config.clone();
        tokio::spawn(async move {
            let mut sweep = tokio::time::interval(config.sweep_interval());
            let mut reload = tokio::time::interval(config.price_reload_interval());
            // Both intervals fire immediately; prices were just loaded
            reload.tick().await;

            loop {
                tokio::select! {
                    _ = sweep.tick() => {
                        let offerings = unavailable.sweep();
                        let entries = provider.sweep();
                        if offerings > 0 || entries > 0 {
                            info!(offerings, catalog_entries = entries, "Swept expired entries");
                        }
                        if !ready {
                            ready = load_shapes(&provider, &health_registry, &logger).await;
                        }
                    }
                    _ = reload.tick() => {
                        load_prices(&config, &pricing, &health_registry).await;
                    }
                }
            }
        })
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result.context("Failed to listen for shutdown signal")?;
            logger.log_shutdown("SIGINT received");
        }
        result = api_handle => {
            let reason = match result {
                Ok(Ok(())) => "API server stopped".to_string(),
                Ok(Err(e)) => format!("API server failed: {:#}", e),
                Err(e) => format!("API server task panicked: {}", e),
            };
            logger.log_shutdown(&reason);
            maintenance.abort();
            anyhow::bail!(reason);
        }
    }

    maintenance.abort();
    info!("Shutting down");

    Ok(())
}
