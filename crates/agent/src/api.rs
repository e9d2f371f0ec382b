//! HTTP API for the catalog, the unavailable-offering overrides, health
//! checks and Prometheus metrics

use catalog_lib::{
    health::{components, ComponentStatus, HealthRegistry},
    offerings::UnavailableEntry,
    CapacityType, CatalogError, InstanceType, InstanceTypeProvider, NodeConfig,
    StructuredLogger, UnavailabilityTracker, UnavailableOfferings,
};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

pub struct AppState {
    pub provider: Arc<InstanceTypeProvider>,
    pub unavailable: Arc<UnavailableOfferings>,
    pub node: NodeConfig,
    pub health_registry: HealthRegistry,
    pub logger: StructuredLogger,
}

/// Catalog errors mapped onto HTTP statuses
struct ApiError(CatalogError);

impl From<CatalogError> for ApiError {
    fn from(err: CatalogError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CatalogError::NotFound(_) => StatusCode::NOT_FOUND,
            CatalogError::ShapeSource(_) => StatusCode::BAD_GATEWAY,
            CatalogError::InvalidShape { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            CatalogError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

async fn catalog(state: &AppState) -> Result<Vec<Arc<InstanceType>>, ApiError> {
    let result = state.provider.list(&state.node).await;
    match &result {
        Ok(_) => state.health_registry.set_healthy(components::CATALOG).await,
        Err(CatalogError::ShapeSource(e)) => {
            state
                .health_registry
                .set_degraded(components::SHAPE_SOURCE, e.to_string())
                .await
        }
        Err(e) => {
            state
                .health_registry
                .set_unhealthy(components::CATALOG, e.to_string())
                .await
        }
    }
    Ok(result?)
}

async fn list_instance_types(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let instance_types = catalog(&state).await?;
    let body: Vec<&InstanceType> = instance_types.iter().map(|it| it.as_ref()).collect();
    Ok(Json(body).into_response())
}

async fn get_instance_type(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    let instance_types = catalog(&state).await?;
    let instance_type = instance_types
        .iter()
        .find(|it| it.name == name)
        .ok_or(CatalogError::NotFound(name))?;
    Ok(Json(instance_type.as_ref()).into_response())
}

async fn get_shape(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    let shape = state.provider.get_shape(&name).await?;
    Ok(Json(shape.as_ref()).into_response())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkUnavailableRequest {
    pub shape: String,
    #[serde(default)]
    pub zone: String,
    pub capacity_type: CapacityType,
    #[serde(default = "default_reason")]
    pub reason: String,
    /// Overrides the tracker's default expiry
    #[serde(default)]
    pub ttl_secs: Option<u64>,
}

fn default_reason() -> String {
    "operator".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnavailableResponse {
    pub seq_num: u64,
    pub entries: Vec<UnavailableEntry>,
}

fn unavailable_snapshot(state: &AppState) -> UnavailableResponse {
    UnavailableResponse {
        seq_num: state.unavailable.seq_num(),
        entries: state.unavailable.list(),
    }
}

async fn list_unavailable(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(unavailable_snapshot(&state))
}

async fn mark_unavailable(
    State(state): State<Arc<AppState>>,
    Json(request): Json<MarkUnavailableRequest>,
) -> impl IntoResponse {
    match request.ttl_secs {
        Some(ttl) => state.unavailable.mark_unavailable_for(
            &request.shape,
            &request.zone,
            request.capacity_type,
            &request.reason,
            Duration::from_secs(ttl),
        ),
        None => state.unavailable.mark_unavailable(
            &request.shape,
            &request.zone,
            request.capacity_type,
            &request.reason,
        ),
    }
    state.logger.log_unavailable(
        &request.shape,
        &request.zone,
        request.capacity_type.as_str(),
        &request.reason,
    );

    (StatusCode::CREATED, Json(unavailable_snapshot(&state)))
}

async fn flush_unavailable(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.unavailable.flush();
    info!("Unavailable offerings flushed via API");
    Json(unavailable_snapshot(&state))
}

/// 200 while operational, 503 once any component is unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/instancetypes", get(list_instance_types))
        .route("/api/v1/instancetypes/:name", get(get_instance_type))
        .route("/api/v1/shapes/:name", get(get_shape))
        .route(
            "/api/v1/unavailable",
            get(list_unavailable)
                .post(mark_unavailable)
                .delete(flush_unavailable),
        )
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
