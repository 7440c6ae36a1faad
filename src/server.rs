//! HTTP server for sensor ingestion and the live status stream.
//!
//! This module provides an HTTP server that:
//! - Accepts accelerometer readings from sensor nodes via POST /readings
//! - Streams machine status transitions to browsers via GET /events (SSE)
//! - Lets the dashboard force a machine back to "available"
//!
//! # Architecture
//!
//! ```text
//! sensor node ──→ POST /readings ──→ StatusPipeline ──→ EventHub ──→ GET /events ──→ browsers
//!                                         ↑
//!                      POST /machines/:id/reset
//! ```

use crate::config::Config;
use crate::core::{ClassifierConfig, MachineState, RawReading, StatusEvent};
use crate::hub::{Delivery, HubConfig};
use crate::pipeline::StatusPipeline;
use crate::stats::StatsSnapshot;
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::stream::{self, Stream, StreamExt};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

/// SSE event name carrying status transitions.
pub const MACHINE_STATUS_EVENT: &str = "machine_status";

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to (port 0 for random)
    pub addr: SocketAddr,
    pub classifier: ClassifierConfig,
    pub hub: HubConfig,
}

impl ServerConfig {
    /// Create a new server configuration
    pub fn new(addr: SocketAddr, classifier: ClassifierConfig, hub: HubConfig) -> Self {
        Self {
            addr,
            classifier,
            hub,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.server.addr(),
            config.classifier.clone(),
            config.hub.clone(),
        )
    }
}

/// Shared server state
pub struct ServerState {
    pipeline: StatusPipeline,
    hub_config: HubConfig,
}

impl ServerState {
    pub fn new(pipeline: StatusPipeline, hub_config: HubConfig) -> Self {
        Self {
            pipeline,
            hub_config,
        }
    }
}

/// Response from the readings endpoint
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResponse {
    pub status: String,
    pub machine_id: String,
    pub occupied: bool,
    pub transition: bool,
}

/// Response from the reset endpoints
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetResponse {
    pub status: String,
    pub machine_id: String,
    pub event: Option<StatusEvent>,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub subscribers: usize,
}

/// Error response
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// GET /health
async fn health(State(state): State<Arc<ServerState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        subscribers: state.pipeline.hub().subscriber_count(),
    })
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn invalid_reading(error: impl ToString) -> ApiError {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error: error.to_string(),
            code: "INVALID_READING".to_string(),
        }),
    )
}

/// POST /readings
///
/// Accepts one accelerometer sample from a sensor node.
async fn ingest(
    State(state): State<Arc<ServerState>>,
    payload: Result<Json<RawReading>, JsonRejection>,
) -> Result<(StatusCode, Json<IngestResponse>), ApiError> {
    // Bodies that don't even parse are rejected readings too
    let Json(reading) = payload.map_err(|rejection| {
        state.pipeline.stats().record_reading_rejected();
        tracing::warn!("Dropping reading: {}", rejection.body_text());
        invalid_reading(rejection.body_text())
    })?;

    let outcome = state.pipeline.ingest(reading).map_err(invalid_reading)?;

    Ok((
        StatusCode::ACCEPTED,
        Json(IngestResponse {
            status: "accepted".to_string(),
            transition: outcome.event.is_some(),
            machine_id: outcome.machine_id,
            occupied: outcome.occupied,
        }),
    ))
}

/// POST /machines/:id/reset
async fn reset(
    State(state): State<Arc<ServerState>>,
    Path(machine_id): Path<String>,
) -> Result<Json<ResetResponse>, ApiError> {
    let event = state
        .pipeline
        .reset_machine_state(&machine_id)
        .map_err(invalid_reading)?;
    Ok(Json(ResetResponse {
        status: "ok".to_string(),
        machine_id: machine_id.trim().to_string(),
        event,
    }))
}

/// GET /machines
async fn machines(State(state): State<Arc<ServerState>>) -> Json<Vec<MachineState>> {
    Json(state.pipeline.machines())
}

/// GET /stats
async fn stats(State(state): State<Arc<ServerState>>) -> Json<StatsSnapshot> {
    Json(state.pipeline.stats().stats())
}

/// GET /events
///
/// Opens with a greeting that carries the reconnect delay, then sends one
/// `machine_status` event per transition. Idle streams get keep-alive
/// comments. Dropping the connection drops the subscriber.
async fn events(
    State(state): State<Arc<ServerState>>,
) -> Sse<impl Stream<Item = Result<Event, axum::Error>>> {
    let subscriber = state.pipeline.subscribe();
    tracing::info!(subscriber = %subscriber.id(), "Event stream client connected");

    let hello = Event::default().data("hello!").retry(state.hub_config.retry);
    let updates = subscriber
        .into_stream()
        .map(|delivery| status_event(&delivery));
    let stream = stream::once(async move { Ok(hello) }).chain(updates);

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(state.hub_config.keep_alive)
            .text("ping"),
    )
}

fn status_event(delivery: &Delivery) -> Result<Event, axum::Error> {
    Event::default()
        .event(MACHINE_STATUS_EVENT)
        .id(delivery.seq.to_string())
        .json_data(&delivery.event)
}

/// Build the router around an existing pipeline.
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/readings", post(ingest))
        .route("/events", get(events))
        .route("/machines", get(machines))
        .route("/machines/:id/reset", post(reset))
        // The dashboard's reset buttons issue a plain GET
        .route("/reset/:id", get(reset))
        .route("/stats", get(stats))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Run the HTTP server
pub async fn run(
    config: ServerConfig,
) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    let pipeline = StatusPipeline::spawn(config.classifier.clone(), &config.hub);
    run_with_pipeline(config, pipeline).await
}

/// Run the HTTP server on top of a caller-owned pipeline.
pub async fn run_with_pipeline(
    config: ServerConfig,
    pipeline: StatusPipeline,
) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    let state = Arc::new(ServerState::new(pipeline, config.hub.clone()));
    let app = router(state);

    let listener = TcpListener::bind(config.addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("Laundry status hub listening on http://{}", actual_addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("Server shutdown signal received");
            })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_tx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_event_is_sse_encodable() {
        let delivery = Delivery {
            seq: 7,
            event: StatusEvent {
                machine_id: "M1".to_string(),
                status: true,
            },
        };
        assert!(status_event(&delivery).is_ok());
    }

    #[test]
    fn test_server_config_from_config() {
        let mut config = Config::default();
        config.server.port = 0;
        config.classifier.window_size = 7;

        let server = ServerConfig::from_config(&config);
        assert_eq!(server.addr.port(), 0);
        assert_eq!(server.classifier.window_size, 7);
    }
}
