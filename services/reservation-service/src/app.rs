use std::sync::Arc;

use axum::extract::State;
use axum::http::{
    header::{ACCEPT, CONTENT_TYPE},
    HeaderName, HeaderValue, Method, StatusCode,
};
use axum::{middleware, routing::{get, post}, Router};
use common_coordination::{IdempotencyStore, LockService};
use common_events::EventPublisher;
use common_http_errors::http_error_metrics_layer;
use common_observability::ReservationMetrics;
use prometheus::{Encoder, TextEncoder};
use serde_json::Value;
use sqlx::PgPool;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::config::ReservationConfig;
use crate::payment_handlers::confirm_payment;
use crate::reservation_handlers::create_reservation;
use crate::session_handlers::list_session_seats;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub locks: LockService,
    pub idempotency: IdempotencyStore,
    pub publisher: Option<EventPublisher>,
    pub config: ReservationConfig,
    pub metrics: Arc<ReservationMetrics>,
}

pub async fn health() -> &'static str { "ok" }

async fn metrics(State(state): State<AppState>) -> (StatusCode, String) {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&state.metrics.registry.gather(), &mut buffer) {
        return (StatusCode::INTERNAL_SERVER_ERROR, err.to_string());
    }
    (StatusCode::OK, String::from_utf8_lossy(&buffer).into_owned())
}

/// Best-effort publish. Domain writes have already committed by the time an
/// event goes out, so a failure here is logged and counted, never surfaced.
pub async fn publish_event(state: &AppState, routing_key: &str, payload: &Value) {
    let Some(publisher) = &state.publisher else {
        tracing::debug!(routing_key, "Event bus not configured; dropping event");
        return;
    };
    if let Err(err) = publisher.publish(routing_key, payload).await {
        state.metrics.event_publish_failures.inc();
        tracing::error!(error = %err, routing_key, "Failed to publish event");
    }
}

pub fn build_router(state: AppState) -> Router {
    let allowed_origins = [
        "http://localhost:3000",
        "http://localhost:3001",
        "http://localhost:5173",
    ];
    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(
            allowed_origins.iter().filter_map(|o| o.parse::<HeaderValue>().ok()).collect::<Vec<_>>(),
        ))
        .allow_methods([
            Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS,
        ])
        .allow_headers([
            ACCEPT, CONTENT_TYPE, HeaderName::from_static("idempotency-key"),
        ]);

    Router::new()
        .route("/healthz", get(health))
        .route("/sessions/:session_id/seats", get(list_session_seats))
        .route("/reservations", post(create_reservation))
        .route("/reservations/:reservation_id/confirm", post(confirm_payment))
        .route("/internal/metrics", get(metrics))
        .with_state(state)
        .layer(cors)
        .layer(middleware::from_fn(http_error_metrics_layer("reservation-service")))
}
