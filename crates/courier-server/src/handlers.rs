//! HTTP request handlers for the Courier server.
//!
//! The dispatch engine itself is transport-agnostic; this module wraps it
//! in a JSON-over-HTTP surface and translates typed core errors into
//! status codes.

use crate::config::Config;
use crate::metrics;
use anyhow::Result;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use courier_core::{DispatchError, DispatchService, Message};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

/// Shared server state.
pub struct AppState {
    /// The dispatch engine.
    pub service: DispatchService,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create new app state.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            service: DispatchService::with_config(config.service_config()),
            config,
        }
    }
}

/// Build the API router.
#[must_use]
pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/status", get(status_handler))
        .route("/api/subscribe", post(subscribe_handler))
        .route("/api/unsubscribe", post(unsubscribe_handler))
        .route("/api/push", post(push_handler))
        .route("/api/pull", post(pull_handler))
        .route("/api/heartbeat", post(heartbeat_handler))
        .route("/api/subscribers", get(list_subscribers_handler))
        .route("/api/sweep", post(sweep_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Run the HTTP server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            warn!("Failed to start metrics server: {}", e);
        }
    }

    let addr = config.bind_addr()?;
    let state = Arc::new(AppState::new(config));
    let listener = TcpListener::bind(addr).await?;

    info!("Courier server listening on {}", addr);

    axum::serve(listener, app(state)).await?;

    Ok(())
}

/// Map a core error onto an HTTP response.
fn error_response(err: &DispatchError) -> Response {
    let (status, kind) = match err {
        DispatchError::SubscriberNotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        DispatchError::CapacityExceeded(_) => (StatusCode::SERVICE_UNAVAILABLE, "capacity"),
    };
    metrics::record_error(kind);
    (status, Json(json!({ "error": err.to_string() }))).into_response()
}

fn missing_field(field: &str) -> Response {
    metrics::record_error("bad_request");
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": format!("Missing {field}") })),
    )
        .into_response()
}

/// Render a message for the wire.
fn message_json(msg: &Message) -> serde_json::Value {
    json!({
        "id": msg.id,
        "content": String::from_utf8_lossy(&msg.content),
        "type": msg.msg_type.as_str(),
        "priority": msg.priority,
        "target": msg.target,
        "created_at": msg.created_at,
    })
}

/// Refresh the state gauges after a mutating call.
fn update_gauges(state: &AppState) {
    let status = state.service.status();
    metrics::set_queue_size(status.queue_size);
    metrics::set_subscriber_counts(status.total_subscribers, status.active_subscribers);
}

/// Health check handler.
async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// GET /api/status
async fn status_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let status = state.service.status();
    Json(json!({
        "status": "running",
        "queue_size": status.queue_size,
        "active_subscribers": status.active_subscribers,
        "total_subscribers": status.total_subscribers,
        "stats": {
            "total_messages": status.total_messages,
            "messages_sent": status.messages_sent,
            "messages_failed": status.messages_failed,
        }
    }))
}

#[derive(Debug, Deserialize)]
struct SubscribeBody {
    subscriber_id: Option<String>,
    name: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
}

/// POST /api/subscribe
async fn subscribe_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SubscribeBody>,
) -> Response {
    let Some(subscriber_id) = body.subscriber_id else {
        return missing_field("subscriber_id");
    };

    match state.service.register(&subscriber_id, body.name, body.tags) {
        Ok(subscriber) => {
            update_gauges(&state);
            Json(json!({
                "message": "Subscription successful",
                "subscriber": subscriber,
            }))
            .into_response()
        }
        Err(err) => error_response(&err),
    }
}

#[derive(Debug, Deserialize)]
struct SubscriberIdBody {
    subscriber_id: Option<String>,
}

/// POST /api/unsubscribe
async fn unsubscribe_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SubscriberIdBody>,
) -> Response {
    let Some(subscriber_id) = body.subscriber_id else {
        return missing_field("subscriber_id");
    };

    match state.service.unregister(&subscriber_id) {
        Ok(_) => {
            update_gauges(&state);
            Json(json!({ "message": "Unsubscription successful" })).into_response()
        }
        Err(err) => error_response(&err),
    }
}

#[derive(Debug, Deserialize)]
struct PushBody {
    content: Option<String>,
    #[serde(rename = "type", default)]
    msg_type: Option<String>,
    priority: Option<i64>,
    target: Option<String>,
}

/// POST /api/push
async fn push_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<PushBody>,
) -> Response {
    let Some(content) = body.content else {
        return missing_field("content");
    };

    // Payload size is an HTTP-boundary policy; the store never rejects
    let max_size = state.config.limits.max_message_size;
    if content.len() > max_size {
        metrics::record_error("payload_too_large");
        return (
            StatusCode::PAYLOAD_TOO_LARGE,
            Json(json!({
                "error": format!("Content exceeds maximum size of {max_size} bytes")
            })),
        )
            .into_response();
    }

    let message = state.service.push(
        content.into_bytes(),
        body.msg_type.as_deref().unwrap_or("text"),
        body.priority.unwrap_or(1),
        body.target,
    );
    metrics::record_push();
    update_gauges(&state);

    Json(json!({
        "message": "Message queued",
        "message_id": message.id,
        "details": message_json(&message),
    }))
    .into_response()
}

/// POST /api/pull
async fn pull_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SubscriberIdBody>,
) -> Response {
    let Some(subscriber_id) = body.subscriber_id else {
        return missing_field("subscriber_id");
    };

    match state.service.pull(&subscriber_id) {
        Ok(messages) => {
            debug!(subscriber = %subscriber_id, count = messages.len(), "Pull served");
            metrics::record_delivery(messages.len());
            update_gauges(&state);
            Json(json!({
                "subscriber_id": subscriber_id,
                "count": messages.len(),
                "messages": messages.iter().map(message_json).collect::<Vec<_>>(),
            }))
            .into_response()
        }
        Err(err) => error_response(&err),
    }
}

/// POST /api/heartbeat
async fn heartbeat_handler(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SubscriberIdBody>,
) -> Response {
    let Some(subscriber_id) = body.subscriber_id else {
        return missing_field("subscriber_id");
    };

    match state.service.heartbeat(&subscriber_id) {
        Ok(()) => Json(json!({ "message": "Heartbeat updated" })).into_response(),
        Err(err) => error_response(&err),
    }
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    #[serde(default)]
    active_only: bool,
}

/// GET /api/subscribers
async fn list_subscribers_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> impl IntoResponse {
    let subscribers = state.service.subscribers(query.active_only);
    Json(json!({
        "count": subscribers.len(),
        "subscribers": subscribers,
    }))
}

/// POST /api/sweep
///
/// Maintenance endpoint: prunes subscribers whose heartbeat expired. The
/// core never schedules this itself; an operator or external cron does.
async fn sweep_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let removed = state.service.sweep();
    update_gauges(&state);
    info!(removed = removed.len(), "Subscriber sweep");
    Json(json!({
        "removed": removed.len(),
        "subscriber_ids": removed,
    }))
}
