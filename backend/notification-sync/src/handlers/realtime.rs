/// Realtime channel handlers
///
/// The ingest endpoints feed the in-process event source, standing in for an
/// upstream change feed. Reconnect and status operate on the engine.
use actix_web::{web, HttpResponse, Result as ActixResult};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use super::notifications::{error_response, ApiResponse};
use crate::realtime::{BroadcastEventSource, ChangeEvent, ChannelStatus};
use crate::services::EngineHandle;

/// Status change to inject into the event source
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StatusPayload {
    pub status: ChannelStatus,
    /// Channel key; every channel when omitted
    pub channel: Option<String>,
}

/// Re-open the push channel
///
/// POST /api/v1/realtime/reconnect
pub async fn reconnect(engine: web::Data<EngineHandle>) -> ActixResult<HttpResponse> {
    match engine.reconnect().await {
        Ok(()) => Ok(HttpResponse::Accepted().json(ApiResponse::ok(json!({"success": true})))),
        Err(e) => Ok(error_response(e)),
    }
}

/// Engine diagnostics: connection state, poller, known identifiers
///
/// GET /api/v1/realtime/status
pub async fn engine_status(engine: web::Data<EngineHandle>) -> ActixResult<HttpResponse> {
    match engine.status().await {
        Ok(status) => Ok(HttpResponse::Ok().json(ApiResponse::ok(status))),
        Err(e) => Ok(error_response(e)),
    }
}

/// Publish a change event to matching subscribers
///
/// POST /api/v1/realtime/events
pub async fn ingest_event(
    source: web::Data<BroadcastEventSource>,
    body: web::Json<ChangeEvent>,
) -> ActixResult<HttpResponse> {
    let delivered = source.publish(body.into_inner());

    Ok(HttpResponse::Ok().json(ApiResponse::ok(json!({
        "delivered": delivered
    }))))
}

/// Inject a channel status change
///
/// POST /api/v1/realtime/status
pub async fn ingest_status(
    source: web::Data<BroadcastEventSource>,
    body: web::Json<StatusPayload>,
) -> ActixResult<HttpResponse> {
    let payload = body.into_inner();
    let delivered = match payload.channel.as_deref() {
        Some(channel) => source.set_status(channel, payload.status),
        None => source.broadcast_status(payload.status),
    };
    info!(
        "Injected channel status {} ({} subscriber(s))",
        payload.status, delivered
    );

    Ok(HttpResponse::Ok().json(ApiResponse::ok(json!({
        "status": payload.status,
        "delivered": delivered
    }))))
}

/// Register routes
pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1/realtime")
            .route("/reconnect", web::post().to(reconnect))
            .route("/status", web::get().to(engine_status))
            .route("/status", web::post().to(ingest_status))
            .route("/events", web::post().to(ingest_event)),
    );
}
