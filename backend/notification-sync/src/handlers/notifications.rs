use crate::error::AppError;
use crate::services::EngineHandle;
/// Notification projection and action handlers
use actix_web::{web, HttpResponse, Result as ActixResult};
use serde::Serialize;
use tracing::warn;

/// API Response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(error: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error),
        }
    }
}

/// Map an engine error to an HTTP response.
///
/// Mutation failures carry only the user-facing message; the store detail
/// goes to the log.
pub fn error_response(error: AppError) -> HttpResponse {
    match error {
        AppError::Mutation { action, source } => {
            warn!("{} failed: {}", action.as_str(), source);
            HttpResponse::BadGateway().json(ApiResponse::<()>::err(
                action.failure_message().to_string(),
            ))
        }
        AppError::NoSession => {
            HttpResponse::Conflict().json(ApiResponse::<()>::err(AppError::NoSession.to_string()))
        }
        AppError::EngineStopped => HttpResponse::ServiceUnavailable()
            .json(ApiResponse::<()>::err(AppError::EngineStopped.to_string())),
        other => HttpResponse::InternalServerError().json(ApiResponse::<()>::err(other.to_string())),
    }
}

fn accepted() -> HttpResponse {
    HttpResponse::Ok().json(ApiResponse::ok(serde_json::json!({"success": true})))
}

/// Current projection: visible window, unread count, loading flag
///
/// GET /api/v1/notifications
pub async fn list_notifications(engine: web::Data<EngineHandle>) -> ActixResult<HttpResponse> {
    Ok(HttpResponse::Ok().json(ApiResponse::ok(engine.current())))
}

/// Mark notification as read
///
/// POST /api/v1/notifications/{id}/read
pub async fn mark_as_read(
    engine: web::Data<EngineHandle>,
    path: web::Path<String>,
) -> ActixResult<HttpResponse> {
    match engine.mark_read(path.into_inner()).await {
        Ok(()) => Ok(accepted()),
        Err(e) => Ok(error_response(e)),
    }
}

/// POST /api/v1/notifications/read-all
pub async fn mark_all_as_read(engine: web::Data<EngineHandle>) -> ActixResult<HttpResponse> {
    match engine.mark_all_read().await {
        Ok(()) => Ok(accepted()),
        Err(e) => Ok(error_response(e)),
    }
}

/// DELETE /api/v1/notifications/{id}
pub async fn delete_notification(
    engine: web::Data<EngineHandle>,
    path: web::Path<String>,
) -> ActixResult<HttpResponse> {
    match engine.delete(path.into_inner()).await {
        Ok(()) => Ok(accepted()),
        Err(e) => Ok(error_response(e)),
    }
}

/// Register routes
pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1/notifications")
            .route("", web::get().to(list_notifications))
            .route("/read-all", web::post().to(mark_all_as_read))
            .route("/{id}/read", web::post().to(mark_as_read))
            .route("/{id}", web::delete().to(delete_notification)),
    );
}
