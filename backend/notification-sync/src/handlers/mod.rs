/// HTTP handlers for the notification sync host surface
pub mod notifications;
pub mod realtime;

pub use notifications::{error_response, register_routes as register_notifications, ApiResponse};
pub use realtime::register_routes as register_realtime;
