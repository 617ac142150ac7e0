pub mod config;
pub mod error;
pub mod models;
pub mod store;
pub mod realtime;
pub mod services;
pub mod handlers;
pub mod metrics;

pub use config::Config;
pub use error::{AppError, Result};
pub use models::{Notification, NotificationId, NotificationView, Preferences, Session};
pub use realtime::{BroadcastEventSource, RealtimeEventSource};
pub use services::*;
pub use store::{NotificationStore, PreferenceService, SessionProvider};
