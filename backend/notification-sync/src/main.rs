use actix_web::{middleware, web, App, HttpServer};
use anyhow::Context;
use notification_sync::{
    config::Config,
    handlers::{register_notifications, register_realtime},
    metrics,
    store::{HttpNotificationStore, HttpPreferenceService, StaticSessionProvider},
    BroadcastEventSource, EngineConfig, EngineDeps, NotificationEngine, TerminalBell,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("failed to load configuration")?;
    tracing::info!("Starting notification sync service ({})", config.app.env);

    let store = HttpNotificationStore::new(&config.store)
        .context("failed to build notification store client")?;
    let preferences = HttpPreferenceService::new(&config.store)
        .context("failed to build preference service client")?;
    let events = BroadcastEventSource::new();

    if config.sync.user_id.is_none() {
        tracing::warn!("SYNC_USER_ID not set; engine will stay idle until a session exists");
    }

    let engine = NotificationEngine::mount(
        EngineConfig::from(&config.sync),
        EngineDeps {
            store: Arc::new(store),
            preferences: Arc::new(preferences),
            sessions: Arc::new(StaticSessionProvider::new(config.sync.user_id)),
            events: Arc::new(events.clone()),
            audio: Arc::new(TerminalBell),
        },
    );

    let addr = format!("0.0.0.0:{}", config.app.port);
    tracing::info!("Starting HTTP server on {}", addr);

    let server_engine = engine.clone();
    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(server_engine.clone()))
            .app_data(web::Data::new(events.clone()))
            .wrap(middleware::Logger::default())
            .wrap(metrics::MetricsMiddleware)
            .route("/health", web::get().to(|| async { "OK" }))
            .route("/metrics", web::get().to(metrics::serve_metrics))
            .configure(|cfg| {
                register_notifications(cfg);
                register_realtime(cfg);
            })
    })
    .bind(&addr)
    .with_context(|| format!("failed to bind {}", addr))?
    .run()
    .await?;

    engine.unmount().await;
    tracing::info!("Notification sync service stopped");
    Ok(())
}
