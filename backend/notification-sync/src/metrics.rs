use std::time::Duration;

use actix_web::HttpResponse;
use once_cell::sync::Lazy;
use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, TextEncoder,
};

static PUSH_EVENTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "notification_sync_push_events_total",
            "Realtime insert events received, by outcome",
        ),
        &["outcome"],
    )
    .expect("failed to create notification_sync_push_events_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register notification_sync_push_events_total");
    counter
});

static SNAPSHOTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "notification_sync_snapshots_total",
            "Snapshot fetches, by origin and outcome",
        ),
        &["origin", "outcome"],
    )
    .expect("failed to create notification_sync_snapshots_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register notification_sync_snapshots_total");
    counter
});

static CONNECTION_TRANSITIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "notification_sync_connection_transitions_total",
            "Realtime channel state transitions, by target state",
        ),
        &["state"],
    )
    .expect("failed to create notification_sync_connection_transitions_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register notification_sync_connection_transitions_total");
    counter
});

static POLLER_ACTIVE: Lazy<IntGauge> = Lazy::new(|| {
    let gauge = IntGauge::new(
        "notification_sync_fallback_pollers_active",
        "Fallback pollers currently running",
    )
    .expect("failed to create notification_sync_fallback_pollers_active");
    prometheus::default_registry()
        .register(Box::new(gauge.clone()))
        .expect("failed to register notification_sync_fallback_pollers_active");
    gauge
});

static ALERTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "notification_sync_alerts_total",
            "Audible alerts for newly observed notifications, by outcome",
        ),
        &["outcome"],
    )
    .expect("failed to create notification_sync_alerts_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register notification_sync_alerts_total");
    counter
});

static MUTATIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "notification_sync_mutations_total",
            "Host-triggered mutations, by action and outcome",
        ),
        &["action", "outcome"],
    )
    .expect("failed to create notification_sync_mutations_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register notification_sync_mutations_total");
    counter
});

static HTTP_REQUESTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "notification_sync_http_requests_total",
            "Total HTTP requests handled by notification-sync",
        ),
        &["method", "path", "status"],
    )
    .expect("failed to create notification_sync_http_requests_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register notification_sync_http_requests_total");
    counter
});

static HTTP_REQUEST_DURATION_SECONDS: Lazy<HistogramVec> = Lazy::new(|| {
    let histogram = HistogramVec::new(
        HistogramOpts::new(
            "notification_sync_http_request_duration_seconds",
            "HTTP request latency for notification-sync",
        )
        .buckets(vec![0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5]),
        &["method", "path", "status"],
    )
    .expect("failed to create notification_sync_http_request_duration_seconds");
    prometheus::default_registry()
        .register(Box::new(histogram.clone()))
        .expect("failed to register notification_sync_http_request_duration_seconds");
    histogram
});

pub fn record_push_event(outcome: &str) {
    PUSH_EVENTS_TOTAL.with_label_values(&[outcome]).inc();
}

pub fn record_snapshot(origin: &str, outcome: &str) {
    SNAPSHOTS_TOTAL.with_label_values(&[origin, outcome]).inc();
}

pub fn record_connection_transition(state: &str) {
    CONNECTION_TRANSITIONS_TOTAL.with_label_values(&[state]).inc();
}

pub fn set_poller_active(active: bool) {
    if active {
        POLLER_ACTIVE.inc();
    } else {
        POLLER_ACTIVE.dec();
    }
}

pub fn record_alerts(outcome: &str, count: usize) {
    ALERTS_TOTAL
        .with_label_values(&[outcome])
        .inc_by(count as u64);
}

pub fn record_mutation(action: &str, outcome: &str) {
    MUTATIONS_TOTAL.with_label_values(&[action, outcome]).inc();
}

pub fn observe_http_request(method: &str, path: &str, status: u16, elapsed: Duration) {
    let status_label = status.to_string();
    HTTP_REQUESTS_TOTAL
        .with_label_values(&[method, path, &status_label])
        .inc();
    HTTP_REQUEST_DURATION_SECONDS
        .with_label_values(&[method, path, &status_label])
        .observe(elapsed.as_secs_f64());
}

pub async fn serve_metrics() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}

use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error,
};
use futures::future::{ready, LocalBoxFuture, Ready};
use std::rc::Rc;
use std::time::Instant;

pub struct MetricsMiddleware;

impl<S, B> Transform<S, ServiceRequest> for MetricsMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = MetricsMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(MetricsMiddlewareService {
            service: Rc::new(service),
        }))
    }
}

pub struct MetricsMiddlewareService<S> {
    service: Rc<S>,
}

impl<S, B> Service<ServiceRequest> for MetricsMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let service = self.service.clone();
        // Matched route pattern keeps label cardinality bounded
        let path = req
            .match_pattern()
            .unwrap_or_else(|| req.path().to_string());
        let method = req.method().to_string();
        let start = Instant::now();

        Box::pin(async move {
            let result = service.call(req).await;
            let elapsed = start.elapsed();
            match &result {
                Ok(response) => {
                    observe_http_request(&method, &path, response.status().as_u16(), elapsed);
                }
                Err(_) => {
                    observe_http_request(&method, &path, 500, elapsed);
                }
            }
            result
        })
    }
}
