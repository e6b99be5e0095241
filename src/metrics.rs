use axum::{
    Router,
    extract::{MatchedPath, Request},
    middleware::Next,
    response::Response,
    routing::get,
};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

use rollcall_models::{AttendanceSource, AttendanceStatus, CodeKind, ValidationOutcome};

static METRICS_ENABLED: OnceLock<bool> = OnceLock::new();

/// Check if metrics are enabled via the METRICS_ENABLED env var
pub fn is_metrics_enabled() -> bool {
    *METRICS_ENABLED.get_or_init(|| {
        std::env::var("METRICS_ENABLED")
            .map(|v| v.to_lowercase() != "false" && v != "0")
            .unwrap_or(true)
    })
}

/// Install the Prometheus recorder and its upkeep task.
/// Returns None if metrics are disabled.
pub fn init_metrics() -> anyhow::Result<Option<PrometheusHandle>> {
    if !is_metrics_enabled() {
        return Ok(None);
    }

    let handle = PrometheusBuilder::new()
        .set_buckets_for_metric(
            Matcher::Full("http_request_duration_seconds".to_string()),
            &[
                0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
            ],
        )?
        .install_recorder()?;

    let upkeep_handle = handle.clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(Duration::from_secs(5)).await;
            upkeep_handle.run_upkeep();
        }
    });

    Ok(Some(handle))
}

/// Metrics middleware to track HTTP requests
pub async fn metrics_middleware(req: Request, next: Next) -> Response {
    if !is_metrics_enabled() {
        return next.run(req).await;
    }

    let start = Instant::now();
    let method = req.method().as_str().to_owned();
    let path = req
        .extensions()
        .get::<MatchedPath>()
        .map(|p| p.as_str().to_owned())
        .unwrap_or_else(|| req.uri().path().to_owned());

    gauge!("http_requests_active").increment(1.0);

    let response = next.run(req).await;

    let latency = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    counter!("http_requests_total", "method" => method.clone(), "path" => path.clone(), "status" => status).increment(1);
    histogram!("http_request_duration_seconds", "method" => method, "path" => path).record(latency);
    gauge!("http_requests_active").decrement(1.0);

    response
}

/// Router exposing the Prometheus scrape endpoint
pub fn metrics_router(handle: PrometheusHandle) -> Router {
    Router::new().route("/metrics", get(move || async move { handle.render() }))
}

// Business metrics helpers

pub fn track_login(outcome: &'static str) {
    if !is_metrics_enabled() {
        return;
    }
    counter!("rollcall_logins_total", "outcome" => outcome).increment(1);
}

pub fn track_credential_registered(role: &str) {
    if !is_metrics_enabled() {
        return;
    }
    counter!("rollcall_credentials_registered_total", "role" => role.to_string()).increment(1);
}

pub fn track_code_issued(kind: CodeKind, rotated: bool) {
    if !is_metrics_enabled() {
        return;
    }
    let trigger = if rotated { "rotate" } else { "start" };
    counter!("rollcall_codes_issued_total", "kind" => kind.as_str(), "trigger" => trigger)
        .increment(1);
}

pub fn track_code_validation(kind: CodeKind, outcome: ValidationOutcome) {
    if !is_metrics_enabled() {
        return;
    }
    counter!("rollcall_code_validations_total", "kind" => kind.as_str(), "outcome" => outcome.as_str())
        .increment(1);
}

pub fn track_attendance_transition(status: AttendanceStatus, source: AttendanceSource) {
    if !is_metrics_enabled() {
        return;
    }
    counter!("rollcall_attendance_transitions_total", "status" => status.as_str(), "source" => source.as_str())
        .increment(1);
}

pub fn track_upstream_failure(operation: &'static str) {
    if !is_metrics_enabled() {
        return;
    }
    counter!("rollcall_upstream_failures_total", "operation" => operation).increment(1);
}
