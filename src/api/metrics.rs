use actix_web::HttpResponse;
use std::sync::atomic::{AtomicU64, Ordering};

static REQUEST_COUNT: AtomicU64 = AtomicU64::new(0);
static ERROR_COUNT: AtomicU64 = AtomicU64::new(0);
static CHECKS_RUN: AtomicU64 = AtomicU64::new(0);
static PAYMENTS_COMPLETED: AtomicU64 = AtomicU64::new(0);

pub fn increment_request_count() {
    REQUEST_COUNT.fetch_add(1, Ordering::Relaxed);
}

pub fn increment_error_count() {
    ERROR_COUNT.fetch_add(1, Ordering::Relaxed);
}

pub fn increment_checks_run() {
    CHECKS_RUN.fetch_add(1, Ordering::Relaxed);
}

pub fn increment_payments_completed() {
    PAYMENTS_COMPLETED.fetch_add(1, Ordering::Relaxed);
}

fn render() -> String {
    let counters = [
        ("http_requests_total", "Total number of HTTP requests", &REQUEST_COUNT),
        ("http_errors_total", "Total number of HTTP errors", &ERROR_COUNT),
        ("paper_checks_total", "Grammar and plagiarism check runs started", &CHECKS_RUN),
        ("payments_completed_total", "Purchases confirmed as paid", &PAYMENTS_COMPLETED),
    ];

    counters
        .iter()
        .map(|(name, help, value)| {
            format!(
                "# HELP {name} {help}\n# TYPE {name} counter\n{name} {}\n",
                value.load(Ordering::Relaxed)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[utoipa::path(
    get,
    path = "/metrics",
    tag = "Health",
    responses(
        (status = 200, description = "Prometheus counters", body = String, content_type = "text/plain")
    )
)]
pub async fn get_metrics() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(render())
}
