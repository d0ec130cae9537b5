pub const SEARCH_REQUESTS: &str = "gateway_search_requests_total";
pub const SEARCH_FAILURES: &str = "gateway_search_failures_total";
pub const SEARCH_DURATION: &str = "gateway_search_duration_seconds";
pub const BUILDS_STARTED: &str = "gateway_index_builds_started_total";
pub const BUILDS_COMPLETED: &str = "gateway_index_builds_completed_total";
pub const BUILDS_FAILED: &str = "gateway_index_builds_failed_total";

/// `RUST_LOG` wins over `default_level`.
pub fn init_logging(default_level: &str) {
    let fallback = format!("gateway_service={default_level},tower_http={default_level}");
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| fallback.into()),
        )
        .init();
}

pub fn init_metrics() {
    metrics::describe_counter!(SEARCH_REQUESTS, "Total number of search requests");
    metrics::describe_counter!(
        SEARCH_FAILURES,
        "Search requests that failed inside the engine"
    );
    metrics::describe_histogram!(SEARCH_DURATION, "Search request duration");
    metrics::describe_counter!(BUILDS_STARTED, "Index builds accepted");
    metrics::describe_counter!(BUILDS_COMPLETED, "Index builds that completed");
    metrics::describe_counter!(
        BUILDS_FAILED,
        "Index builds that ended in error or were cancelled"
    );
}
