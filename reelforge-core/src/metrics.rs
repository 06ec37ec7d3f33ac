//! Prometheus metrics collection for production monitoring.
//!
//! All metrics are exposed via the `/metrics` endpoint for Prometheus scraping.

use prometheus::{
    register_counter_vec_with_registry, register_histogram_vec_with_registry,
    register_int_gauge_with_registry, CounterVec, Encoder, HistogramVec, IntGauge, Registry,
    TextEncoder,
};

/// Global metrics registry
pub static REGISTRY: std::sync::LazyLock<Registry> = std::sync::LazyLock::new(Registry::new);

/// HTTP metrics
pub mod http {
    use super::{HistogramVec, IntGauge, REGISTRY};
    use prometheus::{
        register_int_counter_vec_with_registry, register_int_gauge_with_registry, HistogramOpts,
        IntCounterVec, Opts,
    };

    /// Total HTTP requests, labeled by method, path, and status code.
    pub static HTTP_REQUESTS_TOTAL: std::sync::LazyLock<IntCounterVec> = std::sync::LazyLock::new(|| {
        register_int_counter_vec_with_registry!(
            Opts::new("http_requests_total", "Total number of HTTP requests"),
            &["method", "path", "status"],
            REGISTRY.clone()
        )
        .expect("Failed to register HTTP_REQUESTS_TOTAL")
    });

    /// HTTP request duration in seconds, labeled by method and path.
    pub static HTTP_REQUEST_DURATION_SECONDS: std::sync::LazyLock<HistogramVec> = std::sync::LazyLock::new(|| {
        HistogramVec::new(
            HistogramOpts::new(
                "http_request_duration_seconds",
                "HTTP request duration in seconds",
            )
            .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]),
            &["method", "path"],
        )
        .and_then(|m| {
            REGISTRY.register(Box::new(m.clone()))?;
            Ok(m)
        })
        .expect("Failed to register HTTP_REQUEST_DURATION_SECONDS")
    });

    /// Number of in-flight HTTP requests.
    pub static HTTP_REQUESTS_IN_FLIGHT: std::sync::LazyLock<IntGauge> = std::sync::LazyLock::new(|| {
        register_int_gauge_with_registry!(
            "http_requests_in_flight",
            "Number of HTTP requests currently being processed",
            REGISTRY.clone()
        )
        .expect("Failed to register HTTP_REQUESTS_IN_FLIGHT")
    });
}

/// Transcode pipeline metrics (C1/C4/C5/C6).
pub mod transcode {
    use super::{register_counter_vec_with_registry, register_int_gauge_with_registry, CounterVec, IntGauge, REGISTRY};

    /// Transcode sessions currently tracked active by the session manager.
    pub static SESSIONS_ACTIVE: std::sync::LazyLock<IntGauge> = std::sync::LazyLock::new(|| {
        register_int_gauge_with_registry!(
            "transcode_sessions_active",
            "Number of transcode sessions currently active",
            REGISTRY.clone()
        )
        .expect("Failed to register SESSIONS_ACTIVE")
    });

    /// Terminal transitions, labeled by outcome (`completed`, `failed`, `cancelled`).
    pub static SESSIONS_FINISHED_TOTAL: std::sync::LazyLock<CounterVec> = std::sync::LazyLock::new(|| {
        register_counter_vec_with_registry!(
            "transcode_sessions_finished_total",
            "Total number of transcode sessions reaching a terminal status",
            &["status"],
            REGISTRY.clone()
        )
        .expect("Failed to register SESSIONS_FINISHED_TOTAL")
    });

    /// Content-hash dedup hits: a start request reused an existing session.
    pub static DEDUP_HITS_TOTAL: std::sync::LazyLock<CounterVec> = std::sync::LazyLock::new(|| {
        register_counter_vec_with_registry!(
            "transcode_dedup_hits_total",
            "Total number of transcode start requests that reused an existing session",
            &["provider"],
            REGISTRY.clone()
        )
        .expect("Failed to register DEDUP_HITS_TOTAL")
    });

    /// Sessions reaped by the stale-session reaper.
    pub static SESSIONS_REAPED_TOTAL: std::sync::LazyLock<CounterVec> = std::sync::LazyLock::new(|| {
        register_counter_vec_with_registry!(
            "transcode_sessions_reaped_total",
            "Total number of transcode sessions reaped for exceeding the stale threshold",
            &["provider"],
            REGISTRY.clone()
        )
        .expect("Failed to register SESSIONS_REAPED_TOTAL")
    });
}

/// Content store / cleanup metrics (C2/C9).
pub mod storage {
    use super::{register_int_gauge_with_registry, IntGauge, REGISTRY};

    /// Total bytes currently held by the content store.
    pub static CONTENT_STORE_BYTES: std::sync::LazyLock<IntGauge> = std::sync::LazyLock::new(|| {
        register_int_gauge_with_registry!(
            "content_store_bytes",
            "Total size in bytes of the content store directory tree",
            REGISTRY.clone()
        )
        .expect("Failed to register CONTENT_STORE_BYTES")
    });
}

/// Database operations
pub mod database {
    use super::{
        register_histogram_vec_with_registry, register_int_gauge_with_registry, HistogramVec,
        IntGauge, REGISTRY,
    };
    use prometheus::{register_gauge_vec_with_registry, GaugeVec};

    /// Query duration histogram
    pub static DB_QUERY_DURATION: std::sync::LazyLock<HistogramVec> = std::sync::LazyLock::new(|| {
        register_histogram_vec_with_registry!(
            "db_query_duration_seconds",
            "Database query duration in seconds",
            &["operation", "table"],
            REGISTRY.clone()
        )
        .expect("Failed to register DB_QUERY_DURATION")
    });

    /// Active connections gauge
    pub static DB_CONNECTIONS_ACTIVE: std::sync::LazyLock<IntGauge> = std::sync::LazyLock::new(|| {
        register_int_gauge_with_registry!(
            "db_connections_active",
            "Current number of active database connections",
            REGISTRY.clone()
        )
        .expect("Failed to register DB_CONNECTIONS_ACTIVE")
    });

    /// Pool utilization percentage (0.0 to 1.0)
    pub static DB_POOL_UTILIZATION: std::sync::LazyLock<GaugeVec> = std::sync::LazyLock::new(|| {
        register_gauge_vec_with_registry!(
            "db_pool_utilization_ratio",
            "Database connection pool utilization ratio (active/max)",
            &["pool"],
            REGISTRY.clone()
        )
        .expect("Failed to register DB_POOL_UTILIZATION")
    });

    /// Total connections in the pool (max pool size)
    pub static DB_POOL_SIZE_MAX: std::sync::LazyLock<IntGauge> = std::sync::LazyLock::new(|| {
        register_int_gauge_with_registry!(
            "db_pool_size_max",
            "Maximum number of connections in the pool",
            REGISTRY.clone()
        )
        .expect("Failed to register DB_POOL_SIZE_MAX")
    });

    /// Idle connections in the pool
    pub static DB_CONNECTIONS_IDLE: std::sync::LazyLock<IntGauge> = std::sync::LazyLock::new(|| {
        register_int_gauge_with_registry!(
            "db_connections_idle",
            "Number of idle connections in the pool",
            REGISTRY.clone()
        )
        .expect("Failed to register DB_CONNECTIONS_IDLE")
    });
}

/// Helper macro to record HTTP request metrics
#[macro_export]
macro_rules! record_http_request {
    ($method:expr, $path:expr, $status:expr, $duration:expr) => {
        let status_str = $status.to_string();
        let method_str = $method.to_string();

        $crate::metrics::http::HTTP_REQUEST_DURATION_SECONDS
            .with_label_values(&[&method_str, $path])
            .observe($duration.as_secs_f64());

        $crate::metrics::http::HTTP_REQUESTS_TOTAL
            .with_label_values(&[&method_str, $path, &status_str])
            .inc();
    };
}

/// Normalize a request path for metric labels.
///
/// Replaces path parameters (session ids, library ids, nanoids) with
/// placeholders to avoid high-cardinality labels.
#[must_use]
pub fn normalize_path(path: &str) -> String {
    let segments: Vec<&str> = path.split('/').collect();
    let mut result = Vec::with_capacity(segments.len());

    for (i, segment) in segments.iter().enumerate() {
        if segment.is_empty() {
            result.push(*segment);
            continue;
        }

        let prev = if i > 0 { segments.get(i - 1) } else { None };
        let is_id = matches!(
            prev,
            Some(&"sessions" | &"transcode" | &"pause" | &"resume" | &"status" | &"file")
        );

        if is_id {
            result.push(":id");
        } else {
            result.push(segment);
        }
    }

    result.join("/")
}

/// Expose metrics in Prometheus format
#[must_use]
pub fn gather_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => {}
        Err(e) => {
            tracing::error!("Failed to encode metrics: {}", e);
            return String::from("# Failed to encode metrics\n");
        }
    }
    String::from_utf8(buffer).unwrap_or_else(|e| {
        tracing::error!("Metrics buffer contains invalid UTF-8: {}", e);
        String::from("# Invalid UTF-8 in metrics\n")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registration() {
        http::HTTP_REQUEST_DURATION_SECONDS.with_label_values(&["GET", "/test"]).observe(0.1);
        http::HTTP_REQUESTS_TOTAL.with_label_values(&["GET", "/test", "200"]).inc();

        let encoder = TextEncoder::new();
        let metric_families = REGISTRY.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).unwrap();
        let output = String::from_utf8(buffer).unwrap();
        assert!(output.contains("http_request_duration_seconds"));
    }

    #[test]
    fn normalize_path_replaces_ids() {
        assert_eq!(normalize_path("/api/v1/playback/sessions/abc123"), "/api/v1/playback/sessions/:id");
        assert_eq!(normalize_path("/api/scanner/pause/lib-1"), "/api/scanner/pause/:id");
    }
}
