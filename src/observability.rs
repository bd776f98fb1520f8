use std::net::SocketAddr;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: total HTTP requests served. Labels: method, route, status.
pub const HTTP_REQUESTS_TOTAL: &str = "carrent_http_requests_total";

/// Histogram: HTTP request latency in seconds. Labels: method, route.
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "carrent_http_request_duration_seconds";

// ── Domain metrics ──────────────────────────────────────────────

/// Counter: reservations accepted.
pub const RESERVATIONS_CREATED_TOTAL: &str = "carrent_reservations_created_total";

/// Counter: reservation requests rejected for overlapping an active booking.
pub const RESERVATION_CONFLICTS_TOTAL: &str = "carrent_reservation_conflicts_total";

/// Counter: admin notification emails handed to the notifier.
pub const NOTIFICATIONS_SENT_TOTAL: &str = "carrent_notifications_sent_total";

/// Counter: admin notification emails that failed to send.
pub const NOTIFICATIONS_FAILED_TOTAL: &str = "carrent_notifications_failed_total";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: cars currently in the fleet.
pub const CARS_TOTAL: &str = "carrent_cars_total";

/// Gauge: live admin sessions.
pub const SESSIONS_ACTIVE: &str = "carrent_sessions_active";

/// Counter: rejected admin logins and bad bearer tokens.
pub const AUTH_FAILURES_TOTAL: &str = "carrent_auth_failures_total";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "carrent_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "carrent_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), String> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| format!("failed to install Prometheus metrics exporter: {e}"))?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Collapse a status code into the label used on request metrics.
pub fn status_label(status: u16) -> &'static str {
    match status {
        200..=299 => "2xx",
        300..=399 => "3xx",
        400..=499 => "4xx",
        _ => "5xx",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classes() {
        assert_eq!(status_label(200), "2xx");
        assert_eq!(status_label(201), "2xx");
        assert_eq!(status_label(304), "3xx");
        assert_eq!(status_label(409), "4xx");
        assert_eq!(status_label(500), "5xx");
    }

    #[test]
    fn disabled_exporter_is_noop() {
        assert!(init(None).is_ok());
    }
}
