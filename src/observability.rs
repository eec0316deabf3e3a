use std::net::SocketAddr;

// ── Scheduling metrics ──────────────────────────────────────────

/// Counter: meetings accepted, standalone or series base. Labels: kind.
pub const MEETINGS_SCHEDULED_TOTAL: &str = "plenum_meetings_scheduled_total";

/// Counter: meetings cancelled, directly or by cascade.
pub const MEETINGS_CANCELLED_TOTAL: &str = "plenum_meetings_cancelled_total";

/// Counter: schedule attempts rejected on a room clash.
pub const ROOM_CONFLICTS_TOTAL: &str = "plenum_room_conflicts_total";

/// Counter: schedule attempts rejected on a participant clash.
pub const PARTICIPANT_CONFLICTS_TOTAL: &str = "plenum_participant_conflicts_total";

/// Counter: series occurrences materialized.
pub const OCCURRENCES_CREATED_TOTAL: &str = "plenum_occurrences_created_total";

/// Counter: series occurrences dropped (conflict or unrepresentable time).
pub const OCCURRENCES_SKIPPED_TOTAL: &str = "plenum_occurrences_skipped_total";

/// Counter: ended meetings removed by the sweeper.
pub const MEETINGS_SWEPT_TOTAL: &str = "plenum_meetings_swept_total";

// ── Durability metrics ──────────────────────────────────────────

/// Histogram: seconds spent inside one group-commit fsync.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "plenum_wal_flush_duration_seconds";

/// Histogram: events committed per fsync.
pub const WAL_FLUSH_BATCH_SIZE: &str = "plenum_wal_flush_batch_size";

/// Serve Prometheus metrics over HTTP when a port is configured.
pub fn init(port: Option<u16>) {
    let Some(port) = port else { return };
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .expect("Prometheus exporter failed to start");
    tracing::info!("serving metrics at http://0.0.0.0:{port}/metrics");
}
