use std::net::SocketAddr;

use crate::reconciler::Mutation;

// ── Reconciler ──────────────────────────────────────────────────

/// Counter: mutations attempted. Labels: kind, outcome.
pub const MUTATIONS_TOTAL: &str = "roomcal_mutations_total";

/// Counter: optimistic mutations reverted after a store rejection.
pub const ROLLBACKS_TOTAL: &str = "roomcal_rollbacks_total";

/// Counter: list refreshes. Labels: status.
pub const REFRESHES_TOTAL: &str = "roomcal_refreshes_total";

/// Counter: remote records dropped during refresh because they could not be decoded.
pub const SKIPPED_RECORDS_TOTAL: &str = "roomcal_skipped_records_total";

/// Gauge: reservations in the canonical set.
pub const CANONICAL_RESERVATIONS: &str = "roomcal_canonical_reservations";

// ── Store server ────────────────────────────────────────────────

/// Counter: wire requests served. Labels: op, status.
pub const REQUESTS_TOTAL: &str = "roomcal_requests_total";

/// Histogram: wire request latency in seconds. Labels: op.
pub const REQUEST_DURATION_SECONDS: &str = "roomcal_request_duration_seconds";

/// Gauge: open client connections.
pub const CONNECTIONS_ACTIVE: &str = "roomcal_connections_active";

/// Counter: connections accepted.
pub const CONNECTIONS_TOTAL: &str = "roomcal_connections_total";

/// Counter: connections refused at the limit.
pub const CONNECTIONS_REJECTED_TOTAL: &str = "roomcal_connections_rejected_total";

/// Histogram: journal group-commit flush duration in seconds.
pub const JOURNAL_FLUSH_DURATION_SECONDS: &str = "roomcal_journal_flush_duration_seconds";

/// Histogram: events per journal flush.
pub const JOURNAL_FLUSH_BATCH_SIZE: &str = "roomcal_journal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Short label for a mutation kind.
pub fn mutation_label(m: &Mutation) -> &'static str {
    match m {
        Mutation::Create(_) => "create",
        Mutation::Edit { .. } => "edit",
        Mutation::Reschedule { .. } => "reschedule",
        Mutation::Delete { .. } => "delete",
    }
}
