use lazy_static::lazy_static;
use prometheus::{
    Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry, TextEncoder,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();

    // Transfer metrics
    pub static ref TRANSFERS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("p2p_transfers_total", "P2P transfers by outcome and classification"),
        &["outcome", "classification"]
    ).expect("metric can be created");

    pub static ref TRANSFER_LATENCY: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "p2p_transfer_latency_seconds",
            "End-to-end P2P transfer latency"
        ).buckets(vec![0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0])
    ).expect("metric can be created");

    pub static ref COMPENSATIONS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("compensations_total", "Refunds issued after a failed credit or payout"),
        &["result"]
    ).expect("metric can be created");

    pub static ref PARTIAL_FAILURES_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("partial_failures_total", "Bookkeeping steps that failed after funds moved"),
        &["step"]
    ).expect("metric can be created");

    pub static ref PLATFORM_FEES_COLLECTED: IntCounter = IntCounter::new(
        "platform_fees_collected_minor_total",
        "Platform fees credited, in minor units"
    ).expect("metric can be created");

    // Withdrawal metrics
    pub static ref WITHDRAWALS_TOTAL: IntCounterVec = IntCounterVec::new(
        Opts::new("withdrawals_total", "Withdrawals by outcome"),
        &["outcome"]
    ).expect("metric can be created");

    // Side effects
    pub static ref NOTIFICATION_FAILURES: IntCounterVec = IntCounterVec::new(
        Opts::new("notification_failures_total", "Emails that failed to send"),
        &["template"]
    ).expect("metric can be created");

    pub static ref OUTBOX_REPLAYED: IntCounterVec = IntCounterVec::new(
        Opts::new("outbox_replayed_total", "Deferred bookkeeping writes replayed"),
        &["kind", "result"]
    ).expect("metric can be created");

    pub static ref RECONCILIATION_DISCREPANCIES: IntCounterVec = IntCounterVec::new(
        Opts::new("reconciliation_discrepancies_total", "Discrepancies found by the reconciler"),
        &["kind"]
    ).expect("metric can be created");
}

pub fn register_metrics() -> prometheus::Result<()> {
    REGISTRY.register(Box::new(TRANSFERS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(TRANSFER_LATENCY.clone()))?;
    REGISTRY.register(Box::new(COMPENSATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(PARTIAL_FAILURES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(PLATFORM_FEES_COLLECTED.clone()))?;
    REGISTRY.register(Box::new(WITHDRAWALS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(NOTIFICATION_FAILURES.clone()))?;
    REGISTRY.register(Box::new(OUTBOX_REPLAYED.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DISCREPANCIES.clone()))?;
    Ok(())
}

/// Prometheus text exposition of the registry.
pub fn render() -> String {
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(e) = encoder.encode(&REGISTRY.gather(), &mut buffer) {
        ::tracing::error!(error = %e, "failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}
