use std::future::Future;
use std::time::Duration;
use crate::error::{Error, Result};
use crate::types::ids::CorrelationId;

/// Runs a store or rail call under a deadline.
pub async fn with_timeout<T, F>(operation: &str, timeout: Duration, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(operation, timeout_ms = timeout.as_millis() as u64, "operation timed out");
            Err(Error::Timeout {
                operation: operation.to_string(),
            })
        }
    }
}

/// Human-facing transaction reference, e.g. `P2P-1A2B3C4D5E6F`.
pub fn generate_reference(prefix: &str, correlation_id: CorrelationId) -> String {
    format!("{}-{}", prefix, correlation_id.short())
}

/// Alert operations team (critical)
pub fn alert_operations_team_critical(message: String) {
    tracing::error!(alert = "critical", "CRITICAL ALERT: {}", message);
}

/// Alert operations team (warning)
pub fn alert_operations_team_warning(message: String) {
    tracing::warn!(alert = "warning", "WARNING ALERT: {}", message);
}
