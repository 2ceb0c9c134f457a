use async_trait::async_trait;
use crate::core::journal::{JournalBegin, JournalRecord, StoredOutcome};
use crate::core::state_machine::TransferState;
use crate::error::Result;
use crate::types::ids::CorrelationId;

/// Persisted saga log, keyed by the request's idempotency key.
#[async_trait]
pub trait JournalStore: Send + Sync {
    /// Registers the key atomically. A fresh key gets `correlation_id`.
    async fn begin(
        &self,
        idempotency_key: &str,
        fingerprint: &str,
        correlation_id: CorrelationId,
    ) -> Result<JournalBegin>;
    async fn record_state(&self, idempotency_key: &str, state: TransferState) -> Result<()>;
    async fn note_partial_failure(&self, idempotency_key: &str, step: &'static str) -> Result<()>;
    async fn complete(&self, idempotency_key: &str, outcome: StoredOutcome) -> Result<()>;
    /// Forgets a key whose request was rejected before moving money.
    async fn release(&self, idempotency_key: &str) -> Result<()>;
    async fn get(&self, idempotency_key: &str) -> Result<Option<JournalRecord>>;
}
