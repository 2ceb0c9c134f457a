use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use crate::core::state_machine::TransferState;
use crate::error::Error;
use crate::types::ids::CorrelationId;

/// Saga log record for one idempotency key.
#[derive(Clone, Debug)]
pub struct JournalRecord {
    pub idempotency_key: String,
    pub fingerprint: String,
    pub correlation_id: CorrelationId,
    pub state: TransferState,
    pub partial_failures: Vec<&'static str>,
    pub outcome: Option<StoredOutcome>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JournalRecord {
    pub fn new(idempotency_key: &str, fingerprint: &str, correlation_id: CorrelationId) -> Self {
        let now = Utc::now();
        JournalRecord {
            idempotency_key: idempotency_key.to_string(),
            fingerprint: fingerprint.to_string(),
            correlation_id,
            state: TransferState::Validating,
            partial_failures: Vec::new(),
            outcome: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Final result kept for replays. Receipts are stored as JSON so the
/// same journal serves transfers and withdrawals.
#[derive(Clone, Debug)]
pub enum StoredOutcome {
    Succeeded(serde_json::Value),
    Failed(Error),
}

#[derive(Clone, Debug)]
pub enum JournalBegin {
    Fresh(CorrelationId),
    InFlight(CorrelationId),
    Replay(StoredOutcome),
    FingerprintMismatch,
}

/// Hash of the money-relevant request fields. The PIN is never included.
pub fn fingerprint(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update([0x1f]);
    }
    hex::encode(hasher.finalize())
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JournalView {
    pub idempotency_key: String,
    pub correlation_id: CorrelationId,
    pub state: TransferState,
    pub partial_failures: Vec<String>,
}

impl From<&JournalRecord> for JournalView {
    fn from(record: &JournalRecord) -> Self {
        JournalView {
            idempotency_key: record.idempotency_key.clone(),
            correlation_id: record.correlation_id,
            state: record.state,
            partial_failures: record.partial_failures.iter().map(|s| s.to_string()).collect(),
        }
    }
}
