use std::sync::Arc;
use std::time::Duration;
use crate::error::{Error, Result};
use crate::interfaces::ledger_store::{DebitOutcome, LedgerStore};
use crate::settlement::ledger::{LedgerEntry, Posting};
use crate::types::amount::Amount;
use crate::types::ids::UserId;
use crate::utils::helper::with_timeout;

/// Ledger primitive: the only path through which wallet balances change.
/// Both directions append a wallet history entry inside the store.
pub struct BalanceManager {
    store: Arc<dyn LedgerStore>,
    timeout: Duration,
}

impl BalanceManager {
    pub fn new(store: Arc<dyn LedgerStore>, timeout: Duration) -> Self {
        BalanceManager { store, timeout }
    }

    /// Atomic check-and-decrement. A short balance surfaces as
    /// `Error::InsufficientFunds` so callers can answer 400 rather than 500.
    pub async fn debit(&self, user_id: UserId, amount: Amount, posting: Posting) -> Result<LedgerEntry> {
        let key = posting.idempotency_key.clone();
        let outcome = with_timeout("ledger debit", self.timeout, self.store.debit(user_id, amount, posting)).await?;

        match outcome {
            DebitOutcome::Applied(entry) => {
                tracing::debug!(user_id = %user_id, amount = %amount, key = %key, balance_after = %entry.balance_after, "debit applied");
                Ok(entry)
            }
            DebitOutcome::InsufficientFunds { available } => {
                tracing::info!(user_id = %user_id, amount = %amount, available = %available, "debit rejected: insufficient funds");
                Err(Error::InsufficientFunds {
                    required: amount,
                    available,
                })
            }
        }
    }

    pub async fn credit(&self, user_id: UserId, amount: Amount, posting: Posting) -> Result<LedgerEntry> {
        let key = posting.idempotency_key.clone();
        let entry = with_timeout("ledger credit", self.timeout, self.store.credit(user_id, amount, posting)).await?;
        tracing::debug!(user_id = %user_id, amount = %amount, key = %key, balance_after = %entry.balance_after, "credit applied");
        Ok(entry)
    }

    /// Credit retried under one idempotency key, so a retry after an
    /// ambiguous failure can never pay out twice.
    pub async fn credit_with_retry(
        &self,
        user_id: UserId,
        amount: Amount,
        posting: Posting,
        attempts: u32,
    ) -> Result<LedgerEntry> {
        let attempts = attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            match self.credit(user_id, amount, posting.clone()).await {
                Ok(entry) => return Ok(entry),
                Err(e) => {
                    tracing::warn!(attempt, attempts, key = %posting.idempotency_key, error = %e, "credit attempt failed");
                    last_error = Some(e);
                    if attempt < attempts {
                        tokio::time::sleep(Duration::from_millis(50 * attempt as u64)).await;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| Error::Ledger("credit not attempted".to_string())))
    }

    /// Whether a posting landed, for calls whose acknowledgement was lost.
    pub async fn find_posting(&self, idempotency_key: &str) -> Result<Option<LedgerEntry>> {
        with_timeout("ledger lookup", self.timeout, self.store.find_posting(idempotency_key)).await
    }

    pub async fn history(&self, user_id: UserId) -> Result<Vec<LedgerEntry>> {
        with_timeout("ledger history", self.timeout, self.store.entries_for_user(user_id)).await
    }
}
