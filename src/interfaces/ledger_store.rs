use async_trait::async_trait;
use crate::error::Result;
use crate::settlement::ledger::{LedgerEntry, Posting};
use crate::types::amount::Amount;
use crate::types::ids::UserId;

#[derive(Clone, Debug)]
pub enum DebitOutcome {
    Applied(LedgerEntry),
    InsufficientFunds { available: Amount },
}

/// Balance mutations. Implementations must make the balance check and the
/// decrement of `debit` a single atomic step, and must return the original
/// entry when a posting's idempotency key has already been applied.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn debit(&self, user_id: UserId, amount: Amount, posting: Posting) -> Result<DebitOutcome>;
    async fn credit(&self, user_id: UserId, amount: Amount, posting: Posting) -> Result<LedgerEntry>;
    async fn find_posting(&self, idempotency_key: &str) -> Result<Option<LedgerEntry>>;
    async fn entries_for_user(&self, user_id: UserId) -> Result<Vec<LedgerEntry>>;
    async fn all_entries(&self) -> Result<Vec<LedgerEntry>>;
}
