use async_trait::async_trait;
use crate::error::Result;
use crate::models::transaction::{Transaction, TransactionUpdate};
use crate::types::ids::{CorrelationId, UserId};

#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Fails with `DuplicateReference` when the reference is taken.
    async fn insert_transaction(&self, transaction: Transaction) -> Result<()>;
    async fn update_transaction_by_reference(
        &self,
        reference: &str,
        update: TransactionUpdate,
    ) -> Result<Transaction>;
    async fn find_by_reference(&self, reference: &str) -> Result<Option<Transaction>>;
    async fn find_by_correlation(&self, correlation_id: CorrelationId) -> Result<Vec<Transaction>>;
    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Transaction>>;
    async fn all_transactions(&self) -> Result<Vec<Transaction>>;
}
