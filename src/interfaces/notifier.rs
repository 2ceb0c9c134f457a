use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::Result;
use crate::types::ids::UserId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailTemplate {
    TransferSent,
    TransferReceived,
    InvoicePaid,
    WithdrawalCompleted,
    WithdrawalFailed,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransactionEmail {
    pub template: EmailTemplate,
    pub recipient: UserId,
    pub recipient_name: String,
    pub recipient_email: Option<String>,
    pub payload: serde_json::Value,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_transaction_email(&self, email: TransactionEmail) -> Result<()>;
}
