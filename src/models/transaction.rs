use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::types::amount::Amount;
use crate::types::ids::{CorrelationId, TransactionId, UserId, WalletId};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    P2pTransfer,
    P2pCredit,
    InvoicePayment,
    Withdrawal,
    Debit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Pending,
    Processing,
    Success,
    Failed,
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionStatus::Success | TransactionStatus::Failed)
    }

    pub fn can_transition_to(&self, next: TransactionStatus) -> bool {
        use TransactionStatus::*;
        matches!(
            (self, next),
            (Pending, Processing) | (Pending, Success) | (Pending, Failed)
                | (Processing, Success) | (Processing, Failed)
        ) || *self == next
    }
}

/// Display data captured at transfer time; never rewritten afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartySnapshot {
    pub name: String,
    pub bank: String,
    pub account_number: String,
    pub wallet_id: Option<WalletId>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub user_id: UserId,
    pub transaction_type: TransactionType,
    pub amount: Amount,
    pub fee: Amount,
    pub total_deduction: Amount,
    pub status: TransactionStatus,
    pub reference: String,
    pub correlation_id: CorrelationId,
    pub linked_reference: Option<String>,
    pub narration: Option<String>,
    pub sender: Option<PartySnapshot>,
    pub receiver: Option<PartySnapshot>,
    pub response: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    pub fn new(
        user_id: UserId,
        transaction_type: TransactionType,
        amount: Amount,
        reference: impl Into<String>,
        correlation_id: CorrelationId,
    ) -> Self {
        let now = Utc::now();
        Transaction {
            id: TransactionId::new(),
            user_id,
            transaction_type,
            amount,
            fee: Amount::zero(),
            total_deduction: amount,
            status: TransactionStatus::Pending,
            reference: reference.into(),
            correlation_id,
            linked_reference: None,
            narration: None,
            sender: None,
            receiver: None,
            response: serde_json::Value::Null,
            created_at: now,
            updated_at: now,
        }
    }

    /// Applies an update. Terminal rows only accept a no-op status.
    pub fn apply(&mut self, update: &TransactionUpdate) -> bool {
        if !self.status.can_transition_to(update.status) {
            return false;
        }
        self.status = update.status;
        if let Some(fee) = update.fee {
            self.fee = fee;
        }
        if let Some(total) = update.total_deduction {
            self.total_deduction = total;
        }
        if let Some(linked) = &update.linked_reference {
            self.linked_reference = Some(linked.clone());
        }
        if self.sender.is_none() {
            self.sender = update.sender.clone();
        }
        if self.receiver.is_none() {
            self.receiver = update.receiver.clone();
        }
        if let Some(response) = &update.response {
            self.response = response.clone();
        }
        self.updated_at = Utc::now();
        true
    }
}

#[derive(Clone, Debug)]
pub struct TransactionUpdate {
    pub status: TransactionStatus,
    pub fee: Option<Amount>,
    pub total_deduction: Option<Amount>,
    pub linked_reference: Option<String>,
    pub sender: Option<PartySnapshot>,
    pub receiver: Option<PartySnapshot>,
    pub response: Option<serde_json::Value>,
}

impl TransactionUpdate {
    pub fn status(status: TransactionStatus) -> Self {
        TransactionUpdate {
            status,
            fee: None,
            total_deduction: None,
            linked_reference: None,
            sender: None,
            receiver: None,
            response: None,
        }
    }

    pub fn failed(reason: &str) -> Self {
        TransactionUpdate {
            response: Some(serde_json::json!({ "failure_reason": reason })),
            ..Self::status(TransactionStatus::Failed)
        }
    }
}
