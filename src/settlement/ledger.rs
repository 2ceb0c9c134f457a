use serde::{Deserialize, Serialize};
use chrono::{DateTime, Utc};
use crate::types::amount::Amount;
use crate::types::ids::{CorrelationId, EntryId, UserId};

/// Wallet history entry. One is appended for every balance mutation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub entry_id: EntryId,
    pub created_at: DateTime<Utc>,
    pub entry_type: EntryType,
    pub user_id: UserId,
    pub amount: Amount,  // Signed: negative = debit, positive = credit
    pub balance_after: Amount,
    pub transaction_reference: String,
    pub correlation_id: Option<CorrelationId>,
    pub idempotency_key: String,
    pub description: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    Deposit,
    P2pDebit,
    P2pCredit,
    PlatformFee,
    Refund,
    Withdrawal,
}

impl EntryType {
    pub fn is_debit(&self) -> bool {
        matches!(self, EntryType::P2pDebit | EntryType::Withdrawal)
    }
}

/// Everything a ledger mutation needs besides the wallet and the amount.
#[derive(Clone, Debug)]
pub struct Posting {
    pub idempotency_key: String,
    pub entry_type: EntryType,
    pub transaction_reference: String,
    pub correlation_id: Option<CorrelationId>,
    pub description: String,
}

impl Posting {
    pub fn for_transfer(
        correlation_id: CorrelationId,
        step: &str,
        entry_type: EntryType,
        transaction_reference: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Posting {
            idempotency_key: correlation_id.posting_key(step),
            entry_type,
            transaction_reference: transaction_reference.into(),
            correlation_id: Some(correlation_id),
            description: description.into(),
        }
    }

    pub fn into_entry(self, user_id: UserId, amount: Amount, balance_after: Amount) -> LedgerEntry {
        LedgerEntry {
            entry_id: EntryId::new(),
            created_at: Utc::now(),
            entry_type: self.entry_type,
            user_id,
            amount,
            balance_after,
            transaction_reference: self.transaction_reference,
            correlation_id: self.correlation_id,
            idempotency_key: self.idempotency_key,
            description: self.description,
        }
    }
}

/// Append-only wallet history, in posting order.
#[derive(Default)]
pub struct WalletHistory {
    entries: Vec<LedgerEntry>,
}

impl WalletHistory {
    pub fn append(&mut self, entry: LedgerEntry) {
        self.entries.push(entry);
    }

    pub fn all(&self) -> Vec<LedgerEntry> {
        self.entries.clone()
    }

    pub fn for_user(&self, user_id: UserId) -> Vec<LedgerEntry> {
        self.entries
            .iter()
            .filter(|e| e.user_id == user_id)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(user_id: UserId, amount: i64) -> LedgerEntry {
        Posting {
            idempotency_key: format!("k{amount}"),
            entry_type: EntryType::Deposit,
            transaction_reference: "ref".to_string(),
            correlation_id: None,
            description: String::new(),
        }
        .into_entry(user_id, Amount::from_minor(amount), Amount::zero())
    }

    #[test]
    fn history_for_user_keeps_posting_order() {
        let ada = UserId::new();
        let bayo = UserId::new();
        let mut history = WalletHistory::default();
        history.append(entry(ada, 1_000));
        history.append(entry(bayo, 50));
        history.append(entry(ada, -300));

        let amounts: Vec<i64> = history.for_user(ada).iter().map(|e| e.amount.minor()).collect();
        assert_eq!(amounts, vec![1_000, -300]);
        assert_eq!(history.all().len(), 3);
        let total: Amount = history.for_user(ada).iter().map(|e| e.amount).sum();
        assert_eq!(total.minor(), 700);
    }
}
