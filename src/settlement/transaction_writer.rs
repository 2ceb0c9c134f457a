use std::sync::Arc;
use std::time::Duration;
use serde_json::json;
use crate::error::{Error, Result};
use crate::interfaces::transaction_store::TransactionStore;
use crate::models::invoice::Invoice;
use crate::models::transaction::{PartySnapshot, Transaction, TransactionStatus, TransactionType, TransactionUpdate};
use crate::settlement::accounts::WalletAccount;
use crate::settlement::fee_calculator::SettlementQuote;
use crate::types::amount::Amount;
use crate::types::ids::CorrelationId;
use crate::utils::helper::with_timeout;

/// Both sides of one transfer, captured before any money moves.
#[derive(Clone, Debug)]
pub struct TransferLegs {
    pub correlation_id: CorrelationId,
    pub sender_reference: String,
    pub receiver_reference: String,
    pub sender: PartySnapshot,
    pub receiver: PartySnapshot,
    pub narration: Option<String>,
}

impl TransferLegs {
    pub fn new(
        correlation_id: CorrelationId,
        sender_reference: String,
        receiver_reference: String,
        sender: &WalletAccount,
        receiver: &WalletAccount,
        narration: Option<String>,
    ) -> Self {
        TransferLegs {
            correlation_id,
            sender_reference,
            receiver_reference,
            sender: sender.snapshot(),
            receiver: receiver.snapshot(),
            narration,
        }
    }

    /// Sender row in `pending`, written before the debit.
    pub fn sender_pending(&self, sender: &WalletAccount, quote: &SettlementQuote) -> Transaction {
        let mut tx = Transaction::new(
            sender.user_id,
            TransactionType::P2pTransfer,
            quote.gross,
            self.sender_reference.clone(),
            self.correlation_id,
        );
        tx.narration = self.narration.clone();
        tx.sender = Some(self.sender.clone());
        tx.receiver = Some(self.receiver.clone());
        tx
    }

    /// Final sender update: fee stays zero, the sender always pays gross.
    pub fn sender_success(&self, quote: &SettlementQuote) -> TransactionUpdate {
        TransactionUpdate {
            fee: Some(Amount::zero()),
            total_deduction: Some(quote.gross),
            linked_reference: Some(self.receiver_reference.clone()),
            sender: Some(self.sender.clone()),
            receiver: Some(self.receiver.clone()),
            response: Some(json!({
                "correlation_id": self.correlation_id,
                "receiver_reference": self.receiver_reference,
            })),
            ..TransactionUpdate::status(TransactionStatus::Success)
        }
    }

    pub fn sender_failed(&self, reason: &str, refunded: bool) -> TransactionUpdate {
        TransactionUpdate {
            response: Some(json!({
                "failure_reason": reason,
                "refunded": refunded,
                "correlation_id": self.correlation_id,
            })),
            ..TransactionUpdate::status(TransactionStatus::Failed)
        }
    }

    /// Receiver row, created directly in `success`. Invoice settlements
    /// carry the net amount and the platform fee; plain transfers the gross.
    pub fn receiver_success(
        &self,
        receiver: &WalletAccount,
        quote: &SettlementQuote,
        invoice: Option<&Invoice>,
    ) -> Transaction {
        let transaction_type = match invoice {
            Some(_) => TransactionType::InvoicePayment,
            None => TransactionType::P2pCredit,
        };

        let mut tx = Transaction::new(
            receiver.user_id,
            transaction_type,
            quote.net,
            self.receiver_reference.clone(),
            self.correlation_id,
        );
        tx.fee = quote.platform_fee;
        tx.total_deduction = Amount::zero();
        tx.status = TransactionStatus::Success;
        tx.linked_reference = Some(self.sender_reference.clone());
        tx.narration = self.narration.clone();
        tx.sender = Some(self.sender.clone());
        tx.receiver = Some(self.receiver.clone());
        tx.response = match invoice {
            Some(inv) => json!({
                "correlation_id": self.correlation_id,
                "sender_reference": self.sender_reference,
                "invoice_id": inv.id,
                "invoice_code": inv.invoice_code,
                "gross_amount": quote.gross,
            }),
            None => json!({
                "correlation_id": self.correlation_id,
                "sender_reference": self.sender_reference,
            }),
        };
        tx
    }
}

/// Writes transaction rows. Inserts are idempotent on reference and
/// updates that were already applied are reported as success.
pub struct TransactionWriter {
    store: Arc<dyn TransactionStore>,
    timeout: Duration,
}

impl TransactionWriter {
    pub fn new(store: Arc<dyn TransactionStore>, timeout: Duration) -> Self {
        TransactionWriter { store, timeout }
    }

    pub async fn insert(&self, transaction: Transaction) -> Result<()> {
        let reference = transaction.reference.clone();
        match with_timeout("insert transaction", self.timeout, self.store.insert_transaction(transaction)).await {
            Err(Error::DuplicateReference(_)) => {
                tracing::debug!(reference = %reference, "transaction row already present");
                Ok(())
            }
            other => other,
        }
    }

    pub async fn update(&self, reference: &str, update: TransactionUpdate) -> Result<Transaction> {
        let target = update.status;
        match with_timeout(
            "update transaction",
            self.timeout,
            self.store.update_transaction_by_reference(reference, update),
        )
        .await
        {
            Ok(tx) => Ok(tx),
            Err(Error::Store(details)) => {
                // Rejected transition: fine if a replay already got it there.
                let existing = with_timeout("find transaction", self.timeout, self.store.find_by_reference(reference)).await?;
                match existing {
                    Some(tx) if tx.status == target => Ok(tx),
                    _ => Err(Error::Store(details)),
                }
            }
            Err(e) => Err(e),
        }
    }

    pub async fn find(&self, reference: &str) -> Result<Option<Transaction>> {
        with_timeout("find transaction", self.timeout, self.store.find_by_reference(reference)).await
    }
}
