use std::collections::VecDeque;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use crate::error::{Error, Result};
use crate::models::invoice::InvoicePayment;
use crate::models::transaction::{Transaction, TransactionUpdate};
use crate::observability::metrics::OUTBOX_REPLAYED;
use crate::settlement::balance_manager::BalanceManager;
use crate::settlement::invoice_settler::InvoiceSettler;
use crate::settlement::ledger::Posting;
use crate::settlement::transaction_writer::TransactionWriter;
use crate::types::amount::Amount;
use crate::types::ids::{InvoiceId, UserId};
use crate::utils::helper::alert_operations_team_critical;

/// Attempts after which every further failure raises a critical alert.
const ALERT_AFTER_ATTEMPTS: u32 = 10;

/// A bookkeeping write that failed after funds had already moved.
/// Every variant is safe to apply more than once.
#[derive(Clone, Debug)]
pub enum DeferredWrite {
    InsertTransaction(Transaction),
    UpdateTransaction {
        reference: String,
        update: TransactionUpdate,
    },
    InsertInvoicePayment(InvoicePayment),
    SettleInvoice {
        invoice_id: InvoiceId,
        gross: Amount,
        transfer_reference: String,
    },
    CreditPlatformFee {
        user_id: UserId,
        amount: Amount,
        posting: Posting,
    },
}

impl DeferredWrite {
    pub fn kind(&self) -> &'static str {
        match self {
            DeferredWrite::InsertTransaction(_) => "insert_transaction",
            DeferredWrite::UpdateTransaction { .. } => "update_transaction",
            DeferredWrite::InsertInvoicePayment(_) => "insert_invoice_payment",
            DeferredWrite::SettleInvoice { .. } => "settle_invoice",
            DeferredWrite::CreditPlatformFee { .. } => "credit_platform_fee",
        }
    }
}

#[derive(Clone, Debug)]
pub struct PendingWrite {
    pub write: DeferredWrite,
    pub attempts: u32,
    pub last_error: String,
    pub enqueued_at: DateTime<Utc>,
}

/// Handles needed to replay deferred writes.
pub struct OutboxTargets<'a> {
    pub transactions: &'a TransactionWriter,
    pub invoices: &'a InvoiceSettler,
    pub ledger: &'a BalanceManager,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub replayed: usize,
    pub requeued: usize,
}

#[derive(Default)]
pub struct Outbox {
    queue: Mutex<VecDeque<PendingWrite>>,
}

impl Outbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn push(&self, write: DeferredWrite, error: &Error) {
        tracing::warn!(kind = write.kind(), error = %error, "bookkeeping write deferred to outbox");
        self.queue.lock().await.push_back(PendingWrite {
            write,
            attempts: 1,
            last_error: error.to_string(),
            enqueued_at: Utc::now(),
        });
    }

    pub async fn len(&self) -> usize {
        self.queue.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.queue.lock().await.is_empty()
    }

    pub async fn pending(&self) -> Vec<PendingWrite> {
        self.queue.lock().await.iter().cloned().collect()
    }

    /// Replays everything queued at the time of the call. Writes that fail
    /// again go to the back of the queue; nothing is ever dropped.
    pub async fn drain(&self, targets: &OutboxTargets<'_>) -> DrainReport {
        let batch: Vec<PendingWrite> = self.queue.lock().await.drain(..).collect();
        let mut report = DrainReport::default();
        let mut failed = Vec::new();

        for mut pending in batch {
            let kind = pending.write.kind();
            match Self::replay(&pending.write, targets).await {
                Ok(()) => {
                    OUTBOX_REPLAYED.with_label_values(&[kind, "ok"]).inc();
                    tracing::info!(kind, attempts = pending.attempts, "deferred write replayed");
                    report.replayed += 1;
                }
                Err(e) => {
                    OUTBOX_REPLAYED.with_label_values(&[kind, "error"]).inc();
                    pending.attempts += 1;
                    pending.last_error = e.to_string();
                    if pending.attempts >= ALERT_AFTER_ATTEMPTS {
                        alert_operations_team_critical(format!(
                            "deferred {} write still failing after {} attempts: {}",
                            kind, pending.attempts, e
                        ));
                    }
                    failed.push(pending);
                    report.requeued += 1;
                }
            }
        }

        if !failed.is_empty() {
            self.queue.lock().await.extend(failed);
        }
        report
    }

    async fn replay(write: &DeferredWrite, targets: &OutboxTargets<'_>) -> Result<()> {
        match write {
            DeferredWrite::InsertTransaction(tx) => targets.transactions.insert(tx.clone()).await,
            DeferredWrite::UpdateTransaction { reference, update } => {
                targets.transactions.update(reference, update.clone()).await.map(|_| ())
            }
            DeferredWrite::InsertInvoicePayment(payment) => targets.invoices.record_payment(payment.clone()).await,
            DeferredWrite::SettleInvoice {
                invoice_id,
                gross,
                transfer_reference,
            } => targets.invoices.settle(*invoice_id, *gross, transfer_reference).await.map(|_| ()),
            DeferredWrite::CreditPlatformFee {
                user_id,
                amount,
                posting,
            } => targets.ledger.credit(*user_id, *amount, posting.clone()).await.map(|_| ()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interfaces::transaction_store::TransactionStore;
    use crate::models::transaction::{TransactionStatus, TransactionType};
    use crate::settlement::accounts::WalletAccount;
    use crate::settlement::ledger::EntryType;
    use crate::store::memory::MemoryStore;
    use crate::types::ids::CorrelationId;
    use std::sync::Arc;
    use std::time::Duration;

    struct Fixture {
        store: Arc<MemoryStore>,
        writer: TransactionWriter,
        settler: InvoiceSettler,
        ledger: BalanceManager,
    }

    impl Fixture {
        fn new() -> Self {
            let store = Arc::new(MemoryStore::new());
            let timeout = Duration::from_secs(1);
            Fixture {
                writer: TransactionWriter::new(store.clone(), timeout),
                settler: InvoiceSettler::new(store.clone(), timeout),
                ledger: BalanceManager::new(store.clone(), timeout),
                store,
            }
        }

        fn targets(&self) -> OutboxTargets<'_> {
            OutboxTargets {
                transactions: &self.writer,
                invoices: &self.settler,
                ledger: &self.ledger,
            }
        }
    }

    #[tokio::test]
    async fn replays_missing_row() {
        let fx = Fixture::new();
        let outbox = Outbox::new();
        let tx = Transaction::new(
            UserId::new(),
            TransactionType::P2pCredit,
            Amount::from_minor(2_000),
            "P2PCR-1",
            CorrelationId::new(),
        );
        outbox.push(DeferredWrite::InsertTransaction(tx), &Error::Store("down".into())).await;

        let report = outbox.drain(&fx.targets()).await;
        assert_eq!(report, DrainReport { replayed: 1, requeued: 0 });
        assert!(outbox.is_empty().await);
        let row = fx.store.find_by_reference("P2PCR-1").await.unwrap().unwrap();
        assert_eq!(row.status, TransactionStatus::Pending);
    }

    #[tokio::test]
    async fn failing_write_is_requeued() {
        let fx = Fixture::new();
        let outbox = Outbox::new();
        outbox
            .push(
                DeferredWrite::UpdateTransaction {
                    reference: "missing".into(),
                    update: TransactionUpdate::status(TransactionStatus::Success),
                },
                &Error::Store("down".into()),
            )
            .await;

        let report = outbox.drain(&fx.targets()).await;
        assert_eq!(report.requeued, 1);
        let pending = outbox.pending().await;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].attempts, 2);
    }

    #[tokio::test]
    async fn fee_credit_replay_is_idempotent() {
        let fx = Fixture::new();
        let platform = fx
            .store
            .create_wallet(WalletAccount::new("Platform", "Platform Wallet", "0", ""))
            .unwrap();
        let posting = Posting::for_transfer(CorrelationId::new(), "fee", EntryType::PlatformFee, "P2PCR-2", "fee");
        let outbox = Outbox::new();
        for _ in 0..2 {
            outbox
                .push(
                    DeferredWrite::CreditPlatformFee {
                        user_id: platform.user_id,
                        amount: Amount::from_minor(100),
                        posting: posting.clone(),
                    },
                    &Error::Timeout { operation: "ledger credit".into() },
                )
                .await;
        }
        outbox.drain(&fx.targets()).await;
        assert_eq!(fx.store.balance_of(platform.user_id), Some(Amount::from_minor(100)));
    }
}
