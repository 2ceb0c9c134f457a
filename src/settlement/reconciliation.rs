use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use chrono::{Duration as ChronoDuration, Utc};
use serde::Serialize;
use serde_json::json;
use crate::error::Result;
use crate::interfaces::ledger_store::LedgerStore;
use crate::interfaces::transaction_store::TransactionStore;
use crate::interfaces::wallet_store::WalletStore;
use crate::models::transaction::{Transaction, TransactionStatus, TransactionType};
use crate::observability::metrics::RECONCILIATION_DISCREPANCIES;
use crate::settlement::ledger::{EntryType, LedgerEntry};
use crate::types::amount::Amount;
use crate::types::ids::{CorrelationId, UserId};
use crate::utils::helper::alert_operations_team_warning;

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct BalanceMismatch {
    pub user_id: UserId,
    pub balance: Amount,
    pub history_total: Amount,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct PairingViolation {
    pub correlation_id: CorrelationId,
    pub sender_amount: Amount,
    pub receiver_amount: Amount,
    pub receiver_fee: Amount,
}

#[derive(Clone, Debug, Default, Serialize)]
pub struct ReconciliationReport {
    pub wallets_checked: usize,
    pub balance_mismatches: Vec<BalanceMismatch>,
    pub rows_repaired: Vec<String>,
    pub pairing_violations: Vec<PairingViolation>,
}

impl ReconciliationReport {
    pub fn is_clean(&self) -> bool {
        self.balance_mismatches.is_empty() && self.rows_repaired.is_empty() && self.pairing_violations.is_empty()
    }
}

/// Detects ledger movement that the transaction rows do not account for
/// and repairs missing rows from the wallet history.
pub struct Reconciler {
    wallets: Arc<dyn WalletStore>,
    ledger: Arc<dyn LedgerStore>,
    transactions: Arc<dyn TransactionStore>,
    grace: ChronoDuration,
}

impl Reconciler {
    pub fn new(
        wallets: Arc<dyn WalletStore>,
        ledger: Arc<dyn LedgerStore>,
        transactions: Arc<dyn TransactionStore>,
        grace: std::time::Duration,
    ) -> Self {
        Reconciler {
            wallets,
            ledger,
            transactions,
            grace: ChronoDuration::from_std(grace).unwrap_or_else(|_| ChronoDuration::seconds(30)),
        }
    }

    pub async fn run(&self) -> Result<ReconciliationReport> {
        let mut report = ReconciliationReport::default();

        self.check_balances(&mut report).await?;
        self.repair_missing_rows(&mut report).await?;
        self.check_pairing(&mut report).await?;

        if report.is_clean() {
            tracing::debug!(wallets = report.wallets_checked, "reconciliation clean");
        } else {
            alert_operations_team_warning(format!(
                "reconciliation found {} balance mismatches, {} repaired rows, {} pairing violations",
                report.balance_mismatches.len(),
                report.rows_repaired.len(),
                report.pairing_violations.len()
            ));
        }
        Ok(report)
    }

    /// Balance must equal the sum of the wallet's history entries. A mismatch is
    /// read again once before it counts, since a transfer may land between the
    /// balance read and the history read.
    async fn check_balances(&self, report: &mut ReconciliationReport) -> Result<()> {
        for wallet in self.wallets.list_users().await? {
            report.wallets_checked += 1;
            let history_total = self.history_total(wallet.user_id).await?;
            if history_total == wallet.balance {
                continue;
            }

            let Some(fresh) = self.wallets.get_user(wallet.user_id).await? else {
                continue;
            };
            let history_total = self.history_total(fresh.user_id).await?;
            if history_total == fresh.balance {
                tracing::debug!(user_id = %fresh.user_id, "balance settled on re-read");
                continue;
            }

            RECONCILIATION_DISCREPANCIES.with_label_values(&["balance_mismatch"]).inc();
            tracing::error!(
                user_id = %fresh.user_id,
                balance = %fresh.balance,
                history_total = %history_total,
                "wallet balance disagrees with history"
            );
            report.balance_mismatches.push(BalanceMismatch {
                user_id: fresh.user_id,
                balance: fresh.balance,
                history_total,
            });
        }
        Ok(())
    }

    async fn history_total(&self, user_id: UserId) -> Result<Amount> {
        Ok(self
            .ledger
            .entries_for_user(user_id)
            .await?
            .iter()
            .map(|e| e.amount)
            .sum())
    }

    async fn repair_missing_rows(&self, report: &mut ReconciliationReport) -> Result<()> {
        let entries = self.ledger.all_entries().await?;
        let by_key: HashMap<&str, &LedgerEntry> = entries
            .iter()
            .map(|e| (e.idempotency_key.as_str(), e))
            .collect();
        let cutoff = Utc::now() - self.grace;
        let mut seen = HashSet::new();

        for entry in &entries {
            // Deposits arrive from outside; fee and refund entries hang off
            // another row's reference.
            if matches!(entry.entry_type, EntryType::Deposit | EntryType::PlatformFee | EntryType::Refund) {
                continue;
            }
            if entry.created_at > cutoff || !seen.insert(entry.transaction_reference.clone()) {
                continue;
            }
            if self.transactions.find_by_reference(&entry.transaction_reference).await?.is_some() {
                continue;
            }

            let row = Self::reconstruct(entry, &by_key);
            RECONCILIATION_DISCREPANCIES.with_label_values(&["missing_row"]).inc();
            tracing::warn!(
                reference = %row.reference,
                user_id = %row.user_id,
                status = ?row.status,
                "reconstructing missing transaction row"
            );
            match self.transactions.insert_transaction(row).await {
                Ok(()) | Err(crate::error::Error::DuplicateReference(_)) => {
                    report.rows_repaired.push(entry.transaction_reference.clone());
                }
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    fn reconstruct(entry: &LedgerEntry, by_key: &HashMap<&str, &LedgerEntry>) -> Transaction {
        let correlation_id = entry.correlation_id.unwrap_or_default();
        let sibling = |step: &str| {
            entry
                .correlation_id
                .and_then(|cid| by_key.get(cid.posting_key(step).as_str()).copied())
        };

        let (transaction_type, fee, status) = match entry.entry_type {
            EntryType::P2pCredit => match sibling("fee") {
                Some(fee) => (TransactionType::InvoicePayment, fee.amount, TransactionStatus::Success),
                None => (TransactionType::P2pCredit, Amount::zero(), TransactionStatus::Success),
            },
            EntryType::Withdrawal | EntryType::P2pDebit => {
                let kind = if entry.entry_type == EntryType::Withdrawal {
                    TransactionType::Withdrawal
                } else {
                    TransactionType::P2pTransfer
                };
                let status = if sibling("refund").is_some() {
                    TransactionStatus::Failed
                } else {
                    TransactionStatus::Success
                };
                (kind, Amount::zero(), status)
            }
            _ => (TransactionType::Debit, Amount::zero(), TransactionStatus::Success),
        };

        let mut row = Transaction::new(
            entry.user_id,
            transaction_type,
            Amount::from_minor(entry.amount.minor().abs()),
            entry.transaction_reference.clone(),
            correlation_id,
        );
        row.fee = fee;
        row.status = status;
        row.narration = Some(entry.description.clone());
        row.response = json!({
            "reconstructed": true,
            "entry_id": entry.entry_id,
        });
        row
    }

    /// Sender pays exactly what the receiver got plus the platform fee.
    async fn check_pairing(&self, report: &mut ReconciliationReport) -> Result<()> {
        let mut groups: HashMap<CorrelationId, (Option<Transaction>, Option<Transaction>)> = HashMap::new();
        for tx in self.transactions.all_transactions().await? {
            let slot = groups.entry(tx.correlation_id).or_default();
            match tx.transaction_type {
                TransactionType::P2pTransfer => slot.0 = Some(tx),
                TransactionType::P2pCredit | TransactionType::InvoicePayment => slot.1 = Some(tx),
                _ => {}
            }
        }

        for (correlation_id, pair) in groups {
            let (Some(sender), Some(receiver)) = pair else {
                continue;
            };
            if sender.status != TransactionStatus::Success {
                continue;
            }
            if sender.amount != receiver.amount + receiver.fee {
                RECONCILIATION_DISCREPANCIES.with_label_values(&["pairing"]).inc();
                tracing::error!(
                    correlation_id = %correlation_id,
                    sender_amount = %sender.amount,
                    receiver_amount = %receiver.amount,
                    receiver_fee = %receiver.fee,
                    "transfer rows do not pair"
                );
                report.pairing_violations.push(PairingViolation {
                    correlation_id,
                    sender_amount: sender.amount,
                    receiver_amount: receiver.amount,
                    receiver_fee: receiver.fee,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crate::settlement::accounts::WalletAccount;
    use crate::settlement::ledger::Posting;
    use crate::store::memory::MemoryStore;
    use crate::types::ids::WalletId;

    fn reconciler(store: &Arc<MemoryStore>) -> Reconciler {
        Reconciler::new(store.clone(), store.clone(), store.clone(), std::time::Duration::ZERO)
    }

    /// Lists wallets from an old snapshot. `get_user` reads live data unless `frozen`.
    struct SnapshotWallets {
        inner: Arc<MemoryStore>,
        snapshot: Vec<WalletAccount>,
        frozen: bool,
    }

    #[async_trait]
    impl WalletStore for SnapshotWallets {
        async fn get_user(&self, user_id: UserId) -> Result<Option<WalletAccount>> {
            if self.frozen {
                return Ok(self.snapshot.iter().find(|w| w.user_id == user_id).cloned());
            }
            self.inner.get_user(user_id).await
        }

        async fn get_user_by_wallet_id(&self, wallet_id: WalletId) -> Result<Option<WalletAccount>> {
            self.inner.get_user_by_wallet_id(wallet_id).await
        }

        async fn list_users(&self) -> Result<Vec<WalletAccount>> {
            Ok(self.snapshot.clone())
        }
    }

    async fn snapshot_then_deposit(frozen: bool) -> (Arc<MemoryStore>, Reconciler, UserId) {
        let store = Arc::new(MemoryStore::new());
        let user = store.create_wallet(WalletAccount::new("Ada", "Platform Wallet", "1", "")).unwrap();
        store.deposit(user.user_id, Amount::from_minor(1_000), "seed").unwrap();
        let snapshot = store.list_users().await.unwrap();
        store.deposit(user.user_id, Amount::from_minor(500), "top-up").unwrap();

        let wallets = Arc::new(SnapshotWallets { inner: store.clone(), snapshot, frozen });
        let reconciler = Reconciler::new(wallets, store.clone(), store.clone(), std::time::Duration::ZERO);
        (store, reconciler, user.user_id)
    }

    #[tokio::test]
    async fn balance_moving_mid_check_is_not_a_mismatch() {
        let (_store, reconciler, _) = snapshot_then_deposit(false).await;
        let report = reconciler.run().await.unwrap();
        assert_eq!(report.wallets_checked, 1);
        assert!(report.balance_mismatches.is_empty());
    }

    #[tokio::test]
    async fn persistent_mismatch_is_reported() {
        let (_store, reconciler, user_id) = snapshot_then_deposit(true).await;
        let report = reconciler.run().await.unwrap();
        assert_eq!(
            report.balance_mismatches,
            vec![BalanceMismatch {
                user_id,
                balance: Amount::from_minor(1_000),
                history_total: Amount::from_minor(1_500),
            }]
        );
    }

    #[tokio::test]
    async fn clean_store_reports_nothing() {
        let store = Arc::new(MemoryStore::new());
        let user = store.create_wallet(WalletAccount::new("Ada", "Platform Wallet", "1", "")).unwrap();
        store.deposit(user.user_id, Amount::from_minor(1_000), "seed").unwrap();

        let report = reconciler(&store).run().await.unwrap();
        assert_eq!(report.wallets_checked, 1);
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn credit_without_row_is_reconstructed() {
        let store = Arc::new(MemoryStore::new());
        let user = store.create_wallet(WalletAccount::new("Bayo", "Platform Wallet", "2", "")).unwrap();
        let cid = CorrelationId::new();
        store
            .credit(
                user.user_id,
                Amount::from_minor(2_000),
                Posting::for_transfer(cid, "credit", EntryType::P2pCredit, "P2PCR-X", "Transfer from Ada"),
            )
            .await
            .unwrap();

        let report = reconciler(&store).run().await.unwrap();
        assert_eq!(report.rows_repaired, vec!["P2PCR-X".to_string()]);

        let row = store.find_by_reference("P2PCR-X").await.unwrap().unwrap();
        assert_eq!(row.transaction_type, TransactionType::P2pCredit);
        assert_eq!(row.amount, Amount::from_minor(2_000));
        assert_eq!(row.correlation_id, cid);
        assert_eq!(row.response["reconstructed"], json!(true));

        let second = reconciler(&store).run().await.unwrap();
        assert!(second.rows_repaired.is_empty());
    }

    #[tokio::test]
    async fn mismatched_pair_is_reported() {
        let store = Arc::new(MemoryStore::new());
        let cid = CorrelationId::new();
        let mut sender = Transaction::new(UserId::new(), TransactionType::P2pTransfer, Amount::from_minor(5_000), "P2P-1", cid);
        sender.status = TransactionStatus::Success;
        let mut receiver = Transaction::new(UserId::new(), TransactionType::InvoicePayment, Amount::from_minor(4_900), "P2PCR-1", cid);
        receiver.fee = Amount::from_minor(50);
        store.insert_transaction(sender).await.unwrap();
        store.insert_transaction(receiver).await.unwrap();

        let report = reconciler(&store).run().await.unwrap();
        assert_eq!(report.pairing_violations.len(), 1);
        assert_eq!(report.pairing_violations[0].correlation_id, cid);
    }
}
