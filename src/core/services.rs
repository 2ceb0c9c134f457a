use std::sync::Arc;
use std::time::Duration;
use crate::config::fees::FeeConfig;
use crate::config::transfer::TransferConfig;
use crate::controls::Controls;
use crate::core::journal::{JournalBegin, StoredOutcome};
use crate::core::state_machine::TransferState;
use crate::error::{Error, Result};
use crate::interfaces::Collaborators;
use crate::invoice::resolver::InvoiceResolver;
use crate::notifications::dispatcher::NotificationDispatcher;
use crate::observability::metrics::{COMPENSATIONS_TOTAL, PARTIAL_FAILURES_TOTAL};
use crate::settlement::accounts::WalletAccount;
use crate::settlement::balance_manager::BalanceManager;
use crate::settlement::invoice_settler::InvoiceSettler;
use crate::settlement::ledger::{EntryType, Posting};
use crate::settlement::outbox::{DeferredWrite, DrainReport, Outbox, OutboxTargets};
use crate::settlement::reconciliation::Reconciler;
use crate::settlement::transaction_writer::TransactionWriter;
use crate::types::amount::Amount;
use crate::types::ids::{CorrelationId, UserId};
use crate::utils::helper::{alert_operations_team_critical, with_timeout};

/// Shared components behind the transfer and withdrawal flows.
pub struct SettlementServices {
    pub collaborators: Collaborators,
    pub balances: BalanceManager,
    pub writer: TransactionWriter,
    pub invoices: InvoiceSettler,
    pub resolver: InvoiceResolver,
    pub outbox: Outbox,
    pub notifications: NotificationDispatcher,
    pub controls: Arc<Controls>,
    pub transfer: TransferConfig,
    pub fees: FeeConfig,
    pub platform_user_id: UserId,
}

impl SettlementServices {
    pub fn new(
        collaborators: Collaborators,
        transfer: TransferConfig,
        fees: FeeConfig,
        max_notification_attempts: u32,
        controls: Arc<Controls>,
    ) -> Result<Self> {
        let platform_user_id = fees.platform_user_id().map_err(|e| {
            Error::ConfigError(format!("fees.platform_wallet_user_id: {e}"))
        })?;
        let timeout = transfer.store_timeout();

        Ok(SettlementServices {
            balances: BalanceManager::new(collaborators.ledger.clone(), timeout),
            writer: TransactionWriter::new(collaborators.transactions.clone(), timeout),
            invoices: InvoiceSettler::new(collaborators.invoices.clone(), timeout),
            resolver: InvoiceResolver::new(collaborators.invoices.clone(), timeout),
            outbox: Outbox::new(),
            notifications: NotificationDispatcher::new(collaborators.notifier.clone(), max_notification_attempts),
            collaborators,
            controls,
            transfer,
            fees,
            platform_user_id,
        })
    }

    pub fn timeout(&self) -> Duration {
        self.transfer.store_timeout()
    }

    pub async fn find_user(&self, user_id: UserId) -> Result<WalletAccount> {
        with_timeout("get user", self.timeout(), self.collaborators.wallets.get_user(user_id))
            .await?
            .ok_or(Error::UserNotFound(user_id))
    }

    pub async fn begin_journal(&self, key: &str, fingerprint: &str, cid: CorrelationId) -> Result<JournalBegin> {
        with_timeout("journal begin", self.timeout(), self.collaborators.journal.begin(key, fingerprint, cid)).await
    }

    /// Journal bookkeeping never decides the outcome of a request.
    pub async fn journal_state(&self, key: &str, state: TransferState) {
        if let Err(e) = with_timeout("journal state", self.timeout(), self.collaborators.journal.record_state(key, state)).await {
            tracing::warn!(key, state = %state, error = %e, "journal state not recorded");
        }
    }

    pub async fn finish_journal(&self, key: &str, outcome: StoredOutcome) {
        if let Err(e) = with_timeout("journal complete", self.timeout(), self.collaborators.journal.complete(key, outcome)).await {
            tracing::warn!(key, error = %e, "journal outcome not recorded");
        }
    }

    /// Frees a key after a rejection so the client may retry with it.
    pub async fn release_journal(&self, key: &str) {
        if let Err(e) = with_timeout("journal release", self.timeout(), self.collaborators.journal.release(key)).await {
            tracing::warn!(key, error = %e, "journal key not released");
        }
    }

    /// Records a bookkeeping step that failed after funds moved and queues
    /// it for replay.
    pub async fn defer(&self, key: &str, step: &'static str, write: DeferredWrite, error: &Error) {
        PARTIAL_FAILURES_TOTAL.with_label_values(&[step]).inc();
        tracing::warn!(step, error = %error, "bookkeeping step failed after funds moved");
        if let Err(e) = self.collaborators.journal.note_partial_failure(key, step).await {
            tracing::warn!(key, step, error = %e, "partial failure not journaled");
        }
        self.outbox.push(write, error).await;
    }

    /// Compensating credit keyed `{cid}:refund`, retried under the same
    /// key. Returns whether the funds are back with the user.
    pub async fn refund(&self, user_id: UserId, amount: Amount, reference: &str, cid: CorrelationId) -> bool {
        let posting = Posting::for_transfer(cid, "refund", EntryType::Refund, reference, format!("Refund for {reference}"));
        match self
            .balances
            .credit_with_retry(user_id, amount, posting, self.transfer.refund_attempts)
            .await
        {
            Ok(entry) => {
                COMPENSATIONS_TOTAL.with_label_values(&["refunded"]).inc();
                tracing::error!(
                    user_id = %user_id,
                    amount = %amount,
                    reference,
                    balance_after = %entry.balance_after,
                    "compensating refund issued"
                );
                true
            }
            Err(e) => {
                COMPENSATIONS_TOTAL.with_label_values(&["failed"]).inc();
                alert_operations_team_critical(format!(
                    "refund of {amount} to {user_id} for {reference} failed after {} attempts: {e}",
                    self.transfer.refund_attempts
                ));
                false
            }
        }
    }

    pub async fn drain_outbox(&self) -> DrainReport {
        let targets = OutboxTargets {
            transactions: &self.writer,
            invoices: &self.invoices,
            ledger: &self.balances,
        };
        self.outbox.drain(&targets).await
    }

    pub fn reconciler(&self, grace: Duration) -> Reconciler {
        Reconciler::new(
            self.collaborators.wallets.clone(),
            self.collaborators.ledger.clone(),
            self.collaborators.transactions.clone(),
            grace,
        )
    }
}
