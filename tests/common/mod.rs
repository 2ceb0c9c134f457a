#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use async_trait::async_trait;
use wallet_settlement::app::App;
use wallet_settlement::config::loader::AppConfig;
use wallet_settlement::core::orchestrator::{AmountInput, TransferRequest};
use wallet_settlement::error::{Error, Result};
use wallet_settlement::interfaces::ledger_store::{DebitOutcome, LedgerStore};
use wallet_settlement::interfaces::transaction_store::TransactionStore;
use wallet_settlement::interfaces::Collaborators;
use wallet_settlement::models::invoice::Invoice;
use wallet_settlement::models::transaction::{Transaction, TransactionUpdate};
use wallet_settlement::notifications::logging_notifier::LoggingNotifier;
use wallet_settlement::settlement::accounts::WalletAccount;
use wallet_settlement::settlement::ledger::{EntryType, LedgerEntry, Posting};
use wallet_settlement::store::memory::MemoryStore;
use wallet_settlement::store::simulated_rail::SimulatedBankRail;
use wallet_settlement::types::amount::Amount;
use wallet_settlement::types::ids::{CorrelationId, UserId};
use wallet_settlement::verification::pin::{hash_pin, PinInput};

pub const ADA_PIN: &str = "1234";
pub const BAYO_PIN: &str = "4321";

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.transfer.store_timeout_ms = 1_000;
    config.transfer.payout_timeout_ms = 1_000;
    config.workers.reconciliation_grace_ms = 0;
    config
}

pub struct Harness {
    pub app: App,
    pub ada: WalletAccount,
    pub bayo: WalletAccount,
}

impl Harness {
    pub fn new() -> Self {
        let app = App::in_memory(test_config(), Arc::new(LoggingNotifier)).unwrap();
        Self::around(app)
    }

    /// Ada starts with 10,000 and Bayo with nothing.
    pub fn around(app: App) -> Self {
        let ada = open_wallet(&app.store, "Ada Obi", "9000000001", ADA_PIN, 10_000);
        let bayo = open_wallet(&app.store, "Bayo Musa", "9000000002", BAYO_PIN, 0);
        Harness { app, ada, bayo }
    }

    pub fn balance(&self, user_id: UserId) -> i64 {
        self.app.store.balance_of(user_id).unwrap().minor()
    }

    pub fn platform_balance(&self) -> i64 {
        self.balance(self.app.services.platform_user_id)
    }

    pub fn invoice_for(&self, owner: &WalletAccount, code: &str, total: i64, target: u32, multiple: bool) -> Invoice {
        self.app
            .store
            .insert_invoice(Invoice::new(code, owner.user_id, Amount::from_minor(total), target, multiple))
            .unwrap()
    }
}

pub fn open_wallet(store: &MemoryStore, name: &str, account_number: &str, pin: &str, balance: i64) -> WalletAccount {
    let account = store
        .create_wallet(
            WalletAccount::new(name, "Platform Wallet", account_number, hash_pin(pin))
                .with_email(format!("{}@example.com", name.to_lowercase().replace(' ', "."))),
        )
        .unwrap();
    if balance > 0 {
        store
            .deposit(account.user_id, Amount::from_minor(balance), &format!("open-{}", account.user_id))
            .unwrap();
    }
    store.balance_of(account.user_id).unwrap();
    account
}

pub fn transfer(sender: &WalletAccount, receiver: &WalletAccount, amount: i64, narration: &str, pin: &str) -> TransferRequest {
    TransferRequest {
        user_id: Some(sender.user_id.to_string()),
        receiver_account_id: Some(receiver.wallet_id.to_string()),
        amount: Some(AmountInput::Minor(amount)),
        narration: Some(narration.to_string()),
        pin: Some(PinInput::Text(pin.to_string())),
        idempotency_key: None,
    }
}

/// Builds an app whose ledger and transaction seams go through `wrap`.
pub fn app_with(
    ledger: impl FnOnce(Arc<MemoryStore>) -> Arc<dyn LedgerStore>,
    transactions: impl FnOnce(Arc<MemoryStore>) -> Arc<dyn TransactionStore>,
) -> App {
    let config = test_config();
    let store = Arc::new(MemoryStore::new());
    store
        .seed(config.fees.platform_user_id().unwrap(), &config.seed)
        .unwrap();
    let rail = Arc::new(SimulatedBankRail::new());
    let mut collaborators = Collaborators::from_store(store.clone(), Arc::new(LoggingNotifier), rail.clone());
    collaborators.ledger = ledger(store.clone());
    collaborators.transactions = transactions(store.clone());
    App::with_collaborators(config, store, rail, collaborators).unwrap()
}

/// Fails credits of one entry type a set number of times.
pub struct FailingCredits {
    pub inner: Arc<MemoryStore>,
    pub entry_type: EntryType,
    pub failures_left: AtomicU32,
}

impl FailingCredits {
    pub fn new(inner: Arc<MemoryStore>, entry_type: EntryType, failures: u32) -> Self {
        FailingCredits {
            inner,
            entry_type,
            failures_left: AtomicU32::new(failures),
        }
    }

    fn should_fail(&self, entry_type: EntryType) -> bool {
        entry_type == self.entry_type
            && self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
    }
}

#[async_trait]
impl LedgerStore for FailingCredits {
    async fn debit(&self, user_id: UserId, amount: Amount, posting: Posting) -> Result<DebitOutcome> {
        self.inner.debit(user_id, amount, posting).await
    }

    async fn credit(&self, user_id: UserId, amount: Amount, posting: Posting) -> Result<LedgerEntry> {
        if self.should_fail(posting.entry_type) {
            return Err(Error::Ledger("injected credit failure".to_string()));
        }
        self.inner.credit(user_id, amount, posting).await
    }

    async fn find_posting(&self, idempotency_key: &str) -> Result<Option<LedgerEntry>> {
        self.inner.find_posting(idempotency_key).await
    }

    async fn entries_for_user(&self, user_id: UserId) -> Result<Vec<LedgerEntry>> {
        self.inner.entries_for_user(user_id).await
    }

    async fn all_entries(&self) -> Result<Vec<LedgerEntry>> {
        self.inner.all_entries().await
    }
}

/// Fails inserts of rows whose reference starts with a prefix.
pub struct FailingInserts {
    pub inner: Arc<MemoryStore>,
    pub prefix: &'static str,
    pub failures_left: AtomicU32,
}

impl FailingInserts {
    pub fn new(inner: Arc<MemoryStore>, prefix: &'static str, failures: u32) -> Self {
        FailingInserts {
            inner,
            prefix,
            failures_left: AtomicU32::new(failures),
        }
    }
}

#[async_trait]
impl TransactionStore for FailingInserts {
    async fn insert_transaction(&self, transaction: Transaction) -> Result<()> {
        if transaction.reference.starts_with(self.prefix)
            && self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        {
            return Err(Error::Store("injected insert failure".to_string()));
        }
        self.inner.insert_transaction(transaction).await
    }

    async fn update_transaction_by_reference(&self, reference: &str, update: TransactionUpdate) -> Result<Transaction> {
        self.inner.update_transaction_by_reference(reference, update).await
    }

    async fn find_by_reference(&self, reference: &str) -> Result<Option<Transaction>> {
        self.inner.find_by_reference(reference).await
    }

    async fn find_by_correlation(&self, correlation_id: CorrelationId) -> Result<Vec<Transaction>> {
        self.inner.find_by_correlation(correlation_id).await
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Transaction>> {
        self.inner.list_for_user(user_id).await
    }

    async fn all_transactions(&self) -> Result<Vec<Transaction>> {
        self.inner.all_transactions().await
    }
}

/// Applies receiver credits but reports them as timed out, a set number of times.
/// With `lookups_fail` the follow-up `:credit` lookup errors as well.
pub struct LostCreditAcks {
    pub inner: Arc<MemoryStore>,
    pub lost_acks: AtomicU32,
    pub lookups_fail: bool,
}

impl LostCreditAcks {
    pub fn new(inner: Arc<MemoryStore>, lost_acks: u32, lookups_fail: bool) -> Self {
        LostCreditAcks {
            inner,
            lost_acks: AtomicU32::new(lost_acks),
            lookups_fail,
        }
    }
}

#[async_trait]
impl LedgerStore for LostCreditAcks {
    async fn debit(&self, user_id: UserId, amount: Amount, posting: Posting) -> Result<DebitOutcome> {
        self.inner.debit(user_id, amount, posting).await
    }

    async fn credit(&self, user_id: UserId, amount: Amount, posting: Posting) -> Result<LedgerEntry> {
        let entry_type = posting.entry_type;
        let entry = self.inner.credit(user_id, amount, posting).await?;
        if entry_type == EntryType::P2pCredit
            && self
                .lost_acks
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        {
            return Err(Error::Timeout {
                operation: "ledger credit".to_string(),
            });
        }
        Ok(entry)
    }

    async fn find_posting(&self, idempotency_key: &str) -> Result<Option<LedgerEntry>> {
        if self.lookups_fail && idempotency_key.ends_with(":credit") {
            return Err(Error::Store("lookup unavailable".to_string()));
        }
        self.inner.find_posting(idempotency_key).await
    }

    async fn entries_for_user(&self, user_id: UserId) -> Result<Vec<LedgerEntry>> {
        self.inner.entries_for_user(user_id).await
    }

    async fn all_entries(&self) -> Result<Vec<LedgerEntry>> {
        self.inner.all_entries().await
    }
}

/// Applies every debit but reports it as timed out, and fails `:debit` lookups.
pub struct LostDebitAcks {
    pub inner: Arc<MemoryStore>,
}

#[async_trait]
impl LedgerStore for LostDebitAcks {
    async fn debit(&self, user_id: UserId, amount: Amount, posting: Posting) -> Result<DebitOutcome> {
        self.inner.debit(user_id, amount, posting).await?;
        Err(Error::Timeout {
            operation: "ledger debit".to_string(),
        })
    }

    async fn credit(&self, user_id: UserId, amount: Amount, posting: Posting) -> Result<LedgerEntry> {
        self.inner.credit(user_id, amount, posting).await
    }

    async fn find_posting(&self, idempotency_key: &str) -> Result<Option<LedgerEntry>> {
        if idempotency_key.ends_with(":debit") {
            return Err(Error::Store("lookup unavailable".to_string()));
        }
        self.inner.find_posting(idempotency_key).await
    }

    async fn entries_for_user(&self, user_id: UserId) -> Result<Vec<LedgerEntry>> {
        self.inner.entries_for_user(user_id).await
    }

    async fn all_entries(&self) -> Result<Vec<LedgerEntry>> {
        self.inner.all_entries().await
    }
}
