use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::RwLock;
use crate::config::SeedAccount;
use crate::core::journal::{JournalBegin, JournalRecord, StoredOutcome};
use crate::core::state_machine::TransferState;
use crate::error::{Error, Result};
use crate::interfaces::invoice_store::InvoiceStore;
use crate::interfaces::journal_store::JournalStore;
use crate::interfaces::ledger_store::{DebitOutcome, LedgerStore};
use crate::interfaces::transaction_store::TransactionStore;
use crate::interfaces::wallet_store::WalletStore;
use crate::models::invoice::{Invoice, InvoicePayment, InvoiceUpdate};
use crate::models::transaction::{Transaction, TransactionUpdate};
use crate::settlement::accounts::WalletAccount;
use crate::settlement::ledger::{EntryType, LedgerEntry, Posting, WalletHistory};
use crate::types::amount::Amount;
use crate::types::ids::{CorrelationId, InvoiceId, UserId, WalletId};
use crate::verification::pin::hash_pin;

/// In-process implementation of every store seam.
///
/// Lock order is always wallet shard, then postings, then the ledger, so
/// concurrent debits on one wallet serialize on its shard lock and the
/// balance check cannot be separated from the decrement.
#[derive(Default)]
pub struct MemoryStore {
    wallets: DashMap<UserId, WalletAccount>,
    wallet_index: DashMap<WalletId, UserId>,
    postings: DashMap<String, LedgerEntry>,
    history: RwLock<WalletHistory>,
    invoices: DashMap<InvoiceId, Invoice>,
    invoice_codes: DashMap<String, InvoiceId>,
    invoice_payments: DashMap<String, InvoicePayment>,
    transactions: DashMap<String, Transaction>,
    journal: DashMap<String, JournalRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a wallet with a zero balance. Use `deposit` to fund it.
    pub fn create_wallet(&self, mut account: WalletAccount) -> Result<WalletAccount> {
        account.balance = Amount::zero();
        match self.wallets.entry(account.user_id) {
            Entry::Occupied(_) => Err(Error::Store(format!("wallet for user {} exists", account.user_id))),
            Entry::Vacant(slot) => {
                self.wallet_index.insert(account.wallet_id, account.user_id);
                slot.insert(account.clone());
                Ok(account)
            }
        }
    }

    /// Funds a wallet through the ledger so history and balance agree.
    pub fn deposit(&self, user_id: UserId, amount: Amount, reference: &str) -> Result<LedgerEntry> {
        self.apply_credit(
            user_id,
            amount,
            Posting {
                idempotency_key: format!("deposit:{reference}"),
                entry_type: EntryType::Deposit,
                transaction_reference: reference.to_string(),
                correlation_id: None,
                description: "Wallet funding".to_string(),
            },
        )
    }

    /// Creates the platform fee wallet and the configured seed accounts.
    pub fn seed(&self, platform_user_id: UserId, accounts: &[SeedAccount]) -> Result<()> {
        if !self.wallets.contains_key(&platform_user_id) {
            let mut platform = WalletAccount::new("Platform Fees", "Platform Wallet", "0000000000", "");
            platform.user_id = platform_user_id;
            self.create_wallet(platform)?;
        }

        for seed in accounts {
            let mut account = WalletAccount::new(
                seed.display_name.clone(),
                seed.bank_name.clone(),
                seed.account_number.clone(),
                hash_pin(&seed.pin),
            );
            if let Some(raw) = &seed.user_id {
                account.user_id = UserId::from_string(raw).map_err(|e| Error::ConfigError(format!("seed user_id {raw}: {e}")))?;
            }
            if let Some(raw) = &seed.wallet_id {
                account.wallet_id = WalletId::from_string(raw).map_err(|e| Error::ConfigError(format!("seed wallet_id {raw}: {e}")))?;
            }
            account.email = seed.email.clone();

            let account = self.create_wallet(account)?;
            if seed.opening_balance > 0 {
                self.deposit(account.user_id, Amount::from_minor(seed.opening_balance), &format!("seed-{}", account.user_id))?;
            }
            tracing::info!(
                user_id = %account.user_id,
                wallet_id = %account.wallet_id,
                name = %account.display_name,
                opening_balance = seed.opening_balance,
                "seeded wallet"
            );
        }
        Ok(())
    }

    pub fn insert_invoice(&self, invoice: Invoice) -> Result<Invoice> {
        match self.invoice_codes.entry(invoice.invoice_code.clone()) {
            Entry::Occupied(_) => Err(Error::DuplicateReference(invoice.invoice_code)),
            Entry::Vacant(slot) => {
                slot.insert(invoice.id);
                self.invoices.insert(invoice.id, invoice.clone());
                Ok(invoice)
            }
        }
    }

    pub fn balance_of(&self, user_id: UserId) -> Option<Amount> {
        self.wallets.get(&user_id).map(|w| w.balance)
    }

    fn record(&self, entry: LedgerEntry) -> Result<()> {
        self.postings.insert(entry.idempotency_key.clone(), entry.clone());
        self.history
            .write()
            .map_err(|_| Error::Store("ledger lock poisoned".to_string()))?
            .append(entry);
        Ok(())
    }

    fn apply_debit(&self, user_id: UserId, amount: Amount, posting: Posting) -> Result<DebitOutcome> {
        if !amount.is_positive() {
            return Err(Error::InvalidField {
                field: "amount",
                details: format!("debit amount must be positive, got {amount}"),
            });
        }

        let mut wallet = self.wallets.get_mut(&user_id).ok_or(Error::UserNotFound(user_id))?;

        if let Some(existing) = self.postings.get(&posting.idempotency_key) {
            return Ok(DebitOutcome::Applied(existing.clone()));
        }

        if wallet.balance < amount {
            return Ok(DebitOutcome::InsufficientFunds {
                available: wallet.balance,
            });
        }

        wallet.balance = wallet.balance - amount;
        wallet.updated_at = Utc::now();

        let entry = posting.into_entry(user_id, -amount, wallet.balance);
        self.record(entry.clone())?;
        Ok(DebitOutcome::Applied(entry))
    }

    fn apply_credit(&self, user_id: UserId, amount: Amount, posting: Posting) -> Result<LedgerEntry> {
        if !amount.is_positive() {
            return Err(Error::InvalidField {
                field: "amount",
                details: format!("credit amount must be positive, got {amount}"),
            });
        }

        let mut wallet = self.wallets.get_mut(&user_id).ok_or(Error::UserNotFound(user_id))?;

        if let Some(existing) = self.postings.get(&posting.idempotency_key) {
            return Ok(existing.clone());
        }

        wallet.balance = wallet.balance.checked_add(amount).ok_or_else(|| Error::Overflow {
            operation: format!("credit to {user_id}"),
        })?;
        wallet.updated_at = Utc::now();

        let entry = posting.into_entry(user_id, amount, wallet.balance);
        self.record(entry.clone())?;
        Ok(entry)
    }

    fn ledger_snapshot(&self) -> Result<Vec<LedgerEntry>> {
        Ok(self.history
            .read()
            .map_err(|_| Error::Store("ledger lock poisoned".to_string()))?
            .all())
    }
}

#[async_trait]
impl WalletStore for MemoryStore {
    async fn get_user(&self, user_id: UserId) -> Result<Option<WalletAccount>> {
        Ok(self.wallets.get(&user_id).map(|w| w.clone()))
    }

    async fn get_user_by_wallet_id(&self, wallet_id: WalletId) -> Result<Option<WalletAccount>> {
        let user_id = match self.wallet_index.get(&wallet_id) {
            Some(id) => *id,
            None => return Ok(None),
        };
        Ok(self.wallets.get(&user_id).map(|w| w.clone()))
    }

    async fn list_users(&self) -> Result<Vec<WalletAccount>> {
        Ok(self.wallets.iter().map(|w| w.value().clone()).collect())
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn debit(&self, user_id: UserId, amount: Amount, posting: Posting) -> Result<DebitOutcome> {
        self.apply_debit(user_id, amount, posting)
    }

    async fn credit(&self, user_id: UserId, amount: Amount, posting: Posting) -> Result<LedgerEntry> {
        self.apply_credit(user_id, amount, posting)
    }

    async fn find_posting(&self, idempotency_key: &str) -> Result<Option<LedgerEntry>> {
        Ok(self.postings.get(idempotency_key).map(|e| e.clone()))
    }

    async fn entries_for_user(&self, user_id: UserId) -> Result<Vec<LedgerEntry>> {
        Ok(self.history
            .read()
            .map_err(|_| Error::Store("ledger lock poisoned".to_string()))?
            .for_user(user_id))
    }

    async fn all_entries(&self) -> Result<Vec<LedgerEntry>> {
        self.ledger_snapshot()
    }
}

#[async_trait]
impl InvoiceStore for MemoryStore {
    async fn get_invoice_by_code(&self, code: &str) -> Result<Option<Invoice>> {
        let id = match self.invoice_codes.get(code) {
            Some(id) => *id,
            None => return Ok(None),
        };
        Ok(self.invoices.get(&id).map(|i| i.clone()))
    }

    async fn get_invoice_by_code_ignore_case(&self, code: &str) -> Result<Option<Invoice>> {
        Ok(self.invoices
            .iter()
            .find(|i| i.invoice_code.eq_ignore_ascii_case(code))
            .map(|i| i.value().clone()))
    }

    async fn get_invoice(&self, invoice_id: InvoiceId) -> Result<Option<Invoice>> {
        Ok(self.invoices.get(&invoice_id).map(|i| i.clone()))
    }

    async fn update_invoice(
        &self,
        invoice_id: InvoiceId,
        expected_paid_amount: Amount,
        update: InvoiceUpdate,
    ) -> Result<Option<Invoice>> {
        let mut invoice = self.invoices.get_mut(&invoice_id).ok_or(Error::InvoiceNotFound(invoice_id))?;

        if invoice.has_settled(&update.settled_reference) {
            return Ok(Some(invoice.clone()));
        }

        if invoice.paid_amount != expected_paid_amount {
            return Ok(None);
        }

        if update.paid_amount < invoice.paid_amount
            || update.paid_quantity < invoice.paid_quantity
            || update.status < invoice.status
        {
            return Err(Error::Store(format!("invoice {invoice_id} update would move backwards")));
        }

        invoice.apply(&update);
        Ok(Some(invoice.clone()))
    }

    async fn insert_invoice_payment(&self, payment: InvoicePayment) -> Result<()> {
        match self.invoice_payments.entry(payment.transfer_reference.clone()) {
            Entry::Occupied(_) => Err(Error::DuplicateReference(payment.transfer_reference)),
            Entry::Vacant(slot) => {
                slot.insert(payment);
                Ok(())
            }
        }
    }

    async fn payments_for_invoice(&self, invoice_id: InvoiceId) -> Result<Vec<InvoicePayment>> {
        let mut payments: Vec<InvoicePayment> = self.invoice_payments
            .iter()
            .filter(|p| p.invoice_id == invoice_id)
            .map(|p| p.value().clone())
            .collect();
        payments.sort_by_key(|p| p.created_at);
        Ok(payments)
    }
}

#[async_trait]
impl TransactionStore for MemoryStore {
    async fn insert_transaction(&self, transaction: Transaction) -> Result<()> {
        match self.transactions.entry(transaction.reference.clone()) {
            Entry::Occupied(_) => Err(Error::DuplicateReference(transaction.reference)),
            Entry::Vacant(slot) => {
                slot.insert(transaction);
                Ok(())
            }
        }
    }

    async fn update_transaction_by_reference(
        &self,
        reference: &str,
        update: TransactionUpdate,
    ) -> Result<Transaction> {
        let mut tx = self.transactions
            .get_mut(reference)
            .ok_or_else(|| Error::TransactionNotFound(reference.to_string()))?;

        if !tx.apply(&update) {
            return Err(Error::Store(format!(
                "transaction {reference} cannot move from {:?} to {:?}",
                tx.status, update.status
            )));
        }
        Ok(tx.clone())
    }

    async fn find_by_reference(&self, reference: &str) -> Result<Option<Transaction>> {
        Ok(self.transactions.get(reference).map(|t| t.clone()))
    }

    async fn find_by_correlation(&self, correlation_id: CorrelationId) -> Result<Vec<Transaction>> {
        Ok(self.transactions
            .iter()
            .filter(|t| t.correlation_id == correlation_id)
            .map(|t| t.value().clone())
            .collect())
    }

    async fn list_for_user(&self, user_id: UserId) -> Result<Vec<Transaction>> {
        let mut rows: Vec<Transaction> = self.transactions
            .iter()
            .filter(|t| t.user_id == user_id)
            .map(|t| t.value().clone())
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rows)
    }

    async fn all_transactions(&self) -> Result<Vec<Transaction>> {
        Ok(self.transactions.iter().map(|t| t.value().clone()).collect())
    }
}

#[async_trait]
impl JournalStore for MemoryStore {
    async fn begin(
        &self,
        idempotency_key: &str,
        fingerprint: &str,
        correlation_id: CorrelationId,
    ) -> Result<JournalBegin> {
        match self.journal.entry(idempotency_key.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(JournalRecord::new(idempotency_key, fingerprint, correlation_id));
                Ok(JournalBegin::Fresh(correlation_id))
            }
            Entry::Occupied(existing) => {
                let record = existing.get();
                if record.fingerprint != fingerprint {
                    return Ok(JournalBegin::FingerprintMismatch);
                }
                Ok(match &record.outcome {
                    Some(outcome) => JournalBegin::Replay(outcome.clone()),
                    None => JournalBegin::InFlight(record.correlation_id),
                })
            }
        }
    }

    async fn record_state(&self, idempotency_key: &str, state: TransferState) -> Result<()> {
        if let Some(mut record) = self.journal.get_mut(idempotency_key) {
            record.state = state;
            record.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn note_partial_failure(&self, idempotency_key: &str, step: &'static str) -> Result<()> {
        if let Some(mut record) = self.journal.get_mut(idempotency_key) {
            record.partial_failures.push(step);
            record.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn complete(&self, idempotency_key: &str, outcome: StoredOutcome) -> Result<()> {
        let mut record = self.journal
            .get_mut(idempotency_key)
            .ok_or_else(|| Error::Store(format!("journal key {idempotency_key} missing")))?;
        record.outcome = Some(outcome);
        record.updated_at = Utc::now();
        Ok(())
    }

    async fn release(&self, idempotency_key: &str) -> Result<()> {
        self.journal.remove(idempotency_key);
        Ok(())
    }

    async fn get(&self, idempotency_key: &str) -> Result<Option<JournalRecord>> {
        Ok(self.journal.get(idempotency_key).map(|r| r.clone()))
    }
}
