use std::sync::Arc;

pub mod bank_rail;
pub mod invoice_store;
pub mod journal_store;
pub mod ledger_store;
pub mod notifier;
pub mod transaction_store;
pub mod wallet_store;

use bank_rail::BankRail;
use invoice_store::InvoiceStore;
use journal_store::JournalStore;
use ledger_store::LedgerStore;
use notifier::Notifier;
use transaction_store::TransactionStore;
use wallet_store::WalletStore;

/// External collaborators consumed by the transfer and withdrawal flows.
#[derive(Clone)]
pub struct Collaborators {
    pub wallets: Arc<dyn WalletStore>,
    pub ledger: Arc<dyn LedgerStore>,
    pub invoices: Arc<dyn InvoiceStore>,
    pub transactions: Arc<dyn TransactionStore>,
    pub journal: Arc<dyn JournalStore>,
    pub notifier: Arc<dyn Notifier>,
    pub bank_rail: Arc<dyn BankRail>,
}

impl Collaborators {
    /// Wires every store seam to one backing store.
    pub fn from_store<S>(store: Arc<S>, notifier: Arc<dyn Notifier>, bank_rail: Arc<dyn BankRail>) -> Self
    where
        S: WalletStore + LedgerStore + InvoiceStore + TransactionStore + JournalStore + 'static,
    {
        Collaborators {
            wallets: store.clone(),
            ledger: store.clone(),
            invoices: store.clone(),
            transactions: store.clone(),
            journal: store,
            notifier,
            bank_rail,
        }
    }
}
