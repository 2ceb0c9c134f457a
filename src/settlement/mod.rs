pub mod accounts;
pub mod balance_manager;
pub mod fee_calculator;
pub mod invoice_settler;
pub mod ledger;
pub mod outbox;
pub mod reconciliation;
pub mod transaction_writer;
