use thiserror::Error;
use crate::types::amount::Amount;
use crate::types::ids::{InvoiceId, UserId, WalletId};

#[derive(Error, Debug, Clone)]
pub enum Error {
    // Validation Errors
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid field {field}: {details}")]
    InvalidField {
        field: &'static str,
        details: String,
    },

    #[error("Amount {amount} is below the minimum of {minimum}")]
    AmountBelowMinimum {
        amount: Amount,
        minimum: Amount,
    },

    // Authorization Errors
    #[error("Cannot transfer to your own wallet")]
    SelfTransfer,

    #[error("Invalid transaction PIN")]
    InvalidPin,

    #[error("Bank not eligible for wallet transfers: {bank}")]
    BankNotAllowed { bank: String },

    // Not Found Errors
    #[error("User not found: {0}")]
    UserNotFound(UserId),

    #[error("Receiver wallet not found: {0}")]
    ReceiverNotFound(WalletId),

    #[error("Transaction not found: {0}")]
    TransactionNotFound(String),

    #[error("Invoice not found: {0}")]
    InvoiceNotFound(InvoiceId),

    // Funds
    #[error("Insufficient funds: required={required}, available={available}")]
    InsufficientFunds {
        required: Amount,
        available: Amount,
    },

    // Idempotency / Conflict Errors
    #[error("Transfer with idempotency key {0} is already in progress")]
    TransferInProgress(String),

    #[error("Idempotency key {0} was reused with a different request")]
    IdempotencyKeyReuse(String),

    #[error("Duplicate reference: {0}")]
    DuplicateReference(String),

    #[error("Invoice {0} was modified concurrently")]
    InvoiceConflict(InvoiceId),

    // Upstream Errors
    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Timed out waiting for {operation}")]
    Timeout { operation: String },

    #[error("Credit to receiver failed ({reason}); refunded={refunded}")]
    CreditFailed {
        reason: String,
        refunded: bool,
    },

    #[error("Bank payout failed ({reason}); refunded={refunded}")]
    PayoutFailed {
        reason: String,
        refunded: bool,
    },

    // Bookkeeping
    #[error("Bookkeeping step {step} failed: {details}")]
    PartialFailure {
        step: &'static str,
        details: String,
    },

    #[error("Illegal transfer state transition: {from} -> {to}")]
    IllegalTransition {
        from: &'static str,
        to: &'static str,
    },

    #[error("Too many requests, retry later")]
    RateLimited,

    // System Errors
    #[error("{0} halted by operator")]
    Halted(&'static str),

    #[error("Background task failure: {0}")]
    TaskFailed(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Overflow in {operation}")]
    Overflow { operation: String },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification used to pick response codes and to decide
/// whether anything needs undoing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Authorization,
    NotFound,
    InsufficientFunds,
    Conflict,
    Upstream,
    PartialFailure,
    Unavailable,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::MissingField(_)
            | Error::InvalidField { .. }
            | Error::AmountBelowMinimum { .. } => ErrorKind::Validation,
            Error::SelfTransfer | Error::InvalidPin | Error::BankNotAllowed { .. } => ErrorKind::Authorization,
            Error::UserNotFound(_)
            | Error::ReceiverNotFound(_)
            | Error::TransactionNotFound(_)
            | Error::InvoiceNotFound(_) => ErrorKind::NotFound,
            Error::InsufficientFunds { .. } => ErrorKind::InsufficientFunds,
            Error::TransferInProgress(_)
            | Error::IdempotencyKeyReuse(_)
            | Error::DuplicateReference(_)
            | Error::InvoiceConflict(_) => ErrorKind::Conflict,
            Error::PartialFailure { .. } => ErrorKind::PartialFailure,
            Error::Halted(_) | Error::RateLimited => ErrorKind::Unavailable,
            Error::Ledger(_)
            | Error::Store(_)
            | Error::Timeout { .. }
            | Error::CreditFailed { .. }
            | Error::PayoutFailed { .. }
            | Error::IllegalTransition { .. }
            | Error::TaskFailed(_)
            | Error::ConfigError(_)
            | Error::SerializationError(_)
            | Error::Overflow { .. } => ErrorKind::Upstream,
        }
    }

    /// Stable machine-readable reason code.
    pub fn reason(&self) -> &'static str {
        match self {
            Error::MissingField(_) => "missing_field",
            Error::InvalidField { .. } => "invalid_field",
            Error::AmountBelowMinimum { .. } => "amount_below_minimum",
            Error::SelfTransfer => "self_transfer",
            Error::InvalidPin => "invalid_pin",
            Error::BankNotAllowed { .. } => "bank_not_allowed",
            Error::UserNotFound(_) => "user_not_found",
            Error::ReceiverNotFound(_) => "receiver_not_found",
            Error::TransactionNotFound(_) => "transaction_not_found",
            Error::InvoiceNotFound(_) => "invoice_not_found",
            Error::InsufficientFunds { .. } => "insufficient_funds",
            Error::TransferInProgress(_) => "transfer_in_progress",
            Error::IdempotencyKeyReuse(_) => "idempotency_key_reuse",
            Error::DuplicateReference(_) => "duplicate_reference",
            Error::InvoiceConflict(_) => "invoice_conflict",
            Error::Ledger(_) => "ledger_error",
            Error::Store(_) => "store_error",
            Error::Timeout { .. } => "timeout",
            Error::CreditFailed { .. } => "credit_failed",
            Error::PayoutFailed { .. } => "payout_failed",
            Error::PartialFailure { .. } => "partial_failure",
            Error::IllegalTransition { .. } => "illegal_transition",
            Error::Halted(_) => "halted",
            Error::RateLimited => "rate_limited",
            Error::TaskFailed(_) => "task_failed",
            Error::ConfigError(_) => "config_error",
            Error::SerializationError(_) => "serialization_error",
            Error::Overflow { .. } => "overflow",
        }
    }

    /// Whether a compensating refund returned the sender's funds.
    pub fn refunded(&self) -> Option<bool> {
        match self {
            Error::CreditFailed { refunded, .. } | Error::PayoutFailed { refunded, .. } => {
                Some(*refunded)
            }
            _ => None,
        }
    }
}
