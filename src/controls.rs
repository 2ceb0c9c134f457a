use std::sync::atomic::{AtomicBool, Ordering};
use crate::error::{Error, Result};

/// Operator switches. A halted flow rejects new requests before any
/// validation; requests already past the debit run to completion.
#[derive(Debug, Default)]
pub struct Controls {
    transfers_halted: AtomicBool,
    withdrawals_halted: AtomicBool,
}

impl Controls {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn halt_transfers(&self) {
        self.transfers_halted.store(true, Ordering::SeqCst);
        tracing::warn!("P2P transfers HALTED");
    }

    pub fn resume_transfers(&self) {
        self.transfers_halted.store(false, Ordering::SeqCst);
        tracing::info!("P2P transfers RESUMED");
    }

    pub fn halt_withdrawals(&self) {
        self.withdrawals_halted.store(true, Ordering::SeqCst);
        tracing::warn!("Withdrawals HALTED");
    }

    pub fn resume_withdrawals(&self) {
        self.withdrawals_halted.store(false, Ordering::SeqCst);
        tracing::info!("Withdrawals RESUMED");
    }

    pub fn is_transfers_halted(&self) -> bool {
        self.transfers_halted.load(Ordering::SeqCst)
    }

    pub fn is_withdrawals_halted(&self) -> bool {
        self.withdrawals_halted.load(Ordering::SeqCst)
    }

    pub fn ensure_transfers_open(&self) -> Result<()> {
        if self.is_transfers_halted() {
            return Err(Error::Halted("P2P transfers"));
        }
        Ok(())
    }

    pub fn ensure_withdrawals_open(&self) -> Result<()> {
        if self.is_withdrawals_halted() {
            return Err(Error::Halted("Withdrawals"));
        }
        Ok(())
    }
}
