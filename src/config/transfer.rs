use serde::{Deserialize, Serialize};
use std::time::Duration;
use crate::types::amount::Amount;

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct TransferConfig {
    pub minimum_amount: i64,
    pub allowed_banks: Vec<String>,
    pub store_timeout_ms: u64,
    pub payout_timeout_ms: u64,
    pub refund_attempts: u32,
}

impl TransferConfig {
    pub fn minimum_amount(&self) -> Amount {
        Amount::from_minor(self.minimum_amount)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store_timeout_ms)
    }

    pub fn payout_timeout(&self) -> Duration {
        Duration::from_millis(self.payout_timeout_ms)
    }

    pub fn is_bank_allowed(&self, bank: &str) -> bool {
        let bank = bank.trim();
        self.allowed_banks.iter().any(|b| b.trim().eq_ignore_ascii_case(bank))
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        TransferConfig {
            minimum_amount: 100,
            allowed_banks: vec!["Platform Wallet".to_string()],
            store_timeout_ms: 5_000,
            payout_timeout_ms: 30_000,
            refund_attempts: 3,
        }
    }
}
