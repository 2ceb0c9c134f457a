use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use crate::error::{Error, Result};
use crate::interfaces::bank_rail::{BankRail, PayoutInstruction, PayoutReceipt};

/// Bank rail stand-in for the in-memory deployment. Accepts every payout
/// unless switched offline.
pub struct SimulatedBankRail {
    offline: AtomicBool,
}

impl SimulatedBankRail {
    pub fn new() -> Self {
        SimulatedBankRail {
            offline: AtomicBool::new(false),
        }
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }
}

impl Default for SimulatedBankRail {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BankRail for SimulatedBankRail {
    async fn payout(&self, instruction: PayoutInstruction) -> Result<PayoutReceipt> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::Store("bank rail unavailable".to_string()));
        }

        tracing::info!(
            reference = %instruction.reference,
            amount = %instruction.amount,
            bank_code = %instruction.bank_code,
            "simulated payout accepted"
        );
        Ok(PayoutReceipt {
            provider_reference: format!("SIM-{}", instruction.reference),
            details: serde_json::json!({
                "bank_code": instruction.bank_code,
                "account_number": instruction.account_number,
                "account_name": instruction.account_name,
            }),
        })
    }
}
