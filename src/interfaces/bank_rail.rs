use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::Result;
use crate::types::amount::Amount;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PayoutInstruction {
    pub reference: String,
    pub amount: Amount,
    pub bank_code: String,
    pub account_number: String,
    pub account_name: String,
    pub narration: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PayoutReceipt {
    pub provider_reference: String,
    pub details: serde_json::Value,
}

/// External bank / payment-rail clearing service.
#[async_trait]
pub trait BankRail: Send + Sync {
    async fn payout(&self, instruction: PayoutInstruction) -> Result<PayoutReceipt>;
}
