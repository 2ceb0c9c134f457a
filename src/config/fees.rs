use serde::{Deserialize, Serialize};
use crate::types::amount::Amount;
use crate::types::ids::UserId;

#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct FeeConfig {
    pub invoice_fee_bps: u32,
    pub withdrawal_fee: i64,
    pub platform_wallet_user_id: String,
}

impl FeeConfig {
    pub fn withdrawal_fee(&self) -> Amount {
        Amount::from_minor(self.withdrawal_fee)
    }

    pub fn platform_user_id(&self) -> Result<UserId, uuid::Error> {
        UserId::from_string(&self.platform_wallet_user_id)
    }
}

impl Default for FeeConfig {
    fn default() -> Self {
        FeeConfig {
            invoice_fee_bps: 200,  // 2%
            withdrawal_fee: 5_000,
            platform_wallet_user_id: "00000000-0000-0000-0000-000000000001".to_string(),
        }
    }
}
