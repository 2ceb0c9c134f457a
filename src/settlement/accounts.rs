use crate::models::transaction::PartySnapshot;
use crate::types::amount::Amount;
use crate::types::ids::{UserId, WalletId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A user together with the wallet balance it owns.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WalletAccount {
    pub user_id: UserId,
    pub wallet_id: WalletId,
    pub display_name: String,
    pub email: Option<String>,
    pub bank_name: String,
    pub account_number: String,
    pub balance: Amount,
    #[serde(skip_serializing, default)]
    pub pin_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WalletAccount {
    pub fn new(
        display_name: impl Into<String>,
        bank_name: impl Into<String>,
        account_number: impl Into<String>,
        pin_hash: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        WalletAccount {
            user_id: UserId::new(),
            wallet_id: WalletId::new(),
            display_name: display_name.into(),
            email: None,
            bank_name: bank_name.into(),
            account_number: account_number.into(),
            balance: Amount::zero(),
            pin_hash: pin_hash.into(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    /// Denormalized copy stored on transaction rows.
    pub fn snapshot(&self) -> PartySnapshot {
        PartySnapshot {
            name: self.display_name.clone(),
            bank: self.bank_name.clone(),
            account_number: self.account_number.clone(),
            wallet_id: Some(self.wallet_id),
        }
    }
}
