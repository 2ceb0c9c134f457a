use crate::config::transfer::TransferConfig;
use crate::error::{Error, Result};
use crate::settlement::accounts::WalletAccount;

pub struct EligibilityCheck<'a> {
    config: &'a TransferConfig,
}

impl<'a> EligibilityCheck<'a> {
    pub fn new(config: &'a TransferConfig) -> Self {
        EligibilityCheck { config }
    }

    pub fn check(&self, sender: &WalletAccount, receiver: &WalletAccount) -> Result<()> {
        // Check 1: both parties on an allowed rail
        for party in [sender, receiver] {
            if !self.config.is_bank_allowed(&party.bank_name) {
                return Err(Error::BankNotAllowed {
                    bank: party.bank_name.clone(),
                });
            }
        }

        // Check 2: self-transfer, by account number and by wallet
        Self::check_not_self(sender, receiver)
    }

    pub fn check_not_self(sender: &WalletAccount, receiver: &WalletAccount) -> Result<()> {
        let same_account = !sender.account_number.trim().is_empty()
            && sender.account_number.trim() == receiver.account_number.trim();
        let same_wallet = sender.wallet_id == receiver.wallet_id || sender.user_id == receiver.user_id;

        if same_account || same_wallet {
            return Err(Error::SelfTransfer);
        }
        Ok(())
    }
}
