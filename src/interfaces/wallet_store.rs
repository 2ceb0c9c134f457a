use async_trait::async_trait;
use crate::error::Result;
use crate::settlement::accounts::WalletAccount;
use crate::types::ids::{UserId, WalletId};

/// Read access to users and the wallets they own.
#[async_trait]
pub trait WalletStore: Send + Sync {
    async fn get_user(&self, user_id: UserId) -> Result<Option<WalletAccount>>;
    async fn get_user_by_wallet_id(&self, wallet_id: WalletId) -> Result<Option<WalletAccount>>;
    async fn list_users(&self) -> Result<Vec<WalletAccount>>;
}
