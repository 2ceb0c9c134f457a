use crate::config::fees::FeeConfig;
use crate::config::transfer::TransferConfig;
use crate::config::*;
use crate::error::{Error, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

#[derive(Clone, Debug, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub transfer: TransferConfig,
    #[serde(default)]
    pub fees: FeeConfig,
    #[serde(default)]
    pub workers: WorkerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub seed: Vec<SeedAccount>,
}

impl AppConfig {
    pub fn load(env: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(Environment::with_prefix("WALLET").separator("__"))
            .build()
            .map_err(|e| Error::ConfigError(e.to_string()))?;

        let app: AppConfig = config.try_deserialize()
            .map_err(|e| Error::ConfigError(e.to_string()))?;
        app.validate()?;
        Ok(app)
    }

    pub fn validate(&self) -> Result<()> {
        if self.transfer.minimum_amount <= 0 {
            return Err(Error::ConfigError("transfer.minimum_amount must be positive".into()));
        }
        if self.transfer.allowed_banks.is_empty() {
            return Err(Error::ConfigError("transfer.allowed_banks must not be empty".into()));
        }
        if self.fees.invoice_fee_bps > 10_000 {
            return Err(Error::ConfigError("fees.invoice_fee_bps must be <= 10000".into()));
        }
        self.fees.platform_user_id()
            .map_err(|e| Error::ConfigError(format!("fees.platform_wallet_user_id: {e}")))?;
        Ok(())
    }
}
