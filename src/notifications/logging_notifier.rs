use async_trait::async_trait;
use crate::error::Result;
use crate::interfaces::notifier::{Notifier, TransactionEmail};

/// Notifier for the in-process deployment: writes each email to the log.
#[derive(Default)]
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
    async fn send_transaction_email(&self, email: TransactionEmail) -> Result<()> {
        tracing::info!(
            template = ?email.template,
            recipient = %email.recipient,
            recipient_email = email.recipient_email.as_deref().unwrap_or("-"),
            payload = %email.payload,
            "transaction email sent"
        );
        Ok(())
    }
}
