use std::collections::VecDeque;
use std::sync::Arc;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use crate::interfaces::notifier::{Notifier, TransactionEmail};
use crate::observability::metrics::NOTIFICATION_FAILURES;

#[derive(Clone, Debug)]
pub struct DeadLetter {
    pub email: TransactionEmail,
    pub attempts: u32,
    pub last_error: String,
    pub failed_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RetryReport {
    pub delivered: usize,
    pub requeued: usize,
    pub abandoned: usize,
}

/// Sends transaction emails off the transfer path. Failed sends land in a
/// dead-letter queue that a background worker retries.
#[derive(Clone)]
pub struct NotificationDispatcher {
    notifier: Arc<dyn Notifier>,
    dead_letters: Arc<Mutex<VecDeque<DeadLetter>>>,
    max_attempts: u32,
}

impl NotificationDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>, max_attempts: u32) -> Self {
        NotificationDispatcher {
            notifier,
            dead_letters: Arc::new(Mutex::new(VecDeque::new())),
            max_attempts: max_attempts.max(1),
        }
    }

    /// Fire-and-forget. All emails go out concurrently; the handle is only
    /// useful to tests that want to wait for delivery.
    pub fn dispatch(&self, emails: Vec<TransactionEmail>) -> JoinHandle<()> {
        let this = self.clone();
        tokio::spawn(async move {
            let sends = emails.into_iter().map(|email| {
                let this = this.clone();
                async move {
                    if let Err(e) = this.notifier.send_transaction_email(email.clone()).await {
                        this.dead_letter(email, 1, e.to_string()).await;
                    }
                }
            });
            join_all(sends).await;
        })
    }

    async fn dead_letter(&self, email: TransactionEmail, attempts: u32, error: String) {
        NOTIFICATION_FAILURES
            .with_label_values(&[template_label(&email)])
            .inc();
        tracing::warn!(
            template = ?email.template,
            recipient = %email.recipient,
            attempts,
            error = %error,
            "notification failed, dead-lettered"
        );
        self.dead_letters.lock().await.push_back(DeadLetter {
            email,
            attempts,
            last_error: error,
            failed_at: Utc::now(),
        });
    }

    pub async fn retry_dead_letters(&self) -> RetryReport {
        let batch: Vec<DeadLetter> = self.dead_letters.lock().await.drain(..).collect();
        let mut report = RetryReport::default();

        for letter in batch {
            match self.notifier.send_transaction_email(letter.email.clone()).await {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    let attempts = letter.attempts + 1;
                    if attempts >= self.max_attempts {
                        tracing::error!(
                            template = ?letter.email.template,
                            recipient = %letter.email.recipient,
                            attempts,
                            error = %e,
                            "notification abandoned"
                        );
                        report.abandoned += 1;
                    } else {
                        self.dead_letter(letter.email, attempts, e.to_string()).await;
                        report.requeued += 1;
                    }
                }
            }
        }
        report
    }

    pub async fn dead_letter_count(&self) -> usize {
        self.dead_letters.lock().await.len()
    }
}

fn template_label(email: &TransactionEmail) -> &'static str {
    use crate::interfaces::notifier::EmailTemplate::*;
    match email.template {
        TransferSent => "transfer_sent",
        TransferReceived => "transfer_received",
        InvoicePaid => "invoice_paid",
        WithdrawalCompleted => "withdrawal_completed",
        WithdrawalFailed => "withdrawal_failed",
    }
}
