use std::sync::Arc;
use std::time::Instant;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::Instrument;
use crate::core::journal::{fingerprint, JournalBegin, StoredOutcome};
use crate::core::services::SettlementServices;
use crate::core::state_machine::{StateMachine, TransferState};
use crate::error::{Error, ErrorKind, Result};
use crate::interfaces::notifier::{EmailTemplate, TransactionEmail};
use crate::invoice::resolver::Classification;
use crate::models::invoice::{Invoice, InvoicePayment, InvoiceStatus};
use crate::observability::metrics::{PLATFORM_FEES_COLLECTED, TRANSFERS_TOTAL, TRANSFER_LATENCY};
use crate::observability::tracing::trace_transfer;
use crate::settlement::accounts::WalletAccount;
use crate::settlement::fee_calculator::{FeeCalculator, SettlementQuote};
use crate::settlement::ledger::{EntryType, Posting};
use crate::settlement::outbox::DeferredWrite;
use crate::settlement::transaction_writer::TransferLegs;
use crate::types::amount::Amount;
use crate::types::ids::{CorrelationId, InvoiceId, PaymentId, UserId, WalletId};
use crate::utils::helper::{alert_operations_team_critical, generate_reference, with_timeout};
use crate::verification::eligibility::EligibilityCheck;
use crate::verification::pin::{PinInput, PinVerifier};

/// Amounts arrive as JSON integers or numeric strings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AmountInput {
    Minor(i64),
    Text(String),
}

impl AmountInput {
    pub fn to_amount(&self) -> Result<Amount> {
        match self {
            AmountInput::Minor(v) => Ok(Amount::from_minor(*v)),
            AmountInput::Text(s) => s
                .trim()
                .parse::<i64>()
                .map(Amount::from_minor)
                .map_err(|_| Error::InvalidField {
                    field: "amount",
                    details: format!("'{s}' is not a whole number of minor units"),
                }),
        }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub user_id: Option<String>,
    pub receiver_account_id: Option<String>,
    pub amount: Option<AmountInput>,
    pub narration: Option<String>,
    pub pin: Option<PinInput>,
    pub idempotency_key: Option<String>,
}

pub(crate) fn required<'a>(value: &'a Option<String>, field: &'static str) -> Result<&'a str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or(Error::MissingField(field))
}

pub(crate) fn parse_user_id(raw: &str, field: &'static str) -> Result<UserId> {
    UserId::from_string(raw).map_err(|_| Error::InvalidField {
        field,
        details: format!("'{raw}' is not a valid id"),
    })
}

struct ParsedTransfer {
    sender_id: UserId,
    receiver_wallet: WalletId,
    amount: Amount,
    narration: Option<String>,
    pin: PinInput,
}

impl ParsedTransfer {
    fn fingerprint(&self) -> String {
        fingerprint(&[
            "p2p_transfer",
            &self.sender_id.to_string(),
            &self.receiver_wallet.to_string(),
            &self.amount.minor().to_string(),
            self.narration.as_deref().unwrap_or(""),
        ])
    }
}

impl TransferRequest {
    fn parse(&self) -> Result<ParsedTransfer> {
        let user_id = required(&self.user_id, "userId")?;
        let receiver = required(&self.receiver_account_id, "receiverAccountId")?;
        let amount = self.amount.as_ref().ok_or(Error::MissingField("amount"))?;
        let pin = self
            .pin
            .clone()
            .filter(|p| !p.is_empty())
            .ok_or(Error::MissingField("pin"))?;

        Ok(ParsedTransfer {
            sender_id: parse_user_id(user_id, "userId")?,
            receiver_wallet: WalletId::from_string(receiver).map_err(|_| Error::InvalidField {
                field: "receiverAccountId",
                details: format!("'{receiver}' is not a valid wallet id"),
            })?,
            amount: amount.to_amount()?,
            narration: self
                .narration
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string),
            pin,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvoicePaymentSummary {
    pub invoice_id: InvoiceId,
    pub invoice_code: String,
    pub platform_fee: Amount,
    pub net_amount: Amount,
    pub paid_amount: Amount,
    pub paid_quantity: u32,
    pub status: InvoiceStatus,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferReceipt {
    pub message: String,
    pub transaction_ref: String,
    pub sender_ref: String,
    pub receiver_ref: String,
    pub correlation_id: CorrelationId,
    pub amount: Amount,
    pub fee: Amount,
    pub net_amount: Amount,
    pub receiver_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoice_payment: Option<InvoicePaymentSummary>,
}

/// Runs one P2P transfer through validation, debit, credit, fee
/// settlement, bookkeeping and notification.
pub struct TransferOrchestrator {
    services: Arc<SettlementServices>,
}

impl TransferOrchestrator {
    pub fn new(services: Arc<SettlementServices>) -> Self {
        TransferOrchestrator { services }
    }

    pub async fn execute(&self, request: TransferRequest) -> Result<TransferReceipt> {
        let started = Instant::now();
        let result = self.run(request).await;

        let (outcome, classification) = match &result {
            Ok(receipt) if receipt.invoice_payment.is_some() => ("success", "invoice"),
            Ok(_) => ("success", "plain"),
            Err(e) => (e.reason(), "none"),
        };
        TRANSFERS_TOTAL.with_label_values(&[outcome, classification]).inc();
        TRANSFER_LATENCY.observe(started.elapsed().as_secs_f64());
        result
    }

    async fn run(&self, request: TransferRequest) -> Result<TransferReceipt> {
        self.services.controls.ensure_transfers_open()?;

        let parsed = request.parse()?;
        let minimum = self.services.transfer.minimum_amount();
        if parsed.amount < minimum {
            return Err(Error::AmountBelowMinimum {
                amount: parsed.amount,
                minimum,
            });
        }

        let correlation_id = CorrelationId::new();
        let span = trace_transfer(&correlation_id, &parsed.sender_id);
        self.run_journaled(parsed, request.idempotency_key, correlation_id)
            .instrument(span)
            .await
    }

    async fn run_journaled(
        &self,
        parsed: ParsedTransfer,
        idempotency_key: Option<String>,
        correlation_id: CorrelationId,
    ) -> Result<TransferReceipt> {
        let services = &self.services;
        let sender = services.find_user(parsed.sender_id).await?;
        PinVerifier::verify(&sender.pin_hash, &parsed.pin)?;

        let key = idempotency_key
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty())
            .unwrap_or_else(|| correlation_id.to_string());

        match services.begin_journal(&key, &parsed.fingerprint(), correlation_id).await? {
            JournalBegin::Fresh(_) => {}
            JournalBegin::InFlight(original) => {
                tracing::warn!(key = %key, original = %original, "transfer already in flight");
                return Err(Error::TransferInProgress(key));
            }
            JournalBegin::Replay(StoredOutcome::Succeeded(receipt)) => {
                tracing::info!(key = %key, "replaying completed transfer");
                return serde_json::from_value(receipt).map_err(|e| Error::SerializationError(e.to_string()));
            }
            JournalBegin::Replay(StoredOutcome::Failed(error)) => {
                tracing::info!(key = %key, reason = error.reason(), "replaying failed transfer");
                return Err(error);
            }
            JournalBegin::FingerprintMismatch => return Err(Error::IdempotencyKeyReuse(key)),
        }

        let mut machine = StateMachine::new();
        let result = self.settle(&key, correlation_id, &sender, &parsed, &mut machine).await;

        match &result {
            Ok(receipt) => match serde_json::to_value(receipt) {
                Ok(value) => services.finish_journal(&key, StoredOutcome::Succeeded(value)).await,
                Err(e) => tracing::warn!(key = %key, error = %e, "receipt not journaled"),
            },
            Err(error) => {
                let nothing_moved = machine.state() == TransferState::Rejected
                    || !machine.history().contains(&TransferState::Debiting);
                if nothing_moved {
                    services.release_journal(&key).await;
                } else {
                    services.finish_journal(&key, StoredOutcome::Failed(error.clone())).await;
                }
            }
        }
        result
    }

    /// Receiver lookup, bank affinity, self-transfer and balance checks.
    async fn validate(&self, sender: &WalletAccount, parsed: &ParsedTransfer) -> Result<WalletAccount> {
        let services = &self.services;
        let receiver = with_timeout(
            "get receiver",
            services.timeout(),
            services.collaborators.wallets.get_user_by_wallet_id(parsed.receiver_wallet),
        )
        .await?
        .ok_or(Error::ReceiverNotFound(parsed.receiver_wallet))?;

        EligibilityCheck::new(&services.transfer).check(sender, &receiver)?;

        if sender.balance < parsed.amount {
            return Err(Error::InsufficientFunds {
                required: parsed.amount,
                available: sender.balance,
            });
        }
        Ok(receiver)
    }

    async fn settle(
        &self,
        key: &str,
        cid: CorrelationId,
        sender: &WalletAccount,
        parsed: &ParsedTransfer,
        machine: &mut StateMachine,
    ) -> Result<TransferReceipt> {
        let services = &self.services;

        let receiver = match self.validate(sender, parsed).await {
            Ok(receiver) => receiver,
            Err(e) => {
                let terminal = if e.kind() == ErrorKind::Upstream {
                    TransferState::Failed
                } else {
                    TransferState::Rejected
                };
                machine.advance(terminal)?;
                tracing::info!(reason = e.reason(), "transfer rejected");
                return Err(e);
            }
        };

        let classification = services.resolver.classify(parsed.narration.as_deref(), receiver.user_id).await;
        let quote = match &classification {
            Classification::InvoiceSettlement(_) => {
                FeeCalculator::new(services.fees.invoice_fee_bps).invoice(parsed.amount)
            }
            Classification::Plain(_) => FeeCalculator::plain(parsed.amount),
        };

        let legs = TransferLegs::new(
            cid,
            generate_reference("P2P", cid),
            generate_reference("P2PCR", cid),
            sender,
            &receiver,
            parsed.narration.clone(),
        );

        if let Err(e) = services.writer.insert(legs.sender_pending(sender, &quote)).await {
            tracing::error!(error = %e, "sender row not written, aborting before any debit");
            machine.advance(TransferState::Failed)?;
            return Err(e);
        }

        // Debiting
        machine.advance(TransferState::Debiting)?;
        services.journal_state(key, TransferState::Debiting).await;

        let debit = Posting::for_transfer(
            cid,
            "debit",
            EntryType::P2pDebit,
            legs.sender_reference.clone(),
            format!("Transfer to {}", receiver.display_name),
        );
        if let Err(e) = services.balances.debit(sender.user_id, quote.gross, debit).await {
            return self.debit_failed(key, cid, sender, &legs, &quote, machine, e).await;
        }

        // Crediting
        machine.advance(TransferState::Crediting)?;
        services.journal_state(key, TransferState::Crediting).await;

        let credit = Posting::for_transfer(
            cid,
            "credit",
            EntryType::P2pCredit,
            legs.receiver_reference.clone(),
            format!("Transfer from {}", sender.display_name),
        );
        if let Err(e) = services.balances.credit(receiver.user_id, quote.net, credit.clone()).await {
            match services.balances.find_posting(&cid.posting_key("credit")).await {
                Ok(None) => {
                    return self.compensate_credit(key, cid, sender, &legs, &quote, machine, e).await;
                }
                Ok(Some(_)) => {
                    tracing::warn!(error = %e, "credit acknowledgement lost but the posting landed");
                }
                Err(lookup) => {
                    self.confirm_credit(key, &receiver, &legs, &quote, credit, machine, e, lookup).await?;
                }
            }
        }

        if quote.platform_fee.is_positive() {
            self.credit_platform_fee(key, cid, &legs, &quote).await;
        }

        // FeeSettling
        let invoice_payment = match classification.invoice() {
            Some(invoice) => {
                machine.advance(TransferState::FeeSettling)?;
                services.journal_state(key, TransferState::FeeSettling).await;
                Some(self.settle_invoice(key, invoice, sender, &legs, &quote).await)
            }
            None => None,
        };

        // RecordingTransactions
        machine.advance(TransferState::RecordingTransactions)?;
        services.journal_state(key, TransferState::RecordingTransactions).await;

        let sender_update = legs.sender_success(&quote);
        if let Err(e) = services.writer.update(&legs.sender_reference, sender_update.clone()).await {
            let write = DeferredWrite::UpdateTransaction {
                reference: legs.sender_reference.clone(),
                update: sender_update,
            };
            services.defer(key, "sender_row", write, &e).await;
        }

        let receiver_row = legs.receiver_success(&receiver, &quote, classification.invoice());
        if let Err(e) = services.writer.insert(receiver_row.clone()).await {
            services.defer(key, "receiver_row", DeferredWrite::InsertTransaction(receiver_row), &e).await;
        }

        // NotifyingAsync
        machine.advance(TransferState::NotifyingAsync)?;
        services.journal_state(key, TransferState::NotifyingAsync).await;
        services
            .notifications
            .dispatch(Self::emails(sender, &receiver, &legs, &quote, invoice_payment.as_ref()));

        machine.advance(TransferState::Done)?;
        services.journal_state(key, TransferState::Done).await;

        tracing::info!(
            sender_ref = %legs.sender_reference,
            receiver_ref = %legs.receiver_reference,
            amount = %quote.gross,
            fee = %quote.platform_fee,
            invoice = invoice_payment.is_some(),
            "transfer completed"
        );

        let message = if invoice_payment.is_some() {
            "Invoice payment successful"
        } else {
            "Transfer successful"
        };
        Ok(TransferReceipt {
            message: message.to_string(),
            transaction_ref: legs.sender_reference.clone(),
            sender_ref: legs.sender_reference.clone(),
            receiver_ref: legs.receiver_reference.clone(),
            correlation_id: cid,
            amount: quote.gross,
            fee: quote.platform_fee,
            net_amount: quote.net,
            receiver_name: receiver.display_name.clone(),
            invoice_payment,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn debit_failed(
        &self,
        key: &str,
        cid: CorrelationId,
        sender: &WalletAccount,
        legs: &TransferLegs,
        quote: &SettlementQuote,
        machine: &mut StateMachine,
        error: Error,
    ) -> Result<TransferReceipt> {
        let services = &self.services;

        if let Error::InsufficientFunds { .. } = error {
            machine.advance(TransferState::Rejected)?;
            self.mark_sender_failed(key, legs, error.reason(), false).await;
            return Err(error);
        }

        match services.balances.find_posting(&cid.posting_key("debit")).await {
            Ok(None) => {
                tracing::error!(error = %error, "debit failed, no funds moved");
                machine.advance(TransferState::Failed)?;
                self.mark_sender_failed(key, legs, error.reason(), false).await;
                Err(error)
            }
            Ok(Some(_)) => {
                // The debit landed even though the call failed: hand it back.
                machine.advance(TransferState::Compensating)?;
                services.journal_state(key, TransferState::Compensating).await;
                let refunded = services.refund(sender.user_id, quote.gross, &legs.sender_reference, cid).await;
                machine.advance(TransferState::Failed)?;
                let failure = Error::CreditFailed {
                    reason: error.to_string(),
                    refunded,
                };
                self.mark_sender_failed(key, legs, failure.reason(), refunded).await;
                Err(failure)
            }
            Err(lookup) => {
                alert_operations_team_critical(format!(
                    "debit outcome for {} unknown: {error}; lookup failed: {lookup}",
                    legs.sender_reference
                ));
                machine.advance(TransferState::Failed)?;
                Err(error)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn compensate_credit(
        &self,
        key: &str,
        cid: CorrelationId,
        sender: &WalletAccount,
        legs: &TransferLegs,
        quote: &SettlementQuote,
        machine: &mut StateMachine,
        error: Error,
    ) -> Result<TransferReceipt> {
        let services = &self.services;
        tracing::error!(error = %error, receiver_ref = %legs.receiver_reference, "credit failed, compensating sender");

        machine.advance(TransferState::Compensating)?;
        services.journal_state(key, TransferState::Compensating).await;
        let refunded = services.refund(sender.user_id, quote.gross, &legs.sender_reference, cid).await;

        machine.advance(TransferState::Failed)?;
        services.journal_state(key, TransferState::Failed).await;

        let failure = Error::CreditFailed {
            reason: error.to_string(),
            refunded,
        };
        self.mark_sender_failed(key, legs, failure.reason(), refunded).await;
        Err(failure)
    }

    /// Settles an unknown credit outcome by replaying the posting under its original key.
    /// A landed credit is returned as-is, so the replay can never pay the receiver twice.
    #[allow(clippy::too_many_arguments)]
    async fn confirm_credit(
        &self,
        key: &str,
        receiver: &WalletAccount,
        legs: &TransferLegs,
        quote: &SettlementQuote,
        credit: Posting,
        machine: &mut StateMachine,
        error: Error,
        lookup: Error,
    ) -> Result<()> {
        let services = &self.services;
        tracing::warn!(error = %error, lookup = %lookup, "credit outcome unknown, replaying posting");

        match services
            .balances
            .credit_with_retry(receiver.user_id, quote.net, credit, services.transfer.refund_attempts)
            .await
        {
            Ok(_) => Ok(()),
            Err(retry) => {
                alert_operations_team_critical(format!(
                    "credit outcome for {} unknown: {error}; lookup failed: {lookup}; replay failed: {retry}",
                    legs.receiver_reference
                ));
                machine.advance(TransferState::Failed)?;
                services.journal_state(key, TransferState::Failed).await;
                Err(Error::CreditFailed {
                    reason: error.to_string(),
                    refunded: false,
                })
            }
        }
    }

    async fn mark_sender_failed(&self, key: &str, legs: &TransferLegs, reason: &str, refunded: bool) {
        let update = legs.sender_failed(reason, refunded);
        if let Err(e) = self.services.writer.update(&legs.sender_reference, update.clone()).await {
            let write = DeferredWrite::UpdateTransaction {
                reference: legs.sender_reference.clone(),
                update,
            };
            self.services.defer(key, "sender_row", write, &e).await;
        }
    }

    async fn credit_platform_fee(&self, key: &str, cid: CorrelationId, legs: &TransferLegs, quote: &SettlementQuote) {
        let services = &self.services;
        let posting = Posting::for_transfer(
            cid,
            "fee",
            EntryType::PlatformFee,
            legs.receiver_reference.clone(),
            format!("Platform fee on {}", legs.receiver_reference),
        );

        match services
            .balances
            .credit(services.platform_user_id, quote.platform_fee, posting.clone())
            .await
        {
            Ok(_) => PLATFORM_FEES_COLLECTED.inc_by(quote.platform_fee.minor().max(0) as u64),
            Err(e) => {
                let write = DeferredWrite::CreditPlatformFee {
                    user_id: services.platform_user_id,
                    amount: quote.platform_fee,
                    posting,
                };
                services.defer(key, "platform_fee", write, &e).await;
            }
        }
    }

    async fn settle_invoice(
        &self,
        key: &str,
        invoice: &Invoice,
        sender: &WalletAccount,
        legs: &TransferLegs,
        quote: &SettlementQuote,
    ) -> InvoicePaymentSummary {
        let services = &self.services;

        let payment = InvoicePayment {
            id: PaymentId::new(),
            invoice_id: invoice.id,
            invoice_code: invoice.invoice_code.clone(),
            payer_id: sender.user_id,
            payer_name: sender.display_name.clone(),
            amount: quote.gross,
            fee: quote.platform_fee,
            net_amount: quote.net,
            payment_method: "wallet_transfer".to_string(),
            status: "success".to_string(),
            transfer_reference: legs.receiver_reference.clone(),
            created_at: Utc::now(),
        };
        if let Err(e) = services.invoices.record_payment(payment.clone()).await {
            services.defer(key, "invoice_payment", DeferredWrite::InsertInvoicePayment(payment), &e).await;
        }

        let (paid_amount, paid_quantity, status) =
            match services.invoices.settle(invoice.id, quote.gross, &legs.receiver_reference).await {
                Ok(settled) => (settled.paid_amount, settled.paid_quantity, settled.status),
                Err(e) => {
                    let write = DeferredWrite::SettleInvoice {
                        invoice_id: invoice.id,
                        gross: quote.gross,
                        transfer_reference: legs.receiver_reference.clone(),
                    };
                    services.defer(key, "invoice_update", write, &e).await;
                    let expected = FeeCalculator::invoice_update(invoice, quote.gross, &legs.receiver_reference, Utc::now());
                    (expected.paid_amount, expected.paid_quantity, expected.status)
                }
            };

        InvoicePaymentSummary {
            invoice_id: invoice.id,
            invoice_code: invoice.invoice_code.clone(),
            platform_fee: quote.platform_fee,
            net_amount: quote.net,
            paid_amount,
            paid_quantity,
            status,
        }
    }

    fn emails(
        sender: &WalletAccount,
        receiver: &WalletAccount,
        legs: &TransferLegs,
        quote: &SettlementQuote,
        invoice: Option<&InvoicePaymentSummary>,
    ) -> Vec<TransactionEmail> {
        let mut emails = vec![
            TransactionEmail {
                template: EmailTemplate::TransferSent,
                recipient: sender.user_id,
                recipient_name: sender.display_name.clone(),
                recipient_email: sender.email.clone(),
                payload: json!({
                    "reference": legs.sender_reference,
                    "amount": quote.gross,
                    "receiverName": receiver.display_name,
                    "narration": legs.narration,
                }),
            },
            TransactionEmail {
                template: EmailTemplate::TransferReceived,
                recipient: receiver.user_id,
                recipient_name: receiver.display_name.clone(),
                recipient_email: receiver.email.clone(),
                payload: json!({
                    "reference": legs.receiver_reference,
                    "amount": quote.net,
                    "fee": quote.platform_fee,
                    "senderName": sender.display_name,
                    "narration": legs.narration,
                }),
            },
        ];

        if let Some(summary) = invoice {
            emails.push(TransactionEmail {
                template: EmailTemplate::InvoicePaid,
                recipient: receiver.user_id,
                recipient_name: receiver.display_name.clone(),
                recipient_email: receiver.email.clone(),
                payload: json!({
                    "invoiceCode": summary.invoice_code,
                    "payerName": sender.display_name,
                    "amount": quote.gross,
                    "platformFee": summary.platform_fee,
                    "netAmount": summary.net_amount,
                    "status": summary.status,
                }),
            });
        }
        emails
    }
}
