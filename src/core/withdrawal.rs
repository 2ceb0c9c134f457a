use std::sync::Arc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::Instrument;
use crate::core::journal::{fingerprint, JournalBegin, StoredOutcome};
use crate::core::orchestrator::{parse_user_id, required, AmountInput};
use crate::core::services::SettlementServices;
use crate::core::state_machine::TransferState;
use crate::error::{Error, Result};
use crate::interfaces::bank_rail::PayoutInstruction;
use crate::interfaces::notifier::{EmailTemplate, TransactionEmail};
use crate::models::transaction::{PartySnapshot, Transaction, TransactionStatus, TransactionType, TransactionUpdate};
use crate::observability::metrics::{PLATFORM_FEES_COLLECTED, WITHDRAWALS_TOTAL};
use crate::observability::tracing::trace_withdrawal;
use crate::settlement::accounts::WalletAccount;
use crate::settlement::ledger::{EntryType, Posting};
use crate::settlement::outbox::DeferredWrite;
use crate::types::amount::Amount;
use crate::types::ids::CorrelationId;
use crate::utils::helper::{alert_operations_team_critical, generate_reference, with_timeout};
use crate::verification::pin::{PinInput, PinVerifier};

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalRequest {
    pub user_id: Option<String>,
    pub amount: Option<AmountInput>,
    pub bank_code: Option<String>,
    pub account_number: Option<String>,
    pub account_name: Option<String>,
    pub narration: Option<String>,
    pub pin: Option<PinInput>,
    pub idempotency_key: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalReceipt {
    pub message: String,
    pub reference: String,
    pub correlation_id: CorrelationId,
    pub amount: Amount,
    pub fee: Amount,
    pub total_deduction: Amount,
    pub provider_reference: String,
    pub status: TransactionStatus,
}

struct Destination {
    bank_code: String,
    account_number: String,
    account_name: String,
}

/// Wallet-to-bank payout: debit amount plus fee, call the rail, refund
/// everything if the rail fails.
pub struct WithdrawalProcessor {
    services: Arc<SettlementServices>,
}

impl WithdrawalProcessor {
    pub fn new(services: Arc<SettlementServices>) -> Self {
        WithdrawalProcessor { services }
    }

    pub async fn execute(&self, request: WithdrawalRequest) -> Result<WithdrawalReceipt> {
        let result = self.run(request).await;
        let outcome = match &result {
            Ok(_) => "success",
            Err(e) => e.reason(),
        };
        WITHDRAWALS_TOTAL.with_label_values(&[outcome]).inc();
        result
    }

    async fn run(&self, request: WithdrawalRequest) -> Result<WithdrawalReceipt> {
        let services = &self.services;
        services.controls.ensure_withdrawals_open()?;

        let user_id = parse_user_id(required(&request.user_id, "userId")?, "userId")?;
        let amount = request.amount.as_ref().ok_or(Error::MissingField("amount"))?.to_amount()?;
        let destination = Destination {
            bank_code: required(&request.bank_code, "bankCode")?.to_string(),
            account_number: required(&request.account_number, "accountNumber")?.to_string(),
            account_name: required(&request.account_name, "accountName")?.to_string(),
        };
        let pin = request.pin.clone().filter(|p| !p.is_empty()).ok_or(Error::MissingField("pin"))?;

        let minimum = services.transfer.minimum_amount();
        if amount < minimum {
            return Err(Error::AmountBelowMinimum { amount, minimum });
        }

        let cid = CorrelationId::new();
        let narration = request.narration.as_deref().map(str::trim).filter(|n| !n.is_empty()).map(str::to_string);
        let span = trace_withdrawal(&cid, &user_id);

        async move {
            let user = services.find_user(user_id).await?;
            PinVerifier::verify(&user.pin_hash, &pin)?;

            let key = request
                .idempotency_key
                .as_deref()
                .map(str::trim)
                .filter(|k| !k.is_empty())
                .map(str::to_string)
                .unwrap_or_else(|| cid.to_string());
            let fingerprint = fingerprint(&[
                "withdrawal",
                &user_id.to_string(),
                &amount.minor().to_string(),
                &destination.bank_code,
                &destination.account_number,
            ]);

            match services.begin_journal(&key, &fingerprint, cid).await? {
                JournalBegin::Fresh(_) => {}
                JournalBegin::InFlight(_) => return Err(Error::TransferInProgress(key)),
                JournalBegin::Replay(StoredOutcome::Succeeded(receipt)) => {
                    return serde_json::from_value(receipt).map_err(|e| Error::SerializationError(e.to_string()));
                }
                JournalBegin::Replay(StoredOutcome::Failed(error)) => return Err(error),
                JournalBegin::FingerprintMismatch => return Err(Error::IdempotencyKeyReuse(key)),
            }

            let mut debited = false;
            let result = self.withdraw(&key, cid, &user, amount, &destination, narration, &mut debited).await;
            match &result {
                Ok(receipt) => match serde_json::to_value(receipt) {
                    Ok(value) => services.finish_journal(&key, StoredOutcome::Succeeded(value)).await,
                    Err(e) => tracing::warn!(key = %key, error = %e, "receipt not journaled"),
                },
                Err(error) if debited => services.finish_journal(&key, StoredOutcome::Failed(error.clone())).await,
                Err(_) => services.release_journal(&key).await,
            }
            result
        }
        .instrument(span)
        .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn withdraw(
        &self,
        key: &str,
        cid: CorrelationId,
        user: &WalletAccount,
        amount: Amount,
        destination: &Destination,
        narration: Option<String>,
        debited: &mut bool,
    ) -> Result<WithdrawalReceipt> {
        let services = &self.services;
        let fee = services.fees.withdrawal_fee();
        let total = amount.checked_add(fee).ok_or_else(|| Error::Overflow {
            operation: "withdrawal total".to_string(),
        })?;

        if user.balance < total {
            return Err(Error::InsufficientFunds {
                required: total,
                available: user.balance,
            });
        }

        let reference = generate_reference("WD", cid);
        let mut row = Transaction::new(user.user_id, TransactionType::Withdrawal, amount, reference.clone(), cid);
        row.fee = fee;
        row.total_deduction = total;
        row.narration = narration.clone();
        row.sender = Some(user.snapshot());
        row.receiver = Some(PartySnapshot {
            name: destination.account_name.clone(),
            bank: destination.bank_code.clone(),
            account_number: destination.account_number.clone(),
            wallet_id: None,
        });
        services.writer.insert(row).await?;

        services.journal_state(key, TransferState::Debiting).await;
        let posting = Posting::for_transfer(
            cid,
            "debit",
            EntryType::Withdrawal,
            reference.clone(),
            format!("Withdrawal to {} {}", destination.bank_code, destination.account_number),
        );
        if let Err(e) = services.balances.debit(user.user_id, total, posting).await {
            let lookup = match e {
                Error::InsufficientFunds { .. } => Ok(None),
                _ => services.balances.find_posting(&cid.posting_key("debit")).await,
            };
            match lookup {
                Ok(None) => {
                    self.mark(key, &reference, TransactionUpdate::failed(e.reason())).await;
                    return Err(e);
                }
                Ok(Some(_)) => {
                    tracing::warn!(error = %e, "debit acknowledgement lost but the posting landed");
                }
                Err(lookup) => {
                    // Keep the outcome journaled; a retry must not debit again.
                    alert_operations_team_critical(format!(
                        "withdrawal debit for {reference} unknown: {e}; lookup failed: {lookup}"
                    ));
                    *debited = true;
                    return Err(e);
                }
            }
        }
        *debited = true;

        self.mark(key, &reference, TransactionUpdate::status(TransactionStatus::Processing)).await;
        services.journal_state(key, TransferState::Crediting).await;

        let instruction = PayoutInstruction {
            reference: reference.clone(),
            amount,
            bank_code: destination.bank_code.clone(),
            account_number: destination.account_number.clone(),
            account_name: destination.account_name.clone(),
            narration,
        };
        let payout = with_timeout(
            "bank payout",
            services.transfer.payout_timeout(),
            services.collaborators.bank_rail.payout(instruction),
        )
        .await;

        match payout {
            Ok(receipt) => {
                let update = TransactionUpdate {
                    response: Some(json!({
                        "provider_reference": receipt.provider_reference,
                        "details": receipt.details,
                    })),
                    ..TransactionUpdate::status(TransactionStatus::Success)
                };
                self.mark(key, &reference, update).await;
                self.credit_fee(key, cid, &reference, fee).await;
                services.journal_state(key, TransferState::Done).await;

                tracing::info!(
                    reference = %reference,
                    amount = %amount,
                    fee = %fee,
                    provider_reference = %receipt.provider_reference,
                    "withdrawal completed"
                );
                services.notifications.dispatch(vec![Self::email(
                    EmailTemplate::WithdrawalCompleted,
                    user,
                    json!({ "reference": reference, "amount": amount, "fee": fee, "bankCode": destination.bank_code }),
                )]);

                Ok(WithdrawalReceipt {
                    message: "Withdrawal successful".to_string(),
                    reference,
                    correlation_id: cid,
                    amount,
                    fee,
                    total_deduction: total,
                    provider_reference: receipt.provider_reference,
                    status: TransactionStatus::Success,
                })
            }
            Err(e) => {
                tracing::error!(reference = %reference, error = %e, "payout failed, refunding");
                services.journal_state(key, TransferState::Compensating).await;
                let refunded = services.refund(user.user_id, total, &reference, cid).await;
                let update = TransactionUpdate {
                    response: Some(json!({
                        "failure_reason": e.to_string(),
                        "refunded": refunded,
                    })),
                    ..TransactionUpdate::status(TransactionStatus::Failed)
                };
                self.mark(key, &reference, update).await;
                services.journal_state(key, TransferState::Failed).await;

                services.notifications.dispatch(vec![Self::email(
                    EmailTemplate::WithdrawalFailed,
                    user,
                    json!({ "reference": reference, "amount": amount, "refunded": refunded }),
                )]);

                Err(Error::PayoutFailed {
                    reason: e.to_string(),
                    refunded,
                })
            }
        }
    }

    async fn mark(&self, key: &str, reference: &str, update: TransactionUpdate) {
        if let Err(e) = self.services.writer.update(reference, update.clone()).await {
            let write = DeferredWrite::UpdateTransaction {
                reference: reference.to_string(),
                update,
            };
            self.services.defer(key, "withdrawal_row", write, &e).await;
        }
    }

    async fn credit_fee(&self, key: &str, cid: CorrelationId, reference: &str, fee: Amount) {
        if !fee.is_positive() {
            return;
        }
        let services = &self.services;
        let posting = Posting::for_transfer(cid, "fee", EntryType::PlatformFee, reference, format!("Withdrawal fee on {reference}"));
        match services.balances.credit(services.platform_user_id, fee, posting.clone()).await {
            Ok(_) => PLATFORM_FEES_COLLECTED.inc_by(fee.minor().max(0) as u64),
            Err(e) => {
                let write = DeferredWrite::CreditPlatformFee {
                    user_id: services.platform_user_id,
                    amount: fee,
                    posting,
                };
                services.defer(key, "platform_fee", write, &e).await;
            }
        }
    }

    fn email(template: EmailTemplate, user: &WalletAccount, payload: serde_json::Value) -> TransactionEmail {
        TransactionEmail {
            template,
            recipient: user.user_id,
            recipient_name: user.display_name.clone(),
            recipient_email: user.email.clone(),
            payload,
        }
    }
}
