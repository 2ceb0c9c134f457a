use std::sync::Arc;
use std::time::Duration;
use crate::error::{Error, Result};
use crate::interfaces::invoice_store::InvoiceStore;
use crate::models::invoice::{Invoice, InvoicePayment};
use crate::settlement::fee_calculator::FeeCalculator;
use crate::types::amount::Amount;
use crate::types::ids::InvoiceId;
use crate::utils::helper::with_timeout;

const MAX_UPDATE_ATTEMPTS: u32 = 3;

/// Applies a settling payment to an invoice aggregate.
///
/// Updates are conditional on the paid amount read beforehand, so two
/// concurrent settlements cannot overwrite each other's contribution.
/// Each transfer reference is folded in at most once.
pub struct InvoiceSettler {
    store: Arc<dyn InvoiceStore>,
    timeout: Duration,
}

impl InvoiceSettler {
    pub fn new(store: Arc<dyn InvoiceStore>, timeout: Duration) -> Self {
        InvoiceSettler { store, timeout }
    }

    /// Appends to the payment history. A row already present for the
    /// transfer reference counts as written.
    pub async fn record_payment(&self, payment: InvoicePayment) -> Result<()> {
        let reference = payment.transfer_reference.clone();
        match with_timeout("insert invoice payment", self.timeout, self.store.insert_invoice_payment(payment)).await {
            Ok(()) => Ok(()),
            Err(Error::DuplicateReference(_)) => {
                tracing::debug!(transfer_reference = %reference, "invoice payment already recorded");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    pub async fn settle(&self, invoice_id: InvoiceId, gross: Amount, transfer_reference: &str) -> Result<Invoice> {
        for attempt in 1..=MAX_UPDATE_ATTEMPTS {
            let current = with_timeout("get invoice", self.timeout, self.store.get_invoice(invoice_id))
                .await?
                .ok_or(Error::InvoiceNotFound(invoice_id))?;

            if current.has_settled(transfer_reference) {
                return Ok(current);
            }

            let update = FeeCalculator::invoice_update(&current, gross, transfer_reference, chrono::Utc::now());
            let applied = with_timeout(
                "update invoice",
                self.timeout,
                self.store.update_invoice(invoice_id, current.paid_amount, update),
            )
            .await?;

            match applied {
                Some(invoice) => {
                    tracing::info!(
                        invoice_id = %invoice_id,
                        invoice_code = %invoice.invoice_code,
                        paid_amount = %invoice.paid_amount,
                        paid_quantity = invoice.paid_quantity,
                        status = ?invoice.status,
                        "invoice settled"
                    );
                    return Ok(invoice);
                }
                None => {
                    tracing::debug!(invoice_id = %invoice_id, attempt, "invoice changed underneath, retrying");
                }
            }
        }

        Err(Error::InvoiceConflict(invoice_id))
    }
}
