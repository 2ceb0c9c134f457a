use chrono::{DateTime, Utc};
use serde::Serialize;
use crate::models::invoice::{Invoice, InvoiceStatus, InvoiceUpdate};
use crate::types::amount::Amount;

/// How a gross transfer amount splits between receiver and platform.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct SettlementQuote {
    pub gross: Amount,
    pub platform_fee: Amount,
    pub net: Amount,
}

pub struct FeeCalculator {
    invoice_fee_bps: u32,
}

impl FeeCalculator {
    pub fn new(invoice_fee_bps: u32) -> Self {
        FeeCalculator { invoice_fee_bps }
    }

    pub fn plain(amount: Amount) -> SettlementQuote {
        SettlementQuote {
            gross: amount,
            platform_fee: Amount::zero(),
            net: amount,
        }
    }

    /// platformFee = round(amount * rate), net = amount - platformFee
    pub fn invoice(&self, amount: Amount) -> SettlementQuote {
        let platform_fee = amount.basis_points(self.invoice_fee_bps);
        SettlementQuote {
            gross: amount,
            platform_fee,
            net: amount - platform_fee,
        }
    }

    /// Aggregates after one gross payment. Paid amount, quantity and status
    /// never move backwards.
    pub fn invoice_update(
        invoice: &Invoice,
        gross: Amount,
        transfer_reference: &str,
        now: DateTime<Utc>,
    ) -> InvoiceUpdate {
        let new_paid = invoice.paid_amount + gross;
        let target = invoice.target_quantity.max(1);

        let (paid_quantity, computed) = if invoice.allow_multiple_payments {
            // Units are counted against the exact total so a truncated unit price
            // can neither complete an underpaid invoice nor stall a cheap one.
            let completed_units = if invoice.total_amount.is_positive() {
                let units = i128::from(new_paid.minor().max(0)) * i128::from(target)
                    / i128::from(invoice.total_amount.minor());
                u32::try_from(units).unwrap_or(u32::MAX)
            } else {
                target
            };
            let quantity = invoice.paid_quantity.max(completed_units);

            let status = if quantity >= target {
                InvoiceStatus::Paid
            } else if new_paid.is_positive() {
                InvoiceStatus::PartiallyPaid
            } else {
                InvoiceStatus::Unpaid
            };
            (quantity, status)
        } else if new_paid >= invoice.total_amount {
            (invoice.paid_quantity.max(target), InvoiceStatus::Paid)
        } else if new_paid.is_positive() {
            (invoice.paid_quantity, InvoiceStatus::PartiallyPaid)
        } else {
            (invoice.paid_quantity, InvoiceStatus::Unpaid)
        };

        let status = computed.max(invoice.status);
        let paid_at = match (status, invoice.paid_at) {
            (_, Some(at)) => Some(at),
            (InvoiceStatus::Paid, None) => Some(now),
            _ => None,
        };

        InvoiceUpdate {
            paid_amount: new_paid,
            paid_quantity,
            status,
            paid_at,
            settled_reference: transfer_reference.to_string(),
        }
    }
}
