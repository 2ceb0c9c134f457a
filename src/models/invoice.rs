use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::types::amount::Amount;
use crate::types::ids::{InvoiceId, PaymentId, UserId};

/// Ordered so that a status can only ever be raised with `max`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Unpaid,
    PartiallyPaid,
    Paid,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub invoice_code: String,
    pub owner_id: UserId,
    pub total_amount: Amount,
    pub unit_price: Amount,
    pub paid_amount: Amount,
    pub paid_quantity: u32,
    pub target_quantity: u32,
    pub status: InvoiceStatus,
    pub allow_multiple_payments: bool,
    pub paid_at: Option<DateTime<Utc>>,
    /// Transfer references already folded into the aggregates.
    pub settled_references: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    pub fn new(
        invoice_code: impl Into<String>,
        owner_id: UserId,
        total_amount: Amount,
        target_quantity: u32,
        allow_multiple_payments: bool,
    ) -> Self {
        let now = Utc::now();
        let target_quantity = target_quantity.max(1);
        Invoice {
            id: InvoiceId::new(),
            invoice_code: invoice_code.into(),
            owner_id,
            total_amount,
            unit_price: Amount::from_minor(total_amount.minor() / target_quantity as i64),
            paid_amount: Amount::zero(),
            paid_quantity: 0,
            target_quantity,
            status: InvoiceStatus::Unpaid,
            allow_multiple_payments,
            paid_at: None,
            settled_references: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn has_settled(&self, transfer_reference: &str) -> bool {
        self.settled_references.iter().any(|r| r == transfer_reference)
    }

    pub fn apply(&mut self, update: &InvoiceUpdate) {
        self.paid_amount = update.paid_amount;
        self.paid_quantity = update.paid_quantity;
        self.status = update.status;
        self.paid_at = update.paid_at;
        self.settled_references.push(update.settled_reference.clone());
        self.updated_at = Utc::now();
    }
}

/// New aggregate values for an invoice after one settlement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvoiceUpdate {
    pub paid_amount: Amount,
    pub paid_quantity: u32,
    pub status: InvoiceStatus,
    pub paid_at: Option<DateTime<Utc>>,
    pub settled_reference: String,
}

/// Append-only payment history row for an invoice.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InvoicePayment {
    pub id: PaymentId,
    pub invoice_id: InvoiceId,
    pub invoice_code: String,
    pub payer_id: UserId,
    pub payer_name: String,
    pub amount: Amount,
    pub fee: Amount,
    pub net_amount: Amount,
    pub payment_method: String,
    pub status: String,
    pub transfer_reference: String,
    pub created_at: DateTime<Utc>,
}
