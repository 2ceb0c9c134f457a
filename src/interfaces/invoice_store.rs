use async_trait::async_trait;
use crate::error::Result;
use crate::models::invoice::{Invoice, InvoicePayment, InvoiceUpdate};
use crate::types::amount::Amount;
use crate::types::ids::InvoiceId;

#[async_trait]
pub trait InvoiceStore: Send + Sync {
    async fn get_invoice_by_code(&self, code: &str) -> Result<Option<Invoice>>;
    async fn get_invoice_by_code_ignore_case(&self, code: &str) -> Result<Option<Invoice>>;
    async fn get_invoice(&self, invoice_id: InvoiceId) -> Result<Option<Invoice>>;

    /// Applies `update` only while the stored paid amount still equals
    /// `expected_paid_amount`. Returns the stored invoice on success,
    /// `None` when another payment got there first.
    async fn update_invoice(
        &self,
        invoice_id: InvoiceId,
        expected_paid_amount: Amount,
        update: InvoiceUpdate,
    ) -> Result<Option<Invoice>>;

    /// Fails with `DuplicateReference` if a payment for the same transfer
    /// reference already exists.
    async fn insert_invoice_payment(&self, payment: InvoicePayment) -> Result<()>;
    async fn payments_for_invoice(&self, invoice_id: InvoiceId) -> Result<Vec<InvoicePayment>>;
}
