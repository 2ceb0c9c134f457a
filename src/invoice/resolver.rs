use std::sync::Arc;
use std::time::Duration;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use crate::error::Result;
use crate::interfaces::invoice_store::InvoiceStore;
use crate::models::invoice::Invoice;
use crate::types::ids::UserId;
use crate::utils::helper::with_timeout;

lazy_static! {
    static ref INVOICE_CODE: Regex =
        Regex::new(r"(?i)\bINV[-_ ]([A-Z0-9]{4})\b").expect("invoice code pattern compiles");
}

/// Why a transfer was not treated as an invoice settlement.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum PlainReason {
    NoInvoiceCode,
    InvoiceNotFound { code: String },
    OwnerMismatch { code: String },
    LookupFailed { code: String },
}

#[derive(Clone, Debug)]
pub enum Classification {
    Plain(PlainReason),
    InvoiceSettlement(Invoice),
}

impl Classification {
    pub fn is_invoice(&self) -> bool {
        matches!(self, Classification::InvoiceSettlement(_))
    }

    pub fn invoice(&self) -> Option<&Invoice> {
        match self {
            Classification::InvoiceSettlement(invoice) => Some(invoice),
            Classification::Plain(_) => None,
        }
    }
}

/// Extracts the canonical `INV-XXXX` candidate from free text.
pub fn extract_invoice_code(narration: &str) -> Option<String> {
    INVOICE_CODE
        .captures(narration)
        .and_then(|caps| caps.get(1))
        .map(|code| format!("INV-{}", code.as_str()))
}

pub struct InvoiceResolver {
    store: Arc<dyn InvoiceStore>,
    timeout: Duration,
}

impl InvoiceResolver {
    pub fn new(store: Arc<dyn InvoiceStore>, timeout: Duration) -> Self {
        InvoiceResolver { store, timeout }
    }

    /// Never fails: anything short of a confirmed invoice owned by the
    /// receiver degrades to a plain transfer.
    pub async fn classify(&self, narration: Option<&str>, receiver: UserId) -> Classification {
        let Some(code) = narration.and_then(extract_invoice_code) else {
            return Classification::Plain(PlainReason::NoInvoiceCode);
        };

        let invoice = match self.lookup(&code).await {
            Ok(Some(invoice)) => invoice,
            Ok(None) => {
                tracing::info!(code = %code, classify_as_invoice = false, reason = "not_found", "invoice code did not resolve");
                return Classification::Plain(PlainReason::InvoiceNotFound { code });
            }
            Err(e) => {
                tracing::warn!(code = %code, classify_as_invoice = false, reason = "lookup_failed", error = %e, "invoice lookup failed");
                return Classification::Plain(PlainReason::LookupFailed { code });
            }
        };

        if invoice.owner_id != receiver {
            tracing::info!(
                code = %code,
                invoice_id = %invoice.id,
                classify_as_invoice = false,
                reason = "owner_mismatch",
                "invoice is not owned by the receiver"
            );
            return Classification::Plain(PlainReason::OwnerMismatch { code });
        }

        tracing::info!(code = %code, invoice_id = %invoice.id, classify_as_invoice = true, "transfer settles invoice");
        Classification::InvoiceSettlement(invoice)
    }

    async fn lookup(&self, code: &str) -> Result<Option<Invoice>> {
        let exact = with_timeout("invoice lookup", self.timeout, self.store.get_invoice_by_code(code)).await?;
        if exact.is_some() {
            return Ok(exact);
        }
        with_timeout(
            "invoice lookup",
            self.timeout,
            self.store.get_invoice_by_code_ignore_case(code),
        )
        .await
    }
}
