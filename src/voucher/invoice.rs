//! Inbound invoice records.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Whether the invoice was received (purchase) or issued (sale).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceDirection {
    #[default]
    Purchase,
    Sale,
}

impl InvoiceDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Purchase => "purchase",
            Self::Sale => "sale",
        }
    }
}

/// A single invoice as handed over by the application layer.
///
/// Field order is part of the cache identity: the orchestrator hashes the
/// serialized batch, so reordering fields here changes every job id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceRecord {
    pub invoice_number: String,
    #[serde(default)]
    pub direction: InvoiceDirection,
    /// Issuer of the invoice.
    pub vendor: String,
    /// Recipient of the invoice.
    #[serde(default)]
    pub customer: Option<String>,
    pub issue_date: NaiveDate,
    #[serde(default)]
    pub due_date: Option<NaiveDate>,
    pub net_amount: f64,
    #[serde(default)]
    pub tax_amount: f64,
    /// Percent, e.g. `19.0`.
    #[serde(default)]
    pub tax_rate: Option<f64>,
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Days after issue until payment is due. Ignored when `due_date` is set.
    #[serde(default)]
    pub payment_terms_days: Option<u32>,
    #[serde(default)]
    pub description: Option<String>,
}

fn default_currency() -> String {
    "EUR".to_string()
}

impl InvoiceRecord {
    /// Net plus tax, rounded to cents.
    pub fn gross_amount(&self) -> f64 {
        round_cents(self.net_amount + self.tax_amount)
    }

    /// The other party from our ledger's point of view.
    pub fn counterparty(&self) -> &str {
        match self.direction {
            InvoiceDirection::Purchase => &self.vendor,
            InvoiceDirection::Sale => self.customer.as_deref().unwrap_or(&self.vendor),
        }
    }
}

/// Request document carrying a batch: `{"invoices": [...]}` or a bare array.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum InvoiceBatch {
    Wrapped { invoices: Vec<InvoiceRecord> },
    Bare(Vec<InvoiceRecord>),
}

impl InvoiceBatch {
    pub fn into_invoices(self) -> Vec<InvoiceRecord> {
        match self {
            Self::Wrapped { invoices } | Self::Bare(invoices) => invoices,
        }
    }
}

pub(crate) fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
pub(crate) fn sample_invoice(number: &str) -> InvoiceRecord {
    InvoiceRecord {
        invoice_number: number.to_string(),
        direction: InvoiceDirection::Purchase,
        vendor: "ACME Office Supplies GmbH".to_string(),
        customer: None,
        issue_date: NaiveDate::from_ymd_opt(2024, 3, 14).unwrap(),
        due_date: None,
        net_amount: 100.0,
        tax_amount: 19.0,
        tax_rate: Some(19.0),
        currency: "EUR".to_string(),
        payment_terms_days: Some(30),
        description: Some("Printer paper".to_string()),
    }
}
