//! Per-invoice grounding facts handed to the model alongside the raw batch.

use chrono::{Days, NaiveDate};
use serde::Serialize;

use super::invoice::{round_cents, InvoiceDirection, InvoiceRecord};

/// When the invoice has to be settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "days", rename_all = "snake_case")]
pub enum PaymentSchedule {
    /// Due on the issue date.
    Immediate,
    /// Due a number of days after issue.
    Net(u32),
}

/// Facts derived deterministically from one [`InvoiceRecord`].
///
/// Built fresh for every job and never mutated.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationMetaData {
    pub invoice_number: String,
    pub date: NaiveDate,
    pub classification: InvoiceDirection,
    pub counterparty: String,
    pub currency: String,
    pub net_amount: f64,
    pub tax_amount: f64,
    pub gross_amount: f64,
    /// Stated rate, or net/tax ratio when the invoice does not state one.
    pub effective_tax_rate: Option<f64>,
    pub payment_due: NaiveDate,
    pub payment_schedule: PaymentSchedule,
}

impl GenerationMetaData {
    pub fn derive(invoice: &InvoiceRecord) -> Self {
        let (payment_due, payment_schedule) = payment_terms(invoice);
        let effective_tax_rate = invoice.tax_rate.or_else(|| {
            (invoice.net_amount.abs() > f64::EPSILON)
                .then(|| round_cents(invoice.tax_amount / invoice.net_amount * 100.0))
        });
        Self {
            invoice_number: invoice.invoice_number.clone(),
            date: invoice.issue_date,
            classification: invoice.direction,
            counterparty: invoice.counterparty().to_string(),
            currency: invoice.currency.clone(),
            net_amount: round_cents(invoice.net_amount),
            tax_amount: round_cents(invoice.tax_amount),
            gross_amount: invoice.gross_amount(),
            effective_tax_rate,
            payment_due,
            payment_schedule,
        }
    }

    /// Derive metadata for a whole batch, preserving order.
    pub fn derive_all(invoices: &[InvoiceRecord]) -> Vec<Self> {
        invoices.iter().map(Self::derive).collect()
    }
}

fn payment_terms(invoice: &InvoiceRecord) -> (NaiveDate, PaymentSchedule) {
    if let Some(due) = invoice.due_date {
        let days = (due - invoice.issue_date).num_days().max(0);
        let schedule = match u32::try_from(days) {
            Ok(0) => PaymentSchedule::Immediate,
            Ok(d) => PaymentSchedule::Net(d),
            Err(_) => PaymentSchedule::Net(u32::MAX),
        };
        return (due, schedule);
    }
    match invoice.payment_terms_days {
        None | Some(0) => (invoice.issue_date, PaymentSchedule::Immediate),
        Some(days) => {
            let due = invoice
                .issue_date
                .checked_add_days(Days::new(u64::from(days)))
                .unwrap_or(NaiveDate::MAX);
            (due, PaymentSchedule::Net(days))
        }
    }
}
