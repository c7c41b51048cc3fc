//! Generated accounting vouchers and their structural validation.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Allowed difference between a stated total and the sum of its lines.
const TOTAL_TOLERANCE: f64 = 0.01;

/// One booking line of a voucher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoucherLine {
    pub account_code: String,
    #[serde(default)]
    pub account_name: String,
    #[serde(default)]
    pub debit: f64,
    #[serde(default)]
    pub credit: f64,
    #[serde(default)]
    pub description: String,
}

/// The voucher generated for a single invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoucherEntry {
    pub invoice_number: String,
    pub date: NaiveDate,
    pub voucher_type: String,
    pub counterparty: String,
    #[serde(default)]
    pub currency: String,
    pub total_debit: f64,
    pub total_credit: f64,
    pub lines: Vec<VoucherLine>,
}

/// Structured result of a generation job: one entry per submitted invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountVoucher {
    pub entries: Vec<VoucherEntry>,
}

impl AccountVoucher {
    /// Check the shape of a freshly parsed voucher.
    ///
    /// Only structure is checked here: every entry has lines, every line has
    /// an account code and exactly one positive side, and the stated totals
    /// match the lines. Whether the bookings are sound accounting is left to
    /// the application.
    pub fn validate(&self) -> Result<(), String> {
        if self.entries.is_empty() {
            return Err("voucher has no entries".into());
        }
        for entry in &self.entries {
            entry.validate()?;
        }
        Ok(())
    }
}

impl VoucherEntry {
    fn validate(&self) -> Result<(), String> {
        let inv = &self.invoice_number;
        if inv.trim().is_empty() {
            return Err("entry without invoice_number".into());
        }
        if self.lines.is_empty() {
            return Err(format!("entry {inv} has no lines"));
        }
        let mut debit_sum = 0.0;
        let mut credit_sum = 0.0;
        for (i, line) in self.lines.iter().enumerate() {
            if line.account_code.trim().is_empty() {
                return Err(format!("entry {inv} line {i}: empty account_code"));
            }
            if !line.debit.is_finite() || !line.credit.is_finite() {
                return Err(format!("entry {inv} line {i}: non-finite amount"));
            }
            if line.debit < 0.0 || line.credit < 0.0 {
                return Err(format!("entry {inv} line {i}: negative amount"));
            }
            if (line.debit > 0.0) == (line.credit > 0.0) {
                return Err(format!(
                    "entry {inv} line {i}: exactly one of debit/credit must be positive"
                ));
            }
            debit_sum += line.debit;
            credit_sum += line.credit;
        }
        if (debit_sum - self.total_debit).abs() > TOTAL_TOLERANCE {
            return Err(format!(
                "entry {inv}: total_debit {} does not match lines ({debit_sum:.2})",
                self.total_debit
            ));
        }
        if (credit_sum - self.total_credit).abs() > TOTAL_TOLERANCE {
            return Err(format!(
                "entry {inv}: total_credit {} does not match lines ({credit_sum:.2})",
                self.total_credit
            ));
        }
        Ok(())
    }
}

/// Instruction given to the model for every voucher job.
pub const VOUCHER_INSTRUCTION: &str = "You are an accounting assistant. For every invoice \
in the input, produce one voucher entry with balanced booking lines. Use the grounding \
metadata for dates, amounts and payment terms. Each line books either a debit or a credit, \
never both.";

/// Canonical example of the JSON shape the model must return.
pub const VOUCHER_SHAPE: &str = r#"{
  "entries": [
    {
      "invoice_number": "INV-001",
      "date": "2024-03-14",
      "voucher_type": "purchase",
      "counterparty": "ACME Office Supplies GmbH",
      "currency": "EUR",
      "total_debit": 119.0,
      "total_credit": 119.0,
      "lines": [
        { "account_code": "4930", "account_name": "Office supplies", "debit": 100.0, "credit": 0.0, "description": "Printer paper" },
        { "account_code": "1576", "account_name": "Input tax 19%", "debit": 19.0, "credit": 0.0, "description": "VAT" },
        { "account_code": "1600", "account_name": "Accounts payable", "debit": 0.0, "credit": 119.0, "description": "ACME Office Supplies GmbH" }
      ]
    }
  ]
}"#;

#[cfg(test)]
pub(crate) fn sample_voucher() -> AccountVoucher {
    serde_json::from_str(VOUCHER_SHAPE).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shape_example_is_valid() {
        let voucher = sample_voucher();
        assert_eq!(voucher.entries.len(), 1);
        assert_eq!(voucher.entries[0].lines.len(), 3);
        assert!(voucher.validate().is_ok());
    }

    #[test]
    fn test_rejects_empty_voucher() {
        let voucher = AccountVoucher { entries: vec![] };
        assert!(voucher.validate().is_err());
    }

    #[test]
    fn test_rejects_entry_without_lines() {
        let mut voucher = sample_voucher();
        voucher.entries[0].lines.clear();
        let err = voucher.validate().unwrap_err();
        assert!(err.contains("has no lines"), "{err}");
    }

    #[test]
    fn test_rejects_line_with_both_sides() {
        let mut voucher = sample_voucher();
        voucher.entries[0].lines[0].credit = 5.0;
        let err = voucher.validate().unwrap_err();
        assert!(err.contains("exactly one of debit/credit"), "{err}");
    }

    #[test]
    fn test_rejects_empty_account_code() {
        let mut voucher = sample_voucher();
        voucher.entries[0].lines[1].account_code = "  ".into();
        assert!(voucher.validate().unwrap_err().contains("account_code"));
    }

    #[test]
    fn test_rejects_total_mismatch() {
        let mut voucher = sample_voucher();
        voucher.entries[0].total_debit = 200.0;
        assert!(voucher.validate().unwrap_err().contains("total_debit"));
    }

    #[test]
    fn test_rejects_negative_amount() {
        let mut voucher = sample_voucher();
        voucher.entries[0].lines[0].debit = -100.0;
        assert!(voucher.validate().unwrap_err().contains("negative"));
    }

    #[test]
    fn test_missing_required_field_fails_parse() {
        let json = r#"{"entries":[{"invoice_number":"X","lines":[]}]}"#;
        assert!(serde_json::from_str::<AccountVoucher>(json).is_err());
    }
}
