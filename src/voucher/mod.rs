//! Voucher domain types: inbound invoices, grounding metadata and the
//! generated accounting vouchers.

pub mod entry;
pub mod invoice;
pub mod metadata;

pub use entry::{AccountVoucher, VoucherEntry, VoucherLine, VOUCHER_INSTRUCTION, VOUCHER_SHAPE};
pub use invoice::{InvoiceBatch, InvoiceDirection, InvoiceRecord};
pub use metadata::{GenerationMetaData, PaymentSchedule};
