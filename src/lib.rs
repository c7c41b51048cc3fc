//! voucherd: AI-assisted accounting voucher generation.
//!
//! Invoice batches are submitted to a [`VoucherOrchestrator`], which keys
//! them by content hash, runs one background generation job per distinct
//! batch and exposes the job state for polling. Generation goes through a
//! [`GenerationConnector`] that prompts an external model, extracts the
//! fenced JSON answer, validates it and retries malformed output.

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod generation;
pub mod logging;
pub mod orchestrator;
pub mod utils;
pub mod voucher;

pub use cache::{ContentAddressedCache, HashKey, JobStatus};
pub use config::Config;
pub use error::{Result, VoucherError};
pub use generation::{GenerationBackend, GenerationConnector, OllamaBackend};
pub use orchestrator::VoucherOrchestrator;
pub use voucher::{AccountVoucher, InvoiceRecord};
