//! Voucher job orchestration.
//!
//! [`VoucherOrchestrator`] ties the [`ContentAddressedCache`] to a
//! [`GenerationConnector`]. `submit` hashes the invoice batch, reserves a
//! `Pending` slot under the cache lock and, only if the slot was newly
//! reserved, spawns a background job. Callers poll `status` / `result` with
//! the returned [`HashKey`].
//!
//! Each job runs inside a supervisor task: if the worker panics the
//! supervisor still writes `Error`, so every reserved key reaches a terminal
//! state. The write is tied to the job's reservation: if capacity pressure
//! evicted the entry, the result is dropped rather than re-inserted.
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn demo() -> voucherd::error::Result<()> {
//! use std::time::Duration;
//! use voucherd::config::Config;
//! use voucherd::orchestrator::VoucherOrchestrator;
//! use voucherd::voucher::InvoiceRecord;
//!
//! let orchestrator = VoucherOrchestrator::from_config(&Config::default())?;
//! let invoices: Vec<InvoiceRecord> = serde_json::from_str(
//!     r#"[{"invoice_number": "INV-1", "vendor": "ACME", "issue_date": "2024-03-14",
//!          "net_amount": 100.0, "tax_amount": 19.0}]"#,
//! )?;
//! let key = orchestrator.submit(&invoices)?;
//! let status = orchestrator
//!     .wait_for_terminal(&key, Duration::from_millis(250), Duration::from_secs(120))
//!     .await;
//! println!("{key}: {status:?}");
//! # Ok(())
//! # }
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::cache::{
    CacheStats, ContentAddressedCache, HashKey, JobStatus, Reservation, ReservationId,
};
use crate::config::Config;
use crate::error::{Result, VoucherError};
use crate::generation::{GenerationBackend, GenerationConnector, OllamaBackend};
use crate::utils::sanitize::{excerpt, DEFAULT_MAX_EXCERPT_BYTES};
use crate::voucher::{
    AccountVoucher, GenerationMetaData, InvoiceRecord, VOUCHER_INSTRUCTION, VOUCHER_SHAPE,
};

/// Build the connector used for voucher jobs.
pub fn voucher_connector(
    backend: Arc<dyn GenerationBackend>,
    model: &str,
) -> GenerationConnector<AccountVoucher> {
    GenerationConnector::new(backend, model, VOUCHER_INSTRUCTION, VOUCHER_SHAPE)
        .with_validator(|voucher: &AccountVoucher| voucher.validate())
}

/// Input document handed to the model for one job.
#[derive(Serialize)]
struct JobInput<'a> {
    metadata: Vec<GenerationMetaData>,
    invoices: &'a [InvoiceRecord],
}

struct Inner {
    cache: Mutex<ContentAddressedCache<AccountVoucher>>,
    connector: GenerationConnector<AccountVoucher>,
    max_payload_bytes: usize,
}

/// Non-blocking submission and polling API over the generation pipeline.
///
/// Clone is cheap: all clones share the same cache and connector.
#[derive(Clone)]
pub struct VoucherOrchestrator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for VoucherOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoucherOrchestrator")
            .field("connector", &self.inner.connector)
            .field("max_payload_bytes", &self.inner.max_payload_bytes)
            .finish()
    }
}

impl VoucherOrchestrator {
    pub fn new(
        connector: GenerationConnector<AccountVoucher>,
        cache_capacity: usize,
        max_payload_bytes: usize,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                cache: Mutex::new(ContentAddressedCache::new(cache_capacity)),
                connector,
                max_payload_bytes,
            }),
        }
    }

    /// Wire an [`OllamaBackend`] and voucher connector from configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        let generation = &config.generation;
        let timeout = Duration::from_secs(generation.attempt_timeout_secs);
        // Client timeout sits just above the per-attempt budget so the
        // attempt timeout is what normally fires.
        let backend = OllamaBackend::new(
            &generation.base_url,
            timeout.saturating_add(Duration::from_secs(5)),
        )?;
        let connector = voucher_connector(Arc::new(backend), &generation.model)
            .with_retry_limit(generation.retry_limit)
            .with_attempt_timeout(timeout);
        Ok(Self::new(
            connector,
            config.cache.capacity,
            generation.max_payload_bytes,
        ))
    }

    /// Submit an invoice batch and return its job id without waiting.
    ///
    /// Identical batches return the same id and never start a second job
    /// while the first one is running or its result is resident. Only input
    /// validation errors are
    /// returned; generation failures surface as [`JobStatus::Error`].
    ///
    /// Must be called from within a Tokio runtime.
    pub fn submit(&self, invoices: &[InvoiceRecord]) -> Result<HashKey> {
        if invoices.is_empty() {
            return Err(VoucherError::InvalidPayload("empty invoice batch".into()));
        }
        let serialized = serde_json::to_vec(invoices)?;
        if serialized.len() > self.inner.max_payload_bytes {
            return Err(VoucherError::PayloadTooLarge {
                size: serialized.len(),
                limit: self.inner.max_payload_bytes,
            });
        }
        let key = HashKey::from_bytes(&serialized);

        let reservation = match self.lock_cache().reserve(&key) {
            Reservation::Existing(entry) => {
                debug!(key = %key.short(), status = ?entry.status, "Voucher job already known");
                return Ok(key);
            }
            Reservation::Reserved(id) => id,
        };

        info!(key = %key.short(), invoices = invoices.len(), "Voucher job submitted");
        self.spawn_job(key.clone(), reservation, invoices.to_vec());
        Ok(key)
    }

    /// Current state of job `key`.
    pub fn status(&self, key: &HashKey) -> JobStatus {
        self.lock_cache().get(key).status
    }

    /// The generated voucher, only once the job reached `Success`.
    ///
    /// `Pending`, `Error` and unknown keys all return `None`; use
    /// [`status`](Self::status) to tell them apart.
    pub fn result(&self, key: &HashKey) -> Option<AccountVoucher> {
        let entry = self.lock_cache().get(key);
        match entry.status {
            JobStatus::Success => entry.value,
            _ => None,
        }
    }

    /// Largest serialized batch `submit` accepts.
    pub fn max_payload_bytes(&self) -> usize {
        self.inner.max_payload_bytes
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.lock_cache().stats()
    }

    /// Poll until `key` leaves `Pending` or `deadline` elapses.
    ///
    /// Returns the last observed status.
    pub async fn wait_for_terminal(
        &self,
        key: &HashKey,
        poll_interval: Duration,
        deadline: Duration,
    ) -> JobStatus {
        let started = Instant::now();
        loop {
            let status = self.status(key);
            if status != JobStatus::Pending || started.elapsed() >= deadline {
                return status;
            }
            tokio::time::sleep(poll_interval).await;
        }
    }

    // -- private helpers ---------------------------------------------------

    fn lock_cache(&self) -> MutexGuard<'_, ContentAddressedCache<AccountVoucher>> {
        self.inner.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn spawn_job(&self, key: HashKey, reservation: ReservationId, invoices: Vec<InvoiceRecord>) {
        let inner = self.inner.clone();
        let span = info_span!("voucher_job", key = %key.short());
        tokio::spawn(
            async move {
                let started = Instant::now();
                let worker_inner = inner.clone();
                let worker = tokio::spawn(async move { worker_inner.run_job(&invoices).await });

                let (status, value) = match worker.await {
                    Ok(Some(voucher)) => (JobStatus::Success, Some(voucher)),
                    Ok(None) => (JobStatus::Error, None),
                    Err(e) => {
                        error!(error = %e, "Voucher job aborted");
                        (JobStatus::Error, None)
                    }
                };

                info!(
                    status = ?status,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Voucher job finished"
                );
                let written = inner
                    .cache
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .complete(&key, reservation, status, value);
                if !written {
                    warn!("Voucher job result dropped: entry was evicted while running");
                }
            }
            .instrument(span),
        );
    }
}

impl Inner {
    async fn run_job(&self, invoices: &[InvoiceRecord]) -> Option<AccountVoucher> {
        let input = JobInput {
            metadata: GenerationMetaData::derive_all(invoices),
            invoices,
        };
        let input = match serde_json::to_string_pretty(&input) {
            Ok(s) => s,
            Err(e) => {
                error!(error = %e, "Failed to serialize job input");
                return None;
            }
        };
        match self.connector.try_generate(&input).await {
            Ok(voucher) => Some(voucher),
            Err(e) => {
                warn!(
                    error = %excerpt(&e.to_string(), DEFAULT_MAX_EXCERPT_BYTES),
                    "Voucher generation gave up"
                );
                None
            }
        }
    }
}
