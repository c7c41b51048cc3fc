//! `generate` command handler.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};

use voucherd::config::Config;
use voucherd::orchestrator::VoucherOrchestrator;
use voucherd::voucher::InvoiceBatch;
use voucherd::JobStatus;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Submit the batch in `input`, wait for the job and write the voucher.
pub(crate) async fn cmd_generate(
    config: Config,
    input: PathBuf,
    output: Option<PathBuf>,
    wait_secs: u64,
) -> Result<()> {
    let raw = std::fs::read_to_string(&input)
        .with_context(|| format!("Failed to read invoice batch {}", input.display()))?;
    let invoices = serde_json::from_str::<InvoiceBatch>(&raw)
        .with_context(|| format!("Invalid invoice batch in {}", input.display()))?
        .into_invoices();

    let orchestrator = VoucherOrchestrator::from_config(&config)
        .with_context(|| "Failed to initialise the generation backend")?;

    let start = Instant::now();
    let key = orchestrator.submit(&invoices)?;
    eprintln!("Submitted {} invoice(s) as {key}", invoices.len());

    let status = orchestrator
        .wait_for_terminal(&key, POLL_INTERVAL, Duration::from_secs(wait_secs))
        .await;
    match status {
        JobStatus::Success => {}
        JobStatus::Pending => bail!("Job {key} still running after {wait_secs}s"),
        JobStatus::Error => bail!(
            "Job {key} failed after {} attempt(s); see logs for details",
            config.generation.max_attempts()
        ),
        JobStatus::NotFound => bail!("Job {key} was evicted before completion"),
    }

    let voucher = orchestrator
        .result(&key)
        .with_context(|| format!("Job {key} finished without a stored voucher"))?;
    let json = serde_json::to_string_pretty(&voucher)?;
    match output {
        Some(path) => {
            std::fs::write(&path, json + "\n")
                .with_context(|| format!("Failed to write voucher to {}", path.display()))?;
            eprintln!(
                "Wrote {} entr(ies) to {} in {:.1}s",
                voucher.entries.len(),
                path.display(),
                start.elapsed().as_secs_f64()
            );
        }
        None => println!("{json}"),
    }
    Ok(())
}
