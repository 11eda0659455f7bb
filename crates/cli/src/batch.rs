//! Runs one batch of conversions and tallies the outcome.

use std::path::PathBuf;

use anyhow::{bail, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use pixelbatch_core::{
    converter::{ConversionPipeline, ConversionResult, ConversionSettings, FfmpegRunner},
    discover_assets, Config, ConversionRequest, Job, JobEvent, JobScheduler,
};

/// Outcome counts of a finished batch.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchSummary {
    pub completed: usize,
    pub failed: usize,
    pub canceled: usize,
    /// Job id and error message of every failed job.
    pub failures: Vec<(String, String)>,
    pub outputs: Vec<PathBuf>,
}

impl BatchSummary {
    /// Folds one scheduler event into the tally.
    pub fn record(&mut self, event: &JobEvent<ConversionResult>) {
        match event {
            JobEvent::Completed { result, .. } => {
                self.completed += 1;
                self.outputs.push(result.output_path.clone());
                self.outputs.extend(result.extra_artifacts.iter().cloned());
            }
            JobEvent::Failed { job_id, error } => {
                self.failed += 1;
                self.failures.push((job_id.clone(), error.clone()));
            }
            JobEvent::Canceled { .. } => self.canceled += 1,
            _ => {}
        }
    }

    /// Process exit code: 1 if anything failed, 130 if interrupted, else 0.
    pub fn exit_code(&self) -> i32 {
        if self.failed > 0 {
            1
        } else if self.canceled > 0 {
            130
        } else {
            0
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "completed": self.completed,
            "failed": self.failed,
            "canceled": self.canceled,
            "failures": self
                .failures
                .iter()
                .map(|(job, error)| serde_json::json!({ "job": job, "error": error }))
                .collect::<Vec<_>>(),
            "outputs": self.outputs,
        })
    }
}

/// Discovers assets under `paths` and converts them all.
///
/// Returns once every job has settled. Canceling `shutdown` stops the batch.
pub async fn run_batch(
    config: &Config,
    settings: ConversionSettings,
    paths: &[PathBuf],
    shutdown: CancellationToken,
) -> Result<BatchSummary> {
    let assets = discover_assets(paths);
    if assets.is_empty() {
        bail!("No convertible assets found");
    }

    let runner = FfmpegRunner::new(config.tool.clone());
    let pipeline = ConversionPipeline::new(runner).with_suffix(config.output.suffix.clone());
    let scheduler = JobScheduler::with_cancellation(
        pipeline,
        config.scheduler.effective_concurrency(),
        shutdown.clone(),
    );
    let mut events = scheduler.events();

    let jobs: Vec<_> = assets
        .into_iter()
        .map(|asset| {
            let request = ConversionRequest {
                output_dir: config.output.dir_for(&asset.path),
                input: asset.path.clone(),
                kind: asset.kind,
                settings,
            };
            Job::new(asset.path.display().to_string(), request)
        })
        .collect();

    info!(
        "Converting {} assets with concurrency {}",
        jobs.len(),
        scheduler.concurrency()
    );

    // Enqueued before the canceler exists so a shutdown always finds the jobs.
    scheduler.enqueue(jobs);

    // Pending jobs are dropped on shutdown; running ones see the parent token.
    let canceler = {
        let scheduler = scheduler.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            shutdown.cancelled().await;
            scheduler.cancel_all();
        })
    };

    let mut summary = BatchSummary::default();
    while let Some(event) = events.recv().await {
        summary.record(&event);
        match &event {
            JobEvent::Started { job_id } => info!("Converting {}", job_id),
            JobEvent::Progress { job_id, value } => {
                debug!("{}: {:.0}%", job_id, value * 100.0)
            }
            JobEvent::Completed { job_id, result } => {
                info!("Done {} -> {}", job_id, result.output_path.display())
            }
            JobEvent::Failed { job_id, error } => error!("Failed {}: {}", job_id, error),
            JobEvent::Canceled { job_id } => warn!("Canceled {}", job_id),
            JobEvent::Queued { .. } => {}
            JobEvent::Idle => break,
        }
    }

    canceler.abort();
    Ok(summary)
}
