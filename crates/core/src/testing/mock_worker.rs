//! Mock job worker for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::scheduler::{JobFailure, JobWorker, ProgressReporter};

/// Payload understood by [`MockWorker`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MockJob {
    /// How long the job runs.
    pub duration: Duration,
    /// Fail with this message instead of completing.
    pub failure: Option<String>,
    /// Panic instead of completing.
    pub panics: bool,
    /// Keep running after cancellation and complete normally.
    pub ignore_cancel: bool,
    /// Progress values reported before running.
    pub progress: Vec<f32>,
}

impl MockJob {
    /// A job that completes after `duration`.
    pub fn sleeping(duration: Duration) -> Self {
        Self {
            duration,
            ..Default::default()
        }
    }

    /// A job that fails immediately.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            failure: Some(message.into()),
            ..Default::default()
        }
    }

    /// A job whose worker panics.
    pub fn panicking() -> Self {
        Self {
            panics: true,
            ..Default::default()
        }
    }

    pub fn ignoring_cancel(mut self) -> Self {
        self.ignore_cancel = true;
        self
    }

    pub fn with_progress(mut self, values: Vec<f32>) -> Self {
        self.progress = values;
        self
    }
}

/// Mock implementation of the JobWorker trait.
///
/// Completes with `"done:<job id>"` and tracks how many jobs ran at once.
#[derive(Debug, Default)]
pub struct MockWorker {
    active: AtomicUsize,
    peak: AtomicUsize,
    started: Mutex<Vec<String>>,
}

struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockWorker {
    /// Create a new mock worker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Highest number of jobs observed running at the same time.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Jobs currently inside `run`.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    /// Ids of every job handed to the worker, in start order.
    pub fn started_jobs(&self) -> Vec<String> {
        self.started.lock().clone()
    }
}

#[async_trait]
impl JobWorker for MockWorker {
    type Payload = MockJob;
    type Output = String;

    async fn run(
        &self,
        job_id: &str,
        payload: MockJob,
        cancel: CancellationToken,
        progress: ProgressReporter,
    ) -> Result<String, JobFailure> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = ActiveGuard(&self.active);
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.started.lock().push(job_id.to_string());

        for value in &payload.progress {
            progress.report(*value);
        }
        if payload.panics {
            panic!("mock worker panic for {}", job_id);
        }
        if let Some(message) = payload.failure {
            return Err(JobFailure::Failed(message));
        }

        if payload.ignore_cancel {
            tokio::time::sleep(payload.duration).await;
        } else {
            tokio::select! {
                _ = cancel.cancelled() => return Err(JobFailure::Canceled),
                _ = tokio::time::sleep(payload.duration) => {}
            }
        }
        Ok(format!("done:{}", job_id))
    }
}
