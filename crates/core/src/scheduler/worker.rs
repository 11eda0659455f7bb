//! Worker trait and per-job progress reporting.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::types::JobFailure;

/// Executes the payload of one job.
#[async_trait]
pub trait JobWorker: Send + Sync + 'static {
    /// Input of a job.
    type Payload: Send + 'static;
    /// Value reported on completion.
    type Output: Clone + Send + Sync + 'static;

    /// Runs one job.
    ///
    /// `cancel` fires when the job is canceled; a worker that notices should
    /// return [`JobFailure::Canceled`] promptly. Whatever it returns after
    /// cancellation, the job settles as canceled.
    async fn run(
        &self,
        job_id: &str,
        payload: Self::Payload,
        cancel: CancellationToken,
        progress: ProgressReporter,
    ) -> Result<Self::Output, JobFailure>;
}

struct ProgressState {
    last: Option<f32>,
    closed: bool,
}

struct ReporterInner {
    state: Mutex<ProgressState>,
    /// Records a value; runs under the state lock.
    emit: Box<dyn Fn(f32) + Send + Sync>,
    /// Publishes recorded values; runs after the state lock is released.
    flush: Box<dyn Fn() + Send + Sync>,
}

/// Reports fractional progress for one job.
///
/// Values are clamped to `[0, 1]`; anything not above the last reported value
/// is dropped, and every report after the job settles is ignored.
#[derive(Clone)]
pub struct ProgressReporter {
    inner: Arc<ReporterInner>,
}

impl ProgressReporter {
    pub(crate) fn new(
        emit: impl Fn(f32) + Send + Sync + 'static,
        flush: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        Self {
            inner: Arc::new(ReporterInner {
                state: Mutex::new(ProgressState {
                    last: None,
                    closed: false,
                }),
                emit: Box::new(emit),
                flush: Box::new(flush),
            }),
        }
    }

    /// A reporter that discards every value.
    pub fn noop() -> Self {
        Self::new(|_| {}, || {})
    }

    /// Reports a progress value.
    pub fn report(&self, value: f32) {
        if value.is_nan() {
            return;
        }
        let value = value.clamp(0.0, 1.0);

        {
            let mut state = self.inner.state.lock();
            if state.closed {
                return;
            }
            if matches!(state.last, Some(last) if value <= last) {
                return;
            }
            state.last = Some(value);
            (self.inner.emit)(value);
        }
        (self.inner.flush)();
    }

    /// Last value that was forwarded.
    pub fn last(&self) -> Option<f32> {
        self.inner.state.lock().last
    }

    /// Silences the reporter, running `f` while no report can interleave.
    pub(crate) fn close_with(&self, f: impl FnOnce()) {
        let mut state = self.inner.state.lock();
        state.closed = true;
        f();
    }
}

impl std::fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("ProgressReporter")
            .field("last", &state.last)
            .field("closed", &state.closed)
            .finish()
    }
}
