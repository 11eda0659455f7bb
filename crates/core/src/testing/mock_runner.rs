//! Mock tool runner for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::converter::{ConverterError, InvocationStep, ToolInvocation, ToolRunner};

/// Mock implementation of the ToolRunner trait.
///
/// Provides controllable behavior for testing:
/// - Track invocations for assertions
/// - Create the output file of every successful invocation
/// - Simulate `out_time` progress reports
/// - Simulate failures per step, failed probes and slow runs
///
/// Clones share state, so a test can keep one handle and give another to the
/// pipeline.
///
/// # Example
///
/// ```rust,ignore
/// use pixelbatch_core::testing::MockToolRunner;
///
/// let runner = MockToolRunner::new();
/// runner.fail_step(InvocationStep::Spritesheet, "tile failed").await;
///
/// let pipeline = ConversionPipeline::new(runner.clone());
/// // ...
/// assert_eq!(runner.invocations().await.len(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct MockToolRunner {
    /// Recorded invocations.
    invocations: Arc<RwLock<Vec<ToolInvocation>>>,
    /// Steps that fail, with the diagnostics they report.
    failures: Arc<RwLock<HashMap<InvocationStep, String>>>,
    /// `out_time` values reported during every invocation.
    progress_times: Arc<RwLock<Vec<Duration>>>,
    /// Duration returned by the probe.
    duration_secs: Arc<RwLock<f64>>,
    /// Whether the probe fails.
    probe_fails: Arc<RwLock<bool>>,
    /// Simulated time per invocation.
    run_duration: Arc<RwLock<Duration>>,
}

impl Default for MockToolRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl MockToolRunner {
    /// Create a new mock runner.
    pub fn new() -> Self {
        Self {
            invocations: Arc::new(RwLock::new(Vec::new())),
            failures: Arc::new(RwLock::new(HashMap::new())),
            progress_times: Arc::new(RwLock::new(Vec::new())),
            duration_secs: Arc::new(RwLock::new(10.0)),
            probe_fails: Arc::new(RwLock::new(false)),
            run_duration: Arc::new(RwLock::new(Duration::ZERO)),
        }
    }

    /// Get all recorded invocations.
    pub async fn invocations(&self) -> Vec<ToolInvocation> {
        self.invocations.read().await.clone()
    }

    /// Clear recorded invocations.
    pub async fn clear_recorded(&self) {
        self.invocations.write().await.clear();
    }

    /// Make every invocation of `step` exit non-zero with `diagnostics`.
    pub async fn fail_step(&self, step: InvocationStep, diagnostics: impl Into<String>) {
        self.failures.write().await.insert(step, diagnostics.into());
    }

    /// Set the `out_time` values reported during each invocation.
    pub async fn set_progress_times(&self, times: Vec<Duration>) {
        *self.progress_times.write().await = times;
    }

    /// Set the duration returned by the probe.
    pub async fn set_duration(&self, secs: f64) {
        *self.duration_secs.write().await = secs;
    }

    /// Make the probe fail.
    pub async fn set_probe_failure(&self, fails: bool) {
        *self.probe_fails.write().await = fails;
    }

    /// Set the simulated time each invocation takes.
    pub async fn set_run_duration(&self, duration: Duration) {
        *self.run_duration.write().await = duration;
    }
}

#[async_trait]
impl ToolRunner for MockToolRunner {
    fn name(&self) -> &str {
        "mock"
    }

    async fn run(
        &self,
        invocation: &ToolInvocation,
        cancel: &CancellationToken,
        on_progress: &(dyn Fn(Duration) + Send + Sync),
    ) -> Result<(), ConverterError> {
        if cancel.is_cancelled() {
            return Err(ConverterError::Canceled);
        }
        self.invocations.write().await.push(invocation.clone());

        if let Some(diagnostics) = self.failures.read().await.get(&invocation.step) {
            return Err(ConverterError::ToolExitedNonZero {
                code: Some(1),
                diagnostics: diagnostics.clone(),
            });
        }

        let times = self.progress_times.read().await.clone();
        for time in times {
            on_progress(time);
        }

        let run_duration = *self.run_duration.read().await;
        if !run_duration.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => return Err(ConverterError::Canceled),
                _ = tokio::time::sleep(run_duration) => {}
            }
        }

        if let Some(parent) = invocation.output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&invocation.output, b"mock output").await?;
        Ok(())
    }

    async fn probe_duration(&self, path: &Path) -> Result<f64, ConverterError> {
        if *self.probe_fails.read().await {
            return Err(ConverterError::probe_failed(format!(
                "mock probe failure for {}",
                path.display()
            )));
        }
        Ok(*self.duration_secs.read().await)
    }
}
