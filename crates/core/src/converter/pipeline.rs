//! Per-asset conversion pipeline.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::scheduler::{JobFailure, JobWorker, ProgressReporter};

use super::error::ConverterError;
use super::filter_graph::build_filter_graph;
use super::traits::{InvocationStep, ToolInvocation, ToolRunner};
use super::types::{
    AssetKind, ConversionRequest, ConversionResult, ConversionSettings, OutputFormat,
    SpritesheetMetadata,
};

/// Spritesheet tiles per row.
pub const SPRITESHEET_COLUMNS: u32 = 8;
/// Spritesheet tiles per column.
pub const SPRITESHEET_ROWS: u32 = 8;

/// Upper bound of progress reported while the primary invocation runs.
const PRIMARY_PROGRESS_CEILING: f32 = 0.99;

/// Suffix appended to the stem of every produced file.
pub const DEFAULT_OUTPUT_SUFFIX: &str = "_pixelated";

/// Paths of every file a request may produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPlan {
    pub format: OutputFormat,
    pub primary: PathBuf,
    pub spritesheet: PathBuf,
    pub spritesheet_metadata: PathBuf,
    pub alpha_mask: PathBuf,
}

impl OutputPlan {
    /// Derives output paths from the input stem, the resolved format and the suffix.
    pub fn new(input: &Path, output_dir: &Path, format: OutputFormat, suffix: &str) -> Self {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());
        let base = format!("{}{}", stem, suffix);

        Self {
            format,
            primary: output_dir.join(format!("{}.{}", base, format.extension())),
            spritesheet: output_dir.join(format!("{}_spritesheet.png", base)),
            spritesheet_metadata: output_dir.join(format!("{}_spritesheet.json", base)),
            alpha_mask: output_dir.join(format!("{}_alpha.{}", base, format.extension())),
        }
    }
}

/// Maps `out_time` reports of the primary invocation onto `[0, 0.99]`.
struct VideoProgress<'a> {
    duration_secs: Option<f64>,
    last: Mutex<f32>,
    sink: &'a (dyn Fn(f32) + Send + Sync),
}

impl<'a> VideoProgress<'a> {
    fn new(duration_secs: Option<f64>, sink: &'a (dyn Fn(f32) + Send + Sync)) -> Self {
        Self {
            duration_secs: duration_secs.filter(|d| *d > 0.0),
            last: Mutex::new(0.0),
            sink,
        }
    }

    fn observe(&self, out_time: Duration) {
        let Some(total) = self.duration_secs else {
            return;
        };
        let fraction = (out_time.as_secs_f64() / total) as f32;
        let value = fraction.clamp(0.0, 1.0) * PRIMARY_PROGRESS_CEILING;

        let mut last = self.last.lock();
        if value > *last {
            *last = value;
            (self.sink)(value);
        }
    }
}

/// Converts one asset: primary output plus optional derived artifacts.
///
/// Stateless across calls; everything a run needs comes from the request.
pub struct ConversionPipeline<R: ToolRunner> {
    runner: Arc<R>,
    suffix: String,
}

impl<R: ToolRunner> ConversionPipeline<R> {
    pub fn new(runner: R) -> Self {
        Self {
            runner: Arc::new(runner),
            suffix: DEFAULT_OUTPUT_SUFFIX.to_string(),
        }
    }

    /// Replaces the stem suffix of produced files.
    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Computes where a request writes its outputs.
    pub fn plan(&self, request: &ConversionRequest) -> OutputPlan {
        let format = request
            .kind
            .resolve_format(request.settings.output_format);
        OutputPlan::new(&request.input, &request.output_dir, format, &self.suffix)
    }

    /// Runs the whole conversion for one request.
    ///
    /// `on_progress` receives fractions in `[0, 1]`; `1.0` is reported once,
    /// after every step has finished.
    pub async fn convert(
        &self,
        request: &ConversionRequest,
        cancel: &CancellationToken,
        on_progress: &(dyn Fn(f32) + Send + Sync),
    ) -> Result<ConversionResult, ConverterError> {
        if !tokio::fs::try_exists(&request.input).await.unwrap_or(false) {
            return Err(ConverterError::InputNotFound {
                path: request.input.clone(),
            });
        }

        tokio::fs::create_dir_all(&request.output_dir)
            .await
            .map_err(|e| {
                warn!(
                    "Failed to create output directory {}: {}",
                    request.output_dir.display(),
                    e
                );
                ConverterError::OutputDirectoryFailed {
                    path: request.output_dir.clone(),
                }
            })?;

        let settings = request.settings.clamped();
        let plan = self.plan(request);
        check_cancel(cancel)?;
        on_progress(0.0);

        if request.kind == AssetKind::Vector && plan.format.is_vector() {
            tokio::fs::copy(&request.input, &plan.primary).await?;
            info!(
                "Copied vector asset {} to {}",
                request.input.display(),
                plan.primary.display()
            );
            on_progress(1.0);
            return Ok(ConversionResult {
                output_path: plan.primary.clone(),
                extra_artifacts: Vec::new(),
                preview: Some(plan.primary),
            });
        }

        self.run_primary(request, &settings, &plan, cancel, on_progress)
            .await?;

        let mut extra_artifacts = Vec::new();
        let mut spritesheet = None;
        if request.kind == AssetKind::Video {
            if settings.spritesheet {
                check_cancel(cancel)?;
                self.run_spritesheet(request, &settings, &plan, cancel)
                    .await?;
                extra_artifacts.push(plan.spritesheet.clone());
                spritesheet = Some(plan.spritesheet.clone());
            }
            if settings.alpha_mask {
                check_cancel(cancel)?;
                self.run_alpha_mask(&plan, cancel).await?;
                extra_artifacts.push(plan.alpha_mask.clone());
            }
        }

        let preview = spritesheet.or_else(|| {
            matches!(plan.format, OutputFormat::Png | OutputFormat::Gif | OutputFormat::Webp)
                .then(|| plan.primary.clone())
        });

        info!(
            "Converted {} to {} ({} extra artifacts)",
            request.input.display(),
            plan.primary.display(),
            extra_artifacts.len()
        );
        on_progress(1.0);

        Ok(ConversionResult {
            output_path: plan.primary,
            extra_artifacts,
            preview,
        })
    }

    async fn run_primary(
        &self,
        request: &ConversionRequest,
        settings: &ConversionSettings,
        plan: &OutputPlan,
        cancel: &CancellationToken,
        on_progress: &(dyn Fn(f32) + Send + Sync),
    ) -> Result<(), ConverterError> {
        let graph = build_filter_graph(request.kind, settings);

        let mut args = vec![
            "-i".to_string(),
            request.input.to_string_lossy().into_owned(),
            "-filter_complex".to_string(),
            graph.to_filter_complex(),
            "-an".to_string(),
        ];
        args.extend(plan.format.encoder_args(request.kind));

        let invocation = ToolInvocation {
            step: InvocationStep::Primary,
            args,
            output: plan.primary.clone(),
        };

        if request.kind != AssetKind::Video {
            return self.runner.run(&invocation, cancel, &|_| {}).await;
        }

        let duration = match self.runner.probe_duration(&request.input).await {
            Ok(duration) => Some(duration),
            Err(e) => {
                warn!(
                    "Duration probe failed for {}, progress unavailable: {}",
                    request.input.display(),
                    e
                );
                None
            }
        };
        check_cancel(cancel)?;

        let progress = VideoProgress::new(duration, on_progress);
        self.runner
            .run(&invocation, cancel, &|t| progress.observe(t))
            .await
    }

    async fn run_spritesheet(
        &self,
        request: &ConversionRequest,
        settings: &ConversionSettings,
        plan: &OutputPlan,
        cancel: &CancellationToken,
    ) -> Result<(), ConverterError> {
        let invocation = ToolInvocation {
            step: InvocationStep::Spritesheet,
            args: vec![
                "-i".to_string(),
                plan.primary.to_string_lossy().into_owned(),
                "-vf".to_string(),
                format!(
                    "fps={},tile={}x{}",
                    settings.frame_rate, SPRITESHEET_COLUMNS, SPRITESHEET_ROWS
                ),
                "-frames:v".to_string(),
                "1".to_string(),
                "-c:v".to_string(),
                "png".to_string(),
            ],
            output: plan.spritesheet.clone(),
        };
        self.runner.run(&invocation, cancel, &|_| {}).await?;

        let metadata = SpritesheetMetadata {
            generated_at: Utc::now(),
            columns: SPRITESHEET_COLUMNS,
            rows: SPRITESHEET_ROWS,
            frame_rate: settings.frame_rate,
            source: request.input.clone(),
        };
        let json = serde_json::to_vec_pretty(&metadata)
            .map_err(|e| ConverterError::Io(std::io::Error::other(e)))?;
        tokio::fs::write(&plan.spritesheet_metadata, json).await?;
        debug!(
            "Wrote spritesheet metadata to {}",
            plan.spritesheet_metadata.display()
        );
        Ok(())
    }

    async fn run_alpha_mask(
        &self,
        plan: &OutputPlan,
        cancel: &CancellationToken,
    ) -> Result<(), ConverterError> {
        let mut args = vec![
            "-i".to_string(),
            plan.primary.to_string_lossy().into_owned(),
            "-vf".to_string(),
            "format=rgba,alphaextract".to_string(),
        ];
        args.extend(plan.format.encoder_args(AssetKind::Video));

        let invocation = ToolInvocation {
            step: InvocationStep::AlphaMask,
            args,
            output: plan.alpha_mask.clone(),
        };
        self.runner.run(&invocation, cancel, &|_| {}).await
    }
}

fn check_cancel(cancel: &CancellationToken) -> Result<(), ConverterError> {
    if cancel.is_cancelled() {
        Err(ConverterError::Canceled)
    } else {
        Ok(())
    }
}

impl From<ConverterError> for JobFailure {
    fn from(err: ConverterError) -> Self {
        if err.is_cancellation() {
            JobFailure::Canceled
        } else {
            JobFailure::Failed(err.to_string())
        }
    }
}

#[async_trait]
impl<R: ToolRunner + 'static> JobWorker for ConversionPipeline<R> {
    type Payload = ConversionRequest;
    type Output = ConversionResult;

    async fn run(
        &self,
        job_id: &str,
        payload: ConversionRequest,
        cancel: CancellationToken,
        progress: ProgressReporter,
    ) -> Result<ConversionResult, JobFailure> {
        debug!("Job {} converting {}", job_id, payload.input.display());
        let result = self
            .convert(&payload, &cancel, &|value| progress.report(value))
            .await;
        if let Err(e) = &result {
            if !e.is_cancellation() {
                warn!("Job {} failed: {}", job_id, e);
            }
        }
        result.map_err(JobFailure::from)
    }
}
