//! Trait definitions for the converter module.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::error::ConverterError;

/// Which pipeline step an invocation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvocationStep {
    /// The pixelated primary output.
    Primary,
    /// Thumbnail grid derived from the primary output.
    Spritesheet,
    /// Alpha-only derivative of the primary output.
    AlphaMask,
}

impl InvocationStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Spritesheet => "spritesheet",
            Self::AlphaMask => "alpha_mask",
        }
    }
}

impl fmt::Display for InvocationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One external tool call: step-specific arguments plus the file it produces.
///
/// Global flags (log level, progress reporting, overwrite) are added by the runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub step: InvocationStep,
    pub args: Vec<String>,
    pub output: PathBuf,
}

/// Runs the external media tool.
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Returns the name of this runner implementation.
    fn name(&self) -> &str;

    /// Runs one invocation to completion.
    ///
    /// `on_progress` receives every `out_time_ms` the tool reports. When `cancel`
    /// fires the process is terminated and [`ConverterError::Canceled`] returned.
    async fn run(
        &self,
        invocation: &ToolInvocation,
        cancel: &CancellationToken,
        on_progress: &(dyn Fn(Duration) + Send + Sync),
    ) -> Result<(), ConverterError>;

    /// Probes the duration of a media file in seconds.
    async fn probe_duration(&self, path: &Path) -> Result<f64, ConverterError>;
}
