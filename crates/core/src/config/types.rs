use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::converter::{ConversionSettings, ConverterConfig, DEFAULT_OUTPUT_SUFFIX};
use crate::scheduler::SchedulerConfig;

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub tool: ConverterConfig,
    #[serde(default)]
    pub output: OutputConfig,
    /// Conversion settings applied to every job unless overridden.
    #[serde(default)]
    pub defaults: ConversionSettings,
}

/// Where converted files are written
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct OutputConfig {
    /// Destination directory; when unset, outputs go next to each source file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
    /// Appended to the source stem of every produced file.
    #[serde(default = "default_suffix")]
    pub suffix: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: None,
            suffix: default_suffix(),
        }
    }
}

fn default_suffix() -> String {
    DEFAULT_OUTPUT_SUFFIX.to_string()
}

impl OutputConfig {
    /// Directory receiving the outputs of `input`.
    pub fn dir_for(&self, input: &Path) -> PathBuf {
        match &self.dir {
            Some(dir) => dir.clone(),
            None => input
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        }
    }
}
