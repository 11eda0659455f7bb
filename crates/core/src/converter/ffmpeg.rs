//! FFmpeg-based tool runner.

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde::Deserialize;
use std::collections::VecDeque;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::config::ConverterConfig;
use super::error::ConverterError;
use super::traits::{ToolInvocation, ToolRunner};
use crate::metrics;

/// Non-empty diagnostic lines kept for failure messages.
const DIAGNOSTIC_TAIL_LINES: usize = 10;

/// `-progress` emits one `key=value` record per line.
static PROGRESS_RECORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([a-z0-9_]+)=(\S*)$").unwrap());

/// Ring buffer holding the last non-empty diagnostic lines.
#[derive(Debug, Default)]
struct DiagnosticTail {
    lines: VecDeque<String>,
}

impl DiagnosticTail {
    fn push(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        if self.lines.len() == DIAGNOSTIC_TAIL_LINES {
            self.lines.pop_front();
        }
        self.lines.push_back(line.to_string());
    }

    fn render(&self) -> String {
        self.lines.iter().cloned().collect::<Vec<_>>().join("\n")
    }
}

/// Parses one stderr line.
///
/// Returns `Some(None)` for progress records without timing, `Some(Some(t))`
/// for `out_time_ms` records and `None` for diagnostic text.
fn parse_progress_line(line: &str) -> Option<Option<Duration>> {
    let caps = PROGRESS_RECORD.captures(line.trim())?;
    if &caps[1] != "out_time_ms" {
        return Some(None);
    }
    // Despite the name, ffmpeg reports microseconds here.
    Some(caps[2].parse::<u64>().ok().map(Duration::from_micros))
}

/// Outcome of one wait inside the supervision loop.
enum Step {
    Canceled,
    TimedOut,
    Line(std::io::Result<Option<String>>),
    Exited(std::io::Result<ExitStatus>),
}

/// Sends SIGTERM so ffmpeg can finalize and exit on its own.
#[cfg(unix)]
fn request_stop(child: &Child) -> bool {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    match child.id() {
        Some(pid) => kill(Pid::from_raw(pid as i32), Signal::SIGTERM).is_ok(),
        None => false,
    }
}

#[cfg(not(unix))]
fn request_stop(_child: &Child) -> bool {
    false
}

/// FFmpeg-based tool runner.
#[derive(Debug, Clone)]
pub struct FfmpegRunner {
    config: ConverterConfig,
}

impl FfmpegRunner {
    /// Creates a new FFmpeg runner with the given configuration.
    pub fn new(config: ConverterConfig) -> Self {
        Self { config }
    }

    /// Creates a runner with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(ConverterConfig::default())
    }

    /// Returns the runner configuration.
    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    /// Full argument vector: global flags, the invocation's own arguments,
    /// then the output path.
    fn command_args(&self, invocation: &ToolInvocation) -> Vec<String> {
        let mut args: Vec<String> = [
            "-hide_banner",
            "-nostdin",
            "-y",
            "-loglevel",
            self.config.log_level.as_str(),
            "-progress",
            "pipe:2",
            "-nostats",
        ]
        .iter()
        .map(|a| a.to_string())
        .collect();
        args.extend(invocation.args.iter().cloned());
        args.push(invocation.output.to_string_lossy().into_owned());
        args
    }

    /// Asks the process to stop, escalating to a kill after the grace period.
    async fn terminate(&self, child: &mut Child) {
        if request_stop(child) {
            let grace = Duration::from_millis(self.config.kill_grace_ms);
            if let Ok(Ok(_)) = tokio::time::timeout(grace, child.wait()).await {
                return;
            }
            debug!("ffmpeg ignored SIGTERM, killing");
        }

        if let Err(e) = child.kill().await {
            warn!("Failed to kill ffmpeg: {}", e);
        }
    }

    /// Parses ffprobe JSON output into a duration in seconds.
    fn parse_probe_output(output: &str) -> Result<f64, ConverterError> {
        #[derive(Deserialize)]
        struct ProbeOutput {
            format: ProbeFormat,
        }

        #[derive(Deserialize)]
        struct ProbeFormat {
            duration: Option<String>,
        }

        let probe: ProbeOutput = serde_json::from_str(output).map_err(|e| {
            ConverterError::probe_failed(format!("Failed to parse ffprobe output: {}", e))
        })?;

        probe
            .format
            .duration
            .as_deref()
            .and_then(|d| d.parse::<f64>().ok())
            .filter(|d| d.is_finite() && *d > 0.0)
            .ok_or_else(|| ConverterError::probe_failed("ffprobe reported no duration"))
    }
}

#[async_trait]
impl ToolRunner for FfmpegRunner {
    fn name(&self) -> &str {
        "ffmpeg"
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
        if self.config.ffmpeg_path.as_os_str().is_empty() {
            return Err(ConverterError::configuration_invalid("ffmpeg path is empty"));
        }

        let args = self.command_args(invocation);
        debug!(step = %invocation.step, ?args, "Running ffmpeg");

        let mut child = Command::new(&self.config.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| ConverterError::ToolSpawnFailed {
                tool: self.config.ffmpeg_path.clone(),
                source,
            })?;

        let stderr = child.stderr.take().ok_or_else(|| {
            ConverterError::Io(std::io::Error::other("ffmpeg stderr was not captured"))
        })?;
        let mut reader = BufReader::new(stderr).lines();
        let mut tail = DiagnosticTail::default();
        let mut stderr_open = true;

        let deadline = tokio::time::sleep(Duration::from_secs(self.config.timeout_secs));
        tokio::pin!(deadline);

        let status = loop {
            let step = tokio::select! {
                biased;
                _ = cancel.cancelled() => Step::Canceled,
                _ = &mut deadline => Step::TimedOut,
                line = reader.next_line(), if stderr_open => Step::Line(line),
                status = child.wait(), if !stderr_open => Step::Exited(status),
            };

            match step {
                Step::Canceled => {
                    debug!(step = %invocation.step, "Canceling ffmpeg");
                    self.terminate(&mut child).await;
                    return Err(ConverterError::Canceled);
                }
                Step::TimedOut => {
                    self.terminate(&mut child).await;
                    return Err(ConverterError::Timeout {
                        timeout_secs: self.config.timeout_secs,
                    });
                }
                Step::Line(Ok(Some(line))) => match parse_progress_line(&line) {
                    Some(Some(out_time)) => on_progress(out_time),
                    Some(None) => {}
                    None => tail.push(&line),
                },
                Step::Line(Ok(None)) => stderr_open = false,
                Step::Line(Err(e)) => {
                    warn!("Failed to read ffmpeg output: {}", e);
                    stderr_open = false;
                }
                Step::Exited(status) => break status?,
            }
        };

        metrics::TOOL_INVOCATIONS
            .with_label_values(&[
                invocation.step.as_str(),
                if status.success() { "success" } else { "failed" },
            ])
            .inc();

        if !status.success() {
            return Err(ConverterError::ToolExitedNonZero {
                code: status.code(),
                diagnostics: tail.render(),
            });
        }

        Ok(())
    }

    async fn probe_duration(&self, path: &Path) -> Result<f64, ConverterError> {
        if !path.exists() {
            return Err(ConverterError::InputNotFound {
                path: path.to_path_buf(),
            });
        }

        let output = Command::new(&self.config.ffprobe_path)
            .args(["-v", "quiet", "-print_format", "json", "-show_format"])
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| ConverterError::ToolSpawnFailed {
                tool: self.config.ffprobe_path.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(ConverterError::probe_failed(format!(
                "ffprobe failed: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        Self::parse_probe_output(&String::from_utf8_lossy(&output.stdout))
    }
}
