//! Encoder and filter availability detection.

use serde::{Deserialize, Serialize};
use std::process::Stdio;
use tokio::process::Command;

use super::config::ConverterConfig;
use super::types::OutputFormat;

/// Encoders and filters the pipeline relies on, as reported by ffmpeg.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncoderCapabilities {
    /// PNG encoder
    pub png: bool,
    /// GIF encoder
    pub gif: bool,
    /// libwebp encoder
    pub libwebp: bool,
    /// libx264 encoder (mp4)
    pub libx264: bool,
    /// libvpx VP9 encoder (webm)
    pub libvpx_vp9: bool,
    /// palettegen / paletteuse filters
    pub palette_filters: bool,
}

impl EncoderCapabilities {
    /// Detects capabilities by probing ffmpeg.
    ///
    /// Anything that cannot be probed is reported as unavailable.
    pub async fn detect(config: &ConverterConfig) -> Self {
        let encoders = list(config, "-encoders").await;
        let filters = list(config, "-filters").await;
        Self::from_listings(&encoders, &filters)
    }

    /// Builds capabilities from `ffmpeg -encoders` and `ffmpeg -filters` output.
    pub fn from_listings(encoders: &str, filters: &str) -> Self {
        let has_encoder = |name: &str| {
            encoders
                .lines()
                .any(|line| line.split_whitespace().nth(1) == Some(name))
        };
        let has_filter = |name: &str| {
            filters
                .lines()
                .any(|line| line.split_whitespace().nth(1) == Some(name))
        };

        Self {
            png: has_encoder("png"),
            gif: has_encoder("gif"),
            libwebp: has_encoder("libwebp"),
            libx264: has_encoder("libx264"),
            libvpx_vp9: has_encoder("libvpx-vp9"),
            palette_filters: has_filter("palettegen") && has_filter("paletteuse"),
        }
    }

    /// Whether ffmpeg can write `format`.
    pub fn supports(&self, format: OutputFormat) -> bool {
        match format {
            OutputFormat::Png => self.png,
            OutputFormat::Gif => self.gif,
            OutputFormat::Webp => self.libwebp,
            OutputFormat::Mp4 => self.libx264,
            OutputFormat::Webm => self.libvpx_vp9,
            // Copied, never encoded.
            OutputFormat::Svg => true,
        }
    }
}

async fn list(config: &ConverterConfig, flag: &str) -> String {
    let output = Command::new(&config.ffmpeg_path)
        .args(["-hide_banner", flag])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .await;

    match output {
        Ok(o) if o.status.success() => String::from_utf8_lossy(&o.stdout).to_string(),
        _ => String::new(),
    }
}
