//! Types for the converter module.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Extensions recognized as raster images.
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "gif", "webp", "tif", "tiff"];

/// Extensions recognized as videos.
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "webm", "mkv", "avi", "m4v"];

/// Extensions recognized as vector graphics.
pub const VECTOR_EXTENSIONS: &[&str] = &["svg"];

/// Kind of source asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetKind {
    /// Still raster image
    Image,
    /// Vector graphic (SVG)
    Vector,
    /// Video clip
    Video,
}

impl AssetKind {
    /// Classifies a path by its extension, case-insensitively.
    ///
    /// Returns `None` for anything outside the supported allowlist.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            Some(Self::Image)
        } else if VIDEO_EXTENSIONS.contains(&ext.as_str()) {
            Some(Self::Video)
        } else if VECTOR_EXTENSIONS.contains(&ext.as_str()) {
            Some(Self::Vector)
        } else {
            None
        }
    }

    /// Output format used when none (or an incompatible one) is configured.
    pub fn default_format(&self) -> OutputFormat {
        match self {
            Self::Image => OutputFormat::Png,
            Self::Vector => OutputFormat::Svg,
            Self::Video => OutputFormat::Gif,
        }
    }

    /// Whether `format` can be produced from this kind of asset.
    pub fn supports(&self, format: OutputFormat) -> bool {
        use OutputFormat::*;
        match self {
            Self::Image => matches!(format, Png | Webp | Gif),
            Self::Vector => matches!(format, Svg | Png | Webp),
            Self::Video => matches!(format, Gif | Mp4 | Webm | Webp),
        }
    }

    /// Resolves the output format for this kind, honoring a compatible explicit choice.
    pub fn resolve_format(&self, requested: Option<OutputFormat>) -> OutputFormat {
        match requested {
            Some(format) if self.supports(format) => format,
            _ => self.default_format(),
        }
    }
}

/// Dithering applied when remapping onto a reduced palette.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DitherMode {
    /// Nearest palette entry, no dithering
    #[default]
    None,
    /// Ordered (Bayer matrix) dithering
    Ordered,
    /// Error diffusion (Floyd-Steinberg)
    ErrorDiffusion,
}

impl DitherMode {
    /// Returns the ffmpeg `paletteuse` dither name.
    pub fn ffmpeg_name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Ordered => "bayer",
            Self::ErrorDiffusion => "floyd_steinberg",
        }
    }
}

/// Output container / image format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    Png,
    Webp,
    Gif,
    Mp4,
    Webm,
    Svg,
}

impl OutputFormat {
    /// Returns the file extension for this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Webp => "webp",
            Self::Gif => "gif",
            Self::Mp4 => "mp4",
            Self::Webm => "webm",
            Self::Svg => "svg",
        }
    }

    /// Whether this is a vector format (no pixel grid).
    pub fn is_vector(&self) -> bool {
        matches!(self, Self::Svg)
    }

    /// Encoder arguments placed before the output path.
    pub fn encoder_args(&self, kind: AssetKind) -> Vec<String> {
        let args: &[&str] = match (self, kind) {
            (Self::Png, _) => &["-frames:v", "1", "-c:v", "png"],
            (Self::Webp, AssetKind::Video) => &["-c:v", "libwebp", "-lossless", "1", "-loop", "0"],
            (Self::Webp, _) => &["-frames:v", "1", "-c:v", "libwebp", "-lossless", "1"],
            (Self::Gif, AssetKind::Video) => &["-loop", "0"],
            (Self::Gif, _) => &["-frames:v", "1"],
            (Self::Mp4, _) => &["-c:v", "libx264", "-pix_fmt", "yuv420p", "-movflags", "+faststart"],
            (Self::Webm, _) => &["-c:v", "libvpx-vp9", "-pix_fmt", "yuva420p", "-b:v", "0", "-crf", "30"],
            (Self::Svg, _) => &[],
        };
        args.iter().map(|a| a.to_string()).collect()
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "webp" => Ok(Self::Webp),
            "gif" => Ok(Self::Gif),
            "mp4" => Ok(Self::Mp4),
            "webm" => Ok(Self::Webm),
            "svg" => Ok(Self::Svg),
            other => Err(format!("unknown output format: {}", other)),
        }
    }
}

/// Upper bound for the pixel block size.
pub const MAX_GRID_SIZE: u32 = 512;
/// Upper bound for the upscale factor.
pub const MAX_UPSCALE: u32 = 16;
/// Palette size meaning "no reduction".
pub const MAX_PALETTE_SIZE: u16 = 256;
/// Smallest palette that can be requested.
pub const MIN_PALETTE_SIZE: u16 = 2;
/// Upper bound for the video frame rate.
pub const MAX_FRAME_RATE: u32 = 120;

/// Declarative description of how one asset is pixelated.
///
/// This is a plain value. Per-job changes go through [`ConversionOverrides::apply`],
/// which copies the base rather than mutating it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionSettings {
    /// Pixel block size (width and height are divided by this).
    pub grid_size: u32,
    /// Maximum number of palette colors, 256 disables reduction.
    pub palette_size: u16,
    /// Dithering used by the palette stage.
    pub dither: DitherMode,
    /// Crop to even dimensions.
    pub trim: bool,
    /// Alpha below this snaps to transparent, 0 disables the stage.
    pub alpha_threshold: u8,
    /// Darken block edges.
    pub outline: bool,
    /// Integer nearest-neighbor enlargement after downscaling.
    pub upscale: u32,
    /// Output frame rate for videos.
    pub frame_rate: u32,
    /// Explicit output format, ignored when incompatible with the asset kind.
    pub output_format: Option<OutputFormat>,
    /// Video only: export a thumbnail grid.
    pub spritesheet: bool,
    /// Video only: export an alpha-channel-only derivative.
    pub alpha_mask: bool,
}

impl Default for ConversionSettings {
    fn default() -> Self {
        Self {
            grid_size: 8,
            palette_size: 32,
            dither: DitherMode::None,
            trim: false,
            alpha_threshold: 0,
            outline: false,
            upscale: 1,
            frame_rate: 12,
            output_format: None,
            spritesheet: false,
            alpha_mask: false,
        }
    }
}

impl ConversionSettings {
    /// Returns a copy with every numeric knob clamped into its supported range.
    pub fn clamped(&self) -> Self {
        Self {
            grid_size: self.grid_size.clamp(1, MAX_GRID_SIZE),
            palette_size: self.palette_size.clamp(MIN_PALETTE_SIZE, MAX_PALETTE_SIZE),
            upscale: self.upscale.clamp(1, MAX_UPSCALE),
            frame_rate: self.frame_rate.clamp(1, MAX_FRAME_RATE),
            ..*self
        }
    }
}

/// Optional per-job changes on top of a base [`ConversionSettings`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionOverrides {
    pub grid_size: Option<u32>,
    pub palette_size: Option<u16>,
    pub dither: Option<DitherMode>,
    pub trim: Option<bool>,
    pub alpha_threshold: Option<u8>,
    pub outline: Option<bool>,
    pub upscale: Option<u32>,
    pub frame_rate: Option<u32>,
    pub output_format: Option<OutputFormat>,
    pub spritesheet: Option<bool>,
    pub alpha_mask: Option<bool>,
}

impl ConversionOverrides {
    /// Copies `base` and replaces every field that is set here.
    pub fn apply(&self, base: &ConversionSettings) -> ConversionSettings {
        let mut settings = *base;
        if let Some(v) = self.grid_size {
            settings.grid_size = v;
        }
        if let Some(v) = self.palette_size {
            settings.palette_size = v;
        }
        if let Some(v) = self.dither {
            settings.dither = v;
        }
        if let Some(v) = self.trim {
            settings.trim = v;
        }
        if let Some(v) = self.alpha_threshold {
            settings.alpha_threshold = v;
        }
        if let Some(v) = self.outline {
            settings.outline = v;
        }
        if let Some(v) = self.upscale {
            settings.upscale = v;
        }
        if let Some(v) = self.frame_rate {
            settings.frame_rate = v;
        }
        if self.output_format.is_some() {
            settings.output_format = self.output_format;
        }
        if let Some(v) = self.spritesheet {
            settings.spritesheet = v;
        }
        if let Some(v) = self.alpha_mask {
            settings.alpha_mask = v;
        }
        settings
    }
}

/// Input to one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionRequest {
    /// Source asset.
    pub input: PathBuf,
    /// Kind of the source asset.
    pub kind: AssetKind,
    /// Settings for this job (already resolved from base + overrides).
    pub settings: ConversionSettings,
    /// Directory receiving every produced file.
    pub output_dir: PathBuf,
}

/// Result of a successful conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionResult {
    /// Primary converted artifact.
    pub output_path: PathBuf,
    /// Derived outputs (spritesheet, alpha mask), in production order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_artifacts: Vec<PathBuf>,
    /// File suitable for a still preview, when there is one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview: Option<PathBuf>,
}

/// Sidecar written next to a spritesheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpritesheetMetadata {
    /// When the sheet was produced.
    pub generated_at: DateTime<Utc>,
    /// Tiles per row.
    pub columns: u32,
    /// Tiles per column.
    pub rows: u32,
    /// Frame rate the tiles were sampled at.
    pub frame_rate: u32,
    /// File the tiles were sampled from.
    pub source: PathBuf,
}
