//! Converter module for pixelating media assets.
//!
//! This module turns one source asset into its pixelated outputs by driving
//! an external media tool (FFmpeg).
//!
//! # Features
//!
//! - Structured filter graph: downscale, upscale, alpha threshold, outline,
//!   even crop/pad, frame rate, palette reduction with dithering
//! - Raster images, vector passthrough and video clips
//! - Video derivatives: spritesheet (with JSON sidecar) and alpha mask
//! - Progress estimation from `out_time_ms` against the probed duration
//! - Cooperative cancellation (SIGTERM, then kill after a grace period)
//!
//! # Example
//!
//! ```ignore
//! use pixelbatch_core::converter::{
//!     AssetKind, ConversionPipeline, ConversionRequest, ConversionSettings, FfmpegRunner,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! let pipeline = ConversionPipeline::new(FfmpegRunner::with_defaults());
//!
//! let request = ConversionRequest {
//!     input: PathBuf::from("/assets/hero.png"),
//!     kind: AssetKind::Image,
//!     settings: ConversionSettings { grid_size: 16, ..Default::default() },
//!     output_dir: PathBuf::from("/assets/out"),
//! };
//!
//! let result = pipeline
//!     .convert(&request, &CancellationToken::new(), &|p| println!("{:.0}%", p * 100.0))
//!     .await?;
//! println!("Wrote {}", result.output_path.display());
//! ```

mod capabilities;
mod config;
mod error;
mod ffmpeg;
mod filter_graph;
mod pipeline;
mod traits;
mod types;

pub use capabilities::EncoderCapabilities;
pub use config::ConverterConfig;
pub use error::ConverterError;
pub use ffmpeg::FfmpegRunner;
pub use filter_graph::{build_filter_graph, FilterGraph, FilterStage};
pub use pipeline::{
    ConversionPipeline, OutputPlan, DEFAULT_OUTPUT_SUFFIX, SPRITESHEET_COLUMNS, SPRITESHEET_ROWS,
};
pub use traits::{InvocationStep, ToolInvocation, ToolRunner};
pub use types::{
    AssetKind, ConversionOverrides, ConversionRequest, ConversionResult, ConversionSettings,
    DitherMode, OutputFormat, SpritesheetMetadata, IMAGE_EXTENSIONS, MAX_FRAME_RATE,
    MAX_GRID_SIZE, MAX_PALETTE_SIZE, MAX_UPSCALE, MIN_PALETTE_SIZE, VECTOR_EXTENSIONS,
    VIDEO_EXTENSIONS,
};
