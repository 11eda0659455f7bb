use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use pixelbatch_core::converter::{ConversionOverrides, DitherMode, OutputFormat};

#[derive(Parser)]
#[command(name = "pixelbatch")]
#[command(author, version, about = "Batch pixel-art converter for images, SVGs and video clips")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Convert files and directories
    Convert(ConvertArgs),

    /// Check which encoders and filters the configured ffmpeg provides
    CheckTools,
}

#[derive(Args)]
pub struct ConvertArgs {
    /// Files or directories to convert (directories are scanned recursively)
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// Output directory (defaults to next to each source file)
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Maximum number of conversions running at once
    #[arg(short = 'j', long)]
    pub concurrency: Option<usize>,

    /// Pixel block size
    #[arg(long)]
    pub grid: Option<u32>,

    /// Maximum palette colors (256 disables reduction)
    #[arg(long)]
    pub palette: Option<u16>,

    /// Dithering used when reducing the palette
    #[arg(long, value_enum)]
    pub dither: Option<DitherArg>,

    /// Crop to even dimensions
    #[arg(long)]
    pub trim: bool,

    /// Alpha below this becomes transparent (0 disables)
    #[arg(long)]
    pub alpha_threshold: Option<u8>,

    /// Darken the edges between blocks
    #[arg(long)]
    pub outline: bool,

    /// Nearest-neighbor enlargement after pixelation
    #[arg(long)]
    pub upscale: Option<u32>,

    /// Output frame rate for videos
    #[arg(long)]
    pub fps: Option<u32>,

    /// Output format (png, webp, gif, mp4, webm, svg)
    #[arg(short, long)]
    pub format: Option<OutputFormat>,

    /// Export a spritesheet for videos
    #[arg(long)]
    pub spritesheet: bool,

    /// Export an alpha mask for videos
    #[arg(long)]
    pub alpha_mask: bool,

    /// Print the summary as JSON
    #[arg(long)]
    pub json: bool,

    /// Print Prometheus metrics after the batch
    #[arg(long)]
    pub metrics: bool,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum DitherArg {
    None,
    Ordered,
    ErrorDiffusion,
}

impl From<DitherArg> for DitherMode {
    fn from(arg: DitherArg) -> Self {
        match arg {
            DitherArg::None => DitherMode::None,
            DitherArg::Ordered => DitherMode::Ordered,
            DitherArg::ErrorDiffusion => DitherMode::ErrorDiffusion,
        }
    }
}

impl ConvertArgs {
    /// Settings given on the command line; flags only ever switch features on.
    pub fn overrides(&self) -> ConversionOverrides {
        ConversionOverrides {
            grid_size: self.grid,
            palette_size: self.palette,
            dither: self.dither.map(Into::into),
            trim: self.trim.then_some(true),
            alpha_threshold: self.alpha_threshold,
            outline: self.outline.then_some(true),
            upscale: self.upscale,
            frame_rate: self.fps,
            output_format: self.format,
            spritesheet: self.spritesheet.then_some(true),
            alpha_mask: self.alpha_mask.then_some(true),
        }
    }
}
