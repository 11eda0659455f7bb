//! Core library for pixelbatch: pixelates images, vector graphics and video
//! clips in batches by driving FFmpeg from a bounded-concurrency job scheduler.

pub mod config;
pub mod converter;
pub mod discovery;
pub mod metrics;
pub mod scheduler;
pub mod testing;

pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, OutputConfig,
};
pub use converter::{
    build_filter_graph, AssetKind, ConversionOverrides, ConversionPipeline, ConversionRequest,
    ConversionResult, ConversionSettings, ConverterConfig, ConverterError, FfmpegRunner,
    OutputFormat,
};
pub use discovery::{discover_assets, DiscoveredAsset};
pub use scheduler::{
    Job, JobEvent, JobFailure, JobScheduler, JobWorker, ProgressReporter, QueueSnapshot,
    SchedulerConfig, Subscription,
};
