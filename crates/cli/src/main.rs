mod batch;
mod cli;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pixelbatch_core::{
    converter::{EncoderCapabilities, OutputFormat},
    load_config, metrics, validate_config, Config,
};

use batch::run_batch;
use cli::{Cli, Commands, ConvertArgs};

#[tokio::main]
async fn main() {
    match run().await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!("Fatal error: {:#}", e);
            eprintln!("error: {:#}", e);
            std::process::exit(1);
        }
    }
}

async fn run() -> Result<i32> {
    let cli = Cli::parse();

    // Initialize logging
    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Determine config path
    let config_path = cli
        .config
        .clone()
        .or_else(|| std::env::var("PIXELBATCH_CONFIG").ok().map(PathBuf::from));

    // Load configuration
    match &config_path {
        Some(path) => info!("Loading configuration from {:?}", path),
        None => info!("No configuration file given, using defaults"),
    }
    let config = load_config(config_path.as_deref())
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    match cli.command {
        Commands::Convert(args) => convert(config, args).await,
        Commands::CheckTools => check_tools(&config).await,
    }
}

async fn convert(mut config: Config, args: ConvertArgs) -> Result<i32> {
    if let Some(concurrency) = args.concurrency {
        config.scheduler.concurrency = concurrency;
    }
    if let Some(dir) = &args.output_dir {
        config.output.dir = Some(dir.clone());
    }

    // Validate configuration
    validate_config(&config).context("Configuration validation failed")?;

    let settings = args.overrides().apply(&config.defaults);
    info!("Conversion settings: {:?}", settings);

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, canceling remaining conversions");
                shutdown.cancel();
            }
        });
    }

    let summary = run_batch(&config, settings, &args.paths, shutdown).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary.to_json())?);
    } else {
        for (job, error) in &summary.failures {
            eprintln!("failed: {}: {}", job, error);
        }
        println!(
            "done: {}, failed: {}, canceled: {}",
            summary.completed, summary.failed, summary.canceled
        );
    }

    if args.metrics {
        print!("{}", metrics::gather_text());
    }

    Ok(summary.exit_code())
}

async fn check_tools(config: &Config) -> Result<i32> {
    info!("Probing {:?}", config.tool.ffmpeg_path);
    let capabilities = EncoderCapabilities::detect(&config.tool).await;

    let formats = [
        OutputFormat::Png,
        OutputFormat::Webp,
        OutputFormat::Gif,
        OutputFormat::Mp4,
        OutputFormat::Webm,
    ];
    for format in formats {
        let status = if capabilities.supports(format) {
            "ok"
        } else {
            "missing"
        };
        println!("{:<6} {}", format.extension(), status);
    }
    println!(
        "{:<6} {}",
        "palette",
        if capabilities.palette_filters { "ok" } else { "missing" }
    );

    let usable = capabilities.png && capabilities.palette_filters;
    Ok(if usable { 0 } else { 1 })
}
