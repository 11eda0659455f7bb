//! Scheduler module for running jobs with bounded concurrency.
//!
//! This module provides the `JobScheduler` which coordinates:
//! - Admission: FIFO start of pending jobs up to a concurrency limit
//! - Cancellation: per job or in bulk, pending or running
//! - Events: ordered lifecycle and progress notifications
//!
//! Running jobs are Tokio tasks, each with its own child cancellation token.
//!
//! # Example
//!
//! ```ignore
//! use pixelbatch_core::converter::{ConversionPipeline, FfmpegRunner};
//! use pixelbatch_core::scheduler::{Job, JobEvent, JobScheduler};
//!
//! let pipeline = ConversionPipeline::new(FfmpegRunner::with_defaults());
//! let scheduler = JobScheduler::new(pipeline, 4);
//! let mut events = scheduler.events();
//!
//! scheduler.enqueue(vec![Job::new("hero", request)]);
//!
//! while let Some(event) = events.recv().await {
//!     if matches!(event, JobEvent::Idle) {
//!         break;
//!     }
//!     println!("{:?}", event);
//! }
//! ```

mod config;
mod events;
mod queue;
mod types;
mod worker;

pub use config::SchedulerConfig;
pub use events::{EventListener, Subscription};
pub use queue::JobScheduler;
pub use types::{Job, JobEvent, JobFailure, JobPhase, QueueSnapshot};
pub use worker::{JobWorker, ProgressReporter};
