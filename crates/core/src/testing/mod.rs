//! Testing utilities and mock implementations.
//!
//! This module provides mock implementations of the tool runner and job worker
//! traits, allowing the pipeline and the scheduler to be exercised without
//! FFmpeg installed.
//!
//! # Example
//!
//! ```rust,ignore
//! use pixelbatch_core::testing::{MockJob, MockToolRunner, MockWorker};
//!
//! let runner = MockToolRunner::new();
//! runner.set_progress_times(vec![Duration::from_secs(1)]).await;
//!
//! let scheduler = JobScheduler::new(MockWorker::new(), 2);
//! scheduler.enqueue(vec![Job::new("a", MockJob::sleeping(Duration::from_millis(10)))]);
//! ```

mod mock_runner;
mod mock_worker;

pub use mock_runner::MockToolRunner;
pub use mock_worker::{MockJob, MockWorker};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::path::{Path, PathBuf};

    use crate::converter::{AssetKind, ConversionRequest, ConversionSettings};

    /// Write a placeholder source asset named `name` into `dir`.
    pub fn source_file(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let _ = std::fs::write(&path, format!("fixture:{}", name));
        path
    }

    /// Build a request for a placeholder asset, classified by its extension.
    pub fn request(dir: &Path, name: &str, settings: ConversionSettings) -> ConversionRequest {
        let input = source_file(dir, name);
        let kind = AssetKind::from_path(&input).unwrap_or(AssetKind::Image);
        ConversionRequest {
            input,
            kind,
            settings,
            output_dir: dir.join("out"),
        }
    }
}
