//! Types for the scheduler module.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A unit of scheduled work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job<P> {
    /// Caller-supplied identifier, unique among queued and running jobs.
    pub id: String,
    /// Input handed to the worker.
    pub payload: P,
}

impl<P> Job<P> {
    pub fn new(id: impl Into<String>, payload: P) -> Self {
        Self {
            id: id.into(),
            payload,
        }
    }
}

/// Lifecycle phase of a job.
///
/// Transitions only move forward: `Queued -> Running -> {Completed | Failed | Canceled}`,
/// or `Queued -> Canceled` for a job canceled before admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobPhase {
    Queued,
    Running,
    Completed,
    Failed,
    Canceled,
}

impl JobPhase {
    /// Whether the job has settled.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Canceled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        }
    }
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event emitted by the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent<T> {
    /// Job accepted into the pending queue.
    Queued { job_id: String },
    /// Job admitted and handed to the worker.
    Started { job_id: String },
    /// Fractional progress in `[0, 1]`, non-decreasing per job.
    Progress { job_id: String, value: f32 },
    /// Worker returned a result.
    Completed { job_id: String, result: T },
    /// Worker failed.
    Failed { job_id: String, error: String },
    /// Job was canceled before or while running.
    Canceled { job_id: String },
    /// Nothing is pending or running.
    Idle,
}

impl<T> JobEvent<T> {
    /// Job the event belongs to, `None` for [`JobEvent::Idle`].
    pub fn job_id(&self) -> Option<&str> {
        match self {
            Self::Queued { job_id }
            | Self::Started { job_id }
            | Self::Progress { job_id, .. }
            | Self::Completed { job_id, .. }
            | Self::Failed { job_id, .. }
            | Self::Canceled { job_id } => Some(job_id),
            Self::Idle => None,
        }
    }

    /// Phase the job is in after this event, if the event changes it.
    pub fn phase(&self) -> Option<JobPhase> {
        match self {
            Self::Queued { .. } => Some(JobPhase::Queued),
            Self::Started { .. } => Some(JobPhase::Running),
            Self::Completed { .. } => Some(JobPhase::Completed),
            Self::Failed { .. } => Some(JobPhase::Failed),
            Self::Canceled { .. } => Some(JobPhase::Canceled),
            Self::Progress { .. } | Self::Idle => None,
        }
    }
}

/// Reason a worker did not produce a result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobFailure {
    /// The worker observed its cancellation token and stopped.
    #[error("canceled")]
    Canceled,
    /// Any other failure.
    #[error("{0}")]
    Failed(String),
}

impl JobFailure {
    /// Creates a failure from anything displayable.
    pub fn failed(reason: impl fmt::Display) -> Self {
        Self::Failed(reason.to_string())
    }
}

/// Point-in-time view of the queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QueueSnapshot {
    /// Pending job ids in admission order.
    pub pending: Vec<String>,
    /// Running job ids in admission order.
    pub running: Vec<String>,
    /// Current concurrency limit.
    pub concurrency: usize,
}

impl QueueSnapshot {
    /// Whether nothing is pending or running.
    pub fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.running.is_empty()
    }
}
