//! Bounded-concurrency job queue.

use futures::FutureExt;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::{BTreeMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::metrics;

use super::events::{EventBus, Subscription};
use super::types::{Job, JobEvent, JobFailure, QueueSnapshot};
use super::worker::{JobWorker, ProgressReporter};

/// A job that has been admitted.
struct RunningJob {
    id: String,
    token: CancellationToken,
    /// Set when the caller canceled the job; its result is suppressed.
    canceled: bool,
    progress: ProgressReporter,
    started_at: Instant,
}

struct QueueState<P> {
    pending: VecDeque<Job<P>>,
    /// Keyed by admission sequence so running jobs list in admission order.
    running: BTreeMap<u64, RunningJob>,
    next_seq: u64,
    concurrency: usize,
}

/// Everything a freshly admitted job needs to start.
struct Launch<P> {
    seq: u64,
    job: Job<P>,
    token: CancellationToken,
    progress: ProgressReporter,
}

struct Inner<W: JobWorker> {
    worker: W,
    parent: CancellationToken,
    state: Mutex<QueueState<W::Payload>>,
    bus: Arc<EventBus<W::Output>>,
}

/// Runs jobs on a worker with at most `concurrency` in flight.
///
/// Jobs are admitted in FIFO order. Every lifecycle change is published as a
/// [`JobEvent`]; `Idle` is published each time nothing is pending or running.
///
/// Admitted jobs run as Tokio tasks, so every mutating method must be called
/// from within a Tokio runtime.
pub struct JobScheduler<W: JobWorker> {
    inner: Arc<Inner<W>>,
}

impl<W: JobWorker> Clone for JobScheduler<W> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<W: JobWorker> JobScheduler<W> {
    /// Creates a scheduler; `concurrency` is clamped to at least 1.
    pub fn new(worker: W, concurrency: usize) -> Self {
        Self::with_cancellation(worker, concurrency, CancellationToken::new())
    }

    /// Creates a scheduler whose job tokens are children of `parent`.
    ///
    /// Canceling `parent` reaches every running job; canceling one job never
    /// affects the others.
    pub fn with_cancellation(worker: W, concurrency: usize, parent: CancellationToken) -> Self {
        Self {
            inner: Arc::new(Inner {
                worker,
                parent,
                state: Mutex::new(QueueState {
                    pending: VecDeque::new(),
                    running: BTreeMap::new(),
                    next_seq: 0,
                    concurrency: concurrency.max(1),
                }),
                bus: Arc::new(EventBus::new()),
            }),
        }
    }

    /// Appends jobs in order and starts as many as the limit allows.
    pub fn enqueue(&self, items: Vec<Job<W::Payload>>) {
        let launches = {
            let mut state = self.inner.state.lock();
            for job in items {
                debug!("Queued job {}", job.id);
                self.inner.bus.push(JobEvent::Queued {
                    job_id: job.id.clone(),
                });
                state.pending.push_back(job);
            }
            let launches = self.inner.admit(&mut state);
            self.inner.check_idle(&state);
            launches
        };
        self.inner.launch(launches);
        self.inner.bus.deliver();
    }

    /// Changes the concurrency limit and returns the effective value.
    ///
    /// Raising the limit admits pending jobs right away; lowering it never
    /// preempts running jobs.
    pub fn set_concurrency(&self, concurrency: usize) -> usize {
        let concurrency = concurrency.max(1);
        let launches = {
            let mut state = self.inner.state.lock();
            state.concurrency = concurrency;
            self.inner.admit(&mut state)
        };
        info!("Concurrency set to {}", concurrency);
        self.inner.launch(launches);
        self.inner.bus.deliver();
        concurrency
    }

    /// Cancels one job.
    ///
    /// Pending jobs with this id are removed and reported as canceled without
    /// ever starting. Running jobs with this id have their token canceled and
    /// are reported when they settle. Unknown ids are ignored.
    pub fn cancel(&self, job_id: &str) {
        {
            let mut state = self.inner.state.lock();
            let (removed, kept): (VecDeque<_>, VecDeque<_>) = std::mem::take(&mut state.pending)
                .into_iter()
                .partition(|job| job.id == job_id);
            state.pending = kept;
            let pending_hits = removed.len();
            for job in removed {
                self.inner.cancel_pending(job);
            }

            let mut running_hits = 0;
            for running in state.running.values_mut().filter(|r| r.id == job_id) {
                running.canceled = true;
                running.token.cancel();
                running_hits += 1;
            }

            if pending_hits + running_hits == 0 {
                debug!("Cancel ignored for unknown job {}", job_id);
            } else if running_hits > 0 {
                debug!("Signaled cancellation to running job {}", job_id);
            }
            self.inner.check_idle(&state);
        }
        self.inner.bus.deliver();
    }

    /// Cancels every pending and running job.
    pub fn cancel_all(&self) {
        {
            let mut state = self.inner.state.lock();
            let pending: Vec<_> = state.pending.drain(..).collect();
            let signaled = state.running.len();
            info!(
                "Canceling {} pending and {} running jobs",
                pending.len(),
                signaled
            );
            for job in pending {
                self.inner.cancel_pending(job);
            }
            for running in state.running.values_mut() {
                running.canceled = true;
                running.token.cancel();
            }
            self.inner.check_idle(&state);
        }
        self.inner.bus.deliver();
    }

    /// Registers a listener for every subsequent event.
    ///
    /// Listeners run synchronously on whichever thread delivers the event and
    /// may call back into the scheduler.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(&JobEvent<W::Output>) + Send + Sync + 'static,
    {
        let id = self.inner.bus.add(Arc::new(listener));
        Subscription::new(id, &self.inner.bus)
    }

    /// Returns a channel receiving every subsequent event.
    pub fn events(&self) -> mpsc::UnboundedReceiver<JobEvent<W::Output>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
        let own = Arc::clone(&slot);
        let subscription = self.subscribe(move |event| {
            // Receiver dropped: stop listening
            if tx.send(event.clone()).is_err() {
                if let Some(subscription) = own.lock().take() {
                    subscription.unsubscribe();
                }
            }
        });
        *slot.lock() = Some(subscription);
        rx
    }

    /// Current pending and running jobs.
    pub fn snapshot(&self) -> QueueSnapshot {
        let state = self.inner.state.lock();
        QueueSnapshot {
            pending: state.pending.iter().map(|job| job.id.clone()).collect(),
            running: state.running.values().map(|r| r.id.clone()).collect(),
            concurrency: state.concurrency,
        }
    }

    /// Current concurrency limit.
    pub fn concurrency(&self) -> usize {
        self.inner.state.lock().concurrency
    }

    /// The worker jobs are handed to.
    pub fn worker(&self) -> &W {
        &self.inner.worker
    }
}

impl<W: JobWorker> Inner<W> {
    /// Moves pending jobs into the running set while below the limit.
    ///
    /// Called with the state lock held.
    fn admit(self: &Arc<Self>, state: &mut QueueState<W::Payload>) -> Vec<Launch<W::Payload>> {
        let mut launches = Vec::new();
        while state.running.len() < state.concurrency {
            let Some(job) = state.pending.pop_front() else {
                break;
            };
            let seq = state.next_seq;
            state.next_seq += 1;

            let token = self.parent.child_token();
            let progress = self.progress_reporter(&job.id);
            state.running.insert(
                seq,
                RunningJob {
                    id: job.id.clone(),
                    token: token.clone(),
                    canceled: false,
                    progress: progress.clone(),
                    started_at: Instant::now(),
                },
            );
            metrics::JOBS_RUNNING.inc();
            debug!(
                "Started job {} ({}/{} running)",
                job.id,
                state.running.len(),
                state.concurrency
            );
            self.bus.push(JobEvent::Started {
                job_id: job.id.clone(),
            });
            launches.push(Launch {
                seq,
                job,
                token,
                progress,
            });
        }
        launches
    }

    fn progress_reporter(self: &Arc<Self>, job_id: &str) -> ProgressReporter {
        let push_bus = Arc::downgrade(&self.bus);
        let flush_bus = Arc::downgrade(&self.bus);
        let job_id = job_id.to_string();
        ProgressReporter::new(
            move |value| {
                if let Some(bus) = push_bus.upgrade() {
                    bus.push(JobEvent::Progress {
                        job_id: job_id.clone(),
                        value,
                    });
                }
            },
            move || {
                if let Some(bus) = flush_bus.upgrade() {
                    bus.deliver();
                }
            },
        )
    }

    /// Spawns the worker for every admitted job.
    ///
    /// Called after the state lock is released.
    fn launch(self: &Arc<Self>, launches: Vec<Launch<W::Payload>>) {
        for launch in launches {
            let inner = Arc::clone(self);
            tokio::spawn(async move {
                let Launch {
                    seq,
                    job,
                    token,
                    progress,
                } = launch;
                let run = inner.worker.run(&job.id, job.payload, token, progress);
                let outcome = AssertUnwindSafe(run).catch_unwind().await;
                inner.settle(seq, &job.id, outcome);
            });
        }
    }

    /// Publishes the terminal event of a finished job and admits the next ones.
    fn settle(
        self: &Arc<Self>,
        seq: u64,
        job_id: &str,
        outcome: Result<Result<W::Output, JobFailure>, Box<dyn Any + Send>>,
    ) {
        let launches = {
            let mut state = self.state.lock();
            let running = state.running.remove(&seq);
            let canceled = running.as_ref().is_some_and(|r| r.canceled);

            let event = match outcome {
                _ if canceled => JobEvent::Canceled {
                    job_id: job_id.to_string(),
                },
                Ok(Ok(result)) => JobEvent::Completed {
                    job_id: job_id.to_string(),
                    result,
                },
                Ok(Err(JobFailure::Canceled)) => JobEvent::Canceled {
                    job_id: job_id.to_string(),
                },
                Ok(Err(JobFailure::Failed(error))) => JobEvent::Failed {
                    job_id: job_id.to_string(),
                    error,
                },
                Err(_) => {
                    warn!("Worker panicked while running job {}", job_id);
                    JobEvent::Failed {
                        job_id: job_id.to_string(),
                        error: "worker panicked".to_string(),
                    }
                }
            };

            let outcome_label = match &event {
                JobEvent::Completed { .. } => "completed",
                JobEvent::Failed { .. } => "failed",
                _ => "canceled",
            };
            match &event {
                JobEvent::Failed { error, .. } => warn!("Job {} failed: {}", job_id, error),
                _ => info!("Job {} {}", job_id, outcome_label),
            }
            metrics::JOBS_TOTAL.with_label_values(&[outcome_label]).inc();

            match running {
                Some(running) => {
                    metrics::JOBS_RUNNING.dec();
                    metrics::JOB_DURATION
                        .with_label_values(&[outcome_label])
                        .observe(running.started_at.elapsed().as_secs_f64());
                    running.progress.close_with(|| self.bus.push(event));
                }
                None => self.bus.push(event),
            }

            let launches = self.admit(&mut state);
            self.check_idle(&state);
            launches
        };
        self.launch(launches);
        self.bus.deliver();
    }

    /// Reports a job removed from the pending queue as canceled.
    fn cancel_pending(&self, job: Job<W::Payload>) {
        debug!("Canceled pending job {}", job.id);
        metrics::JOBS_TOTAL.with_label_values(&["canceled"]).inc();
        self.bus.push(JobEvent::Canceled { job_id: job.id });
    }

    /// Publishes `Idle` when nothing is pending or running.
    fn check_idle(&self, state: &QueueState<W::Payload>) {
        if state.pending.is_empty() && state.running.is_empty() {
            debug!("Scheduler idle");
            self.bus.push(JobEvent::Idle);
        }
    }
}
