//! Pipeline lifecycle integration tests.
//!
//! These tests run the conversion pipeline under the job scheduler with a mock
//! tool runner:
//! - Mixed batches of images, vectors and videos
//! - Derived video artifacts and their failure handling
//! - Progress ordering as seen by event listeners
//! - Cancellation of a running conversion

use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_test::assert_ok;

use pixelbatch_core::{
    converter::{
        ConversionPipeline, ConversionRequest, ConversionResult, ConversionSettings,
        InvocationStep, SpritesheetMetadata,
    },
    scheduler::{Job, JobEvent, JobScheduler},
    testing::{fixtures, MockToolRunner},
};

/// Test helper to run the pipeline under a scheduler with a mock runner.
struct TestHarness {
    scheduler: JobScheduler<ConversionPipeline<MockToolRunner>>,
    runner: MockToolRunner,
    events: mpsc::UnboundedReceiver<JobEvent<ConversionResult>>,
    source_dir: TempDir,
}

impl TestHarness {
    fn new(concurrency: usize) -> Self {
        let source_dir = TempDir::new().expect("Failed to create source dir");
        let runner = MockToolRunner::new();
        let scheduler = JobScheduler::new(ConversionPipeline::new(runner.clone()), concurrency);
        let events = scheduler.events();

        Self {
            scheduler,
            runner,
            events,
            source_dir,
        }
    }

    fn job(&self, name: &str, settings: ConversionSettings) -> Job<ConversionRequest> {
        Job::new(name, fixtures::request(self.source_dir.path(), name, settings))
    }

    async fn run_until_idle(&mut self) -> Vec<JobEvent<ConversionResult>> {
        let mut events = Vec::new();
        loop {
            let event = timeout(Duration::from_secs(10), self.events.recv())
                .await
                .expect("Timed out waiting for scheduler events")
                .expect("Event channel closed");
            let idle = matches!(event, JobEvent::Idle);
            events.push(event);
            if idle {
                return events;
            }
        }
    }
}

fn completed(events: &[JobEvent<ConversionResult>]) -> Vec<(String, ConversionResult)> {
    events
        .iter()
        .filter_map(|e| match e {
            JobEvent::Completed { job_id, result } => Some((job_id.clone(), result.clone())),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn test_mixed_batch_completes() {
    let mut harness = TestHarness::new(2);
    let video_settings = ConversionSettings {
        spritesheet: true,
        ..Default::default()
    };

    harness.scheduler.enqueue(vec![
        harness.job("hero.png", ConversionSettings::default()),
        harness.job("logo.svg", ConversionSettings::default()),
        harness.job("walk.mp4", video_settings),
    ]);
    let events = harness.run_until_idle().await;

    let done = completed(&events);
    assert_eq!(done.len(), 3);
    for (_, result) in &done {
        assert_ok!(std::fs::metadata(&result.output_path));
    }

    let (_, logo) = done.iter().find(|(id, _)| id == "logo.svg").unwrap();
    assert_eq!(
        std::fs::read(&logo.output_path).unwrap(),
        std::fs::read(harness.source_dir.path().join("logo.svg")).unwrap()
    );

    let (_, walk) = done.iter().find(|(id, _)| id == "walk.mp4").unwrap();
    assert_eq!(walk.extra_artifacts.len(), 1);
    let sidecar = harness
        .source_dir
        .path()
        .join("out/walk_pixelated_spritesheet.json");
    let metadata: SpritesheetMetadata =
        serde_json::from_slice(&std::fs::read(sidecar).unwrap()).unwrap();
    assert_eq!((metadata.columns, metadata.rows), (8, 8));

    // Vector passthrough never reaches the tool.
    let invocations = harness.runner.invocations().await;
    assert_eq!(invocations.len(), 3);
    assert!(invocations
        .iter()
        .all(|i| !i.output.to_string_lossy().ends_with(".svg")));
}

#[tokio::test]
async fn test_filter_graph_reaches_tool() {
    let mut harness = TestHarness::new(1);
    let settings = ConversionSettings {
        grid_size: 16,
        palette_size: 256,
        upscale: 4,
        ..Default::default()
    };

    harness.scheduler.enqueue(vec![harness.job("tile.png", settings)]);
    harness.run_until_idle().await;

    let invocations = harness.runner.invocations().await;
    assert_eq!(invocations.len(), 1);
    let graph = invocations[0]
        .args
        .iter()
        .skip_while(|a| *a != "-filter_complex")
        .nth(1)
        .expect("filter graph argument");
    assert!(graph.contains("trunc(iw/16)"));
    assert!(graph.contains("iw*4"));
    assert!(!graph.contains("palettegen"));
}

#[tokio::test]
async fn test_missing_input_fails_only_that_job() {
    let mut harness = TestHarness::new(2);
    let mut missing = harness.job("ghost.png", ConversionSettings::default());
    std::fs::remove_file(&missing.payload.input).unwrap();
    missing.id = "ghost".to_string();

    harness.scheduler.enqueue(vec![
        missing,
        harness.job("real.png", ConversionSettings::default()),
    ]);
    let events = harness.run_until_idle().await;

    let failure = events
        .iter()
        .find_map(|e| match e {
            JobEvent::Failed { job_id, error } => Some((job_id.clone(), error.clone())),
            _ => None,
        })
        .expect("failed event");
    assert_eq!(failure.0, "ghost");
    assert!(failure.1.contains("not found"));
    assert_eq!(completed(&events).len(), 1);
}

#[tokio::test]
async fn test_failed_spritesheet_fails_job() {
    let mut harness = TestHarness::new(1);
    harness
        .runner
        .fail_step(InvocationStep::Spritesheet, "Invalid tile size")
        .await;
    let settings = ConversionSettings {
        spritesheet: true,
        alpha_mask: true,
        ..Default::default()
    };

    harness.scheduler.enqueue(vec![harness.job("clip.mov", settings)]);
    let events = harness.run_until_idle().await;

    assert!(completed(&events).is_empty());
    assert!(events.iter().any(|e| matches!(
        e,
        JobEvent::Failed { error, .. } if error.contains("Invalid tile size")
    )));
    // The alpha mask never runs after the spritesheet fails.
    let steps: Vec<_> = harness
        .runner
        .invocations()
        .await
        .into_iter()
        .map(|i| i.step)
        .collect();
    assert_eq!(steps, vec![InvocationStep::Primary, InvocationStep::Spritesheet]);
}

#[tokio::test]
async fn test_video_progress_precedes_completion() {
    let mut harness = TestHarness::new(1);
    harness.runner.set_duration(8.0).await;
    harness
        .runner
        .set_progress_times(vec![
            Duration::from_secs(2),
            Duration::from_secs(4),
            Duration::from_secs(8),
        ])
        .await;

    harness
        .scheduler
        .enqueue(vec![harness.job("run.mp4", ConversionSettings::default())]);
    let events = harness.run_until_idle().await;

    let values: Vec<f32> = events
        .iter()
        .filter_map(|e| match e {
            JobEvent::Progress { value, .. } => Some(*value),
            _ => None,
        })
        .collect();
    assert!(values.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(values.last(), Some(&1.0));
    assert!(values[..values.len() - 1].iter().all(|v| *v <= 0.99));

    let last_progress = events
        .iter()
        .rposition(|e| matches!(e, JobEvent::Progress { .. }))
        .unwrap();
    let completion = events
        .iter()
        .position(|e| matches!(e, JobEvent::Completed { .. }))
        .unwrap();
    assert!(last_progress < completion);
}

#[tokio::test]
async fn test_cancel_running_conversion() {
    let mut harness = TestHarness::new(1);
    harness.runner.set_run_duration(Duration::from_secs(30)).await;

    harness
        .scheduler
        .enqueue(vec![harness.job("slow.png", ConversionSettings::default())]);
    tokio::time::sleep(Duration::from_millis(50)).await;
    harness.scheduler.cancel("slow.png");
    let events = harness.run_until_idle().await;

    assert!(events
        .iter()
        .any(|e| matches!(e, JobEvent::Canceled { job_id } if job_id == "slow.png")));
    assert!(completed(&events).is_empty());
    assert!(!harness
        .source_dir
        .path()
        .join("out/slow_pixelated.png")
        .exists());
}
