//! End-to-end runs of the `pixelbatch` binary.
//!
//! FFmpeg is pointed at a path that does not exist, so only the paths that
//! never reach the tool (vector passthrough, argument and config errors) are
//! expected to succeed.

use std::path::Path;
use std::process::Output;
use std::time::Duration;

use tempfile::TempDir;
use tokio::time::timeout;

const MISSING_FFMPEG: &str = "/nonexistent/ffmpeg";

const SVG: &str = r#"<svg xmlns="http://www.w3.org/2000/svg" width="4" height="4"/>"#;

/// Run the binary to completion with quiet logs and a missing ffmpeg.
async fn run_cli(args: &[&str]) -> Output {
    let mut command = tokio::process::Command::new(env!("CARGO_BIN_EXE_pixelbatch"));
    command
        .args(args)
        .env("RUST_LOG", "error") // Quiet logs during tests
        .env("PIXELBATCH_TOOL__FFMPEG_PATH", MISSING_FFMPEG)
        .env("PIXELBATCH_TOOL__FFPROBE_PATH", "/nonexistent/ffprobe")
        .env_remove("PIXELBATCH_CONFIG")
        .kill_on_drop(true);

    timeout(Duration::from_secs(30), command.output())
        .await
        .expect("CLI did not finish in time")
        .expect("Failed to run CLI")
}

fn write(dir: &Path, name: &str, contents: &[u8]) -> String {
    let path = dir.join(name);
    std::fs::write(&path, contents).unwrap();
    path.to_string_lossy().into_owned()
}

#[tokio::test]
async fn test_svg_passthrough_copies_bytes() {
    let dir = TempDir::new().unwrap();
    let input = write(dir.path(), "logo.svg", SVG.as_bytes());
    let out = dir.path().join("out");

    let output = run_cli(&["convert", &input, "-o", out.to_str().unwrap()]).await;

    assert_eq!(output.status.code(), Some(0), "{:?}", output);
    let copied = std::fs::read(out.join("logo_pixelated.svg")).unwrap();
    assert_eq!(copied, SVG.as_bytes());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("done: 1, failed: 0, canceled: 0"));
}

#[tokio::test]
async fn test_raster_without_ffmpeg_fails() {
    let dir = TempDir::new().unwrap();
    let input = write(dir.path(), "hero.png", b"not really a png");

    let output = run_cli(&["convert", &input, "-o", dir.path().to_str().unwrap()]).await;

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("hero.png"), "stderr: {}", stderr);
}

#[tokio::test]
async fn test_json_summary() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "a.svg", SVG.as_bytes());
    write(dir.path(), "b.png", b"x");
    write(dir.path(), "notes.txt", b"skipped");
    let out = dir.path().join("out");

    let output = run_cli(&[
        "convert",
        dir.path().to_str().unwrap(),
        "-o",
        out.to_str().unwrap(),
        "-j",
        "1",
        "--json",
    ])
    .await;

    assert_eq!(output.status.code(), Some(1));
    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(summary["completed"], 1);
    assert_eq!(summary["failed"], 1);
    assert_eq!(summary["canceled"], 0);
    assert!(summary["failures"][0]["job"]
        .as_str()
        .unwrap()
        .ends_with("b.png"));
}

#[tokio::test]
async fn test_metrics_are_printed() {
    let dir = TempDir::new().unwrap();
    let input = write(dir.path(), "logo.svg", SVG.as_bytes());

    let output = run_cli(&[
        "convert",
        &input,
        "-o",
        dir.path().join("out").to_str().unwrap(),
        "--metrics",
    ])
    .await;

    assert_eq!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("pixelbatch_jobs_total"), "stdout: {}", stdout);
}

#[tokio::test]
async fn test_no_assets_is_an_error() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "readme.md", b"nothing to convert");

    let output = run_cli(&["convert", dir.path().to_str().unwrap()]).await;
    assert_eq!(output.status.code(), Some(1));
}

#[tokio::test]
async fn test_missing_config_file() {
    let dir = TempDir::new().unwrap();
    let input = write(dir.path(), "logo.svg", SVG.as_bytes());
    let config = dir.path().join("missing.toml");

    let output = run_cli(&["-c", config.to_str().unwrap(), "convert", &input]).await;

    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("missing.toml"), "stderr: {}", stderr);
}

#[tokio::test]
async fn test_invalid_config_rejected() {
    let dir = TempDir::new().unwrap();
    let input = write(dir.path(), "logo.svg", SVG.as_bytes());
    let config = write(
        dir.path(),
        "pixelbatch.toml",
        b"[output]\nsuffix = \"bad/suffix\"\n",
    );

    let output = run_cli(&["-c", &config, "convert", &input]).await;
    assert_eq!(output.status.code(), Some(1));
}

#[tokio::test]
async fn test_check_tools_without_ffmpeg() {
    let output = run_cli(&["check-tools"]).await;

    assert_ne!(output.status.code(), Some(0));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("png"));
    assert!(stdout.contains("missing"));
}
