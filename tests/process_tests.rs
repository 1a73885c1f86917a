//! End-to-end tests against real child processes
//!
//! The bundled "binaries" are small shell scripts, so these only run on unix.

#![cfg(unix)]

use droidfrpd::config::SupervisorConfig;
use droidfrpd::config_store::default_template;
use droidfrpd::provision::BinaryAssets;
use droidfrpd::{Mode, Phase, Supervisor};
use std::time::Duration;
use tempfile::TempDir;
use tokio::time::{sleep, Instant};

fn supervisor(tmp: &TempDir, mode: Mode, script: &'static str) -> Supervisor {
    Supervisor::builder(tmp.path(), BinaryAssets::new().with(mode, script.as_bytes()))
        .config(SupervisorConfig {
            early_exit_window_ms: 300,
            ..Default::default()
        })
        .build()
}

/// Poll until `pred` holds for the buffered lines, collecting everything drained
async fn collect_until(supervisor: &Supervisor, pred: impl Fn(&[String]) -> bool) -> Vec<String> {
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut lines = Vec::new();
    loop {
        lines.extend(supervisor.log_buffer().drain().into_iter().map(|e| e.line));
        if pred(&lines) || Instant::now() >= deadline {
            return lines;
        }
        sleep(Duration::from_millis(20)).await;
    }
}

fn has(lines: &[String], needle: &str) -> bool {
    lines.iter().any(|l| l.contains(needle))
}

#[tokio::test]
async fn test_cold_start_runs_bundled_binary() {
    let tmp = TempDir::new().unwrap();
    let supervisor = supervisor(&tmp, Mode::Client, "#!/bin/sh\necho hello\nexec sleep 60\n");

    supervisor.start(Mode::Client).await;
    let lines = collect_until(&supervisor, |l| {
        has(l, "[OUT] hello") && has(l, "CLIENT started successfully")
    })
    .await;

    assert!(has(&lines, "Starting client with command: "));
    assert!(has(&lines, "[OUT] hello"));
    assert!(has(&lines, "CLIENT started successfully"));
    assert!(supervisor.is_running());
    assert!(supervisor.status().pid.is_some());
    assert_eq!(
        std::fs::read_to_string(tmp.path().join("client.toml")).unwrap(),
        default_template(Mode::Client)
    );

    supervisor.stop().await;
    assert_eq!(supervisor.phase(), Phase::Idle);
}

#[tokio::test]
async fn test_child_receives_config_path() {
    let tmp = TempDir::new().unwrap();
    std::fs::write(tmp.path().join("server.toml"), "bindPort = 7000\n").unwrap();
    let supervisor = supervisor(&tmp, Mode::Server, "#!/bin/sh\ncat \"$2\"\nexec sleep 60\n");

    supervisor.start(Mode::Server).await;
    let lines = collect_until(&supervisor, |l| has(l, "[OUT] bindPort = 7000")).await;
    assert!(has(&lines, "[OUT] bindPort = 7000"));

    supervisor.stop().await;
}

#[tokio::test]
async fn test_early_exit_keeps_stderr() {
    let tmp = TempDir::new().unwrap();
    let supervisor = supervisor(
        &tmp,
        Mode::Client,
        "#!/bin/sh\necho 'unknown field \"foo\"' >&2\nexit 1\n",
    );

    supervisor.start(Mode::Client).await;
    let lines = collect_until(&supervisor, |l| {
        has(l, "exited immediately") && has(l, "[ERR] ")
    })
    .await;

    assert!(has(&lines, "[ERR] unknown field \"foo\""));
    assert!(has(&lines, "Error: client exited immediately with code: 1"));
    assert_eq!(supervisor.phase(), Phase::Failed);
}

#[tokio::test]
async fn test_rapid_stop_leaves_log_quiet() {
    let tmp = TempDir::new().unwrap();
    let supervisor = supervisor(&tmp, Mode::Client, "#!/bin/sh\nexec sleep 60\n");

    supervisor.start(Mode::Client).await;
    sleep(Duration::from_millis(100)).await;

    let before = Instant::now();
    supervisor.stop().await;
    assert!(before.elapsed() < Duration::from_secs(2));
    assert_eq!(supervisor.phase(), Phase::Idle);

    sleep(Duration::from_millis(1_500)).await;
    let lines: Vec<String> = supervisor
        .log_buffer()
        .drain()
        .into_iter()
        .map(|e| e.line)
        .collect();
    assert_eq!(lines.last().map(String::as_str), Some("CLIENT stopped"));
    assert!(!has(&lines, "started successfully"));
    assert!(!has(&lines, "exited"));
}

#[tokio::test]
async fn test_invalid_utf8_output_keeps_child_alive() {
    let tmp = TempDir::new().unwrap();
    let supervisor = supervisor(
        &tmp,
        Mode::Client,
        "#!/bin/sh\nprintf 'caf\\351\\n'\nsleep 0.3\nwhile true; do echo tick; sleep 0.1; done\n",
    );

    supervisor.start(Mode::Client).await;
    let lines = collect_until(&supervisor, |l| {
        has(l, "CLIENT started successfully") && has(l, "[OUT] tick")
    })
    .await;

    assert!(lines.contains(&"[OUT] caf\u{FFFD}".to_string()));
    assert!(has(&lines, "[OUT] tick"));
    assert!(!has(&lines, "Error:"));
    assert!(supervisor.is_running());

    supervisor.stop().await;
}

#[tokio::test]
async fn test_stop_silences_output_of_restarted_child_descendants() {
    let tmp = TempDir::new().unwrap();
    let supervisor = Supervisor::builder(
        tmp.path(),
        BinaryAssets::new().with(
            Mode::Client,
            b"#!/bin/sh\n(while true; do echo bg; sleep 0.1; done) &\nsleep 1.5\nexit 3\n"
                .as_slice(),
        ),
    )
    .config(SupervisorConfig {
        early_exit_window_ms: 300,
        liveness_interval_secs: 2,
        ..Default::default()
    })
    .build();

    supervisor.start(Mode::Client).await;
    let lines = collect_until(&supervisor, |l| {
        has(l, "Warning: FRP process exited with code: 3")
    })
    .await;
    assert!(has(&lines, "Warning: FRP process exited with code: 3"));

    supervisor.stop().await;
    supervisor.log_buffer().clear();

    sleep(Duration::from_secs(2)).await;
    assert!(supervisor.log_buffer().is_empty());
}
