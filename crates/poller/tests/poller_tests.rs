use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::mpsc;
use tokio::time::sleep;

use load_client::sim::{SimConfig, SimLink};
use load_client::{ClientConfig, ClientError, DeviceLink, DeviceSession, LoadClient};
use poller::ActorConfig;
use recorder::CsvRecorder;

#[tokio::test]
async fn polls_publish_samples_and_csv_rows() {
    let link = Arc::new(SimLink::new(SimConfig::default()));
    let client = LoadClient::new(link, ClientConfig::default());
    client.set_current(2.0).await.expect("set current");
    client.enable().await.expect("enable");

    let path = temp_csv_path("polls_publish");
    let mut recorder = CsvRecorder::new();
    recorder.open(&path, false).expect("open csv");

    let (tx, mut rx) = mpsc::channel(64);
    let handle = poller::spawn(
        client,
        tx,
        recorder,
        ActorConfig {
            poll_interval: Duration::from_millis(10),
            error_backoff: Duration::from_millis(50),
        },
    );
    assert!(handle.is_running());

    sleep(Duration::from_millis(120)).await;
    handle.stop().await.expect("stop poller");

    let mut samples = Vec::new();
    while let Ok(sample) = rx.try_recv() {
        samples.push(sample);
    }
    assert!(samples.len() >= 2, "expected several samples, got {}", samples.len());
    for pair in samples.windows(2) {
        assert!(pair[0].captured_at <= pair[1].captured_at);
        assert!(pair[0].charge_mah <= pair[1].charge_mah);
    }

    let content = fs::read_to_string(&path).expect("read csv");
    let lines = content.lines().count();
    // Header plus one row per completed cycle.
    assert!(lines >= samples.len() + 1);
    cleanup(&path);
}

#[tokio::test]
async fn read_failures_back_off_but_never_stop_the_loop() {
    let link = Arc::new(DeadLink);
    let client = LoadClient::new(link, ClientConfig::default());

    let path = temp_csv_path("read_failures");
    let mut recorder = CsvRecorder::new();
    recorder.open(&path, false).expect("open csv");

    let (tx, mut rx) = mpsc::channel(8);
    let handle = poller::spawn(
        client,
        tx,
        recorder,
        ActorConfig {
            poll_interval: Duration::from_millis(5),
            error_backoff: Duration::from_millis(10),
        },
    );

    sleep(Duration::from_millis(80)).await;
    assert!(handle.is_running(), "loop must survive read failures");
    handle.stop().await.expect("stop poller");

    assert!(rx.try_recv().is_err(), "no samples expected from a dead link");
    let content = fs::read_to_string(&path).expect("read csv");
    assert_eq!(content.lines().count(), 1, "header only");
    cleanup(&path);
}

#[tokio::test]
async fn stop_joins_the_task() {
    let link = Arc::new(SimLink::new(SimConfig::default()));
    let client = LoadClient::new(link, ClientConfig::default());

    let path = temp_csv_path("stop_joins");
    let mut recorder = CsvRecorder::new();
    recorder.open(&path, false).expect("open csv");

    let (tx, _rx) = mpsc::channel(8);
    let handle = poller::spawn(client, tx, recorder, ActorConfig::default());

    handle.stop().await.expect("stop poller");
    cleanup(&path);
}

/// A link whose sessions never open; every cycle fails.
struct DeadLink;

impl DeviceLink for DeadLink {
    fn open(&self) -> Result<Box<dyn DeviceSession>, ClientError> {
        Err(ClientError::Io(std::io::Error::other("no such port")))
    }
}

fn temp_csv_path(prefix: &str) -> PathBuf {
    let mut path = std::env::temp_dir();
    let pid = std::process::id();
    let ts = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    path.push(format!("{prefix}-{pid}-{ts}.csv"));
    path
}

fn cleanup(path: &PathBuf) {
    let _ = fs::remove_file(path);
}
