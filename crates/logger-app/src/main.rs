use std::env;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use control::CommandDispatcher;
use load_client::sim::SimLink;
use load_client::{DeviceLink, LoadClient};
use logger_app::{console, consumer, LoggerConfig};
use recorder::CsvRecorder;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let config_path = parse_config_arg();
    let config = LoggerConfig::load_with_path(config_path).context("load config failed")?;
    config.validate().context("config validation failed")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let link = build_link(&config);
    let client = LoadClient::new(link, config.client.clone());

    let mut recorder = CsvRecorder::new();
    recorder
        .open(Path::new(&config.csv_path), config.csv_append)
        .context("csv open failed")?;

    let (tx, rx) = mpsc::channel(config.channel_capacity);
    let poller_handle = poller::spawn(client.clone(), tx, recorder, config.poller.clone());

    let (dispatcher, queue, status_rx) = CommandDispatcher::new(client);
    let consumer_handle = tokio::spawn(consumer::run(
        rx,
        dispatcher,
        shutdown_rx.clone(),
        Duration::from_millis(config.drain_interval_ms),
    ));
    let console_handle = tokio::spawn(console::run(queue, shutdown_rx.clone()));
    let status_handle = tokio::spawn(status_task(status_rx, shutdown_rx.clone()));

    notify_ready();
    let watchdog_handle = start_watchdog(shutdown_rx.clone());

    info!(csv = %config.csv_path, "logger running, ctrl-c to stop");
    tokio::signal::ctrl_c().await.context("ctrl-c handler failed")?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    if let Err(err) = poller_handle.stop().await {
        warn!(error = %err, "poller stop failed");
    }
    let _ = consumer_handle.await;
    // Stdin reads cannot be interrupted cooperatively.
    console_handle.abort();
    let _ = status_handle.await;
    if let Some(handle) = watchdog_handle {
        let _ = handle.await;
    }
    Ok(())
}

fn build_link(config: &LoggerConfig) -> Arc<dyn DeviceLink> {
    // validate() only lets "sim" through; a serial-port backend slots in
    // here once one implements DeviceLink.
    Arc::new(SimLink::new(config.sim.clone()))
}

async fn status_task(
    mut status: watch::Receiver<String>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let line = status.borrow_and_update().clone();
                info!(status = %line, "status");
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

fn parse_config_arg() -> Option<String> {
    let mut args = env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            return args.next();
        }
        if let Some(path) = arg.strip_prefix("--config=") {
            return Some(path.to_string());
        }
    }
    None
}

#[cfg(target_os = "linux")]
fn notify_ready() {
    if let Err(err) = sd_notify::notify(true, &[sd_notify::NotifyState::Ready]) {
        warn!(error = %err, "systemd ready notify failed");
    }
}

#[cfg(not(target_os = "linux"))]
fn notify_ready() {}

#[cfg(target_os = "linux")]
fn start_watchdog(
    mut shutdown: watch::Receiver<bool>,
) -> Option<tokio::task::JoinHandle<()>> {
    let interval = watchdog_interval()?;
    Some(tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    if let Err(err) = sd_notify::notify(false, &[sd_notify::NotifyState::Watchdog]) {
                        warn!(error = %err, "systemd watchdog notify failed");
                    }
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    }))
}

#[cfg(not(target_os = "linux"))]
fn start_watchdog(_shutdown: watch::Receiver<bool>) -> Option<tokio::task::JoinHandle<()>> {
    None
}

#[cfg(target_os = "linux")]
fn watchdog_interval() -> Option<Duration> {
    let watchdog_usec = env::var("WATCHDOG_USEC").ok()?.parse::<u64>().ok()?;
    if let Some(pid) = env::var("WATCHDOG_PID")
        .ok()
        .and_then(|value| value.parse::<u32>().ok())
    {
        if pid != std::process::id() {
            return None;
        }
    }

    let interval = watchdog_usec.saturating_div(2).max(100_000);
    Some(Duration::from_micros(interval))
}
