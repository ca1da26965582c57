#![allow(dead_code)]

use std::time::Duration;

use chrono::Local;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{error, info, warn};

use load_client::{ClientError, LoadClient};
use recorder::CsvRecorder;
use types::TelemetrySample;

#[derive(Debug, Clone)]
pub struct ActorConfig {
    pub poll_interval: Duration,
    /// Sleep after a failed read, so a dead transport is not hammered at
    /// the poll cadence.
    pub error_backoff: Duration,
}

impl Default for ActorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            error_backoff: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Error)]
pub enum PollerError {
    #[error("poller task failed: {0}")]
    Join(String),
}

/// The background acquisition task: one telemetry read per cycle, pushed to
/// the channel and appended to the CSV log.
pub struct PollerActor {
    client: LoadClient,
    sender: mpsc::Sender<TelemetrySample>,
    recorder: CsvRecorder,
    shutdown: watch::Receiver<bool>,
    config: ActorConfig,
}

impl PollerActor {
    pub fn new(
        client: LoadClient,
        sender: mpsc::Sender<TelemetrySample>,
        recorder: CsvRecorder,
        shutdown: watch::Receiver<bool>,
        config: ActorConfig,
    ) -> Self {
        Self {
            client,
            sender,
            recorder,
            shutdown,
            config,
        }
    }

    pub async fn run(mut self) {
        let mut cycles = 0u64;
        loop {
            if *self.shutdown.borrow() {
                info!("poller shutdown requested");
                break;
            }

            // A failed read never stops polling; it only stretches the
            // sleep to the backoff interval.
            let delay = match self.cycle().await {
                Ok(()) => {
                    cycles = cycles.wrapping_add(1);
                    self.config.poll_interval
                }
                Err(err) => {
                    warn!(error = %err, "telemetry read failed");
                    self.config.error_backoff
                }
            };

            tokio::select! {
                _ = sleep(delay) => {}
                _ = self.shutdown.changed() => {
                    if *self.shutdown.borrow() {
                        info!("poller shutdown requested");
                        break;
                    }
                }
            }
        }
        self.recorder.close();
        info!(cycles, "poller stopped");
    }

    async fn cycle(&mut self) -> Result<(), ClientError> {
        let frame = self.client.read_telemetry().await?;
        let sample = TelemetrySample::from_frame(frame, Local::now());

        match self.sender.try_send(sample.clone()) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("telemetry channel full, sample dropped");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("telemetry channel closed, sample dropped");
            }
        }

        if let Err(err) = self.recorder.append(&sample) {
            error!(error = %err, "csv append failed");
        }
        Ok(())
    }
}

/// Live handle to a spawned poller. Dropping it does not stop the task;
/// `stop` must be called for a clean join.
pub struct PollerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// Signals the loop to exit after its current cycle and waits for the
    /// task to terminate. A cycle already inside a transport read runs to
    /// completion first.
    pub async fn stop(self) -> Result<(), PollerError> {
        let _ = self.shutdown.send(true);
        self.task
            .await
            .map_err(|err| PollerError::Join(err.to_string()))
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }
}

pub fn spawn(
    client: LoadClient,
    sender: mpsc::Sender<TelemetrySample>,
    recorder: CsvRecorder,
    config: ActorConfig,
) -> PollerHandle {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let actor = PollerActor::new(client, sender, recorder, shutdown_rx, config);
    let task = tokio::spawn(actor.run());
    PollerHandle {
        shutdown: shutdown_tx,
        task,
    }
}
