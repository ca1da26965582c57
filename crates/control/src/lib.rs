#![allow(dead_code)]

use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use load_client::{ClientError, LoadClient};
use types::{format_on_time, DeviceSettings, DeviceSnapshot, LoadCommand};

/// Operator input rejected before anything reaches the device.
#[derive(Debug, Error, PartialEq)]
pub enum InputError {
    #[error("not a number: {0:?}")]
    InvalidNumber(String),
    #[error("value must be finite and non-negative: {0}")]
    OutOfRange(f64),
    #[error("invalid timer {0:?}, expected seconds or HH:MM:SS")]
    InvalidTimer(String),
    #[error("unknown command: {0:?}")]
    UnknownCommand(String),
}

pub fn parse_amps(text: &str) -> Result<f64, InputError> {
    parse_non_negative(text)
}

pub fn parse_volts(text: &str) -> Result<f64, InputError> {
    parse_non_negative(text)
}

fn parse_non_negative(text: &str) -> Result<f64, InputError> {
    let value: f64 = text
        .trim()
        .parse()
        .map_err(|_| InputError::InvalidNumber(text.to_string()))?;
    if !value.is_finite() || value < 0.0 {
        return Err(InputError::OutOfRange(value));
    }
    Ok(value)
}

/// Accepts plain seconds (fractional allowed) or `HH:MM:SS`.
pub fn parse_timer(text: &str) -> Result<Duration, InputError> {
    let trimmed = text.trim();
    if let Ok(seconds) = trimmed.parse::<f64>() {
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(InputError::InvalidTimer(text.to_string()));
        }
        return Ok(Duration::from_secs_f64(seconds));
    }

    let parts: Vec<&str> = trimmed.split(':').collect();
    if parts.len() != 3 {
        return Err(InputError::InvalidTimer(text.to_string()));
    }
    let mut fields = [0u64; 3];
    for (slot, part) in fields.iter_mut().zip(&parts) {
        *slot = part
            .parse()
            .map_err(|_| InputError::InvalidTimer(text.to_string()))?;
    }
    let [hours, minutes, seconds] = fields;
    Ok(Duration::from_secs(hours * 3_600 + minutes * 60 + seconds))
}

/// Non-blocking enqueue handle, clonable across tasks.
#[derive(Clone)]
pub struct CommandQueue {
    sender: mpsc::UnboundedSender<LoadCommand>,
}

impl CommandQueue {
    pub fn enqueue(&self, command: LoadCommand) {
        if self.sender.send(command).is_err() {
            warn!("command dispatcher is gone, command dropped");
        }
    }
}

/// Executes queued operator commands between poll cycles, from a single
/// non-reentrant control point. Setting the device and re-reading its
/// settings always happen back to back here.
pub struct CommandDispatcher {
    pending: mpsc::UnboundedReceiver<LoadCommand>,
    client: LoadClient,
    settings: Option<DeviceSettings>,
    status: watch::Sender<String>,
}

impl CommandDispatcher {
    pub fn new(client: LoadClient) -> (Self, CommandQueue, watch::Receiver<String>) {
        let (sender, pending) = mpsc::unbounded_channel();
        let (status, status_rx) = watch::channel(String::from("awaiting input"));
        let dispatcher = Self {
            pending,
            client,
            settings: None,
            status,
        };
        (dispatcher, CommandQueue { sender }, status_rx)
    }

    /// Last settings read back from the device, if any command has run.
    pub fn settings(&self) -> Option<&DeviceSettings> {
        self.settings.as_ref()
    }

    /// Runs every queued command in FIFO order. A failing command is logged
    /// and skipped; the rest of the queue still executes. Returns the
    /// commands that succeeded so the caller can react to them.
    pub async fn drain_and_execute(&mut self) -> Vec<LoadCommand> {
        let mut executed = Vec::new();
        while let Ok(command) = self.pending.try_recv() {
            match self.execute(&command).await {
                Ok(()) => executed.push(command),
                Err(err) => {
                    warn!(command = ?command, error = %err, "command failed");
                    self.set_status(format!("command failed: {err}"));
                }
            }
        }
        executed
    }

    async fn execute(&mut self, command: &LoadCommand) -> Result<(), ClientError> {
        match command {
            LoadCommand::SetCurrent(amps) => {
                self.client.set_current(*amps).await?;
                self.refresh_settings().await?;
                self.set_status(format!("current set to {amps} A"));
            }
            LoadCommand::SetVoltageCutoff(volts) => {
                self.client.set_voltage_cutoff(*volts).await?;
                self.refresh_settings().await?;
                self.set_status(format!("voltage cutoff set to {volts} V"));
            }
            LoadCommand::SetTimer(limit) => {
                self.client.set_timer(*limit).await?;
                self.refresh_settings().await?;
                self.set_status(format!("timer set to {}", format_on_time(*limit)));
            }
            LoadCommand::Enable => {
                self.client.enable().await?;
                self.set_status("load enabled".to_string());
            }
            LoadCommand::Disable => {
                self.client.disable().await?;
                self.set_status("load disabled".to_string());
            }
            LoadCommand::ResetCounters => {
                self.client.reset_counters().await?;
                self.set_status("device counters reset".to_string());
            }
            LoadCommand::ReadSnapshot => {
                let snapshot = self.client.read_snapshot().await?;
                log_snapshot(&snapshot);
                self.settings = Some(snapshot.settings);
                self.set_status("snapshot read".to_string());
            }
        }
        Ok(())
    }

    /// Re-reads the configuration mirror after a successful write, so the
    /// operator sees what the device accepted rather than what was asked.
    async fn refresh_settings(&mut self) -> Result<(), ClientError> {
        let settings = self.client.read_settings().await?;
        info!(
            current_limit_a = settings.current_limit_a,
            voltage_cutoff_v = settings.voltage_cutoff_v,
            timer = %format_on_time(settings.timer),
            "device settings"
        );
        self.settings = Some(settings);
        Ok(())
    }

    fn set_status(&self, line: String) {
        let _ = self.status.send(line);
    }
}

fn log_snapshot(snapshot: &DeviceSnapshot) {
    info!(
        enabled = snapshot.is_on,
        voltage_v = snapshot.telemetry.voltage,
        current_a = snapshot.telemetry.current,
        energy_wh = snapshot.telemetry.energy_wh,
        charge_mah = snapshot.telemetry.charge_mah,
        temperature_c = snapshot.telemetry.temperature,
        on_time = %format_on_time(snapshot.telemetry.on_time),
        current_limit_a = snapshot.settings.current_limit_a,
        voltage_cutoff_v = snapshot.settings.voltage_cutoff_v,
        timer = %format_on_time(snapshot.settings.timer),
        "device snapshot"
    );
}
