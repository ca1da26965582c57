#![allow(dead_code)]

use std::time::Duration;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// One raw reading from the load, before the poller stamps it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryFrame {
    pub voltage: f64,
    pub current: f64,
    pub temperature: f64,
    /// Device-reported energy counter in Wh.
    pub energy_wh: f64,
    /// Device-reported charge counter in mAh.
    pub charge_mah: f64,
    pub on_time: Duration,
}

/// A telemetry frame plus the wall-clock instant the poller captured it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub captured_at: DateTime<Local>,
    pub voltage: f64,
    pub current: f64,
    pub temperature: f64,
    pub energy_wh: f64,
    pub charge_mah: f64,
    pub on_time: Duration,
}

impl TelemetrySample {
    pub fn from_frame(frame: TelemetryFrame, captured_at: DateTime<Local>) -> Self {
        Self {
            captured_at,
            voltage: frame.voltage,
            current: frame.current,
            temperature: frame.temperature,
            energy_wh: frame.energy_wh,
            charge_mah: frame.charge_mah,
            on_time: frame.on_time,
        }
    }

    pub fn power(&self) -> f64 {
        self.voltage * self.current
    }
}

/// Read-only mirror of the load's configuration registers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSettings {
    pub current_limit_a: f64,
    pub voltage_cutoff_v: f64,
    pub timer: Duration,
}

/// Operator request queued for execution between poll cycles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LoadCommand {
    SetCurrent(f64),
    SetVoltageCutoff(f64),
    SetTimer(Duration),
    Enable,
    Disable,
    ResetCounters,
    ReadSnapshot,
}

/// Diagnostic dump of everything readable, taken in a single session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSnapshot {
    pub is_on: bool,
    pub telemetry: TelemetryFrame,
    pub settings: DeviceSettings,
}

/// Renders an on-time or timer value as `{days}d {HH}:{MM}:{SS}`.
pub fn format_on_time(value: Duration) -> String {
    let total = value.as_secs();
    let days = total / 86_400;
    let hours = (total / 3_600) % 24;
    let minutes = (total / 60) % 60;
    let seconds = total % 60;
    format!("{days}d {hours:02}:{minutes:02}:{seconds:02}")
}
