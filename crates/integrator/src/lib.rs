#![allow(dead_code)]

use std::fmt;
use std::time::Instant;

use chrono::{DateTime, Local};
use serde::Serialize;

use types::TelemetrySample;

/// Device counters below these values are too coarse to compare against.
const CHARGE_EPSILON_MAH: f64 = 0.01;
const ENERGY_EPSILON_WH: f64 = 0.0001;
/// Relative deviation, in percent, above which local and device counters
/// count as diverged.
const DRIFT_WARN_PCT: f64 = 1.0;

/// Locally integrated totals diverged from the device's own counters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DriftWarning {
    Charge {
        local_mah: f64,
        device_mah: f64,
        deviation_pct: f64,
    },
    Energy {
        local_wh: f64,
        device_wh: f64,
        deviation_pct: f64,
    },
}

impl fmt::Display for DriftWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriftWarning::Charge {
                local_mah,
                device_mah,
                deviation_pct,
            } => write!(
                f,
                "local charge differs from device by {deviation_pct:.2}% \
                 (local={local_mah:.1} mAh, device={device_mah:.1} mAh)"
            ),
            DriftWarning::Energy {
                local_wh,
                device_wh,
                deviation_pct,
            } => write!(
                f,
                "local energy differs from device by {deviation_pct:.2}% \
                 (local={local_wh:.3} Wh, device={device_wh:.3} Wh)"
            ),
        }
    }
}

/// Result of folding one sample into the running totals.
#[derive(Debug, Clone)]
pub struct Update {
    pub charge_mah: f64,
    pub energy_wh: f64,
    pub warnings: Vec<DriftWarning>,
}

/// Integrates charge and energy between samples off the monotonic clock and
/// cross-checks the totals against the device's own counters.
///
/// The device counters are authoritative but coarse and lagged; integrating
/// locally gives a densely time-stamped series, while the cross-check
/// catches clock or protocol anomalies.
#[derive(Debug, Default)]
pub struct IntegrationEngine {
    last_update: Option<Instant>,
    charge_mah: f64,
    energy_wh: f64,
}

impl IntegrationEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn consume(&mut self, sample: &TelemetrySample) -> Update {
        self.consume_at(sample, Instant::now())
    }

    /// Folds `sample` in as observed at `now`. The first sample seeds the
    /// totals from the device counters; later samples integrate over the
    /// elapsed monotonic time.
    pub fn consume_at(&mut self, sample: &TelemetrySample, now: Instant) -> Update {
        match self.last_update {
            None => {
                self.charge_mah = sample.charge_mah;
                self.energy_wh = sample.energy_wh;
            }
            Some(prev) => {
                let dt = now.duration_since(prev).as_secs_f64();
                // A·s -> mAh and W·s -> Wh.
                self.charge_mah += sample.current * dt / 3.6;
                self.energy_wh += sample.power() * dt / 3600.0;
            }
        }
        self.last_update = Some(now);

        Update {
            charge_mah: self.charge_mah,
            energy_wh: self.energy_wh,
            warnings: self.drift_warnings(sample),
        }
    }

    fn drift_warnings(&self, sample: &TelemetrySample) -> Vec<DriftWarning> {
        let mut warnings = Vec::new();
        if sample.charge_mah > CHARGE_EPSILON_MAH {
            let deviation_pct =
                (self.charge_mah - sample.charge_mah).abs() / sample.charge_mah * 100.0;
            if deviation_pct > DRIFT_WARN_PCT {
                warnings.push(DriftWarning::Charge {
                    local_mah: self.charge_mah,
                    device_mah: sample.charge_mah,
                    deviation_pct,
                });
            }
        }
        if sample.energy_wh > ENERGY_EPSILON_WH {
            let deviation_pct =
                (self.energy_wh - sample.energy_wh).abs() / sample.energy_wh * 100.0;
            if deviation_pct > DRIFT_WARN_PCT {
                warnings.push(DriftWarning::Energy {
                    local_wh: self.energy_wh,
                    device_wh: sample.energy_wh,
                    deviation_pct,
                });
            }
        }
        warnings
    }

    /// Clears all state; the next sample re-seeds from the device counters.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn charge_mah(&self) -> f64 {
        self.charge_mah
    }

    pub fn energy_wh(&self) -> f64 {
        self.energy_wh
    }
}

/// In-memory series for the current session, owned by the consumer side.
/// This is what a plotting layer reads; cleared together with the engine on
/// a counter reset.
#[derive(Debug, Default)]
pub struct SessionSeries {
    timestamps: Vec<DateTime<Local>>,
    voltage: Vec<f64>,
    current: Vec<f64>,
    charge_mah: Vec<f64>,
    energy_wh: Vec<f64>,
}

impl SessionSeries {
    pub fn push(&mut self, sample: &TelemetrySample, update: &Update) {
        self.timestamps.push(sample.captured_at);
        self.voltage.push(sample.voltage);
        self.current.push(sample.current);
        self.charge_mah.push(update.charge_mah);
        self.energy_wh.push(update.energy_wh);
    }

    pub fn clear(&mut self) {
        self.timestamps.clear();
        self.voltage.clear();
        self.current.clear();
        self.charge_mah.clear();
        self.energy_wh.clear();
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn timestamps(&self) -> &[DateTime<Local>] {
        &self.timestamps
    }

    pub fn voltage(&self) -> &[f64] {
        &self.voltage
    }

    pub fn current(&self) -> &[f64] {
        &self.current
    }

    pub fn charge_mah(&self) -> &[f64] {
        &self.charge_mah
    }

    pub fn energy_wh(&self) -> &[f64] {
        &self.energy_wh
    }
}
