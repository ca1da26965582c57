use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use types::{DeviceSettings, TelemetryFrame};

use crate::{ClientError, DeviceLink, DeviceSession};

/// Parameters for the built-in battery model.
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub start_voltage_v: f64,
    /// Terminal voltage drop per mAh discharged.
    pub sag_v_per_mah: f64,
    pub ambient_temp_c: f64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            start_voltage_v: 12.6,
            sag_v_per_mah: 0.0005,
            ambient_temp_c: 25.0,
        }
    }
}

#[derive(Debug)]
struct SimState {
    config: SimConfig,
    enabled: bool,
    current_limit_a: f64,
    voltage_cutoff_v: f64,
    timer: Duration,
    charge_mah: f64,
    energy_wh: f64,
    on_time: Duration,
    last_step: Option<Instant>,
}

impl SimState {
    fn new(config: SimConfig) -> Self {
        Self {
            config,
            enabled: false,
            current_limit_a: 1.0,
            voltage_cutoff_v: 0.0,
            timer: Duration::ZERO,
            charge_mah: 0.0,
            energy_wh: 0.0,
            on_time: Duration::ZERO,
            last_step: None,
        }
    }

    /// Advances the model to `now`, integrating the elapsed discharge.
    fn step(&mut self, now: Instant) {
        let dt = match self.last_step {
            Some(prev) => now.duration_since(prev),
            None => Duration::ZERO,
        };
        self.last_step = Some(now);
        if !self.enabled {
            return;
        }

        let secs = dt.as_secs_f64();
        let voltage = self.voltage();
        self.charge_mah += self.current_limit_a * secs / 3.6;
        self.energy_wh += voltage * self.current_limit_a * secs / 3600.0;
        self.on_time += dt;

        // The real device trips itself off at the cutoff voltage and when
        // the discharge timer expires.
        if self.voltage() <= self.voltage_cutoff_v {
            self.enabled = false;
        }
        if self.timer > Duration::ZERO && self.on_time >= self.timer {
            self.enabled = false;
        }
    }

    fn voltage(&self) -> f64 {
        (self.config.start_voltage_v - self.config.sag_v_per_mah * self.charge_mah).max(0.0)
    }

    fn temperature(&self) -> f64 {
        let power = if self.enabled {
            self.voltage() * self.current_limit_a
        } else {
            0.0
        };
        self.config.ambient_temp_c + power * 0.8
    }
}

/// In-process stand-in for a real load: a battery under constant-current
/// discharge. Lets the whole pipeline run on a bench with no hardware.
#[derive(Clone)]
pub struct SimLink {
    state: Arc<Mutex<SimState>>,
}

impl SimLink {
    pub fn new(config: SimConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState::new(config))),
        }
    }
}

impl DeviceLink for SimLink {
    fn open(&self) -> Result<Box<dyn DeviceSession>, ClientError> {
        Ok(Box::new(SimSession {
            state: Arc::clone(&self.state),
        }))
    }
}

struct SimSession {
    state: Arc<Mutex<SimState>>,
}

impl SimSession {
    fn lock(&self) -> Result<MutexGuard<'_, SimState>, ClientError> {
        self.state
            .lock()
            .map_err(|_| ClientError::Task("sim state lock poisoned".to_string()))
    }
}

impl DeviceSession for SimSession {
    fn read_telemetry(&mut self) -> Result<TelemetryFrame, ClientError> {
        let mut state = self.lock()?;
        state.step(Instant::now());
        Ok(TelemetryFrame {
            voltage: state.voltage(),
            current: if state.enabled { state.current_limit_a } else { 0.0 },
            temperature: state.temperature(),
            energy_wh: state.energy_wh,
            charge_mah: state.charge_mah,
            on_time: state.on_time,
        })
    }

    fn read_settings(&mut self) -> Result<DeviceSettings, ClientError> {
        let state = self.lock()?;
        Ok(DeviceSettings {
            current_limit_a: state.current_limit_a,
            voltage_cutoff_v: state.voltage_cutoff_v,
            timer: state.timer,
        })
    }

    fn read_is_on(&mut self) -> Result<bool, ClientError> {
        Ok(self.lock()?.enabled)
    }

    fn set_current(&mut self, amps: f64) -> Result<(), ClientError> {
        let mut state = self.lock()?;
        state.step(Instant::now());
        state.current_limit_a = amps;
        Ok(())
    }

    fn set_voltage_cutoff(&mut self, volts: f64) -> Result<(), ClientError> {
        self.lock()?.voltage_cutoff_v = volts;
        Ok(())
    }

    fn set_timer(&mut self, limit: Duration) -> Result<(), ClientError> {
        self.lock()?.timer = limit;
        Ok(())
    }

    fn enable(&mut self) -> Result<(), ClientError> {
        let mut state = self.lock()?;
        state.step(Instant::now());
        state.enabled = true;
        Ok(())
    }

    fn disable(&mut self) -> Result<(), ClientError> {
        let mut state = self.lock()?;
        state.step(Instant::now());
        state.enabled = false;
        Ok(())
    }

    fn reset_counters(&mut self) -> Result<(), ClientError> {
        let mut state = self.lock()?;
        state.charge_mah = 0.0;
        state.energy_wh = 0.0;
        state.on_time = Duration::ZERO;
        Ok(())
    }
}
