#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;
use tokio::task::spawn_blocking;
use tokio::time::timeout;
use tracing::debug;

use types::{DeviceSettings, DeviceSnapshot, TelemetryFrame};

pub mod sim;

/// Configuration options for talking to the load.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Per-operation timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self { timeout_ms: 1_000 }
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("device io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed device reply: {0}")]
    MalformedReply(String),
    #[error("request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("device task failed: {0}")]
    Task(String),
}

/// One short-lived conversation with the load. Implementations own the byte
/// protocol; everything here is plain blocking calls.
pub trait DeviceSession: Send {
    fn read_telemetry(&mut self) -> Result<TelemetryFrame, ClientError>;
    fn read_settings(&mut self) -> Result<DeviceSettings, ClientError>;
    fn read_is_on(&mut self) -> Result<bool, ClientError>;
    fn set_current(&mut self, amps: f64) -> Result<(), ClientError>;
    fn set_voltage_cutoff(&mut self, volts: f64) -> Result<(), ClientError>;
    fn set_timer(&mut self, limit: Duration) -> Result<(), ClientError>;
    fn enable(&mut self) -> Result<(), ClientError>;
    fn disable(&mut self) -> Result<(), ClientError>;
    fn reset_counters(&mut self) -> Result<(), ClientError>;
}

/// Opens a fresh session per operation. Reconnecting every time keeps a
/// flaky transport from wedging more than the one call that hit it.
pub trait DeviceLink: Send + Sync + 'static {
    fn open(&self) -> Result<Box<dyn DeviceSession>, ClientError>;
}

/// Serialized access to the single transport. Every operation holds the gate
/// for its full duration; polling and command execution contend on the same
/// mutex and can never overlap on the wire.
#[derive(Clone)]
pub struct LoadClient {
    link: Arc<dyn DeviceLink>,
    gate: Arc<Mutex<()>>,
    config: ClientConfig,
}

impl LoadClient {
    pub fn new(link: Arc<dyn DeviceLink>, config: ClientConfig) -> Self {
        Self {
            link,
            gate: Arc::new(Mutex::new(())),
            config,
        }
    }

    pub async fn read_telemetry(&self) -> Result<TelemetryFrame, ClientError> {
        let frame = self.with_session(|session| session.read_telemetry()).await?;
        debug!(voltage = frame.voltage, current = frame.current, "read_telemetry ok");
        Ok(frame)
    }

    pub async fn read_settings(&self) -> Result<DeviceSettings, ClientError> {
        self.with_session(|session| session.read_settings()).await
    }

    pub async fn read_is_on(&self) -> Result<bool, ClientError> {
        self.with_session(|session| session.read_is_on()).await
    }

    /// Full diagnostic read, all fields from one session.
    pub async fn read_snapshot(&self) -> Result<DeviceSnapshot, ClientError> {
        self.with_session(|session| {
            let is_on = session.read_is_on()?;
            let telemetry = session.read_telemetry()?;
            let settings = session.read_settings()?;
            Ok(DeviceSnapshot {
                is_on,
                telemetry,
                settings,
            })
        })
        .await
    }

    pub async fn set_current(&self, amps: f64) -> Result<(), ClientError> {
        self.with_session(move |session| session.set_current(amps)).await?;
        debug!(amps, "set_current ok");
        Ok(())
    }

    pub async fn set_voltage_cutoff(&self, volts: f64) -> Result<(), ClientError> {
        self.with_session(move |session| session.set_voltage_cutoff(volts)).await?;
        debug!(volts, "set_voltage_cutoff ok");
        Ok(())
    }

    pub async fn set_timer(&self, limit: Duration) -> Result<(), ClientError> {
        self.with_session(move |session| session.set_timer(limit)).await?;
        debug!(seconds = limit.as_secs(), "set_timer ok");
        Ok(())
    }

    pub async fn enable(&self) -> Result<(), ClientError> {
        self.with_session(|session| session.enable()).await
    }

    pub async fn disable(&self) -> Result<(), ClientError> {
        self.with_session(|session| session.disable()).await
    }

    pub async fn reset_counters(&self) -> Result<(), ClientError> {
        self.with_session(|session| session.reset_counters()).await
    }

    /// Runs one operation against a fresh session on the blocking pool.
    ///
    /// The gate guard moves into the blocking closure, so a timed-out
    /// operation keeps the gate until the wedged call actually returns; the
    /// timeout bounds the caller's wait, never the mutual exclusion.
    async fn with_session<T, F>(&self, op: F) -> Result<T, ClientError>
    where
        T: Send + 'static,
        F: FnOnce(&mut dyn DeviceSession) -> Result<T, ClientError> + Send + 'static,
    {
        let guard = Arc::clone(&self.gate).lock_owned().await;
        let link = Arc::clone(&self.link);
        let task = spawn_blocking(move || {
            let _held = guard;
            let mut session = link.open()?;
            op(session.as_mut())
        });

        match timeout(Duration::from_millis(self.config.timeout_ms), task).await {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => Err(ClientError::Task(err.to_string())),
            Err(_) => Err(ClientError::Timeout {
                timeout_ms: self.config.timeout_ms,
            }),
        }
    }
}
