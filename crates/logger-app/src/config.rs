use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use load_client::sim::SimConfig;
use load_client::ClientConfig;
use poller::ActorConfig;

const DEFAULT_BACKEND: &str = "sim";
const DEFAULT_DRAIN_INTERVAL_MS: u64 = 400;
const DEFAULT_CHANNEL_CAPACITY: usize = 256;
const DEFAULT_CSV_PATH: &str = "dl24-log.csv";

#[derive(Clone, Debug)]
pub struct LoggerConfig {
    /// Which `DeviceLink` the binary wires up; only "sim" ships here.
    pub backend: String,
    pub client: ClientConfig,
    pub sim: SimConfig,
    pub poller: ActorConfig,
    /// Consumer tick: command drain plus sample drain cadence.
    pub drain_interval_ms: u64,
    pub channel_capacity: usize,
    pub csv_path: String,
    pub csv_append: bool,
}

impl LoggerConfig {
    pub fn load() -> Result<Self> {
        Self::load_with_path(None)
    }

    pub fn load_with_path(config_path: Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(file_config) = load_file_config(config_path.as_deref())? {
            apply_file_config(&mut config, file_config);
        }

        apply_env_overrides(&mut config);
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.backend != DEFAULT_BACKEND {
            anyhow::bail!(
                "device.backend {:?} is not supported (a serial backend plugs in \
                 through the DeviceLink trait; this binary ships \"sim\")",
                self.backend
            );
        }
        if self.client.timeout_ms == 0 {
            anyhow::bail!("device.request_timeout_ms must be >= 1");
        }
        if self.poller.poll_interval.as_millis() == 0 {
            anyhow::bail!("poller.poll_interval_ms must be >= 1");
        }
        if self.poller.error_backoff.as_millis() == 0 {
            anyhow::bail!("poller.error_backoff_ms must be >= 1");
        }
        if self.drain_interval_ms == 0 {
            anyhow::bail!("consumer.drain_interval_ms must be >= 1");
        }
        if self.channel_capacity == 0 {
            anyhow::bail!("channel_capacity must be >= 1");
        }
        if self.csv_path.trim().is_empty() {
            anyhow::bail!("csv.path must be non-empty");
        }
        if self.sim.start_voltage_v <= 0.0 {
            anyhow::bail!("sim.start_voltage_v must be > 0");
        }
        if self.sim.sag_v_per_mah < 0.0 {
            anyhow::bail!("sim.sag_v_per_mah must be >= 0");
        }
        Ok(())
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            backend: DEFAULT_BACKEND.to_string(),
            client: ClientConfig::default(),
            sim: SimConfig::default(),
            poller: ActorConfig::default(),
            drain_interval_ms: DEFAULT_DRAIN_INTERVAL_MS,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            csv_path: DEFAULT_CSV_PATH.to_string(),
            csv_append: false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct FileConfig {
    device: Option<FileDeviceConfig>,
    sim: Option<FileSimConfig>,
    poller: Option<FilePollerConfig>,
    consumer: Option<FileConsumerConfig>,
    csv: Option<FileCsvConfig>,
    channel_capacity: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct FileDeviceConfig {
    backend: Option<String>,
    request_timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct FileSimConfig {
    start_voltage_v: Option<f64>,
    sag_v_per_mah: Option<f64>,
    ambient_temp_c: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct FilePollerConfig {
    poll_interval_ms: Option<u64>,
    error_backoff_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct FileConsumerConfig {
    drain_interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct FileCsvConfig {
    path: Option<String>,
    append: Option<bool>,
}

fn load_file_config(config_path: Option<&str>) -> Result<Option<FileConfig>> {
    let path = match config_path {
        Some(path) => path.to_string(),
        None => match env::var("DL24_CONFIG") {
            Ok(value) => value,
            Err(_) => return Ok(None),
        },
    };

    let content = fs::read_to_string(&path)
        .with_context(|| format!("read config file {path}"))?;
    let ext = Path::new(&path).extension().and_then(|value| value.to_str());

    let config = match ext {
        Some("json") => serde_json::from_str(&content).context("parse json config")?,
        _ => toml::from_str(&content).context("parse toml config")?,
    };

    Ok(Some(config))
}

fn apply_file_config(config: &mut LoggerConfig, file: FileConfig) {
    if let Some(device) = file.device {
        if let Some(backend) = device.backend {
            config.backend = backend;
        }
        if let Some(timeout_ms) = device.request_timeout_ms {
            config.client.timeout_ms = timeout_ms;
        }
    }

    if let Some(sim) = file.sim {
        if let Some(voltage) = sim.start_voltage_v {
            config.sim.start_voltage_v = voltage;
        }
        if let Some(sag) = sim.sag_v_per_mah {
            config.sim.sag_v_per_mah = sag;
        }
        if let Some(ambient) = sim.ambient_temp_c {
            config.sim.ambient_temp_c = ambient;
        }
    }

    if let Some(poller) = file.poller {
        if let Some(interval_ms) = poller.poll_interval_ms {
            config.poller.poll_interval = Duration::from_millis(interval_ms);
        }
        if let Some(backoff_ms) = poller.error_backoff_ms {
            config.poller.error_backoff = Duration::from_millis(backoff_ms);
        }
    }

    if let Some(consumer) = file.consumer {
        if let Some(interval_ms) = consumer.drain_interval_ms {
            config.drain_interval_ms = interval_ms;
        }
    }

    if let Some(csv) = file.csv {
        if let Some(path) = csv.path {
            config.csv_path = path;
        }
        if let Some(append) = csv.append {
            config.csv_append = append;
        }
    }

    if let Some(capacity) = file.channel_capacity {
        config.channel_capacity = capacity;
    }
}

fn apply_env_overrides(config: &mut LoggerConfig) {
    if let Ok(value) = env::var("DL24_BACKEND") {
        config.backend = value;
    }
    if let Some(timeout_ms) = parse_env_u64("DL24_REQUEST_TIMEOUT_MS") {
        config.client.timeout_ms = timeout_ms;
    }
    if let Some(interval_ms) = parse_env_u64("DL24_POLL_INTERVAL_MS") {
        config.poller.poll_interval = Duration::from_millis(interval_ms);
    }
    if let Some(backoff_ms) = parse_env_u64("DL24_ERROR_BACKOFF_MS") {
        config.poller.error_backoff = Duration::from_millis(backoff_ms);
    }
    if let Some(interval_ms) = parse_env_u64("DL24_DRAIN_INTERVAL_MS") {
        config.drain_interval_ms = interval_ms;
    }
    if let Ok(value) = env::var("DL24_CSV_PATH") {
        config.csv_path = value;
    }
    if let Some(append) = parse_env_bool("DL24_CSV_APPEND") {
        config.csv_append = append;
    }

    config.channel_capacity =
        parse_env_usize("DL24_CHANNEL_CAPACITY").unwrap_or(config.channel_capacity);
}

fn parse_env_u64(key: &str) -> Option<u64> {
    env::var(key).ok().and_then(|value| value.parse().ok())
}

fn parse_env_usize(key: &str) -> Option<usize> {
    env::var(key).ok().and_then(|value| value.parse().ok())
}

fn parse_env_bool(key: &str) -> Option<bool> {
    env::var(key).ok().and_then(|value| value.parse().ok())
}
