#![allow(dead_code)]

use std::fs::{File, OpenOptions};
use std::path::Path;

use thiserror::Error;
use tracing::{info, warn};

use types::{format_on_time, TelemetrySample};

/// Column order is fixed; downstream tooling keys on it.
const HEADER: [&str; 9] = [
    "date",
    "voltage",
    "current",
    "power",
    "device_energy",
    "device_charge",
    "temperature",
    "time_seconds",
    "time_string",
];

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("recorder is not open")]
    NotOpen,
}

/// CSV sink for the telemetry log; one row per sample, flushed per row.
#[derive(Default)]
pub struct CsvRecorder {
    writer: Option<csv::Writer<File>>,
}

impl CsvRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens the target file. A fresh or truncated file gets the header row;
    /// appending to an existing file never rewrites it.
    pub fn open(&mut self, path: &Path, append: bool) -> Result<(), RecorderError> {
        let exists = path.exists();
        let (file, fresh) = if append && exists {
            (OpenOptions::new().append(true).open(path)?, false)
        } else {
            (File::create(path)?, true)
        };

        let mut writer = csv::Writer::from_writer(file);
        if fresh {
            writer.write_record(HEADER)?;
            writer.flush()?;
        }
        info!(path = %path.display(), append, fresh, "csv recorder opened");
        self.writer = Some(writer);
        Ok(())
    }

    /// Writes one row and flushes it, so a crash loses at most the row in
    /// flight.
    pub fn append(&mut self, sample: &TelemetrySample) -> Result<(), RecorderError> {
        let writer = self.writer.as_mut().ok_or(RecorderError::NotOpen)?;
        writer.write_record(row(sample))?;
        writer.flush()?;
        Ok(())
    }

    /// Idempotent; safe to call when `open` never succeeded.
    pub fn close(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            if let Err(err) = writer.flush() {
                warn!(error = %err, "csv flush on close failed");
            }
        }
    }
}

fn row(sample: &TelemetrySample) -> [String; 9] {
    [
        sample.captured_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        format!("{:.3}", sample.voltage),
        format!("{:.3}", sample.current),
        format!("{:.2}", sample.power()),
        format!("{:.3}", sample.energy_wh),
        format!("{:.1}", sample.charge_mah),
        format!("{:.0}", sample.temperature),
        sample.on_time.as_secs().to_string(),
        format_on_time(sample.on_time),
    ]
}
