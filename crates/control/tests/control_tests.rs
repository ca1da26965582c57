use std::sync::Arc;
use std::time::Duration;

use control::{parse_amps, parse_timer, parse_volts, CommandDispatcher, InputError};
use load_client::sim::{SimConfig, SimLink};
use load_client::{ClientConfig, ClientError, DeviceLink, DeviceSession, LoadClient};
use types::{DeviceSettings, LoadCommand, TelemetryFrame};

#[test]
fn timer_accepts_plain_seconds() {
    assert_eq!(parse_timer("90").expect("parse"), Duration::from_secs(90));
    assert_eq!(
        parse_timer("90.5").expect("parse"),
        Duration::from_secs_f64(90.5)
    );
}

#[test]
fn timer_accepts_colon_notation() {
    assert_eq!(
        parse_timer("0:01:30").expect("parse"),
        Duration::from_secs(90)
    );
    assert_eq!(
        parse_timer("2:00:00").expect("parse"),
        Duration::from_secs(7_200)
    );
}

#[test]
fn timer_rejects_garbage() {
    assert!(matches!(parse_timer("bad"), Err(InputError::InvalidTimer(_))));
    assert!(matches!(parse_timer("1:30"), Err(InputError::InvalidTimer(_))));
    assert!(matches!(parse_timer("-5"), Err(InputError::InvalidTimer(_))));
    assert!(matches!(parse_timer("1:xx:00"), Err(InputError::InvalidTimer(_))));
}

#[test]
fn numeric_inputs_are_validated() {
    assert_eq!(parse_amps("1.5").expect("parse"), 1.5);
    assert_eq!(parse_volts(" 9.0 ").expect("parse"), 9.0);
    assert!(matches!(parse_amps("abc"), Err(InputError::InvalidNumber(_))));
    assert!(matches!(parse_amps("-1"), Err(InputError::OutOfRange(_))));
    assert!(matches!(parse_volts("inf"), Err(InputError::OutOfRange(_))));
}

#[tokio::test]
async fn commands_execute_fifo_and_refresh_settings() {
    let link = Arc::new(SimLink::new(SimConfig::default()));
    let client = LoadClient::new(link, ClientConfig::default());
    let (mut dispatcher, queue, status_rx) = CommandDispatcher::new(client);

    queue.enqueue(LoadCommand::SetCurrent(1.5));
    queue.enqueue(LoadCommand::SetVoltageCutoff(9.0));
    queue.enqueue(LoadCommand::Enable);

    let executed = dispatcher.drain_and_execute().await;
    assert_eq!(
        executed,
        vec![
            LoadCommand::SetCurrent(1.5),
            LoadCommand::SetVoltageCutoff(9.0),
            LoadCommand::Enable,
        ]
    );

    let settings = dispatcher.settings().expect("settings mirror");
    assert_eq!(settings.current_limit_a, 1.5);
    assert_eq!(settings.voltage_cutoff_v, 9.0);
    assert_eq!(&*status_rx.borrow(), "load enabled");
}

#[tokio::test]
async fn empty_queue_drains_to_nothing() {
    let link = Arc::new(SimLink::new(SimConfig::default()));
    let client = LoadClient::new(link, ClientConfig::default());
    let (mut dispatcher, _queue, _status_rx) = CommandDispatcher::new(client);

    let executed = dispatcher.drain_and_execute().await;
    assert!(executed.is_empty());
    assert!(dispatcher.settings().is_none());
}

#[tokio::test]
async fn failing_command_is_skipped_not_fatal() {
    let link = Arc::new(FlakyLink);
    let client = LoadClient::new(link, ClientConfig::default());
    let (mut dispatcher, queue, status_rx) = CommandDispatcher::new(client);

    queue.enqueue(LoadCommand::SetCurrent(3.0));
    queue.enqueue(LoadCommand::Enable);

    let executed = dispatcher.drain_and_execute().await;
    assert_eq!(executed, vec![LoadCommand::Enable]);
    assert_eq!(&*status_rx.borrow(), "load enabled");
}

#[tokio::test]
async fn snapshot_and_reset_round_trip() {
    let link = Arc::new(SimLink::new(SimConfig::default()));
    let client = LoadClient::new(link, ClientConfig::default());
    let (mut dispatcher, queue, _status_rx) = CommandDispatcher::new(client);

    queue.enqueue(LoadCommand::ReadSnapshot);
    queue.enqueue(LoadCommand::ResetCounters);

    let executed = dispatcher.drain_and_execute().await;
    assert_eq!(executed.len(), 2);
    assert!(executed.contains(&LoadCommand::ResetCounters));
    // ReadSnapshot fills the settings mirror from its one-session dump.
    assert!(dispatcher.settings().is_some());
}

#[tokio::test]
async fn enqueue_after_dispatcher_drop_does_not_panic() {
    let link = Arc::new(SimLink::new(SimConfig::default()));
    let client = LoadClient::new(link, ClientConfig::default());
    let (dispatcher, queue, _status_rx) = CommandDispatcher::new(client);

    drop(dispatcher);
    queue.enqueue(LoadCommand::Enable);
}

/// Rejects configuration writes, accepts everything else.
struct FlakyLink;

struct FlakySession;

impl DeviceLink for FlakyLink {
    fn open(&self) -> Result<Box<dyn DeviceSession>, ClientError> {
        Ok(Box::new(FlakySession))
    }
}

impl DeviceSession for FlakySession {
    fn read_telemetry(&mut self) -> Result<TelemetryFrame, ClientError> {
        Ok(TelemetryFrame {
            voltage: 12.0,
            current: 0.0,
            temperature: 25.0,
            energy_wh: 0.0,
            charge_mah: 0.0,
            on_time: Duration::ZERO,
        })
    }

    fn read_settings(&mut self) -> Result<DeviceSettings, ClientError> {
        Ok(DeviceSettings {
            current_limit_a: 1.0,
            voltage_cutoff_v: 0.0,
            timer: Duration::ZERO,
        })
    }

    fn read_is_on(&mut self) -> Result<bool, ClientError> {
        Ok(false)
    }

    fn set_current(&mut self, _amps: f64) -> Result<(), ClientError> {
        Err(ClientError::MalformedReply("nak".to_string()))
    }

    fn set_voltage_cutoff(&mut self, _volts: f64) -> Result<(), ClientError> {
        Err(ClientError::MalformedReply("nak".to_string()))
    }

    fn set_timer(&mut self, _limit: Duration) -> Result<(), ClientError> {
        Err(ClientError::MalformedReply("nak".to_string()))
    }

    fn enable(&mut self) -> Result<(), ClientError> {
        Ok(())
    }

    fn disable(&mut self) -> Result<(), ClientError> {
        Ok(())
    }

    fn reset_counters(&mut self) -> Result<(), ClientError> {
        Ok(())
    }
}
