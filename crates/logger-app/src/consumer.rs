use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::sleep;
use tracing::{info, warn};

use control::CommandDispatcher;
use integrator::{IntegrationEngine, SessionSeries};
use types::{LoadCommand, TelemetrySample};

/// Foreground half of the pipeline. One tick = run queued commands, then
/// drain every sample the poller produced since the last tick. The tick
/// cadence is independent of the poll cadence.
pub async fn run(
    mut samples: mpsc::Receiver<TelemetrySample>,
    mut dispatcher: CommandDispatcher,
    mut shutdown: watch::Receiver<bool>,
    drain_interval: Duration,
) {
    let mut engine = IntegrationEngine::new();
    let mut series = SessionSeries::default();

    loop {
        tokio::select! {
            _ = sleep(drain_interval) => {
                tick(&mut samples, &mut dispatcher, &mut engine, &mut series).await;
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    info!(points = series.len(), "consumer stopped");
                    break;
                }
            }
        }
    }
}

async fn tick(
    samples: &mut mpsc::Receiver<TelemetrySample>,
    dispatcher: &mut CommandDispatcher,
    engine: &mut IntegrationEngine,
    series: &mut SessionSeries,
) {
    let executed = dispatcher.drain_and_execute().await;
    if executed
        .iter()
        .any(|command| matches!(command, LoadCommand::ResetCounters))
    {
        engine.reset();
        series.clear();
        info!("integration state and session series cleared");
    }

    while let Ok(sample) = samples.try_recv() {
        let update = engine.consume(&sample);
        for warning in &update.warnings {
            warn!(warning = %warning, "integration drift");
        }
        info!(
            voltage_v = sample.voltage,
            current_a = sample.current,
            power_w = sample.power(),
            energy_wh = update.energy_wh,
            charge_mah = update.charge_mah,
            temperature_c = sample.temperature,
            "telemetry"
        );
        series.push(&sample, &update);
    }
}
