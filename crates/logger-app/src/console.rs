use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{info, warn};

use control::{parse_amps, parse_timer, parse_volts, CommandQueue, InputError};
use types::LoadCommand;

/// Minimal operator surface: one command per stdin line, enqueued for the
/// dispatcher to run on its next tick.
///
/// Commands: `set-current <A>`, `set-cutoff <V>`,
/// `set-timer <seconds|HH:MM:SS>`, `on`, `off`, `reset`, `read`.
pub async fn run(queue: CommandQueue, mut shutdown: watch::Receiver<bool>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                match line {
                    Ok(Some(line)) => {
                        let trimmed = line.trim();
                        if trimmed.is_empty() {
                            continue;
                        }
                        match parse_line(trimmed) {
                            Ok(command) => queue.enqueue(command),
                            Err(err) => warn!(input = %trimmed, error = %err, "command rejected"),
                        }
                    }
                    Ok(None) => {
                        info!("stdin closed, console stopped");
                        break;
                    }
                    Err(err) => {
                        warn!(error = %err, "stdin read failed");
                        break;
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    break;
                }
            }
        }
    }
}

pub fn parse_line(line: &str) -> Result<LoadCommand, InputError> {
    let (verb, rest) = match line.split_once(char::is_whitespace) {
        Some((verb, rest)) => (verb, rest.trim()),
        None => (line, ""),
    };
    match verb {
        "set-current" => Ok(LoadCommand::SetCurrent(parse_amps(rest)?)),
        "set-cutoff" => Ok(LoadCommand::SetVoltageCutoff(parse_volts(rest)?)),
        "set-timer" => Ok(LoadCommand::SetTimer(parse_timer(rest)?)),
        "on" | "enable" => Ok(LoadCommand::Enable),
        "off" | "disable" => Ok(LoadCommand::Disable),
        "reset" => Ok(LoadCommand::ResetCounters),
        "read" => Ok(LoadCommand::ReadSnapshot),
        other => Err(InputError::UnknownCommand(other.to_string())),
    }
}
