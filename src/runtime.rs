// Command-file daemon
// Polls a text file for one-shot commands (see `command::parse_command_file`),
// clears it, and runs the command on the chassis. Motion commands block for
// their whole hold, so they run via block_in_place to keep the runtime healthy.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::time::{MissedTickBehavior, interval, sleep};
use tracing::{debug, info, warn};

// local imports
use crate::chassis::{ChassisDriver, ChassisError, ServoBoard};
use crate::command::{DaemonRequest, SpeedRequest, parse_command_file};
use crate::config::{DAEMON_POLL, DAEMON_RETRY};

/// Apply the speed carried by a request, then run its command.
///
/// A rejected speed is logged and the command still runs at the current speed.
pub fn apply_request<B: ServoBoard>(
    driver: &mut ChassisDriver<B>,
    request: &DaemonRequest,
) -> Result<(), ChassisError> {
    match &request.speed {
        Some(SpeedRequest::Level(level)) => match driver.set_speed(*level) {
            Err(e) if e.is_recoverable() => {
                warn!("{}; running at speed {}", e, driver.speed_level())
            }
            other => other?,
        },
        Some(SpeedRequest::Unknown(name)) => {
            warn!("Unknown speed '{}', keeping speed {}", name, driver.speed_level())
        }
        None => {}
    }

    driver.execute(&request.command)
}

/// Poll `path` for commands until `abort` is set.
///
/// Rejected commands are logged and skipped; servo board faults end the loop.
pub async fn run_daemon<B: ServoBoard>(
    driver: &mut ChassisDriver<B>,
    path: &Path,
    abort: Arc<AtomicBool>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut tick = interval(DAEMON_POLL);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        "Daemon started: watching {} every {}ms",
        path.display(),
        DAEMON_POLL.as_millis()
    );

    while !abort.load(Ordering::Relaxed) {
        tick.tick().await;

        let text = match tokio::fs::read_to_string(path).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Can't read {}: {}; retrying", path.display(), e);
                sleep(DAEMON_RETRY).await;
                continue;
            }
        };

        if text.trim().is_empty() {
            continue;
        }

        // Each command is one-shot
        if let Err(e) = tokio::fs::write(path, b"").await {
            warn!("Failed to clear {}: {}", path.display(), e);
        }

        let request = match parse_command_file(&text) {
            Ok(Some(request)) => request,
            Ok(None) => continue,
            Err(e) => {
                warn!("Ignoring command file: {}", e);
                continue;
            }
        };

        info!("Received command: {:?}", request);
        match tokio::task::block_in_place(|| apply_request(driver, &request)) {
            Ok(()) => debug!("Command complete"),
            Err(e) if e.is_recoverable() => warn!("Command rejected: {}", e),
            Err(e) => return Err(e.into()),
        }
    }

    info!("Daemon shutting down cleanly");
    Ok(())
}

/// Resolve on Ctrl-C or SIGTERM
pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!("Can't install SIGTERM handler: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chassis::{BoardWrite, SimBoard};
    use crate::command::ChassisCommand;
    use crate::config::ChassisConfig;
    use std::time::Duration;

    fn driver() -> ChassisDriver<SimBoard> {
        let config = ChassisConfig {
            default_hold_secs: 0.0,
            hold_latency_secs: 0.0,
            ..ChassisConfig::default()
        };
        ChassisDriver::new(SimBoard::new(), &config).unwrap()
    }

    #[test]
    fn test_apply_request_sets_speed_first() {
        let mut driver = driver();
        let request = DaemonRequest {
            speed: Some(SpeedRequest::Level(3)),
            command: ChassisCommand::Forward { secs: Some(0.0) },
        };
        apply_request(&mut driver, &request).unwrap();

        assert_eq!(driver.speed_level(), 3);
        let writes = driver.board().writes();
        assert_eq!(
            writes[1],
            BoardWrite::Throttle {
                channel: 0,
                value: 0.110
            }
        );
    }

    #[test]
    fn test_apply_request_bad_speed_still_moves() {
        let mut driver = driver();
        for speed in [SpeedRequest::Level(42), SpeedRequest::Unknown("turbo".into())] {
            driver.board_mut().clear();
            let request = DaemonRequest {
                speed: Some(speed),
                command: ChassisCommand::Reverse { secs: None },
            };
            apply_request(&mut driver, &request).unwrap();

            assert_eq!(driver.speed_level(), 1);
            assert_eq!(driver.board().writes().len(), 4);
        }
    }

    #[test]
    fn test_apply_request_reports_camera_rejection() {
        let mut driver = driver();
        let request = DaemonRequest {
            speed: None,
            command: ChassisCommand::CameraAngle { degrees: 120.0 },
        };
        let err = apply_request(&mut driver, &request).unwrap_err();
        assert!(err.is_recoverable());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_daemon_consumes_command_file() {
        let path = std::env::temp_dir().join(format!("chassis-daemon-{}.cmd", std::process::id()));
        std::fs::write(&path, "yawccw\nmedium\n0\n").unwrap();

        let mut driver = driver();
        let abort = Arc::new(AtomicBool::new(false));

        let stopper = {
            let abort = abort.clone();
            let path = path.clone();
            async move {
                for _ in 0..100 {
                    sleep(Duration::from_millis(50)).await;
                    let done = std::fs::read_to_string(&path)
                        .map(|t| t.is_empty())
                        .unwrap_or(false);
                    if done {
                        break;
                    }
                }
                // let the daemon finish the command it just read
                sleep(Duration::from_millis(300)).await;
                abort.store(true, Ordering::Relaxed);
            }
        };

        let (result, ()) = tokio::join!(run_daemon(&mut driver, &path, abort.clone()), stopper);
        result.unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(driver.speed_level(), 2);
        assert!(driver.board().writes().contains(&BoardWrite::Throttle {
            channel: 0,
            value: -0.066
        }));
        assert_eq!(driver.board().throttle(0), Some(0.0));
        assert_eq!(driver.board().throttle(1), Some(0.0));
    }
}
