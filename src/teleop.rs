// Keyboard teleop: W/S drive, A/D yaw, J/L pan camera, K centre camera, 1-9 speed, Q quit
//
// Every key runs one complete timed command, so keys pressed during a motion
// are discarded rather than queued up.

use std::time::Duration;

use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode},
};
use tracing::warn;

use crate::chassis::{ChassisDriver, ServoBoard, SpeedLevel};
use crate::command::ChassisCommand;

const POLL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, PartialEq)]
pub enum TeleopAction {
    Command(ChassisCommand),
    Quit,
}

/// Map a key to an action, `None` for unbound keys
pub fn key_action(code: KeyCode) -> Option<TeleopAction> {
    let command = match code {
        KeyCode::Char('w') | KeyCode::Up => ChassisCommand::Forward { secs: None },
        KeyCode::Char('s') | KeyCode::Down => ChassisCommand::Reverse { secs: None },
        KeyCode::Char('a') | KeyCode::Left => ChassisCommand::Yaw {
            clockwise: false,
            secs: None,
        },
        KeyCode::Char('d') | KeyCode::Right => ChassisCommand::Yaw {
            clockwise: true,
            secs: None,
        },
        KeyCode::Char('j') => ChassisCommand::PanCamera {
            clockwise: false,
            increment: None,
        },
        KeyCode::Char('l') => ChassisCommand::PanCamera {
            clockwise: true,
            increment: None,
        },
        KeyCode::Char('k') => ChassisCommand::ResetCamera,
        KeyCode::Char(' ') => ChassisCommand::Stop,
        KeyCode::Char(c @ '1'..='9') => ChassisCommand::SetSpeed {
            level: c.to_digit(10)? as SpeedLevel,
        },
        KeyCode::Char('q') | KeyCode::Esc => return Some(TeleopAction::Quit),
        _ => return None,
    };
    Some(TeleopAction::Command(command))
}

/// Run teleop until Q/Esc; the terminal is restored on every exit path
pub fn run_teleop<B: ServoBoard>(
    driver: &mut ChassisDriver<B>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    print!("Controls: W/S drive, A/D yaw, J/L camera, K centre, 1-9 speed, space stop, Q quit\r\n");

    enable_raw_mode()?;
    let result = teleop_loop(driver);
    disable_raw_mode()?;

    result
}

fn teleop_loop<B: ServoBoard>(
    driver: &mut ChassisDriver<B>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    loop {
        if !event::poll(POLL)? {
            continue;
        }
        let Event::Key(KeyEvent { code, kind, .. }) = event::read()? else {
            continue;
        };
        if kind != KeyEventKind::Press {
            continue;
        }

        match key_action(code) {
            Some(TeleopAction::Quit) => return Ok(()),
            Some(TeleopAction::Command(command)) => {
                match driver.execute(&command) {
                    Ok(()) => print!(
                        "speed {} | camera {}°\r\n",
                        driver.speed_level(),
                        driver.camera_angle()
                    ),
                    Err(e) if e.is_recoverable() => print!("rejected: {}\r\n", e),
                    Err(e) => {
                        warn!("Teleop stopping: {}", e);
                        return Err(e.into());
                    }
                }
                // Drop keys pressed while the command ran
                while event::poll(Duration::ZERO)? {
                    event::read()?;
                }
            }
            None => {}
        }
    }
}
