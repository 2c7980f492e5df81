// Command types for the chassis, and the text formats they arrive in:
// console lines, the daemon's three-line command file, and JSON.

use serde::{Deserialize, Serialize};

use crate::chassis::SpeedLevel;

/// Offset between the camera servo's own frame (0..180) and the signed chassis frame
pub const SERVO_CENTER_DEG: f64 = 90.0;

/// A single motion request
// tagged JSON, e.g. {"cmd": "forward", "secs": 2.0}
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum ChassisCommand {
    SetSpeed {
        level: SpeedLevel,
    },
    Forward {
        #[serde(default)]
        secs: Option<f64>,
    },
    Reverse {
        #[serde(default)]
        secs: Option<f64>,
    },
    Yaw {
        #[serde(default = "default_clockwise")]
        clockwise: bool,
        #[serde(default)]
        secs: Option<f64>,
    },
    /// Absolute camera angle, signed chassis frame
    CameraAngle {
        degrees: f64,
    },
    PanCamera {
        #[serde(default = "default_clockwise")]
        clockwise: bool,
        #[serde(default)]
        increment: Option<f64>,
    },
    ResetCamera,
    Stop,
}

fn default_clockwise() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CommandError {
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("missing argument for '{0}'")]
    MissingArgument(&'static str),

    #[error("'{0}' is not a number")]
    InvalidNumber(String),

    #[error("'{0}' is not a valid speed level")]
    InvalidSpeedLevel(String),

    #[error("unexpected argument '{0}'")]
    UnexpectedArgument(String),

    #[error("invalid JSON command: {0}")]
    Json(String),
}

fn parse_number(word: &str) -> Result<f64, CommandError> {
    word.parse::<f64>()
        .map_err(|_| CommandError::InvalidNumber(word.to_string()))
}

fn parse_level(word: &str) -> Result<SpeedLevel, CommandError> {
    let level = word
        .parse::<i64>()
        .map_err(|_| CommandError::InvalidNumber(word.to_string()))?;
    SpeedLevel::try_from(level).map_err(|_| CommandError::InvalidSpeedLevel(word.to_string()))
}

fn parse_direction(word: &str) -> Option<bool> {
    match word {
        "cw" | "right" | "clockwise" => Some(true),
        "ccw" | "left" | "counterclockwise" => Some(false),
        _ => None,
    }
}

/// Leading `cw`/`ccw` word, if any; clockwise when absent
fn split_direction<'a, 'b>(args: &'a [&'b str]) -> (bool, &'a [&'b str]) {
    match args.split_first() {
        Some((word, rest)) => match parse_direction(word) {
            Some(clockwise) => (clockwise, rest),
            None => (true, args),
        },
        None => (true, args),
    }
}

/// At most one trailing number
fn optional_number(args: &[&str]) -> Result<Option<f64>, CommandError> {
    match args {
        [] => Ok(None),
        [value] => parse_number(value).map(Some),
        [_, extra, ..] => Err(CommandError::UnexpectedArgument(extra.to_string())),
    }
}

/// One line typed at the interactive console
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleInput {
    Command(ChassisCommand),
    Help,
    Quit,
    Empty,
}

pub const CONSOLE_HELP: &str = "\
commands:
  speed N                 select calibrated speed level N
  forward [secs]          drive forward
  reverse [secs]          drive backward
  yaw [cw|ccw] [secs]     spin in place (default cw)
  cam [left|right] [deg]  pan the camera by an increment (default right)
  cam angle DEG           point the camera at DEG (-90 right .. 90 left)
  cam reset               point the camera straight ahead
  stop                    stop both wheels
  help                    show this text
  quit                    leave the console";

/// Parse a console line such as `forward 2`, `yaw ccw 1.5` or `cam left 30`
pub fn parse_console_line(line: &str) -> Result<ConsoleInput, CommandError> {
    let lowered = line.trim().to_lowercase();
    let mut words = lowered.split_whitespace();

    let Some(head) = words.next() else {
        return Ok(ConsoleInput::Empty);
    };
    let rest: Vec<&str> = words.collect();

    let command = match head {
        "help" | "?" => return Ok(ConsoleInput::Help),
        "quit" | "exit" | "q" => return Ok(ConsoleInput::Quit),
        "speed" => match rest.as_slice() {
            [] => return Err(CommandError::MissingArgument("speed")),
            [level] => ChassisCommand::SetSpeed {
                level: parse_level(level)?,
            },
            [_, extra, ..] => return Err(CommandError::UnexpectedArgument(extra.to_string())),
        },
        "forward" | "fwd" => ChassisCommand::Forward {
            secs: optional_number(&rest)?,
        },
        "reverse" | "rev" => ChassisCommand::Reverse {
            secs: optional_number(&rest)?,
        },
        "yaw" => {
            let (clockwise, args) = split_direction(&rest);
            ChassisCommand::Yaw {
                clockwise,
                secs: optional_number(args)?,
            }
        }
        "cam" | "camera" => match rest.as_slice() {
            ["reset"] => ChassisCommand::ResetCamera,
            ["angle"] => return Err(CommandError::MissingArgument("cam angle")),
            ["angle", degrees] => ChassisCommand::CameraAngle {
                degrees: parse_number(degrees)?,
            },
            _ => {
                let (clockwise, args) = split_direction(&rest);
                ChassisCommand::PanCamera {
                    clockwise,
                    increment: optional_number(args)?,
                }
            }
        },
        "stop" => ChassisCommand::Stop,
        other => return Err(CommandError::UnknownCommand(other.to_string())),
    };

    Ok(ConsoleInput::Command(command))
}

/// Speed selection carried by the daemon command file
#[derive(Debug, Clone, PartialEq)]
pub enum SpeedRequest {
    Level(SpeedLevel),
    /// A name the daemon does not know; the current speed is kept
    Unknown(String),
}

/// One command read from the daemon's command file
#[derive(Debug, Clone, PartialEq)]
pub struct DaemonRequest {
    pub speed: Option<SpeedRequest>,
    pub command: ChassisCommand,
}

fn parse_speed_name(word: &str) -> SpeedRequest {
    match word {
        "low" => SpeedRequest::Level(1),
        "medium" => SpeedRequest::Level(2),
        "high" => SpeedRequest::Level(3),
        other => match other.parse::<SpeedLevel>() {
            Ok(level) => SpeedRequest::Level(level),
            Err(_) => SpeedRequest::Unknown(other.to_string()),
        },
    }
}

/// Parse the daemon command file.
///
/// Line 1 is the command (`forward`, `reverse`, `yawcw`, `yawccw`, `camangle`),
/// line 2 an optional speed (`low`, `medium`, `high` or a level number) and
/// line 3 an optional number: the hold in seconds, or for `camangle` the servo
/// angle 0..180. A file starting with `{` holds a JSON `ChassisCommand`.
/// Returns `Ok(None)` when there is nothing to do.
pub fn parse_command_file(text: &str) -> Result<Option<DaemonRequest>, CommandError> {
    let trimmed = text.trim_start();
    if trimmed.starts_with('{') {
        let command = serde_json::from_str::<ChassisCommand>(trimmed)
            .map_err(|e| CommandError::Json(e.to_string()))?;
        return Ok(Some(DaemonRequest {
            speed: None,
            command,
        }));
    }

    let mut lines = text.lines().map(str::trim);
    let command_line = lines.next().unwrap_or("").to_lowercase();
    let speed_line = lines.next().unwrap_or("").to_lowercase();
    let number_line = lines.next().unwrap_or("");

    if command_line.is_empty() {
        return Ok(None);
    }

    let number = if number_line.is_empty() {
        None
    } else {
        Some(parse_number(number_line)?)
    };

    let command = match command_line.as_str() {
        "forward" => ChassisCommand::Forward { secs: number },
        "reverse" => ChassisCommand::Reverse { secs: number },
        "yawcw" => ChassisCommand::Yaw {
            clockwise: true,
            secs: number,
        },
        "yawccw" => ChassisCommand::Yaw {
            clockwise: false,
            secs: number,
        },
        "camangle" => {
            let servo_deg = number.ok_or(CommandError::MissingArgument("camangle"))?;
            ChassisCommand::CameraAngle {
                degrees: servo_deg - SERVO_CENTER_DEG,
            }
        }
        "camreset" => ChassisCommand::ResetCamera,
        "stop" => ChassisCommand::Stop,
        other => return Err(CommandError::UnknownCommand(other.to_string())),
    };

    let speed = match command {
        ChassisCommand::CameraAngle { .. } | ChassisCommand::ResetCamera => None,
        _ if speed_line.is_empty() => None,
        _ => Some(parse_speed_name(&speed_line)),
    };

    Ok(Some(DaemonRequest { speed, command }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn console(line: &str) -> ChassisCommand {
        match parse_console_line(line).unwrap() {
            ConsoleInput::Command(cmd) => cmd,
            other => panic!("expected a command for '{}', got {:?}", line, other),
        }
    }

    #[test]
    fn test_console_drive_commands() {
        assert_eq!(console("forward"), ChassisCommand::Forward { secs: None });
        assert_eq!(console("FORWARD 2"), ChassisCommand::Forward { secs: Some(2.0) });
        assert_eq!(console("rev 0.5"), ChassisCommand::Reverse { secs: Some(0.5) });
        assert_eq!(console("speed 3"), ChassisCommand::SetSpeed { level: 3 });
        assert_eq!(console("stop"), ChassisCommand::Stop);
    }

    #[test]
    fn test_console_yaw() {
        assert_eq!(
            console("yaw"),
            ChassisCommand::Yaw {
                clockwise: true,
                secs: None
            }
        );
        assert_eq!(
            console("yaw ccw 10"),
            ChassisCommand::Yaw {
                clockwise: false,
                secs: Some(10.0)
            }
        );
        assert_eq!(
            console("yaw 1.5"),
            ChassisCommand::Yaw {
                clockwise: true,
                secs: Some(1.5)
            }
        );
    }

    #[test]
    fn test_console_camera() {
        assert_eq!(
            console("cam"),
            ChassisCommand::PanCamera {
                clockwise: true,
                increment: None
            }
        );
        assert_eq!(
            console("cam left 90"),
            ChassisCommand::PanCamera {
                clockwise: false,
                increment: Some(90.0)
            }
        );
        assert_eq!(console("cam reset"), ChassisCommand::ResetCamera);
        assert_eq!(
            console("camera angle -45"),
            ChassisCommand::CameraAngle { degrees: -45.0 }
        );
    }

    #[test]
    fn test_console_meta() {
        assert_eq!(parse_console_line("   ").unwrap(), ConsoleInput::Empty);
        assert_eq!(parse_console_line("help").unwrap(), ConsoleInput::Help);
        assert_eq!(parse_console_line("quit").unwrap(), ConsoleInput::Quit);
    }

    #[test]
    fn test_console_errors() {
        assert_eq!(
            parse_console_line("jump"),
            Err(CommandError::UnknownCommand("jump".to_string()))
        );
        assert_eq!(
            parse_console_line("speed"),
            Err(CommandError::MissingArgument("speed"))
        );
        assert_eq!(
            parse_console_line("speed fast"),
            Err(CommandError::InvalidNumber("fast".to_string()))
        );
        assert_eq!(
            parse_console_line("speed 300"),
            Err(CommandError::InvalidSpeedLevel("300".to_string()))
        );
        assert_eq!(
            parse_console_line("speed -1").unwrap_err().to_string(),
            "'-1' is not a valid speed level"
        );
        // Uncalibrated but in range: left for the driver to reject
        assert_eq!(
            parse_console_line("speed 7").unwrap(),
            ConsoleInput::Command(ChassisCommand::SetSpeed { level: 7 })
        );
        assert_eq!(
            parse_console_line("forward 1 2"),
            Err(CommandError::UnexpectedArgument("2".to_string()))
        );
        assert!(parse_console_line("cam angle").is_err());
    }

    #[test]
    fn test_command_file_drive() {
        let req = parse_command_file("forward\nhigh\n2.5\n").unwrap().unwrap();
        assert_eq!(req.speed, Some(SpeedRequest::Level(3)));
        assert_eq!(req.command, ChassisCommand::Forward { secs: Some(2.5) });

        let req = parse_command_file("  YawCCW \r\nlow\r\n1\r\n").unwrap().unwrap();
        assert_eq!(req.speed, Some(SpeedRequest::Level(1)));
        assert_eq!(
            req.command,
            ChassisCommand::Yaw {
                clockwise: false,
                secs: Some(1.0)
            }
        );
    }

    #[test]
    fn test_command_file_optional_lines() {
        let req = parse_command_file("reverse\n").unwrap().unwrap();
        assert_eq!(req.speed, None);
        assert_eq!(req.command, ChassisCommand::Reverse { secs: None });

        let req = parse_command_file("yawcw\nturbo\n").unwrap().unwrap();
        assert_eq!(req.speed, Some(SpeedRequest::Unknown("turbo".to_string())));

        let req = parse_command_file("forward\n2\n").unwrap().unwrap();
        assert_eq!(req.speed, Some(SpeedRequest::Level(2)));
    }

    #[test]
    fn test_command_file_camangle_uses_servo_frame() {
        let req = parse_command_file("camangle\n\n180\n").unwrap().unwrap();
        assert_eq!(req.command, ChassisCommand::CameraAngle { degrees: 90.0 });
        assert_eq!(req.speed, None);

        let req = parse_command_file("camangle\n\n0").unwrap().unwrap();
        assert_eq!(req.command, ChassisCommand::CameraAngle { degrees: -90.0 });

        assert_eq!(
            parse_command_file("camangle\n"),
            Err(CommandError::MissingArgument("camangle"))
        );
    }

    #[test]
    fn test_command_file_empty_and_errors() {
        assert_eq!(parse_command_file("").unwrap(), None);
        assert_eq!(parse_command_file("\n\n\n").unwrap(), None);
        assert_eq!(
            parse_command_file("dance\n"),
            Err(CommandError::UnknownCommand("dance".to_string()))
        );
        assert_eq!(
            parse_command_file("forward\nlow\nsoon\n"),
            Err(CommandError::InvalidNumber("soon".to_string()))
        );
    }

    #[test]
    fn test_command_file_json() {
        let req = parse_command_file(r#"{"cmd": "pan_camera", "clockwise": false, "increment": 45}"#)
            .unwrap()
            .unwrap();
        assert_eq!(
            req.command,
            ChassisCommand::PanCamera {
                clockwise: false,
                increment: Some(45.0)
            }
        );

        let req = parse_command_file(r#"{"cmd": "yaw"}"#).unwrap().unwrap();
        assert_eq!(
            req.command,
            ChassisCommand::Yaw {
                clockwise: true,
                secs: None
            }
        );

        assert!(matches!(
            parse_command_file(r#"{"cmd": "fly"}"#),
            Err(CommandError::Json(_))
        ));
    }
}
