// Line-oriented interactive console for manual testing

use std::io::{BufRead, Write};

use tracing::warn;

use crate::chassis::{ChassisDriver, ServoBoard};
use crate::command::{CONSOLE_HELP, ConsoleInput, parse_console_line};

const PROMPT: &str = "chassis> ";

/// Run a single console command, e.g. `cam angle 45`, and release the driver.
///
/// Drive commands always end with the wheels stopped, so the driver is not
/// parked afterwards and the camera stays where the command left it.
pub fn run_once<B: ServoBoard>(
    mut driver: ChassisDriver<B>,
    line: &str,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    driver.set_park_on_drop(false);
    match parse_console_line(line)? {
        ConsoleInput::Command(command) => Ok(driver.execute(&command)?),
        _ => Err(format!("'{}' is not a chassis command", line.trim()).into()),
    }
}

/// Read commands from `input` until `quit` or end of input.
///
/// Parse errors and rejected commands are reported on `output` and the console
/// keeps going; a servo board fault ends it.
pub fn run_console<B: ServoBoard>(
    driver: &mut ChassisDriver<B>,
    input: impl BufRead,
    mut output: impl Write,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    writeln!(output, "Chassis console, type 'help' for commands")?;
    write!(output, "{}", PROMPT)?;
    output.flush()?;

    for line in input.lines() {
        let line = line?;
        match parse_console_line(&line) {
            Ok(ConsoleInput::Quit) => break,
            Ok(ConsoleInput::Help) => writeln!(output, "{}", CONSOLE_HELP)?,
            Ok(ConsoleInput::Empty) => {}
            Ok(ConsoleInput::Command(command)) => match driver.execute(&command) {
                Ok(()) => writeln!(
                    output,
                    "ok (speed {}, camera {}°)",
                    driver.speed_level(),
                    driver.camera_angle()
                )?,
                Err(e) if e.is_recoverable() => writeln!(output, "rejected: {}", e)?,
                Err(e) => {
                    warn!("Console stopping: {}", e);
                    return Err(e.into());
                }
            },
            Err(e) => writeln!(output, "error: {}", e)?,
        }
        write!(output, "{}", PROMPT)?;
        output.flush()?;
    }

    writeln!(output)?;
    Ok(())
}
