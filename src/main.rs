use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use boe_chassis::chassis::{ChassisDriver, Pca9685Board, ServoBoard, SimBoard};
use boe_chassis::config::ChassisConfig;
use boe_chassis::{console, runtime, teleop};

#[derive(Parser, Debug)]
#[command(author, version, about = "Two-wheel servo chassis controller", long_about = None)]
struct Args {
    /// JSON config file (channels, timings, calibration table)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log servo writes instead of driving the PWM board
    #[arg(long, global = true, default_value_t = false)]
    simulate: bool,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Interactive line console
    Console,
    /// Keyboard teleop
    Teleop,
    /// Watch a command file and run each command written to it
    Daemon {
        /// Command file to poll
        file: PathBuf,
    },
    /// Run a single console command, e.g. `run forward 2`
    Run {
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        words: Vec<String>,
    },
}

fn open_board(
    config: &ChassisConfig,
    simulate: bool,
) -> Result<Box<dyn ServoBoard>, Box<dyn std::error::Error + Send + Sync>> {
    if simulate {
        info!("Simulation mode: no servo board writes");
        Ok(Box::new(SimBoard::log_only()))
    } else {
        Ok(Box::new(Pca9685Board::open(config)?))
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let config = match &args.config {
        Some(path) => {
            info!("Loading config from {}", path.display());
            ChassisConfig::load(path)?
        }
        None => ChassisConfig::default(),
    };

    let board = open_board(&config, args.simulate)?;
    let mut driver = ChassisDriver::new(board, &config)?;

    match args.mode {
        Mode::Console => {
            let stdin = std::io::stdin();
            console::run_console(&mut driver, stdin.lock(), std::io::stdout())
        }
        Mode::Teleop => teleop::run_teleop(&mut driver),
        Mode::Daemon { file } => {
            let abort = Arc::new(AtomicBool::new(false));
            let mut driver = driver.with_abort_flag(abort.clone());

            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(async {
                let signal_flag = abort.clone();
                tokio::spawn(async move {
                    runtime::shutdown_signal().await;
                    info!("Shutdown requested");
                    signal_flag.store(true, Ordering::Relaxed);
                });
                runtime::run_daemon(&mut driver, &file, abort).await
            })
        }
        Mode::Run { words } => console::run_once(driver, &words.join(" ")),
    }
}

fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    if let Err(e) = run(args) {
        eprintln!("Chassis error: {}", e);
        std::process::exit(1);
    }
}
