// Diagnostic and drive CLI for the omni base.
//
// scan  - enumerate responding servo IDs on the bus
// check - ping the three configured wheels and read back their velocity
// drive - run semantic motion steps through the command interface

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use omnibase_drive::bus::packet::{decode_sign_magnitude, Register};
use omnibase_drive::bus::{scanner, BusTransport};
use omnibase_drive::chassis::ChassisCommands;
use omnibase_drive::config::RobotConfig;

#[derive(Parser)]
#[command(
    name = "omnibase-drive",
    about = "Servo bus diagnostics and drive control for the omni base"
)]
struct Cli {
    /// JSON config file overriding the built-in defaults
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Serial port override
    #[arg(long)]
    port: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan the bus for responding servos
    Scan {
        /// Highest ID to probe
        #[arg(long)]
        max_id: Option<u8>,
    },
    /// Ping the configured wheels and read their present velocity
    Check,
    /// Execute motion steps (falls back to a simulated chassis when the bus
    /// is unreachable)
    Drive {
        direction: Direction,
        /// Number of repeated steps
        #[arg(default_value_t = 1)]
        steps: u32,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Direction {
    Forward,
    Backward,
    Left,
    Right,
    StrafeLeft,
    StrafeRight,
    Stop,
}

fn main() {
    // Setup logging (set RUST_LOG=info or debug)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    if let Err(e) = run() {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut cfg = match &cli.config {
        Some(path) => RobotConfig::load(path)?,
        None => RobotConfig::default(),
    };
    if let Some(port) = cli.port {
        cfg.port = port;
    }

    match cli.command {
        Command::Scan { max_id } => {
            let mut scan_cfg = cfg.scan.clone();
            if let Some(max_id) = max_id {
                scan_cfg.max_id = max_id;
            }

            let mut bus = BusTransport::open_with_retries(&cfg.port, cfg.baud, &cfg.retry)?;
            let found = scanner::scan(&mut bus, &scan_cfg)?;
            if found.is_empty() {
                println!("no servos found on {} (IDs 1-{})", cfg.port, scan_cfg.max_id);
            } else {
                println!("{} servo(s) on {}:", found.len(), cfg.port);
                for (id, model) in found {
                    println!("  ID {id}: model {model}");
                }
            }
        }
        Command::Check => {
            let mut bus = BusTransport::open_with_retries(&cfg.port, cfg.baud, &cfg.retry)?;
            for (role, id) in [
                ("right", cfg.wheels.right),
                ("front", cfg.wheels.front),
                ("left", cfg.wheels.left),
            ] {
                match scanner::ping(&mut bus, id, &cfg.scan)? {
                    Some(model) => {
                        let velocity =
                            scanner::read_register(&mut bus, id, Register::PresentVelocity, &cfg.scan)?
                                .map(decode_sign_magnitude);
                        match velocity {
                            Some(v) => println!("{role} wheel (ID {id}): model {model}, velocity {v}"),
                            None => println!("{role} wheel (ID {id}): model {model}, velocity unreadable"),
                        }
                    }
                    None => println!("{role} wheel (ID {id}): NO RESPONSE"),
                }
            }
        }
        Command::Drive { direction, steps } => {
            let mut commands = ChassisCommands::connect(&cfg);
            let outcome = match direction {
                Direction::Forward => commands.move_forward(steps),
                Direction::Backward => commands.move_backward(steps),
                Direction::Left => commands.turn_left(steps),
                Direction::Right => commands.turn_right(steps),
                Direction::StrafeLeft => commands.strafe_left(steps),
                Direction::StrafeRight => commands.strafe_right(steps),
                Direction::Stop => commands.stop(),
            };
            println!("{outcome}");
            commands.shutdown();
        }
    }

    Ok(())
}
