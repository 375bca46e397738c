//! Wheel wiring check for a VahanaIO rover
//!
//! Opens the motor backend from the daemon's config and drives each
//! direction in turn. Keep the rover off the ground.
//!
//! ```text
//! motor-check --config /etc/vahana.toml --speed 1500 --hold-ms 1000
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use vahana_io::devices::create_motor;
use vahana_io::motion::{DEFAULT_SPEED, MotorController};
use vahana_io::{Config, Result};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "/etc/vahana.toml")]
    config: PathBuf,

    /// Duty applied to every wheel (0-4095)
    #[arg(short, long, default_value_t = DEFAULT_SPEED)]
    speed: i32,

    /// How long each direction is held
    #[arg(long, default_value_t = 2000)]
    hold_ms: u64,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = Config::load_or_default(&args.config)?;
    log::info!("Opening {:?} motor backend", config.motor.backend);
    let mut motor = MotorController::new(create_motor(&config.motor)?);

    let result = motor.exercise(args.speed, Duration::from_millis(args.hold_ms));
    motor.close()?;
    result?;

    log::info!("Motor check complete");
    Ok(())
}
