//! VahanaIO daemon
//!
//! ```text
//! vahana-io [--config <path> | <path>] [--command-port N] [--video-port N] [--interface IF]
//! ```
//!
//! Defaults to `/etc/vahana.toml`; a missing file means built-in defaults.
//! SIGINT/SIGTERM stop the server gracefully.

use clap::Parser;
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use vahana_io::devices::{create_camera, create_motor};
use vahana_io::motion::MotorController;
use vahana_io::{Config, Result, Server};

const DEFAULT_CONFIG: &str = "/etc/vahana.toml";

/// Command and video streaming daemon for a camera rover
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, conflicts_with = "path")]
    config: Option<PathBuf>,

    /// Configuration file path (positional form)
    path: Option<PathBuf>,

    /// Override the command channel port
    #[arg(long)]
    command_port: Option<u16>,

    /// Override the video channel port
    #[arg(long)]
    video_port: Option<u16>,

    /// Override the network interface whose address is bound
    #[arg(long)]
    interface: Option<String>,
}

impl Args {
    fn config_path(&self) -> PathBuf {
        self.config
            .clone()
            .or_else(|| self.path.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG))
    }

    fn apply(&self, config: &mut Config) {
        if let Some(port) = self.command_port {
            config.network.command_port = port;
        }
        if let Some(port) = self.video_port {
            config.network.video_port = port;
        }
        if let Some(interface) = &self.interface {
            config.network.interface = interface.clone();
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config_path = args.config_path();
    let loaded = Config::load_or_default(&config_path);

    let level = loaded
        .as_ref()
        .map(|c| c.logging.level.clone())
        .unwrap_or_else(|_| "info".to_string());
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    log::info!("VahanaIO v{} starting...", env!("CARGO_PKG_VERSION"));
    log::info!("Using config: {}", config_path.display());
    let mut config = loaded?;
    args.apply(&mut config);

    let camera = create_camera(&config.camera)?;
    let motor = match create_motor(&config.motor) {
        Ok(driver) => MotorController::new(driver),
        Err(e) => {
            log::error!("Motor initialization failed: {}", e);
            MotorController::disabled()
        }
    };

    let mut server = Server::bind(&config, camera, motor)?;
    server.start()?;

    let ctx = Arc::clone(server.context());
    let mut signals = Signals::new([SIGINT, SIGTERM])?;
    let signal_handle = signals.handle();
    thread::Builder::new()
        .name("signal-handler".to_string())
        .spawn(move || {
            if let Some(sig) = signals.forever().next() {
                log::info!("Received signal {}, initiating shutdown...", sig);
                ctx.shutdown();
            }
        })?;

    log::info!("VahanaIO running. Press Ctrl-C to stop.");
    while server.context().is_running() {
        thread::sleep(Duration::from_millis(100));
    }

    server.shutdown();
    signal_handle.close();
    log::info!("VahanaIO stopped");
    Ok(())
}
