//! Server orchestration
//!
//! Binds both channels, wires the shared context, the command queue and the
//! drivers together, and owns the long-running threads:
//!
//! | Thread | Role |
//! |--------|------|
//! | `command-accept` | command channel accept loop, spawns `cmd-rx-<port>` readers |
//! | `video-accept` | video channel accept loop |
//! | `dispatcher` | executes queued commands |
//! | `video-broadcast` | started by `STREAM#START`, see [`VideoPipeline`] |

use crate::command::CommandDispatcher;
use crate::config::Config;
use crate::context::ServerContext;
use crate::core::driver::CameraDriver;
use crate::core::types::ChannelKind;
use crate::error::Result;
use crate::motion::MotorController;
use crate::net;
use crate::streaming::{ChannelListener, CommandServer, VideoPipeline, VideoServer};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Loops built by [`Server::bind`] and moved onto threads by [`Server::start`]
struct Pending {
    command: CommandServer,
    video: VideoServer,
    dispatcher: CommandDispatcher,
}

pub struct Server {
    ctx: Arc<ServerContext>,
    command_addr: SocketAddr,
    video_addr: SocketAddr,
    motor: Arc<Mutex<MotorController>>,
    pipeline: Arc<Mutex<VideoPipeline>>,
    pending: Option<Pending>,
    threads: Vec<JoinHandle<()>>,
    stopped: bool,
}

impl Server {
    /// Bind both listeners. A bind failure aborts startup.
    ///
    /// A camera that fails to initialize is only logged: the server still
    /// runs and `STREAM#START` reports the error.
    pub fn bind(
        config: &Config,
        mut camera: Box<dyn CameraDriver>,
        motor: MotorController,
    ) -> Result<Self> {
        let ip = net::resolve_bind_ip(&config.network);
        let network = &config.network;

        let command_listener = ChannelListener::bind(
            SocketAddr::new(ip, network.command_port),
            ChannelKind::Command,
            network.write_timeout(),
        )?;
        let video_listener = ChannelListener::bind(
            SocketAddr::new(ip, network.video_port),
            ChannelKind::Video,
            network.write_timeout(),
        )?;
        let command_addr = command_listener.local_addr();
        let video_addr = video_listener.local_addr();

        if let Err(e) = camera.initialize() {
            log::error!("Camera initialization failed: {}", e);
        }
        if !motor.is_enabled() {
            log::warn!("Motor control disabled, motor commands will be ignored");
        }

        let ctx = Arc::new(ServerContext::new(network.max_clients.max(1)));
        let (queue_tx, queue_rx) = crossbeam_channel::unbounded();

        let motor = Arc::new(Mutex::new(motor));
        let pipeline = Arc::new(Mutex::new(VideoPipeline::new(
            Arc::clone(&ctx),
            camera,
            config.streaming.clone(),
        )));

        let pending = Pending {
            command: CommandServer::new(
                command_listener,
                Arc::clone(&ctx),
                queue_tx,
                network.clone(),
            ),
            video: VideoServer::new(video_listener, Arc::clone(&ctx), network.clone()),
            dispatcher: CommandDispatcher::new(
                Arc::clone(&ctx),
                queue_rx,
                Arc::clone(&motor),
                Arc::clone(&pipeline),
            ),
        };

        Ok(Self {
            ctx,
            command_addr,
            video_addr,
            motor,
            pipeline,
            pending: Some(pending),
            threads: Vec::new(),
            stopped: false,
        })
    }

    /// Spawn the accept loops and the dispatcher. Only the first call has an effect.
    pub fn start(&mut self) -> Result<()> {
        let Some(Pending {
            command,
            video,
            dispatcher,
        }) = self.pending.take()
        else {
            return Ok(());
        };

        self.threads.push(
            thread::Builder::new()
                .name("command-accept".to_string())
                .spawn(move || command.run())?,
        );
        self.threads.push(
            thread::Builder::new()
                .name("video-accept".to_string())
                .spawn(move || video.run())?,
        );
        self.threads.push(
            thread::Builder::new()
                .name("dispatcher".to_string())
                .spawn(move || dispatcher.run())?,
        );

        log::info!(
            "Server started: commands on {}, video on {}",
            self.command_addr,
            self.video_addr
        );
        Ok(())
    }

    pub fn command_addr(&self) -> SocketAddr {
        self.command_addr
    }

    pub fn video_addr(&self) -> SocketAddr {
        self.video_addr
    }

    pub fn context(&self) -> &Arc<ServerContext> {
        &self.ctx
    }

    /// Stop every loop, release the camera and motors, join all threads
    ///
    /// Safe to call more than once and concurrently with
    /// [`ServerContext::shutdown`] from a signal handler.
    pub fn shutdown(&mut self) {
        if self.stopped {
            return;
        }
        self.stopped = true;

        self.ctx.shutdown();

        if let Err(e) = self.pipeline.lock().close() {
            log::warn!("Error closing camera: {}", e);
        }
        if let Err(e) = self.motor.lock().close() {
            log::warn!("Error closing motors: {}", e);
        }

        for handle in self.threads.drain(..) {
            let name = handle.thread().name().unwrap_or("unnamed").to_string();
            if handle.join().is_err() {
                log::error!("Thread {} panicked", name);
            }
        }
        log::info!("Server stopped");
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        self.shutdown();
    }
}
