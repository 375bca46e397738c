//! Command dispatcher
//!
//! Single consumer of the command queue. Each queued request is parsed,
//! executed against the motor controller or the video pipeline, and the
//! response is written back to the client that sent it. A request never
//! takes the loop down: protocol errors, driver errors and panics all turn
//! into an `ERROR#...` response.

use crate::command::protocol::{
    Command, ProtocolError, Response, StreamAction, Verb, parse_motor_speeds,
    parse_stream_action,
};
use crate::context::ServerContext;
use crate::motion::MotorController;
use crate::streaming::{QueuedCommand, VideoPipeline};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

/// How long one queue poll blocks before re-checking `running`
const QUEUE_POLL: Duration = Duration::from_millis(100);

pub struct CommandDispatcher {
    ctx: Arc<ServerContext>,
    queue: Receiver<QueuedCommand>,
    motor: Arc<Mutex<MotorController>>,
    video: Arc<Mutex<VideoPipeline>>,
}

impl CommandDispatcher {
    pub fn new(
        ctx: Arc<ServerContext>,
        queue: Receiver<QueuedCommand>,
        motor: Arc<Mutex<MotorController>>,
        video: Arc<Mutex<VideoPipeline>>,
    ) -> Self {
        Self {
            ctx,
            queue,
            motor,
            video,
        }
    }

    /// Consume the queue until shutdown or until every sender is gone
    pub fn run(&self) {
        log::info!("Command dispatcher started");

        while self.ctx.is_running() {
            match self.queue.recv_timeout(QUEUE_POLL) {
                Ok(queued) => self.handle(queued),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    log::debug!("Command queue closed");
                    break;
                }
            }
        }

        log::info!("Command dispatcher stopped");
    }

    fn handle(&self, queued: QueuedCommand) {
        let response = self.dispatch(&queued.text);
        let encoded = response.to_string();
        log::info!("Response to {}: {}", queued.peer, encoded);

        // A peer that disconnected after enqueueing just misses its reply
        self.ctx
            .command_clients()
            .unicast(&queued.peer, encoded.as_bytes());
    }

    /// Parse and execute one raw request
    pub fn dispatch(&self, text: &str) -> Response {
        match panic::catch_unwind(AssertUnwindSafe(|| self.execute(text))) {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                log::warn!("Command {:?} failed: {}", text.trim(), e);
                Response::from(e)
            }
            Err(payload) => {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "Internal error".to_string());
                log::error!("Command {:?} panicked: {}", text.trim(), message);
                Response::Error(message)
            }
        }
    }

    fn execute(&self, text: &str) -> Result<Response, ProtocolError> {
        let command = Command::parse(text)?;

        match command.verb {
            Verb::Motor => {
                let speeds = parse_motor_speeds(&command.args)?;
                self.motor.lock().set_speeds(speeds)?;
                Ok(Response::Motor)
            }
            Verb::Stop => {
                if !command.args.is_empty() {
                    log::debug!("Ignoring STOP arguments {:?}", command.args);
                }
                self.motor.lock().stop()?;
                Ok(Response::Stop)
            }
            Verb::Stream => {
                let action = parse_stream_action(&command.args)?;
                let mut video = self.video.lock();
                let outcome = match action {
                    StreamAction::Start => video.start()?,
                    StreamAction::Stop => video.stop()?,
                };
                Ok(Response::Stream(outcome))
            }
            Verb::Status => Ok(Response::Status(self.ctx.status())),
        }
    }
}
