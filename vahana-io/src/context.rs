//! Process-wide shared state
//!
//! Every loop (accept, read, dispatch, broadcast) holds an
//! `Arc<ServerContext>`. State changes go through its methods:
//!
//! - `running` starts `true` and is cleared exactly once by [`ServerContext::shutdown`]
//! - `streaming` is toggled by the video pipeline and forced off at shutdown

use crate::core::types::ChannelKind;
use crate::streaming::{ClientRegistry, FrameBuffer};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Payload of the `STATUS` response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusReport {
    pub running: bool,
    pub streaming: bool,
    pub video_clients: bool,
    pub command_clients: bool,
}

/// Shared state for all server threads
pub struct ServerContext {
    running: AtomicBool,
    streaming: AtomicBool,
    command_clients: ClientRegistry,
    video_clients: ClientRegistry,
    frames: Arc<FrameBuffer>,
}

impl ServerContext {
    pub fn new(max_clients: usize) -> Self {
        Self {
            running: AtomicBool::new(true),
            streaming: AtomicBool::new(false),
            command_clients: ClientRegistry::new(ChannelKind::Command, max_clients),
            video_clients: ClientRegistry::new(ChannelKind::Video, max_clients),
            frames: Arc::new(FrameBuffer::new()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming.load(Ordering::Acquire)
    }

    /// Returns the previous value
    pub(crate) fn set_streaming(&self, streaming: bool) -> bool {
        self.streaming.swap(streaming, Ordering::AcqRel)
    }

    pub fn command_clients(&self) -> &ClientRegistry {
        &self.command_clients
    }

    pub fn video_clients(&self) -> &ClientRegistry {
        &self.video_clients
    }

    pub fn registry(&self, kind: ChannelKind) -> &ClientRegistry {
        match kind {
            ChannelKind::Command => &self.command_clients,
            ChannelKind::Video => &self.video_clients,
        }
    }

    pub fn frames(&self) -> &Arc<FrameBuffer> {
        &self.frames
    }

    pub fn status(&self) -> StatusReport {
        StatusReport {
            running: self.is_running(),
            streaming: self.is_streaming(),
            video_clients: self.video_clients.contains_any(),
            command_clients: self.command_clients.contains_any(),
        }
    }

    /// Stop everything that can be stopped without touching the drivers
    ///
    /// Clears `running` and `streaming`, releases frame waiters and closes
    /// every client socket. Only the first call does anything; it returns
    /// `true`.
    pub fn shutdown(&self) -> bool {
        if !self.running.swap(false, Ordering::AcqRel) {
            return false;
        }
        log::info!("Shutting down server context");

        self.streaming.store(false, Ordering::Release);
        self.frames.deactivate();

        let commands = self.command_clients.close_all();
        let videos = self.video_clients.close_all();
        log::info!(
            "Closed {} command and {} video connection(s)",
            commands,
            videos
        );
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_status() {
        let ctx = ServerContext::new(1);
        assert_eq!(
            ctx.status(),
            StatusReport {
                running: true,
                streaming: false,
                video_clients: false,
                command_clients: false,
            }
        );
    }

    #[test]
    fn test_shutdown_runs_once() {
        let ctx = ServerContext::new(1);
        ctx.set_streaming(true);
        ctx.frames().activate();

        assert!(ctx.shutdown());
        assert!(!ctx.shutdown());
        assert!(!ctx.is_running());
        assert!(!ctx.is_streaming());
        assert!(!ctx.frames().is_active());
    }

    #[test]
    fn test_status_serializes_expected_fields() {
        let json = serde_json::to_value(ServerContext::new(1).status()).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "running": true,
                "streaming": false,
                "video_clients": false,
                "command_clients": false,
            })
        );
    }
}
