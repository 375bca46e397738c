//! Video broadcast loop
//!
//! Runs on its own thread while streaming is active:
//!
//! ```text
//! loop:
//!   no video client?  sleep idle_poll (100ms), frames are left unconsumed
//!   else              wait for the next frame (FrameReader::wait_next)
//!                     write it to every video client
//!                     sleep frame_interval (30ms ⇒ ≤ ~33 fps)
//! ```
//!
//! A client whose write fails is removed; the others keep receiving.

use crate::config::StreamingConfig;
use crate::context::ServerContext;
use std::sync::Arc;
use std::thread;

/// Pushes frames from the frame buffer to all video clients
pub struct VideoBroadcaster {
    ctx: Arc<ServerContext>,
    pacing: StreamingConfig,
}

impl VideoBroadcaster {
    pub fn new(ctx: Arc<ServerContext>, pacing: StreamingConfig) -> Self {
        Self { ctx, pacing }
    }

    /// Run until streaming stops or the server shuts down
    ///
    /// Returns the number of frames delivered to at least one client.
    pub fn run(&self) -> u64 {
        log::info!("Video broadcast loop started");

        let mut reader = self.ctx.frames().reader();
        let mut frames_sent = 0u64;
        let mut had_viewer = false;

        while self.ctx.is_running() && self.ctx.is_streaming() {
            if !self.ctx.video_clients().contains_any() {
                if had_viewer {
                    log::info!("Video streaming paused (no client connected)");
                    had_viewer = false;
                }
                thread::sleep(self.pacing.idle_poll());
                continue;
            }
            had_viewer = true;

            let Some(frame) = reader.wait_next() else {
                log::debug!("Frame buffer stopped");
                break;
            };

            let delivered = self
                .ctx
                .video_clients()
                .broadcast(|client| client.send_frame(&frame));

            if delivered > 0 {
                frames_sent += 1;
                if frames_sent % 300 == 0 {
                    log::debug!("Sent {} frames (last {} bytes)", frames_sent, frame.len());
                }
            }

            thread::sleep(self.pacing.frame_interval());
        }

        log::info!("Video broadcast loop stopped ({} frames sent)", frames_sent);
        frames_sent
    }
}
