//! Start/stop of the video pipeline (camera + broadcast thread)
//!
//! Owned by the dispatcher behind a mutex. At most one broadcast thread is
//! alive at any time: starting an already running stream is a no-op.

use crate::config::StreamingConfig;
use crate::context::ServerContext;
use crate::core::driver::CameraDriver;
use crate::error::{Error, Result};
use crate::streaming::broadcast::VideoBroadcaster;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Result of a start/stop request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    Started,
    AlreadyRunning,
    Stopped,
    NotRunning,
}

pub struct VideoPipeline {
    ctx: Arc<ServerContext>,
    camera: Box<dyn CameraDriver>,
    pacing: StreamingConfig,
    broadcaster: Option<JoinHandle<u64>>,
}

impl VideoPipeline {
    pub fn new(
        ctx: Arc<ServerContext>,
        camera: Box<dyn CameraDriver>,
        pacing: StreamingConfig,
    ) -> Self {
        Self {
            ctx,
            camera,
            pacing,
            broadcaster: None,
        }
    }

    /// Start the camera and the broadcast thread
    pub fn start(&mut self) -> Result<StreamOutcome> {
        if !self.ctx.is_running() {
            return Err(Error::Other("Server is shutting down".to_string()));
        }
        if self.ctx.is_streaming() {
            return Ok(StreamOutcome::AlreadyRunning);
        }

        // Left over from a stream ended by shutdown or a camera failure
        self.join_broadcaster();

        let frames = Arc::clone(self.ctx.frames());
        frames.activate();
        if let Err(e) = self.camera.start_streaming(Arc::clone(&frames)) {
            frames.deactivate();
            log::error!("Failed to start camera: {}", e);
            return Err(e);
        }

        self.ctx.set_streaming(true);

        let broadcaster = VideoBroadcaster::new(Arc::clone(&self.ctx), self.pacing.clone());
        let spawned = thread::Builder::new()
            .name("video-broadcast".to_string())
            .spawn(move || broadcaster.run());

        match spawned {
            Ok(handle) => {
                self.broadcaster = Some(handle);
                log::info!("Video streaming started");
                Ok(StreamOutcome::Started)
            }
            Err(e) => {
                self.ctx.set_streaming(false);
                frames.deactivate();
                let _ = self.camera.stop_streaming();
                Err(Error::Io(e))
            }
        }
    }

    /// Stop the broadcast thread and the camera
    pub fn stop(&mut self) -> Result<StreamOutcome> {
        let was_streaming = self.ctx.set_streaming(false);
        self.ctx.frames().deactivate();
        self.join_broadcaster();

        if !was_streaming && !self.camera.is_streaming() {
            return Ok(StreamOutcome::NotRunning);
        }

        self.camera.stop_streaming()?;
        if was_streaming {
            log::info!("Video streaming stopped");
            Ok(StreamOutcome::Stopped)
        } else {
            Ok(StreamOutcome::NotRunning)
        }
    }

    /// Whether a broadcast thread is currently alive
    pub fn is_broadcasting(&self) -> bool {
        self.broadcaster
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Stop streaming and release the camera
    pub fn close(&mut self) -> Result<()> {
        if let Err(e) = self.stop() {
            log::warn!("Error stopping video stream: {}", e);
        }
        self.camera.close()
    }

    fn join_broadcaster(&mut self) {
        if let Some(handle) = self.broadcaster.take() {
            match handle.join() {
                Ok(frames) => log::debug!("Broadcast thread joined after {} frames", frames),
                Err(_) => log::error!("Broadcast thread panicked"),
            }
        }
    }
}
