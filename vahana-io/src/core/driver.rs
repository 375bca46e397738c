//! Driver traits for the two hardware collaborators

use crate::core::types::WheelSpeeds;
use crate::error::Result;
use crate::streaming::FrameBuffer;
use std::sync::Arc;

/// Camera that produces JPEG frames on its own thread
pub trait CameraDriver: Send {
    /// Prepare the hardware. Must be callable more than once.
    fn initialize(&mut self) -> Result<()>;

    /// Start producing frames into `sink`
    ///
    /// The driver owns its producer thread and calls
    /// [`FrameBuffer::publish`] for every encoded frame. Initializes the
    /// camera first if that has not happened yet.
    fn start_streaming(&mut self, sink: Arc<FrameBuffer>) -> Result<()>;

    /// Stop producing frames. No-op when not streaming.
    fn stop_streaming(&mut self) -> Result<()>;

    fn is_streaming(&self) -> bool;

    /// Release the hardware
    fn close(&mut self) -> Result<()> {
        self.stop_streaming()
    }
}

/// Four-wheel motor output
pub trait MotorDriver: Send {
    /// Apply a duty to every wheel. Values are already clamped.
    fn set_speeds(&mut self, speeds: WheelSpeeds) -> Result<()>;

    /// Stop all motors
    fn stop(&mut self) -> Result<()> {
        self.set_speeds(WheelSpeeds::STOP)
    }

    /// Release the hardware
    fn close(&mut self) -> Result<()> {
        self.stop()
    }
}
