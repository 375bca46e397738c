//! Mock camera and motor for running without hardware
//!
//! Both keep their observable state behind a shared probe so tests (and
//! the dispatcher fixtures) can inspect what reached the "hardware".

use crate::core::driver::{CameraDriver, MotorDriver};
use crate::core::types::{Frame, WheelSpeeds};
use crate::devices::producer::{Producer, frame_period, pace};
use crate::error::Result;
use crate::streaming::FrameBuffer;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

/// JPEG start-of-image marker
const SOI: [u8; 2] = [0xFF, 0xD8];
/// JPEG end-of-image marker
const EOI: [u8; 2] = [0xFF, 0xD9];

#[derive(Debug, Default)]
struct CameraState {
    initialized: AtomicBool,
    streaming: AtomicBool,
    starts: AtomicUsize,
    frames: AtomicU64,
}

/// Read-only view of a [`MockCamera`]
#[derive(Clone)]
pub struct CameraProbe(Arc<CameraState>);

impl CameraProbe {
    pub fn is_initialized(&self) -> bool {
        self.0.initialized.load(Ordering::Acquire)
    }

    pub fn is_streaming(&self) -> bool {
        self.0.streaming.load(Ordering::Acquire)
    }

    /// How many times streaming was actually started
    pub fn start_count(&self) -> usize {
        self.0.starts.load(Ordering::Acquire)
    }

    pub fn frames_produced(&self) -> u64 {
        self.0.frames.load(Ordering::Acquire)
    }
}

/// Camera that publishes synthetic JPEG-framed payloads at a fixed rate
pub struct MockCamera {
    width: u32,
    height: u32,
    fps: u32,
    state: Arc<CameraState>,
    producer: Option<Producer>,
}

impl MockCamera {
    pub fn new(width: u32, height: u32, fps: u32) -> Self {
        Self {
            width,
            height,
            fps,
            state: Arc::new(CameraState::default()),
            producer: None,
        }
    }

    pub fn probe(&self) -> CameraProbe {
        CameraProbe(Arc::clone(&self.state))
    }
}

/// Synthetic frame: SOI, sequence number, a gray body sized like a small
/// JPEG of `width`x`height`, EOI
pub fn synthetic_frame(seq: u64, width: u32, height: u32) -> Frame {
    let body = (width as usize * height as usize / 64).max(1);
    let mut bytes = Vec::with_capacity(SOI.len() + 8 + body + EOI.len());
    bytes.extend_from_slice(&SOI);
    bytes.extend_from_slice(&seq.to_le_bytes());
    bytes.resize(bytes.len() + body, 0x80);
    bytes.extend_from_slice(&EOI);
    Frame::from(bytes)
}

impl CameraDriver for MockCamera {
    fn initialize(&mut self) -> Result<()> {
        if !self.state.initialized.swap(true, Ordering::AcqRel) {
            log::info!(
                "Mock camera initialized ({}x{} @ {} fps)",
                self.width,
                self.height,
                self.fps
            );
        }
        Ok(())
    }

    fn start_streaming(&mut self, sink: Arc<FrameBuffer>) -> Result<()> {
        if self.is_streaming() {
            return Ok(());
        }
        self.initialize()?;

        let state = Arc::clone(&self.state);
        let (width, height) = (self.width, self.height);
        let period = frame_period(self.fps);

        let producer = Producer::spawn("mock-camera", move |stop| {
            let mut started = Instant::now();
            loop {
                let seq = state.frames.fetch_add(1, Ordering::AcqRel) + 1;
                sink.publish(synthetic_frame(seq, width, height));
                if !pace(started, period, &stop) {
                    break;
                }
                started = Instant::now();
            }
        })?;

        self.producer = Some(producer);
        self.state.starts.fetch_add(1, Ordering::AcqRel);
        self.state.streaming.store(true, Ordering::Release);
        log::info!("Mock camera streaming started");
        Ok(())
    }

    fn stop_streaming(&mut self) -> Result<()> {
        if let Some(mut producer) = self.producer.take() {
            producer.stop();
            log::info!("Mock camera streaming stopped");
        }
        self.state.streaming.store(false, Ordering::Release);
        Ok(())
    }

    fn is_streaming(&self) -> bool {
        self.state.streaming.load(Ordering::Acquire)
    }
}

#[derive(Debug, Default)]
struct MotorState {
    commands: Mutex<Vec<WheelSpeeds>>,
    closed: AtomicBool,
}

/// Read-only view of a [`MockMotor`]
#[derive(Clone)]
pub struct MotorProbe(Arc<MotorState>);

impl MotorProbe {
    /// Every duty set applied, oldest first
    pub fn commands(&self) -> Vec<WheelSpeeds> {
        self.0.commands.lock().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.0.closed.load(Ordering::Acquire)
    }
}

/// Motor that records every duty set it is given
pub struct MockMotor {
    state: Arc<MotorState>,
}

impl MockMotor {
    pub fn new() -> Self {
        Self {
            state: Arc::new(MotorState::default()),
        }
    }

    pub fn probe(&self) -> MotorProbe {
        MotorProbe(Arc::clone(&self.state))
    }
}

impl Default for MockMotor {
    fn default() -> Self {
        Self::new()
    }
}

impl MotorDriver for MockMotor {
    fn set_speeds(&mut self, speeds: WheelSpeeds) -> Result<()> {
        log::debug!("Mock motor: {:?}", speeds.as_array());
        self.state.commands.lock().push(speeds);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.stop()?;
        self.state.closed.store(true, Ordering::Release);
        Ok(())
    }
}
