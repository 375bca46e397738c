//! Camera backend that replays JPEG files from a directory
//!
//! Files ending in `.jpg`/`.jpeg` are loaded once, sorted by name, and
//! published in a loop at the configured frame rate. Useful for exercising
//! a viewer without a camera attached.

use crate::core::driver::CameraDriver;
use crate::core::types::Frame;
use crate::devices::producer::{Producer, frame_period, pace};
use crate::error::{Error, Result};
use crate::streaming::FrameBuffer;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

pub struct DirectoryCamera {
    dir: PathBuf,
    fps: u32,
    frames: Vec<Frame>,
    producer: Option<Producer>,
}

impl DirectoryCamera {
    pub fn new(dir: impl Into<PathBuf>, fps: u32) -> Self {
        Self {
            dir: dir.into(),
            fps,
            frames: Vec::new(),
            producer: None,
        }
    }

    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}

fn is_jpeg(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg"))
}

fn load_frames(dir: &Path) -> Result<Vec<Frame>> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|e| Error::Camera(format!("Cannot read {}: {}", dir.display(), e)))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && is_jpeg(path))
        .collect();
    paths.sort();

    paths
        .iter()
        .map(|path| Ok(Frame::from(fs::read(path)?)))
        .collect()
}

impl CameraDriver for DirectoryCamera {
    fn initialize(&mut self) -> Result<()> {
        if !self.frames.is_empty() {
            return Ok(());
        }
        let frames = load_frames(&self.dir)?;
        if frames.is_empty() {
            return Err(Error::Camera(format!(
                "No JPEG files in {}",
                self.dir.display()
            )));
        }
        log::info!(
            "Directory camera loaded {} frame(s) from {}",
            frames.len(),
            self.dir.display()
        );
        self.frames = frames;
        Ok(())
    }

    fn start_streaming(&mut self, sink: Arc<FrameBuffer>) -> Result<()> {
        if self.is_streaming() {
            return Ok(());
        }
        self.initialize()?;

        let frames = self.frames.clone();
        let period = frame_period(self.fps);
        self.producer = Some(Producer::spawn("dir-camera", move |stop| {
            for frame in frames.iter().cycle() {
                let started = Instant::now();
                sink.publish(frame.clone());
                if !pace(started, period, &stop) {
                    break;
                }
            }
        })?);

        log::info!("Directory camera streaming started");
        Ok(())
    }

    fn stop_streaming(&mut self) -> Result<()> {
        if let Some(mut producer) = self.producer.take() {
            producer.stop();
            log::info!("Directory camera streaming stopped");
        }
        Ok(())
    }

    fn is_streaming(&self) -> bool {
        self.producer.is_some()
    }
}
