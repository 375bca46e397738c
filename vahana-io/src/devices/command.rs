//! Camera backend that runs an external MJPEG encoder
//!
//! Spawns `rpicam-vid` (or a compatible program) writing an MJPEG stream to
//! stdout:
//!
//! ```text
//! rpicam-vid --codec mjpeg --width 400 --height 300 --quality 70 \
//!            --framerate 30 -t 0 -n -o -
//! ```
//!
//! The stream is split into frames on the JPEG SOI (`FF D8`) and EOI
//! (`FF D9`) markers; every complete image is published to the frame buffer.

use crate::config::CameraConfig;
use crate::core::driver::CameraDriver;
use crate::core::types::Frame;
use crate::devices::producer::Producer;
use crate::error::{Error, Result};
use crate::streaming::FrameBuffer;
use std::io::{ErrorKind, Read};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];

/// Partial image data kept while waiting for an EOI marker (8 MiB)
const MAX_PENDING: usize = 8 * 1024 * 1024;

const READ_CHUNK: usize = 64 * 1024;

/// Incremental MJPEG stream splitter
#[derive(Debug, Default)]
pub struct MjpegSplitter {
    pending: Vec<u8>,
}

fn find(haystack: &[u8], marker: [u8; 2]) -> Option<usize> {
    haystack.windows(2).position(|w| w == marker)
}

impl MjpegSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes, returning every image they complete
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        self.pending.extend_from_slice(bytes);
        let mut images = Vec::new();

        loop {
            let Some(start) = find(&self.pending, SOI) else {
                // Keep a trailing 0xFF in case it begins the next SOI
                let keep = usize::from(self.pending.last() == Some(&0xFF));
                let discard = self.pending.len() - keep;
                self.pending.drain(..discard);
                break;
            };
            if start > 0 {
                self.pending.drain(..start);
            }

            let Some(end) = find(&self.pending[SOI.len()..], EOI) else {
                if self.pending.len() > MAX_PENDING {
                    log::warn!(
                        "Dropping {} bytes of MJPEG data without end marker",
                        self.pending.len()
                    );
                    self.pending.clear();
                }
                break;
            };

            let len = SOI.len() + end + EOI.len();
            images.push(self.pending.drain(..len).collect());
        }

        images
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

pub struct CommandCamera {
    config: CameraConfig,
    child: Option<Child>,
    producer: Option<Producer>,
}

impl CommandCamera {
    pub fn new(config: CameraConfig) -> Self {
        Self {
            config,
            child: None,
            producer: None,
        }
    }

    fn arguments(&self) -> Vec<String> {
        vec![
            "--codec".into(),
            "mjpeg".into(),
            "--width".into(),
            self.config.width.to_string(),
            "--height".into(),
            self.config.height.to_string(),
            "--quality".into(),
            self.config.quality.to_string(),
            "--framerate".into(),
            self.config.fps.to_string(),
            "-t".into(),
            "0".into(),
            "-n".into(),
            "-o".into(),
            "-".into(),
        ]
    }

    fn reap_child(&mut self) {
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            match child.wait() {
                Ok(status) => log::debug!("{} exited: {}", self.config.command, status),
                Err(e) => log::warn!("Failed to wait for {}: {}", self.config.command, e),
            }
        }
    }
}

fn read_stream(mut stdout: ChildStdout, sink: Arc<FrameBuffer>, stop: &AtomicBool) {
    let mut splitter = MjpegSplitter::new();
    let mut chunk = vec![0u8; READ_CHUNK];

    while !stop.load(Ordering::Acquire) {
        match stdout.read(&mut chunk) {
            Ok(0) => {
                log::warn!("Camera process closed its output");
                break;
            }
            Ok(n) => {
                for image in splitter.push(&chunk[..n]) {
                    sink.publish(Frame::from(image));
                }
            }
            Err(ref e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => {
                log::error!("Error reading camera output: {}", e);
                break;
            }
        }
    }
}

impl CameraDriver for CommandCamera {
    fn initialize(&mut self) -> Result<()> {
        if self.config.width == 0 || self.config.height == 0 {
            return Err(Error::InvalidParameter(format!(
                "Camera resolution {}x{}",
                self.config.width, self.config.height
            )));
        }
        Ok(())
    }

    fn start_streaming(&mut self, sink: Arc<FrameBuffer>) -> Result<()> {
        if self.is_streaming() {
            return Ok(());
        }
        self.initialize()?;

        let mut child = Command::new(&self.config.command)
            .args(self.arguments())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| Error::Camera(format!("Failed to run {}: {}", self.config.command, e)))?;

        let Some(stdout) = child.stdout.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(Error::Camera("Camera process has no stdout".to_string()));
        };
        self.child = Some(child);

        match Producer::spawn("cmd-camera", move |stop| read_stream(stdout, sink, &stop)) {
            Ok(producer) => self.producer = Some(producer),
            Err(e) => {
                self.reap_child();
                return Err(e);
            }
        }

        log::info!(
            "Camera streaming started ({} {}x{} q={})",
            self.config.command,
            self.config.width,
            self.config.height,
            self.config.quality
        );
        Ok(())
    }

    fn stop_streaming(&mut self) -> Result<()> {
        let Some(mut producer) = self.producer.take() else {
            return Ok(());
        };
        producer.signal_stop();
        // Killing the encoder ends the blocked read with EOF
        self.reap_child();
        producer.stop();
        log::info!("Camera streaming stopped");
        Ok(())
    }

    fn is_streaming(&self) -> bool {
        self.producer.is_some()
    }
}

impl Drop for CommandCamera {
    fn drop(&mut self) {
        let _ = self.stop_streaming();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jpeg(tag: u8) -> Vec<u8> {
        vec![0xFF, 0xD8, tag, 0x00, 0xFF, 0xD9]
    }

    #[test]
    fn test_splits_back_to_back_images() {
        let mut stream = jpeg(1);
        stream.extend(jpeg(2));

        let mut splitter = MjpegSplitter::new();
        assert_eq!(splitter.push(&stream), vec![jpeg(1), jpeg(2)]);
        assert_eq!(splitter.pending_len(), 0);
    }

    #[test]
    fn test_image_split_across_reads() {
        let image = jpeg(7);
        let mut splitter = MjpegSplitter::new();

        // Split inside both markers
        assert!(splitter.push(&image[..1]).is_empty());
        assert!(splitter.push(&image[1..5]).is_empty());
        assert_eq!(splitter.push(&image[5..]), vec![image]);
    }

    #[test]
    fn test_garbage_before_soi_is_dropped() {
        let mut stream = vec![0x12, 0x34, 0x56];
        stream.extend(jpeg(3));

        let mut splitter = MjpegSplitter::new();
        assert_eq!(splitter.push(&stream), vec![jpeg(3)]);
    }

    #[test]
    fn test_missing_program_fails_to_start() {
        let config = CameraConfig {
            command: "/nonexistent/rpicam-vid".to_string(),
            ..CameraConfig::default()
        };
        let mut camera = CommandCamera::new(config);
        let err = camera
            .start_streaming(Arc::new(FrameBuffer::new()))
            .unwrap_err();
        assert!(matches!(err, Error::Camera(_)));
        assert!(!camera.is_streaming());
    }

    #[test]
    fn test_arguments_follow_config() {
        let camera = CommandCamera::new(CameraConfig::default());
        let args = camera.arguments().join(" ");
        assert_eq!(
            args,
            "--codec mjpeg --width 400 --height 300 --quality 70 --framerate 30 -t 0 -n -o -"
        );
    }
}
