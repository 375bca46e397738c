//! Camera and motor backends
//!
//! | Backend | Config | Hardware |
//! |---------|--------|----------|
//! | [`mock::MockCamera`] | `camera.backend = "mock"` | none, synthetic frames |
//! | [`command::CommandCamera`] | `camera.backend = "command"` | `rpicam-vid` MJPEG on stdout |
//! | [`directory::DirectoryCamera`] | `camera.backend = "directory"` | JPEG files replayed in a loop |
//! | [`mock::MockMotor`] | `motor.backend = "mock"` | none, records duties |
//! | [`pca9685::WheelMotor`] | `motor.backend = "pca9685"` | PCA9685 over i2c-dev |

pub mod command;
pub mod directory;
pub mod mock;
pub mod pca9685;
mod producer;

use crate::config::{CameraBackend, CameraConfig, MotorBackend, MotorConfig};
use crate::core::driver::{CameraDriver, MotorDriver};
use crate::error::{Error, Result};

/// Create the camera backend selected by configuration
pub fn create_camera(config: &CameraConfig) -> Result<Box<dyn CameraDriver>> {
    let camera: Box<dyn CameraDriver> = match config.backend {
        CameraBackend::Mock => Box::new(mock::MockCamera::new(
            config.width,
            config.height,
            config.fps,
        )),
        CameraBackend::Command => Box::new(command::CommandCamera::new(config.clone())),
        CameraBackend::Directory => {
            let dir = config.frames_dir.as_ref().ok_or_else(|| {
                Error::Config("camera.frames_dir is required for the directory backend".into())
            })?;
            Box::new(directory::DirectoryCamera::new(dir, config.fps))
        }
    };
    Ok(camera)
}

/// Create the motor backend selected by configuration
///
/// Opening real hardware can fail; the caller decides whether to run with
/// motors disabled.
pub fn create_motor(config: &MotorConfig) -> Result<Box<dyn MotorDriver>> {
    match config.backend {
        MotorBackend::Mock => Ok(Box::new(mock::MockMotor::new())),
        MotorBackend::Pca9685 => Ok(Box::new(pca9685::WheelMotor::open(config)?)),
    }
}
