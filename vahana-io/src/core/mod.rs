//! Core abstractions shared by the server and the device backends.
//!
//! - [`driver`]: [`CameraDriver`](driver::CameraDriver) and
//!   [`MotorDriver`](driver::MotorDriver) traits to implement for new hardware
//! - [`types`]: frames, wheel speeds and channel kinds

pub mod driver;
pub mod types;
