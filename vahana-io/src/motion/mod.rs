//! Wheel motion on top of a [`MotorDriver`](crate::core::driver::MotorDriver)

mod controller;

pub use controller::{DEFAULT_SPEED, MotorController};
