//! Four-wheel motor controller
//!
//! Wraps a [`MotorDriver`] and clamps every duty to `[-4095, 4095]` before
//! it reaches the hardware. When the motor hardware failed to initialize the
//! controller runs disabled: every call is accepted and ignored, so the
//! command channel keeps answering `OK#MOTOR`.

use crate::core::driver::MotorDriver;
use crate::core::types::WheelSpeeds;
use crate::error::Result;
use std::thread;
use std::time::Duration;

/// Duty used by the helper moves when none is given
pub const DEFAULT_SPEED: i32 = 2000;

pub struct MotorController {
    driver: Option<Box<dyn MotorDriver>>,
    last: WheelSpeeds,
}

impl MotorController {
    pub fn new(driver: Box<dyn MotorDriver>) -> Self {
        Self {
            driver: Some(driver),
            last: WheelSpeeds::STOP,
        }
    }

    /// Controller without hardware. All commands are no-ops.
    pub fn disabled() -> Self {
        Self {
            driver: None,
            last: WheelSpeeds::STOP,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.driver.is_some()
    }

    /// Last duty applied (after clamping)
    pub fn last_speeds(&self) -> WheelSpeeds {
        self.last
    }

    /// Drive each wheel with its own duty
    pub fn set_speeds(&mut self, speeds: WheelSpeeds) -> Result<()> {
        let clamped = speeds.clamped();
        if clamped != speeds {
            log::debug!("Clamped wheel speeds {:?} to {:?}", speeds, clamped);
        }

        let Some(driver) = self.driver.as_mut() else {
            log::debug!("Motor disabled, ignoring {:?}", clamped);
            return Ok(());
        };
        driver.set_speeds(clamped)?;
        self.last = clamped;
        Ok(())
    }

    pub fn stop(&mut self) -> Result<()> {
        match self.driver.as_mut() {
            Some(driver) => {
                driver.stop()?;
                self.last = WheelSpeeds::STOP;
                Ok(())
            }
            None => Ok(()),
        }
    }

    pub fn move_forward(&mut self, speed: i32) -> Result<()> {
        self.set_speeds(WheelSpeeds::uniform(speed))
    }

    pub fn move_backward(&mut self, speed: i32) -> Result<()> {
        self.set_speeds(WheelSpeeds::uniform(-speed))
    }

    /// Spin in place: left side backward, right side forward
    pub fn turn_left(&mut self, speed: i32) -> Result<()> {
        self.set_speeds(WheelSpeeds::new(-speed, -speed, speed, speed))
    }

    /// Spin in place: left side forward, right side backward
    pub fn turn_right(&mut self, speed: i32) -> Result<()> {
        self.set_speeds(WheelSpeeds::new(speed, speed, -speed, -speed))
    }

    /// Drive forward, backward, left and right for `hold` each, then stop
    ///
    /// Used to check wheel wiring on a freshly assembled rover. The motors
    /// are stopped even when one of the moves fails.
    pub fn exercise(&mut self, speed: i32, hold: Duration) -> Result<()> {
        let moves: [(&str, fn(&mut Self, i32) -> Result<()>); 4] = [
            ("forward", Self::move_forward),
            ("backward", Self::move_backward),
            ("left", Self::turn_left),
            ("right", Self::turn_right),
        ];

        for (name, apply) in moves {
            log::info!("Moving {} at duty {} for {:?}", name, speed, hold);
            if let Err(e) = apply(self, speed) {
                self.stop()?;
                return Err(e);
            }
            thread::sleep(hold);
        }

        log::info!("Stopping");
        self.stop()
    }

    /// Stop the motors and release the hardware
    pub fn close(&mut self) -> Result<()> {
        if let Some(mut driver) = self.driver.take() {
            log::info!("Closing motor driver");
            driver.close()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::mock::MockMotor;

    #[test]
    fn test_speeds_are_clamped_before_driver() {
        let motor = MockMotor::new();
        let probe = motor.probe();
        let mut controller = MotorController::new(Box::new(motor));

        controller
            .set_speeds(WheelSpeeds::new(5000, -5000, 100, -100))
            .unwrap();

        assert_eq!(
            probe.commands(),
            vec![WheelSpeeds::new(4095, -4095, 100, -100)]
        );
        assert_eq!(controller.last_speeds().as_array(), [4095, -4095, 100, -100]);
    }

    #[test]
    fn test_helper_moves() {
        let motor = MockMotor::new();
        let probe = motor.probe();
        let mut controller = MotorController::new(Box::new(motor));

        controller.move_forward(DEFAULT_SPEED).unwrap();
        controller.move_backward(1000).unwrap();
        controller.turn_left(500).unwrap();
        controller.turn_right(500).unwrap();
        controller.stop().unwrap();

        assert_eq!(
            probe.commands(),
            vec![
                WheelSpeeds::uniform(2000),
                WheelSpeeds::uniform(-1000),
                WheelSpeeds::new(-500, -500, 500, 500),
                WheelSpeeds::new(500, 500, -500, -500),
                WheelSpeeds::STOP,
            ]
        );
    }

    #[test]
    fn test_exercise_runs_every_move_then_stops() {
        let motor = MockMotor::new();
        let probe = motor.probe();
        let mut controller = MotorController::new(Box::new(motor));

        controller.exercise(DEFAULT_SPEED, Duration::ZERO).unwrap();

        assert_eq!(
            probe.commands(),
            vec![
                WheelSpeeds::uniform(2000),
                WheelSpeeds::uniform(-2000),
                WheelSpeeds::new(-2000, -2000, 2000, 2000),
                WheelSpeeds::new(2000, 2000, -2000, -2000),
                WheelSpeeds::STOP,
            ]
        );
        assert_eq!(controller.last_speeds(), WheelSpeeds::STOP);
    }

    #[test]
    fn test_disabled_controller_accepts_everything() {
        let mut controller = MotorController::disabled();
        assert!(!controller.is_enabled());
        controller.move_forward(DEFAULT_SPEED).unwrap();
        controller.stop().unwrap();
        controller.close().unwrap();
        assert_eq!(controller.last_speeds(), WheelSpeeds::STOP);
    }

    #[test]
    fn test_close_stops_and_releases() {
        let motor = MockMotor::new();
        let probe = motor.probe();
        let mut controller = MotorController::new(Box::new(motor));

        controller.move_forward(1500).unwrap();
        controller.close().unwrap();

        assert!(!controller.is_enabled());
        assert_eq!(probe.commands().last(), Some(&WheelSpeeds::STOP));
        assert!(probe.is_closed());
    }
}
