//! PCA9685 16-channel PWM controller driving four DC wheel motors
//!
//! # Register map (subset)
//!
//! | Register | Address | Use |
//! |----------|---------|-----|
//! | MODE1 | 0x00 | sleep / restart / auto-increment |
//! | LED0_ON_L | 0x06 | first channel; each channel spans 4 registers |
//! | PRESCALE | 0xFE | PWM frequency, writable only in sleep mode |
//!
//! # Wheel wiring
//!
//! Each wheel is an H-bridge fed by two PWM channels. Driving forward puts
//! the duty on the second channel, reverse on the first, and braking sets
//! both to full duty.
//!
//! | Wheel | Forward channel | Reverse channel |
//! |-------|-----------------|-----------------|
//! | left upper | 1 | 0 |
//! | left lower | 2 | 3 |
//! | right upper | 7 | 6 |
//! | right lower | 5 | 4 |

use crate::config::MotorConfig;
use crate::core::driver::MotorDriver;
use crate::core::types::{MAX_DUTY, WheelSpeeds};
use crate::error::{Error, Result};
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::unix::io::AsRawFd;
use std::path::Path;
use std::thread;
use std::time::Duration;

const MODE1: u8 = 0x00;
const PRESCALE: u8 = 0xFE;
const LED0_ON_L: u8 = 0x06;

const MODE1_RESTART: u8 = 0x80;
const MODE1_SLEEP: u8 = 0x10;

/// Internal oscillator frequency
const OSC_HZ: f32 = 25_000_000.0;

/// `I2C_SLAVE` request from `<linux/i2c-dev.h>`
const I2C_SLAVE: libc::c_ulong = 0x0703;

/// (reverse, forward) channel pair per wheel, in [`WheelSpeeds::as_array`] order
const WHEEL_CHANNELS: [(u8, u8); 4] = [(0, 1), (3, 2), (6, 7), (4, 5)];

/// Byte-register access to one I2C device
pub trait RegisterBus: Send {
    fn write_register(&mut self, register: u8, value: u8) -> Result<()>;
    fn read_register(&mut self, register: u8) -> Result<u8>;
}

/// Linux i2c-dev character device bound to one slave address
pub struct I2cDevice {
    file: File,
}

impl I2cDevice {
    pub fn open(bus: &Path, address: u16) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(bus)
            .map_err(|e| {
                Error::InitializationFailed(format!("Cannot open {}: {}", bus.display(), e))
            })?;

        // SAFETY: fd is valid for the lifetime of `file`; I2C_SLAVE takes the address by value
        let rc = unsafe {
            libc::ioctl(
                file.as_raw_fd(),
                I2C_SLAVE as _,
                libc::c_ulong::from(address),
            )
        };
        if rc < 0 {
            return Err(Error::InitializationFailed(format!(
                "Cannot select I2C address {:#04x} on {}: {}",
                address,
                bus.display(),
                std::io::Error::last_os_error()
            )));
        }

        Ok(Self { file })
    }
}

impl RegisterBus for I2cDevice {
    fn write_register(&mut self, register: u8, value: u8) -> Result<()> {
        self.file
            .write_all(&[register, value])
            .map_err(|e| Error::Motor(format!("I2C write to {:#04x} failed: {}", register, e)))
    }

    fn read_register(&mut self, register: u8) -> Result<u8> {
        let mut value = [0u8; 1];
        self.file
            .write_all(&[register])
            .and_then(|_| self.file.read_exact(&mut value))
            .map_err(|e| Error::Motor(format!("I2C read of {:#04x} failed: {}", register, e)))?;
        Ok(value[0])
    }
}

/// Per-channel PWM output
pub trait PwmOutput: Send {
    /// Set one channel to turn on at tick `on` and off at tick `off` (0..4096)
    fn set_pwm(&mut self, channel: u8, on: u16, off: u16) -> Result<()>;

    /// Set a channel's duty with the on edge at tick 0
    fn set_duty(&mut self, channel: u8, duty: u16) -> Result<()> {
        self.set_pwm(channel, 0, duty)
    }
}

pub struct Pca9685<B: RegisterBus> {
    bus: B,
}

/// Prescale value for a PWM frequency
pub fn prescale_for(frequency_hz: f32) -> u8 {
    let prescale = (OSC_HZ / 4096.0 / frequency_hz - 1.0).round();
    prescale.clamp(3.0, 255.0) as u8
}

impl<B: RegisterBus> Pca9685<B> {
    /// Reset the chip and set its PWM frequency
    pub fn new(mut bus: B, frequency_hz: f32) -> Result<Self> {
        if frequency_hz.is_nan() || frequency_hz <= 0.0 {
            return Err(Error::InvalidParameter(format!(
                "PWM frequency {} Hz",
                frequency_hz
            )));
        }
        bus.write_register(MODE1, 0x00)?;
        let mut chip = Self { bus };
        chip.set_frequency(frequency_hz)?;
        Ok(chip)
    }

    pub fn set_frequency(&mut self, frequency_hz: f32) -> Result<()> {
        let prescale = prescale_for(frequency_hz);
        let old_mode = self.bus.read_register(MODE1)?;

        self.bus
            .write_register(MODE1, (old_mode & 0x7F) | MODE1_SLEEP)?;
        self.bus.write_register(PRESCALE, prescale)?;
        self.bus.write_register(MODE1, old_mode)?;
        // Oscillator needs 500us to settle after leaving sleep
        thread::sleep(Duration::from_millis(5));
        self.bus.write_register(MODE1, old_mode | MODE1_RESTART)?;

        log::debug!("PCA9685 frequency {} Hz (prescale {})", frequency_hz, prescale);
        Ok(())
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }
}

impl<B: RegisterBus> PwmOutput for Pca9685<B> {
    fn set_pwm(&mut self, channel: u8, on: u16, off: u16) -> Result<()> {
        if channel > 15 {
            return Err(Error::InvalidParameter(format!("PWM channel {}", channel)));
        }
        let base = LED0_ON_L + 4 * channel;
        let [on_l, on_h] = on.to_le_bytes();
        let [off_l, off_h] = off.to_le_bytes();
        self.bus.write_register(base, on_l)?;
        self.bus.write_register(base + 1, on_h)?;
        self.bus.write_register(base + 2, off_l)?;
        self.bus.write_register(base + 3, off_h)?;
        Ok(())
    }
}

/// Four H-bridge wheels on a PWM output
pub struct WheelMotor<P: PwmOutput> {
    pwm: P,
}

impl<P: PwmOutput> WheelMotor<P> {
    pub fn new(pwm: P) -> Self {
        Self { pwm }
    }

    fn set_wheel(&mut self, (reverse, forward): (u8, u8), duty: i32) -> Result<()> {
        let magnitude = duty.unsigned_abs().min(MAX_DUTY as u32) as u16;
        let full = MAX_DUTY as u16;
        match duty.signum() {
            1 => {
                self.pwm.set_duty(reverse, 0)?;
                self.pwm.set_duty(forward, magnitude)
            }
            -1 => {
                self.pwm.set_duty(forward, 0)?;
                self.pwm.set_duty(reverse, magnitude)
            }
            _ => {
                self.pwm.set_duty(reverse, full)?;
                self.pwm.set_duty(forward, full)
            }
        }
    }
}

impl WheelMotor<Pca9685<I2cDevice>> {
    /// Open the PCA9685 described by `config`
    pub fn open(config: &MotorConfig) -> Result<Self> {
        let device = I2cDevice::open(&config.i2c_bus, config.address)?;
        let chip = Pca9685::new(device, config.pwm_frequency_hz)?;
        log::info!(
            "PCA9685 ready on {} at {:#04x} ({} Hz)",
            config.i2c_bus.display(),
            config.address,
            config.pwm_frequency_hz
        );
        Ok(Self::new(chip))
    }
}

impl<P: PwmOutput> MotorDriver for WheelMotor<P> {
    fn set_speeds(&mut self, speeds: WheelSpeeds) -> Result<()> {
        for (channels, duty) in WHEEL_CHANNELS.into_iter().zip(speeds.as_array()) {
            self.set_wheel(channels, duty)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Register file that records every write
    struct RecordingBus {
        registers: [u8; 256],
        writes: Vec<(u8, u8)>,
    }

    impl Default for RecordingBus {
        fn default() -> Self {
            Self {
                registers: [0; 256],
                writes: Vec::new(),
            }
        }
    }

    impl RegisterBus for RecordingBus {
        fn write_register(&mut self, register: u8, value: u8) -> Result<()> {
            self.registers[register as usize] = value;
            self.writes.push((register, value));
            Ok(())
        }

        fn read_register(&mut self, register: u8) -> Result<u8> {
            Ok(self.registers[register as usize])
        }
    }

    #[derive(Default)]
    struct RecordingPwm {
        duties: Vec<(u8, u16)>,
    }

    impl PwmOutput for RecordingPwm {
        fn set_pwm(&mut self, channel: u8, on: u16, off: u16) -> Result<()> {
            assert_eq!(on, 0);
            self.duties.push((channel, off));
            Ok(())
        }
    }

    #[test]
    fn test_prescale_for_50hz() {
        // 25MHz / 4096 / 50 - 1 = 121.07
        assert_eq!(prescale_for(50.0), 121);
        assert_eq!(prescale_for(1000.0), 5);
    }

    #[test]
    fn test_frequency_sequence() {
        let chip = Pca9685::new(RecordingBus::default(), 50.0).unwrap();
        assert_eq!(
            chip.bus().writes,
            vec![
                (MODE1, 0x00),
                (MODE1, 0x10),
                (PRESCALE, 121),
                (MODE1, 0x00),
                (MODE1, 0x80),
            ]
        );
    }

    #[test]
    fn test_set_pwm_register_layout() {
        let mut chip = Pca9685::new(RecordingBus::default(), 50.0).unwrap();
        chip.set_pwm(2, 0, 4095).unwrap();

        let writes = &chip.bus().writes[5..];
        assert_eq!(writes, &[(0x0E, 0x00), (0x0F, 0x00), (0x10, 0xFF), (0x11, 0x0F)]);
        assert!(chip.set_pwm(16, 0, 0).is_err());
    }

    #[test]
    fn test_wheel_channel_mapping() {
        let mut motor = WheelMotor::new(RecordingPwm::default());
        motor
            .set_speeds(WheelSpeeds::new(1000, -2000, 0, 5000))
            .unwrap();

        assert_eq!(
            motor.pwm.duties,
            vec![
                // left upper forward
                (0, 0),
                (1, 1000),
                // left lower reverse
                (2, 0),
                (3, 2000),
                // right upper brake
                (6, 4095),
                (7, 4095),
                // right lower forward, saturated
                (4, 0),
                (5, 4095),
            ]
        );
    }

    #[test]
    fn test_invalid_frequency_rejected() {
        assert!(Pca9685::new(RecordingBus::default(), 0.0).is_err());
    }
}
