pub mod ak8963;
pub mod i2c;
pub mod mpu6500;

pub use ak8963::Ak8963;
pub use i2c::{LinuxI2cBus, RegisterBus};
pub use mpu6500::{InertialReading, Mpu6500};

use crate::config::ImuConfig;
use crate::error::CamResult;
use crate::types::{RawSample, Timestamp};
use log::warn;

/// Anything that can produce one synchronized raw sample per poll.
///
/// An `Err` means "no new data this tick"; callers skip and try again.
pub trait SensorSource: Send {
    fn read_raw(&mut self) -> CamResult<RawSample>;
}

/// MPU6500 plus an optional AK8963 on the same board
pub struct ImuBoard<B: RegisterBus> {
    inertial: Mpu6500<B>,
    magnetometer: Option<Ak8963<B>>,
}

impl<B: RegisterBus> ImuBoard<B> {
    pub fn new(inertial: Mpu6500<B>, magnetometer: Option<Ak8963<B>>) -> Self {
        Self {
            inertial,
            magnetometer,
        }
    }

    pub fn has_magnetometer(&self) -> bool {
        self.magnetometer.is_some()
    }
}

impl ImuBoard<LinuxI2cBus> {
    /// The accel/gyro device is required; a missing magnetometer only
    /// degrades yaw to gyro integration.
    pub fn open(config: &ImuConfig) -> CamResult<Self> {
        let inertial = Mpu6500::open(config.i2c_bus, config.mpu_address)?;
        let magnetometer = match Ak8963::open(config.i2c_bus, config.mag_address) {
            Ok(mag) => Some(mag),
            Err(e) => {
                warn!("Magnetometer unavailable, yaw will be gyro-only: {}", e);
                None
            }
        };
        Ok(Self::new(inertial, magnetometer))
    }
}

impl<B: RegisterBus> SensorSource for ImuBoard<B> {
    fn read_raw(&mut self) -> CamResult<RawSample> {
        let reading = self.inertial.read()?;
        let mag = match self.magnetometer.as_mut() {
            Some(magnetometer) => magnetometer.read()?,
            None => None,
        };

        Ok(RawSample {
            accel: reading.accel,
            gyro: reading.gyro,
            mag,
            temperature: reading.temperature,
            timestamp: Timestamp::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::i2c::fake::FakeBus;
    use super::*;

    fn mpu_bus() -> FakeBus {
        let bus = FakeBus::new();
        bus.set(0x75, &[0x71]);
        bus
    }

    #[test]
    fn test_board_without_magnetometer() {
        let bus = mpu_bus();
        // accel z = 1 g
        bus.set(0x3B + 4, &4096i16.to_be_bytes());
        let mut board = ImuBoard::new(Mpu6500::init(bus).unwrap(), None);

        assert!(!board.has_magnetometer());
        let sample = board.read_raw().unwrap();
        assert!(sample.mag.is_none());
        assert!((sample.accel.z - mpu6500::STANDARD_GRAVITY).abs() < 1e-9);
    }

    #[test]
    fn test_magnetometer_failure_skips_tick() {
        let mag_bus = FakeBus::new();
        mag_bus.set(0x00, &[0x48]);
        mag_bus.set(0x10, &[128, 128, 128]);
        let magnetometer = Ak8963::init(mag_bus.clone()).unwrap();
        let mut board = ImuBoard::new(Mpu6500::init(mpu_bus()).unwrap(), Some(magnetometer));

        mag_bus.set_fail(true);
        assert!(board.read_raw().is_err());

        mag_bus.set_fail(false);
        assert!(board.read_raw().is_ok());
    }
}
