//! MPU6500 accelerometer/gyroscope.
//!
//! Full-scale ranges are chosen at compile time; the init sequence writes the
//! matching config bits and the decoder uses the matching LSB scale.

use super::i2c::{LinuxI2cBus, RegisterBus};
use crate::error::{ActionCamError, CamResult};
use crate::types::Vec3;
use log::info;
use std::thread;
use std::time::Duration;

const REG_SMPLRT_DIV: u8 = 0x19;
const REG_CONFIG: u8 = 0x1A;
const REG_GYRO_CONFIG: u8 = 0x1B;
const REG_ACCEL_CONFIG: u8 = 0x1C;
const REG_INT_PIN_CFG: u8 = 0x37;
const REG_ACCEL_XOUT_H: u8 = 0x3B;
const REG_PWR_MGMT_1: u8 = 0x6B;
const REG_WHO_AM_I: u8 = 0x75;

const MPU6500_ID: u8 = 0x70;
// MPU9250/MPU9255 expose the same accel/gyro die
const COMPATIBLE_IDS: [u8; 3] = [MPU6500_ID, 0x71, 0x73];

const PWR_RESET: u8 = 0x80;
const PWR_CLOCK_PLL: u8 = 0x01;
const DLPF_41HZ: u8 = 0x03;
const SAMPLE_DIV_200HZ: u8 = 0x04;
const INT_PIN_BYPASS_EN: u8 = 0x02;

const RESET_SETTLE: Duration = Duration::from_millis(100);

pub const STANDARD_GRAVITY: f64 = 9.80665;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccelRange {
    G2 = 0,
    G4 = 1,
    G8 = 2,
    G16 = 3,
}

impl AccelRange {
    pub const fn config_bits(self) -> u8 {
        (self as u8) << 3
    }

    pub fn full_scale_g(self) -> f64 {
        match self {
            AccelRange::G2 => 2.0,
            AccelRange::G4 => 4.0,
            AccelRange::G8 => 8.0,
            AccelRange::G16 => 16.0,
        }
    }

    /// m/s² per LSB
    pub fn scale(self) -> f64 {
        self.full_scale_g() / 32768.0 * STANDARD_GRAVITY
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GyroRange {
    Dps250 = 0,
    Dps500 = 1,
    Dps1000 = 2,
    Dps2000 = 3,
}

impl GyroRange {
    pub const fn config_bits(self) -> u8 {
        (self as u8) << 3
    }

    pub fn full_scale_dps(self) -> f64 {
        match self {
            GyroRange::Dps250 => 250.0,
            GyroRange::Dps500 => 500.0,
            GyroRange::Dps1000 => 1000.0,
            GyroRange::Dps2000 => 2000.0,
        }
    }

    /// rad/s per LSB
    pub fn scale(self) -> f64 {
        (self.full_scale_dps() / 32768.0).to_radians()
    }
}

pub const ACCEL_RANGE: AccelRange = AccelRange::G8;
pub const GYRO_RANGE: GyroRange = GyroRange::Dps2000;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct InertialReading {
    pub accel: Vec3,
    pub gyro: Vec3,
    pub temperature: f64,
}

pub struct Mpu6500<B: RegisterBus> {
    bus: B,
}

impl Mpu6500<LinuxI2cBus> {
    pub fn open(bus: u8, address: u16) -> CamResult<Self> {
        info!(
            "Initializing MPU6500 on /dev/i2c-{}, address 0x{:02X}",
            bus,
            address
        );
        Self::init(LinuxI2cBus::open(bus, address)?)
    }
}

impl<B: RegisterBus> Mpu6500<B> {
    /// Identify, reset and configure the device
    pub fn init(mut bus: B) -> CamResult<Self> {
        let mut id = [0u8; 1];
        bus.read_registers(REG_WHO_AM_I, &mut id)?;
        if !COMPATIBLE_IDS.contains(&id[0]) {
            return Err(ActionCamError::WrongDeviceId {
                device: "MPU6500",
                found: id[0],
                expected: MPU6500_ID,
            });
        }

        bus.write_register(REG_PWR_MGMT_1, PWR_RESET)?;
        thread::sleep(RESET_SETTLE);

        let sequence = [
            (REG_PWR_MGMT_1, PWR_CLOCK_PLL),
            (REG_GYRO_CONFIG, GYRO_RANGE.config_bits()),
            (REG_ACCEL_CONFIG, ACCEL_RANGE.config_bits()),
            (REG_CONFIG, DLPF_41HZ),
            (REG_SMPLRT_DIV, SAMPLE_DIV_200HZ),
            (REG_INT_PIN_CFG, INT_PIN_BYPASS_EN),
        ];
        for (reg, value) in sequence {
            bus.write_register(reg, value)?;
        }

        info!(
            "MPU6500 ready (accel ±{}g, gyro ±{}dps)",
            ACCEL_RANGE.full_scale_g(),
            GYRO_RANGE.full_scale_dps()
        );
        Ok(Self { bus })
    }

    /// One 14-byte burst: accel, temperature, gyro
    pub fn read(&mut self) -> CamResult<InertialReading> {
        let mut buf = [0u8; 14];
        self.bus.read_registers(REG_ACCEL_XOUT_H, &mut buf)?;
        Ok(decode_block(&buf))
    }
}

pub fn decode_block(buf: &[u8; 14]) -> InertialReading {
    let word = |i: usize| i16::from_be_bytes([buf[i], buf[i + 1]]) as f64;
    let accel_scale = ACCEL_RANGE.scale();
    let gyro_scale = GYRO_RANGE.scale();

    InertialReading {
        accel: Vec3::new(word(0), word(2), word(4)) * accel_scale,
        temperature: word(6) / 340.0 + 36.53,
        gyro: Vec3::new(word(8), word(10), word(12)) * gyro_scale,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensors::i2c::fake::FakeBus;
    use approx::assert_relative_eq;

    #[test]
    fn test_init_sequence() {
        let bus = FakeBus::new();
        bus.set(REG_WHO_AM_I, &[MPU6500_ID]);

        Mpu6500::init(bus.clone()).unwrap();

        let writes = bus.writes();
        assert_eq!(writes[0], (REG_PWR_MGMT_1, PWR_RESET));
        assert!(writes.contains(&(REG_GYRO_CONFIG, 0x18)));
        assert!(writes.contains(&(REG_ACCEL_CONFIG, 0x10)));
        assert!(writes.contains(&(REG_INT_PIN_CFG, INT_PIN_BYPASS_EN)));
    }

    #[test]
    fn test_wrong_id_rejected() {
        let bus = FakeBus::new();
        bus.set(REG_WHO_AM_I, &[0x12]);

        match Mpu6500::init(bus) {
            Err(ActionCamError::WrongDeviceId { found, .. }) => assert_eq!(found, 0x12),
            other => panic!("unexpected result: {:?}", other.err()),
        }
    }

    #[test]
    fn test_decode_block_units() {
        // accel z = +4096 LSB = 1 g at ±8g; gyro x = 16.384 LSB/dps -> 1000 LSB ≈ 61 dps
        let mut buf = [0u8; 14];
        buf[4..6].copy_from_slice(&4096i16.to_be_bytes());
        buf[6..8].copy_from_slice(&0i16.to_be_bytes());
        buf[8..10].copy_from_slice(&1000i16.to_be_bytes());
        buf[12..14].copy_from_slice(&(-1000i16).to_be_bytes());

        let reading = decode_block(&buf);
        assert_relative_eq!(reading.accel.z, STANDARD_GRAVITY, epsilon = 1e-9);
        assert_relative_eq!(reading.accel.x, 0.0);
        assert_relative_eq!(reading.gyro.x, (1000.0 / 16.384f64).to_radians(), epsilon = 1e-9);
        assert_relative_eq!(reading.gyro.z, -(1000.0 / 16.384f64).to_radians(), epsilon = 1e-9);
        assert_relative_eq!(reading.temperature, 36.53, epsilon = 1e-9);
    }

    #[test]
    fn test_read_failure_propagates() {
        let bus = FakeBus::new();
        bus.set(REG_WHO_AM_I, &[MPU6500_ID]);
        let mut mpu = Mpu6500::init(bus.clone()).unwrap();

        bus.set_fail(true);
        assert!(mpu.read().is_err());

        bus.set_fail(false);
        assert!(mpu.read().is_ok());
    }
}
