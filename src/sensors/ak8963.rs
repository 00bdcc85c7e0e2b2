//! AK8963 magnetometer, reached through the MPU6500 I2C bypass.

use super::i2c::{LinuxI2cBus, RegisterBus};
use crate::error::{ActionCamError, CamResult};
use crate::types::Vec3;
use log::{debug, info};
use std::thread;
use std::time::Duration;

const REG_WIA: u8 = 0x00;
const REG_ST1: u8 = 0x02;
const REG_HXL: u8 = 0x03;
const REG_CNTL1: u8 = 0x0A;
const REG_CNTL2: u8 = 0x0B;
const REG_ASAX: u8 = 0x10;

const AK8963_ID: u8 = 0x48;

const SOFT_RESET: u8 = 0x01;
const MODE_POWER_DOWN: u8 = 0x00;
const MODE_FUSE_ROM: u8 = 0x0F;
// continuous measurement mode 2 (100 Hz), 16-bit output
const MODE_CONTINUOUS_16BIT: u8 = 0x16;

const ST1_DATA_READY: u8 = 0x01;
const ST2_OVERFLOW: u8 = 0x08;

/// µT per LSB in 16-bit mode
const SCALE_16BIT: f64 = 4912.0 / 32760.0;

const MODE_SETTLE: Duration = Duration::from_millis(10);

pub struct Ak8963<B: RegisterBus> {
    bus: B,
    sensitivity: Vec3,
}

impl Ak8963<LinuxI2cBus> {
    pub fn open(bus: u8, address: u16) -> CamResult<Self> {
        info!(
            "Initializing AK8963 on /dev/i2c-{}, address 0x{:02X}",
            bus,
            address
        );
        Self::init(LinuxI2cBus::open(bus, address)?)
    }
}

impl<B: RegisterBus> Ak8963<B> {
    pub fn init(mut bus: B) -> CamResult<Self> {
        let mut id = [0u8; 1];
        bus.read_registers(REG_WIA, &mut id)?;
        if id[0] != AK8963_ID {
            return Err(ActionCamError::WrongDeviceId {
                device: "AK8963",
                found: id[0],
                expected: AK8963_ID,
            });
        }

        bus.write_register(REG_CNTL2, SOFT_RESET)?;
        thread::sleep(MODE_SETTLE);

        // Factory sensitivity adjustment is only readable in fuse-ROM mode
        bus.write_register(REG_CNTL1, MODE_FUSE_ROM)?;
        thread::sleep(MODE_SETTLE);
        let mut asa = [0u8; 3];
        bus.read_registers(REG_ASAX, &mut asa)?;
        let sensitivity = sensitivity_from_asa(asa);

        bus.write_register(REG_CNTL1, MODE_POWER_DOWN)?;
        thread::sleep(MODE_SETTLE);
        bus.write_register(REG_CNTL1, MODE_CONTINUOUS_16BIT)?;
        thread::sleep(MODE_SETTLE);

        info!(
            "AK8963 ready (ASA {:?}, sensitivity [{:.4}, {:.4}, {:.4}] µT/LSB)",
            asa, sensitivity.x, sensitivity.y, sensitivity.z
        );
        Ok(Self { bus, sensitivity })
    }

    /// `Ok(None)` when no new measurement is ready or the sensor overflowed.
    ///
    /// Continuous mode 2 produces 100 Hz, so a 200 Hz loop sees `None` on
    /// every other tick. The filter integrates gyro only on those ticks,
    /// which leaves the compass with roughly half of `BETA` per second.
    pub fn read(&mut self) -> CamResult<Option<Vec3>> {
        let mut st1 = [0u8; 1];
        self.bus.read_registers(REG_ST1, &mut st1)?;
        if st1[0] & ST1_DATA_READY == 0 {
            return Ok(None);
        }

        // Reading through ST2 releases the data registers for the next sample
        let mut buf = [0u8; 7];
        self.bus.read_registers(REG_HXL, &mut buf)?;
        if buf[6] & ST2_OVERFLOW != 0 {
            debug!("AK8963 magnetic overflow");
            return Ok(None);
        }

        Ok(Some(decode_measurement(&buf, &self.sensitivity)))
    }
}

pub fn sensitivity_from_asa(asa: [u8; 3]) -> Vec3 {
    let adjust = |a: u8| ((a as f64 - 128.0) / 256.0 + 1.0) * SCALE_16BIT;
    Vec3::new(adjust(asa[0]), adjust(asa[1]), adjust(asa[2]))
}

fn decode_measurement(buf: &[u8; 7], sensitivity: &Vec3) -> Vec3 {
    let word = |i: usize| i16::from_le_bytes([buf[i], buf[i + 1]]) as f64;
    Vec3::new(
        word(0) * sensitivity.x,
        word(2) * sensitivity.y,
        word(4) * sensitivity.z,
    )
}
