use crate::error::{ActionCamError, CamResult};
use log::info;
use rppal::i2c::I2c;

/// Register-level access to one device on an I2C bus.
///
/// No retries happen at this level; every failure is returned to the driver.
pub trait RegisterBus: Send {
    fn write_register(&mut self, reg: u8, value: u8) -> CamResult<()>;

    /// Read `buf.len()` consecutive registers starting at `reg`
    fn read_registers(&mut self, reg: u8, buf: &mut [u8]) -> CamResult<()>;
}

/// `/dev/i2c-N` bound to one slave address
pub struct LinuxI2cBus {
    i2c: I2c,
}

impl LinuxI2cBus {
    pub fn open(bus: u8, address: u16) -> CamResult<Self> {
        let mut i2c = I2c::with_bus(bus)
            .map_err(|e| ActionCamError::I2c(format!("open /dev/i2c-{}: {}", bus, e)))?;
        i2c.set_slave_address(address).map_err(|e| {
            ActionCamError::I2c(format!("select address 0x{:02X}: {}", address, e))
        })?;
        info!("Opened /dev/i2c-{} at 0x{:02X}", bus, address);
        Ok(Self { i2c })
    }
}

impl RegisterBus for LinuxI2cBus {
    fn write_register(&mut self, reg: u8, value: u8) -> CamResult<()> {
        self.i2c
            .smbus_write_byte(reg, value)
            .map_err(|e| ActionCamError::I2c(format!("write reg 0x{:02X}: {}", reg, e)))
    }

    fn read_registers(&mut self, reg: u8, buf: &mut [u8]) -> CamResult<()> {
        self.i2c
            .write_read(&[reg], buf)
            .map_err(|e| ActionCamError::I2c(format!("read reg 0x{:02X}: {}", reg, e)))
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[derive(Debug)]
    pub struct FakeRegisters {
        pub regs: [u8; 256],
        pub writes: Vec<(u8, u8)>,
        pub fail: bool,
    }

    /// In-memory register file; clones share state so a test can keep a
    /// handle after moving the bus into a driver.
    #[derive(Clone, Debug)]
    pub struct FakeBus {
        pub state: Arc<Mutex<FakeRegisters>>,
    }

    impl FakeBus {
        pub fn new() -> Self {
            FakeBus {
                state: Arc::new(Mutex::new(FakeRegisters {
                    regs: [0; 256],
                    writes: Vec::new(),
                    fail: false,
                })),
            }
        }

        pub fn set(&self, reg: u8, bytes: &[u8]) {
            let mut state = self.state.lock().unwrap();
            for (i, b) in bytes.iter().enumerate() {
                state.regs[reg as usize + i] = *b;
            }
        }

        pub fn set_fail(&self, fail: bool) {
            self.state.lock().unwrap().fail = fail;
        }

        pub fn writes(&self) -> Vec<(u8, u8)> {
            self.state.lock().unwrap().writes.clone()
        }
    }

    impl RegisterBus for FakeBus {
        fn write_register(&mut self, reg: u8, value: u8) -> CamResult<()> {
            let mut state = self.state.lock().unwrap();
            if state.fail {
                return Err(ActionCamError::I2c("fake bus failure".to_string()));
            }
            state.writes.push((reg, value));
            Ok(())
        }

        fn read_registers(&mut self, reg: u8, buf: &mut [u8]) -> CamResult<()> {
            let state = self.state.lock().unwrap();
            if state.fail {
                return Err(ActionCamError::I2c("fake bus failure".to_string()));
            }
            let start = reg as usize;
            buf.copy_from_slice(&state.regs[start..start + buf.len()]);
            Ok(())
        }
    }
}
