use std::io;
use thiserror::Error;

/// Errors raised by the acquisition, storage and IPC layers
#[derive(Error, Debug)]
pub enum ActionCamError {
    #[error("I2C transfer failed: {0}")]
    I2c(String),

    #[error("{device} not found (id register 0x{found:02X}, expected 0x{expected:02X})")]
    WrongDeviceId {
        device: &'static str,
        found: u8,
        expected: u8,
    },

    #[error("Serial port {port}: {source}")]
    Serial {
        port: String,
        #[source]
        source: serialport::Error,
    },

    #[error("{op} failed: {source}")]
    Ipc {
        op: &'static str,
        #[source]
        source: io::Error,
    },

    #[error("Frame size mismatch: expected {expected} bytes, got {actual}")]
    FrameSize { expected: usize, actual: usize },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl ActionCamError {
    /// Capture `errno` for a failed libc call
    pub fn last_os(op: &'static str) -> Self {
        ActionCamError::Ipc {
            op,
            source: io::Error::last_os_error(),
        }
    }
}

/// Result type for the whole crate
pub type CamResult<T> = Result<T, ActionCamError>;
