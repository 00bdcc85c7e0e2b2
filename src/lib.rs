//! Sensor acquisition, attitude fusion and inter-process coordination for an
//! embedded action camera.
//!
//! Each collector process (IMU, GNSS, video) owns its loops on plain OS
//! threads and talks to the others only through named pipes, SysV shared
//! memory and message queues, and a POSIX named semaphore.

pub mod acquisition;
pub mod config;
pub mod error;
pub mod fanout;
pub mod filters;
pub mod gnss;
pub mod health;
pub mod ipc;
pub mod ring_buffer;
pub mod sensors;
pub mod storage;
pub mod types;
pub mod video;

pub use acquisition::{AcquisitionLoop, TickOutcome};
pub use config::Config;
pub use error::{ActionCamError, CamResult};
pub use fanout::{AttitudePublisher, LoggingLoop};
pub use filters::AttitudeFilter;
pub use ring_buffer::{RingBuffer, SharedRing};
pub use types::{FusedSample, RawSample, SamplePair, Timestamp, Vec3};

/// Common logger setup for the binaries; `RUST_LOG` overrides the default.
pub fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();
}
