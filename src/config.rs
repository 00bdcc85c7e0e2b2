//! Process configuration shared by the collector, video and control binaries.
//!
//! Every field has a default matching the board's fixed paths and IPC keys, so
//! a missing config file is never an error.

use crate::error::{ActionCamError, CamResult};
use crate::video::FrameLayout;
use log::warn;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Longest accepted rotation age (ten years)
pub const MAX_ROTATION_HOURS: u64 = 24 * 365 * 10;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub imu: ImuConfig,
    pub gnss: GnssConfig,
    pub video: VideoConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ImuConfig {
    /// N in /dev/i2c-N
    pub i2c_bus: u8,
    pub mpu_address: u16,
    pub mag_address: u16,
    pub fifo_path: PathBuf,
    pub msg_key: i32,
    pub ring_capacity: usize,
    pub sample_rate_hz: f64,
    pub idle_poll_ms: u64,
    pub log_poll_ms: u64,
    pub log_dir: PathBuf,
    pub file_prefix: String,
    pub rotation_hours: u64,
}

impl Default for ImuConfig {
    fn default() -> Self {
        Self {
            i2c_bus: 1,
            mpu_address: 0x68,
            mag_address: 0x0D,
            fifo_path: PathBuf::from("/tmp/imu_control_fifo"),
            msg_key: 0x1234,
            ring_capacity: 1024,
            sample_rate_hz: 200.0,
            idle_poll_ms: 1000,
            log_poll_ms: 10,
            log_dir: PathBuf::from("/mnt/sdcard"),
            file_prefix: "imu".to_string(),
            rotation_hours: 24,
        }
    }
}

impl ImuConfig {
    /// Falls back to 5 ms for a rate `validate` would reject
    pub fn sample_period(&self) -> Duration {
        Duration::try_from_secs_f64(1.0 / self.sample_rate_hz)
            .unwrap_or(Duration::from_millis(5))
    }

    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }

    pub fn log_poll(&self) -> Duration {
        Duration::from_millis(self.log_poll_ms)
    }

    pub fn rotation_age(&self) -> chrono::Duration {
        rotation_age(self.rotation_hours)
    }
}

fn rotation_age(hours: u64) -> chrono::Duration {
    chrono::Duration::hours(hours.min(MAX_ROTATION_HOURS) as i64)
}

fn check_rotation(section: &str, hours: u64) -> CamResult<()> {
    if hours == 0 || hours > MAX_ROTATION_HOURS {
        return Err(ActionCamError::Config(format!(
            "{}.rotation_hours must be within 1..={}",
            section, MAX_ROTATION_HOURS
        )));
    }
    Ok(())
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct GnssConfig {
    pub serial_port: String,
    pub baud_rate: u32,
    pub fifo_path: PathBuf,
    pub log_dir: PathBuf,
    pub file_prefix: String,
    pub record_interval_secs: f64,
    pub rotation_hours: u64,
}

impl Default for GnssConfig {
    fn default() -> Self {
        Self {
            serial_port: "/dev/ttyS9".to_string(),
            baud_rate: 9600,
            fifo_path: PathBuf::from("/tmp/gnss_control_fifo"),
            log_dir: PathBuf::from("/mnt/sdcard"),
            file_prefix: "gnss".to_string(),
            record_interval_secs: 2.0,
            rotation_hours: 24,
        }
    }
}

impl GnssConfig {
    /// Falls back to 2 s for an interval `validate` would reject
    pub fn record_interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.record_interval_secs)
            .unwrap_or(Duration::from_secs(2))
    }

    pub fn rotation_age(&self) -> chrono::Duration {
        rotation_age(self.rotation_hours)
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoConfig {
    pub record_width: u32,
    pub record_height: u32,
    pub record_framerate: u32,
    pub screen_width: u32,
    pub screen_height: u32,
    pub frame_shm_key: i32,
    pub frame_semaphore: String,
    pub control_shm_key: i32,
    pub command_file: PathBuf,
    pub output_dir: PathBuf,
    pub file_prefix: String,
    pub file_extension: String,
    pub control_poll_ms: u64,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            record_width: 1920,
            record_height: 1080,
            record_framerate: 30,
            screen_width: 800,
            screen_height: 480,
            frame_shm_key: 1234,
            frame_semaphore: "/actioncam_frame".to_string(),
            control_shm_key: 5678,
            command_file: PathBuf::from("/tmp/video_control_cmd"),
            output_dir: PathBuf::from("/mnt/sdcard"),
            file_prefix: "record".to_string(),
            file_extension: "raw".to_string(),
            control_poll_ms: 100,
        }
    }
}

impl VideoConfig {
    /// Largest size with the recording aspect ratio that fits the screen
    pub fn preview_size(&self) -> (u32, u32) {
        let aspect = self.record_width as f64 / self.record_height as f64;
        let screen_w = self.screen_width as f64;
        let screen_h = self.screen_height as f64;
        if screen_w / aspect <= screen_h {
            (self.screen_width, (screen_w / aspect) as u32)
        } else {
            ((screen_h * aspect) as u32, self.screen_height)
        }
    }

    /// Layout of the shared preview frame
    pub fn frame_layout(&self) -> FrameLayout {
        let (width, height) = self.preview_size();
        FrameLayout::new(width, height)
    }

    pub fn control_poll(&self) -> Duration {
        Duration::from_millis(self.control_poll_ms)
    }
}

impl Config {
    /// Load from a JSON file, falling back to defaults when no file is given
    /// or the file does not exist.
    pub fn load(path: Option<&Path>) -> CamResult<Self> {
        let config = match path {
            None => Config::default(),
            Some(path) if !path.exists() => {
                warn!(
                    "Config file {} not found, using defaults",
                    path.display()
                );
                Config::default()
            }
            Some(path) => {
                let text = fs::read_to_string(path)?;
                serde_json::from_str(&text).map_err(|e| {
                    ActionCamError::Config(format!("{}: {}", path.display(), e))
                })?
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> CamResult<()> {
        if self.imu.ring_capacity == 0 {
            return Err(ActionCamError::Config(
                "imu.ring_capacity must be positive".to_string(),
            ));
        }
        let rate = self.imu.sample_rate_hz;
        if !(rate.is_finite() && rate > 0.0)
            || Duration::try_from_secs_f64(1.0 / rate).is_err()
        {
            return Err(ActionCamError::Config(format!(
                "imu.sample_rate_hz must be a positive, finite rate (got {})",
                rate
            )));
        }
        let interval = self.gnss.record_interval_secs;
        if !(interval.is_finite() && interval > 0.0)
            || Duration::try_from_secs_f64(interval).is_err()
        {
            return Err(ActionCamError::Config(format!(
                "gnss.record_interval_secs must be positive and finite (got {})",
                interval
            )));
        }
        check_rotation("imu", self.imu.rotation_hours)?;
        check_rotation("gnss", self.gnss.rotation_hours)?;
        if self.video.record_width == 0
            || self.video.record_height == 0
            || self.video.screen_width == 0
            || self.video.screen_height == 0
        {
            return Err(ActionCamError::Config(
                "video dimensions must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
