use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

pub type Vec3 = Vector3<f64>;

/// Wall-clock instant with nanosecond resolution (a `timespec`)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp {
    pub secs: i64,
    pub nanos: u32,
}

impl Timestamp {
    pub fn new(secs: i64, nanos: u32) -> Self {
        Self {
            secs: secs + (nanos / 1_000_000_000) as i64,
            nanos: nanos % 1_000_000_000,
        }
    }

    pub fn now() -> Self {
        let since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self::new(since_epoch.as_secs() as i64, since_epoch.subsec_nanos())
    }

    pub fn from_secs_f64(secs: f64) -> Self {
        let whole = secs.floor();
        let nanos = ((secs - whole) * 1e9).round() as u32;
        Self::new(whole as i64, nanos)
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.secs as f64 + self.nanos as f64 * 1e-9
    }

    /// Signed seconds elapsed since `earlier`
    pub fn seconds_since(&self, earlier: &Timestamp) -> f64 {
        (self.secs - earlier.secs) as f64 + (self.nanos as f64 - earlier.nanos as f64) * 1e-9
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}", self.secs, self.nanos)
    }
}

/// One synchronized read of the inertial sensors
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawSample {
    /// m/s²
    pub accel: Vec3,
    /// rad/s
    pub gyro: Vec3,
    /// µT; `None` when the magnetometer had no valid reading this tick
    pub mag: Option<Vec3>,
    /// °C
    pub temperature: f64,
    pub timestamp: Timestamp,
}

/// Fused attitude, radians
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FusedSample {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
    pub timestamp: Timestamp,
}

impl FusedSample {
    pub fn roll_deg(&self) -> f64 {
        self.roll.to_degrees()
    }

    pub fn pitch_deg(&self) -> f64 {
        self.pitch.to_degrees()
    }

    pub fn yaw_deg(&self) -> f64 {
        self.yaw.to_degrees()
    }
}

/// Entry stored in the sample ring: raw and fused kept in lockstep
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SamplePair {
    pub raw: RawSample,
    pub fused: FusedSample,
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_timestamp_display_pads_nanos() {
        let ts = Timestamp::new(1_700_000_000, 5_000);
        assert_eq!(ts.to_string(), "1700000000.000005000");
    }

    #[test]
    fn test_timestamp_normalizes_nanos() {
        let ts = Timestamp::new(10, 1_500_000_000);
        assert_eq!(ts, Timestamp::new(11, 500_000_000));
    }

    #[test]
    fn test_seconds_since() {
        let a = Timestamp::new(100, 900_000_000);
        let b = Timestamp::new(101, 100_000_000);
        assert_abs_diff_eq!(b.seconds_since(&a), 0.2, epsilon = 1e-9);
        assert_abs_diff_eq!(a.seconds_since(&b), -0.2, epsilon = 1e-9);
    }

    #[test]
    fn test_from_secs_f64() {
        let ts = Timestamp::from_secs_f64(12.25);
        assert_eq!(ts, Timestamp::new(12, 250_000_000));
        assert_abs_diff_eq!(ts.as_secs_f64(), 12.25, epsilon = 1e-9);
    }
}
