use crate::types::{FusedSample, RawSample, Timestamp, Vec3};
use serde::{Deserialize, Serialize};
use std::f64::consts::{PI, TAU};

/// Gyro weight for roll/pitch
pub const ALPHA: f64 = 0.98;
/// Magnetometer weight for yaw
pub const BETA: f64 = 0.02;
/// Step used when the sample interval is unknown or implausible
pub const DEFAULT_DT: f64 = 0.005;
/// Below this on every axis (µT) the magnetometer reading is treated as absent
pub const MAG_VALID_THRESHOLD: f64 = 0.1;

#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AttitudeState {
    pub roll: f64,
    pub pitch: f64,
    pub yaw: f64,
    pub last_timestamp: Option<Timestamp>,
}

/// Complementary roll/pitch/yaw estimator.
///
/// Roll and pitch blend integrated gyro rate with the accelerometer's gravity
/// direction. Yaw blends integrated gyro z with a tilt-compensated compass
/// heading, and falls back to pure integration without a usable magnetometer.
#[derive(Clone, Debug, Default)]
pub struct AttitudeFilter {
    state: AttitudeState,
}

impl AttitudeFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: AttitudeState) -> Self {
        Self { state }
    }

    pub fn state(&self) -> &AttitudeState {
        &self.state
    }

    pub fn update(&mut self, sample: &RawSample) -> FusedSample {
        let dt = match self.state.last_timestamp {
            Some(prev) => {
                let dt = sample.timestamp.seconds_since(&prev);
                if dt <= 0.0 || dt > 1.0 {
                    DEFAULT_DT
                } else {
                    dt
                }
            }
            None => DEFAULT_DT,
        };

        let a = &sample.accel;
        let g = &sample.gyro;

        let acc_roll = a.y.atan2(a.z);
        let acc_pitch = (-a.x).atan2((a.y * a.y + a.z * a.z).sqrt());

        let roll = ALPHA * (self.state.roll + g.x * dt) + (1.0 - ALPHA) * acc_roll;
        let pitch = ALPHA * (self.state.pitch + g.y * dt) + (1.0 - ALPHA) * acc_pitch;

        let gyro_yaw = self.state.yaw + g.z * dt;
        let yaw = match sample.mag.filter(magnetometer_valid) {
            Some(m) => (1.0 - BETA) * gyro_yaw + BETA * tilt_compensated_heading(&m, roll, pitch),
            None => gyro_yaw,
        };
        let yaw = if yaw.is_finite() {
            normalize_angle(yaw)
        } else {
            self.state.yaw
        };

        self.state = AttitudeState {
            roll,
            pitch,
            yaw,
            last_timestamp: Some(sample.timestamp),
        };

        FusedSample {
            roll,
            pitch,
            yaw,
            timestamp: sample.timestamp,
        }
    }
}

fn magnetometer_valid(m: &Vec3) -> bool {
    m.iter().any(|v| v.abs() >= MAG_VALID_THRESHOLD)
}

/// Compass heading with the field rotated back into the horizontal plane
pub fn tilt_compensated_heading(m: &Vec3, roll: f64, pitch: f64) -> f64 {
    let (sin_r, cos_r) = roll.sin_cos();
    let (sin_p, cos_p) = pitch.sin_cos();
    let mx = m.x * cos_p + m.z * sin_p;
    let my = m.x * sin_r * sin_p + m.y * cos_r - m.z * sin_r * cos_p;
    (-my).atan2(mx)
}

/// Wrap into (-π, π] in constant time
pub fn normalize_angle(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(TAU);
    if wrapped > PI {
        wrapped - TAU
    } else {
        wrapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn sample(accel: Vec3, gyro: Vec3, mag: Option<Vec3>, t: f64) -> RawSample {
        RawSample {
            accel,
            gyro,
            mag,
            temperature: 25.0,
            timestamp: Timestamp::from_secs_f64(t),
        }
    }

    #[test]
    fn test_normalize_angle() {
        assert_abs_diff_eq!(normalize_angle(0.0), 0.0);
        assert_abs_diff_eq!(normalize_angle(PI), PI, epsilon = 1e-12);
        assert_abs_diff_eq!(normalize_angle(-PI), PI, epsilon = 1e-12);
        assert_abs_diff_eq!(normalize_angle(3.0 * PI / 2.0), -PI / 2.0, epsilon = 1e-12);
        let big = normalize_angle(1.0e9);
        assert!(big > -PI && big <= PI);
    }

    #[test]
    fn test_first_sample_uses_default_dt() {
        let mut filter = AttitudeFilter::new();
        let out = filter.update(&sample(
            Vec3::new(0.0, 0.0, 9.81),
            Vec3::new(0.0, 0.0, 1.0),
            None,
            100.0,
        ));
        assert_abs_diff_eq!(out.yaw, DEFAULT_DT, epsilon = 1e-12);
    }

    #[test]
    fn test_large_gap_uses_default_dt() {
        let mut filter = AttitudeFilter::new();
        let gravity = Vec3::new(0.0, 0.0, 9.81);
        let spin = Vec3::new(0.0, 0.0, 1.0);
        filter.update(&sample(gravity, spin, None, 100.0));
        let out = filter.update(&sample(gravity, spin, None, 105.0));
        assert_abs_diff_eq!(out.yaw, 2.0 * DEFAULT_DT, epsilon = 1e-12);

        // backwards clock
        let out = filter.update(&sample(gravity, spin, None, 104.0));
        assert_abs_diff_eq!(out.yaw, 3.0 * DEFAULT_DT, epsilon = 1e-12);
    }

    #[test]
    fn test_converges_to_accel_tilt() {
        let roll = 0.3f64;
        let g = 9.81;
        let accel = Vec3::new(0.0, g * roll.sin(), g * roll.cos());

        let mut filter = AttitudeFilter::with_state(AttitudeState {
            roll: -1.2,
            pitch: 0.8,
            yaw: 0.4,
            last_timestamp: None,
        });
        let mut out = FusedSample::default();
        for i in 0..2000 {
            out = filter.update(&sample(accel, Vec3::zeros(), None, i as f64 * 0.005));
        }
        assert_abs_diff_eq!(out.roll, roll, epsilon = 1e-6);
        assert_abs_diff_eq!(out.pitch, 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(out.yaw, 0.4, epsilon = 1e-12);
    }

    #[test]
    fn test_zero_mag_is_gyro_only() {
        let mut with_zero = AttitudeFilter::new();
        let mut without = AttitudeFilter::new();
        let accel = Vec3::new(0.0, 0.0, 9.81);
        let gyro = Vec3::new(0.0, 0.0, 0.7);

        for i in 0..50 {
            let t = i as f64 * 0.01;
            let a = with_zero.update(&sample(accel, gyro, Some(Vec3::new(0.05, -0.05, 0.0)), t));
            let b = without.update(&sample(accel, gyro, None, t));
            assert_eq!(a.yaw, b.yaw);
        }
        // 0.005 for the first step, then 49 steps of 0.01
        assert_abs_diff_eq!(without.state().yaw, 0.7 * (0.005 + 0.49), epsilon = 1e-9);
    }

    #[test]
    fn test_mag_pulls_yaw_toward_heading() {
        // Level, field pointing along -y: heading atan2(1, 0) = π/2
        let mut filter = AttitudeFilter::new();
        let accel = Vec3::new(0.0, 0.0, 9.81);
        let mag = Some(Vec3::new(0.0, -30.0, 0.0));
        for i in 0..3000 {
            filter.update(&sample(accel, Vec3::zeros(), mag, i as f64 * 0.005));
        }
        assert_abs_diff_eq!(filter.state().yaw, PI / 2.0, epsilon = 1e-6);
    }

    #[test]
    fn test_half_rate_mag_halves_correction() {
        // 100 Hz compass under a 200 Hz loop: only every other tick corrects
        let mut filter = AttitudeFilter::new();
        let accel = Vec3::new(0.0, 0.0, 9.81);
        let heading = PI / 2.0;
        for i in 0..200 {
            let mag = (i % 2 == 0).then(|| Vec3::new(0.0, -30.0, 0.0));
            filter.update(&sample(accel, Vec3::zeros(), mag, i as f64 * 0.005));
        }
        let remaining = heading * (1.0 - BETA).powi(100);
        assert_abs_diff_eq!(heading - filter.state().yaw, remaining, epsilon = 1e-9);
    }

    #[test]
    fn test_yaw_bounded_for_wild_input() {
        let mut filter = AttitudeFilter::new();
        let mut seed = 12345u64;
        let mut next = || {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            ((seed >> 11) as f64 / (1u64 << 53) as f64 - 0.5) * 2000.0
        };
        for i in 0..500 {
            let s = sample(
                Vec3::new(next(), next(), next()),
                Vec3::new(next(), next(), next()),
                if i % 3 == 0 { None } else { Some(Vec3::new(next(), next(), next())) },
                i as f64 * 0.005,
            );
            let out = filter.update(&s);
            assert!(out.yaw > -PI && out.yaw <= PI, "yaw {} out of range", out.yaw);
        }
    }

    #[test]
    fn test_non_finite_yaw_keeps_previous() {
        let mut filter = AttitudeFilter::with_state(AttitudeState {
            yaw: 0.25,
            ..AttitudeState::default()
        });
        let out = filter.update(&sample(
            Vec3::new(0.0, 0.0, 9.81),
            Vec3::new(0.0, 0.0, f64::NAN),
            None,
            1.0,
        ));
        assert_eq!(out.yaw, 0.25);
    }
}
