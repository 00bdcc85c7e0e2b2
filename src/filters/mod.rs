pub mod complementary;

pub use complementary::{normalize_angle, AttitudeFilter, AttitudeState};
