//! Sensor polling thread: read, fuse, enqueue.

use crate::filters::AttitudeFilter;
use crate::health::{FailureCounter, SensorHealth};
use crate::ipc::ControlFlag;
use crate::ring_buffer::SharedRing;
use crate::sensors::SensorSource;
use crate::types::SamplePair;
use log::{info, warn};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// Flag is off, nothing read
    Idle,
    Sampled,
    /// Read and fused, but the ring was full
    Dropped,
    ReadFailed,
}

pub struct AcquisitionLoop<S: SensorSource> {
    source: S,
    filter: AttitudeFilter,
    ring: SharedRing<SamplePair>,
    flag: ControlFlag,
    failures: FailureCounter,
    health: Arc<SensorHealth>,
    sample_period: Duration,
    idle_poll: Duration,
    was_running: bool,
}

impl<S: SensorSource> AcquisitionLoop<S> {
    pub fn new(
        source: S,
        ring: SharedRing<SamplePair>,
        flag: ControlFlag,
        health: Arc<SensorHealth>,
    ) -> Self {
        Self {
            source,
            filter: AttitudeFilter::new(),
            ring,
            flag,
            failures: FailureCounter::default(),
            health,
            sample_period: Duration::from_millis(5),
            idle_poll: Duration::from_secs(1),
            was_running: false,
        }
    }

    pub fn with_timing(mut self, sample_period: Duration, idle_poll: Duration) -> Self {
        self.sample_period = sample_period;
        self.idle_poll = idle_poll;
        self
    }

    pub fn filter(&self) -> &AttitudeFilter {
        &self.filter
    }

    pub fn step(&mut self) -> TickOutcome {
        let running = self.flag.is_running();
        if running != self.was_running {
            info!(
                "IMU acquisition {}",
                if running { "started" } else { "stopped" }
            );
            self.was_running = running;
        }
        if !running {
            return TickOutcome::Idle;
        }

        let raw = match self.source.read_raw() {
            Ok(raw) => raw,
            Err(e) => {
                self.health.record_failure();
                if let Some(streak) = self.failures.record_failure() {
                    warn!("IMU read failed ({} in a row): {}", streak, e);
                }
                return TickOutcome::ReadFailed;
            }
        };
        self.failures.record_success();
        self.health.update();

        let fused = self.filter.update(&raw);
        if self.ring.push(SamplePair { raw, fused }) {
            TickOutcome::Sampled
        } else {
            self.health.record_drop();
            TickOutcome::Dropped
        }
    }

    /// Poll forever; the process exits to stop it
    pub fn run(mut self) {
        loop {
            let started = Instant::now();
            let period = match self.step() {
                TickOutcome::Idle => self.idle_poll,
                _ => self.sample_period,
            };
            thread::sleep(period.saturating_sub(started.elapsed()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ActionCamError, CamResult};
    use crate::types::{RawSample, Timestamp, Vec3};

    struct ScriptedSource {
        next: u32,
        fail_every: u32,
    }

    impl SensorSource for ScriptedSource {
        fn read_raw(&mut self) -> CamResult<RawSample> {
            self.next += 1;
            if self.fail_every > 0 && self.next % self.fail_every == 0 {
                return Err(ActionCamError::I2c("scripted".into()));
            }
            Ok(RawSample {
                accel: Vec3::new(0.0, 0.0, 9.81),
                gyro: Vec3::zeros(),
                mag: None,
                temperature: 30.0,
                timestamp: Timestamp::new(self.next as i64, 0),
            })
        }
    }

    type Rig = (AcquisitionLoop<ScriptedSource>, SharedRing<SamplePair>, ControlFlag);

    fn make(capacity: usize, fail_every: u32) -> Rig {
        let ring = SharedRing::new(capacity);
        let flag = ControlFlag::new();
        let health = Arc::new(SensorHealth::new("IMU", Duration::from_secs(1)));
        let acquisition = AcquisitionLoop::new(
            ScriptedSource { next: 0, fail_every },
            ring.clone(),
            flag.clone(),
            health,
        );
        (acquisition, ring, flag)
    }

    #[test]
    fn test_idle_until_started() {
        let (mut acquisition, ring, flag) = make(8, 0);
        assert_eq!(acquisition.step(), TickOutcome::Idle);
        assert!(ring.is_empty());

        flag.set(true);
        assert_eq!(acquisition.step(), TickOutcome::Sampled);
        assert_eq!(ring.len(), 1);
    }

    #[test]
    fn test_read_failure_skips_tick() {
        let (mut acquisition, ring, flag) = make(8, 2);
        flag.set(true);
        let outcomes: Vec<_> = (0..4).map(|_| acquisition.step()).collect();
        assert_eq!(
            outcomes,
            vec![
                TickOutcome::Sampled,
                TickOutcome::ReadFailed,
                TickOutcome::Sampled,
                TickOutcome::ReadFailed
            ]
        );
        assert_eq!(ring.len(), 2);
    }

    #[test]
    fn test_full_ring_drops_new_sample() {
        let (mut acquisition, ring, flag) = make(2, 0);
        flag.set(true);
        acquisition.step();
        acquisition.step();
        assert_eq!(acquisition.step(), TickOutcome::Dropped);

        // The oldest entries survive
        assert_eq!(ring.pop().unwrap().raw.timestamp.secs, 1);
        assert_eq!(ring.pop().unwrap().raw.timestamp.secs, 2);
    }
}
