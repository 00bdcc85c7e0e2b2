//! Logging thread: drain the ring into the CSV file and the attitude queue.

use crate::error::{ActionCamError, CamResult};
use crate::health::FailureCounter;
use crate::ipc::{AttitudeMessage, ControlFlag, MessageQueue};
use crate::ring_buffer::SharedRing;
use crate::storage::{AttitudeCsv, RotatingLog};
use crate::types::{FusedSample, SamplePair};
use chrono::{DateTime, Local};
use crossbeam::channel::Sender;
use log::{info, warn};
use std::io;
use std::thread;
use std::time::Duration;

/// Destination for each logged attitude besides the CSV file
pub trait AttitudePublisher: Send {
    fn publish(&mut self, sample: &FusedSample) -> CamResult<()>;
}

impl AttitudePublisher for MessageQueue {
    fn publish(&mut self, sample: &FusedSample) -> CamResult<()> {
        self.send(&AttitudeMessage::from_fused(sample))
    }
}

/// In-process subscribers (status reporter, tests)
impl AttitudePublisher for Sender<FusedSample> {
    fn publish(&mut self, sample: &FusedSample) -> CamResult<()> {
        self.send(*sample).map_err(|_| ActionCamError::Ipc {
            op: "channel send",
            source: io::Error::new(io::ErrorKind::BrokenPipe, "receiver dropped"),
        })
    }
}

pub struct LoggingLoop {
    ring: SharedRing<SamplePair>,
    recording: ControlFlag,
    log: RotatingLog<AttitudeCsv>,
    publisher: Option<Box<dyn AttitudePublisher>>,
    was_recording: bool,
    write_failures: FailureCounter,
    publish_failures: FailureCounter,
    poll: Duration,
}

impl LoggingLoop {
    pub fn new(
        ring: SharedRing<SamplePair>,
        recording: ControlFlag,
        log: RotatingLog<AttitudeCsv>,
    ) -> Self {
        Self {
            ring,
            recording,
            log,
            publisher: None,
            was_recording: false,
            write_failures: FailureCounter::default(),
            publish_failures: FailureCounter::default(),
            poll: Duration::from_millis(10),
        }
    }

    pub fn with_publisher(mut self, publisher: Box<dyn AttitudePublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn with_poll(mut self, poll: Duration) -> Self {
        self.poll = poll;
        self
    }

    pub fn log(&self) -> &RotatingLog<AttitudeCsv> {
        &self.log
    }

    /// Handle at most one ring entry; returns false when the ring was empty
    pub fn step(&mut self, now: &DateTime<Local>) -> bool {
        let recording = self.recording.is_running();
        if recording && !self.was_recording {
            info!("Recording started, opening a new IMU file");
            self.log.begin_session();
        }
        self.was_recording = recording;

        // Popped under the ring lock; all I/O below runs without it
        let Some(pair) = self.ring.pop() else {
            return false;
        };
        if !recording {
            return true;
        }

        match self.log.write(&pair.fused, now) {
            Ok(()) => self.write_failures.record_success(),
            Err(e) => {
                if let Some(streak) = self.write_failures.record_failure() {
                    warn!("IMU CSV write failed ({} in a row): {}", streak, e);
                }
            }
        }

        if let Some(publisher) = self.publisher.as_mut() {
            match publisher.publish(&pair.fused) {
                Ok(()) => self.publish_failures.record_success(),
                Err(e) => {
                    if let Some(streak) = self.publish_failures.record_failure() {
                        warn!("Attitude publish failed ({} in a row): {}", streak, e);
                    }
                }
            }
        }
        true
    }

    pub fn run(mut self) {
        loop {
            if !self.step(&Local::now()) {
                thread::sleep(self.poll);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LogTarget;
    use crate::types::{RawSample, Timestamp, Vec3};
    use crossbeam::channel::unbounded;

    fn pair(secs: i64) -> SamplePair {
        let timestamp = Timestamp::new(secs, 0);
        SamplePair {
            raw: RawSample {
                accel: Vec3::new(0.0, 0.0, 9.81),
                gyro: Vec3::zeros(),
                mag: None,
                temperature: 25.0,
                timestamp,
            },
            fused: FusedSample {
                roll: 0.0,
                pitch: 0.0,
                yaw: 0.5,
                timestamp,
            },
        }
    }

    fn daily_log(dir: &std::path::Path) -> RotatingLog<AttitudeCsv> {
        RotatingLog::new(LogTarget::new(dir, "imu", "csv", chrono::Duration::hours(24)))
    }

    #[test]
    fn test_not_recording_discards() {
        let dir = tempfile::tempdir().unwrap();
        let ring = SharedRing::new(8);
        let flag = ControlFlag::new();
        let log = daily_log(dir.path());
        let (tx, rx) = unbounded();
        let mut logger =
            LoggingLoop::new(ring.clone(), flag, log).with_publisher(Box::new(tx));

        ring.push(pair(1));
        assert!(logger.step(&Local::now()));
        assert!(!logger.step(&Local::now()));
        assert!(rx.try_recv().is_err());
        assert!(logger.log().current_path().is_none());
    }

    #[test]
    fn test_recording_writes_and_publishes_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let ring = SharedRing::new(8);
        let flag = ControlFlag::new();
        flag.set(true);
        let log = daily_log(dir.path());
        let (tx, rx) = unbounded();
        let mut logger =
            LoggingLoop::new(ring.clone(), flag, log).with_publisher(Box::new(tx));

        for secs in 1..=3 {
            ring.push(pair(secs));
        }
        let now = Local::now();
        while logger.step(&now) {}

        let published: Vec<i64> = rx.try_iter().map(|s| s.timestamp.secs).collect();
        assert_eq!(published, vec![1, 2, 3]);

        let text = std::fs::read_to_string(logger.log().current_path().unwrap()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[3], "3.000000000,0.00,0.00,28.65");
    }

    #[test]
    fn test_dropped_subscriber_keeps_csv_flowing() {
        let dir = tempfile::tempdir().unwrap();
        let ring = SharedRing::new(8);
        let flag = ControlFlag::new();
        flag.set(true);
        let (tx, rx) = unbounded();
        drop(rx);
        let mut logger = LoggingLoop::new(ring.clone(), flag, daily_log(dir.path()))
            .with_publisher(Box::new(tx));

        for secs in 1..=5 {
            ring.push(pair(secs));
        }
        let now = Local::now();
        for _ in 0..5 {
            assert!(logger.step(&now));
        }
        assert!(!logger.step(&now));
        assert!(ring.is_empty());

        let text = std::fs::read_to_string(logger.log().current_path().unwrap()).unwrap();
        assert_eq!(text.lines().count(), 6);
    }

    #[test]
    fn test_off_on_transition_starts_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let ring = SharedRing::new(8);
        let flag = ControlFlag::new();
        let log = daily_log(dir.path());
        let mut logger = LoggingLoop::new(ring.clone(), flag.clone(), log);
        let now = Local::now();

        flag.set(true);
        ring.push(pair(1));
        logger.step(&now);
        let first = logger.log().current_path().unwrap().to_path_buf();

        flag.set(false);
        logger.step(&now);
        flag.set(true);
        ring.push(pair(2));
        logger.step(&now);
        let second = logger.log().current_path().unwrap().to_path_buf();

        // Same wall-clock second: the second file gets a suffix
        assert_ne!(first, second);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 2);
    }
}
