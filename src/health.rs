use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Decides when a repeating failure is worth a log line.
///
/// Logs the first failure of a streak and then every `every`-th one, so a
/// sensor that is unplugged at 200 Hz does not flood the console.
#[derive(Clone, Debug)]
pub struct FailureCounter {
    every: u64,
    consecutive: u64,
    total: u64,
}

impl FailureCounter {
    pub fn new(every: u64) -> Self {
        FailureCounter {
            every: every.max(1),
            consecutive: 0,
            total: 0,
        }
    }

    /// Count one failure; returns the streak length when it should be logged
    pub fn record_failure(&mut self) -> Option<u64> {
        self.consecutive += 1;
        self.total += 1;
        if self.consecutive == 1 || self.consecutive % self.every == 0 {
            Some(self.consecutive)
        } else {
            None
        }
    }

    pub fn record_success(&mut self) {
        self.consecutive = 0;
    }

    pub fn consecutive(&self) -> u64 {
        self.consecutive
    }

    pub fn total(&self) -> u64 {
        self.total
    }
}

impl Default for FailureCounter {
    fn default() -> Self {
        Self::new(1000)
    }
}

/// Tracks health metrics for one subsystem's sensor stream
#[derive(Debug)]
pub struct SensorHealth {
    pub name: String,
    last_update: Mutex<Option<Instant>>,
    pub silence_threshold: Duration,
    samples: AtomicU64,
    failures: AtomicU64,
    dropped: AtomicU64,
}

impl SensorHealth {
    pub fn new(name: &str, silence_threshold: Duration) -> Self {
        SensorHealth {
            name: name.to_string(),
            last_update: Mutex::new(None),
            silence_threshold,
            samples: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    pub fn update(&self) {
        self.samples.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut time) = self.last_update.lock() {
            *time = Some(Instant::now());
        }
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_drop(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn samples(&self) -> u64 {
        self.samples.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn time_since_last_update(&self) -> Option<Duration> {
        self.last_update
            .lock()
            .ok()
            .and_then(|t| t.map(|instant| instant.elapsed()))
    }

    /// Silent means no sample within the threshold; a stream that never
    /// produced anything is silent too.
    pub fn is_silent(&self) -> bool {
        self.time_since_last_update()
            .map(|d| d > self.silence_threshold)
            .unwrap_or(true)
    }

    /// One-line summary for the `status` command
    pub fn format_status(&self) -> String {
        let stream = match self.time_since_last_update() {
            Some(d) if d <= self.silence_threshold => "✓".to_string(),
            Some(d) => format!("⚠ (silent {:.1}s)", d.as_secs_f64()),
            None => "no data yet".to_string(),
        };
        format!(
            "{} {} | samples {} | read failures {} | dropped {}",
            self.name,
            stream,
            self.samples(),
            self.failures(),
            self.dropped()
        )
    }
}
