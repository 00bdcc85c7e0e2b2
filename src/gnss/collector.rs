use super::nmea::{parse_gga, GgaFix, LineBuffer};
use crate::error::{ActionCamError, CamResult};
use crate::health::{FailureCounter, SensorHealth};
use crate::ipc::ControlFlag;
use crate::storage::{JsonArrayLog, RotatingLog};
use chrono::{DateTime, Local};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serialport::SerialPort;
use std::io::{self, Read};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const IDLE_POLL: Duration = Duration::from_secs(1);
const REOPEN_DELAY: Duration = Duration::from_secs(5);
const READ_TIMEOUT: Duration = Duration::from_millis(500);

/// One element of the GNSS JSON array
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GnssRecord {
    /// Receiver UTC time, `hhmmss.ss`
    pub timestamp: String,
    /// [latitude, longitude] in decimal degrees
    pub coords: [f64; 2],
    pub altitude: f64,
    pub satellites: u32,
    /// Local wall-clock time the record was written
    pub record_time: String,
    /// `"fix"` or `"no_fix"`
    pub status: String,
}

impl GnssRecord {
    pub fn from_fix(fix: &GgaFix, now: &DateTime<Local>) -> Self {
        Self {
            timestamp: fix.utc_time.clone(),
            coords: [fix.latitude, fix.longitude],
            altitude: fix.altitude,
            satellites: fix.satellites,
            record_time: now.format("%Y-%m-%d %H:%M:%S").to_string(),
            status: if fix.has_fix() { "fix" } else { "no_fix" }.to_string(),
        }
    }
}

/// Opens the byte stream carrying NMEA sentences
pub trait NmeaPort: Send {
    fn open(&mut self) -> CamResult<Box<dyn Read + Send>>;
}

/// UART receiver, 8N1
pub struct SerialNmeaPort {
    path: String,
    baud_rate: u32,
}

impl SerialNmeaPort {
    pub fn new(path: &str, baud_rate: u32) -> Self {
        Self {
            path: path.to_string(),
            baud_rate,
        }
    }
}

struct SerialReader(Box<dyn SerialPort>);

impl Read for SerialReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.0.read(buf)
    }
}

impl NmeaPort for SerialNmeaPort {
    fn open(&mut self) -> CamResult<Box<dyn Read + Send>> {
        let port = serialport::new(&self.path, self.baud_rate)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|source| ActionCamError::Serial {
                port: self.path.clone(),
                source,
            })?;
        Ok(Box::new(SerialReader(port)))
    }
}

pub struct GnssCollector<P: NmeaPort> {
    port: P,
    flag: ControlFlag,
    log: RotatingLog<JsonArrayLog<GnssRecord>>,
    lines: LineBuffer,
    record_interval: Duration,
    last_record: Option<Instant>,
    health: Arc<SensorHealth>,
    write_failures: FailureCounter,
}

impl<P: NmeaPort> GnssCollector<P> {
    pub fn new(
        port: P,
        flag: ControlFlag,
        log: RotatingLog<JsonArrayLog<GnssRecord>>,
        health: Arc<SensorHealth>,
    ) -> Self {
        Self {
            port,
            flag,
            log,
            lines: LineBuffer::new(),
            record_interval: Duration::from_secs(2),
            last_record: None,
            health,
            write_failures: FailureCounter::new(10),
        }
    }

    pub fn with_record_interval(mut self, interval: Duration) -> Self {
        self.record_interval = interval;
        self
    }

    pub fn log(&self) -> &RotatingLog<JsonArrayLog<GnssRecord>> {
        &self.log
    }

    /// Feed raw serial bytes; returns the records written
    pub fn ingest(&mut self, bytes: &[u8], now: &DateTime<Local>, at: Instant) -> Vec<GnssRecord> {
        let mut written = Vec::new();
        for line in self.lines.feed(bytes) {
            let Some(fix) = parse_gga(&line) else {
                continue;
            };
            self.health.update();

            let due = self
                .last_record
                .map_or(true, |last| at.duration_since(last) >= self.record_interval);
            if !due {
                continue;
            }

            let record = GnssRecord::from_fix(&fix, now);
            match self.log.write(&record, now) {
                Ok(()) => {
                    self.last_record = Some(at);
                    self.write_failures.record_success();
                    written.push(record);
                }
                Err(e) => {
                    if let Some(streak) = self.write_failures.record_failure() {
                        warn!("GNSS record write failed ({} in a row): {}", streak, e);
                    }
                }
            }
        }
        written
    }

    /// Called on every off→on transition
    pub fn begin_session(&mut self) {
        self.log.begin_session();
        self.lines = LineBuffer::new();
        self.last_record = None;
    }

    fn collect_while_running(&mut self, mut stream: Box<dyn Read + Send>) {
        let mut buf = [0u8; 1024];
        while self.flag.is_running() {
            match stream.read(&mut buf) {
                Ok(0) => thread::sleep(READ_TIMEOUT),
                Ok(n) => {
                    self.ingest(&buf[..n], &Local::now(), Instant::now());
                }
                Err(e) if e.kind() == io::ErrorKind::TimedOut => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => {
                    warn!("GNSS serial read failed, reopening: {}", e);
                    self.health.record_failure();
                    return;
                }
            }
        }
    }

    pub fn run(mut self) {
        let mut was_running = false;
        loop {
            if !self.flag.is_running() {
                if was_running {
                    info!("GNSS data collection stopped");
                    was_running = false;
                }
                thread::sleep(IDLE_POLL);
                continue;
            }
            if !was_running {
                self.begin_session();
                was_running = true;
            }

            let stream = match self.port.open() {
                Ok(stream) => stream,
                Err(e) => {
                    warn!("Failed to open GNSS port: {}", e);
                    self.health.record_failure();
                    thread::sleep(REOPEN_DELAY);
                    continue;
                }
            };
            info!("GNSS data collection started");
            self.collect_while_running(stream);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LogTarget;

    const FIX: &str = "$GPGGA,123519,4807.038,N,01131.000,E,1,08,0.9,545.4,M,46.9,M,,*47\r\n";

    struct NoPort;

    impl NmeaPort for NoPort {
        fn open(&mut self) -> CamResult<Box<dyn Read + Send>> {
            Err(ActionCamError::Storage("no port".into()))
        }
    }

    fn collector(dir: &std::path::Path) -> GnssCollector<NoPort> {
        let target = LogTarget::new(dir, "gnss", "json", chrono::Duration::hours(24));
        let log = RotatingLog::new(target);
        GnssCollector::new(
            NoPort,
            ControlFlag::new(),
            log,
            Arc::new(SensorHealth::new("GNSS", Duration::from_secs(5))),
        )
    }

    #[test]
    fn test_record_from_fix() {
        let now = Local::now();
        let fix = parse_gga(FIX).unwrap();
        let record = GnssRecord::from_fix(&fix, &now);
        assert_eq!(record.status, "fix");
        assert_eq!(record.satellites, 8);
        assert_eq!(record.timestamp, "123519");

        let json = serde_json::to_value(&record).unwrap();
        assert!(json["coords"].is_array());
        assert_eq!(json["coords"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_rate_limit_and_valid_json() {
        let dir = tempfile::tempdir().unwrap();
        let mut gnss = collector(dir.path());
        let now = Local::now();
        let t0 = Instant::now();

        assert_eq!(gnss.ingest(FIX.as_bytes(), &now, t0).len(), 1);
        assert!(gnss.ingest(FIX.as_bytes(), &now, t0 + Duration::from_millis(1500)).is_empty());
        assert_eq!(gnss.ingest(FIX.as_bytes(), &now, t0 + Duration::from_millis(2100)).len(), 1);

        let text = std::fs::read_to_string(gnss.log().current_path().unwrap()).unwrap();
        let records: Vec<GnssRecord> = serde_json::from_str(&text).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].coords[0], records[1].coords[0]);
    }

    #[test]
    fn test_bad_checksum_not_recorded() {
        let dir = tempfile::tempdir().unwrap();
        let mut gnss = collector(dir.path());
        let corrupted = FIX.replace("*47", "*00");
        assert!(gnss
            .ingest(corrupted.as_bytes(), &Local::now(), Instant::now())
            .is_empty());
        assert!(gnss.log().current_path().is_none());
    }

    #[test]
    fn test_new_session_opens_new_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut gnss = collector(dir.path());
        let now = Local::now();

        gnss.ingest(FIX.as_bytes(), &now, Instant::now());
        let first = gnss.log().current_path().unwrap().to_path_buf();
        gnss.begin_session();
        gnss.ingest(FIX.as_bytes(), &now, Instant::now());
        let second = gnss.log().current_path().unwrap().to_path_buf();
        assert_ne!(first, second);
    }
}
