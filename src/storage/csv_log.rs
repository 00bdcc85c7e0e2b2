use super::rotating::RecordFormat;
use crate::error::{ActionCamError, CamResult};
use crate::types::FusedSample;
use std::fs::File;
use std::io::{Seek, SeekFrom};

pub const ATTITUDE_HEADER: [&str; 4] = ["Timestamp", "Roll(deg)", "Pitch(deg)", "Yaw(deg)"];

/// Attitude rows in degrees, flushed after every record
pub struct AttitudeCsv {
    writer: csv::Writer<File>,
}

impl AttitudeCsv {
    pub fn row(sample: &FusedSample) -> [String; 4] {
        [
            sample.timestamp.to_string(),
            format!("{:.2}", sample.roll_deg()),
            format!("{:.2}", sample.pitch_deg()),
            format!("{:.2}", sample.yaw_deg()),
        ]
    }
}

fn csv_error(e: csv::Error) -> ActionCamError {
    ActionCamError::Storage(format!("csv: {}", e))
}

impl RecordFormat for AttitudeCsv {
    type Record = FusedSample;

    fn start(mut file: File, existing_len: u64) -> CamResult<Self> {
        file.seek(SeekFrom::Start(existing_len))?;
        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if existing_len == 0 {
            writer.write_record(ATTITUDE_HEADER).map_err(csv_error)?;
            writer.flush()?;
        }
        Ok(Self { writer })
    }

    fn append(&mut self, sample: &FusedSample) -> CamResult<()> {
        self.writer
            .write_record(Self::row(sample))
            .map_err(csv_error)?;
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::rotating::{LogTarget, RotatingLog};
    use crate::types::Timestamp;
    use chrono::{Duration, Local};
    use std::f64::consts::PI;

    #[test]
    fn test_row_format() {
        let sample = FusedSample {
            roll: PI / 2.0,
            pitch: -PI / 4.0,
            yaw: 0.0,
            timestamp: Timestamp::new(1_700_000_000, 42),
        };
        assert_eq!(
            AttitudeCsv::row(&sample),
            [
                "1700000000.000000042".to_string(),
                "90.00".to_string(),
                "-45.00".to_string(),
                "0.00".to_string()
            ]
        );
    }

    #[test]
    fn test_file_has_header_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let target = LogTarget::new(dir.path(), "imu", "csv", Duration::hours(24));
        let mut log: RotatingLog<AttitudeCsv> = RotatingLog::new(target);

        let now = Local::now();
        for i in 0..3 {
            let sample = FusedSample {
                roll: 0.01 * i as f64,
                timestamp: Timestamp::new(100 + i, 0),
                ..FusedSample::default()
            };
            log.write(&sample, &now).unwrap();
        }

        let mut reader = csv::Reader::from_path(log.current_path().unwrap()).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(headers.iter().collect::<Vec<_>>(), ATTITUDE_HEADER.to_vec());

        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 3);
        assert_eq!(&rows[2][0], "102.000000000");
        assert_eq!(&rows[2][1], "1.15");
    }

    #[test]
    fn test_appending_to_existing_file_skips_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("imu_emergency.csv");
        let existing = "Timestamp,Roll(deg),Pitch(deg),Yaw(deg)\n1.000000000,0.00,0.00,0.00\n";
        std::fs::write(&path, existing).unwrap();

        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .unwrap();
        let len = file.metadata().unwrap().len();
        let mut csv = AttitudeCsv::start(file, len).unwrap();
        csv.append(&FusedSample {
            timestamp: Timestamp::new(2, 0),
            ..FusedSample::default()
        })
        .unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.matches("Timestamp").count(), 1);
        assert!(text.ends_with("2.000000000,0.00,0.00,0.00\n"));
    }
}
