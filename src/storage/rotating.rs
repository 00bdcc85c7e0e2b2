//! Timestamped record files that rotate by age or on each new recording.

use crate::error::{ActionCamError, CamResult};
use chrono::{DateTime, Duration, Local};
use log::{error, info, warn};
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// On-disk record format behind a [`RotatingLog`]
pub trait RecordFormat: Sized {
    type Record: ?Sized;

    /// Take ownership of a freshly opened file. `existing_len` is non-zero
    /// only for the emergency file, which may hold earlier output.
    fn start(file: File, existing_len: u64) -> CamResult<Self>;

    /// Append one record and flush it to the OS
    fn append(&mut self, record: &Self::Record) -> CamResult<()>;
}

/// Where and how files are named
#[derive(Clone, Debug)]
pub struct LogTarget {
    pub dir: PathBuf,
    pub fallback_dir: PathBuf,
    pub prefix: String,
    pub extension: String,
    pub max_age: Duration,
}

impl LogTarget {
    pub fn new(dir: impl Into<PathBuf>, prefix: &str, extension: &str, max_age: Duration) -> Self {
        Self {
            dir: dir.into(),
            fallback_dir: std::env::temp_dir(),
            prefix: prefix.to_string(),
            extension: extension.to_string(),
            max_age,
        }
    }

    pub fn with_fallback_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.fallback_dir = dir.into();
        self
    }

    pub fn emergency_path(&self) -> PathBuf {
        self.fallback_dir
            .join(format!("{}_emergency.{}", self.prefix, self.extension))
    }
}

/// `prefix_YYYYMMDD_HHMMSS.ext`, or `prefix_YYYYMMDD_HHMMSS_N.ext` for a
/// non-zero `collision`
pub fn timestamped_name(
    prefix: &str,
    extension: &str,
    now: &DateTime<Local>,
    collision: u32,
) -> String {
    let stamp = now.format("%Y%m%d_%H%M%S");
    if collision == 0 {
        format!("{}_{}.{}", prefix, stamp, extension)
    } else {
        format!("{}_{}_{}.{}", prefix, stamp, collision, extension)
    }
}

/// Create a new file named for `now`, adding `_N` on a same-second
/// collision instead of truncating the existing file.
pub fn create_unique(
    dir: &Path,
    prefix: &str,
    extension: &str,
    now: &DateTime<Local>,
) -> io::Result<(File, PathBuf)> {
    let mut collision = 0u32;
    loop {
        let name = timestamped_name(prefix, extension, now, collision);
        let path = dir.join(name);
        match OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(file) => return Ok((file, path)),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => collision += 1,
            Err(e) => return Err(e),
        }
    }
}

/// Open a new file in the primary directory, then the fallback directory,
/// then the fixed emergency file. Returns the file, its path and the
/// length of any content already in it.
pub fn open_with_fallback(
    target: &LogTarget,
    now: &DateTime<Local>,
) -> CamResult<(File, PathBuf, u64)> {
    match create_unique(&target.dir, &target.prefix, &target.extension, now) {
        Ok((file, path)) => return Ok((file, path, 0)),
        Err(e) => warn!(
            "Cannot create {} file in {}: {}",
            target.prefix,
            target.dir.display(),
            e
        ),
    }

    match create_unique(&target.fallback_dir, &target.prefix, &target.extension, now) {
        Ok((file, path)) => {
            warn!("Falling back to {}", path.display());
            return Ok((file, path, 0));
        }
        Err(e) => warn!(
            "Cannot create {} file in {}: {}",
            target.prefix,
            target.fallback_dir.display(),
            e
        ),
    }

    let path = target.emergency_path();
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&path)
        .map_err(|e| {
            error!("Emergency file {} unavailable: {}", path.display(), e);
            ActionCamError::Storage(format!("no writable location for {}", target.prefix))
        })?;
    let existing_len = file.metadata()?.len();
    error!("Writing {} records to emergency file {}", target.prefix, path.display());
    Ok((file, path, existing_len))
}

struct OpenLog<F> {
    format: F,
    path: PathBuf,
    opened_at: DateTime<Local>,
}

/// Lazily opened, rotating record file.
///
/// Nothing is created until the first record arrives. A new file starts
/// when the current one is older than `max_age` or after
/// [`RotatingLog::begin_session`].
pub struct RotatingLog<F: RecordFormat> {
    target: LogTarget,
    current: Option<OpenLog<F>>,
}

impl<F: RecordFormat> RotatingLog<F> {
    pub fn new(target: LogTarget) -> Self {
        Self {
            target,
            current: None,
        }
    }

    pub fn target(&self) -> &LogTarget {
        &self.target
    }

    pub fn current_path(&self) -> Option<&Path> {
        self.current.as_ref().map(|log| log.path.as_path())
    }

    /// Close the current file so the next record opens a fresh one
    pub fn begin_session(&mut self) {
        if let Some(log) = self.current.take() {
            info!("Closed {}", log.path.display());
        }
    }

    pub fn needs_rotation(&self, now: &DateTime<Local>) -> bool {
        match &self.current {
            Some(log) => *now - log.opened_at >= self.target.max_age,
            None => false,
        }
    }

    pub fn write(&mut self, record: &F::Record, now: &DateTime<Local>) -> CamResult<()> {
        if self.needs_rotation(now) {
            info!(
                "Rotating {} file after {} hours",
                self.target.prefix,
                self.target.max_age.num_hours()
            );
            self.current = None;
        }

        let mut log = match self.current.take() {
            Some(log) => log,
            None => {
                let (file, path, existing_len) = open_with_fallback(&self.target, now)?;
                info!("Opened {}", path.display());
                OpenLog {
                    format: F::start(file, existing_len)?,
                    path,
                    opened_at: *now,
                }
            }
        };
        let result = log.format.append(record);
        self.current = Some(log);
        result
    }
}
