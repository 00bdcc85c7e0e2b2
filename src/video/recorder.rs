use crate::error::CamResult;
use crate::ipc::{CommandFile, CommandTarget, ControlCommand, RecordingControl};
use crate::storage::{open_with_fallback, LogTarget};
use chrono::{DateTime, Local};
use log::{error, info};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

/// Recorder state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecorderState {
    /// Pipeline running, valve closed
    Idle,
    /// Valve open, frames go to the current file
    Recording,
}

/// The recording branch of the video pipeline
pub trait RecordingSink: Send {
    /// Gate frames into the file; a closed valve drops them
    fn set_valve(&mut self, open: bool);

    /// Push everything already accepted out to the current file
    fn quiesce(&mut self) -> CamResult<()>;

    /// Switch output to a new, already-created file
    fn reopen(&mut self, file: File, path: PathBuf) -> CamResult<()>;

    /// Returns false when the valve dropped the frame
    fn write_frame(&mut self, frame: &[u8]) -> CamResult<bool>;
}

/// Raw frames appended to a file behind a valve
#[derive(Default)]
pub struct FileRecordingSink {
    valve_open: bool,
    file: Option<File>,
    path: Option<PathBuf>,
    frames_written: u64,
}

impl FileRecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }
}

impl RecordingSink for FileRecordingSink {
    fn set_valve(&mut self, open: bool) {
        self.valve_open = open;
    }

    fn quiesce(&mut self) -> CamResult<()> {
        if let Some(file) = self.file.as_mut() {
            file.flush()?;
        }
        Ok(())
    }

    fn reopen(&mut self, file: File, path: PathBuf) -> CamResult<()> {
        self.file = Some(file);
        self.path = Some(path);
        self.frames_written = 0;
        Ok(())
    }

    fn write_frame(&mut self, frame: &[u8]) -> CamResult<bool> {
        if !self.valve_open {
            return Ok(false);
        }
        match self.file.as_mut() {
            Some(file) => {
                file.write_all(frame)?;
                self.frames_written += 1;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// {Idle, Recording} machine driving a sink.
///
/// Start: close valve, quiesce, open a new timestamped file, open valve.
/// Stop: close valve; the file stays open until the next start.
pub struct RecordingController<S: RecordingSink> {
    state: RecorderState,
    sink: S,
    target: LogTarget,
    current: Option<PathBuf>,
}

impl<S: RecordingSink> RecordingController<S> {
    pub fn new(sink: S, target: LogTarget) -> Self {
        Self {
            state: RecorderState::Idle,
            sink,
            target,
            current: None,
        }
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    pub fn is_recording(&self) -> bool {
        self.state == RecorderState::Recording
    }

    pub fn current_path(&self) -> Option<&Path> {
        self.current.as_deref()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Returns false if already recording
    pub fn start(&mut self, now: &DateTime<Local>) -> CamResult<bool> {
        if self.state == RecorderState::Recording {
            return Ok(false);
        }

        self.sink.set_valve(false);
        self.sink.quiesce()?;
        let (file, path, _) = open_with_fallback(&self.target, now)?;
        self.sink.reopen(file, path.clone())?;
        self.sink.set_valve(true);

        info!("Recording to {}", path.display());
        self.current = Some(path);
        self.state = RecorderState::Recording;
        Ok(true)
    }

    /// Returns false if already idle
    pub fn stop(&mut self) -> bool {
        if self.state == RecorderState::Idle {
            return false;
        }
        self.sink.set_valve(false);
        self.state = RecorderState::Idle;
        info!("Recording stopped");
        true
    }

    pub fn write_frame(&mut self, frame: &[u8]) -> CamResult<bool> {
        self.sink.write_frame(frame)
    }

    pub fn apply_at(&mut self, command: ControlCommand, now: &DateTime<Local>) {
        match command {
            ControlCommand::Start => {
                if let Err(e) = self.start(now) {
                    error!("Failed to start recording: {}", e);
                }
            }
            ControlCommand::Stop => {
                self.stop();
            }
            ControlCommand::Status => match &self.current {
                Some(path) => info!("Recorder {:?}, last file {}", self.state, path.display()),
                None => info!("Recorder {:?}", self.state),
            },
        }
    }
}

impl<S: RecordingSink> CommandTarget<ControlCommand> for RecordingController<S> {
    fn apply(&mut self, command: ControlCommand) {
        self.apply_at(command, &Local::now());
    }
}

/// Polls the shared recording word and the command file.
///
/// Without the shared word (attach failed) only the command file drives
/// the recorder.
pub struct ControlPoller<S: RecordingSink> {
    controller: Arc<Mutex<RecordingController<S>>>,
    shared: Option<RecordingControl>,
    command_file: CommandFile,
    interval: Duration,
}

impl<S: RecordingSink> ControlPoller<S> {
    pub fn new(
        controller: Arc<Mutex<RecordingController<S>>>,
        shared: Option<RecordingControl>,
        command_file: CommandFile,
    ) -> Self {
        Self {
            controller,
            shared,
            command_file,
            interval: Duration::from_millis(100),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn shared(&self) -> Option<&RecordingControl> {
        self.shared.as_ref()
    }

    /// One poll. The command file wins over the shared word; after a
    /// command-file change the word is rewritten so the UI sees it.
    pub fn poll_once(&self, now: &DateTime<Local>) {
        let mut controller = self
            .controller
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(command) = self.command_file.take::<ControlCommand>() {
            info!("Command file: {}", command.as_token());
            controller.apply_at(command, now);
            if let Some(shared) = &self.shared {
                shared.set_recording(controller.is_recording());
            }
            return;
        }

        let Some(shared) = &self.shared else {
            return;
        };
        let wanted = shared.is_recording();
        if wanted == controller.is_recording() {
            return;
        }
        if wanted {
            if let Err(e) = controller.start(now) {
                error!("Failed to start recording: {}", e);
                // Clear the request so the UI does not show a phantom recording
                shared.set_recording(false);
            }
        } else {
            controller.stop();
        }
    }

    pub fn run(self) {
        loop {
            self.poll_once(&Local::now());
            thread::sleep(self.interval);
        }
    }
}
