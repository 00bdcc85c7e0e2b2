//! Textual control over a named pipe.
//!
//! Any process can `echo start > /tmp/imu_control_fifo`. The listener thread
//! reopens the pipe after every writer, so each write is one command.

use super::c_path;
use crate::error::{ActionCamError, CamResult};
use crate::health::SensorHealth;
use log::{debug, error, info, warn};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::marker::PhantomData;
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Largest command payload read per open
pub const COMMAND_BUFFER_LEN: usize = 32;

const REOPEN_DELAY: Duration = Duration::from_secs(1);

/// A command set that can be parsed from one whitespace-trimmed token
pub trait Vocabulary: Sized {
    fn parse_token(token: &str) -> Option<Self>;
}

/// Whatever a parsed command drives
pub trait CommandTarget<C>: Send {
    fn apply(&mut self, command: C);
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlCommand {
    Start,
    Stop,
    Status,
}

impl ControlCommand {
    pub fn as_token(&self) -> &'static str {
        match self {
            ControlCommand::Start => "start",
            ControlCommand::Stop => "stop",
            ControlCommand::Status => "status",
        }
    }
}

impl Vocabulary for ControlCommand {
    fn parse_token(token: &str) -> Option<Self> {
        match token {
            "start" => Some(ControlCommand::Start),
            "stop" => Some(ControlCommand::Stop),
            "status" => Some(ControlCommand::Status),
            _ => None,
        }
    }
}

/// Strip surrounding whitespace and NUL padding
pub fn trim_payload(payload: &str) -> &str {
    payload.trim_matches(|c: char| c.is_whitespace() || c == '\0')
}

pub fn parse_payload<C: Vocabulary>(bytes: &[u8]) -> Option<C> {
    let text = String::from_utf8_lossy(bytes);
    let token = trim_payload(&text);
    let parsed = C::parse_token(token);
    if parsed.is_none() {
        debug!("Ignoring unknown command {:?}", token);
    }
    parsed
}

/// Per-subsystem running flag; off until a `start` arrives
#[derive(Clone, Debug, Default)]
pub struct ControlFlag {
    running: Arc<Mutex<bool>>,
}

impl ControlFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        *self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the previous value
    pub fn set(&self, running: bool) -> bool {
        let mut guard = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, running)
    }
}

/// Drives a [`ControlFlag`]; `status` logs the subsystem's health line
pub struct FlagTarget {
    name: String,
    flag: ControlFlag,
    health: Option<Arc<SensorHealth>>,
}

impl FlagTarget {
    pub fn new(name: &str, flag: ControlFlag) -> Self {
        Self {
            name: name.to_string(),
            flag,
            health: None,
        }
    }

    pub fn with_health(mut self, health: Arc<SensorHealth>) -> Self {
        self.health = Some(health);
        self
    }
}

impl CommandTarget<ControlCommand> for FlagTarget {
    fn apply(&mut self, command: ControlCommand) {
        match command {
            ControlCommand::Start => {
                self.flag.set(true);
                info!("[{}] Received command: start", self.name);
            }
            ControlCommand::Stop => {
                self.flag.set(false);
                info!("[{}] Received command: stop", self.name);
            }
            ControlCommand::Status => {
                let state = if self.flag.is_running() {
                    "running"
                } else {
                    "stopped"
                };
                match &self.health {
                    Some(health) => info!("[{}] {} | {}", self.name, state, health.format_status()),
                    None => info!("[{}] {}", self.name, state),
                }
            }
        }
    }
}

/// Listener for one named pipe, generic over vocabulary and target
pub struct NamedPipeChannel<C, T> {
    path: PathBuf,
    target: T,
    _vocabulary: PhantomData<fn() -> C>,
}

impl<C, T> NamedPipeChannel<C, T>
where
    C: Vocabulary + Copy + 'static,
    T: CommandTarget<C> + 'static,
{
    pub fn new(path: impl Into<PathBuf>, target: T) -> Self {
        Self {
            path: path.into(),
            target,
            _vocabulary: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    /// Replace any stale node at the path with a fresh FIFO
    pub fn create_pipe(&self) -> CamResult<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        let c_path = c_path(&self.path)?;
        // SAFETY: c_path is a valid NUL-terminated string for the call's duration
        if unsafe { libc::mkfifo(c_path.as_ptr(), 0o666) } != 0 {
            return Err(ActionCamError::last_os("mkfifo"));
        }
        // mkfifo is subject to umask; writers from other users need 0666
        fs::set_permissions(&self.path, fs::Permissions::from_mode(0o666))?;
        Ok(())
    }

    /// Parse a payload and hand it to the target
    pub fn handle_payload(&mut self, bytes: &[u8]) -> Option<C> {
        let command = parse_payload::<C>(bytes)?;
        self.target.apply(command);
        Some(command)
    }

    /// Block until one writer connects and closes, then apply its command
    pub fn receive_once(&mut self) -> CamResult<Option<C>> {
        let mut pipe = File::open(&self.path)?;
        let mut buf = [0u8; COMMAND_BUFFER_LEN];
        let n = pipe.read(&mut buf)?;
        drop(pipe);
        if n == 0 {
            return Ok(None);
        }
        Ok(self.handle_payload(&buf[..n]))
    }

    /// Listener loop; returns only if the pipe cannot be created
    pub fn run(mut self) {
        if let Err(e) = self.create_pipe() {
            error!(
                "Failed to create command pipe {}: {}",
                self.path.display(),
                e
            );
            return;
        }
        info!("Command listener started. FIFO: {}", self.path.display());

        loop {
            if let Err(e) = self.receive_once() {
                warn!("Command pipe {}: {}", self.path.display(), e);
                thread::sleep(REOPEN_DELAY);
            }
        }
    }

    pub fn spawn(self, thread_name: &str) -> io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name(thread_name.to_string())
            .spawn(move || self.run())
    }
}

/// Write one token to a listening pipe.
///
/// Opens non-blocking so a missing listener is an immediate `ENXIO` rather
/// than a hang.
pub fn send_command(path: &Path, token: &str) -> CamResult<()> {
    let mut pipe = OpenOptions::new()
        .write(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(path)
        .map_err(|source| ActionCamError::Ipc {
            op: "open command pipe",
            source,
        })?;
    pipe.write_all(token.as_bytes())?;
    Ok(())
}
