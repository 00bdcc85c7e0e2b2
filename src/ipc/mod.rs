//! Cross-process plumbing: named pipes, SysV shared memory and message
//! queues, POSIX named semaphores.

pub mod command_channel;
pub mod command_file;
pub mod frame_buffer;
pub mod message_queue;
pub mod recording_control;
pub mod semaphore;
pub mod shm;

pub use command_channel::{
    send_command, CommandTarget, ControlCommand, ControlFlag, FlagTarget, NamedPipeChannel,
    Vocabulary,
};
pub use command_file::CommandFile;
pub use frame_buffer::{FrameGuard, SharedFrameBuffer};
pub use message_queue::{AttitudeMessage, MessageQueue};
pub use recording_control::RecordingControl;
pub use semaphore::{NamedSemaphore, SemaphoreGuard};
pub use shm::SharedMemory;

use crate::error::{ActionCamError, CamResult};
use std::ffi::CString;
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

pub(crate) fn c_path(path: &Path) -> CamResult<CString> {
    CString::new(path.as_os_str().as_bytes()).map_err(|_| ActionCamError::Ipc {
        op: "path conversion",
        source: io::Error::new(io::ErrorKind::InvalidInput, "path contains NUL"),
    })
}

pub(crate) fn c_name(name: &str) -> CamResult<CString> {
    CString::new(name).map_err(|_| ActionCamError::Ipc {
        op: "name conversion",
        source: io::Error::new(io::ErrorKind::InvalidInput, "name contains NUL"),
    })
}
