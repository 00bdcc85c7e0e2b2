//! SysV message queue carrying fused attitude to other processes.

use crate::error::{ActionCamError, CamResult};
use crate::types::FusedSample;
use libc::{c_int, c_long, c_void, key_t};
use log::{info, warn};
use std::io;
use std::mem;
use std::ptr;

pub const ATTITUDE_MTYPE: c_long = 1;

/// Wire record; layout must match the C consumers byte for byte
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AttitudeMessage {
    pub mtype: c_long,
    pub roll: f32,
    pub pitch: f32,
    pub yaw: f32,
    pub tv_sec: libc::time_t,
    pub tv_nsec: c_long,
}

impl AttitudeMessage {
    /// Bytes after `mtype`, the size handed to msgsnd/msgrcv
    pub const PAYLOAD_SIZE: usize = mem::size_of::<Self>() - mem::size_of::<c_long>();

    pub fn from_fused(sample: &FusedSample) -> Self {
        Self {
            mtype: ATTITUDE_MTYPE,
            roll: sample.roll as f32,
            pitch: sample.pitch as f32,
            yaw: sample.yaw as f32,
            tv_sec: sample.timestamp.secs as libc::time_t,
            tv_nsec: sample.timestamp.nanos as c_long,
        }
    }

    fn zeroed() -> Self {
        Self {
            mtype: 0,
            roll: 0.0,
            pitch: 0.0,
            yaw: 0.0,
            tv_sec: 0,
            tv_nsec: 0,
        }
    }
}

#[derive(Debug)]
pub struct MessageQueue {
    id: c_int,
    key: key_t,
}

impl MessageQueue {
    /// Remove any queue left behind under `key`, then create a new one
    pub fn create_fresh(key: i32) -> CamResult<Self> {
        // SAFETY: plain syscalls on integer handles
        unsafe {
            let stale = libc::msgget(key as key_t, 0o666);
            if stale >= 0 {
                libc::msgctl(stale, libc::IPC_RMID, ptr::null_mut());
                info!("Removed stale message queue 0x{:X}", key);
            }
            let id = libc::msgget(key as key_t, libc::IPC_CREAT | 0o666);
            if id < 0 {
                return Err(ActionCamError::last_os("msgget"));
            }
            info!("Message queue ready: key 0x{:X}, id {}", key, id);
            Ok(Self {
                id,
                key: key as key_t,
            })
        }
    }

    /// Attach to an existing queue
    pub fn open(key: i32) -> CamResult<Self> {
        // SAFETY: plain syscall
        let id = unsafe { libc::msgget(key as key_t, 0o666) };
        if id < 0 {
            return Err(ActionCamError::last_os("msgget"));
        }
        Ok(Self {
            id,
            key: key as key_t,
        })
    }

    pub fn key(&self) -> i32 {
        self.key as i32
    }

    /// Non-blocking send; a full queue is reported as an error
    pub fn send(&self, message: &AttitudeMessage) -> CamResult<()> {
        // SAFETY: message is repr(C) and outlives the call; the kernel reads
        // PAYLOAD_SIZE bytes after mtype
        let rc = unsafe {
            libc::msgsnd(
                self.id,
                message as *const AttitudeMessage as *const c_void,
                AttitudeMessage::PAYLOAD_SIZE,
                libc::IPC_NOWAIT,
            )
        };
        if rc < 0 {
            return Err(ActionCamError::last_os("msgsnd"));
        }
        Ok(())
    }

    /// Next attitude record, or `None` if the queue is empty
    pub fn try_receive(&self) -> CamResult<Option<AttitudeMessage>> {
        let mut message = AttitudeMessage::zeroed();
        // SAFETY: buffer is a valid, writable AttitudeMessage
        let rc = unsafe {
            libc::msgrcv(
                self.id,
                &mut message as *mut AttitudeMessage as *mut c_void,
                AttitudeMessage::PAYLOAD_SIZE,
                ATTITUDE_MTYPE,
                libc::IPC_NOWAIT,
            )
        };
        if rc < 0 {
            let err = io::Error::last_os_error();
            if err.raw_os_error() == Some(libc::ENOMSG) {
                return Ok(None);
            }
            return Err(ActionCamError::Ipc {
                op: "msgrcv",
                source: err,
            });
        }
        Ok(Some(message))
    }

    /// Destroy the kernel object
    pub fn remove(self) -> CamResult<()> {
        // SAFETY: plain syscall
        if unsafe { libc::msgctl(self.id, libc::IPC_RMID, ptr::null_mut()) } < 0 {
            warn!("Failed to remove message queue 0x{:X}", self.key);
            return Err(ActionCamError::last_os("msgctl"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::test_keys::unique_key;
    use crate::types::Timestamp;

    #[test]
    fn test_payload_excludes_mtype() {
        assert_eq!(
            AttitudeMessage::PAYLOAD_SIZE,
            mem::size_of::<AttitudeMessage>() - mem::size_of::<c_long>()
        );
    }

    #[test]
    fn test_send_and_receive() {
        let key = unique_key(0x3A00_0000);
        let queue = MessageQueue::create_fresh(key).unwrap();

        let fused = FusedSample {
            roll: 0.1,
            pitch: -0.2,
            yaw: 3.0,
            timestamp: Timestamp::new(1_700_000_000, 123_456_789),
        };
        queue.send(&AttitudeMessage::from_fused(&fused)).unwrap();

        let reader = MessageQueue::open(key).unwrap();
        let received = reader.try_receive().unwrap().unwrap();
        assert_eq!(received, AttitudeMessage::from_fused(&fused));
        assert!(reader.try_receive().unwrap().is_none());

        queue.remove().unwrap();
    }

    #[test]
    fn test_create_fresh_discards_stale_messages() {
        let key = unique_key(0x3B00_0000);
        let first = MessageQueue::create_fresh(key).unwrap();
        first
            .send(&AttitudeMessage::from_fused(&FusedSample::default()))
            .unwrap();

        let second = MessageQueue::create_fresh(key).unwrap();
        assert!(second.try_receive().unwrap().is_none());
        second.remove().unwrap();
    }
}
