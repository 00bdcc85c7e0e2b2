use crate::error::{ActionCamError, CamResult};
use libc::{c_int, c_void, key_t};
use log::debug;
use std::io;
use std::ptr::{self, NonNull};

/// Attached SysV shared memory segment, detached on drop.
///
/// The handle only knows where the bytes are; callers choose the
/// synchronization (a semaphore for frames, atomics for flags).
#[derive(Debug)]
pub struct SharedMemory {
    id: c_int,
    key: key_t,
    ptr: NonNull<u8>,
    len: usize,
}

// The mapping is process-wide; access discipline lives in the wrappers
unsafe impl Send for SharedMemory {}
unsafe impl Sync for SharedMemory {}

impl SharedMemory {
    /// Attach `len` bytes under `key`, creating the segment if absent.
    ///
    /// An existing segment smaller than `len` is rejected by the kernel.
    pub fn attach(key: i32, len: usize) -> CamResult<Self> {
        // SAFETY: plain syscalls; the returned address is checked before use
        unsafe {
            let id = libc::shmget(key as key_t, len, libc::IPC_CREAT | 0o666);
            if id < 0 {
                return Err(ActionCamError::last_os("shmget"));
            }
            let addr = libc::shmat(id, ptr::null(), 0);
            if addr == usize::MAX as *mut c_void {
                return Err(ActionCamError::last_os("shmat"));
            }
            let ptr = NonNull::new(addr as *mut u8).ok_or_else(|| ActionCamError::Ipc {
                op: "shmat",
                source: io::Error::new(io::ErrorKind::Other, "segment mapped at null"),
            })?;
            debug!("Attached shm key {} id {} ({} bytes)", key, id, len);
            Ok(Self {
                id,
                key: key as key_t,
                ptr,
                len,
            })
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn key(&self) -> i32 {
        self.key as i32
    }

    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// Mark the segment for deletion once every process has detached
    pub fn mark_for_removal(&self) -> CamResult<()> {
        // SAFETY: plain syscall
        if unsafe { libc::shmctl(self.id, libc::IPC_RMID, ptr::null_mut()) } < 0 {
            return Err(ActionCamError::last_os("shmctl"));
        }
        Ok(())
    }
}

impl Drop for SharedMemory {
    fn drop(&mut self) {
        // SAFETY: ptr came from shmat and is detached exactly once
        unsafe {
            libc::shmdt(self.ptr.as_ptr() as *const c_void);
        }
    }
}
