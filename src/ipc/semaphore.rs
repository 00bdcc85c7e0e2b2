use super::c_name;
use crate::error::{ActionCamError, CamResult};
use std::ffi::CString;
use std::io;

/// POSIX named semaphore used as a cross-process binary lock
#[derive(Debug)]
pub struct NamedSemaphore {
    sem: *mut libc::sem_t,
    name: CString,
}

// sem_wait/sem_post are safe to call concurrently on one handle
unsafe impl Send for NamedSemaphore {}
unsafe impl Sync for NamedSemaphore {}

impl NamedSemaphore {
    /// Open `name`, creating it with `initial` if it does not exist yet
    pub fn open(name: &str, initial: u32) -> CamResult<Self> {
        let c_name = c_name(name)?;
        // SAFETY: variadic sem_open takes mode and value as promoted unsigned ints
        let sem = unsafe {
            libc::sem_open(
                c_name.as_ptr(),
                libc::O_CREAT,
                0o666 as libc::c_uint,
                initial as libc::c_uint,
            )
        };
        if sem == libc::SEM_FAILED {
            return Err(ActionCamError::last_os("sem_open"));
        }
        Ok(Self { sem, name: c_name })
    }

    /// Block until the semaphore is ours; interrupted waits are retried
    pub fn acquire(&self) -> CamResult<SemaphoreGuard<'_>> {
        loop {
            // SAFETY: sem is a live handle from sem_open
            if unsafe { libc::sem_wait(self.sem) } == 0 {
                return Ok(SemaphoreGuard { owner: self });
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(ActionCamError::Ipc {
                    op: "sem_wait",
                    source: err,
                });
            }
        }
    }

    fn release(&self) {
        // SAFETY: only called by a guard that holds one count
        unsafe {
            libc::sem_post(self.sem);
        }
    }

    /// Remove the name; open handles keep working
    pub fn unlink(&self) -> CamResult<()> {
        // SAFETY: name is NUL-terminated
        if unsafe { libc::sem_unlink(self.name.as_ptr()) } < 0 {
            return Err(ActionCamError::last_os("sem_unlink"));
        }
        Ok(())
    }
}

impl Drop for NamedSemaphore {
    fn drop(&mut self) {
        // SAFETY: closed exactly once
        unsafe {
            libc::sem_close(self.sem);
        }
    }
}

/// Holds the semaphore; posts it back when dropped
#[derive(Debug)]
pub struct SemaphoreGuard<'a> {
    owner: &'a NamedSemaphore,
}

impl Drop for SemaphoreGuard<'_> {
    fn drop(&mut self) {
        self.owner.release();
    }
}
