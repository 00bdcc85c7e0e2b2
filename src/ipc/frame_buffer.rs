//! Preview frame hand-off between the video process and the UI.
//!
//! One BGRA frame, no header, no double-buffering. The semaphore is held for
//! the whole copy on both sides, so a reader sees either the previous frame
//! or the next one, never a mix.

use super::semaphore::{NamedSemaphore, SemaphoreGuard};
use super::shm::SharedMemory;
use crate::error::{ActionCamError, CamResult};
use crate::video::FrameLayout;
use log::{error, info};
use std::ops::{Deref, DerefMut};
use std::slice;

pub struct SharedFrameBuffer {
    memory: SharedMemory,
    lock: NamedSemaphore,
    layout: FrameLayout,
}

impl SharedFrameBuffer {
    pub fn attach(key: i32, semaphore: &str, layout: FrameLayout) -> CamResult<Self> {
        let memory = SharedMemory::attach(key, layout.frame_bytes())?;
        let lock = NamedSemaphore::open(semaphore, 1)?;
        info!(
            "Frame buffer attached: key {}, {}x{} ({} bytes), semaphore {}",
            key,
            layout.width,
            layout.height,
            layout.frame_bytes(),
            semaphore
        );
        Ok(Self {
            memory,
            lock,
            layout,
        })
    }

    pub fn layout(&self) -> FrameLayout {
        self.layout
    }

    /// Exclusive access to the frame bytes until the guard drops
    pub fn lock(&self) -> CamResult<FrameGuard<'_>> {
        let sem = self.lock.acquire()?;
        // SAFETY: the mapping is frame_bytes long and lives as long as self;
        // the held semaphore keeps every other accessor out
        let bytes = unsafe {
            slice::from_raw_parts_mut(self.memory.as_ptr(), self.layout.frame_bytes())
        };
        Ok(FrameGuard { bytes, _sem: sem })
    }

    /// Publish one complete frame; wrong-sized input is rejected untouched
    pub fn write_frame(&self, frame: &[u8]) -> CamResult<()> {
        let expected = self.layout.frame_bytes();
        if frame.len() != expected {
            error!(
                "Rejecting frame of {} bytes, buffer holds {}",
                frame.len(),
                expected
            );
            return Err(ActionCamError::FrameSize {
                expected,
                actual: frame.len(),
            });
        }
        let mut guard = self.lock()?;
        guard.copy_from_slice(frame);
        Ok(())
    }

    pub fn read_frame_into(&self, out: &mut [u8]) -> CamResult<()> {
        let expected = self.layout.frame_bytes();
        if out.len() != expected {
            return Err(ActionCamError::FrameSize {
                expected,
                actual: out.len(),
            });
        }
        let guard = self.lock()?;
        out.copy_from_slice(&guard);
        Ok(())
    }

    pub fn read_frame(&self) -> CamResult<Vec<u8>> {
        let guard = self.lock()?;
        Ok(guard.to_vec())
    }

    /// Tear down the kernel objects (segment and semaphore name)
    pub fn remove(&self) -> CamResult<()> {
        self.memory.mark_for_removal()?;
        self.lock.unlink()
    }
}

/// Borrowed view of the frame while the semaphore is held
pub struct FrameGuard<'a> {
    bytes: &'a mut [u8],
    _sem: SemaphoreGuard<'a>,
}

impl Deref for FrameGuard<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.bytes
    }
}

impl DerefMut for FrameGuard<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.bytes
    }
}
