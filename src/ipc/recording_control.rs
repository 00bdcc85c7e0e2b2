use super::shm::SharedMemory;
use crate::error::CamResult;
use std::mem;
use std::sync::atomic::{AtomicI32, Ordering};

/// Shared `is_recording` word written by the UI and the video process.
///
/// Relaxed loads and stores: a race costs at most one poll of latency.
pub struct RecordingControl {
    memory: SharedMemory,
}

impl RecordingControl {
    pub fn attach(key: i32) -> CamResult<Self> {
        let memory = SharedMemory::attach(key, mem::size_of::<i32>())?;
        Ok(Self { memory })
    }

    fn word(&self) -> &AtomicI32 {
        // SAFETY: shmat returns page-aligned memory of at least 4 bytes that
        // stays mapped for the life of self; AtomicI32 has i32's layout
        unsafe { &*(self.memory.as_ptr() as *const AtomicI32) }
    }

    pub fn is_recording(&self) -> bool {
        self.word().load(Ordering::Relaxed) != 0
    }

    pub fn set_recording(&self, recording: bool) {
        self.word().store(recording as i32, Ordering::Relaxed);
    }

    /// Flip the flag; returns the new value
    pub fn toggle(&self) -> bool {
        let previous = self.word().fetch_xor(1, Ordering::Relaxed);
        previous == 0
    }

    pub fn remove(&self) -> CamResult<()> {
        self.memory.mark_for_removal()
    }
}
