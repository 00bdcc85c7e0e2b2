//! Video-side recording control and frame geometry.

pub mod recorder;

pub use recorder::{
    ControlPoller, FileRecordingSink, RecorderState, RecordingController, RecordingSink,
};

use serde::{Deserialize, Serialize};

/// BGRA
pub const BYTES_PER_PIXEL: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameLayout {
    pub width: u32,
    pub height: u32,
}

impl FrameLayout {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn stride(&self) -> usize {
        self.width as usize * BYTES_PER_PIXEL
    }

    pub fn frame_bytes(&self) -> usize {
        self.stride() * self.height as usize
    }
}
