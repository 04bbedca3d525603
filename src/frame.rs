//! Captured frames and the shared "latest frame" slot.
//!
//! - `Frame`: owned RGB24 pixels plus dimensions and capture metadata.
//! - `LatestFrame`: single-slot handoff between the capture pump and its
//!   readers (detection worker, render loop, attendance capture).
//!
//! Only the most recent frame is retained. Readers take an `Arc<Frame>` so a
//! slow detection request never holds up the capture pump.

use anyhow::{anyhow, Result};
use image::RgbImage;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

/// Bytes per RGB24 pixel.
pub const RGB_CHANNELS: usize = 3;

// ----------------------------------------------------------------------------
// Frame
// ----------------------------------------------------------------------------

/// A single RGB24 frame from a capture source.
#[derive(Debug)]
pub struct Frame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Monotonic sequence number assigned by the source.
    pub sequence: u64,
    captured_at: Instant,
}

impl Frame {
    /// Wrap RGB24 pixels. Fails when the buffer does not match `width * height * 3`.
    pub fn new(data: Vec<u8>, width: u32, height: u32, sequence: u64) -> Result<Self> {
        let expected = expected_len(width, height)?;
        if data.len() != expected {
            return Err(anyhow!(
                "frame length mismatch: expected {} RGB bytes for {}x{}, got {}",
                expected,
                width,
                height,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
            sequence,
            captured_at: Instant::now(),
        })
    }

    /// Solid-colour frame, mostly useful for tests and synthetic sources.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3], sequence: u64) -> Result<Self> {
        let len = expected_len(width, height)?;
        let data = rgb.iter().copied().cycle().take(len).collect();
        Self::new(data, width, height, sequence)
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    pub fn age_ms(&self) -> u128 {
        self.captured_at.elapsed().as_millis()
    }

    /// Rasterize into an offscreen image buffer sized to the frame.
    pub fn to_image(&self) -> Result<RgbImage> {
        RgbImage::from_raw(self.width, self.height, self.data.clone())
            .ok_or_else(|| anyhow!("frame buffer does not fit {}x{}", self.width, self.height))
    }
}

pub(crate) fn expected_len(width: u32, height: u32) -> Result<usize> {
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|v| v.checked_mul(RGB_CHANNELS))
        .ok_or_else(|| anyhow!("frame dimensions overflow"))
}

// ----------------------------------------------------------------------------
// LatestFrame: single-slot handoff
// ----------------------------------------------------------------------------

/// Shared slot holding the most recently captured frame.
///
/// Cloning the slot clones the handle, not the frame.
#[derive(Clone, Debug, Default)]
pub struct LatestFrame {
    slot: Arc<Mutex<Option<Arc<Frame>>>>,
}

impl LatestFrame {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current frame. Returns true when the slot was empty.
    pub fn publish(&self, frame: Frame) -> bool {
        self.publish_shared(Arc::new(frame))
    }

    pub fn publish_shared(&self, frame: Arc<Frame>) -> bool {
        let mut slot = self.lock();
        let first = slot.is_none();
        *slot = Some(frame);
        first
    }

    pub fn latest(&self) -> Option<Arc<Frame>> {
        self.lock().clone()
    }

    pub fn clear(&self) {
        self.lock().take();
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_none()
    }

    fn lock(&self) -> MutexGuard<'_, Option<Arc<Frame>>> {
        // The slot is a plain pointer swap; a panicked writer cannot leave it half-written.
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
