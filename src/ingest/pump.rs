//! Capture pump: moves frames from the camera into the shared slots.
//!
//! The pump publishes every frame to the detection/render slot. While the
//! session's video surface is visible it also mirrors the frame into the
//! video slot; hiding the surface empties it.

use anyhow::Result;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use super::camera::CameraSource;
use crate::frame::LatestFrame;
use crate::session::Session;

const ERROR_BACKOFF: Duration = Duration::from_millis(200);

pub struct CapturePump {
    source: CameraSource,
    session: Arc<Session>,
    frames: LatestFrame,
    video: LatestFrame,
    interval: Duration,
    consecutive_errors: u32,
}

impl CapturePump {
    pub fn new(
        source: CameraSource,
        session: Arc<Session>,
        frames: LatestFrame,
        video: LatestFrame,
    ) -> Self {
        let interval = Duration::from_millis(1000 / u64::from(source.target_fps().max(1)));
        Self {
            source,
            session,
            frames,
            video,
            interval,
            consecutive_errors: 0,
        }
    }

    pub fn spawn(self) -> Result<JoinHandle<()>> {
        let join = std::thread::Builder::new()
            .name("capture".to_string())
            .spawn(move || self.run())?;
        Ok(join)
    }

    fn run(mut self) {
        while !self.session.is_shutdown() {
            let started = Instant::now();
            match self.pump_once() {
                Ok(_) => self.consecutive_errors = 0,
                Err(err) => {
                    self.consecutive_errors += 1;
                    log::warn!(
                        "capture from {} failed ({} in a row): {:#}",
                        self.source.stats().device,
                        self.consecutive_errors,
                        err
                    );
                    std::thread::sleep(ERROR_BACKOFF);
                    continue;
                }
            }
            if let Some(rest) = self.interval.checked_sub(started.elapsed()) {
                std::thread::sleep(rest);
            }
        }
        let stats = self.source.stats();
        log::debug!(
            "capture pump stopped after {} frames from {}",
            stats.frames_captured,
            stats.device
        );
    }

    /// Capture and publish one frame. Returns true for the very first frame.
    pub fn pump_once(&mut self) -> Result<bool> {
        let frame = Arc::new(self.source.next_frame()?);
        if self.session.is_video_visible() {
            self.video.publish_shared(frame.clone());
        } else {
            self.video.clear();
        }
        let first = self.frames.publish_shared(frame);
        if first {
            let (w, h) = self.source.dimensions();
            log::info!("video ready ({}x{}); start detecting to see overlays", w, h);
        }
        Ok(first)
    }
}
