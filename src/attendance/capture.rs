//! Attendance capture workflow.
//!
//! Capturing is split in two so the name prompt never blocks rendering:
//!
//! 1. `begin()` pauses detection, rasterizes the latest frame and encodes it
//!    as PNG, handing back a `PendingCapture`.
//! 2. `complete()` takes the user's answer. A missing or blank name skips the
//!    download; otherwise the image is delivered under a timestamped name.
//!
//! Detection is switched back on after every completed capture, and after any
//! failure that happens once it was paused.

use anyhow::Result;
use chrono::{Local, NaiveDateTime};
use std::path::PathBuf;
use std::sync::Arc;

use super::download::DownloadSink;
use super::filename::attendance_filename;
use crate::frame::LatestFrame;
use crate::render::encode_png;
use crate::session::Session;

type Clock = Box<dyn Fn() -> NaiveDateTime + Send>;

/// A captured frame waiting for its name.
#[derive(Debug)]
pub struct PendingCapture {
    png: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub frame_sequence: u64,
}

impl PendingCapture {
    pub fn png(&self) -> &[u8] {
        &self.png
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CaptureOutcome {
    Saved(PathBuf),
    Declined,
}

pub struct AttendanceDesk {
    session: Arc<Session>,
    frames: LatestFrame,
    sink: Box<dyn DownloadSink>,
    clock: Clock,
}

impl AttendanceDesk {
    pub fn new(
        session: Arc<Session>,
        frames: LatestFrame,
        sink: impl DownloadSink + 'static,
    ) -> Self {
        Self {
            session,
            frames,
            sink: Box::new(sink),
            clock: Box::new(|| Local::now().naive_local()),
        }
    }

    /// Replace the wall clock used for file names.
    pub fn with_clock(mut self, clock: impl Fn() -> NaiveDateTime + Send + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    /// Pause detection and grab the current frame.
    ///
    /// Returns `Ok(None)` without touching any state when the capture source or
    /// detector is missing, or no frame has arrived yet.
    pub fn begin(&self) -> Result<Option<PendingCapture>> {
        let snapshot = self.session.snapshot();
        if !snapshot.source_ready || !snapshot.detector_ready {
            return Ok(None);
        }
        let Some(frame) = self.frames.latest() else {
            log::info!("capture skipped: no frame received yet");
            return Ok(None);
        };

        self.session.pause_detection();
        let encoded = frame.to_image().and_then(|image| encode_png(&image));
        match encoded {
            Ok(png) => Ok(Some(PendingCapture {
                png,
                width: frame.width,
                height: frame.height,
                frame_sequence: frame.sequence,
            })),
            Err(err) => {
                self.session.resume_detection();
                Err(err.context("capturing attendance frame"))
            }
        }
    }

    /// Finish a capture with the user's answer and resume detection.
    pub fn complete(
        &mut self,
        pending: PendingCapture,
        name: Option<&str>,
    ) -> Result<CaptureOutcome> {
        let outcome = self.deliver(pending, name);
        self.session.resume_detection();
        outcome
    }

    fn deliver(&mut self, pending: PendingCapture, name: Option<&str>) -> Result<CaptureOutcome> {
        // Only the line ending is stripped; the name is otherwise kept as typed.
        let name = name.map(|name| name.trim_end_matches(['\r', '\n']));
        let Some(name) = name.filter(|name| !name.trim().is_empty()) else {
            log::info!("capture of frame {} declined", pending.frame_sequence);
            return Ok(CaptureOutcome::Declined);
        };
        let filename = attendance_filename(name, &(self.clock)());
        log::info!("{}", filename);
        let path = self.sink.deliver(&filename, &pending.png)?;
        Ok(CaptureOutcome::Saved(path))
    }
}
