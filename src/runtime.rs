//! Wiring of the background threads.
//!
//! `Runtime::start` connects a camera source and an optional detector to a
//! fresh `Session` and spawns:
//! - the capture pump (camera -> frame slots)
//! - the detection worker (only when a detector is available)
//! - the render loop (frame + detections -> canvas)
//!
//! `RuntimeHandle::stop` flips the session's shutdown flag, wakes every waiter
//! and joins the threads.

use anyhow::{anyhow, Result};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crate::attendance::{AttendanceDesk, DownloadSink};
use crate::detect::SharedBackend;
use crate::detection_loop::{CycleStats, DetectionWorker, SharedDetections};
use crate::frame::LatestFrame;
use crate::ingest::{CameraSource, CapturePump};
use crate::render::{ImageCanvas, RenderLoop, SharedCanvas};
use crate::session::Session;

pub struct Runtime;

impl Runtime {
    /// Spawn the runtime threads. `source` must already be connected.
    pub fn start(
        source: CameraSource,
        backend: Option<SharedBackend>,
        canvas: ImageCanvas,
        render_fps: u32,
    ) -> Result<RuntimeHandle> {
        let session = Arc::new(Session::new());
        let frames = LatestFrame::new();
        let video = LatestFrame::new();
        let detections = SharedDetections::new();
        let canvas: SharedCanvas = Arc::new(Mutex::new(canvas));
        let mut joins = Vec::new();

        session.mark_source_ready();
        let pump = CapturePump::new(source, session.clone(), frames.clone(), video.clone());
        joins.push(("capture", pump.spawn()?));

        let stats = match backend {
            Some(backend) => {
                session.mark_detector_ready();
                let worker = DetectionWorker::new(
                    session.clone(),
                    frames.clone(),
                    detections.clone(),
                    backend,
                );
                let stats = worker.stats_handle();
                joins.push(("detection", worker.spawn()?));
                stats
            }
            None => {
                log::warn!("no detector available; detection controls are disabled");
                Arc::new(Mutex::new(CycleStats::default()))
            }
        };

        let render = RenderLoop::new(
            session.clone(),
            frames.clone(),
            detections.clone(),
            canvas.clone(),
            render_fps,
        );
        joins.push(("render", render.spawn()?));

        Ok(RuntimeHandle {
            session,
            frames,
            video,
            detections,
            canvas,
            stats,
            joins,
        })
    }
}

pub struct RuntimeHandle {
    session: Arc<Session>,
    frames: LatestFrame,
    video: LatestFrame,
    detections: SharedDetections,
    canvas: SharedCanvas,
    stats: Arc<Mutex<CycleStats>>,
    joins: Vec<(&'static str, JoinHandle<()>)>,
}

impl RuntimeHandle {
    pub fn session(&self) -> Arc<Session> {
        self.session.clone()
    }

    pub fn frames(&self) -> LatestFrame {
        self.frames.clone()
    }

    /// Raw video surface; empty while hidden.
    pub fn video(&self) -> LatestFrame {
        self.video.clone()
    }

    pub fn detections(&self) -> SharedDetections {
        self.detections.clone()
    }

    pub fn canvas(&self) -> SharedCanvas {
        self.canvas.clone()
    }

    pub fn cycle_stats(&self) -> CycleStats {
        *self
            .stats
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Attendance desk bound to this runtime's session and frames.
    pub fn attendance_desk(&self, sink: impl DownloadSink + 'static) -> AttendanceDesk {
        AttendanceDesk::new(self.session(), self.frames(), sink)
    }

    pub fn stop(self) -> Result<()> {
        self.session.shutdown();
        let mut panicked = Vec::new();
        for (name, join) in self.joins {
            if join.join().is_err() {
                panicked.push(name);
            }
        }
        if panicked.is_empty() {
            Ok(())
        } else {
            Err(anyhow!("runtime threads panicked: {}", panicked.join(", ")))
        }
    }
}
