//! Attendance camera.
//!
//! Captures webcam video, runs a pretrained object detector on the live feed,
//! draws the results as box-and-label overlays, and saves named snapshots of
//! the current frame as timestamped PNG attendance records.
//!
//! # Module Structure
//!
//! - `frame`: RGB frames and the latest-frame slot
//! - `ingest`: camera sources and the capture pump
//! - `detect`: detection records and detector backends
//! - `session`: the controller owning the detecting / video-visible flags
//! - `detection_loop`: the one-request-at-a-time detection cycle
//! - `render`: overlay drawing and the fixed-cadence render loop
//! - `attendance`: capture, naming and saving of attendance snapshots
//! - `runtime`: thread wiring and shutdown
//! - `config`: file and environment configuration

pub mod attendance;
pub mod config;
pub mod detect;
pub mod detection_loop;
pub mod frame;
pub mod ingest;
pub mod render;
pub mod runtime;
pub mod session;
pub mod ui;

pub use attendance::{AttendanceDesk, CaptureOutcome, DirectorySink, DownloadSink, PendingCapture};
pub use config::AppConfig;
pub use detect::{BackendRegistry, Detection, DetectorBackend, SharedBackend, StubBackend};
pub use detection_loop::{CycleState, CycleStats, DetectionCycle, DetectionWorker, SharedDetections};
pub use frame::{Frame, LatestFrame};
pub use ingest::{CameraConfig, CameraSource, CapturePump};
pub use render::{Canvas, ImageCanvas, RenderLoop};
pub use runtime::{Runtime, RuntimeHandle};
pub use session::{Session, SessionSnapshot, WaitOutcome};
