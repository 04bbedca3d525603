//! Frame ingestion.
//!
//! - `CameraSource`: local V4L2 webcam (feature: ingest-v4l2) or a synthetic
//!   `stub://` scene
//! - `CapturePump`: background thread publishing frames to the shared slots
//!
//! Everything downstream sees RGB24 `Frame`s only.

pub mod camera;
#[cfg(feature = "ingest-v4l2")]
mod normalize;
pub mod pump;

pub use camera::{CameraConfig, CameraSource, CameraStats};
pub use pump::CapturePump;
