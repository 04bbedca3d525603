use anyhow::Result;

use crate::detect::result::Detection;
use crate::frame::Frame;

/// Detector backend trait.
///
/// A backend is an opaque pretrained model: one frame in, the full list of
/// detections for that frame out. Results replace, never extend, whatever the
/// previous call returned.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>>;

    /// Optional warm-up hook, run once before the first request.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
