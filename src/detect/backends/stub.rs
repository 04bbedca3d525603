use anyhow::Result;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::Detection;
use crate::frame::Frame;

/// Stub backend. Replays a fixed set of detections for every frame.
///
/// Boxes are clipped to the frame and boxes entirely outside it are dropped,
/// so overlays stay on-canvas when the camera is smaller than the scripted scene.
#[derive(Default)]
pub struct StubBackend {
    scripted: Vec<Detection>,
    calls: u64,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_detections(scripted: Vec<Detection>) -> Self {
        Self { scripted, calls: 0 }
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        self.calls += 1;
        let (fw, fh) = (frame.width as f32, frame.height as f32);
        Ok(self
            .scripted
            .iter()
            .filter_map(|d| {
                let (left, right) = (d.x.max(0.0), (d.x + d.width).min(fw));
                let (top, bottom) = (d.y.max(0.0), (d.y + d.height).min(fh));
                // NaN edges fail this check too.
                if !(right > left && bottom > top) {
                    return None;
                }
                let mut d = d.clone();
                d.x = left;
                d.y = top;
                d.width = right - left;
                d.height = bottom - top;
                Some(d)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_backend_replays_and_clips() -> Result<()> {
        let mut backend = StubBackend::with_detections(vec![
            Detection::new("person", 0.8, 10.0, 20.0, 500.0, 500.0),
            Detection::new("cup", 0.6, 900.0, 10.0, 5.0, 5.0),
        ]);
        let frame = Frame::filled(100, 80, [0, 0, 0], 1)?;

        let results = backend.detect(&frame)?;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].label, "person");
        assert_eq!(results[0].width, 90.0);
        assert_eq!(results[0].height, 60.0);
        assert_eq!(backend.calls(), 1);
        Ok(())
    }

    #[test]
    fn stub_backend_clips_negative_origins() -> Result<()> {
        let mut backend = StubBackend::with_detections(vec![
            Detection::new("offscreen", 0.9, -500.0, 0.0, 100.0, 10.0),
            Detection::new("above", 0.9, 5.0, -40.0, 10.0, 20.0),
            Detection::new("straddling", 0.9, -20.0, -5.0, 50.0, 25.0),
        ]);
        let frame = Frame::filled(100, 80, [0, 0, 0], 1)?;

        let results = backend.detect(&frame)?;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].label, "straddling");
        assert_eq!(
            (results[0].x, results[0].y, results[0].width, results[0].height),
            (0.0, 0.0, 30.0, 20.0)
        );
        Ok(())
    }

    #[test]
    fn empty_stub_detects_nothing() -> Result<()> {
        let mut backend = StubBackend::new();
        let frame = Frame::filled(4, 4, [0, 0, 0], 1)?;
        assert!(backend.detect(&frame)?.is_empty());
        Ok(())
    }
}
