use serde::{Deserialize, Serialize};

/// One detected object in frame pixel coordinates (top-left origin).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    /// Model confidence in `[0, 1]`.
    pub confidence: f32,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Detection {
    pub fn new(
        label: impl Into<String>,
        confidence: f32,
        x: f32,
        y: f32,
        width: f32,
        height: f32,
    ) -> Self {
        Self {
            label: label.into(),
            confidence: confidence.clamp(0.0, 1.0),
            x,
            y,
            width,
            height,
        }
    }
}
