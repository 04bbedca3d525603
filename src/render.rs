//! Overlay rendering.
//!
//! The render loop runs at a fixed cadence, independent of the detection
//! cycle. Each tick draws the latest frame and then every stored detection as
//! a green box with its label inside the top-left corner. Detections may be
//! one frame stale relative to the pixels; the list is always replaced whole,
//! so an overlay never mixes two results.

use ab_glyph::{Font, FontVec, PxScale, ScaleFont};
use anyhow::{anyhow, Context, Result};
use image::{imageops, ImageFormat, Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use std::io::Cursor;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::detect::Detection;
use crate::detection_loop::SharedDetections;
use crate::frame::{Frame, LatestFrame};
use crate::session::Session;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StrokeStyle {
    pub color: [u8; 3],
    pub width: u32,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TextStyle {
    pub color: [u8; 3],
    pub size: f32,
}

/// Bounding boxes: 4px CSS "green".
pub const BOX_STROKE: StrokeStyle = StrokeStyle {
    color: [0, 128, 0],
    width: 4,
};

pub const LABEL_STYLE: TextStyle = TextStyle {
    color: [255, 255, 255],
    size: 24.0,
};

/// Label baseline position relative to the box's top-left corner.
pub const LABEL_OFFSET: (f32, f32) = (10.0, 24.0);

/// Drawing surface used by the render loop.
pub trait Canvas {
    /// Draw the frame with its top-left corner at the canvas origin.
    fn draw_frame(&mut self, frame: &Frame);

    /// Outline a rectangle; the stroke is centred on the edge.
    fn stroke_rect(&mut self, x: f32, y: f32, width: f32, height: f32, style: StrokeStyle);

    /// Draw text with its baseline starting at `(x, y)`.
    fn fill_text(&mut self, text: &str, x: f32, y: f32, style: TextStyle);
}

/// Draw one frame of output. Returns false (and draws nothing) when there is
/// no frame yet or detection is switched off.
pub fn render_frame<C: Canvas + ?Sized>(
    canvas: &mut C,
    frame: Option<&Frame>,
    detections: &[Detection],
    detecting: bool,
) -> bool {
    let Some(frame) = frame else {
        return false;
    };
    if !detecting {
        return false;
    }
    canvas.draw_frame(frame);
    for detection in detections {
        draw_detection(canvas, detection);
    }
    true
}

fn draw_detection<C: Canvas + ?Sized>(canvas: &mut C, detection: &Detection) {
    canvas.stroke_rect(
        detection.x,
        detection.y,
        detection.width,
        detection.height,
        BOX_STROKE,
    );
    canvas.fill_text(
        &detection.label,
        detection.x + LABEL_OFFSET.0,
        detection.y + LABEL_OFFSET.1,
        LABEL_STYLE,
    );
}

// ----------------------------------------------------------------------------
// ImageCanvas
// ----------------------------------------------------------------------------

/// `Canvas` backed by an RGB image buffer.
pub struct ImageCanvas {
    image: RgbImage,
    font: Option<FontVec>,
    warned_missing_font: bool,
}

impl ImageCanvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbImage::new(width, height),
            font: None,
            warned_missing_font: false,
        }
    }

    pub fn with_font(mut self, font: FontVec) -> Self {
        self.font = Some(font);
        self
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn encode_png(&self) -> Result<Vec<u8>> {
        encode_png(&self.image)
    }
}

impl Canvas for ImageCanvas {
    fn draw_frame(&mut self, frame: &Frame) {
        match frame.to_image() {
            Ok(pixels) => imageops::replace(&mut self.image, &pixels, 0, 0),
            Err(err) => log::warn!("skipping frame {}: {}", frame.sequence, err),
        }
    }

    fn stroke_rect(&mut self, x: f32, y: f32, width: f32, height: f32, style: StrokeStyle) {
        if ![x, y, width, height].iter().all(|v| v.is_finite()) {
            log::debug!("skipping non-finite box ({}, {}, {}, {})", x, y, width, height);
            return;
        }
        let half = (style.width / 2) as i32;
        // Clamp to just outside the canvas so the ring arithmetic stays in range.
        let margin = style.width as f32 + 1.0;
        let clamp_x = |v: f32| v.clamp(-margin, self.image.width() as f32 + margin);
        let clamp_y = |v: f32| v.clamp(-margin, self.image.height() as f32 + margin);
        let (left, right) = (clamp_x(x), clamp_x(x + width));
        let (top, bottom) = (clamp_y(y), clamp_y(y + height));
        let (x, y) = (left.round() as i32, top.round() as i32);
        let (w, h) = ((right - left).round() as i32, (bottom - top).round() as i32);
        for ring in 0..style.width as i32 {
            let inset = ring - half;
            let (rw, rh) = (w - 2 * inset, h - 2 * inset);
            if rw <= 0 || rh <= 0 {
                break;
            }
            let rect = Rect::at(x + inset, y + inset).of_size(rw as u32, rh as u32);
            draw_hollow_rect_mut(&mut self.image, rect, Rgb(style.color));
        }
    }

    fn fill_text(&mut self, text: &str, x: f32, y: f32, style: TextStyle) {
        let Some(font) = &self.font else {
            if !self.warned_missing_font {
                log::warn!("no label font configured; drawing boxes without labels");
                self.warned_missing_font = true;
            }
            return;
        };
        if !x.is_finite() || !y.is_finite() {
            return;
        }
        let scale = PxScale::from(style.size);
        // imageproc positions text by its top edge.
        let top = y - font.as_scaled(scale).ascent();
        let (max_x, max_y) = (self.image.width() as f32, self.image.height() as f32);
        draw_text_mut(
            &mut self.image,
            Rgb(style.color),
            x.clamp(-max_x, max_x).round() as i32,
            top.clamp(-max_y, max_y).round() as i32,
            scale,
            font,
            text,
        );
    }
}

pub fn load_font(path: &Path) -> Result<FontVec> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read font file {}", path.display()))?;
    FontVec::try_from_vec(bytes).map_err(|e| anyhow!("invalid font file {}: {}", path.display(), e))
}

pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>> {
    let mut bytes = Cursor::new(Vec::new());
    image
        .write_to(&mut bytes, ImageFormat::Png)
        .context("PNG encoding failed")?;
    Ok(bytes.into_inner())
}

// ----------------------------------------------------------------------------
// RenderLoop
// ----------------------------------------------------------------------------

pub type SharedCanvas = Arc<Mutex<ImageCanvas>>;

pub struct RenderLoop {
    session: Arc<Session>,
    frames: LatestFrame,
    detections: SharedDetections,
    canvas: SharedCanvas,
    interval: Duration,
}

impl RenderLoop {
    pub fn new(
        session: Arc<Session>,
        frames: LatestFrame,
        detections: SharedDetections,
        canvas: SharedCanvas,
        fps: u32,
    ) -> Self {
        Self {
            session,
            frames,
            detections,
            canvas,
            interval: Duration::from_millis(1000 / u64::from(fps.max(1))),
        }
    }

    pub fn spawn(self) -> Result<JoinHandle<()>> {
        let join = std::thread::Builder::new()
            .name("render".to_string())
            .spawn(move || self.run())?;
        Ok(join)
    }

    fn run(self) {
        while !self.session.is_shutdown() {
            let started = Instant::now();
            self.tick();
            if let Some(rest) = self.interval.checked_sub(started.elapsed()) {
                std::thread::sleep(rest);
            }
        }
    }

    /// Render once. Returns whether anything was drawn.
    pub fn tick(&self) -> bool {
        let frame = self.frames.latest();
        let detections = self.detections.snapshot();
        let mut canvas = self
            .canvas
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        render_frame(
            &mut *canvas,
            frame.as_deref(),
            &detections,
            self.session.is_detecting(),
        )
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    enum Op {
        Frame(u64),
        Rect(f32, f32, f32, f32, StrokeStyle),
        Text(String, f32, f32, TextStyle),
    }

    #[derive(Default)]
    struct RecordingCanvas {
        ops: Vec<Op>,
    }

    impl Canvas for RecordingCanvas {
        fn draw_frame(&mut self, frame: &Frame) {
            self.ops.push(Op::Frame(frame.sequence));
        }

        fn stroke_rect(&mut self, x: f32, y: f32, width: f32, height: f32, style: StrokeStyle) {
            self.ops.push(Op::Rect(x, y, width, height, style));
        }

        fn fill_text(&mut self, text: &str, x: f32, y: f32, style: TextStyle) {
            self.ops.push(Op::Text(text.to_string(), x, y, style));
        }
    }

    fn person() -> Detection {
        Detection::new("person", 0.8, 7.0, 148.0, 300.0, 200.0)
    }

    #[test]
    fn renders_frame_then_box_then_label() -> Result<()> {
        let frame = Frame::filled(20, 20, [0, 0, 0], 9)?;
        let mut canvas = RecordingCanvas::default();

        assert!(render_frame(&mut canvas, Some(&frame), &[person()], true));
        assert_eq!(
            canvas.ops,
            vec![
                Op::Frame(9),
                Op::Rect(7.0, 148.0, 300.0, 200.0, BOX_STROKE),
                Op::Text("person".to_string(), 17.0, 172.0, LABEL_STYLE),
            ]
        );
        Ok(())
    }

    #[test]
    fn renders_nothing_without_frame_or_when_disabled() -> Result<()> {
        let frame = Frame::filled(20, 20, [0, 0, 0], 1)?;
        let mut canvas = RecordingCanvas::default();

        assert!(!render_frame(&mut canvas, None, &[person()], true));
        assert!(!render_frame(&mut canvas, Some(&frame), &[person()], false));
        assert!(canvas.ops.is_empty());
        Ok(())
    }

    #[test]
    fn image_canvas_draws_frame_and_green_stroke() -> Result<()> {
        let frame = Frame::filled(40, 30, [200, 10, 10], 1)?;
        let mut canvas = ImageCanvas::new(40, 30);
        let boxed = Detection::new("cup", 0.7, 10.0, 10.0, 12.0, 12.0);

        assert!(render_frame(&mut canvas, Some(&frame), &[boxed], true));
        let image = canvas.image();
        assert_eq!(image.get_pixel(0, 0).0, [200, 10, 10]);
        assert_eq!(image.get_pixel(10, 15).0, BOX_STROKE.color);
        assert_eq!(image.get_pixel(8, 15).0, BOX_STROKE.color);
        assert_eq!(image.get_pixel(16, 16).0, [200, 10, 10]);

        let png = canvas.encode_png()?;
        assert_eq!(&png[1..4], b"PNG");
        Ok(())
    }

    #[test]
    fn out_of_range_boxes_are_clamped_to_canvas() -> Result<()> {
        let frame = Frame::filled(40, 30, [5, 5, 5], 1)?;
        let mut canvas = ImageCanvas::new(40, 30);
        let boxes = [
            Detection::new("huge", 0.9, 0.0, 0.0, 3.0e9, 10.0),
            Detection::new("far", 0.9, -3.0e9, -3.0e9, 10.0, 10.0),
            Detection::new("nan", 0.9, f32::NAN, 0.0, 10.0, f32::INFINITY),
        ];

        assert!(render_frame(&mut canvas, Some(&frame), &boxes, true));
        // The huge box's left and top edges are still drawn.
        assert_eq!(canvas.image().get_pixel(0, 5).0, BOX_STROKE.color);
        assert_eq!(canvas.image().get_pixel(20, 0).0, BOX_STROKE.color);
        assert_eq!(canvas.image().get_pixel(20, 20).0, [5, 5, 5]);
        Ok(())
    }

    #[test]
    fn larger_frames_are_clipped_to_canvas() -> Result<()> {
        let frame = Frame::filled(80, 60, [1, 2, 3], 1)?;
        let mut canvas = ImageCanvas::new(40, 30);
        canvas.draw_frame(&frame);
        assert_eq!(canvas.image().dimensions(), (40, 30));
        assert_eq!(canvas.image().get_pixel(39, 29).0, [1, 2, 3]);
        Ok(())
    }
}
