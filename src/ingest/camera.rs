//! Camera frame source.
//!
//! `CameraSource` is the native capture surface: it opens a local V4L2 device
//! (feature `ingest-v4l2`) or, for `stub://` paths, synthesizes a moving scene.
//! Every frame leaves this module as RGB24 sized to the active format.

use anyhow::{anyhow, Result};
#[cfg(feature = "ingest-v4l2")]
use anyhow::Context;
#[cfg(feature = "ingest-v4l2")]
use ouroboros::self_referencing;
#[cfg(feature = "ingest-v4l2")]
use std::time::{Duration, Instant};

#[cfg(feature = "ingest-v4l2")]
use super::normalize::{normalize_to_rgb, PixelFormat};
use crate::frame::{expected_len, Frame};

/// Configuration for a camera source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CameraConfig {
    /// Device path (e.g., "/dev/video0") or `stub://<name>`.
    pub device: String,
    /// Target frame rate (frames per second).
    pub target_fps: u32,
    /// Preferred frame width.
    pub width: u32,
    /// Preferred frame height.
    pub height: u32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            device: "stub://webcam".to_string(),
            target_fps: 30,
            width: 540,
            height: 380,
        }
    }
}

/// Camera frame source.
pub struct CameraSource {
    backend: CameraBackend,
}

enum CameraBackend {
    Synthetic(SyntheticCamera),
    #[cfg(feature = "ingest-v4l2")]
    Device(DeviceCamera),
}

impl CameraSource {
    pub fn new(config: CameraConfig) -> Result<Self> {
        if config.width == 0 || config.height == 0 {
            return Err(anyhow!(
                "camera size must be non-zero, got {}x{}",
                config.width,
                config.height
            ));
        }
        if config.device.starts_with("stub://") {
            return Ok(Self {
                backend: CameraBackend::Synthetic(SyntheticCamera::new(config)),
            });
        }
        #[cfg(feature = "ingest-v4l2")]
        {
            Ok(Self {
                backend: CameraBackend::Device(DeviceCamera::new(config)),
            })
        }
        #[cfg(not(feature = "ingest-v4l2"))]
        {
            Err(anyhow!(
                "camera device {} requires the ingest-v4l2 feature",
                config.device
            ))
        }
    }

    /// Open the device and negotiate the capture format.
    pub fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.connect(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.connect(),
        }
    }

    /// Capture the next frame as RGB24.
    pub fn next_frame(&mut self) -> Result<Frame> {
        match &mut self.backend {
            CameraBackend::Synthetic(source) => source.next_frame(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.next_frame(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        match &self.backend {
            CameraBackend::Synthetic(_) => true,
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.is_healthy(),
        }
    }

    pub fn stats(&self) -> CameraStats {
        match &self.backend {
            CameraBackend::Synthetic(source) => source.stats(),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.stats(),
        }
    }

    /// Active frame size after format negotiation.
    pub fn dimensions(&self) -> (u32, u32) {
        match &self.backend {
            CameraBackend::Synthetic(source) => (source.config.width, source.config.height),
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => (source.active_width, source.active_height),
        }
    }

    pub fn target_fps(&self) -> u32 {
        match &self.backend {
            CameraBackend::Synthetic(source) => source.config.target_fps,
            #[cfg(feature = "ingest-v4l2")]
            CameraBackend::Device(source) => source.config.target_fps,
        }
    }
}

/// Statistics for a camera source.
#[derive(Clone, Debug)]
pub struct CameraStats {
    pub frames_captured: u64,
    pub device: String,
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://)
// ----------------------------------------------------------------------------

const SYNTHETIC_BLOCK: u32 = 60;

struct SyntheticCamera {
    config: CameraConfig,
    frame_count: u64,
}

impl SyntheticCamera {
    fn new(config: CameraConfig) -> Self {
        Self {
            config,
            frame_count: 0,
        }
    }

    fn connect(&mut self) -> Result<()> {
        log::info!(
            "CameraSource: connected to {} (synthetic {}x{})",
            self.config.device,
            self.config.width,
            self.config.height
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        self.frame_count += 1;
        Frame::new(
            self.generate_pixels()?,
            self.config.width,
            self.config.height,
            self.frame_count,
        )
    }

    /// Dark gradient background with a bright block sweeping left to right.
    fn generate_pixels(&self) -> Result<Vec<u8>> {
        let (w, h) = (self.config.width, self.config.height);
        let span = w.saturating_sub(SYNTHETIC_BLOCK).max(1) as u64;
        let block_x = (self.frame_count * 4 % span) as u32;
        let block_y = h.saturating_sub(SYNTHETIC_BLOCK) / 2;

        let mut pixels = Vec::with_capacity(expected_len(w, h)?);
        for y in 0..h {
            for x in 0..w {
                let inside = x >= block_x
                    && x < block_x + SYNTHETIC_BLOCK
                    && y >= block_y
                    && y < block_y + SYNTHETIC_BLOCK;
                if inside {
                    pixels.extend_from_slice(&[230, 200, 60]);
                } else {
                    let shade = (u64::from(y) * 64 / u64::from(h.max(1))) as u8;
                    pixels.extend_from_slice(&[shade, shade, shade.saturating_add(32)]);
                }
            }
        }
        Ok(pixels)
    }

    fn stats(&self) -> CameraStats {
        CameraStats {
            frames_captured: self.frame_count,
            device: self.config.device.clone(),
        }
    }
}

// ----------------------------------------------------------------------------
// V4L2 device source
// ----------------------------------------------------------------------------

#[cfg(feature = "ingest-v4l2")]
struct DeviceCamera {
    config: CameraConfig,
    state: Option<DeviceCameraState>,
    format: PixelFormat,
    frame_count: u64,
    last_frame_at: Option<Instant>,
    last_error: Option<String>,
    active_width: u32,
    active_height: u32,
}

#[cfg(feature = "ingest-v4l2")]
#[self_referencing]
struct DeviceCameraState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

#[cfg(feature = "ingest-v4l2")]
impl DeviceCamera {
    fn new(config: CameraConfig) -> Self {
        Self {
            active_width: config.width,
            active_height: config.height,
            config,
            state: None,
            format: PixelFormat::Yuyv,
            frame_count: 0,
            last_frame_at: None,
            last_error: None,
        }
    }

    fn connect(&mut self) -> Result<()> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let mut device = v4l::Device::with_path(&self.config.device)
            .with_context(|| format!("open v4l2 device {}", self.config.device))?;
        let mut format = device.format().context("read v4l2 format")?;
        format.width = self.config.width;
        format.height = self.config.height;
        format.fourcc = v4l::FourCC::new(b"YUYV");

        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(err) => {
                log::warn!(
                    "CameraSource: failed to set format on {}: {}",
                    self.config.device,
                    err
                );
                device
                    .format()
                    .context("read v4l2 format after set failure")?
            }
        };
        self.format = PixelFormat::from_fourcc(&format.fourcc.repr).ok_or_else(|| {
            anyhow!(
                "v4l2 device {} negotiated unsupported pixel format {}",
                self.config.device,
                format.fourcc
            )
        })?;

        if self.config.target_fps > 0 {
            let params = v4l::video::capture::Parameters::with_fps(self.config.target_fps);
            if let Err(err) = device.set_params(&params) {
                log::warn!(
                    "CameraSource: failed to set fps on {}: {}",
                    self.config.device,
                    err
                );
            }
        }

        self.active_width = format.width;
        self.active_height = format.height;
        self.last_error = None;

        let state = DeviceCameraStateBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, 4)
                    .map_err(|err| anyhow::Error::new(err).context("create v4l2 buffer stream"))
            },
        }
        .try_build()
        .map_err(|err| {
            self.last_error = Some(err.to_string());
            err
        })?;
        self.state = Some(state);

        log::info!(
            "CameraSource: connected to {} ({}x{} {:?})",
            self.config.device,
            self.active_width,
            self.active_height,
            self.format
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Frame> {
        use v4l::io::traits::CaptureStream;

        let state = self.state.as_mut().context("v4l2 device not connected")?;
        let (buf, _meta) = state
            .with_mut(|fields| fields.stream.next())
            .map_err(|err| {
                self.last_error = Some(err.to_string());
                anyhow::Error::new(err).context("capture v4l2 frame")
            })?;
        let rgb = normalize_to_rgb(buf, self.active_width, self.active_height, self.format)?;

        self.frame_count += 1;
        self.last_frame_at = Some(Instant::now());
        Frame::new(rgb, self.active_width, self.active_height, self.frame_count)
    }

    fn is_healthy(&self) -> bool {
        if self.last_error.is_some() {
            return false;
        }
        let Some(last_frame_at) = self.last_frame_at else {
            return true;
        };
        last_frame_at.elapsed() <= self.health_grace()
    }

    fn stats(&self) -> CameraStats {
        CameraStats {
            frames_captured: self.frame_count,
            device: self.config.device.clone(),
        }
    }

    fn health_grace(&self) -> Duration {
        let base_ms = if self.config.target_fps == 0 {
            2_000
        } else {
            (1000 / self.config.target_fps).saturating_mul(6)
        };
        Duration::from_millis(base_ms.max(2_000) as u64)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn stub_config() -> CameraConfig {
        CameraConfig {
            device: "stub://test".to_string(),
            target_fps: 10,
            width: 160,
            height: 120,
        }
    }

    #[test]
    fn synthetic_camera_produces_sized_frames() -> Result<()> {
        let mut source = CameraSource::new(stub_config())?;
        source.connect()?;

        let frame = source.next_frame()?;
        assert_eq!((frame.width, frame.height), (160, 120));
        assert_eq!(frame.pixels().len(), 160 * 120 * 3);
        assert_eq!(source.dimensions(), (160, 120));
        Ok(())
    }

    #[test]
    fn synthetic_scene_moves_between_frames() -> Result<()> {
        let mut source = CameraSource::new(stub_config())?;
        source.connect()?;

        let first = source.next_frame()?;
        let second = source.next_frame()?;
        assert_eq!(second.sequence, first.sequence + 1);
        assert_ne!(first.pixels(), second.pixels());
        assert_eq!(source.stats().frames_captured, 2);
        Ok(())
    }

    #[test]
    fn zero_sized_camera_is_rejected() {
        let config = CameraConfig {
            width: 0,
            ..stub_config()
        };
        assert!(CameraSource::new(config).is_err());
    }

    #[test]
    fn oversized_synthetic_frames_error_instead_of_overflowing() -> Result<()> {
        let mut source = CameraSource::new(CameraConfig {
            width: u32::MAX,
            height: u32::MAX,
            ..stub_config()
        })?;
        source.connect()?;
        let err = source.next_frame().err().expect("error");
        assert!(err.to_string().contains("overflow"));
        Ok(())
    }

    #[cfg(not(feature = "ingest-v4l2"))]
    #[test]
    fn device_paths_need_v4l2_feature() {
        let config = CameraConfig {
            device: "/dev/video0".to_string(),
            ..stub_config()
        };
        let err = CameraSource::new(config).err().expect("error");
        assert!(err.to_string().contains("ingest-v4l2"));
    }
}
