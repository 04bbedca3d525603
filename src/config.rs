use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::detect::Detection;
use crate::ingest::CameraConfig;

const DEFAULT_DEVICE: &str = "stub://webcam";
const DEFAULT_CAMERA_FPS: u32 = 30;
const DEFAULT_WIDTH: u32 = 540;
const DEFAULT_HEIGHT: u32 = 380;
const DEFAULT_BACKEND: &str = "stub";
const DEFAULT_MODEL_INPUT: u32 = 300;
const DEFAULT_CONFIDENCE: f32 = 0.5;
const DEFAULT_MAX_DETECTIONS: usize = 20;
const DEFAULT_RENDER_FPS: u32 = 60;
const DEFAULT_OUTPUT_DIR: &str = "attendance";

#[derive(Debug, Deserialize, Default)]
struct AppConfigFile {
    camera: Option<CameraConfigFile>,
    detector: Option<DetectorConfigFile>,
    render: Option<RenderConfigFile>,
    output: Option<OutputConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    device: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    input_size: Option<u32>,
    confidence_threshold: Option<f32>,
    max_detections: Option<usize>,
    stub_detections: Option<Vec<Detection>>,
}

#[derive(Debug, Deserialize, Default)]
struct RenderConfigFile {
    fps: Option<u32>,
    font_path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct OutputConfigFile {
    dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub camera: CameraConfig,
    pub detector: DetectorSettings,
    pub render: RenderSettings,
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    /// Backend name: `stub` or `tract`.
    pub backend: String,
    pub model_path: Option<PathBuf>,
    /// Square model input edge in pixels.
    pub input_size: u32,
    pub confidence_threshold: f32,
    pub max_detections: usize,
    /// Detections replayed by the stub backend.
    pub stub_detections: Vec<Detection>,
}

/// Command-line values that take precedence over file and environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub device: Option<String>,
    pub backend: Option<String>,
    pub model_path: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub font_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub fps: u32,
    pub font_path: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::from_file(AppConfigFile::default())
    }
}

impl AppConfig {
    /// Load from `ATTENDANCE_CONFIG` (if set), apply environment overrides and validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("ATTENDANCE_CONFIG").ok().map(PathBuf::from);
        Self::load_from(config_path.as_deref())
    }

    /// Like `load`, with an explicit config file path.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        Self::load_with(path, &ConfigOverrides::default())
    }

    /// File, then environment, then `overrides`; validated once at the end.
    pub fn load_with(path: Option<&Path>, overrides: &ConfigOverrides) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.apply_overrides(overrides);
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(device) = &overrides.device {
            self.camera.device = device.clone();
        }
        if let Some(backend) = &overrides.backend {
            self.detector.backend = backend.clone();
        }
        if let Some(model) = &overrides.model_path {
            self.detector.model_path = Some(model.clone());
        }
        if let Some(dir) = &overrides.output_dir {
            self.output_dir = dir.clone();
        }
        if let Some(font) = &overrides.font_path {
            self.render.font_path = Some(font.clone());
        }
    }

    fn from_file(file: AppConfigFile) -> Self {
        let camera = file.camera.unwrap_or_default();
        let camera = CameraConfig {
            device: camera.device.unwrap_or_else(|| DEFAULT_DEVICE.to_string()),
            target_fps: camera.target_fps.unwrap_or(DEFAULT_CAMERA_FPS),
            width: camera.width.unwrap_or(DEFAULT_WIDTH),
            height: camera.height.unwrap_or(DEFAULT_HEIGHT),
        };
        let detector = file.detector.unwrap_or_default();
        let detector = DetectorSettings {
            backend: detector
                .backend
                .unwrap_or_else(|| DEFAULT_BACKEND.to_string()),
            model_path: detector.model_path,
            input_size: detector.input_size.unwrap_or(DEFAULT_MODEL_INPUT),
            confidence_threshold: detector
                .confidence_threshold
                .unwrap_or(DEFAULT_CONFIDENCE),
            max_detections: detector.max_detections.unwrap_or(DEFAULT_MAX_DETECTIONS),
            stub_detections: detector.stub_detections.unwrap_or_default(),
        };
        let render = file.render.unwrap_or_default();
        let render = RenderSettings {
            fps: render.fps.unwrap_or(DEFAULT_RENDER_FPS),
            font_path: render.font_path,
        };
        let output_dir = file
            .output
            .and_then(|output| output.dir)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR));
        Self {
            camera,
            detector,
            render,
            output_dir,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(device) = non_empty_env("ATTENDANCE_CAMERA_DEVICE") {
            self.camera.device = device;
        }
        if let Some(backend) = non_empty_env("ATTENDANCE_DETECTOR") {
            self.detector.backend = backend;
        }
        if let Some(path) = non_empty_env("ATTENDANCE_MODEL_PATH") {
            self.detector.model_path = Some(PathBuf::from(path));
        }
        if let Some(dir) = non_empty_env("ATTENDANCE_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(path) = non_empty_env("ATTENDANCE_FONT_PATH") {
            self.render.font_path = Some(PathBuf::from(path));
        }
        if let Some(fps) = non_empty_env("ATTENDANCE_RENDER_FPS") {
            self.render.fps = fps
                .parse()
                .map_err(|_| anyhow!("ATTENDANCE_RENDER_FPS must be an integer"))?;
        }
        Ok(())
    }

    /// Check ranges and cross-field requirements.
    pub fn validate(&self) -> Result<()> {
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera width and height must be greater than zero"));
        }
        if self.camera.target_fps == 0 {
            return Err(anyhow!("camera target_fps must be greater than zero"));
        }
        if self.render.fps == 0 {
            return Err(anyhow!("render fps must be greater than zero"));
        }
        if !(0.0..=1.0).contains(&self.detector.confidence_threshold) {
            return Err(anyhow!(
                "confidence_threshold must be within [0, 1], got {}",
                self.detector.confidence_threshold
            ));
        }
        if self.detector.input_size == 0 {
            return Err(anyhow!("detector input_size must be greater than zero"));
        }
        match self.detector.backend.as_str() {
            "stub" => {}
            "tract" if self.detector.model_path.is_none() => {
                return Err(anyhow!("the tract detector requires model_path"));
            }
            "tract" => {}
            other => return Err(anyhow!("unknown detector backend '{}'", other)),
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<AppConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .filter(|value| !value.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_describe_stub_webcam() -> Result<()> {
        let cfg = AppConfig::default();
        assert_eq!(cfg.camera.device, "stub://webcam");
        assert_eq!((cfg.camera.width, cfg.camera.height), (540, 380));
        assert_eq!(cfg.detector.backend, "stub");
        assert_eq!(cfg.render.fps, 60);
        assert_eq!(cfg.output_dir, PathBuf::from("attendance"));
        cfg.validate()
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut cfg = AppConfig::default();
        cfg.detector.confidence_threshold = 1.5;
        assert!(cfg.validate().is_err());

        let mut cfg = AppConfig::default();
        cfg.detector.backend = "tract".to_string();
        assert!(cfg.validate().is_err());
        cfg.detector.model_path = Some(PathBuf::from("ssd.onnx"));
        assert!(cfg.validate().is_ok());

        let mut cfg = AppConfig::default();
        cfg.detector.backend = "yolo".to_string();
        assert!(cfg.validate().is_err());

        let mut cfg = AppConfig::default();
        cfg.render.fps = 0;
        assert!(cfg.validate().is_err());
    }
}
