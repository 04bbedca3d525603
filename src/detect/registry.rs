use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

use super::backend::DetectorBackend;
use super::backends::StubBackend;
use crate::config::DetectorSettings;

/// Shared handle to a backend. `detect` takes `&mut self`, hence the `Mutex`.
pub type SharedBackend = Arc<Mutex<dyn DetectorBackend>>;

/// Registry of detector backends keyed by name.
pub struct BackendRegistry {
    backends: BTreeMap<String, SharedBackend>,
    default_name: Option<String>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            backends: BTreeMap::new(),
            default_name: None,
        }
    }

    /// Build the registry for a detector configuration, with the configured
    /// backend as default. The stub backend is always available.
    pub fn from_settings(settings: &DetectorSettings) -> Result<Self> {
        let mut registry = Self::new();
        registry.register(StubBackend::with_detections(
            settings.stub_detections.clone(),
        ));
        if settings.backend == "tract" {
            registry.register_tract(settings)?;
        }
        registry.set_default(&settings.backend)?;
        log::info!("detector loaded: {}", settings.backend);
        Ok(registry)
    }

    #[cfg(feature = "backend-tract")]
    fn register_tract(&mut self, settings: &DetectorSettings) -> Result<()> {
        let model_path = settings
            .model_path
            .as_ref()
            .ok_or_else(|| anyhow!("the tract detector requires model_path"))?;
        let mut backend =
            super::TractBackend::new(model_path, settings.input_size, settings.input_size)?
                .with_threshold(settings.confidence_threshold)
                .with_max_detections(settings.max_detections);
        backend.warm_up()?;
        self.register(backend);
        Ok(())
    }

    #[cfg(not(feature = "backend-tract"))]
    fn register_tract(&mut self, _settings: &DetectorSettings) -> Result<()> {
        Err(anyhow!("the tract detector requires the backend-tract feature"))
    }

    /// Register a backend. The first registered backend becomes the default.
    pub fn register<B: DetectorBackend + 'static>(&mut self, backend: B) {
        let name = backend.name().to_string();
        if self.default_name.is_none() {
            self.default_name = Some(name.clone());
        }
        self.backends.insert(name, Arc::new(Mutex::new(backend)));
    }

    /// Set default backend by name.
    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.backends.contains_key(name) {
            return Err(anyhow!(
                "backend '{}' not registered (available: {})",
                name,
                self.list().join(", ")
            ));
        }
        self.default_name = Some(name.to_string());
        Ok(())
    }

    /// Get backend by name.
    pub fn get(&self, name: &str) -> Option<SharedBackend> {
        self.backends.get(name).cloned()
    }

    /// Get default backend.
    pub fn default_backend(&self) -> Option<SharedBackend> {
        self.default_name.as_ref().and_then(|name| self.get(name))
    }

    /// List registered backends in name order.
    pub fn list(&self) -> Vec<String> {
        self.backends.keys().cloned().collect()
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::detect::Detection;
    use crate::frame::Frame;

    #[test]
    fn first_registered_backend_is_default() -> Result<()> {
        let mut registry = BackendRegistry::new();
        assert!(registry.default_backend().is_none());

        registry.register(StubBackend::new());
        let backend = registry.default_backend().expect("default");
        assert_eq!(backend.lock().unwrap().name(), "stub");
        assert_eq!(registry.list(), vec!["stub".to_string()]);
        Ok(())
    }

    #[test]
    fn unknown_default_is_rejected() {
        let mut registry = BackendRegistry::new();
        registry.register(StubBackend::new());
        let err = registry.set_default("tract").unwrap_err();
        assert!(err.to_string().contains("available: stub"));
    }

    #[test]
    fn settings_select_stub_with_scripted_detections() -> Result<()> {
        let mut settings = AppConfig::default().detector;
        settings.stub_detections = vec![Detection::new("person", 0.9, 0.0, 0.0, 5.0, 5.0)];
        let registry = BackendRegistry::from_settings(&settings)?;

        let backend = registry.default_backend().expect("default");
        let frame = Frame::filled(10, 10, [0, 0, 0], 1)?;
        let found = backend.lock().unwrap().detect(&frame)?;
        assert_eq!(found.len(), 1);
        Ok(())
    }

    #[cfg(not(feature = "backend-tract"))]
    #[test]
    fn tract_without_feature_is_an_error() {
        let mut settings = AppConfig::default().detector;
        settings.backend = "tract".to_string();
        settings.model_path = Some("ssd.onnx".into());
        assert!(BackendRegistry::from_settings(&settings).is_err());
    }
}
