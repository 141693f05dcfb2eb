use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A named model file and the thresholds it runs with.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelPreset {
    pub name: String,
    /// ONNX export of the detection network.
    pub path: PathBuf,
    /// Minimum class score for a detection to be kept.
    pub confidence: f32,
    /// Overlap above which the weaker of two boxes is suppressed.
    pub iou: f32,
    /// Side of the square network input.
    pub input_size: u32,
    /// Class names by index. Empty means the 80 COCO classes.
    pub labels: Vec<String>,
}

impl Default for ModelPreset {
    fn default() -> Self {
        Self {
            name: String::new(),
            path: PathBuf::new(),
            confidence: 0.5,
            iou: 0.45,
            input_size: 640,
            labels: Vec::new(),
        }
    }
}

impl ModelPreset {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            ..Default::default()
        }
    }

    /// Reject thresholds no model could run with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.name.trim().is_empty() {
            anyhow::bail!("model name is required");
        }
        if !(0.0..=1.0).contains(&self.confidence) {
            anyhow::bail!("{}: confidence must be in [0, 1], got {}", self.name, self.confidence);
        }
        if !(self.iou > 0.0 && self.iou <= 1.0) {
            anyhow::bail!("{}: iou must be in (0, 1], got {}", self.name, self.iou);
        }
        if self.input_size == 0 || self.input_size % 32 != 0 {
            anyhow::bail!("{}: input_size must be a positive multiple of 32, got {}", self.name, self.input_size);
        }
        Ok(())
    }
}

/// Presets the slot may switch between, in configuration order.
#[derive(Clone, Debug, Default)]
pub struct ModelRegistry {
    presets: Vec<ModelPreset>,
}

impl ModelRegistry {
    pub fn new(presets: Vec<ModelPreset>) -> Self {
        let mut registry = Self::default();
        for preset in presets {
            registry.insert(preset);
        }
        registry
    }

    /// Add a preset, replacing any preset with the same name.
    pub fn insert(&mut self, preset: ModelPreset) {
        match self.presets.iter_mut().find(|p| p.name == preset.name) {
            Some(existing) => *existing = preset,
            None => self.presets.push(preset),
        }
    }

    pub fn get(&self, name: &str) -> Option<&ModelPreset> {
        self.presets.iter().find(|p| p.name == name)
    }

    pub fn names(&self) -> Vec<String> {
        self.presets.iter().map(|p| p.name.clone()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }
}

/// Presets shipped with the default configuration: the small and medium
/// YOLOv5 exports under `models/`.
pub fn default_presets() -> Vec<ModelPreset> {
    vec![
        ModelPreset::new("yolov5s", "models/yolov5s.onnx"),
        ModelPreset::new("yolov5m", "models/yolov5m.onnx"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_replaces_same_name() {
        let mut registry = ModelRegistry::new(default_presets());
        assert_eq!(registry.names(), vec!["yolov5s", "yolov5m"]);

        let mut preset = ModelPreset::new("yolov5s", "/opt/models/yolov5s-int8.onnx");
        preset.confidence = 0.25;
        registry.insert(preset);
        assert_eq!(registry.names().len(), 2);
        let replaced = registry.get("yolov5s").unwrap();
        assert_eq!(replaced.confidence, 0.25);
        assert_eq!(replaced.path, PathBuf::from("/opt/models/yolov5s-int8.onnx"));
        assert!(registry.get("yolov8n").is_none());
    }

    #[test]
    fn test_validate_thresholds() {
        let preset = ModelPreset::new("yolov5s", "models/yolov5s.onnx");
        assert!(preset.validate().is_ok());

        let mut bad = preset.clone();
        bad.confidence = 1.5;
        assert!(bad.validate().is_err());

        let mut bad = preset.clone();
        bad.iou = 0.0;
        assert!(bad.validate().is_err());

        let mut bad = preset.clone();
        bad.input_size = 0;
        assert!(bad.validate().is_err());

        let mut bad = preset;
        bad.input_size = 100;
        assert!(bad.validate().is_err());
    }
}
