use std::{path::Path, time::Duration};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::{
    media::pipe::{EncoderProfile, ToolPaths},
    model::{ModelPreset, registry::default_presets},
};

/// Process-wide settings, read once at startup. Every field has a default,
/// so an empty JSON object is a valid file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub listen: String,
    /// Source for `/video_feed`: camera index, device path or URL.
    pub camera: String,
    pub tools: ToolPaths,
    pub jpeg_quality: u8,
    pub fps_window_secs: f64,
    pub encoder: EncoderProfile,
    pub default_model: String,
    pub models: Vec<ModelPreset>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_string(),
            camera: "0".to_string(),
            tools: ToolPaths::default(),
            jpeg_quality: 80,
            fps_window_secs: 3.0,
            encoder: EncoderProfile::default(),
            default_model: "yolov5s".to_string(),
            models: default_presets(),
        }
    }
}

impl RelayConfig {
    /// Read `path`, or fall back to defaults when no path is given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("parsing config {}", path.display()))?;
        config.validate()?;
        log::info!("loaded config from {}", path.display());
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if !(self.fps_window_secs.is_finite() && self.fps_window_secs > 0.0) {
            anyhow::bail!("fps_window_secs must be positive, got {}", self.fps_window_secs);
        }
        for preset in &self.models {
            preset.validate()?;
        }
        if !self.models.is_empty() && !self.models.iter().any(|m| m.name == self.default_model) {
            anyhow::bail!("default_model {:?} is not among the configured models", self.default_model);
        }
        Ok(())
    }

    pub fn fps_window(&self) -> Duration {
        Duration::from_secs_f64(self.fps_window_secs)
    }
}
