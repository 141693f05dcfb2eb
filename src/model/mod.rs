//! Detection models behind a swappable slot.
//!
//! The inference path and the swap path share one [`slot::ModelSlot`]; a
//! single mutex makes sure a frame is never run against a half-loaded model.

use ffmpeg_pipe::frame::VideoFrame;
use serde::Serialize;

pub mod annotate;
pub mod onnx;
pub mod registry;
pub mod slot;

pub use registry::{ModelPreset, ModelRegistry};
pub use slot::ModelSlot;

/// One detected object, in frame pixel coordinates.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Detection {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub score: f32,
    pub label: String,
}

/// A loaded model. Detection takes `&self`: one detector serves every
/// stream, so a result may depend on nothing but the frame given.
pub trait Detector: Send {
    /// Preset this detector was built from.
    fn name(&self) -> &str;
    fn detect(&self, frame: &VideoFrame) -> anyhow::Result<Vec<Detection>>;
}

/// Builds a detector from a preset.
pub trait ModelLoader: Send + Sync {
    fn load(&self, preset: &ModelPreset) -> Result<Box<dyn Detector>, ModelLoadError>;
}

#[derive(Debug, thiserror::Error)]
pub enum ModelLoadError {
    #[error("model {0} does not exist")]
    UnknownPreset(String),
    #[error("failed to load model {name}: {reason}")]
    Load { name: String, reason: String },
}
