use ffmpeg_pipe::frame::VideoFrame;
use parking_lot::Mutex;

use crate::{
    media::transform::FrameTransform,
    model::{
        Detection, Detector, ModelLoadError, ModelLoader, ModelPreset, ModelRegistry,
        annotate::draw_detections,
    },
};

/// The active detector, shared by the frame path and the swap path.
///
/// Inference and swap take the same lock, so a frame always runs against
/// either the old model or the fully loaded new one. A failed load leaves
/// the previous model in place.
pub struct ModelSlot {
    registry: ModelRegistry,
    loader: Box<dyn ModelLoader>,
    active: Mutex<Option<Box<dyn Detector>>>,
}

impl ModelSlot {
    /// An empty slot. Frames pass through untouched until a model is loaded.
    pub fn new(registry: ModelRegistry, loader: impl ModelLoader + 'static) -> Self {
        Self {
            registry,
            loader: Box::new(loader),
            active: Mutex::new(None),
        }
    }

    /// Build a slot and load `name` into it.
    pub fn with_default(
        registry: ModelRegistry,
        loader: impl ModelLoader + 'static,
        name: &str,
    ) -> Result<Self, ModelLoadError> {
        let slot = Self::new(registry, loader);
        slot.swap(name)?;
        Ok(slot)
    }

    pub fn models(&self) -> Vec<String> {
        self.registry.names()
    }

    pub fn active_name(&self) -> Option<String> {
        self.active.lock().as_ref().map(|d| d.name().to_string())
    }

    /// Replace the active model with preset `name`.
    ///
    /// Blocks until any in-flight inference finishes; frames arriving during
    /// the load wait for it.
    pub fn swap(&self, name: &str) -> Result<(), ModelLoadError> {
        let preset: ModelPreset = self
            .registry
            .get(name)
            .cloned()
            .ok_or_else(|| ModelLoadError::UnknownPreset(name.to_string()))?;

        let mut active = self.active.lock();
        let detector = self.loader.load(&preset)?;
        let previous = active.replace(detector);
        drop(active);

        match previous {
            Some(old) => log::info!("model switched from {} to {}", old.name(), name),
            None => log::info!("model {} loaded", name),
        }
        Ok(())
    }

    /// Run the active model once. Returns an empty list when no model is
    /// loaded or inference fails.
    pub fn infer(&self, frame: &VideoFrame) -> Vec<Detection> {
        let active = self.active.lock();
        let Some(detector) = active.as_ref() else {
            return Vec::new();
        };
        match detector.detect(frame) {
            Ok(found) => found,
            Err(e) => {
                log::warn!("{} inference failed: {:#}", detector.name(), e);
                Vec::new()
            }
        }
    }
}

impl FrameTransform for ModelSlot {
    fn apply(&self, frame: VideoFrame) -> VideoFrame {
        let detections = self.infer(&frame);
        draw_detections(frame, &detections)
    }
}
