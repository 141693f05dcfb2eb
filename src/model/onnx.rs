//! YOLO detectors exported to ONNX, run through ONNX Runtime.

use ffmpeg_pipe::frame::VideoFrame;
use image::imageops::FilterType;
use ndarray::{Array, ArrayViewD, Axis, Ix2, Ix4, s};
use ort::{GraphOptimizationLevel, Session};

use crate::{
    media::codec::to_dynamic_image,
    model::{Detection, Detector, ModelLoadError, ModelLoader, ModelPreset},
};

pub const COCO_CLASSES: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich", "orange",
    "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch", "potted plant",
    "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote", "keyboard", "cell phone",
    "microwave", "oven", "toaster", "sink", "refrigerator", "book", "clock", "vase", "scissors",
    "teddy bear", "hair drier", "toothbrush",
];

/// Value of the letterbox padding, the gray the exporters train with.
const PAD: f32 = 144.0 / 255.0;

/// Loads presets as ONNX Runtime sessions.
pub struct OrtLoader;

impl ModelLoader for OrtLoader {
    fn load(&self, preset: &ModelPreset) -> Result<Box<dyn Detector>, ModelLoadError> {
        let fail = |reason: String| ModelLoadError::Load {
            name: preset.name.clone(),
            reason,
        };
        preset.validate().map_err(|e| fail(e.to_string()))?;
        if !preset.path.is_file() {
            return Err(fail(format!("{} not found", preset.path.display())));
        }

        let session = Session::builder()
            .and_then(|b| b.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|b| b.commit_from_file(&preset.path))
            .map_err(|e| fail(format!("{}: {}", preset.path.display(), e)))?;
        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .ok_or_else(|| fail("model has no inputs".to_string()))?;
        let output_name = session
            .outputs
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| fail("model has no outputs".to_string()))?;

        log::info!(
            "loaded {} from {} (input {}, output {})",
            preset.name,
            preset.path.display(),
            input_name,
            output_name
        );
        Ok(Box::new(YoloDetector {
            name: preset.name.clone(),
            session,
            input_name,
            output_name,
            input_size: preset.input_size,
            post: Postprocess::from_preset(preset),
        }))
    }
}

/// One loaded network. Holds no state between frames, so any number of
/// streams can share it.
struct YoloDetector {
    name: String,
    session: Session,
    input_name: String,
    output_name: String,
    input_size: u32,
    post: Postprocess,
}

impl Detector for YoloDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn detect(&self, frame: &VideoFrame) -> anyhow::Result<Vec<Detection>> {
        let (input, ratio) = letterbox(frame, self.input_size)?;
        let outputs = self
            .session
            .run(ort::inputs![self.input_name.as_str() => input.view()]?)?;
        let output = outputs[self.output_name.as_str()].try_extract_tensor::<f32>()?;
        self.post.run(output, ratio, frame.width(), frame.height())
    }
}

/// Scale `frame` into the top-left of a `size`×`size` RGB tensor in
/// `[0, 1]`, NCHW. Returns the tensor and the scale applied.
fn letterbox(frame: &VideoFrame, size: u32) -> anyhow::Result<(Array<f32, Ix4>, f32)> {
    let (w0, h0) = (frame.width() as f32, frame.height() as f32);
    let ratio = (size as f32 / w0).min(size as f32 / h0);
    let w1 = ((w0 * ratio).round() as u32).clamp(1, size);
    let h1 = ((h0 * ratio).round() as u32).clamp(1, size);

    let rgb = to_dynamic_image(frame)?.to_rgb8();
    let resized = image::imageops::resize(&rgb, w1, h1, FilterType::Triangle);

    let n = size as usize;
    let mut input = Array::from_elem((1, 3, n, n), PAD);
    for (x, y, px) in resized.enumerate_pixels() {
        let (x, y) = (x as usize, y as usize);
        input[[0, 0, y, x]] = px[0] as f32 / 255.0;
        input[[0, 1, y, x]] = px[1] as f32 / 255.0;
        input[[0, 2, y, x]] = px[2] as f32 / 255.0;
    }
    Ok((input, ratio))
}

#[derive(Clone, Debug)]
struct Postprocess {
    confidence: f32,
    iou: f32,
    labels: Vec<String>,
}

impl Postprocess {
    fn from_preset(preset: &ModelPreset) -> Self {
        let labels = if preset.labels.is_empty() {
            COCO_CLASSES.iter().map(|l| l.to_string()).collect()
        } else {
            preset.labels.clone()
        };
        Self {
            confidence: preset.confidence,
            iou: preset.iou,
            labels,
        }
    }

    /// Boxes from one raw prediction tensor, in frame pixels.
    ///
    /// Takes the YOLOv8 layout `[1, 4 + classes, anchors]` and the YOLOv5
    /// layout `[1, anchors, 5 + classes]`, where column 4 is objectness.
    /// Anchors always outnumber attributes, which tells the two apart.
    fn run(
        &self,
        output: ArrayViewD<'_, f32>,
        ratio: f32,
        width: u32,
        height: u32,
    ) -> anyhow::Result<Vec<Detection>> {
        let shape = output.shape().to_vec();
        let &[1, a, b] = shape.as_slice() else {
            anyhow::bail!("unexpected output shape {:?}", shape);
        };
        let preds = output.index_axis_move(Axis(0), 0).into_dimensionality::<Ix2>()?;
        let (rows, class_offset) = if a > b {
            (preds, 5)
        } else {
            (preds.reversed_axes(), 4)
        };
        if rows.ncols() <= class_offset {
            anyhow::bail!("output shape {:?} has no class scores", shape);
        }

        let (fw, fh) = (width as f32, height as f32);
        let mut found = Vec::new();
        for row in rows.outer_iter() {
            let objectness = if class_offset == 5 { row[4] } else { 1.0 };
            let Some((class, &score)) = row
                .slice(s![class_offset..])
                .iter()
                .enumerate()
                .max_by(|x, y| x.1.total_cmp(y.1))
            else {
                continue;
            };
            let score = score * objectness;
            if score < self.confidence {
                continue;
            }

            let (cx, cy) = (row[0] / ratio, row[1] / ratio);
            let (w, h) = (row[2] / ratio, row[3] / ratio);
            let x0 = (cx - w / 2.0).clamp(0.0, fw);
            let y0 = (cy - h / 2.0).clamp(0.0, fh);
            let x1 = (cx + w / 2.0).clamp(0.0, fw);
            let y1 = (cy + h / 2.0).clamp(0.0, fh);
            if x1 - x0 < 1.0 || y1 - y0 < 1.0 {
                continue;
            }
            found.push(Detection {
                x: x0 as u32,
                y: y0 as u32,
                width: (x1 - x0).round() as u32,
                height: (y1 - y0).round() as u32,
                score,
                label: self.label(class),
            });
        }

        non_max_suppression(&mut found, self.iou);
        Ok(found)
    }

    fn label(&self, class: usize) -> String {
        self.labels
            .get(class)
            .cloned()
            .unwrap_or_else(|| format!("class {}", class))
    }
}

/// Keep the strongest of every group of boxes overlapping above
/// `iou_threshold`, highest score first.
pub fn non_max_suppression(xs: &mut Vec<Detection>, iou_threshold: f32) {
    xs.sort_by(|a, b| b.score.total_cmp(&a.score));

    let mut kept = 0;
    for index in 0..xs.len() {
        let drop = (0..kept).any(|prev| iou(&xs[prev], &xs[index]) > iou_threshold);
        if !drop {
            xs.swap(kept, index);
            kept += 1;
        }
    }
    xs.truncate(kept);
}

fn iou(a: &Detection, b: &Detection) -> f32 {
    let left = a.x.max(b.x) as f32;
    let top = a.y.max(b.y) as f32;
    let right = (a.x + a.width).min(b.x + b.width) as f32;
    let bottom = (a.y + a.height).min(b.y + b.height) as f32;
    let inter = (right - left).max(0.0) * (bottom - top).max(0.0);
    let union = (a.width * a.height + b.width * b.height) as f32 - inter;
    if union <= 0.0 { 0.0 } else { inter / union }
}

#[cfg(test)]
#[path = "onnx_test.rs"]
mod onnx_test;
