use std::sync::Arc;

use ffmpeg_pipe::frame::{PixelLayout, VideoFrame};
use parking_lot::RwLock;

use crate::media::types::Effect;

/// A synchronous per-frame function. The output keeps the input's width and
/// height.
pub trait FrameTransform: Send + Sync {
    fn apply(&self, frame: VideoFrame) -> VideoFrame;
}

impl<T: FrameTransform + ?Sized> FrameTransform for Arc<T> {
    fn apply(&self, frame: VideoFrame) -> VideoFrame {
        (**self).apply(frame)
    }
}

impl<T: FrameTransform + ?Sized> FrameTransform for &T {
    fn apply(&self, frame: VideoFrame) -> VideoFrame {
        (**self).apply(frame)
    }
}

impl<T: FrameTransform + ?Sized> FrameTransform for Box<T> {
    fn apply(&self, frame: VideoFrame) -> VideoFrame {
        (**self).apply(frame)
    }
}

/// Runs `A`, then `B`.
impl<A: FrameTransform, B: FrameTransform> FrameTransform for (A, B) {
    fn apply(&self, frame: VideoFrame) -> VideoFrame {
        self.1.apply(self.0.apply(frame))
    }
}

pub struct Passthrough;

impl FrameTransform for Passthrough {
    fn apply(&self, frame: VideoFrame) -> VideoFrame {
        frame
    }
}

/// Funnel colour through single-channel intensity and expand back to the
/// original channel count.
pub struct Desaturate;

impl FrameTransform for Desaturate {
    fn apply(&self, frame: VideoFrame) -> VideoFrame {
        if frame.layout() == PixelLayout::Gray8 {
            return frame;
        }
        let gray = to_gray(&frame);
        let mut out = Vec::with_capacity(gray.len() * 3);
        for y in gray {
            out.extend_from_slice(&[y, y, y]);
        }
        match VideoFrame::new(out, frame.width(), frame.height(), PixelLayout::Bgr24) {
            Ok(desaturated) => desaturated.with_pts(frame.pts()),
            Err(e) => {
                log::error!("desaturate produced a bad frame: {}", e);
                frame
            }
        }
    }
}

/// BT.601 luma per pixel, same fixed-point weights as OpenCV's BGR2GRAY.
pub fn to_gray(frame: &VideoFrame) -> Vec<u8> {
    match frame.layout() {
        PixelLayout::Gray8 => frame.data().to_vec(),
        PixelLayout::Bgr24 => frame
            .data()
            .chunks_exact(3)
            .map(|px| {
                let (b, g, r) = (px[0] as u32, px[1] as u32, px[2] as u32);
                ((r * 4899 + g * 9617 + b * 1868 + 8192) >> 14) as u8
            })
            .collect(),
    }
}

impl FrameTransform for Effect {
    fn apply(&self, frame: VideoFrame) -> VideoFrame {
        match self {
            Effect::None => frame,
            Effect::Gray => Desaturate.apply(frame),
        }
    }
}

/// An effect that can be switched while a relay is running. Each frame
/// reads the current value once.
#[derive(Clone, Default)]
pub struct SharedEffect(Arc<RwLock<Effect>>);

impl SharedEffect {
    pub fn new(effect: Effect) -> Self {
        Self(Arc::new(RwLock::new(effect)))
    }

    pub fn get(&self) -> Effect {
        *self.0.read()
    }

    pub fn set(&self, effect: Effect) {
        *self.0.write() = effect;
    }
}

impl FrameTransform for SharedEffect {
    fn apply(&self, frame: VideoFrame) -> VideoFrame {
        self.get().apply(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_desaturate_constant_frame() {
        let frame = VideoFrame::filled(64, 64, PixelLayout::Bgr24, &[200, 40, 90]).unwrap();
        let out = Desaturate.apply(frame);

        assert_eq!(out.width(), 64);
        assert_eq!(out.height(), 64);
        assert_eq!(out.channels(), 3);
        let first = out.pixel(0, 0).unwrap().to_vec();
        for px in out.data().chunks_exact(3) {
            assert_eq!(px[0], px[1]);
            assert_eq!(px[1], px[2]);
            assert_eq!(px, &first[..]);
        }
    }

    #[test]
    fn test_desaturate_preserves_shape_of_varied_frame() {
        let data: Vec<u8> = (0..(7 * 5 * 3)).map(|i| (i * 37 % 256) as u8).collect();
        let frame = VideoFrame::new(data, 7, 5, PixelLayout::Bgr24).unwrap();
        let out = Desaturate.apply(frame.clone());

        assert_eq!((out.width(), out.height(), out.channels()), (7, 5, 3));
        assert_eq!(out.data().len(), frame.data().len());
        assert!(out.data().chunks_exact(3).all(|p| p[0] == p[1] && p[1] == p[2]));
    }

    #[test]
    fn test_luma_weights() {
        let white = VideoFrame::filled(1, 1, PixelLayout::Bgr24, &[255, 255, 255]).unwrap();
        let red = VideoFrame::filled(1, 1, PixelLayout::Bgr24, &[0, 0, 255]).unwrap();
        let green = VideoFrame::filled(1, 1, PixelLayout::Bgr24, &[0, 255, 0]).unwrap();
        assert_eq!(to_gray(&white), vec![255]);
        assert_eq!(to_gray(&red), vec![76]);
        assert_eq!(to_gray(&green), vec![150]);
    }

    #[test]
    fn test_gray_input_passes_through() {
        let frame = VideoFrame::filled(3, 3, PixelLayout::Gray8, &[42]).unwrap();
        let out = Desaturate.apply(frame);
        assert_eq!(out.layout(), PixelLayout::Gray8);
        assert_eq!(out.data(), &[42u8; 9][..]);
    }

    #[test]
    fn test_shared_effect_switches() {
        let effect = SharedEffect::default();
        let frame = VideoFrame::filled(2, 2, PixelLayout::Bgr24, &[0, 0, 255]).unwrap();
        assert_eq!(effect.apply(frame.clone()).pixel(0, 0), Some(&[0u8, 0, 255][..]));

        effect.set(Effect::Gray);
        assert_eq!(effect.get(), Effect::Gray);
        assert_eq!(effect.apply(frame).pixel(0, 0), Some(&[76u8, 76, 76][..]));
    }

    #[test]
    fn test_chained_transforms() {
        let chain = (Effect::Gray, Passthrough);
        let frame = VideoFrame::filled(2, 2, PixelLayout::Bgr24, &[0, 255, 0]).unwrap();
        assert_eq!(chain.apply(frame).pixel(1, 1), Some(&[150u8, 150, 150][..]));
    }
}
