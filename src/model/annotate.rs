use ffmpeg_pipe::frame::{PixelLayout, VideoFrame};
use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::{drawing::draw_hollow_rect_mut, rect::Rect};

use crate::model::Detection;

// Green has the same byte order in BGR and RGB, so BGR buffers are drawn on
// as-is through RgbImage.
const BOX_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
const BOX_LUMA: Luma<u8> = Luma([255]);

/// Outline every detection on the frame. Boxes are clipped to the frame and
/// empty boxes are skipped.
pub fn draw_detections(frame: VideoFrame, detections: &[Detection]) -> VideoFrame {
    if detections.is_empty() {
        return frame;
    }
    let (width, height, layout, pts) = (frame.width(), frame.height(), frame.layout(), frame.pts());
    let rects: Vec<Rect> = detections
        .iter()
        .filter_map(|d| clip(d, width, height))
        .collect();
    if rects.is_empty() {
        return frame;
    }

    let data = frame.data().to_vec();
    let drawn = match layout {
        PixelLayout::Bgr24 => RgbImage::from_raw(width, height, data).map(|mut image| {
            for rect in &rects {
                draw_hollow_rect_mut(&mut image, *rect, BOX_COLOR);
            }
            image.into_raw()
        }),
        PixelLayout::Gray8 => GrayImage::from_raw(width, height, data).map(|mut image| {
            for rect in &rects {
                draw_hollow_rect_mut(&mut image, *rect, BOX_LUMA);
            }
            image.into_raw()
        }),
    };

    match drawn.map(|data| VideoFrame::new(data, width, height, layout)) {
        Some(Ok(out)) => out.with_pts(pts),
        _ => {
            log::error!("cannot annotate {}", frame);
            frame
        }
    }
}

fn clip(d: &Detection, width: u32, height: u32) -> Option<Rect> {
    if d.x >= width || d.y >= height {
        return None;
    }
    let w = d.width.min(width - d.x);
    let h = d.height.min(height - d.y);
    if w == 0 || h == 0 {
        return None;
    }
    Some(Rect::at(d.x as i32, d.y as i32).of_size(w, h))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection(x: u32, y: u32, width: u32, height: u32) -> Detection {
        Detection {
            x,
            y,
            width,
            height,
            score: 1.0,
            label: "person".to_string(),
        }
    }

    #[test]
    fn test_draws_box_outline() {
        let frame = VideoFrame::filled(16, 16, PixelLayout::Bgr24, &[10, 10, 10]).unwrap();
        let out = draw_detections(frame, &[detection(2, 2, 8, 8)]);

        assert_eq!((out.width(), out.height()), (16, 16));
        assert_eq!(out.pixel(2, 2), Some(&[0u8, 255, 0][..]));
        assert_eq!(out.pixel(9, 9), Some(&[0u8, 255, 0][..]));
        // interior and outside untouched
        assert_eq!(out.pixel(5, 5), Some(&[10u8, 10, 10][..]));
        assert_eq!(out.pixel(12, 12), Some(&[10u8, 10, 10][..]));
    }

    #[test]
    fn test_out_of_frame_boxes_are_ignored() {
        let frame = VideoFrame::filled(8, 8, PixelLayout::Bgr24, &[1, 2, 3]).unwrap();
        let out = draw_detections(frame.clone(), &[detection(20, 20, 4, 4), detection(0, 0, 0, 5)]);
        assert_eq!(out.data(), frame.data());
    }

    #[test]
    fn test_gray_frames_get_white_boxes() {
        let frame = VideoFrame::filled(8, 8, PixelLayout::Gray8, &[0]).unwrap();
        let out = draw_detections(frame, &[detection(4, 4, 10, 10)]);
        assert_eq!(out.pixel(4, 4), Some(&[255u8][..]));
        assert_eq!(out.pixel(7, 7), Some(&[255u8][..]));
        assert_eq!(out.pixel(0, 0), Some(&[0u8][..]));
    }
}
