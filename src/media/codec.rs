//! Image encodings used by the HTTP transports: PNG data URLs for the
//! WebSocket round-trip and JPEG for the MJPEG feed.

use std::io::Cursor;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use ffmpeg_pipe::frame::{PixelLayout, VideoFrame};
use image::{DynamicImage, GrayImage, ImageFormat, RgbImage};

use crate::media::types::RelayError;

const PNG_DATA_URL_PREFIX: &str = "data:image/png;base64,";

/// Strip an optional `data:image/<type>;base64,` prefix and return the payload.
fn strip_data_url(payload: &str) -> &str {
    let payload = payload.trim();
    if let Some(rest) = payload.strip_prefix("data:image/") {
        if let Some((_, data)) = rest.split_once(";base64,") {
            return data;
        }
    }
    payload
}

/// Decode an embedded image into a BGR24 frame.
pub fn decode_data_url(payload: &str) -> Result<VideoFrame, RelayError> {
    let encoded = strip_data_url(payload);
    if encoded.is_empty() {
        return Err(RelayError::Decode("empty image payload".to_string()));
    }
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| RelayError::Decode(format!("base64: {}", e)))?;
    let image = image::load_from_memory(&bytes)
        .map_err(|e| RelayError::Decode(format!("image: {}", e)))?;

    let rgb = image.to_rgb8();
    let (width, height) = rgb.dimensions();
    let mut data = rgb.into_raw();
    swap_red_blue(&mut data);
    VideoFrame::new(data, width, height, PixelLayout::Bgr24)
        .map_err(|e| RelayError::Decode(e.to_string()))
}

/// Encode a frame as a PNG data URL.
pub fn encode_data_url(frame: &VideoFrame) -> Result<String, RelayError> {
    let image = to_dynamic_image(frame)?;
    let mut png = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| RelayError::Decode(format!("png: {}", e)))?;
    Ok(format!("{}{}", PNG_DATA_URL_PREFIX, STANDARD.encode(png)))
}

/// Encode a frame as baseline JPEG.
pub fn encode_jpeg(frame: &VideoFrame, quality: u8) -> Result<Vec<u8>, RelayError> {
    let width = u16::try_from(frame.width())
        .map_err(|_| RelayError::SinkWrite(format!("frame too wide for jpeg: {}", frame.width())))?;
    let height = u16::try_from(frame.height())
        .map_err(|_| RelayError::SinkWrite(format!("frame too tall for jpeg: {}", frame.height())))?;
    let color = match frame.layout() {
        PixelLayout::Bgr24 => jpeg_encoder::ColorType::Bgr,
        PixelLayout::Gray8 => jpeg_encoder::ColorType::Luma,
    };

    let mut jpeg = Vec::new();
    let encoder = jpeg_encoder::Encoder::new(&mut jpeg, quality.clamp(1, 100));
    encoder
        .encode(frame.data(), width, height, color)
        .map_err(|e| RelayError::SinkWrite(format!("jpeg: {}", e)))?;
    Ok(jpeg)
}

pub(crate) fn to_dynamic_image(frame: &VideoFrame) -> Result<DynamicImage, RelayError> {
    let bad_frame = || RelayError::Decode(format!("inconsistent frame {}", frame));
    match frame.layout() {
        PixelLayout::Bgr24 => {
            let mut data = frame.data().to_vec();
            swap_red_blue(&mut data);
            RgbImage::from_raw(frame.width(), frame.height(), data)
                .map(DynamicImage::ImageRgb8)
                .ok_or_else(bad_frame)
        }
        PixelLayout::Gray8 => GrayImage::from_raw(frame.width(), frame.height(), frame.data().to_vec())
            .map(DynamicImage::ImageLuma8)
            .ok_or_else(bad_frame),
    }
}

fn swap_red_blue(data: &mut [u8]) {
    for px in data.chunks_exact_mut(3) {
        px.swap(0, 2);
    }
}
