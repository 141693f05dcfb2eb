use std::fmt::{Display, Formatter};

use bytes::Bytes;

use crate::error::{Error, Result};

/// Channel order of a packed frame buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PixelLayout {
    /// 3 bytes per pixel, blue first.
    Bgr24,
    /// 1 byte per pixel intensity.
    Gray8,
}

impl PixelLayout {
    pub fn channels(&self) -> usize {
        match self {
            PixelLayout::Bgr24 => 3,
            PixelLayout::Gray8 => 1,
        }
    }

    /// Name understood by ffmpeg's `-pixel_format`.
    pub fn ffmpeg_name(&self) -> &'static str {
        match self {
            PixelLayout::Bgr24 => "bgr24",
            PixelLayout::Gray8 => "gray",
        }
    }
}

/// A tightly packed video frame (no row padding).
#[derive(Clone, Debug)]
pub struct VideoFrame {
    data: Bytes,
    width: u32,
    height: u32,
    layout: PixelLayout,
    pts: Option<i64>,
}

impl VideoFrame {
    pub fn new(
        data: impl Into<Bytes>,
        width: u32,
        height: u32,
        layout: PixelLayout,
    ) -> Result<Self> {
        let data = data.into();
        let expected = Self::frame_len(width, height, layout);
        if data.len() != expected {
            return Err(Error::FrameSize {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            layout,
            pts: None,
        })
    }

    /// Frame where every pixel holds `pixel` (one value per channel).
    pub fn filled(width: u32, height: u32, layout: PixelLayout, pixel: &[u8]) -> Result<Self> {
        if pixel.len() != layout.channels() {
            return Err(Error::FrameSize {
                expected: layout.channels(),
                actual: pixel.len(),
            });
        }
        let count = (width as usize) * (height as usize);
        let data: Vec<u8> = pixel.iter().copied().cycle().take(count * pixel.len()).collect();
        Self::new(data, width, height, layout)
    }

    /// Number of bytes a frame of this shape must carry.
    pub fn frame_len(width: u32, height: u32, layout: PixelLayout) -> usize {
        (width as usize) * (height as usize) * layout.channels()
    }

    pub fn with_pts(mut self, pts: Option<i64>) -> Self {
        self.pts = pts;
        self
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn layout(&self) -> PixelLayout {
        self.layout
    }

    pub fn channels(&self) -> usize {
        self.layout.channels()
    }

    pub fn pts(&self) -> Option<i64> {
        self.pts
    }

    /// Channel values of the pixel at (`x`, `y`).
    pub fn pixel(&self, x: u32, y: u32) -> Option<&[u8]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let c = self.channels();
        let start = ((y as usize) * (self.width as usize) + x as usize) * c;
        self.data.get(start..start + c)
    }
}

impl Display for VideoFrame {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "VideoFrame {{ {}x{} {:?}, data: {} }}",
            self.width,
            self.height,
            self.layout,
            self.data.len()
        )
    }
}
