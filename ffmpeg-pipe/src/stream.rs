use ffmpeg_next::{Rational, format::stream};

/// Frame rate used when the source does not report one.
pub const DEFAULT_FPS: u32 = 30;

/// Shape and rate of the video stream a source delivers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StreamInfo {
    pub index: usize,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

impl StreamInfo {
    pub fn new(index: usize, width: u32, height: u32, rate: Rational) -> Self {
        Self {
            index,
            width,
            height,
            fps: fps_from_rate(rate),
        }
    }

    pub fn from_stream(stream: &stream::Stream<'_>, width: u32, height: u32) -> Self {
        let rate = stream.avg_frame_rate();
        let rate = if rate.numerator() > 0 && rate.denominator() > 0 {
            rate
        } else {
            stream.rate()
        };
        Self::new(stream.index(), width, height, rate)
    }
}

/// Integer frames per second, falling back to [`DEFAULT_FPS`] for missing
/// or nonsensical rates.
pub fn fps_from_rate(rate: Rational) -> u32 {
    if rate.numerator() <= 0 || rate.denominator() <= 0 {
        return DEFAULT_FPS;
    }
    let fps = rate.numerator() / rate.denominator();
    if fps <= 0 { DEFAULT_FPS } else { fps as u32 }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fps_from_rate() {
        assert_eq!(fps_from_rate(Rational::new(25, 1)), 25);
        assert_eq!(fps_from_rate(Rational::new(30000, 1001)), 29);
        assert_eq!(fps_from_rate(Rational::new(0, 1)), DEFAULT_FPS);
        assert_eq!(fps_from_rate(Rational::new(0, 0)), DEFAULT_FPS);
        assert_eq!(fps_from_rate(Rational::new(1, 2)), DEFAULT_FPS);
    }
}
