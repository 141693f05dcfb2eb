use std::ffi::CString;
use std::path::Path;

use ffmpeg_next::{
    Dictionary,
    format::Pixel,
    media::Type,
    software::scaling::{self, Flags},
};

use crate::{
    device::SourceAddress,
    error::{Error, Result},
    frame::{PixelLayout, VideoFrame},
    stream::StreamInfo,
};

/// Decoding state of an open source. Dropping it releases demuxer and decoder.
struct Opened {
    input: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::codec::decoder::Video,
    scaler: Option<scaling::Context>,
    info: StreamInfo,
    flushed: bool,
}

/// A camera or network stream decoded to packed BGR24 frames.
pub struct AvInput {
    address: SourceAddress,
    inner: Option<Opened>,
}

// The FFmpeg contexts are only ever touched by the thread that owns the
// AvInput; nothing is shared.
unsafe impl Send for AvInput {}

impl AvInput {
    /// Resolve input format by name (e.g. "v4l2", "avfoundation") via FFmpeg's av_find_input_format.
    fn find_input_format(name: &str) -> anyhow::Result<ffmpeg_next::format::format::Input> {
        let cname = CString::new(name)
            .map_err(|e| anyhow::anyhow!("invalid format name {:?}: {}", name, e))?;
        let ptr = unsafe { ffmpeg_next::ffi::av_find_input_format(cname.as_ptr()) };
        if ptr.is_null() {
            return Err(anyhow::anyhow!("input format not found: {}", name));
        }
        Ok(unsafe { ffmpeg_next::format::format::Input::wrap(ptr as *mut _) })
    }

    fn open_context(address: &SourceAddress) -> anyhow::Result<ffmpeg_next::format::context::Input> {
        use ffmpeg_next::format::format::Format;

        let (format, url) = address.input_spec();
        let path = Path::new(&url);
        let mut options = Dictionary::new();
        if address.is_rtsp() {
            options.set("rtsp_transport", "tcp");
        }

        let input = match format {
            Some(fmt_name) => {
                let fmt = Self::find_input_format(fmt_name)?;
                ffmpeg_next::format::open_with(path, &Format::Input(fmt), options)?.input()
            }
            None => ffmpeg_next::format::input_with_dictionary(path, options)?,
        };
        Ok(input)
    }

    /// Open `address` and prepare a decoder for its best video stream.
    pub fn open(address: &str) -> Result<Self> {
        let address = SourceAddress::parse(address);
        let unavailable = |reason: String| Error::SourceUnavailable {
            address: address.to_string(),
            reason,
        };

        let input = Self::open_context(&address).map_err(|e| unavailable(format!("{:#}", e)))?;

        let (info_stream, decoder) = {
            let stream = input
                .streams()
                .best(Type::Video)
                .ok_or_else(|| unavailable("no video stream".to_string()))?;
            let context =
                ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())
                    .map_err(|e| unavailable(e.to_string()))?;
            let decoder = context
                .decoder()
                .video()
                .map_err(|e| unavailable(e.to_string()))?;
            if decoder.width() == 0 || decoder.height() == 0 {
                return Err(unavailable("missing video dimensions".to_string()));
            }
            let info = StreamInfo::from_stream(&stream, decoder.width(), decoder.height());
            (info, decoder)
        };

        log::info!(
            "opened {}: {}x{} @ {} fps (stream {})",
            address,
            info_stream.width,
            info_stream.height,
            info_stream.fps,
            info_stream.index
        );

        Ok(Self {
            address,
            inner: Some(Opened {
                input,
                decoder,
                scaler: None,
                info: info_stream,
                flushed: false,
            }),
        })
    }

    pub fn address(&self) -> &SourceAddress {
        &self.address
    }

    /// Stream shape; `None` once closed.
    pub fn info(&self) -> Option<StreamInfo> {
        self.inner.as_ref().map(|o| o.info)
    }

    pub fn is_open(&self) -> bool {
        self.inner.is_some()
    }

    /// Blocks until the next decoded frame. `Ok(None)` marks end of stream.
    pub fn read_frame(&mut self) -> Result<Option<VideoFrame>> {
        let Some(opened) = self.inner.as_mut() else {
            return Ok(None);
        };
        let Opened {
            input,
            decoder,
            scaler,
            info,
            flushed,
        } = opened;

        loop {
            let mut decoded = ffmpeg_next::frame::Video::empty();
            match decoder.receive_frame(&mut decoded) {
                Ok(()) => return convert_to_bgr(scaler, &decoded).map(Some),
                Err(ffmpeg_next::Error::Eof) => return Ok(None),
                Err(ffmpeg_next::Error::Other { errno })
                    if errno == ffmpeg_next::util::error::EAGAIN => {}
                Err(err) => return Err(err.into()),
            }

            if *flushed {
                return Ok(None);
            }

            match input.packets().next() {
                Some((stream, packet)) => {
                    if stream.index() == info.index {
                        decoder.send_packet(&packet)?;
                    }
                }
                None => {
                    log::debug!("end of input stream {}", self.address);
                    decoder.send_eof()?;
                    *flushed = true;
                }
            }
        }
    }

    /// Release demuxer and decoder. Safe to call more than once.
    pub fn close(&mut self) {
        if self.inner.take().is_some() {
            log::info!("closed {}", self.address);
        }
    }
}

impl Drop for AvInput {
    fn drop(&mut self) {
        self.close();
    }
}

/// Convert any decoded picture into a packed BGR24 frame, rebuilding the
/// scaler when the decoded shape changes.
fn convert_to_bgr(
    scaler: &mut Option<scaling::Context>,
    decoded: &ffmpeg_next::frame::Video,
) -> Result<VideoFrame> {
    let (width, height, format) = (decoded.width(), decoded.height(), decoded.format());
    let stale = match scaler.as_ref() {
        Some(ctx) => {
            let input = ctx.input();
            input.width != width || input.height != height || input.format != format
        }
        None => true,
    };
    if stale {
        *scaler = Some(scaling::Context::get(
            format,
            width,
            height,
            Pixel::BGR24,
            width,
            height,
            Flags::BILINEAR,
        )?);
    }
    let Some(ctx) = scaler.as_mut() else {
        return Err(Error::Read(ffmpeg_next::Error::Bug));
    };

    let mut bgr = ffmpeg_next::frame::Video::empty();
    ctx.run(decoded, &mut bgr)?;

    let row = (width as usize) * PixelLayout::Bgr24.channels();
    let stride = bgr.stride(0);
    let plane = bgr.data(0);
    let mut data = Vec::with_capacity(row * height as usize);
    for y in 0..height as usize {
        let start = y * stride;
        data.extend_from_slice(&plane[start..start + row]);
    }

    Ok(VideoFrame::new(data, width, height, PixelLayout::Bgr24)?.with_pts(decoded.pts()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_missing_file_is_source_unavailable() {
        crate::init().unwrap();
        let err = AvInput::open("/nonexistent/relay-input.mp4").err().unwrap();
        assert!(
            matches!(err, Error::SourceUnavailable { .. }),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn test_close_twice() {
        crate::init().unwrap();
        let mut input = match AvInput::open("lavfi:testsrc=size=64x48:rate=5:duration=1") {
            Ok(input) => input,
            Err(e) => {
                eprintln!("skipping, lavfi input unavailable: {e}");
                return;
            }
        };
        assert_eq!(input.info().map(|i| (i.width, i.height)), Some((64, 48)));
        let frame = input.read_frame().unwrap().unwrap();
        assert_eq!((frame.width(), frame.height()), (64, 48));

        input.close();
        assert!(!input.is_open());
        input.close();
        assert!(!input.is_open());
        assert!(input.info().is_none());
        assert!(input.read_frame().unwrap().is_none());
    }
}
