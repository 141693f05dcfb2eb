/// Registers FFmpeg components (format, device, etc.). Call once at startup
/// before opening camera devices like v4l2 or avfoundation.
pub fn init() -> anyhow::Result<()> {
    ffmpeg_next::init().map_err(|e| anyhow::anyhow!("ffmpeg_next init: {}", e))?;
    ffmpeg_next::util::log::set_level(ffmpeg_next::util::log::Level::Error);
    Ok(())
}

pub mod device;
pub mod error;
pub mod frame;
pub mod input;
pub mod output;
pub mod stream;

pub use error::{Error, Result};
