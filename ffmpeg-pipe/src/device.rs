use std::fmt::{Display, Formatter};

/// Where frames come from. Anything that is not a camera index, a
/// `/dev/videoN` path or a `lavfi:` filter graph is handed to FFmpeg
/// untouched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceAddress {
    Camera { index: u32 },
    Device { path: String },
    /// Generated input, e.g. `lavfi:testsrc=size=640x480:rate=30`.
    Filter { graph: String },
    Url { url: String },
}

impl SourceAddress {
    pub fn parse(address: &str) -> Self {
        let address = address.trim();
        if let Ok(index) = address.parse::<u32>() {
            return SourceAddress::Camera { index };
        }
        if let Some(graph) = address.strip_prefix("lavfi:") {
            return SourceAddress::Filter {
                graph: graph.to_string(),
            };
        }
        if let Some(stripped) = address.strip_prefix("/dev/video") {
            if !stripped.is_empty() && stripped.chars().all(|c| c.is_ascii_digit()) {
                return SourceAddress::Device {
                    path: address.to_string(),
                };
            }
        }
        SourceAddress::Url {
            url: address.to_string(),
        }
    }

    pub fn is_camera(&self) -> bool {
        matches!(self, SourceAddress::Camera { .. } | SourceAddress::Device { .. })
    }

    /// Resolve to the (`-f` format, `-i` input) pair FFmpeg should open.
    pub fn input_spec(&self) -> (Option<&'static str>, String) {
        match self {
            SourceAddress::Camera { index } => camera_input_spec(*index),
            SourceAddress::Device { path } => (Some("v4l2"), path.clone()),
            SourceAddress::Filter { graph } => (Some("lavfi"), graph.clone()),
            SourceAddress::Url { url } => (None, url.clone()),
        }
    }

    pub fn is_rtsp(&self) -> bool {
        matches!(self, SourceAddress::Url { url } if url.starts_with("rtsp://") || url.starts_with("rtsps://"))
    }
}

#[cfg(target_os = "linux")]
fn camera_input_spec(index: u32) -> (Option<&'static str>, String) {
    (Some("v4l2"), format!("/dev/video{index}"))
}

#[cfg(target_os = "macos")]
fn camera_input_spec(index: u32) -> (Option<&'static str>, String) {
    (Some("avfoundation"), index.to_string())
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn camera_input_spec(index: u32) -> (Option<&'static str>, String) {
    (None, index.to_string())
}

impl Display for SourceAddress {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceAddress::Camera { index } => write!(f, "camera #{index}"),
            SourceAddress::Device { path } => write!(f, "{path}"),
            SourceAddress::Filter { graph } => write!(f, "lavfi:{graph}"),
            SourceAddress::Url { url } => write!(f, "{url}"),
        }
    }
}

#[cfg(target_os = "linux")]
pub fn v4l2_device_paths() -> anyhow::Result<Vec<std::path::PathBuf>> {
    use std::path::PathBuf;
    let mut paths: Vec<PathBuf> = std::fs::read_dir("/dev")?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|s| s.starts_with("video"))
                .unwrap_or(false)
        })
        .collect();
    paths.sort();
    Ok(paths)
}

#[cfg(not(target_os = "linux"))]
pub fn v4l2_device_paths() -> anyhow::Result<Vec<std::path::PathBuf>> {
    Ok(Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_camera_index() {
        assert_eq!(SourceAddress::parse("0"), SourceAddress::Camera { index: 0 });
        assert_eq!(SourceAddress::parse(" 2 "), SourceAddress::Camera { index: 2 });
        assert!(SourceAddress::parse("1").is_camera());
    }

    #[test]
    fn test_parse_device_path() {
        assert_eq!(
            SourceAddress::parse("/dev/video3"),
            SourceAddress::Device {
                path: "/dev/video3".to_string()
            }
        );
        assert_eq!(
            SourceAddress::parse("/dev/video"),
            SourceAddress::Url {
                url: "/dev/video".to_string()
            }
        );
    }

    #[test]
    fn test_parse_url_is_opaque() {
        let addr = SourceAddress::parse("rtmp://127.0.0.1/live/stream");
        assert!(!addr.is_camera());
        assert!(!addr.is_rtsp());
        assert_eq!(
            addr.input_spec(),
            (None, "rtmp://127.0.0.1/live/stream".to_string())
        );
        assert!(SourceAddress::parse("rtsp://cam/1").is_rtsp());
    }

    #[test]
    fn test_parse_filter_graph() {
        let addr = SourceAddress::parse("lavfi:testsrc=size=64x48:rate=5");
        assert!(!addr.is_camera());
        assert_eq!(
            addr.input_spec(),
            (Some("lavfi"), "testsrc=size=64x48:rate=5".to_string())
        );
        assert_eq!(addr.to_string(), "lavfi:testsrc=size=64x48:rate=5");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_camera_input_spec_linux() {
        assert_eq!(
            SourceAddress::Camera { index: 1 }.input_spec(),
            (Some("v4l2"), "/dev/video1".to_string())
        );
    }
}
