//! JSON capture and configuration files, and tool file I/O.

use crate::ToolError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;
use tooldef_capture::CaptureParams;
use tooldef_core::{Frame, NormalizeParams, ToolFormat};
use tooldef_formats::{RomOptions, ToolFile};

/// A recorded static capture.
///
/// ```json
/// { "frames": [ [[x, y, z], [x, y, z], ...], ... ] }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CaptureFile {
    /// Frames in capture order.
    pub frames: Vec<Frame>,
}

impl CaptureFile {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self { frames }
    }

    /// Load a capture from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ToolError> {
        load_json(path.as_ref())
    }

    /// Write this capture to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ToolError> {
        write_json(path.as_ref(), self)
    }
}

/// Every tunable of `tooldef make`; missing fields take their defaults.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MakeConfig {
    pub capture: CaptureParams,
    pub normalize: NormalizeParams,
    pub rom: RomOptions,
}

impl MakeConfig {
    /// Load a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ToolError> {
        load_json(path.as_ref())
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ToolError> {
        write_json(path.as_ref(), self)
    }
}

fn load_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ToolError> {
    let raw = fs::read_to_string(path).map_err(|e| ToolError::io(path, e))?;
    serde_json::from_str(&raw).map_err(|e| ToolError::json(path, e))
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), ToolError> {
    let json = serde_json::to_string_pretty(value).map_err(|e| ToolError::json(path, e))?;
    fs::write(path, json).map_err(|e| ToolError::io(path, e))
}

/// Format implied by the extension of `path`.
pub fn format_of(path: impl AsRef<Path>) -> Result<ToolFormat, ToolError> {
    let path = path.as_ref();
    ToolFormat::from_path(path).ok_or_else(|| ToolError::UnsupportedFormat(path.to_path_buf()))
}

/// Read a tool file and the format its extension implies.
pub fn read_tool_file(path: impl AsRef<Path>) -> Result<(ToolFormat, Vec<u8>), ToolError> {
    let path = path.as_ref();
    let format = format_of(path)?;
    let bytes = fs::read(path).map_err(|e| ToolError::io(path, e))?;
    Ok((format, bytes))
}

/// Write `file` to `path` through a sibling temporary file.
///
/// The destination is replaced by a rename, so a failed run never leaves a
/// partially written tool file behind.
pub fn write_tool_file(path: impl AsRef<Path>, file: &ToolFile) -> Result<(), ToolError> {
    let path = path.as_ref();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| ToolError::io(dir, e))?;
    tmp.write_all(&file.bytes)
        .and_then(|()| tmp.as_file().sync_all())
        .map_err(|e| ToolError::io(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| ToolError::io(path, e.error))?;
    log::info!("wrote {} ({} bytes, {})", path.display(), file.bytes.len(), file.format);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tooldef_core::Point3D;

    #[test]
    fn capture_file_uses_plain_triples() {
        let capture: CaptureFile =
            serde_json::from_str(r#"{"frames": [[[1.0, 2.0, 3.0]], []]}"#).unwrap();
        assert_eq!(capture.frames.len(), 2);
        assert_eq!(capture.frames[0].points[0], Point3D::new(1.0, 2.0, 3.0));
        assert!(capture.frames[1].is_empty());
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let cfg: MakeConfig =
            serde_json::from_str(r#"{"capture": {"max_spread": 0.4}}"#).unwrap();
        assert_eq!(cfg.capture.max_spread, 0.4);
        assert_eq!(cfg.capture.cluster_radius, CaptureParams::default().cluster_radius);
        assert_eq!(cfg.normalize, NormalizeParams::default());
    }

    #[test]
    fn format_comes_from_the_extension() {
        assert_eq!(format_of("a/b/tool.ROM").unwrap(), ToolFormat::Rom);
        assert!(matches!(
            format_of("tool.txt"),
            Err(ToolError::UnsupportedFormat(_))
        ));
    }
}
