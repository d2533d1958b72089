use nalgebra::Point3;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// A 3D point in tracker length units (millimetres for NDI/Atracsys).
pub type Point3D = Point3<f64>;

/// Every marker detected during one sampling instant.
///
/// Serialises as a plain array of `[x, y, z]` triples.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Frame {
    pub points: Vec<Point3D>,
}

impl Frame {
    pub fn new(points: Vec<Point3D>) -> Self {
        Self { points }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

impl From<Vec<Point3D>> for Frame {
    fn from(points: Vec<Point3D>) -> Self {
        Self { points }
    }
}

impl FromIterator<Point3D> for Frame {
    fn from_iter<I: IntoIterator<Item = Point3D>>(iter: I) -> Self {
        Self {
            points: iter.into_iter().collect(),
        }
    }
}

/// Averaged position of one physical marker over a capture.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MarkerEstimate {
    /// Index in the reduction output; only meaningful within one run.
    pub id: usize,
    pub position: Point3D,
    /// Number of samples that contributed to `position`.
    pub sample_count: usize,
    /// Dispersion of the contributing samples (see the capture spread metric).
    pub spread: f64,
}

/// Supported tool definition file formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolFormat {
    /// Atracsys-style INI text.
    Ini,
    /// JSON text with the same fields as the INI layout.
    Json,
    /// NDI binary `.rom`.
    Rom,
}

impl ToolFormat {
    pub const ALL: [ToolFormat; 3] = [ToolFormat::Ini, ToolFormat::Json, ToolFormat::Rom];

    pub fn as_str(self) -> &'static str {
        match self {
            ToolFormat::Ini => "ini",
            ToolFormat::Json => "json",
            ToolFormat::Rom => "rom",
        }
    }

    /// Infer the format from a file extension (case-insensitive).
    pub fn from_path(path: impl AsRef<Path>) -> Option<Self> {
        let ext = path.as_ref().extension()?.to_str()?;
        ext.parse().ok()
    }
}

impl fmt::Display for ToolFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown tool format `{0}` (expected ini, json or rom)")]
pub struct UnknownFormat(pub String);

impl FromStr for ToolFormat {
    type Err = UnknownFormat;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ini" => Ok(ToolFormat::Ini),
            "json" => Ok(ToolFormat::Json),
            "rom" => Ok(ToolFormat::Rom),
            _ => Err(UnknownFormat(s.to_string())),
        }
    }
}

/// Where the tool-local origin sits.
///
/// A geometry whose file did not declare a convention carries `None` in
/// [`crate::ToolGeometry::convention`] and is trusted as authored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceFrameConvention {
    /// Origin at the centroid of all markers.
    #[default]
    Centroid,
    /// Origin at marker 0 (the marker closest to the centroid).
    MarkerZero,
}

impl ReferenceFrameConvention {
    pub fn as_str(self) -> &'static str {
        match self {
            ReferenceFrameConvention::Centroid => "centroid",
            ReferenceFrameConvention::MarkerZero => "marker_zero",
        }
    }

    /// Parses a frame declared in a tool file; `unspecified` declares none.
    pub fn parse_declared(s: &str) -> Result<Option<Self>, String> {
        if s.trim().eq_ignore_ascii_case("unspecified") {
            return Ok(None);
        }
        s.parse().map(Some)
    }
}

impl fmt::Display for ReferenceFrameConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReferenceFrameConvention {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "centroid" => Ok(ReferenceFrameConvention::Centroid),
            "marker_zero" | "marker0" => Ok(ReferenceFrameConvention::MarkerZero),
            other => Err(format!(
                "unknown reference frame `{other}` (expected centroid or marker_zero)"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_is_inferred_from_extension() {
        assert_eq!(ToolFormat::from_path("probe.ROM"), Some(ToolFormat::Rom));
        assert_eq!(ToolFormat::from_path("a/b/tool.ini"), Some(ToolFormat::Ini));
        assert_eq!(ToolFormat::from_path("tool.json"), Some(ToolFormat::Json));
        assert_eq!(ToolFormat::from_path("tool.txt"), None);
        assert_eq!(ToolFormat::from_path("tool"), None);
    }

    #[test]
    fn frame_serialises_as_point_triples() {
        let frame = Frame::new(vec![Point3D::new(1.0, 2.0, 3.0)]);
        let json = serde_json::to_string(&frame).unwrap();
        assert_eq!(json, "[[1.0,2.0,3.0]]");
        let back: Frame = serde_json::from_str(&json).unwrap();
        assert_eq!(back, frame);
    }

    #[test]
    fn convention_parses_aliases() {
        assert_eq!(
            "Marker0".parse::<ReferenceFrameConvention>(),
            Ok(ReferenceFrameConvention::MarkerZero)
        );
        assert!("pivot".parse::<ReferenceFrameConvention>().is_err());
    }

    #[test]
    fn declared_frame_may_be_unspecified() {
        assert_eq!(ReferenceFrameConvention::parse_declared(" Unspecified"), Ok(None));
        assert_eq!(
            ReferenceFrameConvention::parse_declared("marker0"),
            Ok(Some(ReferenceFrameConvention::MarkerZero))
        );
        assert!(ReferenceFrameConvention::parse_declared("").is_err());
    }
}
