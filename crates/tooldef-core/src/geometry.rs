//! Format-independent tool geometry shared by every codec.

use crate::error::{GeometryError, MIN_MARKERS};
use crate::types::{Point3D, ReferenceFrameConvention, ToolFormat};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Optional per-marker fields. Not every format can store every field.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MarkerMetadata {
    /// Sphere/disc diameter in tracker units.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diameter: Option<f64>,
    /// Face the marker belongs to (NDI faces are 1-based).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub face: Option<u8>,
    /// Marker group (NDI, 1-based).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<u8>,
    /// Marker normal in the tool frame.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normal: Option<Vector3<f64>>,
}

impl MarkerMetadata {
    pub fn is_empty(&self) -> bool {
        self == &MarkerMetadata::default()
    }
}

/// One marker of a tool definition, in tool-local coordinates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Marker {
    pub marker_id: u32,
    pub position: Point3D,
    #[serde(default, skip_serializing_if = "MarkerMetadata::is_empty")]
    pub metadata: MarkerMetadata,
}

impl Marker {
    pub fn new(marker_id: u32, position: Point3D) -> Self {
        Self {
            marker_id,
            position,
            metadata: MarkerMetadata::default(),
        }
    }
}

/// Source-format fields that have no [`ToolGeometry`] counterpart.
///
/// Codecs re-emit these when writing the same `format` again and drop them
/// (with a warning) when writing any other format.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OpaqueMetadata {
    pub format: ToolFormat,
    /// Tool-level fields keyed by their source name.
    #[serde(default)]
    pub fields: BTreeMap<String, Value>,
    /// Per-marker fields, indexed like [`ToolGeometry::markers`].
    /// Shorter than the marker list when trailing markers have none.
    #[serde(default)]
    pub markers: Vec<BTreeMap<String, Value>>,
}

impl OpaqueMetadata {
    pub fn new(format: ToolFormat) -> Self {
        Self {
            format,
            fields: BTreeMap::new(),
            markers: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.markers.iter().all(BTreeMap::is_empty)
    }

    /// Record a per-marker field, growing the per-marker table as needed.
    pub fn insert_marker_field(&mut self, index: usize, key: String, value: Value) {
        if self.markers.len() <= index {
            self.markers.resize_with(index + 1, BTreeMap::new);
        }
        self.markers[index].insert(key, value);
    }

    pub fn marker_fields(&self, index: usize) -> Option<&BTreeMap<String, Value>> {
        self.markers.get(index).filter(|m| !m.is_empty())
    }

    /// Human-readable names of every stored field, for drop warnings.
    pub fn field_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.fields.keys().cloned().collect();
        for (i, marker) in self.markers.iter().enumerate() {
            names.extend(marker.keys().map(|k| format!("marker{i}.{k}")));
        }
        names
    }

    /// `None` when nothing was stored, so empty metadata never reaches a geometry.
    pub fn into_option(self) -> Option<Self> {
        (!self.is_empty()).then_some(self)
    }
}

/// Canonical rigid-body tool geometry.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolGeometry {
    /// Tool name; empty when the source carried none.
    #[serde(default)]
    pub name: String,
    /// Numeric geometry id used by some trackers.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_id: Option<u32>,
    pub markers: Vec<Marker>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pivot: Option<Point3D>,
    /// `None` when the source did not declare how its frame was chosen.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub convention: Option<ReferenceFrameConvention>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opaque: Option<OpaqueMetadata>,
}

impl ToolGeometry {
    /// Geometry with markers numbered in the order given.
    pub fn from_positions(name: impl Into<String>, positions: &[Point3D]) -> Self {
        Self {
            name: name.into(),
            tool_id: None,
            markers: positions
                .iter()
                .enumerate()
                .map(|(i, p)| Marker::new(i as u32, *p))
                .collect(),
            pivot: None,
            convention: None,
            opaque: None,
        }
    }

    #[inline]
    pub fn marker_count(&self) -> usize {
        self.markers.len()
    }

    pub fn positions(&self) -> Vec<Point3D> {
        self.markers.iter().map(|m| m.position).collect()
    }

    /// Sorted inter-marker distances.
    pub fn fingerprint(&self) -> Vec<f64> {
        fingerprint(&self.positions())
    }

    /// Structural checks every codec runs before encoding.
    ///
    /// Rigidity (coincident or collinear markers) is checked separately by
    /// [`crate::check_rigidity`].
    pub fn validate(&self) -> Result<(), GeometryError> {
        if self.markers.len() < MIN_MARKERS {
            return Err(GeometryError::Incomplete {
                expected: MIN_MARKERS,
                found: self.markers.len(),
            });
        }
        for (index, marker) in self.markers.iter().enumerate() {
            let normal_ok = marker
                .metadata
                .normal
                .is_none_or(|n| n.iter().all(|v| v.is_finite()));
            let diameter_ok = marker.metadata.diameter.is_none_or(f64::is_finite);
            if !marker.position.iter().all(|v| v.is_finite()) || !normal_ok || !diameter_ok {
                return Err(GeometryError::NonFinite { index });
            }
        }
        if let Some(pivot) = self.pivot {
            if !pivot.iter().all(|v| v.is_finite()) {
                return Err(GeometryError::NonFinite {
                    index: self.markers.len(),
                });
            }
        }
        Ok(())
    }

    /// Opaque metadata stored for `format`, if any.
    pub fn opaque_for(&self, format: ToolFormat) -> Option<&OpaqueMetadata> {
        self.opaque.as_ref().filter(|o| o.format == format)
    }
}

/// Sorted pairwise distances of `points`.
pub fn fingerprint(points: &[Point3D]) -> Vec<f64> {
    let mut out = Vec::with_capacity(points.len() * points.len().saturating_sub(1) / 2);
    for (i, a) in points.iter().enumerate() {
        for b in &points[i + 1..] {
            out.push(nalgebra::distance(a, b));
        }
    }
    out.sort_by(f64::total_cmp);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> ToolGeometry {
        ToolGeometry::from_positions(
            "tri",
            &[
                Point3D::new(0.0, 0.0, 0.0),
                Point3D::new(30.0, 0.0, 0.0),
                Point3D::new(0.0, 40.0, 0.0),
            ],
        )
    }

    #[test]
    fn fingerprint_is_sorted_pairwise_distances() {
        let fp = triangle().fingerprint();
        assert_eq!(fp, vec![30.0, 40.0, 50.0]);
    }

    #[test]
    fn validate_rejects_two_markers() {
        let mut g = triangle();
        g.markers.pop();
        assert_eq!(
            g.validate(),
            Err(GeometryError::Incomplete {
                expected: 3,
                found: 2
            })
        );
    }

    #[test]
    fn validate_rejects_nan_normal() {
        let mut g = triangle();
        g.markers[1].metadata.normal = Some(Vector3::new(f64::NAN, 0.0, 1.0));
        assert_eq!(g.validate(), Err(GeometryError::NonFinite { index: 1 }));
    }

    #[test]
    fn opaque_metadata_tracks_marker_fields() {
        let mut opaque = OpaqueMetadata::new(ToolFormat::Ini);
        assert!(opaque.clone().into_option().is_none());
        opaque.insert_marker_field(2, "colour".into(), Value::from("red"));
        assert_eq!(opaque.markers.len(), 3);
        assert!(opaque.marker_fields(0).is_none());
        assert_eq!(opaque.field_names(), vec!["marker2.colour".to_string()]);
    }
}
