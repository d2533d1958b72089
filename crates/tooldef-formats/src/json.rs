//! SAW-style JSON tool definitions.
//!
//! ```json
//! {
//!     "name": "probe",
//!     "id": 7,
//!     "count": 3,
//!     "frame": "centroid",
//!     "fiducials": [
//!         { "x": 0.0, "y": 0.0, "z": 0.0, "normal": { "x": 0.0, "y": 0.0, "z": 1.0 } },
//!         ...
//!     ],
//!     "pivot": { "x": 0.0, "y": 0.0, "z": -150.0 }
//! }
//! ```

use crate::error::FormatError;
use crate::warning::Warnings;
use crate::{ToolCodec, ToolFile};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tooldef_core::{
    Marker, MarkerMetadata, OpaqueMetadata, Point3D, ReferenceFrameConvention, ToolFormat,
    ToolGeometry,
};

#[cfg(feature = "tracing")]
use tracing::instrument;

const FORMAT: ToolFormat = ToolFormat::Json;

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
struct JsonPoint {
    x: f64,
    y: f64,
    z: f64,
}

impl From<JsonPoint> for Point3D {
    fn from(p: JsonPoint) -> Self {
        Point3D::new(p.x, p.y, p.z)
    }
}

impl From<Point3D> for JsonPoint {
    fn from(p: Point3D) -> Self {
        Self {
            x: p.x,
            y: p.y,
            z: p.z,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct JsonFiducial {
    x: f64,
    y: f64,
    z: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    diameter: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    face: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    group: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    normal: Option<JsonPoint>,
    #[serde(flatten)]
    extra: BTreeMap<String, Value>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
struct JsonTool {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<u32>,
    count: usize,
    #[serde(
        default,
        deserialize_with = "declared_frame",
        skip_serializing_if = "Option::is_none"
    )]
    frame: Option<ReferenceFrameConvention>,
    fiducials: Vec<JsonFiducial>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pivot: Option<JsonPoint>,
    #[serde(flatten)]
    extra: BTreeMap<String, Value>,
}

fn declared_frame<'de, D>(deserializer: D) -> Result<Option<ReferenceFrameConvention>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        None => Ok(None),
        Some(s) => ReferenceFrameConvention::parse_declared(&s).map_err(serde::de::Error::custom),
    }
}

/// Codec for the JSON format.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonCodec;

impl ToolCodec for JsonCodec {
    fn format(&self) -> ToolFormat {
        FORMAT
    }

    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip_all, fields(len = bytes.len()))
    )]
    fn parse(&self, bytes: &[u8]) -> Result<ToolGeometry, FormatError> {
        let tool: JsonTool = serde_json::from_slice(bytes)?;
        if tool.count != tool.fiducials.len() {
            return Err(FormatError::malformed(
                FORMAT,
                format!(
                    "fiducials has {} entries but count = {}",
                    tool.fiducials.len(),
                    tool.count
                ),
            ));
        }

        let mut opaque = OpaqueMetadata::new(FORMAT);
        opaque.fields = tool.extra;
        let markers = tool
            .fiducials
            .into_iter()
            .enumerate()
            .map(|(i, f)| {
                for (key, value) in f.extra {
                    opaque.insert_marker_field(i, key, value);
                }
                Marker {
                    marker_id: i as u32,
                    position: Point3D::new(f.x, f.y, f.z),
                    metadata: MarkerMetadata {
                        diameter: f.diameter,
                        face: f.face,
                        group: f.group,
                        normal: f.normal.map(|n| Vector3::new(n.x, n.y, n.z)),
                    },
                }
            })
            .collect();

        let geometry = ToolGeometry {
            name: tool.name,
            tool_id: tool.id,
            markers,
            pivot: tool.pivot.map(Point3D::from),
            convention: tool.frame,
            opaque: opaque.into_option(),
        };
        geometry.validate()?;
        Ok(geometry)
    }

    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip_all, fields(markers = geometry.markers.len()))
    )]
    fn serialize(&self, geometry: &ToolGeometry) -> Result<ToolFile, FormatError> {
        geometry.validate()?;
        let mut warnings = Warnings::new(FORMAT);
        warnings.foreign_opaque(geometry);
        let opaque = geometry.opaque_for(FORMAT);

        let tool = JsonTool {
            name: geometry.name.clone(),
            id: geometry.tool_id,
            count: geometry.markers.len(),
            frame: geometry.convention,
            fiducials: geometry
                .markers
                .iter()
                .enumerate()
                .map(|(i, m)| JsonFiducial {
                    x: m.position.x,
                    y: m.position.y,
                    z: m.position.z,
                    diameter: m.metadata.diameter,
                    face: m.metadata.face,
                    group: m.metadata.group,
                    normal: m.metadata.normal.map(|n| JsonPoint {
                        x: n.x,
                        y: n.y,
                        z: n.z,
                    }),
                    extra: opaque
                        .and_then(|o| o.marker_fields(i))
                        .cloned()
                        .unwrap_or_default(),
                })
                .collect(),
            pivot: geometry.pivot.map(JsonPoint::from),
            extra: opaque.map(|o| o.fields.clone()).unwrap_or_default(),
        };

        Ok(ToolFile {
            format: FORMAT,
            bytes: to_pretty_json(&tool)?,
            warnings: warnings.into_vec(),
        })
    }
}

/// Pretty JSON with a 4-space indent and a trailing newline.
pub(crate) fn to_pretty_json<T: Serialize>(value: &T) -> Result<Vec<u8>, FormatError> {
    let mut bytes = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut bytes, formatter);
    value.serialize(&mut ser)?;
    bytes.push(b'\n');
    Ok(bytes)
}
