//! Atracsys-style INI tool definitions.
//!
//! ```text
//! [geometry]
//! count = 3
//! id = 7
//! name = probe
//! frame = centroid
//!
//! [fiducial0]
//! x = 0.0
//! y = 0.0
//! z = 0.0
//! ...
//! [pivot]
//! x = 0.0
//! ...
//! ```
//!
//! Per-fiducial `diameter`, `face`, `group` and `nx`/`ny`/`nz` are optional.
//! Unknown keys and sections are kept as opaque metadata and written back
//! when the geometry is saved as INI again.

mod document;

use crate::error::FormatError;
use crate::warning::Warnings;
use crate::{ToolCodec, ToolFile};
use document::{is_safe_value, Document, Section};
use nalgebra::Vector3;
use serde_json::{Map, Value};
use std::fmt::Write as _;
use std::str::FromStr;
use tooldef_core::{
    Marker, MarkerMetadata, OpaqueMetadata, Point3D, ReferenceFrameConvention, ToolFormat,
    ToolGeometry,
};

#[cfg(feature = "tracing")]
use tracing::instrument;

const FORMAT: ToolFormat = ToolFormat::Ini;

const GEOMETRY_KEYS: [&str; 4] = ["count", "id", "name", "frame"];
const FIDUCIAL_KEYS: [&str; 9] = ["x", "y", "z", "diameter", "face", "group", "nx", "ny", "nz"];
const POINT_KEYS: [&str; 3] = ["x", "y", "z"];

/// Codec for the INI format.
#[derive(Clone, Copy, Debug, Default)]
pub struct IniCodec;

impl ToolCodec for IniCodec {
    fn format(&self) -> ToolFormat {
        FORMAT
    }

    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip_all, fields(len = bytes.len()))
    )]
    fn parse(&self, bytes: &[u8]) -> Result<ToolGeometry, FormatError> {
        let text = std::str::from_utf8(bytes)
            .map_err(|e| FormatError::malformed(FORMAT, format!("not valid UTF-8: {e}")))?;
        let doc = Document::parse(text).map_err(|reason| FormatError::malformed(FORMAT, reason))?;
        decode(&doc)
    }

    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip_all, fields(markers = geometry.markers.len()))
    )]
    fn serialize(&self, geometry: &ToolGeometry) -> Result<ToolFile, FormatError> {
        geometry.validate()?;
        let mut warnings = Warnings::new(FORMAT);
        warnings.foreign_opaque(geometry);
        let bytes = encode(geometry)?.into_bytes();
        Ok(ToolFile {
            format: FORMAT,
            bytes,
            warnings: warnings.into_vec(),
        })
    }
}

fn decode(doc: &Document) -> Result<ToolGeometry, FormatError> {
    let geometry = doc
        .section("geometry")
        .ok_or_else(|| FormatError::malformed(FORMAT, "missing [geometry] section"))?;
    let count: usize = required(geometry, "count")?;
    let tool_id: Option<u32> = optional(geometry, "id")?;
    let name = geometry.get("name").unwrap_or_default().to_string();
    let convention = match geometry.get("frame") {
        None => None,
        Some(v) => ReferenceFrameConvention::parse_declared(v)
            .map_err(|e| FormatError::malformed(FORMAT, format!("[geometry] frame: {e}")))?,
    };

    let mut opaque = OpaqueMetadata::new(FORMAT);
    stash_unknown(&mut opaque, geometry, &GEOMETRY_KEYS);

    for section in &doc.sections {
        match section.name.as_str() {
            "geometry" | "pivot" => {}
            name => match fiducial_index(name) {
                Some(n) if n >= count => {
                    return Err(FormatError::malformed(
                        FORMAT,
                        format!(
                            "section [{name}] (line {}) is beyond count = {count}",
                            section.line
                        ),
                    ));
                }
                Some(_) => {}
                None => stash_unknown(&mut opaque, section, &[]),
            },
        }
    }

    let mut markers = Vec::with_capacity(count.min(doc.sections.len()));
    for i in 0..count {
        let name = format!("fiducial{i}");
        let section = doc.section(&name).ok_or_else(|| {
            FormatError::malformed(FORMAT, format!("missing section [{name}] (count = {count})"))
        })?;
        let metadata = MarkerMetadata {
            diameter: optional(section, "diameter")?,
            face: optional(section, "face")?,
            group: optional(section, "group")?,
            normal: normal(section)?,
        };
        for (key, value) in &section.entries {
            if !FIDUCIAL_KEYS.contains(&key.as_str()) {
                opaque.insert_marker_field(i, key.clone(), Value::String(value.clone()));
            }
        }
        markers.push(Marker {
            marker_id: i as u32,
            position: point(section)?,
            metadata,
        });
    }

    let pivot = match doc.section("pivot") {
        Some(section) => {
            stash_unknown(&mut opaque, section, &POINT_KEYS);
            Some(point(section)?)
        }
        None => None,
    };

    let geometry = ToolGeometry {
        name,
        tool_id,
        markers,
        pivot,
        convention,
        opaque: opaque.into_option(),
    };
    geometry.validate()?;
    Ok(geometry)
}

/// `fiducial<N>` with N in canonical decimal form.
fn fiducial_index(name: &str) -> Option<usize> {
    let digits = name.strip_prefix("fiducial")?;
    let n: usize = digits.parse().ok()?;
    (n.to_string() == digits).then_some(n)
}

fn parse_value<T: FromStr>(section: &Section, key: &str, raw: &str) -> Result<T, FormatError>
where
    T::Err: std::fmt::Display,
{
    raw.parse().map_err(|e| {
        FormatError::malformed(
            FORMAT,
            format!("[{}] {key} = `{raw}`: {e}", section.name),
        )
    })
}

fn optional<T: FromStr>(section: &Section, key: &str) -> Result<Option<T>, FormatError>
where
    T::Err: std::fmt::Display,
{
    section
        .get(key)
        .map(|raw| parse_value(section, key, raw))
        .transpose()
}

fn required<T: FromStr>(section: &Section, key: &str) -> Result<T, FormatError>
where
    T::Err: std::fmt::Display,
{
    optional(section, key)?.ok_or_else(|| {
        FormatError::malformed(FORMAT, format!("[{}] is missing `{key}`", section.name))
    })
}

fn point(section: &Section) -> Result<Point3D, FormatError> {
    Ok(Point3D::new(
        required(section, "x")?,
        required(section, "y")?,
        required(section, "z")?,
    ))
}

fn normal(section: &Section) -> Result<Option<Vector3<f64>>, FormatError> {
    let parts: [Option<f64>; 3] = [
        optional(section, "nx")?,
        optional(section, "ny")?,
        optional(section, "nz")?,
    ];
    match parts {
        [None, None, None] => Ok(None),
        [Some(x), Some(y), Some(z)] => Ok(Some(Vector3::new(x, y, z))),
        _ => Err(FormatError::malformed(
            FORMAT,
            format!("[{}] a normal needs all of nx, ny and nz", section.name),
        )),
    }
}

/// Keep entries not in `known` under the section's name.
fn stash_unknown(opaque: &mut OpaqueMetadata, section: &Section, known: &[&str]) {
    let extra: Map<String, Value> = section
        .entries
        .iter()
        .filter(|(k, _)| !known.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), Value::String(v.clone())))
        .collect();
    // an unknown section comes back even when empty
    if !extra.is_empty() || known.is_empty() {
        opaque.fields.insert(section.name.clone(), Value::Object(extra));
    }
}

fn fmt_float(v: f64) -> String {
    format!("{v:?}")
}

fn opaque_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

struct Writer {
    out: String,
}

impl Writer {
    fn section(&mut self, name: &str) {
        if !self.out.is_empty() {
            self.out.push('\n');
        }
        let _ = writeln!(self.out, "[{name}]");
    }

    fn entry(&mut self, key: &str, value: impl std::fmt::Display) {
        let _ = writeln!(self.out, "{key} = {value}");
    }

    fn checked(&mut self, field: &str, key: &str, value: &str) -> Result<(), FormatError> {
        if !is_safe_value(value) {
            return Err(FormatError::unsupported(
                FORMAT,
                field,
                format!("`{value}` cannot be stored as an INI value"),
            ));
        }
        self.entry(key, value);
        Ok(())
    }

    fn point(&mut self, p: &Point3D) {
        self.entry("x", fmt_float(p.x));
        self.entry("y", fmt_float(p.y));
        self.entry("z", fmt_float(p.z));
    }

    fn extras(&mut self, scope: &str, fields: Option<&Value>) -> Result<(), FormatError> {
        if let Some(Value::Object(map)) = fields {
            for (key, value) in map {
                self.checked(&format!("{scope}.{key}"), key, &opaque_text(value))?;
            }
        }
        Ok(())
    }
}

fn encode(geometry: &ToolGeometry) -> Result<String, FormatError> {
    let opaque = geometry.opaque_for(FORMAT);
    let tool_extra = |name: &str| opaque.and_then(|o| o.fields.get(name));
    let mut w = Writer { out: String::new() };

    w.section("geometry");
    w.entry("count", geometry.markers.len());
    if let Some(id) = geometry.tool_id {
        w.entry("id", id);
    }
    if !geometry.name.is_empty() {
        w.checked("name", "name", &geometry.name)?;
    }
    if let Some(convention) = geometry.convention {
        w.entry("frame", convention);
    }
    w.extras("geometry", tool_extra("geometry"))?;

    for (i, marker) in geometry.markers.iter().enumerate() {
        w.section(&format!("fiducial{i}"));
        w.point(&marker.position);
        let meta = &marker.metadata;
        if let Some(d) = meta.diameter {
            w.entry("diameter", fmt_float(d));
        }
        if let Some(face) = meta.face {
            w.entry("face", face);
        }
        if let Some(group) = meta.group {
            w.entry("group", group);
        }
        if let Some(n) = meta.normal {
            w.entry("nx", fmt_float(n.x));
            w.entry("ny", fmt_float(n.y));
            w.entry("nz", fmt_float(n.z));
        }
        if let Some(fields) = opaque.and_then(|o| o.marker_fields(i)) {
            for (key, value) in fields {
                w.checked(&format!("marker{i}.{key}"), key, &opaque_text(value))?;
            }
        }
    }

    if let Some(pivot) = geometry.pivot {
        w.section("pivot");
        w.point(&pivot);
        w.extras("pivot", tool_extra("pivot"))?;
    }

    if let Some(opaque) = opaque {
        for (name, fields) in &opaque.fields {
            if name == "geometry" || name == "pivot" {
                continue;
            }
            w.section(name);
            w.extras(name, Some(fields))?;
        }
    }

    Ok(w.out)
}
