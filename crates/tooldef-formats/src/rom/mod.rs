//! NDI `.rom` passive tool definitions.
//!
//! Fixed-size little-endian images described by a [`RomLayout`]. ROM has no
//! pivot, id, reference-frame or diameter fields: a pivot is folded into the
//! marker coordinates, the others are dropped with a warning.
//!
//! Header fields without a [`ToolGeometry`] counterpart are decoded into
//! [`RomExtras`] and kept as opaque metadata, so a parsed file written back
//! as ROM reproduces its bytes.

mod compare;
mod date;
mod image;
mod layout;

pub use compare::{compare_images, ByteRow};
pub use date::RomDate;
pub use layout::{FieldKind, RomField, RomLayout, NDI_V1};

use crate::error::FormatError;
use crate::warning::Warnings;
use crate::{ToolCodec, ToolFile};
use date::{decode_stamp, encode_stamp, stamp_reads_as};
use image::{checksum, RomReader, RomWriter};
use log::{debug, warn};
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use tooldef_core::{
    round_half_even, Marker, MarkerMetadata, OpaqueMetadata, Point3D, ToolFormat, ToolGeometry,
};

#[cfg(feature = "tracing")]
use tracing::instrument;

const FORMAT: ToolFormat = ToolFormat::Rom;
const MAGIC: &[u8; 3] = b"NDI";
/// Decimal places kept when widening stored `f32` coordinates.
const DECIMALS: i32 = 5;

const POSITION_BITS: &str = "position_bits";
const NORMAL_BITS: &str = "normal_bits";
const FIRING: &str = "firing";

/// Physical marker type stored in the image.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerKind {
    #[default]
    PassiveSphere,
    PassiveDisc,
    RadixLens,
}

impl MarkerKind {
    pub fn code(self) -> u8 {
        match self {
            MarkerKind::PassiveSphere => 41,
            MarkerKind::PassiveDisc => 49,
            MarkerKind::RadixLens => 57,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            41 => Some(MarkerKind::PassiveSphere),
            49 => Some(MarkerKind::PassiveDisc),
            57 => Some(MarkerKind::RadixLens),
            _ => None,
        }
    }
}

/// Settings for ROM images built from a geometry that carries no ROM
/// header of its own.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RomOptions {
    /// Date stamped into the header; today (UTC) when unset.
    pub date: Option<RomDate>,
    pub manufacturer: String,
    pub marker_type: MarkerKind,
}

/// ROM header fields with no [`ToolGeometry`] counterpart.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RomExtras {
    /// Bytes 6..12, always `00 00 01 00 00 00` in known files.
    pub signature: [u8; 6],
    /// 0 removable tip, 1 fixed tip, 2 undefined.
    pub tool_sub_type: u8,
    /// 0 unknown, 1 reference, 2 pointer, ...
    pub tool_main_type: u8,
    pub revision: u16,
    pub sequence: u16,
    pub date: RomDate,
    /// Degrees.
    pub max_angle: u8,
    pub min_markers: u8,
    /// Millimetres.
    pub max_error: f32,
    pub min_spread: [f32; 3],
    pub legacy_a: f32,
    pub legacy_b: u16,
    /// Marker index per LED, 31 for none.
    pub leds: [u8; 4],
    pub port_diode: u8,
    pub switches: [u8; 3],
    pub manufacturer: String,
    pub legacy_c: u8,
    pub alg_flags: u8,
    pub marker_type: MarkerKind,
    /// Face normals up to the last non-zero one.
    pub face_normals: Vec<[f32; 3]>,
    /// Stored stamp bytes that `sequence` and `date` do not re-encode to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stamp: Option<[u8; 4]>,
    /// Non-zero bytes outside every named field, keyed by offset.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub reserved: BTreeMap<usize, u8>,
}

impl RomExtras {
    pub fn from_options(options: &RomOptions) -> Self {
        Self {
            signature: [0, 0, 1, 0, 0, 0],
            tool_sub_type: 2,
            tool_main_type: 0,
            revision: 0,
            sequence: 0,
            date: options.date.unwrap_or_else(RomDate::today_utc),
            max_angle: 90,
            min_markers: 3,
            max_error: 2.0,
            min_spread: [0.0; 3],
            legacy_a: 0.0,
            legacy_b: 0,
            leds: [31; 4],
            port_diode: 9,
            switches: [0; 3],
            manufacturer: options.manufacturer.clone(),
            legacy_c: 9,
            alg_flags: 128,
            marker_type: options.marker_type,
            face_normals: Vec::new(),
            stamp: None,
            reserved: BTreeMap::new(),
        }
    }

    /// Extras stored in `geometry` by a ROM parse, if any.
    pub fn from_geometry(geometry: &ToolGeometry) -> Result<Option<Self>, FormatError> {
        match geometry.opaque_for(FORMAT) {
            Some(opaque) => {
                let map: serde_json::Map<String, Value> = opaque
                    .fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                Ok(Some(serde_json::from_value(Value::Object(map))?))
            }
            None => Ok(None),
        }
    }
}

impl Default for RomExtras {
    fn default() -> Self {
        Self::from_options(&RomOptions::default())
    }
}

/// Codec for one [`RomLayout`].
#[derive(Clone, Debug)]
pub struct RomCodec {
    layout: &'static RomLayout,
    options: RomOptions,
}

impl Default for RomCodec {
    fn default() -> Self {
        Self::new(RomOptions::default())
    }
}

impl RomCodec {
    pub fn new(options: RomOptions) -> Self {
        Self::with_layout(&NDI_V1, options)
    }

    pub fn with_layout(layout: &'static RomLayout, options: RomOptions) -> Self {
        Self { layout, options }
    }

    pub fn layout(&self) -> &'static RomLayout {
        self.layout
    }
}

impl ToolCodec for RomCodec {
    fn format(&self) -> ToolFormat {
        FORMAT
    }

    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip_all, fields(len = bytes.len()))
    )]
    fn parse(&self, bytes: &[u8]) -> Result<ToolGeometry, FormatError> {
        let layout = self.layout;
        if bytes.len() < layout.size {
            return Err(FormatError::TruncatedFile {
                format: FORMAT,
                expected: layout.size,
                found: bytes.len(),
            });
        }
        if bytes.len() > layout.size {
            warn!(
                "ignoring {} bytes after the {}-byte {} image",
                bytes.len() - layout.size,
                layout.size,
                layout.name
            );
        }
        decode(layout, &bytes[..layout.size])
    }

    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip_all, fields(markers = geometry.markers.len()))
    )]
    fn serialize(&self, geometry: &ToolGeometry) -> Result<ToolFile, FormatError> {
        geometry.validate()?;
        let mut warnings = Warnings::new(FORMAT);
        warnings.foreign_opaque(geometry);
        let extras = match RomExtras::from_geometry(geometry)? {
            Some(extras) => extras,
            None => RomExtras::from_options(&self.options),
        };
        let bytes = encode(self.layout, geometry, &extras, &mut warnings)?;
        Ok(ToolFile {
            format: FORMAT,
            bytes,
            warnings: warnings.into_vec(),
        })
    }
}

fn widen(v: f32) -> f64 {
    round_half_even(f64::from(v), DECIMALS)
}

/// Narrow to `f32`, reusing the stored bits when they still decode to `value`.
///
/// Values beyond the `f32` range are refused rather than stored as infinity.
fn narrow(value: f64, stored: Option<u32>, field: &str, index: usize) -> Result<f32, FormatError> {
    if let Some(bits) = stored {
        let raw = f32::from_bits(bits);
        if widen(raw) == value {
            return Ok(raw);
        }
    }
    let narrowed = value as f32;
    if narrowed.is_finite() {
        Ok(narrowed)
    } else {
        Err(FormatError::unsupported(
            FORMAT,
            format!("{field}[{index}]"),
            format!("{value} does not fit a 32-bit float"),
        ))
    }
}

fn decode(layout: &'static RomLayout, image: &[u8]) -> Result<ToolGeometry, FormatError> {
    let r = RomReader::new(layout, image);

    if r.raw("magic")? != MAGIC {
        return Err(FormatError::malformed(FORMAT, "missing NDI magic"));
    }
    let stored = r.u16("checksum")?;
    let computed = checksum(&image[layout.checksum_start..]);
    if stored != computed {
        return Err(FormatError::Checksum { stored, computed });
    }

    let count = usize::from(r.u8("marker_count", 0)?);
    if !(tooldef_core::MIN_MARKERS..=layout.max_markers).contains(&count) {
        return Err(FormatError::malformed(
            FORMAT,
            format!(
                "marker count {count} outside {}..={}",
                tooldef_core::MIN_MARKERS,
                layout.max_markers
            ),
        ));
    }

    let mut opaque = OpaqueMetadata::new(FORMAT);
    let mut markers = Vec::with_capacity(count);
    for i in 0..count {
        let pos = [
            r.f32("markers", 3 * i)?,
            r.f32("markers", 3 * i + 1)?,
            r.f32("markers", 3 * i + 2)?,
        ];
        let nrm = [
            r.f32("normals", 3 * i)?,
            r.f32("normals", 3 * i + 1)?,
            r.f32("normals", 3 * i + 2)?,
        ];
        let normal = nrm
            .iter()
            .any(|&v| v.to_bits() != 0)
            .then(|| Vector3::new(widen(nrm[0]), widen(nrm[1]), widen(nrm[2])));
        let face = r.u8("faces", i)?;
        let group = r.u8("groups", i)?;

        opaque.insert_marker_field(i, POSITION_BITS.into(), bits_value(pos));
        if normal.is_some() {
            opaque.insert_marker_field(i, NORMAL_BITS.into(), bits_value(nrm));
        }
        let firing = r.u8("firing", i)?;
        if usize::from(firing) != i {
            opaque.insert_marker_field(i, FIRING.into(), Value::from(firing));
        }

        markers.push(Marker {
            marker_id: i as u32,
            position: Point3D::new(widen(pos[0]), widen(pos[1]), widen(pos[2])),
            metadata: MarkerMetadata {
                diameter: None,
                face: (face != 0).then_some(face),
                group: (group != 0).then_some(group),
                normal,
            },
        });
    }
    report_unused_slots(&r, layout, count)?;

    let raw_stamp = r.array("stamp")?;
    let (sequence, date) = decode_stamp(raw_stamp);
    let raw_type = r.u8("marker_type", 0)?;
    let marker_type = MarkerKind::from_code(raw_type).ok_or_else(|| {
        FormatError::malformed(FORMAT, format!("unknown marker type {raw_type}"))
    })?;

    let mut face_normals = Vec::with_capacity(layout.max_faces);
    for f in 0..layout.max_faces {
        face_normals.push([
            r.f32("face_normals", 3 * f)?,
            r.f32("face_normals", 3 * f + 1)?,
            r.f32("face_normals", 3 * f + 2)?,
        ]);
    }
    while face_normals
        .last()
        .is_some_and(|n| n.iter().all(|v| v.to_bits() == 0))
    {
        face_normals.pop();
    }

    let extras = RomExtras {
        signature: r.array("signature")?,
        tool_sub_type: r.u8("sub_type", 0)?,
        tool_main_type: r.u8("main_type", 0)?,
        revision: r.u16("revision")?,
        sequence,
        date,
        max_angle: r.u8("max_angle", 0)?,
        min_markers: r.u8("min_markers", 0)?,
        max_error: r.f32("max_error", 0)?,
        min_spread: [
            r.f32("min_spread", 0)?,
            r.f32("min_spread", 1)?,
            r.f32("min_spread", 2)?,
        ],
        legacy_a: r.f32("legacy_a", 0)?,
        legacy_b: r.u16("legacy_b")?,
        leds: r.array("leds")?,
        port_diode: r.u8("port_diode", 0)?,
        switches: r.array("switches")?,
        manufacturer: r.ascii("manufacturer")?,
        legacy_c: r.u8("legacy_c", 0)?,
        alg_flags: r.u8("alg_flags", 0)?,
        marker_type,
        face_normals,
        stamp: (encode_stamp(sequence, &date) != Some(raw_stamp)).then_some(raw_stamp),
        reserved: layout
            .reserved()
            .into_iter()
            .filter_map(|off| image.get(off).filter(|&&b| b != 0).map(|&b| (off, b)))
            .collect(),
    };
    if let Value::Object(map) = serde_json::to_value(&extras)? {
        opaque.fields.extend(map);
    }

    let geometry = ToolGeometry {
        name: r.ascii("part_number")?,
        tool_id: None,
        markers,
        pivot: None,
        convention: None,
        opaque: opaque.into_option(),
    };
    geometry.validate()?;
    debug!(
        "decoded {} ({} markers, {} {})",
        geometry.name, count, extras.date, layout.name
    );
    Ok(geometry)
}

fn report_unused_slots(
    r: &RomReader<'_>,
    layout: &RomLayout,
    count: usize,
) -> Result<(), FormatError> {
    for slot in count..layout.max_markers {
        let mut used = r.u8("faces", slot)? != 0 || r.u8("groups", slot)? != 0;
        for k in 0..3 {
            used |= r.f32("markers", 3 * slot + k)?.to_bits() != 0;
            used |= r.f32("normals", 3 * slot + k)?.to_bits() != 0;
        }
        if used {
            debug!("marker slot {slot} holds data beyond marker count {count}; ignored");
        }
    }
    Ok(())
}

fn bits_value(values: [f32; 3]) -> Value {
    Value::from(values.map(f32::to_bits).to_vec())
}

fn stored_bits(fields: Option<&BTreeMap<String, Value>>, key: &str) -> [Option<u32>; 3] {
    let parsed = fields
        .and_then(|f| f.get(key))
        .and_then(|v| serde_json::from_value::<[u32; 3]>(v.clone()).ok());
    match parsed {
        Some(bits) => bits.map(Some),
        None => [None; 3],
    }
}

fn encode(
    layout: &'static RomLayout,
    geometry: &ToolGeometry,
    extras: &RomExtras,
    warnings: &mut Warnings,
) -> Result<Vec<u8>, FormatError> {
    let count = geometry.markers.len();
    if count > layout.max_markers {
        return Err(FormatError::unsupported(
            FORMAT,
            "markers",
            format!("{} stores at most {} markers, got {count}", layout.name, layout.max_markers),
        ));
    }
    if extras.face_normals.len() > layout.max_faces {
        return Err(FormatError::unsupported(
            FORMAT,
            "face_normals",
            format!("at most {} faces", layout.max_faces),
        ));
    }

    if geometry.tool_id.is_some() {
        warnings.dropped("id");
    }
    if geometry.convention.is_some() {
        warnings.dropped("frame");
    }
    if geometry.markers.iter().any(|m| m.metadata.diameter.is_some()) {
        warnings.dropped("diameter");
    }
    let shift = match geometry.pivot {
        Some(p) => {
            warnings.geometry_changed(format!(
                "no pivot field; markers re-centred on the pivot ({}, {}, {})",
                p.x, p.y, p.z
            ));
            p.coords
        }
        None => Vector3::zeros(),
    };

    let stamp = match extras.stamp {
        Some(raw) if stamp_reads_as(raw, extras.sequence, &extras.date) => raw,
        _ => encode_stamp(extras.sequence, &extras.date).ok_or_else(|| {
            FormatError::unsupported(
                FORMAT,
                "date",
                format!(
                    "sequence {} on {} cannot be packed into the header stamp",
                    extras.sequence, extras.date
                ),
            )
        })?,
    };

    let mut w = RomWriter::new(layout);
    w.set_raw("magic", MAGIC)?;
    w.set_raw("signature", &extras.signature)?;
    w.set_u8("sub_type", 0, extras.tool_sub_type)?;
    w.set_u8("main_type", 0, extras.tool_main_type)?;
    w.set_u16("revision", extras.revision)?;
    w.set_raw("stamp", &stamp)?;
    w.set_u8("max_angle", 0, extras.max_angle)?;
    w.set_u8("marker_count", 0, count as u8)?;
    w.set_u8("min_markers", 0, extras.min_markers)?;
    w.set_f32("max_error", 0, extras.max_error)?;
    for (k, spread) in extras.min_spread.iter().enumerate() {
        w.set_f32("min_spread", k, *spread)?;
    }
    w.set_f32("legacy_a", 0, extras.legacy_a)?;
    w.set_u16("legacy_b", extras.legacy_b)?;

    let opaque = geometry.opaque_for(FORMAT);
    for (i, marker) in geometry.markers.iter().enumerate() {
        let fields = opaque.and_then(|o| o.marker_fields(i));
        let position = marker.position - shift;
        let hints = stored_bits(fields, POSITION_BITS);
        for k in 0..3 {
            w.set_f32("markers", 3 * i + k, narrow(position[k], hints[k], "markers", i)?)?;
        }
        if let Some(normal) = marker.metadata.normal {
            let hints = stored_bits(fields, NORMAL_BITS);
            for k in 0..3 {
                w.set_f32("normals", 3 * i + k, narrow(normal[k], hints[k], "normals", i)?)?;
            }
        }
        w.set_u8("faces", i, marker.metadata.face.unwrap_or(1))?;
        w.set_u8("groups", i, marker.metadata.group.unwrap_or(1))?;
        let firing = fields
            .and_then(|f| f.get(FIRING))
            .and_then(Value::as_u64)
            .and_then(|v| u8::try_from(v).ok())
            .unwrap_or(i as u8);
        w.set_u8("firing", i, firing)?;
    }

    w.set_raw("leds", &extras.leds)?;
    w.set_u8("port_diode", 0, extras.port_diode)?;
    w.set_raw("switches", &extras.switches)?;
    w.set_ascii("manufacturer", "manufacturer", &extras.manufacturer)?;
    w.set_ascii("part_number", "name", &geometry.name)?;
    w.set_u8("legacy_c", 0, extras.legacy_c)?;
    w.set_u8("alg_flags", 0, extras.alg_flags)?;
    w.set_u8("marker_type", 0, extras.marker_type.code())?;
    for (f, normal) in extras.face_normals.iter().enumerate() {
        for (k, v) in normal.iter().enumerate() {
            w.set_f32("face_normals", 3 * f + k, *v)?;
        }
    }

    let reserved = layout.reserved();
    for (&offset, &value) in &extras.reserved {
        if !reserved.contains(&offset) || !w.set_reserved(offset, value) {
            warn!(
                "ignoring stored byte at offset {offset}: not a reserved byte of {}",
                layout.name
            );
        }
    }

    w.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{IniCodec, JsonCodec};
    use approx::assert_abs_diff_eq;

    fn options() -> RomOptions {
        RomOptions {
            date: RomDate::new(2022, 7, 22),
            manufacturer: "JHU".into(),
            marker_type: MarkerKind::PassiveSphere,
        }
    }

    fn probe() -> ToolGeometry {
        ToolGeometry::from_positions(
            "probe-4",
            &[
                Point3D::new(0.0, 0.0, 0.0),
                Point3D::new(50.123, 0.0, 0.0),
                Point3D::new(0.0, 30.1, 0.0),
                Point3D::new(-20.25, 45.0, 5.5),
            ],
        )
    }

    fn encoded() -> Vec<u8> {
        RomCodec::new(options()).serialize(&probe()).unwrap().bytes
    }

    fn reseal(bytes: &mut [u8]) {
        let sum = checksum(&bytes[6..]);
        bytes[4..6].copy_from_slice(&sum.to_le_bytes());
    }

    #[test]
    fn image_has_documented_defaults() {
        let bytes = encoded();
        assert_eq!(bytes.len(), 752);
        assert_eq!(&bytes[0..3], b"NDI");
        assert_eq!(&bytes[6..12], &[0, 0, 1, 0, 0, 0]);
        assert_eq!(bytes[12], 2);
        assert_eq!(bytes[24], 90);
        assert_eq!(bytes[28], 4);
        assert_eq!(bytes[32], 3);
        assert_eq!(f32::from_le_bytes(bytes[36..40].try_into().unwrap()), 2.0);
        assert_eq!(&bytes[552..556], &[0, 1, 2, 3]);
        assert_eq!(&bytes[572..576], &[31; 4]);
        assert_eq!(bytes[576], 9);
        assert_eq!(&bytes[580..583], b"JHU");
        assert_eq!(&bytes[592..599], b"probe-4");
        assert_eq!(bytes[612], 9);
        assert_eq!(&bytes[613..618], &[1, 1, 1, 1, 0]);
        assert_eq!(bytes[653], 128);
        assert_eq!(bytes[655], 41);
        let stored = u16::from_le_bytes([bytes[4], bytes[5]]);
        assert_eq!(stored, checksum(&bytes[6..]));
    }

    #[test]
    fn parse_recovers_positions_and_header() {
        let g = RomCodec::default().parse(&encoded()).unwrap();
        assert_eq!(g.name, "probe-4");
        assert_eq!(g.markers[1].position, Point3D::new(50.123, 0.0, 0.0));
        assert_eq!(g.markers[0].metadata.face, Some(1));
        assert_eq!(g.markers[0].metadata.normal, None);
        let extras = RomExtras::from_geometry(&g).unwrap().unwrap();
        assert_eq!(extras.date, RomDate::new(2022, 7, 22).unwrap());
        assert_eq!(extras.manufacturer, "JHU");
        assert_eq!(extras.marker_type, MarkerKind::PassiveSphere);
        assert!(extras.reserved.is_empty());
    }

    #[test]
    fn same_format_round_trip_is_byte_exact() {
        let mut bytes = encoded();
        // values a vendor tool might leave behind
        bytes[16] = 3;
        bytes[64..68].copy_from_slice(&2.5f32.to_le_bytes());
        bytes[70] = 0x5a;
        bytes[656..660].copy_from_slice(&0.7071f32.to_le_bytes());
        bytes[72..76].copy_from_slice(&1.234_567_9f32.to_le_bytes());
        reseal(&mut bytes);

        let codec = RomCodec::default();
        let g = codec.parse(&bytes).unwrap();
        let again = codec.serialize(&g).unwrap();
        assert!(again.warnings.is_empty(), "{:?}", again.warnings);
        assert_eq!(again.bytes, bytes);
    }

    #[test]
    fn stamp_with_wrong_month_is_written_back_unchanged() {
        let mut bytes = encoded();
        bytes[22] &= !0b0111_1000;
        reseal(&mut bytes);

        let codec = RomCodec::default();
        let g = codec.parse(&bytes).unwrap();
        let extras = RomExtras::from_geometry(&g).unwrap().unwrap();
        assert_eq!(extras.date, RomDate::new(2022, 7, 22).unwrap());
        assert_eq!(extras.stamp, Some([bytes[20], bytes[21], bytes[22], bytes[23]]));
        assert_eq!(codec.serialize(&g).unwrap().bytes, bytes);
    }

    #[test]
    fn stamp_with_ordinal_past_year_end_is_written_back_unchanged() {
        let mut bytes = encoded();
        // day 365 of 2022 does not exist and rolls into 2023
        bytes[21] = (45 << 2) | (bytes[21] & 0b11);
        bytes[22] = (bytes[22] & !0b111) | 0b101;
        reseal(&mut bytes);

        let codec = RomCodec::default();
        let g = codec.parse(&bytes).unwrap();
        let extras = RomExtras::from_geometry(&g).unwrap().unwrap();
        assert_eq!(extras.date, RomDate::new(2023, 1, 1).unwrap());
        assert_eq!(codec.serialize(&g).unwrap().bytes, bytes);
    }

    #[test]
    fn edited_date_replaces_a_stored_stamp() {
        let mut bytes = encoded();
        bytes[22] &= !0b0111_1000;
        reseal(&mut bytes);

        let codec = RomCodec::default();
        let mut g = codec.parse(&bytes).unwrap();
        if let Some(opaque) = g.opaque.as_mut() {
            opaque.fields.insert("date".into(), Value::from("2023-05-05"));
        }
        let out = codec.serialize(&g).unwrap().bytes;
        let date = RomDate::new(2023, 5, 5).unwrap();
        assert_eq!(out[20..24], encode_stamp(0, &date).unwrap());
    }

    #[test]
    fn coordinates_beyond_f32_range_are_unsupported() {
        let mut g = probe();
        g.markers[1].position.x = 1e300;
        assert!(matches!(
            RomCodec::new(options()).serialize(&g),
            Err(FormatError::UnsupportedField { ref field, .. }) if field == "markers[1]"
        ));

        let mut g = probe();
        g.markers[2].metadata.normal = Some(Vector3::new(0.0, -1e40, 0.0));
        assert!(matches!(
            RomCodec::new(options()).serialize(&g),
            Err(FormatError::UnsupportedField { ref field, .. }) if field == "normals[2]"
        ));
    }

    #[test]
    fn rom_json_rom_keeps_positions_within_tolerance() {
        let rom = RomCodec::default();
        let g = rom.parse(&encoded()).unwrap();
        let json = JsonCodec.serialize(&g).unwrap();
        assert!(json
            .warnings
            .iter()
            .any(|w| matches!(
                w,
                crate::ConversionWarning::DroppedOpaque {
                    source: ToolFormat::Rom,
                    ..
                }
            )));
        let via_json = JsonCodec.parse(&json.bytes).unwrap();
        let encoded = RomCodec::new(options()).serialize(&via_json).unwrap();
        let back = rom.parse(&encoded.bytes).unwrap();
        for (a, b) in back.markers.iter().zip(&g.markers) {
            assert_abs_diff_eq!(a.position, b.position, epsilon = 1e-5);
        }
    }

    #[test]
    fn truncated_and_tampered_files_are_rejected() {
        let bytes = encoded();
        let rom = RomCodec::default();
        assert!(matches!(
            rom.parse(&bytes[..700]),
            Err(FormatError::TruncatedFile {
                expected: 752,
                found: 700,
                ..
            })
        ));

        let mut tampered = bytes.clone();
        tampered[100] ^= 0x01;
        let stored = u16::from_le_bytes([bytes[4], bytes[5]]);
        match rom.parse(&tampered) {
            Err(FormatError::Checksum { stored: s, computed }) => {
                assert_eq!(s, stored);
                assert_ne!(computed, stored);
            }
            other => panic!("expected checksum error, got {other:?}"),
        }

        let mut magic = bytes.clone();
        magic[0] = b'X';
        assert!(matches!(rom.parse(&magic), Err(FormatError::MalformedFile { .. })));

        let mut count = bytes;
        count[28] = 21;
        reseal(&mut count);
        assert!(matches!(rom.parse(&count), Err(FormatError::MalformedFile { .. })));
    }

    #[test]
    fn pivot_is_folded_into_markers() {
        let mut g = probe();
        g.pivot = Some(Point3D::new(0.0, 0.0, -100.0));
        g.tool_id = Some(9);
        g.markers[0].metadata.diameter = Some(11.5);
        let file = RomCodec::new(options()).serialize(&g).unwrap();
        assert_eq!(file.warnings.len(), 3);
        assert!(file
            .warnings
            .iter()
            .any(|w| matches!(w, crate::ConversionWarning::GeometryChanged { .. })));
        let back = RomCodec::default().parse(&file.bytes).unwrap();
        assert_eq!(back.pivot, None);
        assert_eq!(back.markers[0].position, Point3D::new(0.0, 0.0, 100.0));
    }

    #[test]
    fn unsupported_geometry_is_refused() {
        let rom = RomCodec::new(options());
        let mut long = probe();
        long.name = "a-name-longer-than-twenty".into();
        assert!(matches!(
            rom.serialize(&long),
            Err(FormatError::UnsupportedField { ref field, .. }) if field == "name"
        ));

        let positions: Vec<Point3D> = (0..21)
            .map(|i| Point3D::new(i as f64 * 10.0, (i % 3) as f64 * 7.0, 0.0))
            .collect();
        let many = ToolGeometry::from_positions("many", &positions);
        assert!(matches!(
            rom.serialize(&many),
            Err(FormatError::UnsupportedField { ref field, .. }) if field == "markers"
        ));
    }

    #[test]
    fn ini_to_rom_keeps_normals_faces_and_groups() {
        let mut g = probe();
        g.markers[2].metadata.normal = Some(Vector3::new(0.0, 0.6, 0.8));
        g.markers[3].metadata.face = Some(2);
        g.markers[3].metadata.group = Some(3);
        let ini = IniCodec.serialize(&g).unwrap();
        let from_ini = IniCodec.parse(&ini.bytes).unwrap();
        let rom = RomCodec::new(options()).serialize(&from_ini).unwrap();
        let back = RomCodec::default().parse(&rom.bytes).unwrap();
        assert_eq!(back.markers[2].metadata.normal, Some(Vector3::new(0.0, 0.6, 0.8)));
        assert_eq!(back.markers[3].metadata.face, Some(2));
        assert_eq!(back.markers[3].metadata.group, Some(3));
        assert_eq!(back.markers[0].metadata.group, Some(1));
    }
}
