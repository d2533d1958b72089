use crate::error::FormatError;
use std::ops::Range;
use tooldef_core::ToolFormat;

/// Element type of a ROM field.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    /// NUL-padded ASCII, one byte per element.
    Ascii,
    /// Opaque bytes.
    Bytes,
    U8,
    U16,
    F32,
}

impl FieldKind {
    pub const fn width(self) -> usize {
        match self {
            FieldKind::Ascii | FieldKind::Bytes | FieldKind::U8 => 1,
            FieldKind::U16 => 2,
            FieldKind::F32 => 4,
        }
    }
}

/// One named region of a ROM image.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RomField {
    pub name: &'static str,
    pub offset: usize,
    pub kind: FieldKind,
    pub count: usize,
}

impl RomField {
    const fn new(name: &'static str, offset: usize, kind: FieldKind, count: usize) -> Self {
        Self {
            name,
            offset,
            kind,
            count,
        }
    }

    pub const fn byte_len(&self) -> usize {
        self.kind.width() * self.count
    }

    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.byte_len()
    }

    /// Byte range of element `index`.
    pub fn element(&self, index: usize) -> Option<Range<usize>> {
        (index < self.count).then(|| {
            let start = self.offset + index * self.kind.width();
            start..start + self.kind.width()
        })
    }
}

/// Byte layout of one revision of the ROM format.
///
/// Codec code addresses fields by name, so a new firmware revision only
/// needs a new descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RomLayout {
    pub name: &'static str,
    /// Total image size in bytes.
    pub size: usize,
    pub max_markers: usize,
    pub max_faces: usize,
    /// The checksum covers every byte from here to the end of the image.
    pub checksum_start: usize,
    pub fields: &'static [RomField],
}

use FieldKind::*;

/// Layout written by NDI 6D Architect for Polaris passive tools.
pub const NDI_V1: RomLayout = RomLayout {
    name: "ndi-v1",
    size: 752,
    max_markers: 20,
    max_faces: 8,
    checksum_start: 6,
    fields: &[
        RomField::new("magic", 0, Ascii, 3),
        RomField::new("checksum", 4, U16, 1),
        RomField::new("signature", 6, Bytes, 6),
        RomField::new("sub_type", 12, U8, 1),
        RomField::new("main_type", 15, U8, 1),
        RomField::new("revision", 16, U16, 1),
        RomField::new("stamp", 20, Bytes, 4),
        RomField::new("max_angle", 24, U8, 1),
        RomField::new("marker_count", 28, U8, 1),
        RomField::new("min_markers", 32, U8, 1),
        RomField::new("max_error", 36, F32, 1),
        RomField::new("min_spread", 40, F32, 3),
        RomField::new("legacy_a", 64, F32, 1),
        RomField::new("legacy_b", 68, U16, 1),
        RomField::new("markers", 72, F32, 60),
        RomField::new("normals", 312, F32, 60),
        RomField::new("firing", 552, U8, 20),
        RomField::new("leds", 572, U8, 4),
        RomField::new("port_diode", 576, U8, 1),
        RomField::new("switches", 577, U8, 3),
        RomField::new("manufacturer", 580, Ascii, 12),
        RomField::new("part_number", 592, Ascii, 20),
        RomField::new("legacy_c", 612, U8, 1),
        RomField::new("faces", 613, U8, 20),
        RomField::new("groups", 633, U8, 20),
        RomField::new("alg_flags", 653, U8, 1),
        RomField::new("marker_type", 655, U8, 1),
        RomField::new("face_normals", 656, F32, 24),
    ],
};

impl RomLayout {
    pub fn field(&self, name: &str) -> Result<&'static RomField, FormatError> {
        self.fields.iter().find(|f| f.name == name).ok_or_else(|| {
            FormatError::unsupported(
                ToolFormat::Rom,
                name,
                format!("layout {} has no such field", self.name),
            )
        })
    }

    /// Field covering byte `offset` and the element index within it.
    pub fn field_at(&self, offset: usize) -> Option<(&'static RomField, usize)> {
        self.fields
            .iter()
            .find(|f| f.range().contains(&offset))
            .map(|f| (f, (offset - f.offset) / f.kind.width()))
    }

    /// Byte offsets not covered by any field.
    pub fn reserved(&self) -> Vec<usize> {
        let mut covered = vec![false; self.size];
        for field in self.fields {
            for slot in covered.iter_mut().take(field.range().end).skip(field.offset) {
                *slot = true;
            }
        }
        covered
            .iter()
            .enumerate()
            .filter(|(_, c)| !**c)
            .map(|(i, _)| i)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ndi_v1_fields_are_disjoint_and_in_bounds() {
        let mut owner: Vec<Option<&str>> = vec![None; NDI_V1.size];
        for field in NDI_V1.fields {
            assert!(field.range().end <= NDI_V1.size, "{} out of bounds", field.name);
            for slot in &mut owner[field.range()] {
                assert!(slot.is_none(), "{} overlaps {:?}", field.name, slot);
                *slot = Some(field.name);
            }
        }
        assert_eq!(NDI_V1.field("face_normals").unwrap().range().end, 752);
    }

    #[test]
    fn reserved_bytes_are_the_gaps() {
        let reserved = NDI_V1.reserved();
        assert_eq!(&reserved[..3], &[3, 13, 14]);
        assert!(reserved.contains(&654));
        assert!(!reserved.contains(&655));
    }

    #[test]
    fn element_ranges() {
        let markers = NDI_V1.field("markers").unwrap();
        assert_eq!(markers.element(0), Some(72..76));
        assert_eq!(markers.element(59), Some(308..312));
        assert_eq!(markers.element(60), None);
    }

    #[test]
    fn offsets_map_to_their_field() {
        let (field, element) = NDI_V1.field_at(85).unwrap();
        assert_eq!((field.name, element), ("markers", 3));
        let (field, element) = NDI_V1.field_at(5).unwrap();
        assert_eq!((field.name, element), ("checksum", 0));
        assert!(NDI_V1.field_at(654).is_none());
        assert!(NDI_V1.field_at(752).is_none());
    }

    #[test]
    fn unknown_field_is_an_error() {
        assert!(NDI_V1.field("pivot").is_err());
    }
}
