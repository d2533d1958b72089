//! Byte-level comparison of ROM images, for working out what an undocumented
//! header byte means from files that differ in one setting.

use super::layout::RomLayout;
use serde::Serialize;
use std::fmt;

/// One offset at which some image holds a non-zero byte.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ByteRow {
    pub offset: usize,
    /// Byte per image, `None` past the end of a shorter image.
    pub values: Vec<Option<u8>>,
    /// Layout field covering `offset`; `None` for a reserved byte.
    pub field: Option<&'static str>,
    /// Element of `field`, for fields holding more than one value.
    pub element: Option<usize>,
}

impl ByteRow {
    /// `true` unless every image holds the same byte.
    pub fn differs(&self) -> bool {
        self.values.windows(2).any(|w| w[0] != w[1])
    }

    /// `markers[3]`, `checksum` or `reserved`.
    pub fn label(&self) -> String {
        match (self.field, self.element) {
            (Some(name), Some(i)) => format!("{name}[{i}]"),
            (Some(name), None) => name.to_string(),
            (None, _) => "reserved".to_string(),
        }
    }
}

impl fmt::Display for ByteRow {
    /// `*  72 markers[0]        0 00  | 205 cd  `: a leading `*` marks a
    /// differing row; each image shows decimal, hex and printable ASCII.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = if self.differs() { '*' } else { ' ' };
        write!(f, "{mark} {:>4} {:<16}", self.offset, self.label())?;
        for (i, value) in self.values.iter().enumerate() {
            let sep = if i == 0 { "" } else { " |" };
            match value {
                Some(b) => {
                    let c = if b.is_ascii_alphanumeric() { *b as char } else { ' ' };
                    write!(f, "{sep} {b:>3} {b:02x} {c}")?;
                }
                None => write!(f, "{sep}   -      ")?,
            }
        }
        Ok(())
    }
}

/// Rows for every offset where some image is non-zero or missing.
///
/// Images of any length are accepted; offsets beyond the layout have no field.
pub fn compare_images(layout: &RomLayout, images: &[&[u8]]) -> Vec<ByteRow> {
    let len = images.iter().map(|b| b.len()).max().unwrap_or(0);
    (0..len)
        .filter_map(|offset| {
            let values: Vec<Option<u8>> = images.iter().map(|b| b.get(offset).copied()).collect();
            if values.iter().all(|v| *v == Some(0)) {
                return None;
            }
            let owner = layout.field_at(offset);
            Some(ByteRow {
                offset,
                values,
                field: owner.map(|(field, _)| field.name),
                element: owner.and_then(|(field, i)| (field.count > 1).then_some(i)),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rom::layout::NDI_V1;

    fn image() -> Vec<u8> {
        let mut bytes = vec![0u8; NDI_V1.size];
        bytes[..3].copy_from_slice(b"NDI");
        bytes[28] = 4;
        bytes[72..76].copy_from_slice(&12.5f32.to_le_bytes());
        bytes
    }

    #[test]
    fn zero_bytes_are_skipped_and_fields_named() {
        let a = image();
        let rows = compare_images(&NDI_V1, &[&a, &a]);
        let offsets: Vec<usize> = rows.iter().map(|r| r.offset).collect();
        assert_eq!(offsets, vec![0, 1, 2, 28, 74, 75]);
        assert!(rows.iter().all(|r| !r.differs()));
        assert_eq!(rows[0].label(), "magic[0]");
        assert_eq!(rows[3].label(), "marker_count");
        assert_eq!(rows[4].label(), "markers[0]");
        assert_eq!(rows[4].values, vec![Some(0x48), Some(0x48)]);
    }

    #[test]
    fn differing_bytes_are_marked() {
        let a = image();
        let mut b = image();
        b[28] = 0;
        b[654] = 7;
        let rows = compare_images(&NDI_V1, &[&a, &b]);

        let count = rows.iter().find(|r| r.offset == 28).unwrap();
        assert!(count.differs());
        assert_eq!(count.values, vec![Some(4), Some(0)]);

        let reserved = rows.iter().find(|r| r.offset == 654).unwrap();
        assert_eq!(reserved.label(), "reserved");
        assert!(reserved.to_string().starts_with("*  654 reserved"), "{reserved}");
    }

    #[test]
    fn shorter_image_reads_as_missing() {
        let a = image();
        let rows = compare_images(&NDI_V1, &[&a, &a[..100]]);
        let tail: Vec<&ByteRow> = rows.iter().filter(|r| r.offset >= 100).collect();
        assert_eq!(tail.len(), NDI_V1.size - 100);
        assert!(tail.iter().all(|r| r.differs() && r.values[1].is_none()));
        assert!(tail[0].to_string().ends_with("-      "), "{}", tail[0]);
    }

    #[test]
    fn display_shows_decimal_hex_and_ascii() {
        let a = image();
        let rows = compare_images(&NDI_V1, &[&a]);
        assert_eq!(rows[0].to_string(), format!("     0 {:<16}  78 4e N", "magic[0]"));
    }
}
