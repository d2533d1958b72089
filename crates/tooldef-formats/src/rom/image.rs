//! Field-addressed access to a ROM byte image.

use super::layout::{FieldKind, RomField, RomLayout};
use crate::error::FormatError;
use tooldef_core::ToolFormat;

const FORMAT: ToolFormat = ToolFormat::Rom;

/// Wrapping 16-bit sum of `bytes`.
pub(crate) fn checksum(bytes: &[u8]) -> u16 {
    bytes
        .iter()
        .fold(0u16, |acc, &b| acc.wrapping_add(u16::from(b)))
}

fn element(field: &RomField, index: usize) -> Result<std::ops::Range<usize>, FormatError> {
    field.element(index).ok_or_else(|| {
        FormatError::unsupported(
            FORMAT,
            field.name,
            format!("element {index} is beyond the {} slots of the layout", field.count),
        )
    })
}

fn kind_mismatch(field: &RomField, wanted: FieldKind) -> FormatError {
    FormatError::unsupported(
        FORMAT,
        field.name,
        format!("layout stores {:?}, accessed as {wanted:?}", field.kind),
    )
}

/// Read-only view over one image. Every access is bounds-checked against
/// the buffer, so a short buffer yields `TruncatedFile` instead of a panic.
pub(crate) struct RomReader<'a> {
    layout: &'static RomLayout,
    bytes: &'a [u8],
}

impl<'a> RomReader<'a> {
    pub fn new(layout: &'static RomLayout, bytes: &'a [u8]) -> Self {
        Self { layout, bytes }
    }

    fn get(&self, range: std::ops::Range<usize>) -> Result<&'a [u8], FormatError> {
        let found = self.bytes.len();
        self.bytes
            .get(range.clone())
            .ok_or(FormatError::TruncatedFile {
                format: FORMAT,
                expected: range.end.max(self.layout.size),
                found,
            })
    }

    fn scalar<const N: usize>(
        &self,
        name: &str,
        index: usize,
        kind: FieldKind,
    ) -> Result<[u8; N], FormatError> {
        let field = self.layout.field(name)?;
        if field.kind != kind {
            return Err(kind_mismatch(field, kind));
        }
        let slice = self.get(element(field, index)?)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    pub fn u8(&self, name: &str, index: usize) -> Result<u8, FormatError> {
        Ok(self.scalar::<1>(name, index, FieldKind::U8)?[0])
    }

    pub fn u16(&self, name: &str) -> Result<u16, FormatError> {
        Ok(u16::from_le_bytes(self.scalar(name, 0, FieldKind::U16)?))
    }

    pub fn f32(&self, name: &str, index: usize) -> Result<f32, FormatError> {
        Ok(f32::from_le_bytes(self.scalar(name, index, FieldKind::F32)?))
    }

    /// The whole field as bytes.
    pub fn raw(&self, name: &str) -> Result<&'a [u8], FormatError> {
        self.get(self.layout.field(name)?.range())
    }

    pub fn array<const N: usize>(&self, name: &str) -> Result<[u8; N], FormatError> {
        let raw = self.raw(name)?;
        raw.try_into().map_err(|_| {
            FormatError::unsupported(
                FORMAT,
                name,
                format!("expected {N} bytes, layout has {}", raw.len()),
            )
        })
    }

    /// NUL-terminated ASCII text.
    pub fn ascii(&self, name: &str) -> Result<String, FormatError> {
        let raw = self.raw(name)?;
        let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        let text = &raw[..end];
        if !text.is_ascii() {
            return Err(FormatError::malformed(
                FORMAT,
                format!("{name} is not ASCII text"),
            ));
        }
        if raw[end..].iter().any(|&b| b != 0) {
            log::warn!("{name}: ignoring bytes after the terminating NUL");
        }
        Ok(text.iter().map(|&b| b as char).collect())
    }
}

/// Zero-initialised image under construction.
pub(crate) struct RomWriter {
    layout: &'static RomLayout,
    bytes: Vec<u8>,
}

impl RomWriter {
    pub fn new(layout: &'static RomLayout) -> Self {
        Self {
            layout,
            bytes: vec![0; layout.size],
        }
    }

    fn put(
        &mut self,
        name: &str,
        index: usize,
        kind: FieldKind,
        value: &[u8],
    ) -> Result<(), FormatError> {
        let field = self.layout.field(name)?;
        if field.kind != kind {
            return Err(kind_mismatch(field, kind));
        }
        let range = element(field, index)?;
        self.bytes[range].copy_from_slice(value);
        Ok(())
    }

    pub fn set_u8(&mut self, name: &str, index: usize, value: u8) -> Result<(), FormatError> {
        self.put(name, index, FieldKind::U8, &[value])
    }

    pub fn set_u16(&mut self, name: &str, value: u16) -> Result<(), FormatError> {
        self.put(name, 0, FieldKind::U16, &value.to_le_bytes())
    }

    pub fn set_f32(&mut self, name: &str, index: usize, value: f32) -> Result<(), FormatError> {
        self.put(name, index, FieldKind::F32, &value.to_le_bytes())
    }

    /// Copy `value` into the start of the field; the rest stays zero.
    pub fn set_raw(&mut self, name: &str, value: &[u8]) -> Result<(), FormatError> {
        let field = self.layout.field(name)?;
        if value.len() > field.byte_len() {
            return Err(FormatError::unsupported(
                FORMAT,
                name,
                format!("{} bytes do not fit in {}", value.len(), field.byte_len()),
            ));
        }
        self.bytes[field.offset..field.offset + value.len()].copy_from_slice(value);
        Ok(())
    }

    /// NUL-padded ASCII; `field` names the geometry field for errors.
    pub fn set_ascii(&mut self, name: &str, field: &str, value: &str) -> Result<(), FormatError> {
        let capacity = self.layout.field(name)?.byte_len();
        if !value.is_ascii() || value.contains('\0') {
            return Err(FormatError::unsupported(
                FORMAT,
                field,
                format!("`{value}` is not plain ASCII"),
            ));
        }
        if value.len() > capacity {
            return Err(FormatError::unsupported(
                FORMAT,
                field,
                format!("`{value}` is longer than {capacity} characters"),
            ));
        }
        self.set_raw(name, value.as_bytes())
    }

    /// Set a byte outside every named field.
    pub fn set_reserved(&mut self, offset: usize, value: u8) -> bool {
        match self.bytes.get_mut(offset) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Fill in the checksum and return the image.
    pub fn finish(mut self) -> Result<Vec<u8>, FormatError> {
        let sum = checksum(&self.bytes[self.layout.checksum_start..]);
        self.set_u16("checksum", sum)?;
        Ok(self.bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rom::layout::NDI_V1;

    #[test]
    fn checksum_wraps() {
        assert_eq!(checksum(&[0xff; 300]), (300u32 * 255 % 65_536) as u16);
    }

    #[test]
    fn writer_and_reader_agree() {
        let mut w = RomWriter::new(&NDI_V1);
        w.set_raw("magic", b"NDI").unwrap();
        w.set_u16("revision", 0x1234).unwrap();
        w.set_f32("markers", 59, -1.25).unwrap();
        w.set_ascii("part_number", "name", "probe").unwrap();
        let bytes = w.finish().unwrap();
        assert_eq!(&bytes[16..18], &[0x34, 0x12]);

        let r = RomReader::new(&NDI_V1, &bytes);
        assert_eq!(r.raw("magic").unwrap(), b"NDI");
        assert_eq!(r.u16("revision").unwrap(), 0x1234);
        assert_eq!(r.f32("markers", 59).unwrap(), -1.25);
        assert_eq!(r.ascii("part_number").unwrap(), "probe");
        assert_eq!(r.u16("checksum").unwrap(), checksum(&bytes[6..]));
    }

    #[test]
    fn kind_and_slot_are_checked() {
        let mut w = RomWriter::new(&NDI_V1);
        assert!(w.set_u8("revision", 0, 1).is_err());
        assert!(w.set_u8("faces", 20, 1).is_err());
        assert!(w.set_ascii("part_number", "name", "twenty-one characters").is_err());
        assert!(w.set_ascii("part_number", "name", "sonde\u{e9}").is_err());
    }

    #[test]
    fn reader_never_reads_past_the_buffer() {
        let short = [0u8; 100];
        let r = RomReader::new(&NDI_V1, &short);
        assert!(matches!(
            r.f32("normals", 0),
            Err(FormatError::TruncatedFile { found: 100, .. })
        ));
    }
}
