//! Codecs between [`ToolGeometry`] and the tool definition files trackers load.
//!
//! | format | file | origin |
//! |--------|------|--------|
//! | `ini`  | text, `[geometry]` + `[fiducialN]` sections | Atracsys |
//! | `json` | text, `fiducials` array | SAW / cisst |
//! | `rom`  | 752-byte little-endian binary | NDI Polaris |
//!
//! Every codec validates the geometry before encoding. Fields the destination
//! cannot store are dropped with a [`ConversionWarning`]; fields the source did
//! not carry receive documented defaults.
//!
//! ```
//! use tooldef_core::{Point3D, ToolFormat, ToolGeometry};
//! use tooldef_formats::codec_for;
//!
//! let geometry = ToolGeometry::from_positions(
//!     "probe",
//!     &[
//!         Point3D::new(0.0, 0.0, 0.0),
//!         Point3D::new(50.0, 0.0, 0.0),
//!         Point3D::new(0.0, 30.0, 0.0),
//!     ],
//! );
//! let ini = codec_for(ToolFormat::Ini).serialize(&geometry).unwrap();
//! let back = codec_for(ToolFormat::Ini).parse(&ini.bytes).unwrap();
//! assert_eq!(back, geometry);
//! ```

mod error;
mod ini;
mod json;
mod rom;
mod warning;

pub use error::FormatError;
pub use ini::IniCodec;
pub use json::JsonCodec;
pub use rom::{
    compare_images, ByteRow, FieldKind, MarkerKind, RomCodec, RomDate, RomExtras, RomField,
    RomLayout, RomOptions, NDI_V1,
};
pub use warning::ConversionWarning;

use serde::{Deserialize, Serialize};
use tooldef_core::{ToolFormat, ToolGeometry};

/// An encoded tool definition, ready to be written to disk.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolFile {
    pub format: ToolFormat,
    pub bytes: Vec<u8>,
    /// Losses recorded while encoding, in the order they occurred.
    pub warnings: Vec<ConversionWarning>,
}

/// One tool definition file format.
pub trait ToolCodec {
    fn format(&self) -> ToolFormat;

    /// Decode a complete file.
    fn parse(&self, bytes: &[u8]) -> Result<ToolGeometry, FormatError>;

    /// Encode `geometry`, recording every loss in [`ToolFile::warnings`].
    fn serialize(&self, geometry: &ToolGeometry) -> Result<ToolFile, FormatError>;
}

/// Codec for `format` with default options.
pub fn codec_for(format: ToolFormat) -> Box<dyn ToolCodec> {
    codec_with_options(format, &RomOptions::default())
}

/// Codec for `format`; `rom` only affects the ROM codec.
pub fn codec_with_options(format: ToolFormat, rom: &RomOptions) -> Box<dyn ToolCodec> {
    match format {
        ToolFormat::Ini => Box::new(IniCodec),
        ToolFormat::Json => Box::new(JsonCodec),
        ToolFormat::Rom => Box::new(RomCodec::new(rom.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_for_matches_requested_format() {
        for format in ToolFormat::ALL {
            assert_eq!(codec_for(format).format(), format);
        }
    }
}
