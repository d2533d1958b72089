use crate::ToolError;
use log::warn;
use serde::{Deserialize, Serialize};
use tooldef_core::{renormalize, NormalizeParams, ReferenceFrameConvention, ToolFormat};
use tooldef_formats::{codec_for, codec_with_options, ConversionWarning, RomOptions, ToolFile};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Options for [`convert`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertOptions {
    /// Re-normalise into this frame when the source declares a different one
    /// (or none). `None` keeps the geometry as authored.
    pub target_convention: Option<ReferenceFrameConvention>,
    /// Thresholds used when re-normalising; `convention` is overridden by
    /// `target_convention`.
    pub normalize: NormalizeParams,
    /// Header defaults for ROM output without a ROM source.
    pub rom: RomOptions,
}

/// Translate a tool definition between formats.
///
/// Coordinates are carried over unchanged unless re-normalisation is
/// requested; that case is recorded as the first warning of the result.
#[cfg_attr(
    feature = "tracing",
    instrument(
        level = "info",
        skip(input, options),
        fields(len = input.len(), from = %input_format, to = %output_format)
    )
)]
pub fn convert(
    input: &[u8],
    input_format: ToolFormat,
    output_format: ToolFormat,
    options: &ConvertOptions,
) -> Result<ToolFile, ToolError> {
    let geometry = codec_for(input_format).parse(input)?;

    let mut changed = None;
    let geometry = match options.target_convention {
        Some(target) if geometry.convention != Some(target) => {
            let params = NormalizeParams {
                convention: target,
                ..options.normalize.clone()
            };
            let normalized = renormalize(&geometry, &params)?;
            let from = geometry
                .convention
                .map_or("unspecified", ReferenceFrameConvention::as_str);
            let reason = format!("re-normalised from {from} to {target} frame");
            warn!("{reason}");
            changed = Some(ConversionWarning::GeometryChanged { reason });
            normalized.geometry
        }
        _ => geometry,
    };

    let mut file = codec_with_options(output_format, &options.rom).serialize(&geometry)?;
    if let Some(warning) = changed {
        file.warnings.insert(0, warning);
    }
    Ok(file)
}
