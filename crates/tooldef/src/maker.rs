use crate::{MakeConfig, ToolError};
use log::info;
use serde::Serialize;
use tooldef_capture::{reduce, ReduceDiagnostics, Reduction};
use tooldef_core::{normalize, Frame, MarkerEstimate, RigidityReport, ToolFormat, ToolGeometry};
use tooldef_formats::{codec_with_options, ConversionWarning, ToolFile};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Everything produced by one [`build`].
#[derive(Clone, Debug)]
pub struct ToolBuild {
    pub file: ToolFile,
    /// The geometry that was encoded into `file`.
    pub geometry: ToolGeometry,
    pub reduction: Reduction,
    pub rigidity: RigidityReport,
    /// `order[marker_id]` = index into `reduction.markers`.
    pub order: Vec<usize>,
}

/// Serialisable summary of a build, for `--report`.
#[derive(Clone, Debug, Serialize)]
pub struct BuildReport<'a> {
    pub name: &'a str,
    pub format: ToolFormat,
    /// Capture estimates in final marker id order.
    pub markers: Vec<&'a MarkerEstimate>,
    pub geometry: &'a ToolGeometry,
    pub rigidity: &'a RigidityReport,
    pub capture: &'a ReduceDiagnostics,
    pub warnings: &'a [ConversionWarning],
}

impl ToolBuild {
    pub fn report(&self) -> BuildReport<'_> {
        BuildReport {
            name: &self.geometry.name,
            format: self.file.format,
            markers: self
                .order
                .iter()
                .map(|&src| &self.reduction.markers[src])
                .collect(),
            geometry: &self.geometry,
            rigidity: &self.rigidity,
            capture: &self.reduction.diagnostics,
            warnings: &self.file.warnings,
        }
    }
}

/// Build a tool definition from a static capture: reduce, normalise, encode.
///
/// Nothing is written; pass the returned [`ToolFile`] to
/// [`crate::write_tool_file`]. Any failure aborts before bytes are produced.
#[cfg_attr(
    feature = "tracing",
    instrument(
        level = "info",
        skip(frames, config),
        fields(frames = frames.len(), format = %output_format)
    )
)]
pub fn build(
    frames: &[Frame],
    output_format: ToolFormat,
    tool_name: &str,
    expected_marker_count: Option<usize>,
    config: &MakeConfig,
) -> Result<ToolBuild, ToolError> {
    let reduction = reduce(frames, expected_marker_count, &config.capture)?;
    let normalized = normalize(&reduction.markers, &config.normalize)?;

    let mut geometry = normalized.geometry;
    geometry.name = tool_name.to_string();

    let file = codec_with_options(output_format, &config.rom).serialize(&geometry)?;
    info!(
        "built `{tool_name}`: {} markers from {} frames, {} bytes of {output_format}",
        geometry.markers.len(),
        frames.len(),
        file.bytes.len()
    );

    Ok(ToolBuild {
        file,
        geometry,
        reduction,
        rigidity: normalized.report,
        order: normalized.order,
    })
}
