use tooldef_core::{GeometryError, ToolFormat};

/// Errors raised while parsing or encoding a tool definition file.
#[derive(thiserror::Error, Debug)]
pub enum FormatError {
    #[error("malformed {format} file: {reason}")]
    MalformedFile { format: ToolFormat, reason: String },
    #[error("truncated {format} file: expected {expected} bytes, found {found}")]
    TruncatedFile {
        format: ToolFormat,
        expected: usize,
        found: usize,
    },
    #[error("checksum mismatch: stored {stored:#06x}, computed {computed:#06x}")]
    Checksum { stored: u16, computed: u16 },
    #[error("{format} cannot store {field}: {reason}")]
    UnsupportedField {
        format: ToolFormat,
        field: String,
        reason: String,
    },
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

impl FormatError {
    pub(crate) fn malformed(format: ToolFormat, reason: impl Into<String>) -> Self {
        Self::MalformedFile {
            format,
            reason: reason.into(),
        }
    }

    pub(crate) fn unsupported(
        format: ToolFormat,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::UnsupportedField {
            format,
            field: field.into(),
            reason: reason.into(),
        }
    }
}
