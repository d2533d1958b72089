use std::path::PathBuf;
use tooldef_capture::CaptureError;
use tooldef_core::GeometryError;
use tooldef_formats::FormatError;

/// Errors produced by the build and convert pipelines.
#[derive(thiserror::Error, Debug)]
pub enum ToolError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Geometry(#[from] GeometryError),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("cannot infer a tool format from {} (expected .ini, .json or .rom)", .0.display())]
    UnsupportedFormat(PathBuf),
}

impl ToolError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn json(path: impl Into<PathBuf>, source: serde_json::Error) -> Self {
        Self::Json {
            path: path.into(),
            source,
        }
    }
}
