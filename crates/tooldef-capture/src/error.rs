/// Errors returned by capture reduction.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum CaptureError {
    #[error("capture contains no frames")]
    EmptyCapture,
    #[error("invalid capture parameters: {0}")]
    InvalidParams(&'static str),
    #[error(
        "geometry incomplete: expected {expected} markers, {found} survived ({rejected} clusters rejected)"
    )]
    GeometryIncomplete {
        expected: usize,
        found: usize,
        rejected: usize,
    },
}
