/// Smallest marker count a tracker can pose-estimate as a rigid body.
pub const MIN_MARKERS: usize = 3;

/// Errors raised while validating or normalising a marker geometry.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("geometry incomplete: expected {expected} markers, found {found}")]
    Incomplete { expected: usize, found: usize },
    #[error("degenerate geometry: {0}")]
    Degenerate(#[from] Degeneracy),
    #[error("marker {index} has a non-finite coordinate")]
    NonFinite { index: usize },
}

/// Why a marker set cannot be tracked unambiguously.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum Degeneracy {
    #[error(
        "markers {a} and {b} are {distance:.4} apart (minimum separation {min_separation})"
    )]
    Coincident {
        a: usize,
        b: usize,
        distance: f64,
        min_separation: f64,
    },
    #[error("all {count} markers lie within {max_offset:.4} of one line (tolerance {tolerance})")]
    Collinear {
        count: usize,
        max_offset: f64,
        tolerance: f64,
    },
}
