//! Core types and rigid-body normalisation for optical tracker tool definitions.
//!
//! This crate is format-agnostic: it knows what a tool geometry *is*, not how
//! any particular tracker stores it. Capture reduction lives in
//! `tooldef-capture`, file codecs in `tooldef-formats`.

mod error;
mod geometry;
mod logger;
mod normalize;
mod round;
mod types;

pub use error::{Degeneracy, GeometryError, MIN_MARKERS};
pub use geometry::{fingerprint, Marker, MarkerMetadata, OpaqueMetadata, ToolGeometry};
pub use normalize::{
    canonical_frame, canonical_order, check_rigidity, normalize, renormalize, NormalizeParams,
    NormalizedGeometry, RigidityReport, ToolFrame,
};
pub use round::round_half_even;
pub use types::{
    Frame, MarkerEstimate, Point3D, ReferenceFrameConvention, ToolFormat, UnknownFormat,
};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{init_with_level, level_for_verbosity};
