//! Correspondence and averaging of stray-marker snapshots.
//!
//! Input: a finite sequence of [`Frame`]s captured while a single tool sits
//! still in front of the tracker. Output: one [`MarkerEstimate`] per physical
//! marker, plus per-cluster diagnostics.
//!
//! Marker identity across frames is never taken from input order. Points are
//! grouped by proximity (see [`reduce`]) and each group is reduced to the mean
//! of its consistent samples.
//!
//! ```
//! use tooldef_capture::{reduce, CaptureParams};
//! use tooldef_core::{Frame, Point3D};
//!
//! let frame = Frame::new(vec![
//!     Point3D::new(0.0, 0.0, -1000.0),
//!     Point3D::new(50.0, 0.0, -1000.0),
//!     Point3D::new(0.0, 80.0, -1000.0),
//! ]);
//! let frames = vec![frame; 20];
//! let out = reduce(&frames, Some(3), &CaptureParams::default()).unwrap();
//! assert_eq!(out.markers.len(), 3);
//! ```
//!
//! [`Frame`]: tooldef_core::Frame
//! [`MarkerEstimate`]: tooldef_core::MarkerEstimate

mod cluster;
mod error;
mod params;
mod reduce;
mod result;

pub use error::CaptureError;
pub use params::{CaptureParams, SpreadMetric};
pub use reduce::reduce;
pub use result::{ClusterDiagnostic, ClusterVerdict, ReduceDiagnostics, Reduction};
