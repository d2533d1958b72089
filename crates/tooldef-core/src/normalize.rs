//! Rigid-body normalisation: canonical tool frame, marker ordering and
//! rigidity validation.
//!
//! Marker ids are assigned by ascending distance from the marker centroid.
//! Distances within `tie_tolerance` of each other are tied and fall back to
//! the sum of distances to all other markers, then to the input order. Both
//! keys are invariant under rigid motion, so two captures of the same tool in
//! different tracker poses yield the same numbering.
//!
//! With `align_axes` the local frame is fixed by the markers themselves:
//! - origin: centroid, or marker 0 for [`ReferenceFrameConvention::MarkerZero`];
//! - x axis: towards the highest-id marker (the one farthest from the centroid);
//! - y axis: towards the first marker, in id order, that is off the x axis;
//! - z axis: `x × y`.

use crate::error::{Degeneracy, GeometryError, MIN_MARKERS};
use crate::geometry::{fingerprint, Marker, ToolGeometry};
use crate::types::{MarkerEstimate, Point3D, ReferenceFrameConvention};
use log::{debug, info, warn};
use nalgebra::{Matrix3, Rotation3, Vector3};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Parameters of the rigid-body normaliser.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizeParams {
    /// Where the tool-local origin is placed.
    pub convention: ReferenceFrameConvention,
    /// Rotate into the marker-defined axes. When off, only the origin moves.
    pub align_axes: bool,
    /// Markers closer than this are treated as one (coincident) marker.
    pub min_separation: f64,
    /// A marker set whose every marker lies within this distance of one
    /// line is collinear.
    pub collinearity_tolerance: f64,
    /// Distance keys closer than this are considered tied when ordering.
    pub tie_tolerance: f64,
    /// Segments whose lengths differ by less than this make the fingerprint
    /// ambiguous (reported, not rejected).
    pub fingerprint_tolerance: f64,
}

impl Default for NormalizeParams {
    fn default() -> Self {
        Self {
            convention: ReferenceFrameConvention::Centroid,
            align_axes: true,
            min_separation: 1.0,
            collinearity_tolerance: 0.5,
            tie_tolerance: 1e-6,
            fingerprint_tolerance: 0.5,
        }
    }
}

/// Rigid transform from capture (tracker) coordinates into the tool frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ToolFrame {
    pub origin: Point3D,
    pub rotation: Rotation3<f64>,
}

impl ToolFrame {
    #[inline]
    pub fn to_local(&self, p: &Point3D) -> Point3D {
        Point3D::from(self.rotation * (p - self.origin))
    }

    #[inline]
    pub fn rotate(&self, v: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * v
    }
}

/// Outcome of the rigidity checks.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RigidityReport {
    /// Indices (into the checked slice) of the closest marker pair.
    pub closest_pair: (usize, usize),
    pub min_separation: f64,
    /// Largest distance of any marker from the line through the farthest pair.
    pub line_offset: f64,
    /// Sorted pairwise distances.
    pub fingerprint: Vec<f64>,
    /// Adjacent fingerprint entries closer than `fingerprint_tolerance`.
    pub ambiguous_segments: usize,
}

/// A normalised geometry plus how it was obtained.
#[derive(Clone, Debug)]
pub struct NormalizedGeometry {
    pub geometry: ToolGeometry,
    pub frame: ToolFrame,
    /// `order[new_id] = source index`.
    pub order: Vec<usize>,
    pub report: RigidityReport,
}

/// Check marker count, finiteness, separation and collinearity of `points`.
pub fn check_rigidity(
    points: &[Point3D],
    params: &NormalizeParams,
) -> Result<RigidityReport, GeometryError> {
    if points.len() < MIN_MARKERS {
        return Err(GeometryError::Incomplete {
            expected: MIN_MARKERS,
            found: points.len(),
        });
    }
    if let Some(index) = points.iter().position(|p| !p.iter().all(|v| v.is_finite())) {
        return Err(GeometryError::NonFinite { index });
    }

    let mut closest = (0usize, 1usize, f64::INFINITY);
    let mut farthest = (0usize, 1usize, f64::NEG_INFINITY);
    for (i, a) in points.iter().enumerate() {
        for (j, b) in points.iter().enumerate().skip(i + 1) {
            let d = nalgebra::distance(a, b);
            if d < closest.2 {
                closest = (i, j, d);
            }
            if d > farthest.2 {
                farthest = (i, j, d);
            }
        }
    }

    if closest.2 < params.min_separation {
        return Err(Degeneracy::Coincident {
            a: closest.0,
            b: closest.1,
            distance: closest.2,
            min_separation: params.min_separation,
        }
        .into());
    }

    let anchor = points[farthest.0];
    let dir = (points[farthest.1] - anchor) / farthest.2;
    let line_offset = points
        .iter()
        .map(|p| perpendicular(&(p - anchor), &dir).norm())
        .fold(0.0f64, f64::max);
    if line_offset < params.collinearity_tolerance {
        return Err(Degeneracy::Collinear {
            count: points.len(),
            max_offset: line_offset,
            tolerance: params.collinearity_tolerance,
        }
        .into());
    }

    let fingerprint = fingerprint(points);
    let ambiguous_segments = fingerprint
        .windows(2)
        .filter(|w| w[1] - w[0] < params.fingerprint_tolerance)
        .count();
    if ambiguous_segments > 0 {
        warn!(
            "{ambiguous_segments} marker segment pair(s) differ by less than {}; \
             the tracker may confuse marker assignments",
            params.fingerprint_tolerance
        );
    }

    Ok(RigidityReport {
        closest_pair: (closest.0, closest.1),
        min_separation: closest.2,
        line_offset,
        fingerprint,
        ambiguous_segments,
    })
}

/// Deterministic marker order; `result[new_id] = source index`.
///
/// Keys are compared by value: neighbours in sorted order that differ by at
/// most `tie_tolerance` form one tied run.
pub fn canonical_order(points: &[Point3D], params: &NormalizeParams) -> Vec<usize> {
    let centroid = centroid(points);
    let keys: Vec<(f64, f64)> = points
        .iter()
        .map(|p| {
            let radial = nalgebra::distance(p, &centroid);
            let spread: f64 = points.iter().map(|q| nalgebra::distance(p, q)).sum();
            (radial, spread)
        })
        .collect();
    let tolerance = params.tie_tolerance.max(0.0);

    let mut by_radial: Vec<usize> = (0..points.len()).collect();
    by_radial.sort_by(|&a, &b| keys[a].0.total_cmp(&keys[b].0).then(a.cmp(&b)));

    let mut order = Vec::with_capacity(points.len());
    for run in tied_runs(&by_radial, |i| keys[i].0, tolerance) {
        let mut by_spread = run.to_vec();
        by_spread.sort_by(|&a, &b| keys[a].1.total_cmp(&keys[b].1).then(a.cmp(&b)));
        for tied in tied_runs(&by_spread, |i| keys[i].1, tolerance) {
            let mut tied = tied.to_vec();
            tied.sort_unstable();
            order.extend(tied);
        }
    }
    order
}

/// Splits `sorted` wherever consecutive keys differ by more than `tolerance`.
fn tied_runs(sorted: &[usize], key: impl Fn(usize) -> f64, tolerance: f64) -> Vec<&[usize]> {
    let mut runs = Vec::new();
    let mut start = 0;
    for i in 1..=sorted.len() {
        if i == sorted.len() || key(sorted[i]) - key(sorted[i - 1]) > tolerance {
            runs.push(&sorted[start..i]);
            start = i;
        }
    }
    runs
}

/// Tool frame for `points` visited in `order`.
pub fn canonical_frame(
    points: &[Point3D],
    order: &[usize],
    params: &NormalizeParams,
) -> Result<ToolFrame, GeometryError> {
    let origin = match params.convention {
        ReferenceFrameConvention::Centroid => centroid(points),
        ReferenceFrameConvention::MarkerZero => points[order[0]],
    };
    if !params.align_axes {
        return Ok(ToolFrame {
            origin,
            rotation: Rotation3::identity(),
        });
    }

    let collinear = |max_offset: f64| -> GeometryError {
        Degeneracy::Collinear {
            count: points.len(),
            max_offset,
            tolerance: params.collinearity_tolerance,
        }
        .into()
    };

    let x_index = order[order.len() - 1];
    let x = (points[x_index] - origin)
        .try_normalize(f64::EPSILON)
        .ok_or_else(|| collinear(0.0))?;

    let mut best_offset = 0.0f64;
    let mut y = None;
    for &i in order {
        if i == x_index {
            continue;
        }
        let perp = perpendicular(&(points[i] - origin), &x);
        let offset = perp.norm();
        if offset > params.collinearity_tolerance {
            y = Some(perp / offset);
            break;
        }
        best_offset = best_offset.max(offset);
    }
    let y = y.ok_or_else(|| collinear(best_offset))?;
    let z = x.cross(&y);

    let basis = Matrix3::from_rows(&[x.transpose(), y.transpose(), z.transpose()]);
    Ok(ToolFrame {
        origin,
        rotation: Rotation3::from_matrix_unchecked(basis),
    })
}

/// Normalise averaged capture markers into a tool geometry.
///
/// The returned geometry has an empty name; callers fill it in.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip_all, fields(markers = markers.len()))
)]
pub fn normalize(
    markers: &[MarkerEstimate],
    params: &NormalizeParams,
) -> Result<NormalizedGeometry, GeometryError> {
    let points: Vec<Point3D> = markers.iter().map(|m| m.position).collect();
    let (frame, order, report) = solve(&points, params)?;

    let markers = order
        .iter()
        .enumerate()
        .map(|(new_id, &src)| Marker::new(new_id as u32, frame.to_local(&points[src])))
        .collect();
    let geometry = ToolGeometry {
        name: String::new(),
        tool_id: None,
        markers,
        pivot: None,
        convention: Some(params.convention),
        opaque: None,
    };
    check_fingerprint(&geometry, &report);

    Ok(NormalizedGeometry {
        geometry,
        frame,
        order,
        report,
    })
}

/// Re-run normalisation on an existing geometry.
///
/// Marker metadata and per-marker opaque fields follow their markers, normals
/// are rotated and the pivot is carried into the new frame.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip_all, fields(markers = geometry.markers.len()))
)]
pub fn renormalize(
    geometry: &ToolGeometry,
    params: &NormalizeParams,
) -> Result<NormalizedGeometry, GeometryError> {
    let points = geometry.positions();
    let (frame, order, report) = solve(&points, params)?;

    let markers = order
        .iter()
        .enumerate()
        .map(|(new_id, &src)| {
            let source = &geometry.markers[src];
            let mut metadata = source.metadata.clone();
            metadata.normal = metadata.normal.map(|n| frame.rotate(&n));
            Marker {
                marker_id: new_id as u32,
                position: frame.to_local(&source.position),
                metadata,
            }
        })
        .collect();

    let opaque = geometry.opaque.clone().map(|mut opaque| {
        let mut permuted = Vec::with_capacity(order.len());
        for &src in &order {
            permuted.push(opaque.markers.get(src).cloned().unwrap_or_default());
        }
        while permuted.last().is_some_and(|m| m.is_empty()) {
            permuted.pop();
        }
        opaque.markers = permuted;
        opaque
    });

    let out = ToolGeometry {
        name: geometry.name.clone(),
        tool_id: geometry.tool_id,
        markers,
        pivot: geometry.pivot.map(|p| frame.to_local(&p)),
        convention: Some(params.convention),
        opaque,
    };
    check_fingerprint(&out, &report);

    Ok(NormalizedGeometry {
        geometry: out,
        frame,
        order,
        report,
    })
}

fn solve(
    points: &[Point3D],
    params: &NormalizeParams,
) -> Result<(ToolFrame, Vec<usize>, RigidityReport), GeometryError> {
    let report = check_rigidity(points, params)?;
    let order = canonical_order(points, params);
    let frame = canonical_frame(points, &order, params)?;
    info!(
        "normalised {} markers (origin {}, min separation {:.3}, line offset {:.3})",
        points.len(),
        params.convention,
        report.min_separation,
        report.line_offset
    );
    debug!("marker order {order:?}");
    Ok((frame, order, report))
}

fn check_fingerprint(geometry: &ToolGeometry, report: &RigidityReport) {
    let after = geometry.fingerprint();
    let drift = after
        .iter()
        .zip(&report.fingerprint)
        .map(|(a, b)| (a - b).abs())
        .fold(0.0f64, f64::max);
    if drift > 1e-6 {
        warn!("fingerprint drifted by {drift:e} during normalisation");
    }
}

fn centroid(points: &[Point3D]) -> Point3D {
    let sum = points
        .iter()
        .fold(Vector3::zeros(), |acc: Vector3<f64>, p| acc + p.coords);
    Point3D::from(sum / points.len() as f64)
}

#[inline]
fn perpendicular(v: &Vector3<f64>, unit_dir: &Vector3<f64>) -> Vector3<f64> {
    v - unit_dir * v.dot(unit_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Isometry3, Translation3, UnitQuaternion};

    fn estimates(points: &[[f64; 3]]) -> Vec<MarkerEstimate> {
        points
            .iter()
            .enumerate()
            .map(|(id, p)| MarkerEstimate {
                id,
                position: Point3D::new(p[0], p[1], p[2]),
                sample_count: 10,
                spread: 0.01,
            })
            .collect()
    }

    fn probe() -> Vec<[f64; 3]> {
        vec![
            [0.0, 0.0, 0.0],
            [0.0, 50.0, 0.0],
            [25.0, 100.0, 0.0],
            [-25.0, 135.0, 0.0],
        ]
    }

    #[test]
    fn collinear_markers_are_rejected() {
        let markers = estimates(&[[0.0, 0.0, 0.0], [10.0, 0.0, 0.0], [20.0, 0.0, 0.0]]);
        let err = normalize(&markers, &NormalizeParams::default()).unwrap_err();
        assert!(matches!(
            err,
            GeometryError::Degenerate(Degeneracy::Collinear { count: 3, .. })
        ));
    }

    #[test]
    fn coincident_markers_are_rejected() {
        let markers = estimates(&[[0.0, 0.0, 0.0], [0.2, 0.0, 0.0], [0.0, 30.0, 0.0]]);
        let err = normalize(&markers, &NormalizeParams::default()).unwrap_err();
        assert!(matches!(
            err,
            GeometryError::Degenerate(Degeneracy::Coincident { a: 0, b: 1, .. })
        ));
    }

    #[test]
    fn two_markers_are_incomplete() {
        let markers = estimates(&[[0.0, 0.0, 0.0], [10.0, 0.0, 0.0]]);
        assert_eq!(
            normalize(&markers, &NormalizeParams::default()).unwrap_err(),
            GeometryError::Incomplete {
                expected: 3,
                found: 2
            }
        );
    }

    #[test]
    fn centroid_convention_puts_origin_at_centroid() {
        let out = normalize(&estimates(&probe()), &NormalizeParams::default()).unwrap();
        let sum = out
            .geometry
            .markers
            .iter()
            .fold(Vector3::zeros(), |acc: Vector3<f64>, m| acc + m.position.coords);
        assert_relative_eq!(sum.norm(), 0.0, epsilon = 1e-9);

        let last = out.geometry.markers.last().unwrap().position;
        assert_relative_eq!(last.y, 0.0, epsilon = 1e-9);
        assert_relative_eq!(last.z, 0.0, epsilon = 1e-9);
        assert!(last.x > 0.0);

        // planar tool: everything ends up in the local xy plane
        for m in &out.geometry.markers {
            assert_relative_eq!(m.position.z, 0.0, epsilon = 1e-9);
        }
        let ids: Vec<u32> = out.geometry.markers.iter().map(|m| m.marker_id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3]);
    }

    #[test]
    fn marker_zero_convention_puts_first_marker_at_origin() {
        let params = NormalizeParams {
            convention: ReferenceFrameConvention::MarkerZero,
            ..NormalizeParams::default()
        };
        let out = normalize(&estimates(&probe()), &params).unwrap();
        assert_relative_eq!(out.geometry.markers[0].position.coords.norm(), 0.0);
        assert_eq!(
            out.geometry.convention,
            Some(ReferenceFrameConvention::MarkerZero)
        );
    }

    #[test]
    fn output_is_invariant_under_rigid_motion() {
        let params = NormalizeParams::default();
        let base = normalize(&estimates(&probe()), &params).unwrap();

        let motion = Isometry3::from_parts(
            Translation3::new(120.0, -40.0, -1500.0),
            UnitQuaternion::from_euler_angles(0.3, -1.1, 2.4),
        );
        // shuffle the capture order as well
        let moved: Vec<[f64; 3]> = [3usize, 1, 0, 2]
            .iter()
            .map(|&i| {
                let p = probe()[i];
                let q = motion * Point3D::new(p[0], p[1], p[2]);
                [q.x, q.y, q.z]
            })
            .collect();
        let other = normalize(&estimates(&moved), &params).unwrap();

        for (a, b) in base.geometry.markers.iter().zip(&other.geometry.markers) {
            assert_relative_eq!(a.position, b.position, epsilon = 1e-9);
        }
        let mapped: Vec<usize> = other.order.iter().map(|&k| [3usize, 1, 0, 2][k]).collect();
        assert_eq!(mapped, base.order);
    }

    #[test]
    fn fingerprint_survives_normalisation() {
        let out = normalize(&estimates(&probe()), &NormalizeParams::default()).unwrap();
        let after = out.geometry.fingerprint();
        for (a, b) in after.iter().zip(&out.report.fingerprint) {
            assert_relative_eq!(a, b, epsilon = 1e-9);
        }
    }

    #[test]
    fn renormalize_carries_metadata_and_pivot() {
        let mut geometry = ToolGeometry::from_positions(
            "probe",
            &probe()
                .iter()
                .map(|p| Point3D::new(p[0], p[1], p[2]))
                .collect::<Vec<_>>(),
        );
        geometry.pivot = Some(Point3D::new(0.0, -100.0, 0.0));
        for (i, m) in geometry.markers.iter_mut().enumerate() {
            m.metadata.face = Some(i as u8 + 1);
            m.metadata.normal = Some(Vector3::z());
        }

        let out = renormalize(&geometry, &NormalizeParams::default()).unwrap();
        for (new_id, &src) in out.order.iter().enumerate() {
            let m = &out.geometry.markers[new_id];
            assert_eq!(m.metadata.face, Some(src as u8 + 1));
            let n = m.metadata.normal.unwrap();
            assert_relative_eq!(n.norm(), 1.0, epsilon = 1e-12);
        }

        // pivot keeps its distance to every marker
        let pivot = out.geometry.pivot.unwrap();
        for (new_id, &src) in out.order.iter().enumerate() {
            let before =
                nalgebra::distance(&geometry.markers[src].position, &geometry.pivot.unwrap());
            let after = nalgebra::distance(&out.geometry.markers[new_id].position, &pivot);
            assert_relative_eq!(before, after, epsilon = 1e-9);
        }
        assert_eq!(out.geometry.name, "probe");
    }

    #[test]
    fn square_ties_resolve_by_input_order() {
        let square = estimates(&[
            [0.0, 0.0, 0.0],
            [40.0, 0.0, 0.0],
            [40.0, 40.0, 0.0],
            [0.0, 40.0, 0.0],
        ]);
        let out = normalize(&square, &NormalizeParams::default()).unwrap();
        assert_eq!(out.order, vec![0, 1, 2, 3]);
    }

    #[test]
    fn near_equal_distances_tie_across_rounding_boundaries() {
        // Radii straddle a half-tolerance boundary by a few ulps.
        let hi = 1000.000_000_5 + 2e-12;
        let lo = 1000.000_000_5 - 2e-12;
        let cross = [
            Point3D::new(hi, 0.0, 0.0),
            Point3D::new(-hi, 0.0, 0.0),
            Point3D::new(0.0, lo, 0.0),
            Point3D::new(0.0, -lo, 0.0),
        ];
        let params = NormalizeParams::default();
        assert_eq!(canonical_order(&cross, &params), vec![0, 1, 2, 3]);

        let shifted: Vec<Point3D> = cross
            .iter()
            .map(|p| p + Vector3::new(3.25, -7.5, 11.0))
            .collect();
        assert_eq!(canonical_order(&shifted, &params), vec![0, 1, 2, 3]);
    }

    #[test]
    fn distinct_radii_still_order_by_distance() {
        let points = [
            Point3D::new(30.0, 0.0, 0.0),
            Point3D::new(-10.0, 0.0, 0.0),
            Point3D::new(-10.0, 20.0, 0.0),
            Point3D::new(-10.0, -20.0, 0.0),
        ];
        let order = canonical_order(&points, &NormalizeParams::default());
        assert_eq!(order[0], 1);
        assert_eq!(order[3], 0);
        assert_eq!(&order[1..3], &[2, 3]);
    }
}
