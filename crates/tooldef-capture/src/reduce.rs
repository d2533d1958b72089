use crate::cluster::{cluster_frames, component_median, ObservationGroup};
use crate::error::CaptureError;
use crate::params::{CaptureParams, SpreadMetric};
use crate::result::{ClusterDiagnostic, ClusterVerdict, ReduceDiagnostics, Reduction};
use log::{debug, info, warn};
use nalgebra::Vector3;
use tooldef_core::{Frame, MarkerEstimate, Point3D, MIN_MARKERS};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Reduce a static capture to one averaged position per marker.
///
/// Pipeline:
/// 1. greedy clustering in capture order (`cluster_radius`);
/// 2. per-cluster outlier rejection against the per-axis median
///    (`sample_outlier_distance`);
/// 3. gating on visibility and spread; rejections are logged and reported in
///    the diagnostics, not raised;
/// 4. the mean of the surviving samples, summed in capture order.
///
/// Estimates come out in cluster creation order, so identical input yields
/// bit-identical output. Fails when fewer than three clusters survive or
/// when `expected_marker_count` is given and differs from the survivors.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip_all, fields(frames = frames.len()))
)]
pub fn reduce(
    frames: &[Frame],
    expected_marker_count: Option<usize>,
    params: &CaptureParams,
) -> Result<Reduction, CaptureError> {
    params.check().map_err(CaptureError::InvalidParams)?;
    if frames.is_empty() {
        return Err(CaptureError::EmptyCapture);
    }

    let clustering = cluster_frames(frames, params.cluster_radius);
    info!(
        "clustered {} points from {} frames into {} candidate markers",
        clustering.total_points,
        frames.len(),
        clustering.groups.len()
    );
    if clustering.skipped_points > 0 {
        warn!(
            "ignored {} points with non-finite coordinates",
            clustering.skipped_points
        );
    }

    let total_frames = frames.len();
    let mut markers = Vec::new();
    let mut clusters = Vec::with_capacity(clustering.groups.len());

    for (index, group) in clustering.groups.iter().enumerate() {
        let kept = consistent_samples(group, params.sample_outlier_distance);
        let rejected_samples = group.samples.len() - kept.len();

        let (centroid, spread, distinct_frames) = if kept.is_empty() {
            (mean(&group.samples), f64::INFINITY, 0)
        } else {
            let points: Vec<Point3D> = kept.iter().map(|&i| group.samples[i]).collect();
            let centroid = mean(&points);
            let spread = spread(&points, &centroid, params.spread_metric);
            (centroid, spread, distinct_count(kept.iter().map(|&i| group.frames[i])))
        };
        let visibility = distinct_frames as f64 / total_frames as f64;

        let verdict = if visibility < params.min_visibility_fraction {
            ClusterVerdict::InsufficientVisibility {
                visibility,
                required: params.min_visibility_fraction,
            }
        } else if spread > params.max_spread {
            ClusterVerdict::ExcessiveSpread {
                spread,
                max_spread: params.max_spread,
            }
        } else {
            let id = markers.len();
            markers.push(MarkerEstimate {
                id,
                position: centroid,
                sample_count: kept.len(),
                spread,
            });
            ClusterVerdict::Accepted { marker: id }
        };

        match &verdict {
            ClusterVerdict::Accepted { marker } => debug!(
                "cluster {index} -> marker {marker}: {} samples ({rejected_samples} outliers), \
                 visibility {visibility:.2}, spread {spread:.4}",
                kept.len()
            ),
            ClusterVerdict::InsufficientVisibility { .. } => warn!(
                "cluster {index} rejected: seen in {distinct_frames}/{total_frames} frames \
                 (visibility {visibility:.2} < {:.2})",
                params.min_visibility_fraction
            ),
            ClusterVerdict::ExcessiveSpread { .. } => warn!(
                "cluster {index} rejected: spread {spread:.4} exceeds {:.4}",
                params.max_spread
            ),
        }

        clusters.push(ClusterDiagnostic {
            cluster: index,
            centroid,
            samples: group.samples.len(),
            rejected_samples,
            visibility,
            spread,
            verdict,
        });
    }

    let diagnostics = ReduceDiagnostics {
        total_frames,
        total_points: clustering.total_points,
        skipped_points: clustering.skipped_points,
        clusters,
    };
    let found = markers.len();
    let rejected = diagnostics.rejected_clusters();

    let required = expected_marker_count.unwrap_or(MIN_MARKERS);
    let short = found < MIN_MARKERS;
    let mismatch = expected_marker_count.is_some_and(|n| n != found);
    if short || mismatch {
        return Err(CaptureError::GeometryIncomplete {
            expected: required.max(MIN_MARKERS),
            found,
            rejected,
        });
    }

    info!("{found} markers survived ({rejected} clusters rejected)");
    Ok(Reduction {
        markers,
        diagnostics,
    })
}

/// Indices of samples within `max_distance` of the per-axis median.
fn consistent_samples(group: &ObservationGroup, max_distance: f64) -> Vec<usize> {
    let median = component_median(&group.samples);
    group
        .samples
        .iter()
        .enumerate()
        .filter(|(_, p)| nalgebra::distance(p, &median) <= max_distance)
        .map(|(i, _)| i)
        .collect()
}

fn mean(points: &[Point3D]) -> Point3D {
    let mut sum = Vector3::zeros();
    for p in points {
        sum += p.coords;
    }
    Point3D::from(sum / points.len() as f64)
}

fn spread(points: &[Point3D], centroid: &Point3D, metric: SpreadMetric) -> f64 {
    match metric {
        SpreadMetric::Rms => {
            let sq: f64 = points
                .iter()
                .map(|p| nalgebra::distance_squared(p, centroid))
                .sum();
            (sq / points.len() as f64).sqrt()
        }
        SpreadMetric::MaxPairwise => {
            let mut max = 0.0f64;
            for (i, a) in points.iter().enumerate() {
                for b in &points[i + 1..] {
                    max = max.max(nalgebra::distance(a, b));
                }
            }
            max
        }
    }
}

/// Number of distinct values in a non-decreasing sequence.
fn distinct_count(sorted: impl Iterator<Item = usize>) -> usize {
    let mut count = 0;
    let mut last = None;
    for v in sorted {
        if last != Some(v) {
            count += 1;
            last = Some(v);
        }
    }
    count
}
