//! Greedy proximity clustering of marker samples across frames.

use nalgebra::Vector3;
use tooldef_core::{Frame, Point3D};

/// Samples believed to come from one physical marker.
#[derive(Clone, Debug)]
pub(crate) struct ObservationGroup {
    sum: Vector3<f64>,
    pub samples: Vec<Point3D>,
    /// Frame index of each sample, non-decreasing.
    pub frames: Vec<usize>,
}

impl ObservationGroup {
    fn new(first: Point3D, frame: usize) -> Self {
        Self {
            sum: first.coords,
            samples: vec![first],
            frames: vec![frame],
        }
    }

    fn push(&mut self, p: Point3D, frame: usize) {
        self.sum += p.coords;
        self.samples.push(p);
        self.frames.push(frame);
    }

    #[inline]
    fn running_centroid(&self) -> Point3D {
        Point3D::from(self.sum / self.samples.len() as f64)
    }

    #[inline]
    fn seen_in(&self, frame: usize) -> bool {
        self.frames.last() == Some(&frame)
    }
}

pub(crate) struct Clustering {
    pub groups: Vec<ObservationGroup>,
    pub total_points: usize,
    pub skipped_points: usize,
}

/// Visit every point in capture order and attach it to the nearest eligible
/// cluster within `radius`, or open a new one.
///
/// A cluster that already holds a sample from the current frame is not
/// eligible. Equal distances resolve to the older cluster.
pub(crate) fn cluster_frames(frames: &[Frame], radius: f64) -> Clustering {
    let mut groups: Vec<ObservationGroup> = Vec::new();
    let mut total_points = 0;
    let mut skipped_points = 0;

    for (fi, frame) in frames.iter().enumerate() {
        for p in &frame.points {
            total_points += 1;
            if !p.iter().all(|v| v.is_finite()) {
                skipped_points += 1;
                continue;
            }

            let mut best: Option<(usize, f64)> = None;
            for (gi, group) in groups.iter().enumerate() {
                if group.seen_in(fi) {
                    continue;
                }
                let d = nalgebra::distance(p, &group.running_centroid());
                if d <= radius && best.is_none_or(|(_, bd)| d < bd) {
                    best = Some((gi, d));
                }
            }

            match best {
                Some((gi, _)) => groups[gi].push(*p, fi),
                None => groups.push(ObservationGroup::new(*p, fi)),
            }
        }
    }

    Clustering {
        groups,
        total_points,
        skipped_points,
    }
}

/// Per-axis median; the mean of the two middle values for even counts.
pub(crate) fn component_median(samples: &[Point3D]) -> Point3D {
    let mut out = Point3D::origin();
    let mut axis: Vec<f64> = Vec::with_capacity(samples.len());
    for k in 0..3 {
        axis.clear();
        axis.extend(samples.iter().map(|p| p[k]));
        axis.sort_by(f64::total_cmp);
        let n = axis.len();
        out[k] = if n == 0 {
            0.0
        } else if n % 2 == 1 {
            axis[n / 2]
        } else {
            0.5 * (axis[n / 2 - 1] + axis[n / 2])
        };
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(points: &[[f64; 3]]) -> Frame {
        points
            .iter()
            .map(|p| Point3D::new(p[0], p[1], p[2]))
            .collect()
    }

    #[test]
    fn groups_points_regardless_of_order_within_frames() {
        let frames = vec![
            frame(&[[0.0, 0.0, 0.0], [50.0, 0.0, 0.0]]),
            frame(&[[50.1, 0.0, 0.0], [0.1, 0.0, 0.0]]),
            frame(&[[0.0, -0.1, 0.0], [49.9, 0.0, 0.0]]),
        ];
        let out = cluster_frames(&frames, 2.0);
        assert_eq!(out.groups.len(), 2);
        assert_eq!(out.groups[0].frames, vec![0, 1, 2]);
        assert!(out.groups[0].samples.iter().all(|p| p.x < 1.0));
        assert!(out.groups[1].samples.iter().all(|p| p.x > 49.0));
    }

    #[test]
    fn second_point_in_same_frame_opens_new_cluster() {
        let frames = vec![frame(&[[0.0, 0.0, 0.0], [0.5, 0.0, 0.0]])];
        let out = cluster_frames(&frames, 2.0);
        assert_eq!(out.groups.len(), 2);
    }

    #[test]
    fn non_finite_points_are_skipped() {
        let frames = vec![frame(&[[f64::NAN, 0.0, 0.0], [1.0, 2.0, 3.0]])];
        let out = cluster_frames(&frames, 2.0);
        assert_eq!(out.total_points, 2);
        assert_eq!(out.skipped_points, 1);
        assert_eq!(out.groups.len(), 1);
    }

    #[test]
    fn median_handles_even_counts() {
        let samples = [
            Point3D::new(0.0, 4.0, 1.0),
            Point3D::new(2.0, 0.0, 1.0),
            Point3D::new(10.0, 2.0, 1.0),
            Point3D::new(4.0, 8.0, 1.0),
        ];
        assert_eq!(component_median(&samples), Point3D::new(3.0, 3.0, 1.0));
    }
}
