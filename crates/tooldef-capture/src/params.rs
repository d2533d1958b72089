use serde::{Deserialize, Serialize};

/// How the dispersion of a marker's samples is measured.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpreadMetric {
    /// Root-mean-square distance of the samples to their mean.
    #[default]
    Rms,
    /// Largest distance between any two samples.
    MaxPairwise,
}

/// Configuration for capture reduction.
///
/// The defaults suit passive spheres on tools with 20+ mm marker spacing,
/// tracked at the 0.1-0.3 mm RMS typical of Polaris/Atracsys cameras.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureParams {
    /// A point joins a cluster when it lies within this distance of the
    /// cluster's running centroid.
    ///
    /// Must stay well below half the smallest inter-marker spacing, otherwise
    /// the grouping depends on the order points arrive in.
    pub cluster_radius: f64,
    /// Samples farther than this from the per-axis median of their cluster
    /// are dropped from the average (the marker itself survives).
    pub sample_outlier_distance: f64,
    /// Minimum fraction of frames a marker must be seen in.
    pub min_visibility_fraction: f64,
    /// Largest accepted spread of the surviving samples.
    pub max_spread: f64,
    pub spread_metric: SpreadMetric,
}

impl Default for CaptureParams {
    fn default() -> Self {
        Self {
            cluster_radius: 3.0,
            sample_outlier_distance: 0.5,
            min_visibility_fraction: 0.5,
            max_spread: 0.25,
            spread_metric: SpreadMetric::Rms,
        }
    }
}

impl CaptureParams {
    pub(crate) fn check(&self) -> Result<(), &'static str> {
        if !(self.cluster_radius.is_finite() && self.cluster_radius > 0.0) {
            return Err("cluster_radius must be > 0");
        }
        if !(self.sample_outlier_distance.is_finite() && self.sample_outlier_distance > 0.0) {
            return Err("sample_outlier_distance must be > 0");
        }
        if !(0.0..=1.0).contains(&self.min_visibility_fraction) {
            return Err("min_visibility_fraction must be in [0, 1]");
        }
        if !(self.max_spread >= 0.0) {
            return Err("max_spread must be >= 0");
        }
        Ok(())
    }
}
