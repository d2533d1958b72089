use serde::{Deserialize, Serialize};
use tooldef_core::{MarkerEstimate, Point3D};

/// Why a cluster was kept or dropped.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "verdict")]
pub enum ClusterVerdict {
    Accepted { marker: usize },
    InsufficientVisibility { visibility: f64, required: f64 },
    ExcessiveSpread { spread: f64, max_spread: f64 },
}

impl ClusterVerdict {
    #[inline]
    pub fn is_accepted(&self) -> bool {
        matches!(self, ClusterVerdict::Accepted { .. })
    }
}

/// Per-cluster record of one reduction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClusterDiagnostic {
    /// Creation index of the cluster.
    pub cluster: usize,
    /// Mean of the surviving samples (all samples if none survived).
    pub centroid: Point3D,
    /// Points that joined the cluster.
    pub samples: usize,
    /// Samples excluded from the average as outliers.
    pub rejected_samples: usize,
    /// Fraction of all frames that contributed a surviving sample.
    pub visibility: f64,
    pub spread: f64,
    #[serde(flatten)]
    pub verdict: ClusterVerdict,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReduceDiagnostics {
    pub total_frames: usize,
    pub total_points: usize,
    /// Points with NaN/inf coordinates, ignored.
    pub skipped_points: usize,
    pub clusters: Vec<ClusterDiagnostic>,
}

impl ReduceDiagnostics {
    pub fn rejected_clusters(&self) -> usize {
        self.clusters
            .iter()
            .filter(|c| !c.verdict.is_accepted())
            .count()
    }
}

/// Output of [`crate::reduce`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reduction {
    pub markers: Vec<MarkerEstimate>,
    pub diagnostics: ReduceDiagnostics,
}
