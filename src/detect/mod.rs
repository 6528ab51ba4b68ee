//! Outlier scoring behind a narrow, swappable interface.

pub mod anomaly;
pub mod forest;

pub use self::anomaly::ZScoreScorer;
pub use self::forest::IsolationForest;

use serde::Serialize;
use thiserror::Error;

/// Fixed seed used for every pipeline run, so identical inputs give identical labels.
pub const DEFAULT_SEED: u64 = 42;

#[derive(Debug, Error)]
pub enum ScoringError {
    #[error("column '{0}' not found in the uploaded data")]
    UnknownColumn(String),

    #[error("column '{column}' has a missing value at row {row}")]
    MissingValue { column: String, row: usize },

    #[error("column '{column}' has a non-numeric value '{value}' at row {row}")]
    NonNumeric {
        column: String,
        row: usize,
        value: String,
    },

    #[error("column '{column}' has a non-finite value at row {row}")]
    NonFinite { column: String, row: usize },

    #[error("cannot fit a model on an empty dataset")]
    EmptyInput,

    #[error("contamination {0} is outside (0, 0.5]")]
    InvalidContamination(f64),
}

/// Raw binary output of a scorer.
///
/// The wire convention is `+1` for inliers and `-1` for outliers, kept here
/// so the exported `anomaly_score` column stays stable across scorers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Prediction {
    Inlier,
    Outlier,
}

impl Prediction {
    pub fn raw(self) -> i8 {
        match self {
            Prediction::Inlier => 1,
            Prediction::Outlier => -1,
        }
    }
}

/// User-facing status of a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Label {
    Normal,
    Suspicious,
}

impl Label {
    pub fn as_str(self) -> &'static str {
        match self {
            Label::Normal => "Normal",
            Label::Suspicious => "Suspicious",
        }
    }
}

/// `+1 -> Normal`, `-1 -> Suspicious`.
impl From<Prediction> for Label {
    fn from(p: Prediction) -> Self {
        match p {
            Prediction::Inlier => Label::Normal,
            Prediction::Outlier => Label::Suspicious,
        }
    }
}

impl std::fmt::Display for Label {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An unsupervised outlier scorer over 2-D points.
///
/// Implementations fit and predict in a single pass and must return exactly
/// one prediction per input point. Roughly `contamination * points.len()`
/// points should come back as [`Prediction::Outlier`].
pub trait Scorer: Send + Sync {
    fn name(&self) -> &str;

    fn score(
        &self,
        points: &[(f64, f64)],
        contamination: f64,
        seed: u64,
    ) -> Result<Vec<Prediction>, ScoringError>;
}

/// Check the shared preconditions every scorer relies on.
pub(crate) fn check_input(points: &[(f64, f64)], contamination: f64) -> Result<(), ScoringError> {
    if points.is_empty() {
        return Err(ScoringError::EmptyInput);
    }
    if !(contamination > 0.0 && contamination <= 0.5) {
        return Err(ScoringError::InvalidContamination(contamination));
    }
    Ok(())
}

/// Threshold normality scores (higher = more normal) at the `contamination`
/// percentile. Points strictly below the interpolated percentile are outliers.
pub(crate) fn threshold(normality: &[f64], contamination: f64) -> Vec<Prediction> {
    let offset = percentile(normality, contamination * 100.0);
    normality
        .iter()
        .map(|&s| {
            if s < offset {
                Prediction::Outlier
            } else {
                Prediction::Inlier
            }
        })
        .collect()
}

/// Percentile with linear interpolation between closest ranks.
pub(crate) fn percentile(values: &[f64], q: f64) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        n => {
            let rank = (q / 100.0).clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            let frac = rank - lo as f64;
            sorted[lo] + (sorted[hi] - sorted[lo]) * frac
        }
    }
}
