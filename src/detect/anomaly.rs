use crate::detect::{check_input, threshold, Prediction, Scorer, ScoringError};

/// A column of values for simple moment statistics.
pub struct Series {
    values: Vec<f64>,
}

impl Series {
    pub fn new(values: Vec<f64>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn mean(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        let n = self.values.len() as f64;
        let sum: f64 = self.values.iter().sum();
        if sum.is_finite() {
            sum / n
        } else {
            // Sum overflowed; scale first.
            self.values.iter().map(|&x| x / n).sum()
        }
    }

    pub fn variance(&self) -> f64 {
        if self.values.is_empty() {
            return 0.0;
        }
        let mean = self.mean();
        let sum_sq_diff: f64 = self.values.iter().map(|&x| (x - mean).powi(2)).sum();
        sum_sq_diff / self.values.len() as f64
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    /// Z = (value - mean) / std_dev. A constant series gives 0 for every value.
    pub fn z_score(&self, value: f64) -> f64 {
        standardize(value, self.mean(), self.std_dev())
    }

    /// Z-score of every value in the series, with the moments computed once.
    pub fn z_scores(&self) -> Vec<f64> {
        let mean = self.mean();
        let std = self.std_dev();
        self.values.iter().map(|&v| standardize(v, mean, std)).collect()
    }
}

fn standardize(value: f64, mean: f64, std: f64) -> f64 {
    if std == 0.0 {
        return 0.0;
    }
    (value - mean) / std
}

/// Scores each point by its largest absolute per-feature z-score.
///
/// A drop-in alternative to the forest for quick, seed-independent runs.
#[derive(Debug, Clone, Default)]
pub struct ZScoreScorer;

impl Scorer for ZScoreScorer {
    fn name(&self) -> &str {
        "z_score"
    }

    fn score(
        &self,
        points: &[(f64, f64)],
        contamination: f64,
        _seed: u64,
    ) -> Result<Vec<Prediction>, ScoringError> {
        check_input(points, contamination)?;
        let xs = Series::new(points.iter().map(|p| p.0).collect());
        let ys = Series::new(points.iter().map(|p| p.1).collect());

        // Negate so that, as with the forest, lower means more anomalous.
        let normality: Vec<f64> = xs
            .z_scores()
            .into_iter()
            .zip(ys.z_scores())
            .map(|(zx, zy)| -zx.abs().max(zy.abs()))
            .collect();
        Ok(threshold(&normality, contamination))
    }
}
