//! Isolation Forest (Liu, Ting & Zhou, 2008) over 2-D points.
//!
//! Each tree recursively partitions a random sub-sample with axis-aligned
//! cuts at uniformly random positions. Outliers sit in sparse regions and are
//! separated after few cuts, so a short average path length across the forest
//! means "more anomalous".

use crate::detect::{check_input, threshold, Prediction, Scorer, ScoringError};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use tracing::debug;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

pub const DEFAULT_N_ESTIMATORS: usize = 100;
pub const DEFAULT_MAX_SAMPLES: usize = 256;

/// Average path length of an unsuccessful BST search over `n` points.
pub fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf { size: usize },
    Split {
        feature: usize,
        value: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone)]
struct IsolationTree {
    nodes: Vec<Node>,
}

fn feature(p: &(f64, f64), f: usize) -> f64 {
    if f == 0 {
        p.0
    } else {
        p.1
    }
}

/// Uniform draw from `[lo, hi)` that never forms `hi - lo`, which overflows
/// for finite values near `f64::MAX`.
fn uniform_cut(lo: f64, hi: f64, rng: &mut StdRng) -> f64 {
    let t: f64 = rng.gen();
    let v = lo * (1.0 - t) + hi * t;
    if v >= lo && v < hi {
        v
    } else {
        lo
    }
}

impl IsolationTree {
    fn build(points: &[(f64, f64)], sample: &mut [usize], max_depth: usize, rng: &mut StdRng) -> Self {
        let mut tree = IsolationTree { nodes: Vec::new() };
        tree.grow(points, sample, 0, max_depth, rng);
        tree
    }

    fn grow(
        &mut self,
        points: &[(f64, f64)],
        sample: &mut [usize],
        depth: usize,
        max_depth: usize,
        rng: &mut StdRng,
    ) -> usize {
        let id = self.nodes.len();
        self.nodes.push(Node::Leaf { size: sample.len() });
        if depth >= max_depth || sample.len() <= 1 {
            return id;
        }

        // Try features in random order; a feature constant within this node
        // cannot split it.
        let order = if rng.gen_bool(0.5) { [0, 1] } else { [1, 0] };
        let mut cut = None;
        for f in order {
            let (lo, hi) = sample.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &i| {
                let v = feature(&points[i], f);
                (lo.min(v), hi.max(v))
            });
            if lo < hi {
                cut = Some((f, uniform_cut(lo, hi, rng)));
                break;
            }
        }
        let Some((f, value)) = cut else {
            return id;
        };

        // Partition in place: left holds values strictly below the cut.
        let mut split_at = 0;
        for k in 0..sample.len() {
            if feature(&points[sample[k]], f) < value {
                sample.swap(k, split_at);
                split_at += 1;
            }
        }
        let (left_part, right_part) = sample.split_at_mut(split_at);
        let left = self.grow(points, left_part, depth + 1, max_depth, rng);
        let right = self.grow(points, right_part, depth + 1, max_depth, rng);
        self.nodes[id] = Node::Split {
            feature: f,
            value,
            left,
            right,
        };
        id
    }

    fn path_length(&self, p: &(f64, f64)) -> f64 {
        let mut node = 0;
        let mut depth = 0.0;
        loop {
            match &self.nodes[node] {
                Node::Leaf { size } => return depth + average_path_length(*size),
                Node::Split {
                    feature: f,
                    value,
                    left,
                    right,
                } => {
                    node = if feature(p, *f) < *value { *left } else { *right };
                    depth += 1.0;
                }
            }
        }
    }
}

/// Isolation Forest configuration.
#[derive(Debug, Clone)]
pub struct IsolationForest {
    n_estimators: usize,
    max_samples: usize,
}

impl Default for IsolationForest {
    fn default() -> Self {
        Self::new()
    }
}

impl IsolationForest {
    pub fn new() -> Self {
        Self {
            n_estimators: DEFAULT_N_ESTIMATORS,
            max_samples: DEFAULT_MAX_SAMPLES,
        }
    }

    pub fn with_n_estimators(mut self, n: usize) -> Self {
        self.n_estimators = n.max(1);
        self
    }

    pub fn with_max_samples(mut self, n: usize) -> Self {
        self.max_samples = n.max(2);
        self
    }

    /// Grow the forest on `points` using a generator seeded with `seed`.
    pub fn fit(&self, points: &[(f64, f64)], seed: u64) -> Result<FittedForest, ScoringError> {
        if points.is_empty() {
            return Err(ScoringError::EmptyInput);
        }
        let psi = self.max_samples.min(points.len());
        let max_depth = (psi.max(2) as f64).log2().ceil() as usize;
        let mut rng = StdRng::seed_from_u64(seed);

        let trees = (0..self.n_estimators)
            .map(|_| {
                let mut sample = index::sample(&mut rng, points.len(), psi).into_vec();
                IsolationTree::build(points, &mut sample, max_depth, &mut rng)
            })
            .collect();

        debug!(trees = self.n_estimators, psi, max_depth, "isolation forest grown");
        Ok(FittedForest { trees, psi })
    }
}

/// A grown forest, ready to score points.
#[derive(Debug, Clone)]
pub struct FittedForest {
    trees: Vec<IsolationTree>,
    psi: usize,
}

impl FittedForest {
    /// Negated anomaly score per point, in `[-1, 0]`. Lower is more anomalous.
    pub fn score_samples(&self, points: &[(f64, f64)]) -> Vec<f64> {
        let norm = average_path_length(self.psi);
        let n_trees = self.trees.len() as f64;
        points
            .iter()
            .map(|p| {
                let mean_depth = self.trees.iter().map(|t| t.path_length(p)).sum::<f64>() / n_trees;
                let score = if norm > 0.0 {
                    2f64.powf(-mean_depth / norm)
                } else {
                    // Single-point forest: every point is equally (un)remarkable.
                    0.5
                };
                -score
            })
            .collect()
    }
}

impl Scorer for IsolationForest {
    fn name(&self) -> &str {
        "isolation_forest"
    }

    fn score(
        &self,
        points: &[(f64, f64)],
        contamination: f64,
        seed: u64,
    ) -> Result<Vec<Prediction>, ScoringError> {
        check_input(points, contamination)?;
        let fitted = self.fit(points, seed)?;
        let normality = fitted.score_samples(points);
        Ok(threshold(&normality, contamination))
    }
}
