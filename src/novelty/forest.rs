//! Isolation forest.
//!
//! Each tree recursively partitions a random subsample on a random dimension
//! at a random value between the node's min and max. Anomalies isolate in
//! fewer splits, so their mean path length is short. Only dimensions that
//! actually vary inside a node are eligible for splitting.

use rand::rngs::StdRng;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;
/// Random dimension draws before falling back to a full scan.
const SPLIT_ATTEMPTS: usize = 32;

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

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Node {
    Split {
        dim: usize,
        value: f32,
        left: Box<Node>,
        right: Box<Node>,
    },
    Leaf {
        size: usize,
    },
}

/// One isolation tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationTree {
    pub root: Node,
}

impl IsolationTree {
    fn fit(samples: &[Vec<f32>], subsample: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let indices = sample(&mut rng, samples.len(), subsample).into_vec();
        let height_limit = (subsample.max(2) as f64).log2().ceil() as usize;
        let root = build(samples, indices, 0, height_limit, &mut rng);
        Self { root }
    }

    /// Path length of `x`, including the leaf size adjustment.
    pub fn path_length(&self, x: &[f32]) -> f64 {
        let mut node = &self.root;
        let mut depth = 0usize;
        loop {
            match node {
                Node::Split {
                    dim,
                    value,
                    left,
                    right,
                } => {
                    let v = x.get(*dim).copied().unwrap_or(0.0);
                    node = if v < *value { left } else { right };
                    depth += 1;
                }
                Node::Leaf { size } => return depth as f64 + average_path_length(*size),
            }
        }
    }
}

fn range_of(samples: &[Vec<f32>], indices: &[usize], dim: usize) -> (f32, f32) {
    indices
        .iter()
        .map(|&i| samples[i][dim])
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        })
}

/// Pick a dimension that varies among `indices` and its (min, max).
fn choose_split(samples: &[Vec<f32>], indices: &[usize], rng: &mut StdRng) -> Option<(usize, f32, f32)> {
    let dims = samples[indices[0]].len();
    if dims == 0 {
        return None;
    }
    for _ in 0..SPLIT_ATTEMPTS {
        let dim = rng.gen_range(0..dims);
        let (lo, hi) = range_of(samples, indices, dim);
        if lo < hi {
            return Some((dim, lo, hi));
        }
    }
    let varying: Vec<(usize, f32, f32)> = (0..dims)
        .map(|d| {
            let (lo, hi) = range_of(samples, indices, d);
            (d, lo, hi)
        })
        .filter(|(_, lo, hi)| lo < hi)
        .collect();
    if varying.is_empty() {
        None
    } else {
        Some(varying[rng.gen_range(0..varying.len())])
    }
}

fn build(
    samples: &[Vec<f32>],
    indices: Vec<usize>,
    depth: usize,
    height_limit: usize,
    rng: &mut StdRng,
) -> Node {
    if depth >= height_limit || indices.len() <= 1 {
        return Node::Leaf {
            size: indices.len(),
        };
    }
    let Some((dim, lo, hi)) = choose_split(samples, &indices, rng) else {
        return Node::Leaf {
            size: indices.len(),
        };
    };
    let mut value = rng.gen_range(lo..hi);
    // keep both children non-empty: every x < value goes left
    if value <= lo {
        value = hi;
    }
    let (left, right): (Vec<usize>, Vec<usize>) =
        indices.into_iter().partition(|&i| samples[i][dim] < value);
    Node::Split {
        dim,
        value,
        left: Box::new(build(samples, left, depth + 1, height_limit, rng)),
        right: Box::new(build(samples, right, depth + 1, height_limit, rng)),
    }
}

/// Ensemble of isolation trees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IsolationForest {
    pub trees: Vec<IsolationTree>,
    /// Subsample size each tree was grown on.
    pub subsample: usize,
}

impl IsolationForest {
    /// Grow `trees` trees on subsamples of `samples`. Tree `t` uses seed
    /// `seed + t`, so the forest is reproducible regardless of thread count.
    pub fn fit(samples: &[Vec<f32>], trees: usize, sample_size: usize, seed: u64) -> Self {
        let subsample = sample_size.min(samples.len()).max(1);
        let trees = (0..trees as u64)
            .into_par_iter()
            .map(|t| IsolationTree::fit(samples, subsample, seed.wrapping_add(t)))
            .collect();
        Self { trees, subsample }
    }

    pub fn mean_path_length(&self, x: &[f32]) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        self.trees.iter().map(|t| t.path_length(x)).sum::<f64>() / self.trees.len() as f64
    }

    /// Anomaly score `2^(-E[h(x)] / c(psi))` in (0, 1].
    pub fn score(&self, x: &[f32]) -> f64 {
        let c = average_path_length(self.subsample);
        if c <= 0.0 {
            return 0.5;
        }
        2f64.powf(-self.mean_path_length(x) / c)
    }
}
