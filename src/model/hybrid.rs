//! Hybrid convolutional + recurrent classifier.
//!
//! - convolution over the byte frequency and n-gram slots, ReLU, global max
//!   and mean pooling per filter
//! - Elman recurrent cell (tanh) over the local entropy sequence
//! - dense ReLU layer over pooled, recurrent and scalar tail features
//! - linear output followed by Platt scaling `a*z + b` with `a > 0`
//!
//! Weights are stored as JSON. Every shape is validated on load.

use super::io::{ensure_finite, read_model, write_model};
use super::Classifier;
use crate::error::{Result, ScanError};
use crate::features::FeatureLayout;
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::path::Path;
use tracing::info;

const MODEL_NAME: &str = "classifier";

/// One 1-D convolution filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvFilter {
    pub weights: Vec<f32>,
    pub bias: f32,
}

impl ConvFilter {
    /// Global (max, mean) of the ReLU activation map.
    fn pool(&self, input: &[f32]) -> (f32, f32) {
        let k = self.weights.len();
        if k == 0 || input.len() < k {
            return (0.0, 0.0);
        }
        let mut max = 0.0f32;
        let mut sum = 0.0f32;
        let positions = input.len() - k + 1;
        for window in input.windows(k) {
            let act = window
                .iter()
                .zip(&self.weights)
                .fold(self.bias, |acc, (x, w)| acc + x * w)
                .max(0.0);
            max = max.max(act);
            sum += act;
        }
        (max, sum / positions as f32)
    }
}

/// Elman recurrent cell over a scalar sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurrentCell {
    pub hidden_size: usize,
    pub input_weights: Vec<f32>,
    /// Row-major `hidden_size x hidden_size`.
    pub recurrent_weights: Vec<f32>,
    pub bias: Vec<f32>,
}

impl RecurrentCell {
    fn zeroed(hidden_size: usize) -> Self {
        Self {
            hidden_size,
            input_weights: vec![0.0; hidden_size],
            recurrent_weights: vec![0.0; hidden_size * hidden_size],
            bias: vec![0.0; hidden_size],
        }
    }

    /// Final hidden state.
    fn run(&self, sequence: &[f32]) -> Vec<f32> {
        let n = self.hidden_size;
        let mut h = vec![0.0f32; n];
        let mut next = vec![0.0f32; n];
        for &x in sequence {
            for (i, out) in next.iter_mut().enumerate() {
                let row = &self.recurrent_weights[i * n..(i + 1) * n];
                let rec: f32 = row.iter().zip(&h).map(|(w, hj)| w * hj).sum();
                *out = (self.input_weights[i] * x + rec + self.bias[i]).tanh();
            }
            std::mem::swap(&mut h, &mut next);
        }
        h
    }

    fn validate(&self) -> Result<()> {
        let n = self.hidden_size;
        if self.input_weights.len() != n
            || self.recurrent_weights.len() != n * n
            || self.bias.len() != n
        {
            return Err(shape_error(format!(
                "recurrent cell shapes do not match hidden_size {n}"
            )));
        }
        ensure_finite(MODEL_NAME, "recurrent input weights", &self.input_weights)?;
        ensure_finite(MODEL_NAME, "recurrent weights", &self.recurrent_weights)?;
        ensure_finite(MODEL_NAME, "recurrent bias", &self.bias)
    }
}

/// Fully connected layer, row-major `outputs x inputs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseLayer {
    pub inputs: usize,
    pub outputs: usize,
    pub weights: Vec<f32>,
    pub bias: Vec<f32>,
}

impl DenseLayer {
    pub fn zeroed(inputs: usize, outputs: usize) -> Self {
        Self {
            inputs,
            outputs,
            weights: vec![0.0; inputs * outputs],
            bias: vec![0.0; outputs],
        }
    }

    /// Mutable weight of input `i` into output `o`.
    pub fn weight_mut(&mut self, o: usize, i: usize) -> &mut f32 {
        &mut self.weights[o * self.inputs + i]
    }

    fn forward(&self, x: &[f32]) -> Vec<f32> {
        self.weights
            .chunks_exact(self.inputs.max(1))
            .zip(&self.bias)
            .map(|(row, b)| row.iter().zip(x).fold(*b, |acc, (w, xi)| acc + w * xi))
            .collect()
    }

    fn validate(&self, name: &str) -> Result<()> {
        if self.inputs == 0
            || self.weights.len() != self.inputs * self.outputs
            || self.bias.len() != self.outputs
        {
            return Err(shape_error(format!(
                "{name} layer shapes do not match {}x{}",
                self.outputs, self.inputs
            )));
        }
        ensure_finite(MODEL_NAME, name, &self.weights)?;
        ensure_finite(MODEL_NAME, name, &self.bias)
    }
}

/// Platt scaling of the raw output.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlattCalibration {
    pub a: f32,
    pub b: f32,
}

impl Default for PlattCalibration {
    fn default() -> Self {
        Self { a: 1.0, b: 0.0 }
    }
}

/// Architecture sizes for a freshly initialized model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelShape {
    pub filters: usize,
    pub kernel: usize,
    pub recurrent_hidden: usize,
    pub dense_hidden: usize,
}

impl Default for ModelShape {
    fn default() -> Self {
        Self {
            filters: 8,
            kernel: 5,
            recurrent_hidden: 8,
            dense_hidden: 16,
        }
    }
}

/// The hybrid classifier and its weights.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HybridModel {
    pub version: String,
    pub input_size: usize,
    /// Slots fed to the convolutional branch.
    pub conv_input: Range<usize>,
    /// Slots fed to the recurrent branch, in sequence order.
    pub sequence: Range<usize>,
    /// Slots passed straight to the dense head.
    pub tail: Vec<Range<usize>>,
    pub conv: Vec<ConvFilter>,
    pub recurrent: RecurrentCell,
    pub hidden: DenseLayer,
    pub output: DenseLayer,
    #[serde(default)]
    pub calibration: PlattCalibration,
    /// Benign mean used as occlusion reference.
    #[serde(default)]
    pub baseline: Option<Vec<f32>>,
    #[serde(skip)]
    fingerprint: String,
}

fn shape_error(reason: String) -> ScanError {
    ScanError::model_unavailable(MODEL_NAME, reason)
}

impl HybridModel {
    /// A model with all-zero weights wired to `layout`. Outputs p = 0.5
    /// until weights are set.
    pub fn zeroed(layout: &FeatureLayout, shape: ModelShape) -> Self {
        let tail = vec![
            layout.global_entropy..layout.global_entropy + 1,
            layout.entropy_summary.start..layout.structure.end,
        ];
        let tail_len: usize = tail.iter().map(|r| r.len()).sum();
        let head_inputs = 2 * shape.filters + shape.recurrent_hidden + tail_len;
        Self {
            version: "1".to_string(),
            input_size: layout.feature_size,
            conv_input: layout.byte_freq.start..layout.trigram.end,
            sequence: layout.local_entropy.clone(),
            tail,
            conv: (0..shape.filters)
                .map(|_| ConvFilter {
                    weights: vec![0.0; shape.kernel],
                    bias: 0.0,
                })
                .collect(),
            recurrent: RecurrentCell::zeroed(shape.recurrent_hidden),
            hidden: DenseLayer::zeroed(head_inputs, shape.dense_hidden),
            output: DenseLayer::zeroed(shape.dense_hidden, 1),
            calibration: PlattCalibration::default(),
            baseline: None,
            fingerprint: String::new(),
        }
    }

    /// Position of input slot `index` among the dense head inputs, if it is
    /// a tail feature.
    pub fn tail_position(&self, index: usize) -> Option<usize> {
        let mut offset = 2 * self.conv.len() + self.recurrent.hidden_size;
        for r in &self.tail {
            if r.contains(&index) {
                return Some(offset + index - r.start);
            }
            offset += r.len();
        }
        None
    }

    /// Load and validate a model file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let (mut model, fingerprint): (HybridModel, String) = read_model(path, MODEL_NAME)?;
        model.validate()?;
        model.fingerprint = fingerprint;
        info!(
            path = %path.display(),
            fingerprint = %model.fingerprint,
            input_size = model.input_size,
            "Loaded classifier"
        );
        Ok(model)
    }

    /// Write the model; the fingerprint is updated to the written bytes.
    pub fn save(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.validate()?;
        self.fingerprint = write_model(path.as_ref(), &*self)?;
        Ok(())
    }

    /// Check every shape and parameter.
    pub fn validate(&self) -> Result<()> {
        let n = self.input_size;
        let in_bounds = |r: &Range<usize>| r.start <= r.end && r.end <= n;
        if n == 0 || !in_bounds(&self.conv_input) || !in_bounds(&self.sequence) {
            return Err(shape_error(format!("input ranges exceed input_size {n}")));
        }
        if !self.tail.iter().all(in_bounds) {
            return Err(shape_error("tail range exceeds input_size".into()));
        }
        let kernel = self.conv.first().map_or(0, |f| f.weights.len());
        if kernel == 0 || self.conv.iter().any(|f| f.weights.len() != kernel) {
            return Err(shape_error("convolution filters need one non-zero kernel size".into()));
        }
        for f in &self.conv {
            ensure_finite(MODEL_NAME, "convolution", &f.weights)?;
            ensure_finite(MODEL_NAME, "convolution bias", &[f.bias])?;
        }
        self.recurrent.validate()?;
        let tail_len: usize = self.tail.iter().map(|r| r.len()).sum();
        let head_inputs = 2 * self.conv.len() + self.recurrent.hidden_size + tail_len;
        self.hidden.validate("hidden")?;
        self.output.validate("output")?;
        if self.hidden.inputs != head_inputs {
            return Err(shape_error(format!(
                "hidden layer expects {} inputs, head provides {head_inputs}",
                self.hidden.inputs
            )));
        }
        if self.output.inputs != self.hidden.outputs || self.output.outputs != 1 {
            return Err(shape_error("output layer must map hidden units to one logit".into()));
        }
        let PlattCalibration { a, b } = self.calibration;
        if !(a.is_finite() && b.is_finite() && a > 0.0) {
            return Err(shape_error(format!("calibration slope must be positive, got {a}")));
        }
        if let Some(baseline) = &self.baseline {
            if baseline.len() != n {
                return Err(shape_error(format!(
                    "baseline has {} values, expected {n}",
                    baseline.len()
                )));
            }
            ensure_finite(MODEL_NAME, "baseline", baseline)?;
        }
        Ok(())
    }

    /// Uncalibrated output.
    fn raw_output(&self, x: &[f32]) -> f32 {
        let mut head = Vec::with_capacity(self.hidden.inputs);
        let conv_in = &x[self.conv_input.clone()];
        for filter in &self.conv {
            let (max, mean) = filter.pool(conv_in);
            head.push(max);
            head.push(mean);
        }
        head.extend(self.recurrent.run(&x[self.sequence.clone()]));
        for r in &self.tail {
            head.extend_from_slice(&x[r.clone()]);
        }
        let hidden: Vec<f32> = self
            .hidden
            .forward(&head)
            .into_iter()
            .map(|h| h.max(0.0))
            .collect();
        self.output.forward(&hidden).first().copied().unwrap_or(0.0)
    }
}

impl Classifier for HybridModel {
    fn input_size(&self) -> usize {
        self.input_size
    }

    fn logit(&self, x: &[f32]) -> f32 {
        let z = self.raw_output(x);
        self.calibration.a * z + self.calibration.b
    }

    fn baseline(&self) -> Option<&[f32]> {
        self.baseline.as_deref()
    }

    fn fingerprint(&self) -> &str {
        &self.fingerprint
    }
}
