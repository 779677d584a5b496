//! Configuration for the detection pipeline.
//!
//! Provides centralized configuration for all pipeline components with
//! sensible defaults. Values come from, in increasing precedence, the
//! defaults below, an optional JSON file, and environment variables.

use crate::error::{Result, ScanError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Master configuration for the scan pipeline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    /// Feature extraction layout and sizes.
    pub features: FeatureConfig,
    /// Heuristic rule configuration.
    pub heuristics: HeuristicsConfig,
    /// Verdict fusion and explanation configuration.
    pub fusion: FusionConfig,
    /// Model artifact locations.
    pub models: ModelConfig,
    /// Input and time limits.
    pub limits: LimitsConfig,
}

/// Feature extraction configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Length of every feature vector; must equal the models' input size.
    pub feature_size: usize,
    /// Hash buckets for 2-gram statistics (power of two).
    pub bigram_buckets: usize,
    /// Hash buckets for 3-gram statistics (power of two).
    pub trigram_buckets: usize,
    /// Number of local entropy slots.
    pub local_entropy_slots: usize,
    /// Minimum segment length for local entropy, in bytes.
    pub min_entropy_window: usize,
    /// Local entropy above this value (bits/byte) counts as high.
    pub high_entropy_threshold: f64,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            feature_size: 1000,
            bigram_buckets: 256,
            trigram_buckets: 256,
            local_entropy_slots: 64,
            min_entropy_window: 256,
            high_entropy_threshold: 7.2,
        }
    }
}

/// Heuristic analyzer configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeuristicsConfig {
    /// Optional JSON pattern file extending (or replacing) the built-in rules.
    pub patterns_path: Option<PathBuf>,
    /// Keep the built-in rule set when a pattern file is given.
    pub include_builtin: bool,
    /// Severity sum at which the heuristic score saturates at 1.0.
    pub severity_saturation: f32,
    /// Flag artifacts whose content contradicts the declared extension.
    pub detect_type_mismatch: bool,
}

impl Default for HeuristicsConfig {
    fn default() -> Self {
        Self {
            patterns_path: None,
            include_builtin: true,
            severity_saturation: 9.0,
            detect_type_mismatch: true,
        }
    }
}

/// Fusion weights. Each weight scales one named confidence component.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionWeights {
    /// Weight of the raw classifier probability.
    pub classifier: f64,
    /// Weight of the distance above the malicious threshold.
    pub margin: f64,
    /// Weight of the signed novelty term.
    pub novelty: f64,
    /// Flat bonus when the zero-day flag is raised.
    pub zero_day: f64,
    /// Weight of the heuristic severity score.
    pub heuristics: f64,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            classifier: 0.55,
            margin: 0.25,
            novelty: 0.10,
            zero_day: 0.10,
            heuristics: 0.20,
        }
    }
}

/// Verdict fusion and explanation configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    /// Malicious cutoff on the classifier probability.
    pub confidence_threshold: f64,
    /// Width of the ambiguous band below the threshold.
    pub suspicious_band: f64,
    /// Number of features kept in the importance list.
    pub top_k: usize,
    /// Maximum number of suspicious byte regions reported.
    pub max_suspicious_bytes: usize,
    /// Bytes of context shown per suspicious region.
    pub byte_context: usize,
    /// Global entropy above which a packing risk factor is added.
    pub packed_entropy_threshold: f64,
    /// Confidence component weights.
    pub weights: FusionWeights,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            suspicious_band: 0.15,
            top_k: 10,
            max_suspicious_bytes: 10,
            byte_context: 16,
            packed_entropy_threshold: 7.2,
            weights: FusionWeights::default(),
        }
    }
}

/// Model artifact configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Path of the classifier weights (JSON).
    pub classifier_path: PathBuf,
    /// Path of the novelty detector (JSON).
    pub novelty_path: PathBuf,
    /// Overrides the threshold calibrated at training time.
    pub novelty_threshold: Option<f64>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            classifier_path: PathBuf::from("ml_model/classifier.json"),
            novelty_path: PathBuf::from("ml_model/novelty.json"),
            novelty_threshold: None,
        }
    }
}

/// Input and time limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Largest accepted artifact in bytes (default: 52428800 = 50MB).
    pub max_file_size: u64,
    /// Wall-clock budget for one scan when run through the async wrapper.
    pub scan_timeout_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_file_size: 52_428_800,
            scan_timeout_secs: 30,
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| ScanError::InvalidConfig(format!("{key}: cannot parse {raw:?}")))
}

impl ScanConfig {
    /// Load a configuration file. Missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let cfg: ScanConfig = serde_json::from_str(&text)?;
        debug!(path = %path.as_ref().display(), "Loaded scan configuration");
        Ok(cfg)
    }

    /// Overlay values from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    /// Overlay values from an arbitrary variable lookup.
    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("FEATURE_SIZE") {
            self.features.feature_size = parse_env("FEATURE_SIZE", &v)?;
        }
        if let Some(v) = lookup("CONFIDENCE_THRESHOLD") {
            self.fusion.confidence_threshold = parse_env("CONFIDENCE_THRESHOLD", &v)?;
        }
        if let Some(v) = lookup("SUSPICIOUS_BAND") {
            self.fusion.suspicious_band = parse_env("SUSPICIOUS_BAND", &v)?;
        }
        if let Some(v) = lookup("NOVELTY_THRESHOLD") {
            self.models.novelty_threshold = Some(parse_env("NOVELTY_THRESHOLD", &v)?);
        }
        if let Some(v) = lookup("TOP_K_FEATURES") {
            self.fusion.top_k = parse_env("TOP_K_FEATURES", &v)?;
        }
        if let Some(v) = lookup("CLASSIFIER_MODEL_PATH") {
            self.models.classifier_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("NOVELTY_MODEL_PATH") {
            self.models.novelty_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("HEURISTIC_PATTERNS_PATH") {
            self.heuristics.patterns_path = Some(PathBuf::from(v));
        }
        if let Some(v) = lookup("MAX_FILE_SIZE") {
            self.limits.max_file_size = parse_env("MAX_FILE_SIZE", &v)?;
        }
        if let Some(v) = lookup("SCAN_TIMEOUT_SECS") {
            self.limits.scan_timeout_secs = parse_env("SCAN_TIMEOUT_SECS", &v)?;
        }
        Ok(())
    }

    /// Defaults, then the optional file, then the environment; validated.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut cfg = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject values the pipeline cannot work with.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(ScanError::InvalidConfig(msg));
        let f = &self.features;
        if f.feature_size == 0 {
            return invalid("feature_size must be positive".into());
        }
        for (name, n) in [
            ("bigram_buckets", f.bigram_buckets),
            ("trigram_buckets", f.trigram_buckets),
        ] {
            if n == 0 || !n.is_power_of_two() {
                return invalid(format!("{name} must be a power of two, got {n}"));
            }
        }
        if f.local_entropy_slots == 0 || f.min_entropy_window == 0 {
            return invalid("local entropy slots and window must be positive".into());
        }
        let u = &self.fusion;
        if !(u.confidence_threshold > 0.0 && u.confidence_threshold < 1.0) {
            return invalid(format!(
                "confidence_threshold must lie in (0, 1), got {}",
                u.confidence_threshold
            ));
        }
        if !(0.0..=u.confidence_threshold).contains(&u.suspicious_band) {
            return invalid(format!(
                "suspicious_band must lie in [0, threshold], got {}",
                u.suspicious_band
            ));
        }
        let w = &u.weights;
        if [w.classifier, w.margin, w.novelty, w.zero_day, w.heuristics]
            .iter()
            .any(|x| !x.is_finite() || *x < 0.0)
        {
            return invalid("fusion weights must be finite and non-negative".into());
        }
        if let Some(t) = self.models.novelty_threshold {
            if !t.is_finite() || t <= 0.0 {
                return invalid(format!("novelty_threshold must be positive, got {t}"));
            }
        }
        if self.heuristics.severity_saturation <= 0.0 {
            return invalid("severity_saturation must be positive".into());
        }
        if self.limits.max_file_size == 0 {
            return invalid("max_file_size must be positive".into());
        }
        Ok(())
    }
}
