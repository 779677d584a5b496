//! malscope: static malware detection with explanations.
//!
//! The crate classifies a raw artifact as benign, suspicious or malicious,
//! flags likely zero-day threats and explains the verdict:
//!
//! ```text
//! RawArtifact -> FeatureExtractor -> FeatureVector + ExtractionReport
//!                  |-> Classifier::infer
//!                  |-> NoveltyDetector::score
//!                  |-> HeuristicAnalyzer::analyze
//!              -> Fuser::fuse -> Verdict
//! ```
//!
//! Use [`engine::Scanner`] for the whole pipeline.

/// Error types and result aliases
pub mod error;

/// Logging and tracing infrastructure
pub mod logging;

/// Pipeline configuration
pub mod config;

/// Artifact value object
pub mod artifact;

/// Digests and stable hashing
pub mod hashing;

/// Entropy calculation
pub mod entropy;

/// Byte-level feature extraction
pub mod features;

/// Rule-based analysis
pub mod heuristics;

/// Classifier models and attribution
pub mod model;

/// Zero-day detection
pub mod novelty;

/// Verdict fusion and explanations
pub mod fusion;

/// Pipeline orchestration and model registry
pub mod engine;

/// Cancellation and timeouts
pub mod cancel;

pub use artifact::RawArtifact;
pub use cancel::{scan_with_timeout, CancellationToken, TimeoutConfig};
pub use config::ScanConfig;
pub use engine::{LoadedModels, ModelRegistry, ScanOutcome, Scanner, Stage};
pub use error::{Result, ScanError};
pub use features::{Extraction, ExtractionReport, FeatureExtractor, FeatureVector};
pub use fusion::{Label, Verdict};
pub use heuristics::{HeuristicAnalyzer, HeuristicFinding, Severity};
pub use model::{Classifier, ClassifierScore, HybridModel};
pub use novelty::{NoveltyDetector, NoveltyScore};
