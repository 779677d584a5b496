//! Scan pipeline and shared model state.
//!
//! Models are loaded once per process through [`ModelRegistry::global`] and
//! shared read-only by every [`Scanner`] clone. A scan extracts features,
//! runs the classifier, the novelty detector and the heuristic analyzer in
//! parallel, then fuses their results.

use crate::artifact::RawArtifact;
use crate::cancel::CancellationToken;
use crate::config::ScanConfig;
use crate::error::{Result, ScanError};
use crate::features::FeatureExtractor;
use crate::fusion::{Evidence, Fuser, Verdict};
use crate::hashing::blake3_digest;
use crate::heuristics::HeuristicAnalyzer;
use crate::log_error;
use crate::model::{Classifier, HybridModel};
use crate::novelty::NoveltyDetector;
use once_cell::sync::OnceCell;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, info_span};

/// Pipeline stage at which a scan stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Extraction,
    Analysis,
    Fusion,
    TimedOut,
}

/// Result of a scan that did not fail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ScanOutcome {
    Complete(Verdict),
    /// Cancelled before a verdict existed. No partial verdict is produced.
    Incomplete { stage: Stage },
}

impl ScanOutcome {
    pub fn verdict(&self) -> Option<&Verdict> {
        match self {
            ScanOutcome::Complete(v) => Some(v),
            ScanOutcome::Incomplete { .. } => None,
        }
    }

    pub fn into_verdict(self) -> Option<Verdict> {
        match self {
            ScanOutcome::Complete(v) => Some(v),
            ScanOutcome::Incomplete { .. } => None,
        }
    }
}

/// Classifier and novelty detector used by every scan.
pub struct LoadedModels {
    pub classifier: Arc<dyn Classifier>,
    pub novelty: Arc<NoveltyDetector>,
}

impl std::fmt::Debug for LoadedModels {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModels")
            .field("classifier", &self.classifier.fingerprint())
            .field("novelty", &self.novelty.fingerprint())
            .finish()
    }
}

impl LoadedModels {
    pub fn new(classifier: Arc<dyn Classifier>, novelty: NoveltyDetector) -> Self {
        Self {
            classifier,
            novelty: Arc::new(novelty),
        }
    }

    /// Load both model files named by `config` and check them against the
    /// configured feature size.
    pub fn load(config: &ScanConfig) -> Result<Self> {
        let classifier = HybridModel::load(&config.models.classifier_path)?;
        let mut novelty = NoveltyDetector::load(&config.models.novelty_path)?;
        if let Some(threshold) = config.models.novelty_threshold {
            info!(threshold, "Novelty threshold overridden by configuration");
            novelty = novelty.with_threshold(threshold);
        }
        let models = Self::new(Arc::new(classifier), novelty);
        models.check_input_size(config.features.feature_size)?;
        Ok(models)
    }

    /// Both models must accept vectors of `feature_size`.
    pub fn check_input_size(&self, feature_size: usize) -> Result<()> {
        for actual in [self.classifier.input_size(), self.novelty.input_size] {
            if actual != feature_size {
                return Err(log_error!(ScanError::FeatureSizeMismatch {
                    expected: feature_size,
                    actual,
                }));
            }
        }
        Ok(())
    }

    /// Combined fingerprint of the classifier and novelty weights.
    pub fn fingerprint(&self) -> String {
        let joined = format!(
            "{}\n{}",
            self.classifier.fingerprint(),
            self.novelty.fingerprint()
        );
        blake3_digest(joined.as_bytes())
    }
}

/// Process-wide, load-once model store.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    cell: OnceCell<std::result::Result<Arc<LoadedModels>, ScanError>>,
}

static GLOBAL_REGISTRY: ModelRegistry = ModelRegistry::new();

impl ModelRegistry {
    pub const fn new() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }

    /// The registry shared by the whole process.
    pub fn global() -> &'static ModelRegistry {
        &GLOBAL_REGISTRY
    }

    /// Load the models on first call. Later calls return the same handle,
    /// or the error of the first attempt.
    pub fn initialize(&self, config: &ScanConfig) -> Result<Arc<LoadedModels>> {
        self.initialize_with(|| LoadedModels::load(config))
    }

    /// Like [`initialize`](Self::initialize) with a custom loader.
    pub fn initialize_with<F>(&self, load: F) -> Result<Arc<LoadedModels>>
    where
        F: FnOnce() -> Result<LoadedModels>,
    {
        let entry = self.cell.get_or_init(|| match load() {
            Ok(models) => {
                info!(fingerprint = %models.fingerprint(), "Models initialized");
                Ok(Arc::new(models))
            }
            Err(e) => Err(log_error!(e, "model initialization")),
        });
        match entry {
            Ok(models) => Ok(Arc::clone(models)),
            Err(e) => Err(e.replicate()),
        }
    }

    /// Loaded models, if initialization succeeded.
    pub fn get(&self) -> Option<Arc<LoadedModels>> {
        match self.cell.get() {
            Some(Ok(models)) => Some(Arc::clone(models)),
            _ => None,
        }
    }
}

/// Detection pipeline. Cheap to clone; all state is shared and read-only.
#[derive(Debug, Clone)]
pub struct Scanner {
    config: Arc<ScanConfig>,
    extractor: FeatureExtractor,
    models: Arc<LoadedModels>,
    heuristics: Arc<HeuristicAnalyzer>,
    fuser: Arc<Fuser>,
}

impl Scanner {
    /// Build a scanner around already loaded models.
    pub fn new(config: ScanConfig, models: Arc<LoadedModels>) -> Result<Self> {
        config.validate()?;
        models.check_input_size(config.features.feature_size)?;
        let heuristics = HeuristicAnalyzer::from_config(&config.heuristics)?;
        let fuser = Fuser::new(config.fusion.clone(), config.heuristics.severity_saturation)
            .with_fingerprint(models.fingerprint());
        Ok(Self {
            extractor: FeatureExtractor::new(config.features.clone()),
            config: Arc::new(config),
            models,
            heuristics: Arc::new(heuristics),
            fuser: Arc::new(fuser),
        })
    }

    /// Build a scanner using the process-wide registry.
    pub fn from_config(config: ScanConfig) -> Result<Self> {
        let models = ModelRegistry::global().initialize(&config)?;
        Self::new(config, models)
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    pub fn models(&self) -> &Arc<LoadedModels> {
        &self.models
    }

    /// Scan one artifact.
    pub fn scan(&self, artifact: &RawArtifact, cancel: &CancellationToken) -> Result<ScanOutcome> {
        let span = info_span!("scan", file = %artifact.filename(), size = artifact.size());
        let _guard = span.enter();

        artifact
            .check_size(self.config.limits.max_file_size)
            .map_err(|e| log_error!(e))?;
        if cancel.is_cancelled() {
            return Ok(ScanOutcome::Incomplete {
                stage: Stage::Extraction,
            });
        }

        let extraction = self.extractor.extract(artifact)?;
        if cancel.is_cancelled() {
            return Ok(ScanOutcome::Incomplete {
                stage: Stage::Analysis,
            });
        }

        let vector = &extraction.vector;
        let report = &extraction.report;
        // each branch starts only if the token is still live
        let live = || !cancel.is_cancelled();
        let ((classified, novelty), findings) = rayon::join(
            || {
                rayon::join(
                    || live().then(|| self.models.classifier.infer(vector)),
                    || live().then(|| self.models.novelty.score(vector)),
                )
            },
            || live().then(|| self.heuristics.analyze(artifact, &report.structure)),
        );
        let classified = classified
            .transpose()
            .map_err(|e| log_error!(e, "classifier"))?;
        let novelty = novelty.transpose().map_err(|e| log_error!(e, "novelty"))?;
        let (Some(classified), Some(novelty), Some(findings)) = (classified, novelty, findings)
        else {
            return Ok(ScanOutcome::Incomplete {
                stage: Stage::Analysis,
            });
        };
        if cancel.is_cancelled() {
            return Ok(ScanOutcome::Incomplete {
                stage: Stage::Fusion,
            });
        }

        let evidence = Evidence {
            bytes: artifact.bytes(),
            vector,
            report,
            layout: self.extractor.layout(),
        };
        let verdict = self.fuser.fuse(&classified, &novelty, &findings, &evidence);
        info!(
            label = %verdict.label,
            confidence = verdict.confidence,
            label_confidence = verdict.label_confidence,
            zero_day = verdict.is_zero_day,
            "Scan complete"
        );
        Ok(ScanOutcome::Complete(verdict))
    }

    /// Scan independent artifacts in parallel, preserving input order.
    pub fn scan_many(
        &self,
        artifacts: &[RawArtifact],
        cancel: &CancellationToken,
    ) -> Vec<Result<ScanOutcome>> {
        artifacts
            .par_iter()
            .map(|artifact| self.scan(artifact, cancel))
            .collect()
    }
}
