use crate::common::{self, artifact, english_text};
use malscope::model::sigmoid;
use malscope::{
    scan_with_timeout, Classifier, ClassifierScore, FeatureVector, HybridModel, LoadedModels,
    ScanConfig, ScanOutcome, Scanner, Stage, TimeoutConfig,
};
use std::sync::Arc;
use std::time::Duration;

/// Wraps a model and stalls inference.
struct SlowClassifier {
    inner: HybridModel,
    delay: Duration,
}

impl Classifier for SlowClassifier {
    fn input_size(&self) -> usize {
        self.inner.input_size()
    }

    fn logit(&self, x: &[f32]) -> f32 {
        self.inner.logit(x)
    }

    fn infer(&self, features: &FeatureVector) -> malscope::Result<ClassifierScore> {
        std::thread::sleep(self.delay);
        let logit = self.logit(features);
        Ok(ClassifierScore {
            probability: sigmoid(logit),
            logit,
            contributions: vec![0.0; features.len()],
        })
    }
}

fn slow_scanner(delay: Duration) -> Scanner {
    let classifier = SlowClassifier {
        inner: common::entropy_classifier(),
        delay,
    };
    let models = LoadedModels::new(Arc::new(classifier), common::benign_novelty());
    Scanner::new(ScanConfig::default(), Arc::new(models)).unwrap()
}

#[tokio::test]
async fn slow_scan_reports_timeout() {
    let scanner = slow_scanner(Duration::from_millis(400));
    let outcome = scan_with_timeout(
        scanner,
        artifact(english_text(2048, 1), "notes.txt"),
        TimeoutConfig::from_duration(Duration::from_millis(50)),
    )
    .await
    .unwrap();
    assert_eq!(
        outcome,
        ScanOutcome::Incomplete {
            stage: Stage::TimedOut
        }
    );
    assert!(outcome.verdict().is_none());
}

#[tokio::test]
async fn scan_within_budget_completes() {
    let scanner = slow_scanner(Duration::from_millis(10));
    let outcome = scan_with_timeout(
        scanner,
        artifact(english_text(2048, 2), "notes.txt"),
        TimeoutConfig::from_duration(Duration::from_secs(20)),
    )
    .await
    .unwrap();
    let verdict = outcome.into_verdict().expect("scan completes");
    assert!((0.0..=1.0).contains(&verdict.confidence));
}

#[tokio::test]
async fn errors_pass_through_the_timeout_wrapper() {
    let err = scan_with_timeout(
        common::scanner(),
        artifact(Vec::new(), "empty.bin"),
        TimeoutConfig::default(),
    )
    .await
    .unwrap_err();
    assert_eq!(err.code(), "E_EMPTY_INPUT");
}
