use crate::common::test_utils::{create_temp_file, write_models};
use crate::common::{self, artifact, random_bytes};
use malscope::config::FeatureConfig;
use malscope::features::FeatureLayout;
use malscope::{
    CancellationToken, Classifier, HybridModel, LoadedModels, ModelRegistry, NoveltyDetector,
    ScanConfig, ScanError, Scanner,
};
use std::sync::Arc;

fn config_for(classifier: &std::path::Path, novelty: &std::path::Path) -> ScanConfig {
    let mut config = ScanConfig::default();
    config.models.classifier_path = classifier.to_path_buf();
    config.models.novelty_path = novelty.to_path_buf();
    config
}

#[test]
fn saved_models_reload_with_same_behavior() {
    let files = write_models(common::entropy_classifier(), common::benign_novelty());
    let config = config_for(&files.classifier, &files.novelty);
    let loaded = LoadedModels::load(&config).unwrap();

    assert_eq!(loaded.classifier.input_size(), 1000);
    assert_eq!(loaded.classifier.fingerprint().len(), 64);
    assert_eq!(loaded.novelty.fingerprint().len(), 64);
    assert_eq!(loaded.novelty.threshold, common::benign_novelty().threshold);

    let from_file = Scanner::new(config, Arc::new(loaded)).unwrap();
    let in_memory = common::scanner();
    let item = artifact(random_bytes(4096, 5), "x.bin");
    let a = from_file
        .scan(&item, &CancellationToken::new())
        .unwrap()
        .into_verdict()
        .unwrap();
    let b = in_memory
        .scan(&item, &CancellationToken::new())
        .unwrap()
        .into_verdict()
        .unwrap();
    assert_eq!(a.label, b.label);
    assert_eq!(a.confidence, b.confidence);
    assert_eq!(a.novelty_score, b.novelty_score);
    assert_eq!(a.model_fingerprint.len(), 64);
}

#[test]
fn model_file_round_trip_preserves_weights() {
    let files = write_models(common::entropy_classifier(), common::benign_novelty());
    let classifier = HybridModel::load(&files.classifier).unwrap();
    let expected = common::entropy_classifier();
    assert_eq!(classifier.hidden, expected.hidden);
    assert_eq!(classifier.output, expected.output);
    assert_eq!(classifier.tail, expected.tail);
    assert_eq!(classifier.calibration, expected.calibration);

    let novelty = NoveltyDetector::load(&files.novelty).unwrap();
    let fitted = common::benign_novelty();
    assert_eq!(novelty.forest, fitted.forest);
    assert_eq!(novelty.envelope, fitted.envelope);
    assert_eq!(novelty.threshold, fitted.threshold);
}

#[test]
fn missing_model_file_is_model_error() {
    let files = write_models(common::entropy_classifier(), common::benign_novelty());
    let missing = files.dir.path().join("nope.json");
    let err = LoadedModels::load(&config_for(&missing, &files.novelty)).unwrap_err();
    assert_eq!(err.code(), "E_MODEL");
    assert!(err.is_process_fatal());
}

#[test]
fn corrupt_model_file_is_model_error() {
    let files = write_models(common::entropy_classifier(), common::benign_novelty());
    let corrupt = create_temp_file(b"{\"version\": \"1\", \"trees\": [");
    let err = LoadedModels::load(&config_for(&files.classifier, corrupt.path())).unwrap_err();
    assert!(matches!(err, ScanError::ModelUnavailable { .. }));
}

#[test]
fn model_input_size_must_match_feature_size() {
    let wide = FeatureLayout::new(&FeatureConfig {
        feature_size: 1200,
        ..FeatureConfig::default()
    });
    let files = write_models(
        common::entropy_classifier_for(&wide),
        common::benign_novelty(),
    );
    let err = LoadedModels::load(&config_for(&files.classifier, &files.novelty)).unwrap_err();
    assert!(matches!(
        err,
        ScanError::FeatureSizeMismatch {
            expected: 1000,
            actual: 1200
        }
    ));
    assert_eq!(err.code(), "E_FEATURE_SIZE");
}

#[test]
fn configured_threshold_overrides_calibration() {
    let files = write_models(common::entropy_classifier(), common::benign_novelty());
    let mut config = config_for(&files.classifier, &files.novelty);
    config.models.novelty_threshold = Some(5.0);
    let loaded = LoadedModels::load(&config).unwrap();
    assert_eq!(loaded.novelty.threshold, 5.0);
}

#[test]
fn registry_reports_the_same_load_failure_twice() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = config_for(&dir.path().join("c.json"), &dir.path().join("n.json"));
    let registry = ModelRegistry::new();
    let first = registry.initialize(&config).unwrap_err();
    let second = registry.initialize(&config).unwrap_err();
    assert_eq!(first.code(), "E_MODEL");
    assert_eq!(first.to_string(), second.to_string());
    assert!(registry.get().is_none());
}

#[test]
fn registry_shares_one_model_instance() {
    let files = write_models(common::entropy_classifier(), common::benign_novelty());
    let config = config_for(&files.classifier, &files.novelty);
    let registry = ModelRegistry::new();
    let a = registry.initialize(&config).unwrap();
    let b = registry.initialize(&config).unwrap();
    assert!(Arc::ptr_eq(&a, &b));

    let s1 = Scanner::new(config.clone(), Arc::clone(&a)).unwrap();
    let s2 = s1.clone();
    assert!(Arc::ptr_eq(s1.models(), s2.models()));
}
