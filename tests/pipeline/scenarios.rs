use crate::common::{self, artifact, padded_elf, plant, random_bytes};
use malscope::config::HeuristicsConfig;
use malscope::features::{FormatKind, Structure};
use malscope::{CancellationToken, FeatureExtractor, HeuristicAnalyzer, Label, ScanConfig, ScanError, Severity};

fn scan_verdict(bytes: Vec<u8>, name: &str) -> malscope::Verdict {
    common::scanner()
        .scan(&artifact(bytes, name), &CancellationToken::new())
        .expect("scan")
        .into_verdict()
        .expect("complete verdict")
}

/// Low-entropy filler keeps the classifier well below the suspicious band.
fn injection_sample() -> Vec<u8> {
    let mut data = vec![b'A'; 8192];
    plant(&mut data, 1000, b"VirtualAllocEx");
    plant(&mut data, 3000, b"WriteProcessMemory");
    data
}

#[test]
fn zero_buffer_is_benign() {
    let scanner = common::scanner();
    let verdict = scanner
        .scan(&artifact(vec![0u8; 1024], "zeros.bin"), &CancellationToken::new())
        .unwrap()
        .into_verdict()
        .unwrap();

    assert_eq!(verdict.label, Label::Benign);
    assert!(verdict.classifier_probability < 0.1);
    assert!((0.0..=1.0).contains(&verdict.confidence));
    let threshold = scanner.models().novelty.threshold;
    assert_eq!(verdict.is_zero_day, verdict.novelty_score > threshold);
    assert!(verdict.explanation.model_decision.starts_with("Classified as benign"));
    assert!(verdict.label_confidence > 0.9, "{}", verdict.label_confidence);
    assert!(verdict.confidence < verdict.label_confidence);
}

#[test]
fn injection_strings_raise_findings() {
    let data = injection_sample();
    let findings = HeuristicAnalyzer::from_config(&HeuristicsConfig::default())
        .unwrap()
        .analyze(&artifact(data.clone(), "sample.bin"), &Structure::Unknown);

    let injection = findings
        .iter()
        .find(|f| f.rule_id == "process_injection")
        .expect("process injection rule fires");
    assert_eq!(injection.offset, 1000);
    assert_eq!(injection.severity, Severity::High);
    assert!(findings.windows(2).all(|w| w[0].offset <= w[1].offset));

    let scanner = common::scanner();
    let verdict = scanner
        .scan(&artifact(data, "sample.bin"), &CancellationToken::new())
        .unwrap()
        .into_verdict()
        .unwrap();
    let fusion = &scanner.config().fusion;
    let p = verdict.classifier_probability as f64;
    assert!(p < fusion.confidence_threshold - fusion.suspicious_band, "p={p}");
    assert_eq!(verdict.label, Label::Suspicious);
    assert!(verdict
        .explanation
        .risk_factors
        .iter()
        .any(|r| r == "Imports or references process injection APIs"));
    assert!(verdict
        .explanation
        .suspicious_bytes
        .iter()
        .any(|b| b.offset == 1000));
    assert!(verdict.explanation.confidence_breakdown.heuristics > 0.0);
}

#[test]
fn loader_and_launcher_apis_are_suspicious() {
    let mut data = vec![b'A'; 8192];
    for (at, api) in [
        (600, &b"LoadLibraryA"[..]),
        (1600, b"GetProcAddress"),
        (2600, b"WinExec"),
        (3600, b"ShellExecuteA"),
        (4600, b"CreateProcessA"),
    ] {
        plant(&mut data, at, api);
    }
    let verdict = scan_verdict(data, "stager.bin");
    assert!(verdict.classifier_probability < 0.1);
    assert_eq!(verdict.label, Label::Suspicious);
    assert!(verdict
        .explanation
        .risk_factors
        .iter()
        .any(|r| r == "Resolves APIs at runtime and launches processes"));
}

#[test]
fn empty_input_is_rejected() {
    let err = common::scanner()
        .scan(&artifact(Vec::new(), "empty.bin"), &CancellationToken::new())
        .unwrap_err();
    assert!(matches!(err, ScanError::EmptyInput));
    assert_eq!(err.code(), "E_EMPTY_INPUT");
}

#[test]
fn repeated_scans_are_identical() {
    let scanner = common::scanner();
    let item = artifact(injection_sample(), "sample.bin");
    let first = scanner.scan(&item, &CancellationToken::new()).unwrap();
    let second = scanner.scan(&item, &CancellationToken::new()).unwrap();
    assert_eq!(first, second);
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second).unwrap()
    );
}

#[test]
fn unfamiliar_structure_is_zero_day_but_benign() {
    let elf = padded_elf();
    let extraction = FeatureExtractor::new(ScanConfig::default().features)
        .extract_bytes(&elf)
        .unwrap();
    assert_eq!(extraction.report.structure.format(), Some(FormatKind::Elf));

    let verdict = scan_verdict(elf, "tool.bin");
    assert!(verdict.is_zero_day);
    assert_eq!(verdict.label, Label::Benign);
    assert!(verdict.explanation.model_decision.contains("zero-day"));
    assert!(verdict
        .explanation
        .risk_factors
        .iter()
        .any(|r| r.contains("zero-day")));
}

#[test]
fn high_entropy_input_is_malicious() {
    let verdict = scan_verdict(random_bytes(16 * 1024, 11), "blob.bin");
    assert_eq!(verdict.label, Label::Malicious);
    assert!(verdict.classifier_probability > 0.9);
    let top = &verdict.explanation.feature_importance;
    assert!(!top.is_empty());
    assert_eq!(top[0].feature_name, "global_entropy");
    assert_eq!(top[0].importance, 1.0);
}

#[test]
fn batch_scan_keeps_order_and_errors() {
    let scanner = common::scanner();
    let batch = vec![
        artifact(vec![0u8; 512], "a.bin"),
        artifact(Vec::new(), "b.bin"),
        artifact(random_bytes(4096, 3), "c.bin"),
    ];
    let results = scanner.scan_many(&batch, &CancellationToken::new());
    assert_eq!(results.len(), 3);
    assert_eq!(
        results[0].as_ref().unwrap().verdict().unwrap().label,
        Label::Benign
    );
    assert!(matches!(results[1], Err(ScanError::EmptyInput)));
    assert_eq!(
        results[2].as_ref().unwrap().verdict().unwrap().label,
        Label::Malicious
    );
}
