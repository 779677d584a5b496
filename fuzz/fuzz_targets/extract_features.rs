#![no_main]
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let extractor = malscope::FeatureExtractor::new(malscope::config::FeatureConfig::default());
    if let Ok(e) = extractor.extract_bytes(data) {
        assert_eq!(e.vector.len(), extractor.feature_size());
        assert!(e.vector.iter().all(|v| v.is_finite()));
    }
});
