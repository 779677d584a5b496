#![no_main]
use libfuzzer_sys::fuzz_target;
use malscope::config::HeuristicsConfig;
use malscope::features::parse_structure;
use malscope::{HeuristicAnalyzer, RawArtifact};

fuzz_target!(|data: &[u8]| {
    let Ok(analyzer) = HeuristicAnalyzer::from_config(&HeuristicsConfig::default()) else {
        return;
    };
    let structure = parse_structure(data);
    let artifact = RawArtifact::new(data.to_vec(), "fuzz.exe");
    let findings = analyzer.analyze(&artifact, &structure);
    assert!(findings.windows(2).all(|w| w[0].offset <= w[1].offset));
});
