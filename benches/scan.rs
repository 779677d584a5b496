use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use malscope::config::FeatureConfig;
use malscope::features::{FeatureLayout, FeatureVector};
use malscope::model::ModelShape;
use malscope::novelty::ForestParams;
use malscope::{
    CancellationToken, FeatureExtractor, HybridModel, LoadedModels, NoveltyDetector, RawArtifact,
    ScanConfig, Scanner,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

fn scanner(rng: &mut StdRng) -> Scanner {
    let config = ScanConfig::default();
    let layout = FeatureLayout::new(&FeatureConfig::default());
    let mut classifier = HybridModel::zeroed(&layout, ModelShape::default());
    for w in classifier.hidden.weights.iter_mut() {
        *w = rng.gen_range(-0.1..0.1);
    }
    for w in classifier.output.weights.iter_mut() {
        *w = rng.gen_range(-0.5..0.5);
    }

    let extractor = FeatureExtractor::new(config.features.clone());
    let benign: Vec<FeatureVector> = (0..64)
        .map(|i| {
            let text: Vec<u8> = (0..2048).map(|j| b"abcdefgh \n"[(i + j * 7) % 10]).collect();
            extractor.extract_bytes(&text).unwrap().vector
        })
        .collect();
    let novelty = NoveltyDetector::fit(&benign, &ForestParams::default()).unwrap();
    let models = LoadedModels::new(Arc::new(classifier), novelty);
    Scanner::new(config, Arc::new(models)).unwrap()
}

fn bench_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("scan");
    let mut rng = StdRng::seed_from_u64(7);
    let scanner = scanner(&mut rng);
    let token = CancellationToken::new();
    for size in [16 * 1024, 1024 * 1024] {
        let mut data = vec![0u8; size];
        rng.fill(&mut data[..]);
        let artifact = RawArtifact::new(data, "bench.bin");
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_function(format!("{size}_bytes"), |b| {
            b.iter(|| scanner.scan(&artifact, &token))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_scan);
criterion_main!(benches);
