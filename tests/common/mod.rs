//! Shared fixtures for the integration tests.
//!
//! Models are built in memory: a classifier driven only by global entropy and
//! a novelty detector fit on plain English-like text.

#![allow(dead_code)]

pub mod test_utils;

use malscope::features::FeatureLayout;
use malscope::model::ModelShape;
use malscope::novelty::ForestParams;
use malscope::{
    FeatureExtractor, FeatureVector, HybridModel, LoadedModels, NoveltyDetector, RawArtifact,
    ScanConfig, Scanner,
};
use once_cell::sync::Lazy;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;

const WORDS: &[&str] = &[
    "the", "river", "stone", "garden", "letter", "window", "morning", "quiet", "table", "bread",
    "over", "under", "green", "house", "music", "paper", "candle", "orange", "winter", "summer",
    "friend", "road", "north", "little", "market", "evening", "song", "cloud", "field", "and",
];

static BENIGN_NOVELTY: Lazy<NoveltyDetector> = Lazy::new(|| {
    let extractor = FeatureExtractor::new(ScanConfig::default().features);
    let vectors: Vec<FeatureVector> = (0..48)
        .map(|seed| {
            let text = english_text(1024 + seed as usize * 97, seed);
            extractor.extract_bytes(&text).expect("extract benign text").vector
        })
        .collect();
    NoveltyDetector::fit(&vectors, &forest_params()).expect("fit novelty detector")
});

static MODELS: Lazy<Arc<LoadedModels>> = Lazy::new(|| {
    Arc::new(LoadedModels::new(
        Arc::new(entropy_classifier()),
        benign_novelty(),
    ))
});

pub fn forest_params() -> ForestParams {
    ForestParams {
        trees: 64,
        sample_size: 32,
        ..ForestParams::default()
    }
}

pub fn default_layout() -> FeatureLayout {
    FeatureLayout::new(&ScanConfig::default().features)
}

/// Classifier whose probability rises with global entropy:
/// `p = sigmoid(8 * H/8 - 4)`, so p < 0.5 below 4 bits/byte.
pub fn entropy_classifier() -> HybridModel {
    entropy_classifier_for(&default_layout())
}

pub fn entropy_classifier_for(layout: &FeatureLayout) -> HybridModel {
    let mut model = HybridModel::zeroed(layout, ModelShape::default());
    let pos = model
        .tail_position(layout.global_entropy)
        .expect("global entropy feeds the dense head");
    *model.hidden.weight_mut(0, pos) = 1.0;
    *model.output.weight_mut(0, 0) = 8.0;
    model.output.bias[0] = -4.0;
    model
}

/// Novelty detector trained on text buffers only.
pub fn benign_novelty() -> NoveltyDetector {
    BENIGN_NOVELTY.clone()
}

pub fn shared_models() -> Arc<LoadedModels> {
    Arc::clone(&MODELS)
}

pub fn scanner() -> Scanner {
    scanner_with(ScanConfig::default())
}

pub fn scanner_with(config: ScanConfig) -> Scanner {
    Scanner::new(config, shared_models()).expect("build scanner")
}

/// Lower-case words separated by spaces, with a newline every dozen words.
pub fn english_text(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut out = Vec::with_capacity(len + 16);
    let mut count = 0usize;
    while out.len() < len {
        out.extend_from_slice(WORDS[rng.gen_range(0..WORDS.len())].as_bytes());
        count += 1;
        out.push(if count % 12 == 0 { b'\n' } else { b' ' });
    }
    out.truncate(len);
    out
}

pub fn random_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut out = vec![0u8; len];
    rng.fill(&mut out[..]);
    out
}

/// Overwrite `data` at `offset` with `needle`.
pub fn plant(data: &mut [u8], offset: usize, needle: &[u8]) {
    data[offset..offset + needle.len()].copy_from_slice(needle);
}

/// Minimal x86-64 ELF relocatable object followed by 16 KiB of zeros.
pub fn padded_elf() -> Vec<u8> {
    use object::write::{Object, StandardSection, Symbol, SymbolSection};
    use object::{Architecture, BinaryFormat, Endianness, SymbolFlags, SymbolKind, SymbolScope};

    let mut obj = Object::new(BinaryFormat::Elf, Architecture::X86_64, Endianness::Little);
    let text = obj.section_id(StandardSection::Text);
    let code = [0x55, 0x48, 0x89, 0xe5, 0x31, 0xc0, 0x5d, 0xc3];
    let offset = obj.append_section_data(text, &code, 16);
    obj.add_symbol(Symbol {
        name: b"entry_point".to_vec(),
        value: offset,
        size: code.len() as u64,
        kind: SymbolKind::Text,
        scope: SymbolScope::Linkage,
        weak: false,
        section: SymbolSection::Section(text),
        flags: SymbolFlags::None,
    });
    let mut bytes = obj.write().expect("write ELF object");
    bytes.resize(bytes.len() + 16 * 1024, 0);
    bytes
}

pub fn artifact(bytes: Vec<u8>, name: &str) -> RawArtifact {
    RawArtifact::new(bytes, name)
}
