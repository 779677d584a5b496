//! Feature vector layout.
//!
//! The layout is computed from [`FeatureConfig`] and maps every slot index to
//! a category, a stable feature name and a human description. Slots past the
//! computed layout are reserved padding.

use crate::config::FeatureConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;

/// Slots of the local entropy summary (max, min, std, high ratio).
pub const ENTROPY_SUMMARY_SLOTS: usize = 4;
/// Slots of content statistics.
pub const CONTENT_SLOTS: usize = 8;
/// Slots of structural descriptors.
pub const STRUCTURE_SLOTS: usize = 32;

const SUMMARY_NAMES: [&str; ENTROPY_SUMMARY_SLOTS] = [
    "local_entropy_max",
    "local_entropy_min",
    "local_entropy_std",
    "high_entropy_ratio",
];

pub(crate) const CONTENT_NAMES: [&str; CONTENT_SLOTS] = [
    "printable_ratio",
    "code_ratio",
    "null_ratio",
    "high_bit_ratio",
    "string_density",
    "log_size",
    "longest_zero_run",
    "distinct_bytes",
];

pub(crate) const STRUCTURE_NAMES: [&str; STRUCTURE_SLOTS] = [
    "format_pe",
    "format_elf",
    "format_macho",
    "format_coff",
    "format_zip",
    "format_apk",
    "format_jar",
    "format_ooxml",
    "format_pdf",
    "format_ole",
    "is_64bit",
    "section_count",
    "executable_section_ratio",
    "writable_executable_sections",
    "max_section_entropy",
    "mean_section_entropy",
    "entry_outside_code",
    "import_count",
    "suspicious_import_count",
    "suspicious_import_ratio",
    "overlay_ratio",
    "has_symbols",
    "archive_entries",
    "embedded_code",
    "pdf_objects",
    "active_content",
    "macros",
    "code_size_ratio",
    "structure_reserved_28",
    "structure_reserved_29",
    "structure_reserved_30",
    "structure_reserved_31",
];

/// Coarse family a feature slot belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureCategory {
    ByteFrequency,
    Bigram,
    Trigram,
    GlobalEntropy,
    LocalEntropy,
    EntropySummary,
    Content,
    Structure,
    Reserved,
}

impl FeatureCategory {
    /// Phrase used in model decision text.
    pub fn label(&self) -> &'static str {
        match self {
            FeatureCategory::ByteFrequency => "byte frequency distribution",
            FeatureCategory::Bigram => "2-gram byte patterns",
            FeatureCategory::Trigram => "3-gram byte patterns",
            FeatureCategory::GlobalEntropy => "overall entropy",
            FeatureCategory::LocalEntropy => "local entropy profile",
            FeatureCategory::EntropySummary => "entropy distribution",
            FeatureCategory::Content => "content statistics",
            FeatureCategory::Structure => "file structure",
            FeatureCategory::Reserved => "reserved features",
        }
    }
}

impl fmt::Display for FeatureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Slot ranges of every sub-vector.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureLayout {
    pub byte_freq: Range<usize>,
    pub bigram: Range<usize>,
    pub trigram: Range<usize>,
    pub global_entropy: usize,
    pub local_entropy: Range<usize>,
    pub entropy_summary: Range<usize>,
    pub content: Range<usize>,
    pub structure: Range<usize>,
    /// Length of the vector before padding or truncation.
    pub computed_len: usize,
    /// Fixed output length.
    pub feature_size: usize,
}

impl FeatureLayout {
    pub fn new(cfg: &FeatureConfig) -> Self {
        let mut cursor = 0usize;
        let mut take = |n: usize| {
            let r = cursor..cursor + n;
            cursor += n;
            r
        };
        let byte_freq = take(256);
        let bigram = take(cfg.bigram_buckets);
        let trigram = take(cfg.trigram_buckets);
        let global_entropy = take(1).start;
        let local_entropy = take(cfg.local_entropy_slots);
        let entropy_summary = take(ENTROPY_SUMMARY_SLOTS);
        let content = take(CONTENT_SLOTS);
        let structure = take(STRUCTURE_SLOTS);
        Self {
            byte_freq,
            bigram,
            trigram,
            global_entropy,
            local_entropy,
            entropy_summary,
            content,
            structure,
            computed_len: cursor,
            feature_size: cfg.feature_size,
        }
    }

    /// Category of slot `index` and its position inside that category.
    pub fn locate(&self, index: usize) -> Option<(FeatureCategory, usize)> {
        if index >= self.feature_size {
            return None;
        }
        let found = [
            (FeatureCategory::ByteFrequency, &self.byte_freq),
            (FeatureCategory::Bigram, &self.bigram),
            (FeatureCategory::Trigram, &self.trigram),
            (FeatureCategory::LocalEntropy, &self.local_entropy),
            (FeatureCategory::EntropySummary, &self.entropy_summary),
            (FeatureCategory::Content, &self.content),
            (FeatureCategory::Structure, &self.structure),
        ]
        .into_iter()
        .find(|(_, r)| r.contains(&index))
        .map(|(cat, r)| (cat, index - r.start));
        Some(match found {
            Some(hit) => hit,
            None if index == self.global_entropy => (FeatureCategory::GlobalEntropy, 0),
            None => (FeatureCategory::Reserved, index - self.computed_len.min(index)),
        })
    }

    /// Category of slot `index`; out-of-range indices are reserved.
    pub fn category(&self, index: usize) -> FeatureCategory {
        self.locate(index)
            .map(|(c, _)| c)
            .unwrap_or(FeatureCategory::Reserved)
    }

    /// Stable, machine-friendly name of slot `index`.
    pub fn feature_name(&self, index: usize) -> String {
        match self.locate(index) {
            Some((FeatureCategory::ByteFrequency, i)) => format!("byte_freq_0x{i:02x}"),
            Some((FeatureCategory::Bigram, i)) => format!("bigram_bucket_{i}"),
            Some((FeatureCategory::Trigram, i)) => format!("trigram_bucket_{i}"),
            Some((FeatureCategory::GlobalEntropy, _)) => "global_entropy".to_string(),
            Some((FeatureCategory::LocalEntropy, i)) => format!("local_entropy_{i}"),
            Some((FeatureCategory::EntropySummary, i)) => SUMMARY_NAMES[i].to_string(),
            Some((FeatureCategory::Content, i)) => CONTENT_NAMES[i].to_string(),
            Some((FeatureCategory::Structure, i)) => STRUCTURE_NAMES[i].to_string(),
            Some((FeatureCategory::Reserved, _)) | None => format!("reserved_{index}"),
        }
    }

    /// Human description of slot `index` holding `value`.
    pub fn describe(&self, index: usize, value: f32) -> String {
        match self.locate(index) {
            Some((FeatureCategory::ByteFrequency, i)) => format!(
                "Byte 0x{i:02x} makes up {:.2}% of the file",
                value * 100.0
            ),
            Some((FeatureCategory::Bigram, i)) => format!(
                "2-gram bucket {i} covers {:.2}% of byte pairs",
                value * 100.0
            ),
            Some((FeatureCategory::Trigram, i)) => format!(
                "3-gram bucket {i} covers {:.2}% of byte triples",
                value * 100.0
            ),
            Some((FeatureCategory::GlobalEntropy, _)) => format!(
                "Overall entropy is {:.2} bits per byte",
                value * 8.0
            ),
            Some((FeatureCategory::LocalEntropy, i)) => format!(
                "Segment {i} has entropy {:.2} bits per byte",
                value * 8.0
            ),
            Some((FeatureCategory::EntropySummary, i)) => match i {
                0 => format!("Highest segment entropy is {:.2} bits per byte", value * 8.0),
                1 => format!("Lowest segment entropy is {:.2} bits per byte", value * 8.0),
                2 => format!("Segment entropy deviation is {:.2} bits", value * 4.0),
                _ => format!("{:.0}% of segments have high entropy", value * 100.0),
            },
            Some((FeatureCategory::Content, i)) => {
                format!("Content statistic {} is {value:.3}", CONTENT_NAMES[i])
            }
            Some((FeatureCategory::Structure, i)) => {
                format!("Structural descriptor {} is {value:.3}", STRUCTURE_NAMES[i])
            }
            Some((FeatureCategory::Reserved, _)) | None => "Reserved feature slot".to_string(),
        }
    }
}
