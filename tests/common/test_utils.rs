//! Temporary file helpers for configuration and model files.

use malscope::{HybridModel, NoveltyDetector};
use std::io::Write;
use std::path::PathBuf;
use tempfile::{NamedTempFile, TempDir};

/// Creates a temporary file with the given content.
///
/// The file is removed when the returned `NamedTempFile` is dropped.
pub fn create_temp_file(content: &[u8]) -> NamedTempFile {
    let mut temp_file = NamedTempFile::new().unwrap();
    temp_file.write_all(content).unwrap();
    temp_file
}

/// Model files written into a temporary directory.
pub struct ModelFiles {
    pub dir: TempDir,
    pub classifier: PathBuf,
    pub novelty: PathBuf,
}

/// Save both models under a fresh temporary directory.
///
/// # Panics
///
/// Panics if either model fails validation or cannot be written.
pub fn write_models(mut classifier: HybridModel, mut novelty: NoveltyDetector) -> ModelFiles {
    let dir = TempDir::new().unwrap();
    let classifier_path = dir.path().join("models/classifier.json");
    let novelty_path = dir.path().join("models/novelty.json");
    classifier.save(&classifier_path).unwrap();
    novelty.save(&novelty_path).unwrap();
    ModelFiles {
        dir,
        classifier: classifier_path,
        novelty: novelty_path,
    }
}
