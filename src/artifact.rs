//! The artifact under analysis.

use crate::error::{Result, ScanError};
use crate::hashing::sha256_digest;
use std::path::Path;
use std::sync::Arc;

/// A raw uploaded artifact: its bytes plus the metadata the uploader declared.
///
/// The byte buffer is shared (`Arc<[u8]>`) so the artifact can be cloned
/// cheaply into worker threads; it is never mutated.
#[derive(Debug, Clone)]
pub struct RawArtifact {
    bytes: Arc<[u8]>,
    filename: String,
    declared_extension: Option<String>,
}

impl RawArtifact {
    /// Build an artifact. The declared extension is taken from `filename`.
    pub fn new(bytes: impl Into<Arc<[u8]>>, filename: impl Into<String>) -> Self {
        let filename = filename.into();
        let declared_extension = Path::new(&filename)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        Self {
            bytes: bytes.into(),
            filename,
            declared_extension,
        }
    }

    /// Override the declared extension (e.g. when the upload form reports
    /// a type separately from the filename).
    pub fn with_declared_extension(mut self, ext: impl Into<String>) -> Self {
        let ext = ext.into();
        let ext = ext.trim_start_matches('.').to_ascii_lowercase();
        self.declared_extension = (!ext.is_empty()).then_some(ext);
        self
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn declared_extension(&self) -> Option<&str> {
        self.declared_extension.as_deref()
    }

    /// Size in bytes.
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Hex SHA-256 of the content.
    pub fn sha256(&self) -> String {
        sha256_digest(&self.bytes)
    }

    /// MIME type implied by the declared extension, if any.
    pub fn declared_mime(&self) -> Option<String> {
        let ext = self.declared_extension.as_deref()?;
        mime_guess::from_ext(ext).first().map(|m| m.to_string())
    }

    /// Enforce `0 < size <= limit`.
    pub fn check_size(&self, limit: u64) -> Result<()> {
        if self.bytes.is_empty() {
            return Err(ScanError::EmptyInput);
        }
        if self.size() > limit {
            return Err(ScanError::InputTooLarge {
                size: self.size(),
                limit,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_from_filename() {
        let a = RawArtifact::new(vec![1u8, 2, 3], "Setup.EXE");
        assert_eq!(a.declared_extension(), Some("exe"));
        assert_eq!(a.size(), 3);
        assert_eq!(a.filename(), "Setup.EXE");
    }

    #[test]
    fn explicit_extension_overrides() {
        let a = RawArtifact::new(vec![0u8; 4], "upload").with_declared_extension(".PDF");
        assert_eq!(a.declared_extension(), Some("pdf"));
        assert_eq!(a.declared_mime().as_deref(), Some("application/pdf"));
    }

    #[test]
    fn no_extension_means_no_mime() {
        let a = RawArtifact::new(vec![0u8; 4], "blob");
        assert!(a.declared_extension().is_none());
        assert!(a.declared_mime().is_none());
    }

    #[test]
    fn size_limits() {
        let empty = RawArtifact::new(Vec::<u8>::new(), "x.bin");
        assert!(matches!(empty.check_size(10), Err(ScanError::EmptyInput)));

        let big = RawArtifact::new(vec![0u8; 11], "x.bin");
        let err = big.check_size(10).unwrap_err();
        assert_eq!(err.code(), "E_TOO_LARGE");
        assert!(big.check_size(11).is_ok());
    }

    #[test]
    fn sha256_of_content() {
        let a = RawArtifact::new(b"abc".to_vec(), "a.txt");
        assert_eq!(
            a.sha256(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
