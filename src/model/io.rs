//! JSON model file reading and writing.
//!
//! Read failures of any kind (missing file, bad JSON) map to
//! [`ScanError::ModelUnavailable`]: a scan cannot run without its models.

use crate::error::{Result, ScanError};
use crate::hashing::blake3_digest;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use tracing::error;

/// Read a model file and return it with the BLAKE3 fingerprint of its bytes.
pub fn read_model<T: DeserializeOwned>(path: &Path, model: &str) -> Result<(T, String)> {
    let bytes = std::fs::read(path).map_err(|e| {
        error!(model, path = %path.display(), error = %e, "Model file unreadable");
        ScanError::model_unavailable(model, format!("{}: {e}", path.display()))
    })?;
    let value = serde_json::from_slice(&bytes).map_err(|e| {
        error!(model, path = %path.display(), error = %e, "Model file corrupt");
        ScanError::model_unavailable(model, format!("{}: {e}", path.display()))
    })?;
    Ok((value, blake3_digest(&bytes)))
}

/// Write a model as JSON and return the fingerprint of the written bytes.
pub fn write_model<T: Serialize>(path: &Path, value: &T) -> Result<String> {
    let bytes = serde_json::to_vec(value)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, &bytes)?;
    Ok(blake3_digest(&bytes))
}

/// Reject non-finite parameters.
pub(crate) fn ensure_finite(model: &str, what: &str, values: &[f32]) -> Result<()> {
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(ScanError::model_unavailable(
            model,
            format!("{what} contains non-finite values"),
        ))
    }
}
