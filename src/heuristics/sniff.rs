//! Content versus declared-type sniffing.
//!
//! Uses `infer` for content-based detection and `mime_guess` for the
//! declared extension, and reports a finding when the two disagree.

use super::{HeuristicFinding, Severity};
use crate::artifact::RawArtifact;
use tracing::debug;

pub const TYPE_MISMATCH_RULE: &str = "declared_type_mismatch";

/// Coarse type family used to compare content and extension hints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeFamily {
    Executable,
    Archive,
    Pdf,
    OleDocument,
    Image,
    Media,
    Text,
}

impl TypeFamily {
    fn noun(self) -> &'static str {
        match self {
            TypeFamily::Executable => "executable",
            TypeFamily::Archive => "archive",
            TypeFamily::Pdf => "PDF",
            TypeFamily::OleDocument => "OLE document",
            TypeFamily::Image => "image",
            TypeFamily::Media => "media",
            TypeFamily::Text => "text",
        }
    }
}

/// Map a MIME type to its family; `None` for generic or unknown types.
pub fn mime_family(mime: &str) -> Option<TypeFamily> {
    let m = mime.to_ascii_lowercase();
    if m.contains("portable-executable")
        || m.contains("x-msdownload")
        || m.contains("x-executable")
        || m.contains("x-elf")
        || m.contains("x-mach-binary")
        || m.contains("x-sharedlib")
        || m.contains("x-dosexec")
    {
        Some(TypeFamily::Executable)
    } else if m.contains("zip")
        || m.contains("java-archive")
        || m.contains("android.package-archive")
        || m.contains("openxmlformats")
    {
        Some(TypeFamily::Archive)
    } else if m == "application/pdf" {
        Some(TypeFamily::Pdf)
    } else if m.contains("msword") || m.contains("ms-excel") || m.contains("ms-powerpoint") || m.contains("x-ole-storage") {
        Some(TypeFamily::OleDocument)
    } else if m.starts_with("image/") {
        Some(TypeFamily::Image)
    } else if m.starts_with("audio/") || m.starts_with("video/") {
        Some(TypeFamily::Media)
    } else if m.starts_with("text/") {
        Some(TypeFamily::Text)
    } else {
        None
    }
}

/// MIME type sniffed from the content.
pub fn content_mime(data: &[u8]) -> Option<&'static str> {
    infer::get(data).map(|kind| kind.mime_type())
}

/// Compare sniffed content against the declared extension.
pub fn detect_type_mismatch(artifact: &RawArtifact) -> Option<HeuristicFinding> {
    let declared = artifact.declared_mime()?;
    let sniffed = content_mime(artifact.bytes())?;
    let declared_family = mime_family(&declared)?;
    let content_family = mime_family(sniffed)?;
    if declared_family == content_family {
        return None;
    }
    debug!(declared = %declared, sniffed, "Content contradicts declared type");

    let severity = if content_family == TypeFamily::Executable {
        Severity::High
    } else {
        Severity::Medium
    };
    let ext = artifact.declared_extension().unwrap_or_default();
    let head = &artifact.bytes()[..artifact.bytes().len().min(8)];
    Some(HeuristicFinding {
        rule_id: TYPE_MISMATCH_RULE.to_string(),
        description: format!(
            "Declared .{ext} file contains {} content ({sniffed})",
            content_family.noun()
        ),
        severity,
        offset: 0,
        matched: head.to_vec(),
    })
}
