//! Heuristic rule definitions and rule sets.
//!
//! A rule is a list of byte patterns matched ASCII case-insensitively. Rules
//! may be restricted to structural formats; an empty `formats` list applies
//! the rule to every artifact. Composite rules fire on combinations of pattern
//! rules that fired. Rule sets load from JSON:
//!
//! ```json
//! { "rules": [ { "id": "miner", "description": "Crypto miner pool URL",
//!                "severity": "high", "patterns": ["stratum+tcp://"] } ],
//!   "composites": [ { "id": "miner_download", "description": "Downloads a miner",
//!                     "severity": "high", "requires_all": ["miner", "network_download"] } ] }
//! ```

use crate::error::{Result, ScanError};
use crate::features::FormatKind;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use tracing::info;

/// Ordinal rule severity. Only used additively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low = 1,
    Medium = 2,
    High = 3,
}

impl Severity {
    pub fn weight(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        };
        f.write_str(s)
    }
}

/// One heuristic rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub description: String,
    pub severity: Severity,
    pub patterns: Vec<String>,
    /// Formats the rule is restricted to; empty means all.
    #[serde(default)]
    pub formats: Vec<FormatKind>,
}

impl Rule {
    fn new(id: &str, description: &str, severity: Severity, patterns: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            description: description.to_string(),
            severity,
            patterns: patterns.iter().map(|p| p.to_string()).collect(),
            formats: Vec::new(),
        }
    }

    fn scoped(mut self, formats: &[FormatKind]) -> Self {
        self.formats = formats.to_vec();
        self
    }

    /// Whether the rule applies to an artifact of the given format.
    pub fn applies_to(&self, format: Option<FormatKind>) -> bool {
        self.formats.is_empty() || format.is_some_and(|f| self.formats.contains(&f))
    }
}

/// Rule over the ids of pattern rules that fired.
///
/// Every id in `requires_all` must have fired, and at least one id in
/// `requires_any` when it is non-empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeRule {
    pub id: String,
    pub description: String,
    pub severity: Severity,
    #[serde(default)]
    pub requires_all: Vec<String>,
    #[serde(default)]
    pub requires_any: Vec<String>,
}

impl CompositeRule {
    fn all_of(id: &str, description: &str, severity: Severity, requires: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            description: description.to_string(),
            severity,
            requires_all: requires.iter().map(|r| r.to_string()).collect(),
            requires_any: Vec::new(),
        }
    }

    fn or_any(mut self, requires: &[&str]) -> Self {
        self.requires_any = requires.iter().map(|r| r.to_string()).collect();
        self
    }

    /// Whether the rule holds given a predicate for fired rule ids.
    pub fn matches(&self, fired: impl Fn(&str) -> bool) -> bool {
        self.requires_all.iter().all(|id| fired(id.as_str()))
            && (self.requires_any.is_empty() || self.requires_any.iter().any(|id| fired(id.as_str())))
    }

    /// Every rule id this composite refers to.
    pub fn references(&self) -> impl Iterator<Item = &str> {
        self.requires_all
            .iter()
            .chain(&self.requires_any)
            .map(String::as_str)
    }
}

/// Ordered collection of rules with unique ids.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub composites: Vec<CompositeRule>,
}

impl RuleSet {
    /// Built-in rules.
    pub fn builtin() -> Self {
        use FormatKind::*;
        use Severity::*;
        let rules = vec![
            Rule::new(
                "process_injection",
                "Imports or references process injection APIs",
                High,
                &[
                    "CreateRemoteThread",
                    "WriteProcessMemory",
                    "VirtualAllocEx",
                    "NtUnmapViewOfSection",
                    "QueueUserAPC",
                    "SetThreadContext",
                ],
            ),
            Rule::new(
                "dynamic_loading",
                "Resolves libraries and functions at runtime",
                Medium,
                &["LoadLibrary", "GetProcAddress", "LdrLoadDll"],
            ),
            Rule::new(
                "executable_memory",
                "Allocates or re-protects memory pages",
                Low,
                &["VirtualAlloc", "VirtualProtect", "mprotect"],
            ),
            Rule::new(
                "shell_execution",
                "Launches processes or command shells",
                Medium,
                &["cmd.exe", "WinExec", "ShellExecute", "CreateProcess", "/bin/sh"],
            ),
            Rule::new(
                "network_download",
                "Contains URLs or download routines",
                Medium,
                &["http://", "https://", "ftp://", "URLDownloadToFile", "InternetOpenUrl"],
            ),
            Rule::new(
                "scripting",
                "References PowerShell or script hosts",
                Medium,
                &["powershell", "-encodedcommand", "wscript.shell"],
            ),
            Rule::new(
                "encoded_payload",
                "Contains encoded payload or shellcode markers",
                Medium,
                &["base64", "shellcode", "FromBase64String"],
            ),
            Rule::new(
                "anti_debugging",
                "Checks for an attached debugger",
                Low,
                &["IsDebuggerPresent", "CheckRemoteDebuggerPresent"],
            ),
            Rule::new(
                "persistence",
                "Touches autorun registry keys or scheduled tasks",
                Medium,
                &["CurrentVersion\\Run", "schtasks", "RegSetValueEx"],
            ),
            Rule::new(
                "android_dangerous_permissions",
                "Requests dangerous Android permissions",
                Medium,
                &[
                    "android.permission.SEND_SMS",
                    "android.permission.READ_SMS",
                    "android.permission.RECEIVE_SMS",
                    "android.permission.READ_CONTACTS",
                    "android.permission.RECORD_AUDIO",
                    "android.permission.REQUEST_INSTALL_PACKAGES",
                    "android.permission.BIND_DEVICE_ADMIN",
                ],
            )
            .scoped(&[Apk]),
            Rule::new(
                "pdf_active_content",
                "PDF carries JavaScript or embedded files",
                Medium,
                &["/JavaScript", "/JS", "/EmbeddedFile"],
            )
            .scoped(&[Pdf]),
            Rule::new(
                "pdf_launch_action",
                "PDF launches external programs",
                High,
                &["/Launch"],
            )
            .scoped(&[Pdf]),
            Rule::new(
                "office_macros",
                "Document contains auto-executing macros",
                Medium,
                &["vbaProject.bin", "AutoOpen", "Auto_Open", "Document_Open", "Workbook_Open"],
            )
            .scoped(&[Ooxml, Ole]),
        ];
        let composites = vec![
            CompositeRule::all_of(
                "dynamic_execution",
                "Resolves APIs at runtime and launches processes",
                High,
                &["dynamic_loading", "shell_execution"],
            ),
            CompositeRule::all_of(
                "download_and_execute",
                "Downloads content and runs it through a shell or script host",
                High,
                &["network_download"],
            )
            .or_any(&["shell_execution", "scripting"]),
        ];
        Self { rules, composites }
    }

    /// Load a rule set from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            ScanError::InvalidConfig(format!("pattern file {}: {e}", path.display()))
        })?;
        let set = Self::from_json(&text)?;
        info!(path = %path.display(), rules = set.rules.len(), "Loaded heuristic patterns");
        Ok(set)
    }

    /// Parse and validate a JSON rule set.
    pub fn from_json(text: &str) -> Result<Self> {
        let set: RuleSet = serde_json::from_str(text)
            .map_err(|e| ScanError::InvalidConfig(format!("pattern file: {e}")))?;
        set.validate()?;
        Ok(set)
    }

    /// Append rules, replacing any existing rule with the same id.
    pub fn extend(&mut self, other: RuleSet) {
        for rule in other.rules {
            match self.rules.iter_mut().find(|r| r.id == rule.id) {
                Some(slot) => *slot = rule,
                None => self.rules.push(rule),
            }
        }
        for rule in other.composites {
            match self.composites.iter_mut().find(|r| r.id == rule.id) {
                Some(slot) => *slot = rule,
                None => self.composites.push(rule),
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        let mut ids = HashSet::new();
        let all_ids = self
            .rules
            .iter()
            .map(|r| r.id.as_str())
            .chain(self.composites.iter().map(|c| c.id.as_str()));
        for id in all_ids {
            if id.trim().is_empty() {
                return Err(ScanError::InvalidConfig("rule with empty id".into()));
            }
            if !ids.insert(id) {
                return Err(ScanError::InvalidConfig(format!("duplicate rule id {id}")));
            }
        }
        for rule in &self.rules {
            if rule.patterns.is_empty() || rule.patterns.iter().any(|p| p.is_empty()) {
                return Err(ScanError::InvalidConfig(format!(
                    "rule {} needs non-empty patterns",
                    rule.id
                )));
            }
        }
        for composite in &self.composites {
            if composite.requires_all.is_empty() && composite.requires_any.is_empty() {
                return Err(ScanError::InvalidConfig(format!(
                    "composite rule {} requires nothing",
                    composite.id
                )));
            }
            if let Some(unknown) = composite
                .references()
                .find(|id| !self.rules.iter().any(|r| r.id == *id))
            {
                return Err(ScanError::InvalidConfig(format!(
                    "composite rule {} refers to unknown rule {unknown}",
                    composite.id
                )));
            }
        }
        Ok(())
    }

    /// Number of pattern and composite rules.
    pub fn len(&self) -> usize {
        self.rules.len() + self.composites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty() && self.composites.is_empty()
    }
}
