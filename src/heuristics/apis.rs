//! Suspicious API names with normalization.

use std::collections::HashSet;

/// Normalize a Windows/C API function name to a canonical base for matching.
/// - Strips leading underscores
/// - Strips stdcall suffix like `@N`
/// - Strips ANSI/Wide suffix `A`/`W` when present (CreateFileA/W)
/// - Lowercases the result
pub fn normalize_api_name(name: &str) -> String {
    let mut s = name.trim().trim_start_matches('_');
    if let Some(at) = s.rfind('@') {
        if s[at + 1..].chars().all(|c| c.is_ascii_digit()) {
            s = &s[..at];
        }
    }
    let bytes = s.as_bytes();
    if bytes.len() > 1 {
        let last = bytes[bytes.len() - 1];
        let pen = bytes[bytes.len() - 2];
        if (last == b'A' || last == b'W') && pen.is_ascii_lowercase() {
            s = &s[..s.len() - 1];
        }
    }
    s.to_ascii_lowercase()
}

/// Suspicious API base names (lowercase, normalized).
pub const SUSPICIOUS_APIS: &[&str] = &[
    // Process creation and injection
    "createprocess",
    "createremotethread",
    "createremotethreadex",
    "writeprocessmemory",
    "readprocessmemory",
    "openprocess",
    "queueuserapc",
    "ntqueueapcthread",
    "setthreadcontext",
    "ntwritevirtualmemory",
    // Memory allocation / protection
    "virtualalloc",
    "virtualallocex",
    "virtualprotect",
    "virtualprotectex",
    "ntallocatevirtualmemory",
    "ntmapviewofsection",
    // Dynamic loading
    "loadlibrary",
    "loadlibraryex",
    "getprocaddress",
    "ldrloaddll",
    // Execution
    "winexec",
    "shellexecute",
    "shellexecuteex",
    // Anti-debugging
    "isdebuggerpresent",
    "checkremotedebuggerpresent",
    "ntqueryinformationprocess",
    // Privileges / tokens
    "adjusttokenprivileges",
    "openprocesstoken",
    // Network
    "internetopen",
    "internetopenurl",
    "urldownloadtofile",
    "winhttpopen",
    // Persistence / hooks
    "setwindowshookex",
    "regsetvalueex",
    "createservice",
    // Unix/Linux
    "ptrace",
    "dlopen",
    "mprotect",
    "execve",
];

/// Whether a raw symbol name normalizes to a suspicious API.
pub fn is_suspicious_api(name: &str) -> bool {
    SUSPICIOUS_APIS.contains(&normalize_api_name(name).as_str())
}

/// Deduplicated, normalized suspicious names from a list of imports,
/// in first-seen order.
pub fn detect_suspicious_imports<S: AsRef<str>>(names: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .iter()
        .map(|n| normalize_api_name(n.as_ref()))
        .filter(|base| SUSPICIOUS_APIS.contains(&base.as_str()))
        .filter(|base| seen.insert(base.clone()))
        .collect()
}
