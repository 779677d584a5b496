//! Cooperative cancellation and scan timeouts.
//!
//! A [`CancellationToken`] is checked by the scan pipeline between stages.
//! Tripping it makes the scan return [`ScanOutcome::Incomplete`] instead of a
//! partial verdict. [`scan_with_timeout`] runs a scan on tokio's blocking
//! pool under a wall-clock budget and trips the token when the budget is
//! exhausted.

use crate::artifact::RawArtifact;
use crate::config::LimitsConfig;
use crate::engine::{ScanOutcome, Scanner, Stage};
use crate::error::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, warn};

/// Default scan budget in seconds
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

/// Shared cancellation flag with an optional deadline.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token that reports cancellation once `budget` has elapsed.
    pub fn with_deadline(budget: Duration) -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            deadline: Instant::now().checked_add(budget),
        }
    }

    /// Trip the token. Every clone observes it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
            || self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

/// Timeout configuration for a scan.
#[derive(Debug, Clone)]
pub struct TimeoutConfig {
    /// Maximum duration for the scan
    pub duration: Duration,
    /// Whether to log timeout warnings
    pub log_warnings: bool,
}

impl TimeoutConfig {
    pub fn new(seconds: u64) -> Self {
        Self::from_duration(Duration::from_secs(seconds))
    }

    pub fn from_duration(duration: Duration) -> Self {
        Self {
            duration,
            log_warnings: true,
        }
    }

    pub fn from_limits(limits: &LimitsConfig) -> Self {
        Self::new(limits.scan_timeout_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT_SECONDS)
    }
}

/// Run one scan on the blocking pool with a time budget.
///
/// On timeout the scan's token is tripped so the worker stops at its next
/// stage boundary, and `Incomplete { stage: TimedOut }` is returned.
pub async fn scan_with_timeout(
    scanner: Scanner,
    artifact: RawArtifact,
    config: TimeoutConfig,
) -> Result<ScanOutcome> {
    let token = CancellationToken::new();
    let worker_token = token.clone();
    debug!(
        file = artifact.filename(),
        budget_ms = config.duration.as_millis() as u64,
        "Starting scan with timeout"
    );
    let handle = tokio::task::spawn_blocking(move || scanner.scan(&artifact, &worker_token));

    match timeout(config.duration, handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_error)) => {
            if join_error.is_panic() {
                std::panic::resume_unwind(join_error.into_panic());
            }
            Ok(ScanOutcome::Incomplete {
                stage: Stage::TimedOut,
            })
        }
        Err(_) => {
            token.cancel();
            if config.log_warnings {
                warn!(
                    seconds = config.duration.as_secs_f64(),
                    "Scan timed out; cancellation requested"
                );
            }
            Ok(ScanOutcome::Incomplete {
                stage: Stage::TimedOut,
            })
        }
    }
}
