//! JSON Output Envelope Types
//!
//! This module defines the structured JSON written to stdout.
//!
//! # Output Contract
//! - Run: `{"ok": ..., "command": "add-article", "results": [...], "meta": {...}}`
//! - Setup error: `{"ok": false, "command": "...", "error": {"code": "...", "message": "..."}}`
//!
//! `ok` is true only when no target failed. Each entry of `results` is one
//! target's outcome, in the order the targets were given.

use serde::{Deserialize, Serialize};

use crate::article::ArticleDescriptor;
use crate::engine::ArticleInfo;
use crate::error::{ArticleError, ErrorCategory};

/// Outcome of one target's pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TargetOutcome {
    /// Article created; `article` is the server's read-back
    Created {
        instance: String,
        article: ArticleInfo,
        refreshed: bool,
    },

    /// Simulate-only run; nothing was changed on the server
    Simulated { instance: String, plan: ArticlePlan },

    /// Pipeline stopped for this target
    Failed { instance: String, failure: TargetFailure },
}

impl TargetOutcome {
    #[must_use]
    pub fn instance(&self) -> &str {
        match self {
            Self::Created { instance, .. }
            | Self::Simulated { instance, .. }
            | Self::Failed { instance, .. } => instance,
        }
    }

    #[must_use]
    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// Failure record, if this target failed
    #[must_use]
    pub const fn failure(&self) -> Option<&TargetFailure> {
        match self {
            Self::Failed { failure, .. } => Some(failure),
            _ => None,
        }
    }
}

/// What a simulate-only run would have done
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticlePlan {
    /// Descriptor as it would have been committed
    pub article: ArticleDescriptor,

    /// One line per state-changing site, in pipeline order
    pub actions: Vec<String>,

    pub would_refresh: bool,
}

/// Per-target failure record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetFailure {
    /// Stable error code (e.g., "LOOKUP_ERROR")
    pub code: String,

    pub category: ErrorCategory,

    /// Summary naming the instance, publication and article involved
    pub message: String,

    /// Underlying error text, only reported in strict mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl TargetFailure {
    /// Build a failure record from a summary and the error behind it
    pub fn new(summary: impl Into<String>, err: &ArticleError, strict: bool) -> Self {
        Self {
            code: err.error_code().to_string(),
            category: err.category(),
            message: summary.into(),
            detail: strict.then(|| err.message()),
        }
    }
}

/// Envelope for a whole run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunEnvelope {
    /// True when no target failed
    pub ok: bool,

    pub command: String,

    pub results: Vec<TargetOutcome>,

    pub meta: Metadata,
}

impl RunEnvelope {
    /// Create a run envelope, deriving `ok` and the counters from `results`
    pub fn new(command: impl Into<String>, results: Vec<TargetOutcome>, execution_ms: u64) -> Self {
        let meta = Metadata::summarize(&results, execution_ms);
        Self { ok: meta.failed == 0, command: command.into(), results, meta }
    }
}

/// Execution metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Execution time in milliseconds
    pub execution_ms: u64,

    pub targets: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub simulated: usize,
}

impl Metadata {
    fn summarize(results: &[TargetOutcome], execution_ms: u64) -> Self {
        let mut meta =
            Self { execution_ms, targets: results.len(), succeeded: 0, failed: 0, simulated: 0 };
        for outcome in results {
            match outcome {
                TargetOutcome::Created { .. } => meta.succeeded += 1,
                TargetOutcome::Simulated { .. } => meta.simulated += 1,
                TargetOutcome::Failed { .. } => meta.failed += 1,
            }
        }
        meta
    }
}

/// Envelope for failures that happen before any target runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    /// Always false for error envelopes
    pub ok: bool,

    pub command: String,

    pub error: ErrorInfo,
}

impl ErrorEnvelope {
    pub fn new(command: impl Into<String>, error: ErrorInfo) -> Self {
        Self { ok: false, command: command.into(), error }
    }
}

/// Error information structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Stable error code (e.g., "CONFIG_ERROR")
    pub code: String,

    /// Human-readable error message (no credentials)
    pub message: String,
}

impl ErrorInfo {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self { code: code.into(), message: message.into() }
    }
}
