//! Error Handling Infrastructure
//!
//! This module defines the error type used throughout the provisioning pipeline.
//! Every error maps to a stable error code and to a per-target failure category.
//!
//! # Error Categories
//! - `Validation`: Bad input shape, caught before any remote call
//! - `Connection`: Server unreachable or authentication failed
//! - `Lookup`: Publication not found, or the lookup itself failed
//! - `Construction`: Article descriptor could not be built for the publication kind
//! - `Configuration`: An optional article field could not be applied
//! - `Conflict`: The article already exists in the publication
//! - `Creation`: The server rejected the create call
//! - `Refresh`: Subscriber refresh failed after the article was created

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Main error type for provisioning operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArticleError {
    /// Invalid input, rejected before any remote call
    #[error("Validation error: {0}")]
    Validation(String),

    /// Server could not be reached or the login was refused
    #[error("Connection error: {0}")]
    Connection(String),

    /// Publication lookup failed or the publication does not exist
    #[error("Lookup error: {0}")]
    Lookup(String),

    /// Article descriptor could not be built
    #[error("Construction error: {0}")]
    Construction(String),

    /// An optional article field could not be applied
    #[error("Configuration error ({field}): {detail}")]
    Configuration { field: String, detail: String },

    /// Article with the same name already exists in the publication
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Remote create call failed
    #[error("Creation error: {0}")]
    Creation(String),

    /// Subscriber refresh failed (the article itself stays created)
    #[error("Refresh error: {0}")]
    Refresh(String),
}

/// Per-target failure category reported in the output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Validation,
    Connection,
    Lookup,
    Construction,
    Configuration,
    Conflict,
    Creation,
    Refresh,
}

impl ArticleError {
    /// Convert error to error code string for JSON output
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Connection(_) => "CONNECTION_ERROR",
            Self::Lookup(_) => "LOOKUP_ERROR",
            Self::Construction(_) => "CONSTRUCTION_ERROR",
            Self::Configuration { .. } => "CONFIGURATION_ERROR",
            Self::Conflict(_) => "CONFLICT_ERROR",
            Self::Creation(_) => "CREATION_ERROR",
            Self::Refresh(_) => "REFRESH_ERROR",
        }
    }

    /// Failure category for the per-target outcome
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation(_) => ErrorCategory::Validation,
            Self::Connection(_) => ErrorCategory::Connection,
            Self::Lookup(_) => ErrorCategory::Lookup,
            Self::Construction(_) => ErrorCategory::Construction,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::Conflict(_) => ErrorCategory::Conflict,
            Self::Creation(_) => ErrorCategory::Creation,
            Self::Refresh(_) => ErrorCategory::Refresh,
        }
    }

    /// Human-readable error message
    ///
    /// Never contains credentials; driver errors are included verbatim.
    #[must_use]
    pub fn message(&self) -> String {
        self.to_string()
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a connection error
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// Create a lookup error
    pub fn lookup(message: impl Into<String>) -> Self {
        Self::Lookup(message.into())
    }

    /// Create a construction error
    pub fn construction(message: impl Into<String>) -> Self {
        Self::Construction(message.into())
    }

    /// Create a configuration error for the named optional field
    pub fn configuration(field: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Configuration { field: field.into(), detail: detail.into() }
    }

    /// Create a conflict error
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    /// Create a creation error
    pub fn creation(message: impl Into<String>) -> Self {
        Self::Creation(message.into())
    }

    /// Create a refresh error
    pub fn refresh(message: impl Into<String>) -> Self {
        Self::Refresh(message.into())
    }
}

/// Result type alias for provisioning operations
pub type Result<T> = std::result::Result<T, ArticleError>;
