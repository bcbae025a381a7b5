//! repl-article - Replication Article Provisioning
//!
//! Adds a replicated object ("article") to an existing publication on one or
//! more SQL Server publishers, then refreshes push subscriptions so they pick
//! the new article up.
//!
//! # Core Principles
//! - Validate before contacting any server
//! - One independent pipeline run per target server, failures isolated per target
//! - Never create an article twice (existence is checked right before creation)
//! - Return what the server reports, not what was sent
//! - JSON-only stdout, logs on stderr
//!
//! # Module Organization
//! - [`error`] - Error types and failure categories
//! - [`output`] - JSON output envelope and per-target outcomes
//! - [`engine`] - Server traits and the SQL Server implementation
//! - [`validate`] - Parameter validation
//! - [`article`] - Article descriptors, builder and configurator
//! - [`provision`] - The provisioning pipeline
//! - [`config`] - Instance profiles
//! - [`logging`] - tracing-subscriber setup

pub mod article;
pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod output;
pub mod provision;
pub mod validate;

// Re-export commonly used types for convenience
pub use article::{ArticleDescriptor, ArticleKind, CreationScriptOptions, ScriptOption};
pub use engine::{
    ArticleInfo, Credential, PublicationKind, PublicationMetadata, ReplicationServer,
    ServerResolver,
};
pub use error::{ArticleError, ErrorCategory, Result};
pub use output::{ArticlePlan, ErrorEnvelope, ErrorInfo, Metadata, RunEnvelope, TargetFailure, TargetOutcome};
pub use provision::{add_article, ArticleRequest, ReportingMode, RunOptions, Target};
