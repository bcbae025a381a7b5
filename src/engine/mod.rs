//! Replication Server Traits and Core Types
//!
//! This module defines the seam between the provisioning pipeline and the
//! database server. The pipeline only issues logical operations (look up a
//! publication, check/create/read an article, refresh subscriptions); the wire
//! protocol belongs to the implementation behind these traits.
//!
//! # Connection Model
//! A [`ServerResolver`] turns an instance identifier plus credential into a
//! connected [`ReplicationServer`]. Each target gets its own connection, and
//! the connection is dropped when that target's pipeline run ends.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;

use crate::article::{ArticleDescriptor, ArticleKind, CreationScriptOptions};
use crate::error::Result;

// SQL Server implementation (TDS via tiberius)
#[cfg(feature = "mssql")]
pub mod mssql;

/// Login credential for a server
#[derive(Clone)]
pub struct Credential {
    pub user: String,

    /// WARNING: Sensitive data, do not log or include in error messages
    pub password: String,
}

impl Credential {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self { user: user.into(), password: password.into() }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential").field("user", &self.user).field("password", &"***").finish()
    }
}

/// Replication kind of a publication
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PublicationKind {
    Transactional,
    Snapshot,
    Merge,
    /// Reported by the server but not one this tool can add articles to
    Unrecognized(String),
}

impl PublicationKind {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Transactional => "transactional",
            Self::Snapshot => "snapshot",
            Self::Merge => "merge",
            Self::Unrecognized(raw) => raw,
        }
    }
}

impl fmt::Display for PublicationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Publication metadata, read-only to the pipeline
///
/// A publication that does not exist is reported as `None` by
/// [`ReplicationServer::lookup_publication`], so a value of this type always
/// describes an existing publication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicationMetadata {
    pub name: String,
    pub database: String,
    pub kind: PublicationKind,
}

/// Article as read back from the server after creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleInfo {
    pub name: String,
    pub kind: ArticleKind,
    pub instance: String,
    pub database: String,
    pub publication: String,
    pub source_schema: String,
    pub source_object: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_clause: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_options: Option<CreationScriptOptions>,
}

/// Connects to servers
pub trait ServerResolver {
    type Server: ReplicationServer;

    /// Open a connection to `instance`
    ///
    /// Any failure is a `Connection` error.
    fn resolve(
        &self,
        instance: &str,
        credential: Option<&Credential>,
    ) -> impl Future<Output = Result<Self::Server>> + Send;
}

/// Logical replication operations against one connected server
///
/// Every method is a single blocking round trip from the pipeline's point of
/// view: the pipeline awaits it before moving to the next step.
pub trait ReplicationServer {
    /// Instance identifier this connection was opened for
    fn instance(&self) -> &str;

    /// Look up a publication; `Ok(None)` when it does not exist
    fn lookup_publication(
        &mut self,
        database: &str,
        publication: &str,
    ) -> impl Future<Output = Result<Option<PublicationMetadata>>> + Send;

    /// Whether an article with the descriptor's name exists in its publication
    fn article_exists(
        &mut self,
        article: &ArticleDescriptor,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Create the article described by `article`
    fn create_article(
        &mut self,
        article: &ArticleDescriptor,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Re-evaluate which articles the publication's subscriptions receive
    fn refresh_subscriptions(
        &mut self,
        database: &str,
        publication: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Read an article back from the server; `Ok(None)` when it does not exist
    fn read_article(
        &mut self,
        kind: ArticleKind,
        database: &str,
        publication: &str,
        article: &str,
    ) -> impl Future<Output = Result<Option<ArticleInfo>>> + Send;
}
