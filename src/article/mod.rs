//! Article Descriptors
//!
//! Building and configuring the in-memory description of an article before it
//! is committed to the server.
//!
//! # Variants
//! The descriptor variant is chosen from the publication kind by a single
//! mapping ([`ArticleKind::for_publication`]):
//! - Transactional, Snapshot → [`ArticleKind::LogBased`]
//! - Merge → [`ArticleKind::TableBased`]
//! - anything else → construction error

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::engine::{PublicationKind, PublicationMetadata};
use crate::error::{ArticleError, Result};

pub mod options;

pub use options::{CreationScriptOptions, ScriptOption};

/// Longest identifier the server accepts (`sysname`)
const MAX_IDENTIFIER_LEN: usize = 128;

/// Longest filter a merge article can store (`nvarchar(1000)`)
const MAX_MERGE_FILTER_LEN: usize = 1000;

/// Article variant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArticleKind {
    /// Log-reader based article (transactional and snapshot publications)
    LogBased,
    /// Table based article (merge publications)
    TableBased,
}

impl ArticleKind {
    /// Select the article variant for a publication kind
    pub fn for_publication(kind: &PublicationKind) -> Result<Self> {
        match kind {
            PublicationKind::Transactional | PublicationKind::Snapshot => Ok(Self::LogBased),
            PublicationKind::Merge => Ok(Self::TableBased),
            PublicationKind::Unrecognized(raw) => Err(ArticleError::construction(format!(
                "Unsupported publication kind '{raw}'"
            ))),
        }
    }

    /// Whether subscriptions must be refreshed after adding an article
    ///
    /// Push-style (log based) subscriptions only pick up new articles after a
    /// refresh; merge subscribers discover them on their next synchronization.
    #[must_use]
    pub const fn requires_refresh(self) -> bool {
        matches!(self, Self::LogBased)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LogBased => "log_based",
            Self::TableBased => "table_based",
        }
    }
}

impl fmt::Display for ArticleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// In-memory article description, mutable until committed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleDescriptor {
    pub kind: ArticleKind,

    /// Instance whose connection this descriptor is bound to
    pub instance: String,

    pub name: String,
    pub database: String,
    pub source_schema: String,
    pub source_object: String,
    pub publication: String,

    /// Bare predicate, without the `WHERE` keyword
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_clause: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_options: Option<CreationScriptOptions>,

    /// Existence as last reported by the server, `None` until checked
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exists: Option<bool>,
}

/// Build an article descriptor for `publication`
///
/// The article is named after its source object. Identity fields are always
/// populated; optional fields are left for [`configure_article`].
pub fn build_article(
    instance: &str,
    publication: &PublicationMetadata,
    schema: &str,
    object: &str,
) -> Result<ArticleDescriptor> {
    let kind = ArticleKind::for_publication(&publication.kind)?;

    for (field, value) in [
        ("article name", object),
        ("source schema", schema),
        ("database", publication.database.as_str()),
        ("publication", publication.name.as_str()),
    ] {
        check_identifier(field, value).map_err(|detail| {
            ArticleError::construction(format!(
                "Cannot build article '{object}' for publication '{}': {detail}",
                publication.name
            ))
        })?;
    }

    Ok(ArticleDescriptor {
        kind,
        instance: instance.to_string(),
        name: object.to_string(),
        database: publication.database.clone(),
        source_schema: schema.to_string(),
        source_object: object.to_string(),
        publication: publication.name.clone(),
        filter_clause: None,
        creation_options: None,
        exists: None,
    })
}

/// Apply optional fields: creation options first, then the filter
///
/// Errors name the field that could not be applied.
pub fn configure_article(
    article: &mut ArticleDescriptor,
    creation_options: Option<&CreationScriptOptions>,
    filter: Option<&str>,
) -> Result<()> {
    if let Some(options) = creation_options {
        apply_creation_options(article, options)?;
    }

    if let Some(filter) = filter {
        apply_filter(article, filter)?;
    }

    Ok(())
}

fn apply_creation_options(
    article: &mut ArticleDescriptor,
    options: &CreationScriptOptions,
) -> Result<()> {
    if article.kind == ArticleKind::TableBased {
        let unsupported: Vec<String> = options
            .options
            .iter()
            .filter(|opt| opt.is_log_based_only())
            .map(|opt| format!("{opt:?}"))
            .collect();

        if !unsupported.is_empty() {
            return Err(ArticleError::configuration(
                "creation_options",
                format!(
                    "{} cannot be used with merge article '{}'",
                    unsupported.join(", "),
                    article.name
                ),
            ));
        }
    }

    article.creation_options = Some(options.clone());
    Ok(())
}

fn apply_filter(article: &mut ArticleDescriptor, filter: &str) -> Result<()> {
    let predicate = filter.trim();

    if predicate.is_empty() {
        return Err(ArticleError::configuration("filter", "Filter clause cannot be empty"));
    }

    if has_statement_separator(predicate) {
        return Err(ArticleError::configuration(
            "filter",
            "Filter clause must be a single predicate, statement separators are not allowed",
        ));
    }

    if article.kind == ArticleKind::TableBased && predicate.chars().count() > MAX_MERGE_FILTER_LEN {
        return Err(ArticleError::configuration(
            "filter",
            format!("Merge article filters are limited to {MAX_MERGE_FILTER_LEN} characters"),
        ));
    }

    article.filter_clause = Some(predicate.to_string());
    Ok(())
}

fn check_identifier(field: &str, value: &str) -> std::result::Result<(), String> {
    if value.trim().is_empty() {
        return Err(format!("{field} cannot be empty"));
    }
    if value.chars().count() > MAX_IDENTIFIER_LEN {
        return Err(format!("{field} exceeds {MAX_IDENTIFIER_LEN} characters"));
    }
    Ok(())
}

/// Whether `sql` contains a `;` outside literals, quoted identifiers and comments
fn has_statement_separator(sql: &str) -> bool {
    let mut chars = sql.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            ';' => return true,
            '\'' => {
                // String literal; '' is an escaped quote and just re-enters the literal
                for ch in chars.by_ref() {
                    if ch == '\'' {
                        break;
                    }
                }
            }
            '[' => {
                // Quoted identifier; ]] is an escaped bracket inside it
                while let Some(ch) = chars.next() {
                    if ch == ']' {
                        if chars.peek() == Some(&']') {
                            chars.next();
                            continue;
                        }
                        break;
                    }
                }
            }
            '"' => {
                for ch in chars.by_ref() {
                    if ch == '"' {
                        break;
                    }
                }
            }
            '-' if chars.peek() == Some(&'-') => {
                for ch in chars.by_ref() {
                    if ch == '\n' {
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = ' ';
                for ch in chars.by_ref() {
                    if prev == '*' && ch == '/' {
                        break;
                    }
                    prev = ch;
                }
            }
            _ => {}
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn publication(kind: PublicationKind) -> PublicationMetadata {
        PublicationMetadata {
            name: "testPub".to_string(),
            database: "Northwind".to_string(),
            kind,
        }
    }

    fn log_based() -> ArticleDescriptor {
        build_article("srv1", &publication(PublicationKind::Transactional), "dbo", "publishers")
            .unwrap()
    }

    fn table_based() -> ArticleDescriptor {
        build_article("srv1", &publication(PublicationKind::Merge), "dbo", "publishers").unwrap()
    }

    // Builder tests

    #[test]
    fn test_transactional_and_snapshot_are_log_based() {
        for kind in [PublicationKind::Transactional, PublicationKind::Snapshot] {
            let article = build_article("srv1", &publication(kind), "dbo", "publishers").unwrap();
            assert_eq!(article.kind, ArticleKind::LogBased);
        }
    }

    #[test]
    fn test_merge_is_table_based() {
        assert_eq!(table_based().kind, ArticleKind::TableBased);
    }

    #[test]
    fn test_unrecognized_kind_is_construction_error() {
        let err = build_article(
            "srv1",
            &publication(PublicationKind::Unrecognized("repl_freq:7".into())),
            "dbo",
            "publishers",
        )
        .unwrap_err();
        assert!(matches!(err, ArticleError::Construction(_)));
        assert!(err.message().contains("repl_freq:7"));
    }

    #[test]
    fn test_identity_fields_populated() {
        let article = log_based();
        assert_eq!(article.instance, "srv1");
        assert_eq!(article.name, "publishers");
        assert_eq!(article.source_object, "publishers");
        assert_eq!(article.source_schema, "dbo");
        assert_eq!(article.database, "Northwind");
        assert_eq!(article.publication, "testPub");
        assert_eq!(article.filter_clause, None);
        assert_eq!(article.creation_options, None);
        assert_eq!(article.exists, None);
    }

    #[test]
    fn test_empty_object_name_names_article_and_publication() {
        let err = build_article("srv1", &publication(PublicationKind::Transactional), "dbo", " ")
            .unwrap_err();
        assert!(matches!(err, ArticleError::Construction(_)));
        assert!(err.message().contains("testPub"));
        assert!(err.message().contains("article name cannot be empty"));
    }

    #[test]
    fn test_overlong_schema_rejected() {
        let schema = "s".repeat(129);
        let err = build_article("srv1", &publication(PublicationKind::Merge), &schema, "t")
            .unwrap_err();
        assert!(err.message().contains("source schema exceeds 128"));
    }

    #[test]
    fn test_refresh_requirement() {
        assert!(ArticleKind::LogBased.requires_refresh());
        assert!(!ArticleKind::TableBased.requires_refresh());
    }

    // Configurator tests

    #[test]
    fn test_filter_stored_without_where() {
        let mut article = log_based();
        configure_article(&mut article, None, Some("city = 'seattle'")).unwrap();
        assert_eq!(article.filter_clause.as_deref(), Some("city = 'seattle'"));
    }

    #[test]
    fn test_options_applied() {
        let mut article = log_based();
        let opts = CreationScriptOptions::recommended();
        configure_article(&mut article, Some(&opts), None).unwrap();
        assert_eq!(article.creation_options, Some(opts));
        assert_eq!(article.filter_clause, None);
    }

    #[test]
    fn test_log_based_only_options_rejected_for_merge() {
        let mut article = table_based();
        let opts = CreationScriptOptions::new([ScriptOption::PrimaryObject, ScriptOption::KeepTimestamp]);
        let err = configure_article(&mut article, Some(&opts), Some("x = 1")).unwrap_err();
        assert_eq!(
            err,
            ArticleError::configuration(
                "creation_options",
                "KeepTimestamp cannot be used with merge article 'publishers'"
            )
        );
        // Options are applied before the filter, so the filter was never set
        assert_eq!(article.filter_clause, None);
    }

    #[test]
    fn test_empty_filter_rejected() {
        let mut article = log_based();
        let err = configure_article(&mut article, None, Some("   ")).unwrap_err();
        assert!(matches!(err, ArticleError::Configuration { ref field, .. } if field == "filter"));
    }

    #[test]
    fn test_multi_statement_filter_rejected() {
        let mut article = log_based();
        let err =
            configure_article(&mut article, None, Some("1 = 1; DROP TABLE publishers")).unwrap_err();
        assert!(matches!(err, ArticleError::Configuration { ref field, .. } if field == "filter"));
    }

    #[test]
    fn test_semicolons_in_literals_and_comments_allowed() {
        let mut article = log_based();
        configure_article(&mut article, None, Some("name = 'a;b' /* ; */ AND [odd;col] = 1 -- ;"))
            .unwrap();
        assert!(article.filter_clause.is_some());
    }

    #[test]
    fn test_escaped_bracket_in_identifier_allowed() {
        let mut article = log_based();
        configure_article(&mut article, None, Some("[a]];b] = 1")).unwrap();
        assert_eq!(article.filter_clause.as_deref(), Some("[a]];b] = 1"));

        let mut article = log_based();
        let err = configure_article(&mut article, None, Some("[a]]] = 1; DROP TABLE x")).unwrap_err();
        assert!(matches!(err, ArticleError::Configuration { ref field, .. } if field == "filter"));
    }

    #[test]
    fn test_merge_filter_length_limit() {
        let mut article = table_based();
        let long = format!("name = '{}'", "x".repeat(1000));
        let err = configure_article(&mut article, None, Some(&long)).unwrap_err();
        assert!(err.message().contains("1000"));

        let mut article = log_based();
        assert!(configure_article(&mut article, None, Some(&long)).is_ok());
    }
}
