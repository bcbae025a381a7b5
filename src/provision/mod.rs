//! Article Provisioning Pipeline
//!
//! Adds one article to the same publication on a list of servers. Each target
//! runs the full pipeline on its own connection:
//!
//! 1. validate parameters (no server contact)
//! 2. connect
//! 3. look up the publication
//! 4. build the article descriptor for the publication kind
//! 5. apply creation options, then the filter
//! 6. commit: existence check, create, subscriber refresh for log-based articles
//! 7. read the article back from the server
//!
//! Targets run sequentially. A failure stops that target only; the next target
//! starts from step 1 with nothing carried over.
//!
//! # Simulate mode
//! Read-only steps still run (the publication lookup and the existence check),
//! but create and refresh are never issued. The outcome is an [`ArticlePlan`]
//! listing what would have been done.

use serde_json::Value;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::article::{build_article, configure_article, ArticleDescriptor};
use crate::engine::{ArticleInfo, Credential, ReplicationServer, ServerResolver};
use crate::error::ArticleError;
use crate::output::{ArticlePlan, TargetFailure, TargetOutcome};
use crate::validate::validate_request;

/// Schema used when the caller does not name one
pub const DEFAULT_SCHEMA: &str = "dbo";

/// One server to provision
#[derive(Debug, Clone)]
pub struct Target {
    pub instance: String,
    pub credential: Option<Credential>,
}

impl Target {
    pub fn new(instance: impl Into<String>, credential: Option<Credential>) -> Self {
        Self { instance: instance.into(), credential }
    }
}

/// The article to add, shared by every target of a run
#[derive(Debug, Clone, PartialEq)]
pub struct ArticleRequest {
    pub database: String,
    pub publication: String,
    pub schema: String,

    /// Source object; the article takes the same name
    pub name: String,

    /// Row filter predicate, without `WHERE`
    pub filter: Option<String>,

    /// Creation options as supplied by the caller; checked before use
    pub creation_options: Option<Value>,
}

impl ArticleRequest {
    pub fn new(
        database: impl Into<String>,
        publication: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            database: database.into(),
            publication: publication.into(),
            schema: DEFAULT_SCHEMA.to_string(),
            name: name.into(),
            filter: None,
            creation_options: None,
        }
    }

    #[must_use]
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    #[must_use]
    pub fn with_creation_options(mut self, options: Value) -> Self {
        self.creation_options = Some(options);
        self
    }
}

/// How failures are reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportingMode {
    /// Warn and record a summary
    #[default]
    Friendly,
    /// Log at error level and record the full error detail
    Strict,
}

/// Per-invocation switches
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Resolve and validate, but never create or refresh
    pub simulate: bool,
    pub reporting: ReportingMode,
}

/// Add the article to every target, in order
///
/// Always returns one outcome per target; no target's failure stops the run.
pub async fn add_article<R: ServerResolver>(
    resolver: &R,
    targets: &[Target],
    request: &ArticleRequest,
    options: RunOptions,
) -> Vec<TargetOutcome> {
    let mut outcomes = Vec::with_capacity(targets.len());

    for target in targets {
        let span = info_span!(
            "target",
            instance = %target.instance,
            publication = %request.publication,
            article = %request.name,
        );
        let outcome = provision_target(resolver, target, request, options).instrument(span).await;
        outcomes.push(outcome);
    }

    outcomes
}

/// A failed step: a summary naming what was being done, plus the cause
struct StageFailure {
    summary: String,
    error: ArticleError,
}

impl StageFailure {
    fn new(summary: impl Into<String>, error: ArticleError) -> Self {
        Self { summary: summary.into(), error }
    }

    /// For errors raised by the pipeline itself, whose message is the summary
    fn raised(error: ArticleError) -> Self {
        Self { summary: error.message(), error }
    }
}

enum Provisioned {
    Created { article: ArticleInfo, refreshed: bool },
    Simulated(ArticlePlan),
}

enum Committed {
    Created { refreshed: bool },
    Simulated { would_refresh: bool },
}

async fn provision_target<R: ServerResolver>(
    resolver: &R,
    target: &Target,
    request: &ArticleRequest,
    options: RunOptions,
) -> TargetOutcome {
    let instance = target.instance.clone();

    match run_pipeline(resolver, target, request, options.simulate).await {
        Ok(Provisioned::Created { article, refreshed }) => {
            info!(refreshed, "Article {} added to publication {}", article.name, article.publication);
            TargetOutcome::Created { instance, article, refreshed }
        }
        Ok(Provisioned::Simulated(plan)) => {
            info!(actions = plan.actions.len(), "Simulation complete, no changes made");
            TargetOutcome::Simulated { instance, plan }
        }
        Err(failure) => {
            let strict = options.reporting == ReportingMode::Strict;
            let code = failure.error.error_code();
            if strict {
                error!(code, detail = %failure.error, "{}", failure.summary);
            } else {
                warn!(code, "{}", failure.summary);
            }
            TargetOutcome::Failed {
                instance,
                failure: TargetFailure::new(failure.summary, &failure.error, strict),
            }
        }
    }
}

async fn run_pipeline<R: ServerResolver>(
    resolver: &R,
    target: &Target,
    request: &ArticleRequest,
    simulate: bool,
) -> Result<Provisioned, StageFailure> {
    let instance = target.instance.as_str();
    let database = request.database.as_str();
    let publication = request.publication.as_str();
    let article = request.name.as_str();
    let mut actions = Vec::new();

    debug!("Validating parameters");
    let validated = validate_request(request).map_err(|e| {
        StageFailure::new(format!("Invalid parameters for article {article} on {instance}"), e)
    })?;

    debug!("Connecting");
    let mut server = resolver
        .resolve(instance, target.credential.as_ref())
        .await
        .map_err(|e| StageFailure::new(format!("Failure connecting to {instance}"), e))?;

    record(
        simulate,
        &mut actions,
        format!("Look up publication {publication} in database {database} on {instance}"),
    );
    let metadata = server
        .lookup_publication(database, publication)
        .await
        .map_err(|e| {
            StageFailure::new(
                format!("Failed to look up publication {publication} in {database} on {instance}"),
                e,
            )
        })?
        .ok_or_else(|| {
            StageFailure::raised(ArticleError::lookup(format!(
                "Publication {publication} does not exist in database {database} on {instance}"
            )))
        })?;

    let mut descriptor = build_article(instance, &metadata, &request.schema, article).map_err(|e| {
        StageFailure::new(
            format!("Could not build article {article} for {} publication {publication} on {instance}", metadata.kind),
            e,
        )
    })?;
    record(
        simulate,
        &mut actions,
        format!(
            "Build {} article {article} for {}.{} in publication {publication}",
            descriptor.kind, descriptor.source_schema, descriptor.source_object
        ),
    );

    if let Some(options) = &validated.creation_options {
        record(
            simulate,
            &mut actions,
            format!("Set creation options {} on article {article}", options.schema_option_literal()),
        );
    }
    if let Some(filter) = &validated.filter {
        record(simulate, &mut actions, format!("Set filter clause '{filter}' on article {article}"));
    }
    configure_article(&mut descriptor, validated.creation_options.as_ref(), validated.filter.as_deref())
        .map_err(|e| {
            let field = match &e {
                ArticleError::Configuration { field, .. } => field.clone(),
                _ => "optional fields".to_string(),
            };
            StageFailure::new(
                format!("Failed to apply {field} to article {article} in publication {publication} on {instance}"),
                e,
            )
        })?;

    match commit_article(&mut server, &mut descriptor, simulate, &mut actions).await? {
        Committed::Simulated { would_refresh } => {
            Ok(Provisioned::Simulated(ArticlePlan { article: descriptor, actions, would_refresh }))
        }
        Committed::Created { refreshed } => {
            let article = read_back(&mut server, &descriptor).await?;
            Ok(Provisioned::Created { article, refreshed })
        }
    }
}

/// Existence check, create, then refresh for log-based articles
///
/// Nothing is retried. The existence check and the create are separate round
/// trips, so a concurrent writer can still slip in between them.
async fn commit_article<S: ReplicationServer>(
    server: &mut S,
    descriptor: &mut ArticleDescriptor,
    simulate: bool,
    actions: &mut Vec<String>,
) -> Result<Committed, StageFailure> {
    let instance = server.instance().to_string();
    let article = descriptor.name.clone();
    let publication = descriptor.publication.clone();

    let exists = server.article_exists(descriptor).await.map_err(|e| {
        StageFailure::new(
            format!("Failed to check whether article {article} exists in publication {publication} on {instance}"),
            e,
        )
    })?;
    descriptor.exists = Some(exists);

    if exists {
        return Err(StageFailure::raised(ArticleError::conflict(format!(
            "Article {article} already exists in publication {publication} on {instance}"
        ))));
    }

    let refresh = descriptor.kind.requires_refresh();

    record(
        simulate,
        actions,
        format!("Create article {article} in publication {publication} on {instance}"),
    );
    if refresh {
        record(
            simulate,
            actions,
            format!("Refresh subscriptions of publication {publication} on {instance}"),
        );
    }
    if simulate {
        return Ok(Committed::Simulated { would_refresh: refresh });
    }

    server.create_article(descriptor).await.map_err(|e| {
        StageFailure::new(
            format!("Failed to create article {article} in publication {publication} on {instance}"),
            e,
        )
    })?;
    info!("Created {} article {article}", descriptor.kind);

    if refresh {
        server
            .refresh_subscriptions(&descriptor.database, &publication)
            .await
            .map_err(|e| {
                StageFailure::new(
                    format!(
                        "Article {article} was created, but refreshing subscriptions of publication {publication} on {instance} failed"
                    ),
                    e,
                )
            })?;
        info!("Refreshed subscriptions of publication {publication}");
    }

    Ok(Committed::Created { refreshed: refresh })
}

/// Re-read the committed article so the caller sees the server's state
async fn read_back<S: ReplicationServer>(
    server: &mut S,
    descriptor: &ArticleDescriptor,
) -> Result<ArticleInfo, StageFailure> {
    let instance = server.instance().to_string();
    let (article, publication) = (&descriptor.name, &descriptor.publication);

    server
        .read_article(descriptor.kind, &descriptor.database, publication, article)
        .await
        .map_err(|e| {
            StageFailure::new(
                format!("Article {article} was created, but reading it back from {instance} failed"),
                e,
            )
        })?
        .ok_or_else(|| {
            StageFailure::raised(ArticleError::lookup(format!(
                "Article {article} was created, but is not visible in publication {publication} on {instance}"
            )))
        })
}

/// Log a state-changing step; in simulate mode it is also kept for the plan
fn record(simulate: bool, actions: &mut Vec<String>, action: String) {
    if simulate {
        info!("What if: {action}");
        actions.push(action);
    } else {
        debug!("{action}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_defaults_to_dbo() {
        let request = ArticleRequest::new("Northwind", "PubFromPosh", "TableToRepl");
        assert_eq!(request.schema, "dbo");
        assert_eq!(request.filter, None);
        assert_eq!(request.creation_options, None);
    }

    #[test]
    fn test_request_builders() {
        let request = ArticleRequest::new("pubs", "testPub", "publishers")
            .with_schema("sales")
            .with_filter("city = 'seattle'")
            .with_creation_options(serde_json::json!({"type": "CreationScriptOptions"}));
        assert_eq!(request.schema, "sales");
        assert_eq!(request.filter.as_deref(), Some("city = 'seattle'"));
        assert!(request.creation_options.is_some());
    }

    #[test]
    fn test_run_options_default_to_friendly_commit() {
        let options = RunOptions::default();
        assert!(!options.simulate);
        assert_eq!(options.reporting, ReportingMode::Friendly);
    }

    #[test]
    fn test_raised_failure_uses_error_message_as_summary() {
        let failure = StageFailure::raised(ArticleError::conflict("Article x already exists"));
        assert_eq!(failure.summary, "Conflict: Article x already exists");
    }
}
