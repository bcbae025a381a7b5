//! SQL Server Replication Implementation
//!
//! This module implements [`ServerResolver`] and [`ReplicationServer`] for SQL
//! Server publishers.
//!
//! # Implementation Notes
//! - Uses `tiberius` (async TDS driver, requires tokio runtime)
//! - Instance identifiers: `host`, `host,port`, `host\instance` (SQL Browser)
//! - SQL authentication only; a credential is required
//! - Publications are read from `syspublications` / `sysmergepublications`
//!   in the publication database
//! - Articles are created with `sp_addarticle` / `sp_addmergearticle`
//! - Names are always bound as parameters; the database name, which has to
//!   appear in three-part names, is bracket-quoted

use tiberius::{AuthMethod, Client, Config, Query, Row, SqlBrowser};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::debug;

use crate::article::{ArticleDescriptor, ArticleKind, CreationScriptOptions};
use crate::engine::{
    ArticleInfo, Credential, PublicationKind, PublicationMetadata, ReplicationServer,
    ServerResolver,
};
use crate::error::{ArticleError, Result};

const DEFAULT_PORT: u16 = 1433;
const APPLICATION_NAME: &str = "repl-article";

/// Opens SQL Server connections
#[derive(Debug, Clone, Default)]
pub struct MssqlResolver {
    trust_server_certificate: bool,
}

impl MssqlResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept the server's TLS certificate without validation
    #[must_use]
    pub const fn trust_server_certificate(mut self, trust: bool) -> Self {
        self.trust_server_certificate = trust;
        self
    }
}

/// Connected SQL Server publisher
pub struct MssqlServer {
    instance: String,
    client: Client<Compat<TcpStream>>,
}

/// Parsed instance identifier
#[derive(Debug, Clone, PartialEq, Eq)]
struct InstanceAddress {
    host: String,
    port: Option<u16>,
    instance_name: Option<String>,
}

/// Catalog tables holding one article variant
struct Catalog {
    publications: &'static str,
    articles: &'static str,
    filter_column: &'static str,
}

const fn catalog(kind: ArticleKind) -> Catalog {
    match kind {
        ArticleKind::LogBased => Catalog {
            publications: "syspublications",
            articles: "sysarticles",
            filter_column: "filter_clause",
        },
        ArticleKind::TableBased => Catalog {
            publications: "sysmergepublications",
            articles: "sysmergearticles",
            filter_column: "subset_filterclause",
        },
    }
}

impl ServerResolver for MssqlResolver {
    type Server = MssqlServer;

    async fn resolve(&self, instance: &str, credential: Option<&Credential>) -> Result<MssqlServer> {
        let address = parse_instance(instance)?;
        let config = build_config(&address, credential, self.trust_server_certificate)?;

        let tcp = if address.instance_name.is_some() && address.port.is_none() {
            TcpStream::connect_named(&config).await.map_err(|e| {
                ArticleError::connection(format!("Failed to locate SQL Server instance {instance}: {e}"))
            })?
        } else {
            TcpStream::connect(config.get_addr()).await.map_err(|e| {
                ArticleError::connection(format!("Failed to reach SQL Server {instance}: {e}"))
            })?
        };

        tcp.set_nodelay(true).map_err(|e| {
            ArticleError::connection(format!("Failed to configure socket for {instance}: {e}"))
        })?;

        // Note: driver errors never echo the password back
        let client = Client::connect(config, tcp.compat_write()).await.map_err(|e| {
            ArticleError::connection(format!("Failed to connect to SQL Server {instance}: {e}"))
        })?;

        debug!(instance, "Connected");
        Ok(MssqlServer { instance: instance.to_string(), client })
    }
}

impl MssqlServer {
    async fn fetch_row(&mut self, query: Query<'_>) -> tiberius::Result<Option<Row>> {
        query.query(&mut self.client).await?.into_row().await
    }

    async fn fetch_int(&mut self, query: Query<'_>) -> tiberius::Result<Option<i32>> {
        Ok(self.fetch_row(query).await?.and_then(|row| row.get::<i32, _>(0)))
    }

    async fn database_exists(&mut self, database: &str) -> tiberius::Result<bool> {
        let mut query = Query::new("SELECT CAST(DB_ID(@P1) AS int)");
        query.bind(database.to_string());
        Ok(self.fetch_int(query).await?.is_some())
    }

    async fn table_exists(&mut self, database: &str, table: &str) -> tiberius::Result<bool> {
        let mut query = Query::new(
            "SELECT CAST(CASE WHEN OBJECT_ID(@P1, N'U') IS NULL THEN 0 ELSE 1 END AS int)",
        );
        query.bind(format!("{}.dbo.{table}", quote_ident(database)));
        Ok(self.fetch_int(query).await? == Some(1))
    }

    fn lookup_error(&self, action: &str, e: tiberius::error::Error) -> ArticleError {
        ArticleError::lookup(format!("{action} on {}: {e}", self.instance))
    }
}

impl ReplicationServer for MssqlServer {
    fn instance(&self) -> &str {
        &self.instance
    }

    async fn lookup_publication(
        &mut self,
        database: &str,
        publication: &str,
    ) -> Result<Option<PublicationMetadata>> {
        let failed = "Failed to query publications";

        if !self.database_exists(database).await.map_err(|e| self.lookup_error(failed, e))? {
            return Err(ArticleError::lookup(format!(
                "Database {database} not found on {}",
                self.instance
            )));
        }

        let db = quote_ident(database);

        // Transactional and snapshot publications share syspublications
        if self.table_exists(database, "syspublications").await.map_err(|e| self.lookup_error(failed, e))? {
            let mut query = Query::new(format!(
                "SELECT CAST(repl_freq AS int) FROM {db}.dbo.syspublications WHERE name = @P1"
            ));
            query.bind(publication.to_string());

            if let Some(row) = self.fetch_row(query).await.map_err(|e| self.lookup_error(failed, e))? {
                let kind = match row.get::<i32, _>(0) {
                    Some(0) => PublicationKind::Transactional,
                    Some(1) => PublicationKind::Snapshot,
                    Some(other) => PublicationKind::Unrecognized(format!("repl_freq {other}")),
                    None => PublicationKind::Unrecognized("repl_freq NULL".to_string()),
                };
                return Ok(Some(PublicationMetadata {
                    name: publication.to_string(),
                    database: database.to_string(),
                    kind,
                }));
            }
        }

        if self.table_exists(database, "sysmergepublications").await.map_err(|e| self.lookup_error(failed, e))? {
            let mut query = Query::new(format!(
                "SELECT CAST(1 AS int) FROM {db}.dbo.sysmergepublications WHERE name = @P1"
            ));
            query.bind(publication.to_string());

            if self.fetch_int(query).await.map_err(|e| self.lookup_error(failed, e))?.is_some() {
                return Ok(Some(PublicationMetadata {
                    name: publication.to_string(),
                    database: database.to_string(),
                    kind: PublicationKind::Merge,
                }));
            }
        }

        Ok(None)
    }

    async fn article_exists(&mut self, article: &ArticleDescriptor) -> Result<bool> {
        let tables = catalog(article.kind);
        let db = quote_ident(&article.database);

        let mut query = Query::new(format!(
            "SELECT COUNT(*) FROM {db}.dbo.{articles} a \
             JOIN {db}.dbo.{publications} p ON a.pubid = p.pubid \
             WHERE p.name = @P1 AND a.name = @P2",
            articles = tables.articles,
            publications = tables.publications,
        ));
        query.bind(article.publication.clone());
        query.bind(article.name.clone());

        let count = self
            .fetch_int(query)
            .await
            .map_err(|e| self.lookup_error("Failed to query articles", e))?;

        Ok(count.unwrap_or(0) > 0)
    }

    async fn create_article(&mut self, article: &ArticleDescriptor) -> Result<()> {
        let statement = create_statement(article);

        let mut query = Query::new(statement.sql);
        for param in statement.params {
            query.bind(param);
        }

        // One batch: a failed filter attach rolls the article back too
        query.execute(&mut self.client).await.map_err(|e| {
            ArticleError::creation(format!(
                "{} failed on {}, nothing was created: {e}",
                statement.procedure, self.instance
            ))
        })?;

        Ok(())
    }

    async fn refresh_subscriptions(&mut self, database: &str, publication: &str) -> Result<()> {
        let mut query = Query::new(refresh_statement(database));
        query.bind(publication.to_string());

        query.execute(&mut self.client).await.map_err(|e| {
            ArticleError::refresh(format!("sp_refreshsubscriptions failed on {}: {e}", self.instance))
        })?;

        Ok(())
    }

    async fn read_article(
        &mut self,
        kind: ArticleKind,
        database: &str,
        publication: &str,
        article: &str,
    ) -> Result<Option<ArticleInfo>> {
        let tables = catalog(kind);
        let db = quote_ident(database);

        let mut query = Query::new(format!(
            "SELECT a.name, \
                    OBJECT_SCHEMA_NAME(a.objid, DB_ID(@P3)), \
                    OBJECT_NAME(a.objid, DB_ID(@P3)), \
                    CAST(a.{filter} AS nvarchar(max)), \
                    CAST(a.schema_option AS bigint) \
             FROM {db}.dbo.{articles} a \
             JOIN {db}.dbo.{publications} p ON a.pubid = p.pubid \
             WHERE p.name = @P1 AND a.name = @P2",
            filter = tables.filter_column,
            articles = tables.articles,
            publications = tables.publications,
        ));
        query.bind(publication.to_string());
        query.bind(article.to_string());
        query.bind(database.to_string());

        let Some(row) = self
            .fetch_row(query)
            .await
            .map_err(|e| self.lookup_error("Failed to read article", e))?
        else {
            return Ok(None);
        };

        let text = |idx: usize| row.get::<&str, _>(idx).map(str::to_string);
        let filter_clause = text(3).filter(|f| !f.trim().is_empty());
        let creation_options = row
            .get::<i64, _>(4)
            .filter(|mask| *mask != 0)
            .map(|mask| CreationScriptOptions::from_schema_option(mask as u64));

        Ok(Some(ArticleInfo {
            name: text(0).unwrap_or_else(|| article.to_string()),
            kind,
            instance: self.instance.clone(),
            database: database.to_string(),
            publication: publication.to_string(),
            source_schema: text(1).unwrap_or_default(),
            source_object: text(2).unwrap_or_default(),
            filter_clause,
            creation_options,
        }))
    }
}

/// Batch that creates an article, with parameters bound as `@P1..`
#[derive(Debug, Clone, PartialEq, Eq)]
struct CreateStatement {
    procedure: &'static str,
    sql: String,
    params: Vec<String>,
}

/// Build the create batch for `article`
///
/// Log-based filters need `sp_articlefilter` and `sp_articleview` after
/// `sp_addarticle`; those run in the same transaction with `XACT_ABORT` on,
/// so the article is either created with its filter or not at all.
fn create_statement(article: &ArticleDescriptor) -> CreateStatement {
    let db = quote_ident(&article.database);
    let (procedure, filter_param) = match article.kind {
        ArticleKind::LogBased => ("sp_addarticle", "@filter_clause"),
        ArticleKind::TableBased => ("sp_addmergearticle", "@subset_filterclause"),
    };

    let mut params = vec![
        article.publication.clone(),
        article.name.clone(),
        article.source_schema.clone(),
        article.source_object.clone(),
    ];

    let mut add = format!(
        "EXEC {db}.sys.{procedure} @publication = @P1, @article = @P2, \
         @source_owner = @P3, @source_object = @P4, @force_invalidate_snapshot = 1"
    );
    if let Some(options) = &article.creation_options {
        // Numeric literal built from the mask, not caller text
        add.push_str(&format!(", @schema_option = {}", options.schema_option_literal()));
    }

    let Some(filter) = &article.filter_clause else {
        return CreateStatement { procedure, sql: add, params };
    };
    add.push_str(&format!(", {filter_param} = @P5"));
    params.push(filter.clone());

    if article.kind == ArticleKind::TableBased {
        return CreateStatement { procedure, sql: add, params };
    }

    params.push(filter_procedure_name(&article.name));
    let sql = format!(
        "SET XACT_ABORT ON; \
         BEGIN TRANSACTION; \
         {add}; \
         EXEC {db}.sys.sp_articlefilter @publication = @P1, @article = @P2, \
         @filter_name = @P6, @filter_clause = @P5, @force_invalidate_snapshot = 1; \
         EXEC {db}.sys.sp_articleview @publication = @P1, @article = @P2, \
         @filter_clause = @P5, @force_invalidate_snapshot = 1; \
         COMMIT TRANSACTION;"
    );
    CreateStatement { procedure, sql, params }
}

fn refresh_statement(database: &str) -> String {
    format!("EXEC {}.sys.sp_refreshsubscriptions @publication = @P1", quote_ident(database))
}

/// Split an instance identifier into host, port and instance name
fn parse_instance(instance: &str) -> Result<InstanceAddress> {
    let trimmed = instance.trim();
    let trimmed = trimmed.strip_prefix("tcp:").unwrap_or(trimmed);

    if trimmed.is_empty() {
        return Err(ArticleError::connection("Instance identifier cannot be empty"));
    }

    let (server, port) = match trimmed.rsplit_once(',') {
        Some((server, port)) => {
            let port = port.trim().parse::<u16>().map_err(|_| {
                ArticleError::connection(format!("Invalid port '{port}' in instance {instance}"))
            })?;
            (server, Some(port))
        }
        None => (trimmed, None),
    };

    let (host, instance_name) = match server.split_once('\\') {
        Some((host, name)) if !name.is_empty() => (host, Some(name.to_string())),
        Some((host, _)) => (host, None),
        None => (server, None),
    };

    let host = match host.trim() {
        "" | "." | "(local)" => "localhost".to_string(),
        other => other.to_string(),
    };

    Ok(InstanceAddress { host, port, instance_name })
}

fn build_config(
    address: &InstanceAddress,
    credential: Option<&Credential>,
    trust_server_certificate: bool,
) -> Result<Config> {
    let credential = credential.ok_or_else(|| {
        ArticleError::connection(
            "A SQL login is required (--user with --prompt-password or --password-env); \
             integrated authentication is not supported",
        )
    })?;

    let mut config = Config::new();
    config.host(&address.host);
    config.port(address.port.unwrap_or(DEFAULT_PORT));
    if let Some(name) = &address.instance_name {
        config.instance_name(name);
    }
    config.authentication(AuthMethod::sql_server(&credential.user, &credential.password));
    config.application_name(APPLICATION_NAME);
    if trust_server_certificate {
        config.trust_cert();
    }

    Ok(config)
}

/// Bracket-quote an identifier for use in a three-part name
fn quote_ident(name: &str) -> String {
    format!("[{}]", name.replace(']', "]]"))
}

/// Name of the filter procedure generated for a log-based article
fn filter_procedure_name(article: &str) -> String {
    let mut name = format!("FLTR_{article}");
    // sysname limit
    if name.chars().count() > 128 {
        name = name.chars().take(128).collect();
    }
    name
}
