//! In-memory replication servers for pipeline tests
//!
//! A [`FakeCluster`] holds any number of fake instances and records every
//! logical call the pipeline makes, so tests can assert both outcomes and the
//! absence of remote side effects.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use repl_article::{
    ArticleDescriptor, ArticleError, ArticleInfo, ArticleKind, Credential, PublicationKind,
    PublicationMetadata, ReplicationServer, Result, ServerResolver,
};

/// A remote call as seen by the fake server, tagged with the instance
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Resolve(String),
    Lookup(String),
    Exists(String),
    Create(String),
    Refresh(String),
    Read(String),
}

impl Call {
    pub fn is_write(&self) -> bool {
        matches!(self, Self::Create(_) | Self::Refresh(_))
    }
}

#[derive(Debug, Default)]
struct FakeInstance {
    /// (database, publication) -> kind
    publications: HashMap<(String, String), PublicationKind>,

    /// (database, publication, article) -> stored article
    articles: HashMap<(String, String, String), ArticleDescriptor>,

    fail_create: bool,
    fail_refresh: bool,
    hide_created: bool,
}

#[derive(Debug, Default)]
struct ClusterState {
    instances: HashMap<String, FakeInstance>,
    calls: Vec<Call>,
}

/// Shared state behind every fake connection
#[derive(Debug, Clone, Default)]
pub struct FakeCluster {
    state: Arc<Mutex<ClusterState>>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a reachable instance with no publications
    pub fn with_instance(self, instance: &str) -> Self {
        self.lock().instances.entry(instance.to_string()).or_default();
        self
    }

    pub fn with_publication(
        self,
        instance: &str,
        database: &str,
        publication: &str,
        kind: PublicationKind,
    ) -> Self {
        self.lock()
            .instances
            .entry(instance.to_string())
            .or_default()
            .publications
            .insert((database.to_string(), publication.to_string()), kind);
        self
    }

    /// Seed an article that already exists on the server
    pub fn with_article(self, instance: &str, database: &str, publication: &str, name: &str) -> Self {
        let article = ArticleDescriptor {
            kind: ArticleKind::LogBased,
            instance: instance.to_string(),
            name: name.to_string(),
            database: database.to_string(),
            source_schema: "dbo".to_string(),
            source_object: name.to_string(),
            publication: publication.to_string(),
            filter_clause: Some("preexisting = 1".to_string()),
            creation_options: None,
            exists: Some(true),
        };
        self.lock()
            .instances
            .entry(instance.to_string())
            .or_default()
            .articles
            .insert((database.to_string(), publication.to_string(), name.to_string()), article);
        self
    }

    pub fn failing_create(self, instance: &str) -> Self {
        self.lock().instances.entry(instance.to_string()).or_default().fail_create = true;
        self
    }

    pub fn failing_refresh(self, instance: &str) -> Self {
        self.lock().instances.entry(instance.to_string()).or_default().fail_refresh = true;
        self
    }

    /// Accept creates but never show the article on read-back
    pub fn hiding_created(self, instance: &str) -> Self {
        self.lock().instances.entry(instance.to_string()).or_default().hide_created = true;
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn stored_article(
        &self,
        instance: &str,
        database: &str,
        publication: &str,
        name: &str,
    ) -> Option<ArticleDescriptor> {
        self.lock().instances.get(instance).and_then(|inst| {
            inst.articles
                .get(&(database.to_string(), publication.to_string(), name.to_string()))
                .cloned()
        })
    }

    fn lock(&self) -> MutexGuard<'_, ClusterState> {
        self.state.lock().expect("fake cluster mutex poisoned")
    }
}

impl ServerResolver for FakeCluster {
    type Server = FakeServer;

    async fn resolve(&self, instance: &str, _credential: Option<&Credential>) -> Result<FakeServer> {
        let mut state = self.lock();
        state.calls.push(Call::Resolve(instance.to_string()));

        if !state.instances.contains_key(instance) {
            return Err(ArticleError::connection(format!(
                "Failed to connect to {instance}: host not found"
            )));
        }

        Ok(FakeServer { instance: instance.to_string(), cluster: self.clone() })
    }
}

/// One connection to a fake instance
#[derive(Debug)]
pub struct FakeServer {
    instance: String,
    cluster: FakeCluster,
}

impl FakeServer {
    fn record(&self, call: fn(String) -> Call) -> MutexGuard<'_, ClusterState> {
        let mut state = self.cluster.lock();
        state.calls.push(call(self.instance.clone()));
        state
    }
}

fn key(article: &ArticleDescriptor) -> (String, String, String) {
    (article.database.clone(), article.publication.clone(), article.name.clone())
}

impl ReplicationServer for FakeServer {
    fn instance(&self) -> &str {
        &self.instance
    }

    async fn lookup_publication(
        &mut self,
        database: &str,
        publication: &str,
    ) -> Result<Option<PublicationMetadata>> {
        let state = self.record(Call::Lookup);
        let inst = &state.instances[&self.instance];
        Ok(inst
            .publications
            .get(&(database.to_string(), publication.to_string()))
            .map(|kind| PublicationMetadata {
                name: publication.to_string(),
                database: database.to_string(),
                kind: kind.clone(),
            }))
    }

    async fn article_exists(&mut self, article: &ArticleDescriptor) -> Result<bool> {
        let state = self.record(Call::Exists);
        Ok(state.instances[&self.instance].articles.contains_key(&key(article)))
    }

    async fn create_article(&mut self, article: &ArticleDescriptor) -> Result<()> {
        let mut state = self.record(Call::Create);
        let Some(inst) = state.instances.get_mut(&self.instance) else {
            return Err(ArticleError::creation("instance vanished"));
        };
        if inst.fail_create {
            return Err(ArticleError::creation(format!(
                "Invalid object name '{}.{}'",
                article.source_schema, article.source_object
            )));
        }
        let mut stored = article.clone();
        stored.exists = Some(true);
        inst.articles.insert(key(article), stored);
        Ok(())
    }

    async fn refresh_subscriptions(&mut self, _database: &str, publication: &str) -> Result<()> {
        let state = self.record(Call::Refresh);
        if state.instances[&self.instance].fail_refresh {
            return Err(ArticleError::refresh(format!(
                "Subscriptions of {publication} could not be refreshed: distributor offline"
            )));
        }
        Ok(())
    }

    async fn read_article(
        &mut self,
        kind: ArticleKind,
        database: &str,
        publication: &str,
        article: &str,
    ) -> Result<Option<ArticleInfo>> {
        let state = self.record(Call::Read);
        let inst = &state.instances[&self.instance];
        if inst.hide_created {
            return Ok(None);
        }
        Ok(inst
            .articles
            .get(&(database.to_string(), publication.to_string(), article.to_string()))
            .filter(|stored| stored.kind == kind)
            .map(|stored| ArticleInfo {
                name: stored.name.clone(),
                kind: stored.kind,
                instance: self.instance.clone(),
                database: stored.database.clone(),
                publication: stored.publication.clone(),
                source_schema: stored.source_schema.clone(),
                source_object: stored.source_object.clone(),
                filter_clause: stored.filter_clause.clone(),
                creation_options: stored.creation_options.clone(),
            }))
    }
}
