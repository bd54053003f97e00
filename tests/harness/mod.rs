//! Shared fixtures for the integration tests
//!
//! Provides the `Article` test resource, a [`RecordingDriver`] that logs every
//! call reaching the persistence layer, a [`JsonRenderer`] that renders views
//! as JSON so tests can inspect template names and contexts, and a
//! [`Fixture`] wiring a controller from all of them.
//!
//! # Usage
//!
//! From any integration test file in `tests/`:
//! ```rust,ignore
//! #[macro_use]
//! mod harness;
//! use harness::*;
//! ```

#![allow(dead_code)]

#[macro_use]
pub mod driver_contract;

use anyhow::Result;
use async_trait::async_trait;
use resource::config::ResourceConfig;
use resource::core::auth::{AuthorizationChecker, GrantAll, RoleChecker};
use resource::core::driver::{Driver, DriverKind, DriverTransaction, ResourceMetadata};
use resource::core::error::PersistenceError;
use resource::core::events::{EventDispatcher, LifecyclePhase};
use resource::core::query::{Criteria, Paginator, Sorting};
use resource::core::resource::Resource;
use resource::core::validation::{FieldRules, filters, validators};
use resource::server::{ResourceController, ResourceResponse, ViewRenderer};
use resource::storage::InMemoryDriver;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Article: the resource every test manages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Article {
    pub id: Option<Uuid>,
    pub slug: String,
    pub title: String,
    pub body: String,
    pub rank: i64,
    pub status: String,
    pub summary: Option<String>,
}

impl Default for Article {
    fn default() -> Self {
        Self {
            id: None,
            slug: String::new(),
            title: String::new(),
            body: String::new(),
            rank: 0,
            status: "draft".to_string(),
            summary: None,
        }
    }
}

impl Resource for Article {
    fn resource_name() -> &'static str {
        "article"
    }

    fn id(&self) -> Option<Uuid> {
        self.id
    }

    fn assign_id(&mut self, id: Uuid) {
        self.id = Some(id);
    }

    fn slug(&self) -> Option<&str> {
        Some(&self.slug)
    }
}

/// Unsaved article with the given title, slug and rank
pub fn article(title: &str, slug: &str, rank: i64) -> Article {
    Article {
        id: None,
        slug: slug.to_string(),
        title: title.to_string(),
        body: format!("Body of {}", title),
        rank,
        status: "draft".to_string(),
        summary: None,
    }
}

pub fn metadata() -> ResourceMetadata {
    ResourceMetadata::new("app", "article")
}

/// In-memory configuration with templates, a page size of 2 and open filters
pub fn article_config() -> ResourceConfig {
    let mut config = ResourceConfig::new("app", "article")
        .with_driver(DriverKind::InMemory)
        .with_templates("article")
        .with_pagination(2);
    config.filterable = true;
    config.sortable = true;
    config
}

/// Form rules used by the fixtures
pub fn article_rules() -> FieldRules {
    FieldRules::new()
        .field("title", |f| {
            f.filter(filters::trim())
                .validate(validators::required())
                .validate(validators::string_length(1, 80))
        })
        .field("slug", |f| f.filter(filters::slugify()))
        .field("body", |f| f.filter(filters::trim()))
        .field("rank", |f| f.validate(validators::max_value(1000.0)))
        .field("status", |f| {
            f.filter(filters::lowercase())
                .validate(validators::in_list(vec!["draft".into(), "published".into()]))
        })
}

// ---------------------------------------------------------------------------
// RecordingDriver: logs every call reaching the persistence layer
// ---------------------------------------------------------------------------

type CallLog = Arc<Mutex<Vec<String>>>;

fn record(log: &CallLog, call: &str) {
    log.lock().unwrap().push(call.to_string());
}

/// Driver decorator recording calls in order (`find_one_by`, `begin`, `create`, `commit`, ...)
pub struct RecordingDriver<T: Resource> {
    inner: Arc<dyn Driver<T>>,
    calls: CallLog,
}

impl<T: Resource> Clone for RecordingDriver<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            calls: self.calls.clone(),
        }
    }
}

impl<T: Resource> RecordingDriver<T> {
    pub fn new(inner: Arc<dyn Driver<T>>) -> Self {
        Self {
            inner,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Staged writes (`create`, `update`, `delete`) seen so far
    pub fn writes(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c.as_str(), "create" | "update" | "delete"))
            .count()
    }

    pub fn reset(&self) {
        self.calls.lock().unwrap().clear();
    }
}

#[async_trait]
impl<T: Resource> Driver<T> for RecordingDriver<T> {
    fn kind(&self) -> DriverKind {
        self.inner.kind()
    }

    async fn find_one_by(&self, criteria: &Criteria) -> Result<Option<T>, PersistenceError> {
        record(&self.calls, "find_one_by");
        self.inner.find_one_by(criteria).await
    }

    async fn find_by(
        &self,
        criteria: &Criteria,
        sorting: &Sorting,
        limit: Option<usize>,
    ) -> Result<Vec<T>, PersistenceError> {
        record(&self.calls, "find_by");
        self.inner.find_by(criteria, sorting, limit).await
    }

    async fn create_paginator(
        &self,
        criteria: &Criteria,
        sorting: &Sorting,
    ) -> Result<Paginator<T>, PersistenceError> {
        record(&self.calls, "create_paginator");
        self.inner.create_paginator(criteria, sorting).await
    }

    fn create_new(&self) -> T {
        record(&self.calls, "create_new");
        self.inner.create_new()
    }

    async fn begin(&self) -> Result<Box<dyn DriverTransaction<T>>, PersistenceError> {
        record(&self.calls, "begin");
        let inner = self.inner.begin().await?;
        Ok(Box::new(RecordingTransaction {
            inner,
            calls: self.calls.clone(),
        }))
    }
}

struct RecordingTransaction<T: Resource> {
    inner: Box<dyn DriverTransaction<T>>,
    calls: CallLog,
}

#[async_trait]
impl<T: Resource> DriverTransaction<T> for RecordingTransaction<T> {
    async fn create(&mut self, resource: T) -> Result<T, PersistenceError> {
        record(&self.calls, "create");
        self.inner.create(resource).await
    }

    async fn update(&mut self, resource: T) -> Result<T, PersistenceError> {
        record(&self.calls, "update");
        self.inner.update(resource).await
    }

    async fn delete(&mut self, resource: &T) -> Result<(), PersistenceError> {
        record(&self.calls, "delete");
        self.inner.delete(resource).await
    }

    async fn commit(self: Box<Self>) -> Result<(), PersistenceError> {
        record(&self.calls, "commit");
        self.inner.commit().await
    }

    async fn rollback(self: Box<Self>) -> Result<(), PersistenceError> {
        record(&self.calls, "rollback");
        self.inner.rollback().await
    }
}

// ---------------------------------------------------------------------------
// JsonRenderer: views rendered as inspectable JSON
// ---------------------------------------------------------------------------

/// Renders `{"template": .., "context": ..}` instead of HTML
pub struct JsonRenderer;

impl ViewRenderer for JsonRenderer {
    fn render(&self, template: &str, context: &Value) -> Result<String> {
        Ok(json!({ "template": template, "context": context }).to_string())
    }
}

/// Decode a view rendered by [`JsonRenderer`]
pub fn rendered(response: &ResourceResponse) -> Value {
    match response {
        ResourceResponse::Html { body, .. } => serde_json::from_str(body).unwrap(),
        other => panic!("Expected a rendered view, got {:?}", other),
    }
}

// ---------------------------------------------------------------------------
// Fixture: a controller over a recording in-memory driver
// ---------------------------------------------------------------------------

pub struct Fixture {
    pub controller: ResourceController<Article>,
    pub driver: RecordingDriver<Article>,
    pub store: InMemoryDriver<Article>,
    /// Event names in dispatch order
    pub events: Arc<Mutex<Vec<String>>>,
}

impl Fixture {
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    /// Insert articles directly, bypassing the controller
    pub async fn seed(&self, articles: Vec<Article>) -> Vec<Article> {
        let mut created = Vec::new();
        for article in articles {
            created.push(self.store.create(article).await.unwrap());
        }
        self.driver.reset();
        created
    }
}

pub fn fixture(config: ResourceConfig) -> Fixture {
    build_fixture(config, Arc::new(GrantAll), |_| {})
}

/// Fixture checking roles against the request's auth context
pub fn guarded_fixture(config: ResourceConfig) -> Fixture {
    build_fixture(config, Arc::new(RoleChecker), |_| {})
}

/// Fixture with extra listeners, registered after the event recorders
pub fn fixture_with(
    config: ResourceConfig,
    listeners: impl FnOnce(&mut EventDispatcher<Article>),
) -> Fixture {
    build_fixture(config, Arc::new(GrantAll), listeners)
}

fn build_fixture(
    config: ResourceConfig,
    checker: Arc<dyn AuthorizationChecker>,
    listeners: impl FnOnce(&mut EventDispatcher<Article>),
) -> Fixture {
    let store = InMemoryDriver::<Article>::new(config.metadata()).with_unique("slug");
    let driver = RecordingDriver::new(Arc::new(store.clone()));
    let events: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

    let mut dispatcher = EventDispatcher::new();
    for phase in [
        LifecyclePhase::PreCreate,
        LifecyclePhase::PostCreate,
        LifecyclePhase::PreUpdate,
        LifecyclePhase::PostUpdate,
        LifecyclePhase::PreDelete,
        LifecyclePhase::PostDelete,
    ] {
        let events = events.clone();
        dispatcher.on(phase, move |event| {
            events.lock().unwrap().push(event.name.clone());
            Ok(())
        });
    }
    listeners(&mut dispatcher);

    let controller = ResourceController::<Article>::builder(config)
        .driver(Arc::new(driver.clone()))
        .checker(checker)
        .dispatcher(dispatcher)
        .form_rules(article_rules())
        .renderer(Arc::new(JsonRenderer))
        .build()
        .unwrap();

    Fixture {
        controller,
        driver,
        store,
        events,
    }
}
