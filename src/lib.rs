//! # resource-rs
//!
//! A generic resource controller: one engine serves show, index, create,
//! update and delete for any resource type, driven by a per-resource
//! configuration and a pluggable persistence driver.
//!
//! ## Features
//!
//! - **Declarative resources**: prefix, templates, pagination, criteria,
//!   sorting and roles come from a [`ResourceConfig`](config::ResourceConfig),
//!   loadable from YAML
//! - **Pluggable drivers**: in-memory, PostgreSQL (`postgres`), MongoDB
//!   (`mongodb_backend`) and LMDB (`lmdb`) behind one [`Driver`](core::Driver) trait
//! - **Transactional mutations**: pre/post lifecycle events with
//!   cancellation, flash feedback and change notifications
//! - **Authorization first**: every action checks its role before touching storage
//! - **API and interactive modes**: JSON for API formats, tera views and
//!   redirects otherwise
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use resource::prelude::*;
//!
//! #[derive(Debug, Clone, Default, Serialize, Deserialize)]
//! struct Article {
//!     id: Option<Uuid>,
//!     slug: String,
//!     title: String,
//! }
//!
//! impl Resource for Article {
//!     fn resource_name() -> &'static str { "article" }
//!     fn id(&self) -> Option<Uuid> { self.id }
//!     fn assign_id(&mut self, id: Uuid) { self.id = Some(id); }
//!     fn slug(&self) -> Option<&str> { Some(&self.slug) }
//! }
//!
//! let config = ResourceConfig::new("blog", "article")
//!     .with_driver(DriverKind::InMemory)
//!     .with_templates("article");
//! let controller = ResourceController::<Article>::builder(config)
//!     .backend(Backend::InMemory)
//!     .build()?;
//!
//! let mut registry = ResourceRegistry::new();
//! registry.register(controller);
//! let app: Router = registry.build_routes();
//! ```

pub mod config;
pub mod core;
pub mod server;
pub mod storage;

/// Re-exports of commonly used types and traits
pub mod prelude {
    // === Core ===
    pub use crate::core::{
        auth::{AuthContext, AuthorizationChecker, GrantAll, RoleChecker},
        driver::{Backend, Driver, DriverKind, DriverSelector},
        error::{ResourceError, ResourceResult},
        events::{EventBus, EventDispatcher, LifecyclePhase, ResourceEvent},
        feedback::{FeedbackMessage, FeedbackSink, FlashBag},
        form::{FormBinder, FormState, JsonFormBinder},
        query::{Criteria, SortDirection, Sorting},
        request::ResourceRequest,
        resource::{Resource, ResourceIdentifier},
        validation::{FieldRules, filters, validators},
    };

    // === Storage ===
    pub use crate::storage::InMemoryDriver;
    #[cfg(feature = "lmdb")]
    pub use crate::storage::LmdbDriver;
    #[cfg(feature = "mongodb_backend")]
    pub use crate::storage::MongoDriver;
    #[cfg(feature = "postgres")]
    pub use crate::storage::PostgresDriver;

    // === Config ===
    pub use crate::config::{Action, ResourceConfig, ResourcesConfig};

    // === Server ===
    pub use crate::server::{
        ResourceController, ResourceRegistry, ResourceResponse, TeraRenderer, ViewRenderer,
    };

    // === External dependencies ===
    pub use async_trait::async_trait;
    pub use serde::{Deserialize, Serialize};
    pub use uuid::Uuid;

    // === Axum ===
    pub use axum::Router;
}
