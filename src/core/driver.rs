//! Persistence drivers and driver selection
//!
//! A [`Driver`] is the uniform query and write surface the controller talks to.
//! Reads go straight through the driver; writes are staged on a
//! [`DriverTransaction`] so the domain manager can dispatch the pre-event,
//! then commit or roll back.
//!
//! [`DriverSelector`] maps the configured driver kind to a concrete backend.

use crate::core::error::{ConfigError, PersistenceError};
use crate::core::query::{Criteria, Paginator, Sorting};
use crate::core::resource::Resource;
use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// The family of persistence engine a resource is stored in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DriverKind {
    /// Relational store with an object mapper (PostgreSQL)
    RelationalOrm,
    /// Document store (MongoDB)
    DocumentOdm,
    /// Hierarchical, path-addressed content repository (LMDB)
    ContentRepositoryOdm,
    /// Process-local store
    InMemory,
}

impl DriverKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriverKind::RelationalOrm => "relational-orm",
            DriverKind::DocumentOdm => "document-odm",
            DriverKind::ContentRepositoryOdm => "content-repository-odm",
            DriverKind::InMemory => "in-memory",
        }
    }
}

impl fmt::Display for DriverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DriverKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "relational-orm" | "doctrine/orm" => Ok(DriverKind::RelationalOrm),
            "document-odm" | "doctrine/mongodb-odm" => Ok(DriverKind::DocumentOdm),
            "content-repository-odm" | "doctrine/phpcr-odm" => {
                Ok(DriverKind::ContentRepositoryOdm)
            }
            "in-memory" => Ok(DriverKind::InMemory),
            other => Err(ConfigError::DriverNotFound {
                kind: other.to_string(),
            }),
        }
    }
}

/// Names a driver needs to place a resource in its backend
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceMetadata {
    pub prefix: String,
    pub name: String,
    pub plural: String,
}

impl ResourceMetadata {
    pub fn new(prefix: impl Into<String>, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            prefix: prefix.into(),
            plural: crate::core::naming::pluralize(&name),
            name,
        }
    }
}

/// Query and write surface of one persistence backend for one resource type
///
/// Lookups that match nothing return `None` or an empty list, never an error.
#[async_trait]
pub trait Driver<T: Resource>: Send + Sync {
    fn kind(&self) -> DriverKind;

    /// First resource matching every criterion
    async fn find_one_by(&self, criteria: &Criteria) -> Result<Option<T>, PersistenceError>;

    /// All resources matching the criteria, sorted and truncated to `limit`
    async fn find_by(
        &self,
        criteria: &Criteria,
        sorting: &Sorting,
        limit: Option<usize>,
    ) -> Result<Vec<T>, PersistenceError>;

    /// Lazy paginated view of the resources matching the criteria
    async fn create_paginator(
        &self,
        criteria: &Criteria,
        sorting: &Sorting,
    ) -> Result<Paginator<T>, PersistenceError>;

    /// A fresh, unsaved instance
    fn create_new(&self) -> T {
        T::default()
    }

    /// Open a unit of work for staged writes
    async fn begin(&self) -> Result<Box<dyn DriverTransaction<T>>, PersistenceError>;

    /// Persist a new resource in its own transaction
    async fn create(&self, resource: T) -> Result<T, PersistenceError> {
        let mut tx = self.begin().await?;
        match tx.create(resource).await {
            Ok(created) => {
                tx.commit().await?;
                Ok(created)
            }
            Err(e) => {
                tx.rollback().await?;
                Err(e)
            }
        }
    }

    /// Persist changes to an existing resource in its own transaction
    async fn update(&self, resource: T) -> Result<T, PersistenceError> {
        let mut tx = self.begin().await?;
        match tx.update(resource).await {
            Ok(updated) => {
                tx.commit().await?;
                Ok(updated)
            }
            Err(e) => {
                tx.rollback().await?;
                Err(e)
            }
        }
    }

    /// Remove a resource in its own transaction
    async fn delete(&self, resource: &T) -> Result<(), PersistenceError> {
        let mut tx = self.begin().await?;
        match tx.delete(resource).await {
            Ok(()) => tx.commit().await,
            Err(e) => {
                tx.rollback().await?;
                Err(e)
            }
        }
    }
}

/// A unit of work over one driver
///
/// `create` assigns the surrogate id immediately so listeners and redirects can
/// address the resource before commit. Nothing is visible to other readers
/// until [`DriverTransaction::commit`] succeeds.
#[async_trait]
pub trait DriverTransaction<T: Resource>: Send {
    async fn create(&mut self, resource: T) -> Result<T, PersistenceError>;

    async fn update(&mut self, resource: T) -> Result<T, PersistenceError>;

    async fn delete(&mut self, resource: &T) -> Result<(), PersistenceError>;

    async fn commit(self: Box<Self>) -> Result<(), PersistenceError>;

    async fn rollback(self: Box<Self>) -> Result<(), PersistenceError>;
}

/// Id of a resource that must already be persisted
pub(crate) fn persisted_id<T: Resource>(resource: &T) -> Result<uuid::Uuid, PersistenceError> {
    resource.id().ok_or_else(|| PersistenceError::Missing {
        resource: T::resource_name().to_string(),
        id: "<unsaved>".to_string(),
    })
}

// ---------------------------------------------------------------------------
// Driver selection
// ---------------------------------------------------------------------------

/// Connection handle a driver is built from
#[derive(Clone)]
pub enum Backend {
    InMemory,
    #[cfg(feature = "postgres")]
    Postgres(sqlx::PgPool),
    #[cfg(feature = "mongodb_backend")]
    Mongo(mongodb::Database),
    #[cfg(feature = "lmdb")]
    Lmdb(Arc<heed::Env>),
}

impl Backend {
    pub fn name(&self) -> &'static str {
        match self {
            Backend::InMemory => "in-memory",
            #[cfg(feature = "postgres")]
            Backend::Postgres(_) => "postgres",
            #[cfg(feature = "mongodb_backend")]
            Backend::Mongo(_) => "mongodb",
            #[cfg(feature = "lmdb")]
            Backend::Lmdb(_) => "lmdb",
        }
    }
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Backend({})", self.name())
    }
}

/// Everything a driver builder receives
#[derive(Debug, Clone)]
pub struct DriverArgs {
    pub metadata: ResourceMetadata,
    pub backend: Backend,
}

/// Builds the driver declared by a resource configuration
pub struct DriverSelector;

impl DriverSelector {
    /// Select and build the driver for `kind`
    ///
    /// The kind is checked first: an unknown kind fails with
    /// [`ConfigError::DriverNotFound`] whatever backend was supplied.
    pub fn select<T: Resource>(
        kind: &str,
        args: DriverArgs,
    ) -> Result<Arc<dyn Driver<T>>, ConfigError> {
        let kind = DriverKind::from_str(kind)?;
        tracing::debug!(
            resource = %args.metadata.name,
            driver = %kind,
            backend = args.backend.name(),
            "selecting driver"
        );

        let metadata = args.metadata;
        match (kind, args.backend) {
            (DriverKind::InMemory, Backend::InMemory) => {
                Ok(Arc::new(crate::storage::InMemoryDriver::<T>::new(metadata)))
            }
            #[cfg(feature = "postgres")]
            (DriverKind::RelationalOrm, Backend::Postgres(pool)) => Ok(Arc::new(
                crate::storage::PostgresDriver::<T>::new(pool, metadata),
            )),
            #[cfg(feature = "mongodb_backend")]
            (DriverKind::DocumentOdm, Backend::Mongo(database)) => Ok(Arc::new(
                crate::storage::MongoDriver::<T>::new(&database, metadata),
            )),
            #[cfg(feature = "lmdb")]
            (DriverKind::ContentRepositoryOdm, Backend::Lmdb(env)) => {
                let driver = crate::storage::LmdbDriver::<T>::from_env(env, metadata).map_err(
                    |e| ConfigError::InvalidValue {
                        field: "backend".into(),
                        value: "lmdb".into(),
                        message: e.to_string(),
                    },
                )?;
                Ok(Arc::new(driver))
            }
            (kind, backend) => Err(ConfigError::BackendMismatch {
                kind: kind.as_str().to_string(),
                backend: backend.name().to_string(),
            }),
        }
    }
}
