//! Persistence drivers for the supported backends
//!
//! | Driver            | Kind                     | Feature           |
//! |-------------------|--------------------------|-------------------|
//! | [`InMemoryDriver`]| `in-memory`              | `in-memory`       |
//! | `PostgresDriver`  | `relational-orm`         | `postgres`        |
//! | `MongoDriver`     | `document-odm`           | `mongodb_backend` |
//! | `LmdbDriver`      | `content-repository-odm` | `lmdb`            |
//!
//! Backends without native multi-statement transactions buffer staged writes
//! in a [`UnitOfWork`] and apply them on commit.

pub mod in_memory;
#[cfg(feature = "lmdb")]
pub mod lmdb;
#[cfg(feature = "mongodb_backend")]
pub mod mongodb;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use in_memory::InMemoryDriver;
#[cfg(feature = "lmdb")]
pub use lmdb::LmdbDriver;
#[cfg(feature = "mongodb_backend")]
pub use mongodb::MongoDriver;
#[cfg(feature = "postgres")]
pub use postgres::PostgresDriver;

use crate::core::driver::persisted_id;
use crate::core::error::PersistenceError;
use crate::core::resource::Resource;
use uuid::Uuid;

/// A write staged on a buffered transaction
#[derive(Debug, Clone)]
pub enum PendingWrite<T> {
    Insert(Uuid, T),
    Update(Uuid, T),
    Delete(Uuid),
}

impl<T> PendingWrite<T> {
    pub fn id(&self) -> Uuid {
        match self {
            PendingWrite::Insert(id, _) | PendingWrite::Update(id, _) | PendingWrite::Delete(id) => *id,
        }
    }
}

/// Ordered list of staged writes
#[derive(Debug)]
pub struct UnitOfWork<T> {
    writes: Vec<PendingWrite<T>>,
}

impl<T> Default for UnitOfWork<T> {
    fn default() -> Self {
        Self { writes: Vec::new() }
    }
}

impl<T: Resource> UnitOfWork<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage an insert, assigning a fresh id when the resource has none
    pub fn stage_create(&mut self, mut resource: T) -> T {
        let id = match resource.id() {
            Some(id) => id,
            None => {
                let id = Uuid::new_v4();
                resource.assign_id(id);
                id
            }
        };
        self.writes.push(PendingWrite::Insert(id, resource.clone()));
        resource
    }

    pub fn stage_update(&mut self, resource: T) -> Result<T, PersistenceError> {
        let id = persisted_id(&resource)?;
        self.writes.push(PendingWrite::Update(id, resource.clone()));
        Ok(resource)
    }

    pub fn stage_delete(&mut self, resource: &T) -> Result<(), PersistenceError> {
        let id = persisted_id(resource)?;
        self.writes.push(PendingWrite::Delete(id));
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn into_writes(self) -> Vec<PendingWrite<T>> {
        self.writes
    }
}

/// Serialize a resource to the JSON object drivers match criteria against
pub(crate) fn to_document<T: Resource>(resource: &T) -> Result<serde_json::Value, PersistenceError> {
    serde_json::to_value(resource).map_err(|e| PersistenceError::serialization(T::resource_name(), e))
}

pub(crate) fn from_document<T: Resource>(document: serde_json::Value) -> Result<T, PersistenceError> {
    serde_json::from_value(document).map_err(|e| PersistenceError::serialization(T::resource_name(), e))
}
