//! LMDB driver using heed (`content-repository-odm`)
//!
//! LMDB is an embedded, memory-mapped B-tree: no external server is needed.
//! All operations are synchronous and wrapped in `tokio::task::spawn_blocking`.
//!
//! # Repository layout
//!
//! Resources are nodes of a path-addressed tree stored in the `nodes`
//! database:
//!
//! ```text
//! /{prefix}/{plural}/{id}  ->  JSON bytes of the resource
//! ```
//!
//! Listing a resource type is a prefix scan over `/{prefix}/{plural}/`;
//! criteria and sorting are evaluated in process on the scanned nodes.
//! Staged writes are applied in one LMDB write transaction on commit, so a
//! failed commit leaves the repository unchanged.
//!
//! # Feature flag
//!
//! Enable with `--features lmdb`.

use crate::core::driver::{Driver, DriverKind, DriverTransaction, ResourceMetadata};
use crate::core::error::PersistenceError;
use crate::core::query::{self, Criteria, Paginator, Sorting, VecAdapter};
use crate::core::resource::Resource;
use crate::storage::{PendingWrite, UnitOfWork, to_document};
use anyhow::Result;
use async_trait::async_trait;
use heed::types::{Bytes, Str};
use heed::{Database, Env, EnvOpenOptions};
use serde_json::Value;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

const BACKEND: &str = "lmdb";
const NODES: &str = "nodes";

fn heed_error(e: heed::Error) -> PersistenceError {
    PersistenceError::backend(BACKEND, e)
}

fn join_error(e: tokio::task::JoinError) -> PersistenceError {
    PersistenceError::backend(BACKEND, format!("blocking task failed: {}", e))
}

fn encode<T: Resource>(resource: &T) -> Result<Vec<u8>, PersistenceError> {
    serde_json::to_vec(resource).map_err(|e| PersistenceError::serialization(T::resource_name(), e))
}

fn decode<T: Resource>(bytes: &[u8]) -> Result<T, PersistenceError> {
    serde_json::from_slice(bytes).map_err(|e| PersistenceError::serialization(T::resource_name(), e))
}

/// Open (or create) an LMDB environment at `path`
///
/// The map size is a virtual address space reservation of 256 MB; LMDB does
/// not allocate it up front.
pub fn open_env(path: impl AsRef<Path>) -> Result<Arc<Env>> {
    std::fs::create_dir_all(path.as_ref())?;

    let env = unsafe {
        EnvOpenOptions::new()
            .map_size(256 * 1024 * 1024)
            .max_dbs(10)
            .max_readers(126)
            .open(path.as_ref())?
    };
    Ok(Arc::new(env))
}

/// Driver storing resources as nodes under `/{prefix}/{plural}/`
///
/// ```rust,ignore
/// let driver = LmdbDriver::<Article>::open("/var/lib/blog", config.metadata())?;
/// ```
pub struct LmdbDriver<T: Resource> {
    env: Arc<Env>,
    db: Database<Str, Bytes>,
    metadata: ResourceMetadata,
    unique: Vec<String>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Resource> LmdbDriver<T> {
    /// Open the environment at `path` and build a driver on it
    pub fn open(path: impl AsRef<Path>, metadata: ResourceMetadata) -> Result<Self> {
        Self::from_env(open_env(path)?, metadata)
    }

    /// Build a driver on an already opened environment
    ///
    /// Several resource types can share one environment; their nodes live
    /// under distinct parent paths.
    pub fn from_env(env: Arc<Env>, metadata: ResourceMetadata) -> Result<Self> {
        let mut wtxn = env.write_txn()?;
        let db: Database<Str, Bytes> = env.create_database(&mut wtxn, Some(NODES))?;
        wtxn.commit()?;

        Ok(Self {
            env,
            db,
            metadata,
            unique: Vec::new(),
            _marker: PhantomData,
        })
    }

    /// Reject commits that would store two nodes with the same `field` value
    pub fn with_unique(mut self, field: impl Into<String>) -> Self {
        self.unique.push(field.into());
        self
    }

    /// Parent path of every node of this resource type
    pub fn parent_path(&self) -> String {
        format!("/{}/{}/", self.metadata.prefix, self.metadata.plural)
    }

    /// Path of the node holding the resource with `id`
    pub fn node_path(&self, id: Uuid) -> String {
        format!("{}{}", self.parent_path(), id)
    }

    fn scan(&self, criteria: Criteria) -> impl FnOnce() -> Result<Vec<(Value, T)>, PersistenceError> + use<T> {
        let env = self.env.clone();
        let db = self.db;
        let parent = self.parent_path();
        move || {
            let rtxn = env.read_txn().map_err(heed_error)?;
            let mut found = Vec::new();
            for item in db.prefix_iter(&rtxn, &parent).map_err(heed_error)? {
                let (_path, bytes) = item.map_err(heed_error)?;
                let resource: T = decode(bytes)?;
                let document = to_document(&resource)?;
                if query::matches(&document, &criteria) {
                    found.push((document, resource));
                }
            }
            Ok(found)
        }
    }

    async fn sorted(&self, criteria: &Criteria, sorting: &Sorting) -> Result<Vec<T>, PersistenceError> {
        let mut found = tokio::task::spawn_blocking(self.scan(criteria.clone()))
            .await
            .map_err(join_error)??;
        query::sort_values(&mut found, sorting);
        Ok(found.into_iter().map(|(_, resource)| resource).collect())
    }
}

impl<T: Resource> Clone for LmdbDriver<T> {
    fn clone(&self) -> Self {
        Self {
            env: Arc::clone(&self.env),
            db: self.db,
            metadata: self.metadata.clone(),
            unique: self.unique.clone(),
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T: Resource> Driver<T> for LmdbDriver<T> {
    fn kind(&self) -> DriverKind {
        DriverKind::ContentRepositoryOdm
    }

    async fn find_one_by(&self, criteria: &Criteria) -> Result<Option<T>, PersistenceError> {
        // Direct node lookup when the id is the only criterion
        if criteria.len() == 1
            && let Some(Value::String(id)) = criteria.get("id")
        {
            let Ok(id) = Uuid::parse_str(id) else {
                return Ok(None);
            };
            let env = self.env.clone();
            let db = self.db;
            let path = self.node_path(id);
            return tokio::task::spawn_blocking(move || {
                let rtxn = env.read_txn().map_err(heed_error)?;
                match db.get(&rtxn, &path).map_err(heed_error)? {
                    Some(bytes) => Ok(Some(decode(bytes)?)),
                    None => Ok(None),
                }
            })
            .await
            .map_err(join_error)?;
        }

        let found = tokio::task::spawn_blocking(self.scan(criteria.clone()))
            .await
            .map_err(join_error)??;
        Ok(found.into_iter().next().map(|(_, resource)| resource))
    }

    async fn find_by(
        &self,
        criteria: &Criteria,
        sorting: &Sorting,
        limit: Option<usize>,
    ) -> Result<Vec<T>, PersistenceError> {
        let mut found = self.sorted(criteria, sorting).await?;
        if let Some(limit) = limit {
            found.truncate(limit);
        }
        Ok(found)
    }

    async fn create_paginator(
        &self,
        criteria: &Criteria,
        sorting: &Sorting,
    ) -> Result<Paginator<T>, PersistenceError> {
        Ok(Paginator::new(VecAdapter::new(
            self.sorted(criteria, sorting).await?,
        )))
    }

    async fn begin(&self) -> Result<Box<dyn DriverTransaction<T>>, PersistenceError> {
        Ok(Box::new(LmdbTransaction {
            driver: self.clone(),
            unit: UnitOfWork::new(),
        }))
    }
}

struct LmdbTransaction<T: Resource> {
    driver: LmdbDriver<T>,
    unit: UnitOfWork<T>,
}

/// Fail when another node under `parent` already holds the same value for a unique field
fn check_unique<T: Resource>(
    db: Database<Str, Bytes>,
    wtxn: &heed::RwTxn<'_>,
    parent: &str,
    unique: &[String],
    path: &str,
    resource: &T,
) -> Result<(), PersistenceError> {
    if unique.is_empty() {
        return Ok(());
    }
    let document = to_document(resource)?;
    for item in db.prefix_iter(wtxn, parent).map_err(heed_error)? {
        let (other_path, bytes) = item.map_err(heed_error)?;
        if other_path == path {
            continue;
        }
        let other = to_document(&decode::<T>(bytes)?)?;
        for field in unique {
            let value = document.get(field).unwrap_or(&Value::Null);
            if !value.is_null() && other.get(field) == Some(value) {
                return Err(PersistenceError::ConstraintViolation {
                    resource: T::resource_name().to_string(),
                    constraint: format!("unique_{}", field),
                    message: format!("{} {} is already used", field, value),
                });
            }
        }
    }
    Ok(())
}

#[async_trait]
impl<T: Resource> DriverTransaction<T> for LmdbTransaction<T> {
    async fn create(&mut self, resource: T) -> Result<T, PersistenceError> {
        Ok(self.unit.stage_create(resource))
    }

    async fn update(&mut self, resource: T) -> Result<T, PersistenceError> {
        self.unit.stage_update(resource)
    }

    async fn delete(&mut self, resource: &T) -> Result<(), PersistenceError> {
        self.unit.stage_delete(resource)
    }

    async fn commit(self: Box<Self>) -> Result<(), PersistenceError> {
        let LmdbTransaction { driver, unit } = *self;
        if unit.is_empty() {
            return Ok(());
        }

        tokio::task::spawn_blocking(move || {
            let name = T::resource_name();
            let parent = driver.parent_path();
            let db = driver.db;
            let missing = |id: Uuid| PersistenceError::Missing {
                resource: name.to_string(),
                id: id.to_string(),
            };

            // Dropping the write transaction without commit aborts every write
            let mut wtxn = driver.env.write_txn().map_err(heed_error)?;
            for write in unit.into_writes() {
                match write {
                    PendingWrite::Insert(id, resource) => {
                        let path = driver.node_path(id);
                        if db.get(&wtxn, &path).map_err(heed_error)?.is_some() {
                            return Err(PersistenceError::ConstraintViolation {
                                resource: name.to_string(),
                                constraint: "node_path".to_string(),
                                message: format!("node {} already exists", path),
                            });
                        }
                        check_unique(db, &wtxn, &parent, &driver.unique, &path, &resource)?;
                        db.put(&mut wtxn, &path, &encode(&resource)?)
                            .map_err(heed_error)?;
                    }
                    PendingWrite::Update(id, resource) => {
                        let path = driver.node_path(id);
                        if db.get(&wtxn, &path).map_err(heed_error)?.is_none() {
                            return Err(missing(id));
                        }
                        check_unique(db, &wtxn, &parent, &driver.unique, &path, &resource)?;
                        db.put(&mut wtxn, &path, &encode(&resource)?)
                            .map_err(heed_error)?;
                    }
                    PendingWrite::Delete(id) => {
                        let path = driver.node_path(id);
                        if !db.delete(&mut wtxn, &path).map_err(heed_error)? {
                            return Err(missing(id));
                        }
                    }
                }
            }
            wtxn.commit().map_err(heed_error)
        })
        .await
        .map_err(join_error)?
    }

    async fn rollback(self: Box<Self>) -> Result<(), PersistenceError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use tempfile::TempDir;

    #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
    struct Page {
        id: Option<Uuid>,
        path: String,
    }

    impl Resource for Page {
        fn resource_name() -> &'static str {
            "page"
        }
        fn id(&self) -> Option<Uuid> {
            self.id
        }
        fn assign_id(&mut self, id: Uuid) {
            self.id = Some(id);
        }
    }

    fn driver(dir: &TempDir) -> LmdbDriver<Page> {
        LmdbDriver::open(dir.path(), ResourceMetadata::new("cms", "page"))
            .unwrap()
            .with_unique("path")
    }

    fn page(path: &str) -> Page {
        Page {
            id: None,
            path: path.into(),
        }
    }

    #[tokio::test]
    async fn test_nodes_live_under_parent_path() {
        let dir = TempDir::new().unwrap();
        let driver = driver(&dir);
        let created = driver.create(page("/about")).await.unwrap();
        let id = created.id.unwrap();

        assert_eq!(driver.node_path(id), format!("/cms/pages/{}", id));
        let mut criteria = Criteria::new();
        criteria.insert("id".into(), Value::String(id.to_string()));
        assert_eq!(driver.find_one_by(&criteria).await.unwrap(), Some(created));
    }

    #[tokio::test]
    async fn test_types_sharing_an_env_are_isolated() {
        let dir = TempDir::new().unwrap();
        let env = open_env(dir.path()).unwrap();
        let pages = LmdbDriver::<Page>::from_env(env.clone(), ResourceMetadata::new("cms", "page"))
            .unwrap();
        let drafts = LmdbDriver::<Page>::from_env(env, ResourceMetadata::new("cms", "draft"))
            .unwrap();

        pages.create(page("/a")).await.unwrap();
        drafts.create(page("/b")).await.unwrap();

        let all = pages
            .find_by(&Criteria::new(), &Sorting::new(), None)
            .await
            .unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].path, "/a");
    }

    #[tokio::test]
    async fn test_failed_commit_applies_nothing() {
        let dir = TempDir::new().unwrap();
        let driver = driver(&dir);
        driver.create(page("/taken")).await.unwrap();

        let mut tx = driver.begin().await.unwrap();
        tx.create(page("/fresh")).await.unwrap();
        tx.create(page("/taken")).await.unwrap();
        let err = tx.commit().await.unwrap_err();

        assert!(matches!(err, PersistenceError::ConstraintViolation { .. }));
        let all = driver
            .find_by(&Criteria::new(), &Sorting::new(), None)
            .await
            .unwrap();
        assert_eq!(all.len(), 1);
    }

    #[tokio::test]
    async fn test_malformed_id_finds_nothing() {
        let dir = TempDir::new().unwrap();
        let driver = driver(&dir);
        let mut criteria = Criteria::new();
        criteria.insert("id".into(), Value::String("not-a-uuid".into()));
        assert!(driver.find_one_by(&criteria).await.unwrap().is_none());
    }
}
