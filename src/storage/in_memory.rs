//! In-memory driver for testing and development

use crate::core::driver::{Driver, DriverKind, DriverTransaction, ResourceMetadata};
use crate::core::error::PersistenceError;
use crate::core::query::{self, Criteria, Paginator, Sorting, VecAdapter};
use crate::core::resource::Resource;
use crate::storage::{PendingWrite, UnitOfWork, to_document};
use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

type Store<T> = Arc<RwLock<IndexMap<Uuid, T>>>;

fn lock_error(e: impl std::fmt::Display) -> PersistenceError {
    PersistenceError::backend("in-memory", format!("Failed to acquire lock: {}", e))
}

/// In-memory driver
///
/// Resources are kept in insertion order. Optional unique fields are checked
/// at commit, the way a database constraint would reject the write.
#[derive(Clone)]
pub struct InMemoryDriver<T: Resource> {
    metadata: ResourceMetadata,
    store: Store<T>,
    unique: Vec<String>,
}

impl<T: Resource> InMemoryDriver<T> {
    pub fn new(metadata: ResourceMetadata) -> Self {
        Self {
            metadata,
            store: Arc::new(RwLock::new(IndexMap::new())),
            unique: Vec::new(),
        }
    }

    /// Reject commits that would store two resources with the same `field` value
    pub fn with_unique(mut self, field: impl Into<String>) -> Self {
        self.unique.push(field.into());
        self
    }

    pub fn metadata(&self) -> &ResourceMetadata {
        &self.metadata
    }

    pub fn len(&self) -> usize {
        self.store.read().map(|s| s.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy of every stored resource in insertion order
    pub fn snapshot(&self) -> Vec<T> {
        self.store
            .read()
            .map(|s| s.values().cloned().collect())
            .unwrap_or_default()
    }

    fn matching(&self, criteria: &Criteria) -> Result<Vec<(Value, T)>, PersistenceError> {
        let store = self.store.read().map_err(lock_error)?;
        let mut found = Vec::new();
        for resource in store.values() {
            let document = to_document(resource)?;
            if query::matches(&document, criteria) {
                found.push((document, resource.clone()));
            }
        }
        Ok(found)
    }

    fn sorted(&self, criteria: &Criteria, sorting: &Sorting) -> Result<Vec<T>, PersistenceError> {
        let mut found = self.matching(criteria)?;
        query::sort_values(&mut found, sorting);
        Ok(found.into_iter().map(|(_, resource)| resource).collect())
    }
}

#[async_trait]
impl<T: Resource> Driver<T> for InMemoryDriver<T> {
    fn kind(&self) -> DriverKind {
        DriverKind::InMemory
    }

    async fn find_one_by(&self, criteria: &Criteria) -> Result<Option<T>, PersistenceError> {
        Ok(self
            .matching(criteria)?
            .into_iter()
            .next()
            .map(|(_, resource)| resource))
    }

    async fn find_by(
        &self,
        criteria: &Criteria,
        sorting: &Sorting,
        limit: Option<usize>,
    ) -> Result<Vec<T>, PersistenceError> {
        let mut found = self.sorted(criteria, sorting)?;
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
        Ok(Paginator::new(VecAdapter::new(self.sorted(criteria, sorting)?)))
    }

    async fn begin(&self) -> Result<Box<dyn DriverTransaction<T>>, PersistenceError> {
        Ok(Box::new(InMemoryTransaction {
            store: self.store.clone(),
            unique: self.unique.clone(),
            unit: UnitOfWork::new(),
        }))
    }
}

struct InMemoryTransaction<T: Resource> {
    store: Store<T>,
    unique: Vec<String>,
    unit: UnitOfWork<T>,
}

/// Resources the store would hold after applying `changes`
fn merged<'a, T: Resource>(
    store: &'a IndexMap<Uuid, T>,
    changes: &'a IndexMap<Uuid, Option<T>>,
) -> impl Iterator<Item = &'a T> {
    store
        .iter()
        .filter(|(id, _)| !changes.contains_key(*id))
        .map(|(_, resource)| resource)
        .chain(changes.values().flatten())
}

fn check_unique<T: Resource>(
    unique: &[String],
    store: &IndexMap<Uuid, T>,
    changes: &IndexMap<Uuid, Option<T>>,
) -> Result<(), PersistenceError> {
    if unique.is_empty() {
        return Ok(());
    }
    let documents = merged(store, changes)
        .map(to_document)
        .collect::<Result<Vec<_>, _>>()?;

    for field in unique {
        let mut seen: HashSet<String> = HashSet::new();
        for value in documents.iter().filter_map(|d| d.get(field)) {
            if value.is_null() {
                continue;
            }
            if !seen.insert(value.to_string()) {
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
impl<T: Resource> DriverTransaction<T> for InMemoryTransaction<T> {
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
        let InMemoryTransaction {
            store,
            unique,
            unit,
        } = *self;
        let mut store = store.write().map_err(lock_error)?;
        let missing = |id: Uuid| PersistenceError::Missing {
            resource: T::resource_name().to_string(),
            id: id.to_string(),
        };

        // Writes are checked against an overlay; the store is only touched once all pass
        let mut changes: IndexMap<Uuid, Option<T>> = IndexMap::new();
        for write in unit.into_writes() {
            let id = write.id();
            let present = match changes.get(&id) {
                Some(change) => change.is_some(),
                None => store.contains_key(&id),
            };
            match write {
                PendingWrite::Insert(_, resource) => {
                    if present {
                        return Err(PersistenceError::ConstraintViolation {
                            resource: T::resource_name().to_string(),
                            constraint: "primary_key".to_string(),
                            message: format!("id {} already exists", id),
                        });
                    }
                    changes.insert(id, Some(resource));
                }
                PendingWrite::Update(_, resource) if present => {
                    changes.insert(id, Some(resource));
                }
                PendingWrite::Delete(_) if present => {
                    changes.insert(id, None);
                }
                PendingWrite::Update(..) | PendingWrite::Delete(_) => return Err(missing(id)),
            }
        }
        check_unique(&unique, &store, &changes)?;

        for (id, change) in changes {
            match change {
                Some(resource) => {
                    store.insert(id, resource);
                }
                None => {
                    store.shift_remove(&id);
                }
            }
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), PersistenceError> {
        Ok(())
    }
}
