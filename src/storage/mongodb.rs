//! MongoDB driver using the official async driver (`document-odm`)
//!
//! # Storage model
//!
//! Each resource type gets its own collection, named after the plural
//! resource name (`articles`, `categories`). The resource is converted to
//! BSON through `serde_json::Value`, so ids and timestamps are stored as
//! strings, and the `id` field is mapped to MongoDB's `_id`.
//!
//! Writes are staged in a [`UnitOfWork`] and applied on commit; a standalone
//! server offers no multi-document transactions.
//!
//! # Feature flag
//!
//! ```toml
//! [dependencies]
//! resource-rs = { version = "0.1", features = ["mongodb_backend"] }
//! ```

use crate::core::driver::{Driver, DriverKind, DriverTransaction, ResourceMetadata};
use crate::core::error::PersistenceError;
use crate::core::query::{Criteria, Paginator, PaginatorAdapter, SortDirection, Sorting};
use crate::core::resource::Resource;
use crate::storage::{PendingWrite, UnitOfWork, from_document, to_document};
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{Bson, Document, doc};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::IndexOptions;
use mongodb::{Collection, Database, IndexModel};
use serde_json::Value;
use std::marker::PhantomData;
use uuid::Uuid;

const BACKEND: &str = "mongodb";

// ---------------------------------------------------------------------------
// Conversion helpers
// ---------------------------------------------------------------------------

fn field_key(field: &str) -> &str {
    if field == "id" { "_id" } else { field }
}

fn to_bson(resource: &str, value: &Value) -> Result<Bson, PersistenceError> {
    mongodb::bson::to_bson(value).map_err(|e| PersistenceError::serialization(resource, e))
}

/// Serialize a resource into a document, renaming `id` to `_id`
fn resource_to_document<T: Resource>(resource: &T) -> Result<Document, PersistenceError> {
    let mut doc = match to_bson(T::resource_name(), &to_document(resource)?)? {
        Bson::Document(d) => d,
        _ => {
            return Err(PersistenceError::serialization(
                T::resource_name(),
                "expected a BSON document",
            ));
        }
    };
    if let Some(id) = doc.remove("id") {
        doc.insert("_id", id);
    }
    Ok(doc)
}

fn document_to_resource<T: Resource>(mut doc: Document) -> Result<T, PersistenceError> {
    if let Some(id) = doc.remove("_id") {
        doc.insert("id", id);
    }
    from_document(Bson::Document(doc).into_relaxed_extjson())
}

/// Build a query filter: arrays become `$in`, `null` matches missing fields
fn criteria_filter(resource: &str, criteria: &Criteria) -> Result<Document, PersistenceError> {
    let mut filter = Document::new();
    for (field, expected) in criteria {
        let condition = match expected {
            Value::Array(_) => {
                let candidates = to_bson(resource, expected)?;
                Bson::Document(doc! { "$in": candidates })
            }
            other => to_bson(resource, other)?,
        };
        filter.insert(field_key(field), condition);
    }
    Ok(filter)
}

fn sort_document(sorting: &Sorting) -> Option<Document> {
    if sorting.is_empty() {
        return None;
    }
    let mut sort = Document::new();
    for (field, direction) in sorting {
        let order = match direction {
            SortDirection::Asc => 1,
            SortDirection::Desc => -1,
        };
        sort.insert(field_key(field), order);
    }
    Some(sort)
}

fn id_filter(id: Uuid) -> Document {
    doc! { "_id": id.to_string() }
}

fn map_error(resource: &str, err: mongodb::error::Error) -> PersistenceError {
    if let ErrorKind::Write(WriteFailure::WriteError(write)) = err.kind.as_ref()
        && write.code == 11000
    {
        return PersistenceError::ConstraintViolation {
            resource: resource.to_string(),
            constraint: "duplicate_key".to_string(),
            message: write.message.clone(),
        };
    }
    PersistenceError::backend(BACKEND, err)
}

async fn fetch<T: Resource>(
    collection: &Collection<Document>,
    filter: Document,
    sort: Option<Document>,
    skip: Option<u64>,
    limit: Option<i64>,
) -> Result<Vec<T>, PersistenceError> {
    let mut find = collection.find(filter);
    if let Some(sort) = sort {
        find = find.sort(sort);
    }
    if let Some(skip) = skip {
        find = find.skip(skip);
    }
    if let Some(limit) = limit {
        find = find.limit(limit);
    }

    let docs: Vec<Document> = find
        .await
        .map_err(|e| map_error(T::resource_name(), e))?
        .try_collect()
        .await
        .map_err(|e| map_error(T::resource_name(), e))?;

    docs.into_iter().map(document_to_resource).collect()
}

// ---------------------------------------------------------------------------
// MongoDriver
// ---------------------------------------------------------------------------

/// Driver storing one resource type in one collection
///
/// ```rust,ignore
/// let client = mongodb::Client::with_uri_str("mongodb://localhost:27017").await?;
/// let driver = MongoDriver::<Article>::new(&client.database("blog"), config.metadata());
/// driver.ensure_unique("slug").await?;
/// ```
#[derive(Clone, Debug)]
pub struct MongoDriver<T> {
    collection: Collection<Document>,
    metadata: ResourceMetadata,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Resource> MongoDriver<T> {
    pub fn new(database: &Database, metadata: ResourceMetadata) -> Self {
        Self {
            collection: database.collection(&metadata.plural),
            metadata,
            _marker: PhantomData,
        }
    }

    pub fn collection(&self) -> &Collection<Document> {
        &self.collection
    }

    pub fn metadata(&self) -> &ResourceMetadata {
        &self.metadata
    }

    /// Create a unique index on `field` (idempotent)
    pub async fn ensure_unique(&self, field: &str) -> Result<(), PersistenceError> {
        let mut keys = Document::new();
        keys.insert(field_key(field), 1);
        let index = IndexModel::builder()
            .keys(keys)
            .options(IndexOptions::builder().unique(true).build())
            .build();
        self.collection
            .create_index(index)
            .await
            .map_err(|e| map_error(T::resource_name(), e))?;
        Ok(())
    }
}

#[async_trait]
impl<T: Resource> Driver<T> for MongoDriver<T> {
    fn kind(&self) -> DriverKind {
        DriverKind::DocumentOdm
    }

    async fn find_one_by(&self, criteria: &Criteria) -> Result<Option<T>, PersistenceError> {
        let filter = criteria_filter(T::resource_name(), criteria)?;
        let found = self
            .collection
            .find_one(filter)
            .await
            .map_err(|e| map_error(T::resource_name(), e))?;
        found.map(document_to_resource).transpose()
    }

    async fn find_by(
        &self,
        criteria: &Criteria,
        sorting: &Sorting,
        limit: Option<usize>,
    ) -> Result<Vec<T>, PersistenceError> {
        let filter = criteria_filter(T::resource_name(), criteria)?;
        fetch(
            &self.collection,
            filter,
            sort_document(sorting),
            None,
            limit.map(|l| l as i64),
        )
        .await
    }

    async fn create_paginator(
        &self,
        criteria: &Criteria,
        sorting: &Sorting,
    ) -> Result<Paginator<T>, PersistenceError> {
        Ok(Paginator::new(MongoPageAdapter::<T> {
            collection: self.collection.clone(),
            filter: criteria_filter(T::resource_name(), criteria)?,
            sort: sort_document(sorting),
            _marker: PhantomData,
        }))
    }

    async fn begin(&self) -> Result<Box<dyn DriverTransaction<T>>, PersistenceError> {
        Ok(Box::new(MongoTransaction::<T> {
            collection: self.collection.clone(),
            unit: UnitOfWork::new(),
        }))
    }
}

struct MongoPageAdapter<T> {
    collection: Collection<Document>,
    filter: Document,
    sort: Option<Document>,
    _marker: PhantomData<fn() -> T>,
}

#[async_trait]
impl<T: Resource> PaginatorAdapter<T> for MongoPageAdapter<T> {
    async fn count(&self) -> Result<usize, PersistenceError> {
        let count = self
            .collection
            .count_documents(self.filter.clone())
            .await
            .map_err(|e| map_error(T::resource_name(), e))?;
        Ok(count as usize)
    }

    async fn slice(&self, offset: usize, length: usize) -> Result<Vec<T>, PersistenceError> {
        fetch(
            &self.collection,
            self.filter.clone(),
            self.sort.clone(),
            Some(offset as u64),
            Some(length as i64),
        )
        .await
    }
}

struct MongoTransaction<T: Resource> {
    collection: Collection<Document>,
    unit: UnitOfWork<T>,
}

#[async_trait]
impl<T: Resource> DriverTransaction<T> for MongoTransaction<T> {
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
        let MongoTransaction { collection, unit } = *self;
        let name = T::resource_name();
        let missing = |id: Uuid| PersistenceError::Missing {
            resource: name.to_string(),
            id: id.to_string(),
        };

        for write in unit.into_writes() {
            match write {
                PendingWrite::Insert(_, resource) => {
                    collection
                        .insert_one(resource_to_document(&resource)?)
                        .await
                        .map_err(|e| map_error(name, e))?;
                }
                PendingWrite::Update(id, resource) => {
                    let result = collection
                        .replace_one(id_filter(id), resource_to_document(&resource)?)
                        .await
                        .map_err(|e| map_error(name, e))?;
                    if result.matched_count == 0 {
                        return Err(missing(id));
                    }
                }
                PendingWrite::Delete(id) => {
                    let result = collection
                        .delete_one(id_filter(id))
                        .await
                        .map_err(|e| map_error(name, e))?;
                    if result.deleted_count == 0 {
                        return Err(missing(id));
                    }
                }
            }
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), PersistenceError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_criteria_filter_maps_id_and_arrays() {
        let criteria = json!({"id": "abc", "status": ["draft", "review"], "author": null})
            .as_object()
            .cloned()
            .unwrap();
        let filter = criteria_filter("article", &criteria).unwrap();

        assert_eq!(filter.get_str("_id").unwrap(), "abc");
        let status = filter.get_document("status").unwrap();
        assert_eq!(status.get_array("$in").unwrap().len(), 2);
        assert_eq!(filter.get("author"), Some(&Bson::Null));
    }

    #[test]
    fn test_sort_document() {
        assert!(sort_document(&Sorting::new()).is_none());

        let mut sorting = Sorting::new();
        sorting.insert("published".into(), SortDirection::Desc);
        sorting.insert("id".into(), SortDirection::Asc);
        let sort = sort_document(&sorting).unwrap();
        let keys: Vec<_> = sort.keys().cloned().collect();
        assert_eq!(keys, vec!["published", "_id"]);
        assert_eq!(sort.get_i32("published").unwrap(), -1);
    }
}
