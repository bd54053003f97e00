//! Repository operations resolved by tagged variant
//!
//! The controller never calls driver methods by name. It builds an
//! [`Operation`] and hands it to the [`OperationResolver`]. Operation names
//! parse into an [`OperationKind`] only from a fixed whitelist.

use crate::core::driver::Driver;
use crate::core::error::{ConfigError, PersistenceError};
use crate::core::query::{Criteria, Paginator, Sorting};
use crate::core::resource::Resource;
use std::fmt;
use std::str::FromStr;

/// Names of the repository operations the resolver accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    CreateNew,
    FindOneBy,
    FindBy,
    CreatePaginator,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::CreateNew => "createNew",
            OperationKind::FindOneBy => "findOneBy",
            OperationKind::FindBy => "findBy",
            OperationKind::CreatePaginator => "createPaginator",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "createNew" | "create_new" => Ok(OperationKind::CreateNew),
            "findOneBy" | "find_one_by" => Ok(OperationKind::FindOneBy),
            "findBy" | "find_by" => Ok(OperationKind::FindBy),
            "createPaginator" | "create_paginator" => Ok(OperationKind::CreatePaginator),
            other => Err(ConfigError::UnknownOperation {
                name: other.to_string(),
            }),
        }
    }
}

/// A repository operation with its arguments
#[derive(Debug, Clone)]
pub enum Operation {
    CreateNew,
    FindOneBy {
        criteria: Criteria,
    },
    FindBy {
        criteria: Criteria,
        sorting: Sorting,
        limit: Option<usize>,
    },
    CreatePaginator {
        criteria: Criteria,
        sorting: Sorting,
    },
}

impl Operation {
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::CreateNew => OperationKind::CreateNew,
            Operation::FindOneBy { .. } => OperationKind::FindOneBy,
            Operation::FindBy { .. } => OperationKind::FindBy,
            Operation::CreatePaginator { .. } => OperationKind::CreatePaginator,
        }
    }
}

/// Result of a resolved operation, shaped by its variant
pub enum OperationOutput<T> {
    New(T),
    One(Option<T>),
    Many(Vec<T>),
    Paginator(Paginator<T>),
}

impl<T> OperationOutput<T> {
    pub fn into_one(self) -> Option<T> {
        match self {
            OperationOutput::New(resource) => Some(resource),
            OperationOutput::One(resource) => resource,
            OperationOutput::Many(resources) => resources.into_iter().next(),
            OperationOutput::Paginator(_) => None,
        }
    }
}

/// Dispatches operations to a driver
pub struct OperationResolver;

impl OperationResolver {
    pub async fn resolve<T: Resource>(
        driver: &dyn Driver<T>,
        operation: Operation,
    ) -> Result<OperationOutput<T>, PersistenceError> {
        tracing::debug!(
            resource = T::resource_name(),
            operation = %operation.kind(),
            driver = %driver.kind(),
            "resolving operation"
        );

        match operation {
            Operation::CreateNew => Ok(OperationOutput::New(driver.create_new())),
            Operation::FindOneBy { criteria } => {
                Ok(OperationOutput::One(driver.find_one_by(&criteria).await?))
            }
            Operation::FindBy {
                criteria,
                sorting,
                limit,
            } => Ok(OperationOutput::Many(
                driver.find_by(&criteria, &sorting, limit).await?,
            )),
            Operation::CreatePaginator { criteria, sorting } => Ok(OperationOutput::Paginator(
                driver.create_paginator(&criteria, &sorting).await?,
            )),
        }
    }
}
