//! Criteria, sorting and pagination primitives shared by drivers and the controller

use crate::core::error::PersistenceError;
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

/// Equality criteria keyed by field name
///
/// A scalar value matches fields equal to it, an array value matches fields equal
/// to any of its elements and `null` matches missing or null fields.
pub type Criteria = serde_json::Map<String, Value>;

/// Ordered sort specification (first entry is the primary key)
pub type Sorting = IndexMap<String, SortDirection>;

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[serde(alias = "ASC")]
    Asc,
    #[serde(alias = "DESC")]
    Desc,
}

/// Parse a sort expression
///
/// # Format
/// - `field` or `field:asc` (ascending)
/// - `field:desc` (descending)
/// - several keys separated by commas: `published:desc,title`
///
/// Unknown directions fall back to ascending; empty keys are skipped.
pub fn parse_sort(expr: &str) -> Sorting {
    expr.split(',')
        .filter_map(|part| {
            let mut pieces = part.trim().splitn(2, ':');
            let field = pieces.next()?.trim();
            if field.is_empty() {
                return None;
            }
            let direction = match pieces.next().map(|d| d.trim().to_ascii_lowercase()) {
                Some(d) if d == "desc" => SortDirection::Desc,
                _ => SortDirection::Asc,
            };
            Some((field.to_string(), direction))
        })
        .collect()
}

/// Check whether a serialized resource satisfies every criterion
pub fn matches(resource: &Value, criteria: &Criteria) -> bool {
    criteria.iter().all(|(field, expected)| {
        let actual = resource.get(field).unwrap_or(&Value::Null);
        match expected {
            Value::Array(candidates) => candidates.iter().any(|c| c == actual),
            other => other == actual,
        }
    })
}

/// Total order over JSON values used for in-process sorting
///
/// Null sorts first, then booleans, numbers and strings; values of other
/// types compare equal.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            _ => 4,
        }
    }

    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(0.0);
            let y = y.as_f64().unwrap_or(0.0);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Sort serialized resources in place according to `sorting`
pub fn sort_values<T>(items: &mut [(Value, T)], sorting: &Sorting) {
    if sorting.is_empty() {
        return;
    }
    items.sort_by(|(a, _), (b, _)| {
        for (field, direction) in sorting {
            let left = a.get(field).unwrap_or(&Value::Null);
            let right = b.get(field).unwrap_or(&Value::Null);
            let ord = match direction {
                SortDirection::Asc => compare_values(left, right),
                SortDirection::Desc => compare_values(right, left),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
}

// ---------------------------------------------------------------------------
// Pagination
// ---------------------------------------------------------------------------

/// Default page size when a paginator is created without one
pub const DEFAULT_MAX_PER_PAGE: usize = 10;

/// Source of a paginated result set
///
/// Implemented by each driver so that counting and slicing run against the
/// backend instead of loading the whole set.
#[async_trait]
pub trait PaginatorAdapter<T>: Send + Sync {
    /// Total number of matching resources
    async fn count(&self) -> Result<usize, PersistenceError>;

    /// `length` resources starting at `offset`, in sort order
    async fn slice(&self, offset: usize, length: usize) -> Result<Vec<T>, PersistenceError>;
}

/// Adapter over an already materialized, filtered and sorted result set
pub struct VecAdapter<T> {
    items: Vec<T>,
}

impl<T> VecAdapter<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self { items }
    }
}

#[async_trait]
impl<T: Clone + Send + Sync> PaginatorAdapter<T> for VecAdapter<T> {
    async fn count(&self) -> Result<usize, PersistenceError> {
        Ok(self.items.len())
    }

    async fn slice(&self, offset: usize, length: usize) -> Result<Vec<T>, PersistenceError> {
        Ok(self.items.iter().skip(offset).take(length).cloned().collect())
    }
}

/// Paginator handle returned by the `createPaginator` operation
///
/// Page number and page size are set on the handle after resolution; nothing
/// is fetched until [`Paginator::current_page_results`] is awaited.
pub struct Paginator<T> {
    adapter: Box<dyn PaginatorAdapter<T>>,
    current_page: usize,
    max_per_page: usize,
}

impl<T> Paginator<T> {
    pub fn new(adapter: impl PaginatorAdapter<T> + 'static) -> Self {
        Self {
            adapter: Box::new(adapter),
            current_page: 1,
            max_per_page: DEFAULT_MAX_PER_PAGE,
        }
    }

    /// Set the page to fetch; pages start at 1 and lower values are raised to 1
    pub fn set_current_page(&mut self, page: usize) -> &mut Self {
        self.current_page = page.max(1);
        self
    }

    /// Set the page size; a size of 0 is raised to 1
    pub fn set_max_per_page(&mut self, max_per_page: usize) -> &mut Self {
        self.max_per_page = max_per_page.max(1);
        self
    }

    pub fn current_page(&self) -> usize {
        self.current_page
    }

    pub fn max_per_page(&self) -> usize {
        self.max_per_page
    }

    /// Fetch the resources of the current page together with pagination metadata
    ///
    /// A page past the end yields an empty item list.
    pub async fn current_page_results(&self) -> Result<PaginatedResponse<T>, PersistenceError> {
        let total = self.adapter.count().await?;
        let data = match (self.current_page - 1).checked_mul(self.max_per_page) {
            Some(offset) if offset < total => self.adapter.slice(offset, self.max_per_page).await?,
            _ => Vec::new(),
        };

        Ok(PaginatedResponse {
            data,
            pagination: PaginationMeta::new(self.current_page, self.max_per_page, total),
        })
    }
}

/// Paginated response structure
#[derive(Debug, Serialize)]
pub struct PaginatedResponse<T> {
    /// The resources of the requested page
    pub data: Vec<T>,

    /// Pagination metadata
    pub pagination: PaginationMeta,
}

/// Pagination metadata
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaginationMeta {
    /// Current page number (starts at 1)
    pub page: usize,

    /// Number of items per page
    pub limit: usize,

    /// Total number of items matching the criteria
    pub total: usize,

    /// Total number of pages
    pub total_pages: usize,

    /// Whether there is a next page
    pub has_next: bool,

    /// Whether there is a previous page
    pub has_prev: bool,
}

impl PaginationMeta {
    pub fn new(page: usize, limit: usize, total: usize) -> Self {
        let page = page.max(1);
        let limit = limit.max(1);
        let total_pages = total.div_ceil(limit);
        let has_next = match (page - 1).checked_mul(limit) {
            Some(start) => start.saturating_add(limit) < total,
            None => false,
        };

        Self {
            page,
            limit,
            total,
            total_pages,
            has_next,
            has_prev: page > 1,
        }
    }
}
