//! Transport-neutral view of an incoming request

use crate::core::auth::AuthContext;
use crate::core::feedback::FlashBag;
use crate::core::query::{Criteria, Sorting};
use crate::core::resource::ResourceIdentifier;
use axum::http::Method;
use serde_json::Value;
use std::sync::Arc;
use uuid::Uuid;

/// Everything an action reads from a request
#[derive(Debug, Clone)]
pub struct ResourceRequest {
    pub method: Method,
    /// Target of show, update and delete
    pub identifier: Option<ResourceIdentifier>,
    /// Requested page of the index action (1-based)
    pub page: Option<usize>,
    /// Requested format (`html`, `json`, ...)
    pub format: String,
    /// Submitted form data
    pub body: Option<Value>,
    pub filter: Option<Criteria>,
    pub sort: Option<Sorting>,
    pub auth: AuthContext,
    /// Feedback recorded while serving this request, drained by rendered views
    pub flashes: Arc<FlashBag>,
}

impl Default for ResourceRequest {
    fn default() -> Self {
        Self::new(Method::GET)
    }
}

impl ResourceRequest {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            identifier: None,
            page: None,
            format: "html".to_string(),
            body: None,
            filter: None,
            sort: None,
            auth: AuthContext::Anonymous,
            flashes: Arc::new(FlashBag::new()),
        }
    }

    pub fn get() -> Self {
        Self::new(Method::GET)
    }

    pub fn post() -> Self {
        Self::new(Method::POST)
    }

    pub fn put() -> Self {
        Self::new(Method::PUT)
    }

    pub fn patch() -> Self {
        Self::new(Method::PATCH)
    }

    pub fn delete() -> Self {
        Self::new(Method::DELETE)
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.identifier = Some(ResourceIdentifier::Id(id));
        self
    }

    pub fn with_slug(mut self, slug: impl Into<String>) -> Self {
        self.identifier = Some(ResourceIdentifier::Slug(slug.into()));
        self
    }

    pub fn with_identifier(mut self, identifier: ResourceIdentifier) -> Self {
        self.identifier = Some(identifier);
        self
    }

    pub fn with_page(mut self, page: usize) -> Self {
        self.page = Some(page);
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = format.into();
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_filter(mut self, filter: Criteria) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_sort(mut self, sort: Sorting) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn with_auth(mut self, auth: AuthContext) -> Self {
        self.auth = auth;
        self
    }

    /// Record feedback into `bag` instead of a fresh one
    pub fn with_flashes(mut self, bag: Arc<FlashBag>) -> Self {
        self.flashes = bag;
        self
    }

    /// Requested page, defaulting to the first
    pub fn page(&self) -> usize {
        self.page.unwrap_or(1).max(1)
    }

    pub fn is_method(&self, method: &Method) -> bool {
        &self.method == method
    }

    /// Whether the request submits data for a create (POST only)
    pub fn submits_creation(&self) -> bool {
        self.method == Method::POST
    }

    /// Whether the request submits data for an update (PUT, PATCH or POST)
    pub fn submits_update(&self) -> bool {
        matches!(self.method, Method::PUT | Method::PATCH | Method::POST)
    }
}
