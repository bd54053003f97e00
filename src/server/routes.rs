//! axum adapter: resource descriptors, the registry and HTTP handlers
//!
//! Each registered resource contributes these routes:
//!
//! | Method             | Path                     | Action |
//! |--------------------|--------------------------|--------|
//! | GET                | `/{plural}`              | index  |
//! | GET                | `/{plural}/new`          | create (form) |
//! | POST               | `/{plural}`              | create |
//! | GET                | `/{plural}/{id}`         | show   |
//! | GET                | `/{plural}/{id}/edit`    | update (form) |
//! | PUT, PATCH, POST   | `/{plural}/{id}`         | update |
//! | DELETE             | `/{plural}/{id}`         | delete |
//!
//! Path segments that parse as UUIDs address resources by id, anything else
//! by slug. The format comes from the `_format` query parameter, else from an
//! `Accept: application/json` header. HTML forms may tunnel `PUT`, `PATCH` and
//! `DELETE` through a `_method` field.
//!
//! Flash messages recorded by a request that ends in a redirect travel to the
//! next request in the `resource_flashes` cookie, which that request clears.

use crate::config::Action;
use crate::core::feedback::{FeedbackMessage, FeedbackSink, FlashBag};
use crate::core::query::{Criteria, parse_sort};
use crate::core::request::ResourceRequest;
use crate::core::resource::{Resource, ResourceIdentifier};
use crate::server::controller::ResourceController;
use crate::server::response::error_response;
use axum::extract::{FromRequest, Path, Query, Request, State};
use axum::http::{HeaderMap, HeaderValue, Method, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Form, Json, Router};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};

/// Describes how to build the routes of one resource
pub trait ResourceDescriptor: Send + Sync {
    /// Singular resource name (e.g., "article")
    fn resource_name(&self) -> &str;

    /// Plural form used in paths (e.g., "articles")
    fn plural(&self) -> String;

    fn build_routes(&self) -> Router;
}

impl<T: Resource> ResourceDescriptor for ResourceController<T> {
    fn resource_name(&self) -> &str {
        &self.config().name
    }

    fn plural(&self) -> String {
        self.config().plural_name()
    }

    fn build_routes(&self) -> Router {
        let base = format!("/{}", self.plural());
        Router::new()
            .route(&base, get(index::<T>).post(create::<T>))
            .route(&format!("{}/new", base), get(create::<T>))
            .route(
                &format!("{}/{{id}}", base),
                get(show::<T>)
                    .put(update::<T>)
                    .patch(update::<T>)
                    .post(update::<T>)
                    .delete(delete::<T>),
            )
            .route(&format!("{}/{{id}}/edit", base), get(update::<T>))
            .with_state(self.clone())
    }
}

/// Registry of every resource exposed over HTTP
#[derive(Default)]
pub struct ResourceRegistry {
    descriptors: BTreeMap<String, Box<dyn ResourceDescriptor>>,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor; a second descriptor with the same name replaces the first
    pub fn register(&mut self, descriptor: impl ResourceDescriptor + 'static) -> &mut Self {
        let name = descriptor.resource_name().to_string();
        tracing::debug!(resource = %name, plural = %descriptor.plural(), "registering resource routes");
        self.descriptors.insert(name, Box::new(descriptor));
        self
    }

    /// Merge the routes of every registered resource
    pub fn build_routes(&self) -> Router {
        self.descriptors
            .values()
            .fold(Router::new(), |router, descriptor| {
                router.merge(descriptor.build_routes())
            })
    }

    pub fn resource_names(&self) -> Vec<&str> {
        self.descriptors.keys().map(|s| s.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Request mapping
// ---------------------------------------------------------------------------

/// Build the transport-neutral request from query parameters and headers
fn resource_request(
    method: Method,
    headers: &HeaderMap,
    query: &HashMap<String, String>,
    identifier: Option<&str>,
) -> ResourceRequest {
    let mut request = ResourceRequest::new(method).with_format(request_format(headers, query));

    if let Some(segment) = identifier {
        request = request.with_identifier(ResourceIdentifier::parse(segment));
    }
    if let Some(page) = query.get("page").and_then(|p| p.parse().ok()) {
        request = request.with_page(page);
    }
    if let Some(sort) = query.get("sort") {
        request = request.with_sort(parse_sort(sort));
    }

    let filter: Criteria = query
        .iter()
        .filter_map(|(key, value)| {
            let field = key.strip_prefix("filter[")?.strip_suffix(']')?;
            Some((field.to_string(), filter_value(value)))
        })
        .collect();
    if !filter.is_empty() {
        request = request.with_filter(filter);
    }
    request
}

/// Query values are strings; numbers, booleans and `null` are read as such
fn filter_value(raw: &str) -> Value {
    match serde_json::from_str::<Value>(raw) {
        Ok(value @ (Value::Number(_) | Value::Bool(_) | Value::Null)) => value,
        _ => Value::String(raw.to_string()),
    }
}

fn request_format(headers: &HeaderMap, query: &HashMap<String, String>) -> String {
    if let Some(format) = query.get("_format") {
        return format.to_ascii_lowercase();
    }
    let accepts_json = headers
        .get(header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|accept| accept.contains("application/json"));
    let format = if accepts_json { "json" } else { "html" };
    format.to_string()
}

/// Read the submitted body as a JSON value (JSON or url-encoded form)
async fn submitted_body(request: Request) -> Result<Option<Value>, Response> {
    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();

    if content_type.starts_with("application/x-www-form-urlencoded") {
        let Form(fields) = Form::<HashMap<String, String>>::from_request(request, &())
            .await
            .map_err(IntoResponse::into_response)?;
        let object: Map<String, Value> = fields
            .into_iter()
            .map(|(field, value)| (field, Value::String(value)))
            .collect();
        return Ok(Some(Value::Object(object)));
    }

    if content_type.contains("json") {
        let Json(body) = Json::<Value>::from_request(request, &())
            .await
            .map_err(IntoResponse::into_response)?;
        return Ok(Some(body));
    }

    Ok(None)
}

/// Method after applying a `_method` override from a POSTed form
fn effective_method(method: Method, body: &mut Option<Value>) -> Method {
    if method != Method::POST {
        return method;
    }
    let overridden = body
        .as_mut()
        .and_then(Value::as_object_mut)
        .and_then(|fields| fields.remove("_method"))
        .and_then(|value| value.as_str().map(str::to_ascii_uppercase));

    match overridden.as_deref() {
        Some("PUT") => Method::PUT,
        Some("PATCH") => Method::PATCH,
        Some("DELETE") => Method::DELETE,
        _ => method,
    }
}

// ---------------------------------------------------------------------------
// Flash carry-over
// ---------------------------------------------------------------------------

const FLASH_COOKIE: &str = "resource_flashes";

fn flash_cookie(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .find_map(|pair| pair.trim().strip_prefix(FLASH_COOKIE)?.strip_prefix('='))
}

/// Load the messages a previous redirect left behind; unreadable cookies are ignored
fn restore_flashes(encoded: &str, bag: &FlashBag) {
    let messages = URL_SAFE_NO_PAD
        .decode(encoded)
        .ok()
        .and_then(|bytes| serde_json::from_slice::<Vec<FeedbackMessage>>(&bytes).ok())
        .unwrap_or_default();
    for message in messages {
        bag.add(message);
    }
}

fn flash_set_cookie(messages: &[FeedbackMessage]) -> Option<HeaderValue> {
    let json = serde_json::to_vec(messages).ok()?;
    let cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax",
        FLASH_COOKIE,
        URL_SAFE_NO_PAD.encode(json)
    );
    HeaderValue::from_str(&cookie).ok()
}

fn flash_clear_cookie() -> HeaderValue {
    HeaderValue::from_static("resource_flashes=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax")
}

async fn run<T: Resource>(
    controller: &ResourceController<T>,
    action: Action,
    headers: &HeaderMap,
    request: ResourceRequest,
) -> Response {
    let incoming = flash_cookie(headers);
    if let Some(encoded) = incoming {
        restore_flashes(encoded, &request.flashes);
    }

    let api = controller.config().is_api_request(&request);
    let mut response = match controller.handle(action, &request).await {
        Ok(response) => {
            let redirect = response.location().is_some();
            let mut response = response.into_response();
            // Undrained messages only outlive the request across a redirect
            let pending = request.flashes.take_all();
            if redirect && !pending.is_empty() {
                if let Some(cookie) = flash_set_cookie(&pending) {
                    response.headers_mut().append(header::SET_COOKIE, cookie);
                    return response;
                }
            }
            response
        }
        Err(error) => {
            if !error.is_recoverable() {
                tracing::error!(
                    resource = %controller.config().name,
                    action = %action,
                    error = %error,
                    "action failed"
                );
            }
            error_response(&error, api)
        }
    };

    if incoming.is_some() {
        response
            .headers_mut()
            .append(header::SET_COOKIE, flash_clear_cookie());
    }
    response
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn index<T: Resource>(
    State(controller): State<ResourceController<T>>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let mut request = resource_request(Method::GET, &headers, &query, None);
    request.auth = controller.auth_context(&headers);
    run(&controller, Action::Index, &headers, request).await
}

async fn show<T: Resource>(
    State(controller): State<ResourceController<T>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let mut request = resource_request(Method::GET, &headers, &query, Some(&id));
    request.auth = controller.auth_context(&headers);
    run(&controller, Action::Show, &headers, request).await
}

async fn create<T: Resource>(
    State(controller): State<ResourceController<T>>,
    Query(query): Query<HashMap<String, String>>,
    http: Request,
) -> Response {
    let method = http.method().clone();
    let headers = http.headers().clone();
    let body = match submitted_body(http).await {
        Ok(body) => body,
        Err(rejection) => return rejection,
    };

    let mut request = resource_request(method, &headers, &query, None);
    request.auth = controller.auth_context(&headers);
    request.body = body;
    run(&controller, Action::Create, &headers, request).await
}

async fn update<T: Resource>(
    State(controller): State<ResourceController<T>>,
    Path(id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    http: Request,
) -> Response {
    mutate(controller, id, query, http).await
}

async fn delete<T: Resource>(
    State(controller): State<ResourceController<T>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    let mut request = resource_request(Method::DELETE, &headers, &query, Some(&id));
    request.auth = controller.auth_context(&headers);
    run(&controller, Action::Delete, &headers, request).await
}

/// Dispatch a request on `/{plural}/{id}` that carries a body to update or delete
async fn mutate<T: Resource>(
    controller: ResourceController<T>,
    id: String,
    query: HashMap<String, String>,
    http: Request,
) -> Response {
    let method = http.method().clone();
    let headers = http.headers().clone();
    let mut body = match submitted_body(http).await {
        Ok(body) => body,
        Err(rejection) => return rejection,
    };
    let method = effective_method(method, &mut body);

    let mut request = resource_request(method.clone(), &headers, &query, Some(&id));
    request.auth = controller.auth_context(&headers);
    request.body = body;

    let action = if method == Method::DELETE {
        Action::Delete
    } else {
        Action::Update
    };
    run(&controller, action, &headers, request).await
}
