//! Response and redirect composition
//!
//! Actions describe their outcome as a [`ResourceResponse`]; the
//! [`ResponseComposer`] builds them from the resource configuration: API
//! requests get JSON, interactive requests get rendered views or redirects to
//! named routes.

use crate::config::{Action, ResourceConfig};
use crate::core::error::{ConfigError, ErrorResponse, ResourceError, ResourceResult, ValidationError};
use crate::core::feedback::FlashBag;
use crate::core::form::FormState;
use crate::core::resource::Resource;
use anyhow::{Result, anyhow};
use axum::Json;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tera::Tera;

/// Outcome of an action, independent of the HTTP framework
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceResponse {
    Html { status: StatusCode, body: String },
    Json { status: StatusCode, body: Value },
    Redirect { location: String },
    NoContent,
}

impl ResourceResponse {
    pub fn status(&self) -> StatusCode {
        match self {
            ResourceResponse::Html { status, .. } | ResourceResponse::Json { status, .. } => *status,
            ResourceResponse::Redirect { .. } => StatusCode::SEE_OTHER,
            ResourceResponse::NoContent => StatusCode::NO_CONTENT,
        }
    }

    /// Target of a redirect response
    pub fn location(&self) -> Option<&str> {
        match self {
            ResourceResponse::Redirect { location } => Some(location),
            _ => None,
        }
    }

    /// Body of a JSON response
    pub fn json_body(&self) -> Option<&Value> {
        match self {
            ResourceResponse::Json { body, .. } => Some(body),
            _ => None,
        }
    }
}

impl IntoResponse for ResourceResponse {
    fn into_response(self) -> Response {
        match self {
            ResourceResponse::Html { status, body } => (status, Html(body)).into_response(),
            ResourceResponse::Json { status, body } => (status, Json(body)).into_response(),
            ResourceResponse::Redirect { location } => Redirect::to(&location).into_response(),
            ResourceResponse::NoContent => StatusCode::NO_CONTENT.into_response(),
        }
    }
}

/// Renders a named template with a JSON context
pub trait ViewRenderer: Send + Sync {
    fn render(&self, template: &str, context: &Value) -> Result<String>;
}

/// [`ViewRenderer`] backed by tera
pub struct TeraRenderer {
    tera: Tera,
}

impl TeraRenderer {
    /// Load every template matching `glob` (e.g. `templates/**/*.html`)
    pub fn new(glob: &str) -> Result<Self> {
        let tera = Tera::new(glob).map_err(|e| anyhow!("Failed to load templates: {}", e))?;
        Ok(Self { tera })
    }

    pub fn from_tera(tera: Tera) -> Self {
        Self { tera }
    }

    /// A renderer without templates; templates are added with [`TeraRenderer::add_template`]
    pub fn empty() -> Self {
        Self {
            tera: Tera::default(),
        }
    }

    pub fn add_template(&mut self, name: &str, content: &str) -> Result<()> {
        self.tera
            .add_raw_template(name, content)
            .map_err(|e| anyhow!("Failed to add template {}: {}", name, e))
    }
}

impl ViewRenderer for TeraRenderer {
    fn render(&self, template: &str, context: &Value) -> Result<String> {
        let context = tera::Context::from_value(context.clone())
            .map_err(|e| anyhow!("Invalid view context: {}", e))?;
        self.tera
            .render(template, &context)
            .map_err(|e| anyhow!("Failed to render {}: {}", template, e))
    }
}

/// Builds URLs from route names
pub trait UrlGenerator: Send + Sync {
    fn generate(&self, route: &str, params: &[(&str, String)]) -> Result<String>;
}

/// Route table of `{name}` placeholders patterns keyed by route name
#[derive(Debug, Clone, Default)]
pub struct RouteUrlGenerator {
    routes: HashMap<String, String>,
}

impl RouteUrlGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// The five action routes of one resource
    pub fn for_resource(config: &ResourceConfig) -> Self {
        let mut generator = Self::new();
        generator.register(config);
        generator
    }

    pub fn add_route(&mut self, name: impl Into<String>, pattern: impl Into<String>) {
        self.routes.insert(name.into(), pattern.into());
    }

    /// Register the routes served by the HTTP adapter for `config`
    pub fn register(&mut self, config: &ResourceConfig) {
        let base = format!("/{}", config.plural_name());
        self.add_route(config.route_name(Action::Index), base.clone());
        self.add_route(config.route_name(Action::Create), format!("{}/new", base));
        self.add_route(config.route_name(Action::Show), format!("{}/{{id}}", base));
        self.add_route(config.route_name(Action::Update), format!("{}/{{id}}/edit", base));
        self.add_route(config.route_name(Action::Delete), format!("{}/{{id}}", base));
    }
}

impl UrlGenerator for RouteUrlGenerator {
    fn generate(&self, route: &str, params: &[(&str, String)]) -> Result<String> {
        let pattern = self
            .routes
            .get(route)
            .ok_or_else(|| anyhow!("Unknown route: {}", route))?;

        let url = params.iter().fold(pattern.clone(), |url, (name, value)| {
            url.replace(&format!("{{{}}}", name), value)
        });
        if url.contains('{') {
            return Err(anyhow!("Missing parameters for route {}: {}", route, url));
        }
        Ok(url)
    }
}

/// Builds the responses of one resource's actions
#[derive(Clone)]
pub struct ResponseComposer {
    config: Arc<ResourceConfig>,
    renderer: Arc<dyn ViewRenderer>,
    urls: Arc<dyn UrlGenerator>,
}

impl ResponseComposer {
    pub fn new(
        config: Arc<ResourceConfig>,
        renderer: Arc<dyn ViewRenderer>,
        urls: Arc<dyn UrlGenerator>,
    ) -> Self {
        Self {
            config,
            renderer,
            urls,
        }
    }

    pub fn json(&self, status: StatusCode, data: &impl Serialize) -> ResourceResult<ResourceResponse> {
        Ok(ResourceResponse::Json {
            status,
            body: serde_json::to_value(data)?,
        })
    }

    /// Render the template of `action` with `data` exposed as `var`
    ///
    /// The messages waiting in `flashes` are drained into the `flashes` variable.
    pub fn view(
        &self,
        action: Action,
        status: StatusCode,
        var: &str,
        data: Value,
        flashes: &FlashBag,
    ) -> ResourceResult<ResourceResponse> {
        let mut context = Map::new();
        context.insert(var.to_string(), data);
        self.render(action, status, context, flashes)
    }

    /// Render the form template of `action` with submitted values and errors preserved
    pub fn form_view<T: Resource>(
        &self,
        action: Action,
        status: StatusCode,
        resource: &T,
        form: &FormState,
        flashes: &FlashBag,
    ) -> ResourceResult<ResourceResponse> {
        let mut context = Map::new();
        context.insert(self.config.name.clone(), serde_json::to_value(resource)?);
        context.insert("form".to_string(), serde_json::to_value(form)?);
        self.render(action, status, context, flashes)
    }

    /// Structured form errors for API clients
    pub fn form_errors(&self, status: StatusCode, form: &FormState) -> ResourceResult<ResourceResponse> {
        let error = ResourceError::Validation(ValidationError::FieldErrors(form.errors.clone()));
        self.json(status, &error.to_response())
    }

    /// API answer for a mutation a listener stopped
    pub fn stopped(&self, action: Action) -> ResourceResult<ResourceResponse> {
        let response = ErrorResponse {
            code: "OPERATION_STOPPED".to_string(),
            message: format!("{} was not {}.", self.config.display_name(), past_tense(action)),
            details: Some(json!({ "action": action })),
        };
        self.json(StatusCode::UNPROCESSABLE_ENTITY, &response)
    }

    /// Redirect to the show route of `resource`, or to the index without an identifier
    pub fn redirect_to_resource<T: Resource>(&self, resource: &T) -> ResourceResult<ResourceResponse> {
        match resource.identifier() {
            Some(identifier) => self.redirect(Action::Show, &[("id", identifier.to_string())]),
            None => self.redirect_to_index(),
        }
    }

    pub fn redirect_to_index(&self) -> ResourceResult<ResourceResponse> {
        self.redirect(Action::Index, &[])
    }

    pub fn redirect(&self, action: Action, params: &[(&str, String)]) -> ResourceResult<ResourceResponse> {
        let location = self
            .urls
            .generate(&self.config.route_name(action), params)?;
        Ok(ResourceResponse::Redirect { location })
    }

    fn render(
        &self,
        action: Action,
        status: StatusCode,
        mut context: Map<String, Value>,
        flashes: &FlashBag,
    ) -> ResourceResult<ResourceResponse> {
        let template = self
            .config
            .template(action)
            .ok_or_else(|| ConfigError::MissingTemplate {
                resource: self.config.name.clone(),
                action,
            })?;

        context.insert(
            "metadata".to_string(),
            json!({
                "prefix": self.config.prefix,
                "name": self.config.name,
                "plural": self.config.plural_name(),
            }),
        );
        let messages: Vec<Value> = flashes
            .take_all()
            .into_iter()
            .map(|message| {
                json!({
                    "severity": message.severity,
                    "key": message.key,
                    "text": message.text(),
                })
            })
            .collect();
        context.insert("flashes".to_string(), Value::Array(messages));

        let body = self.renderer.render(&template, &Value::Object(context))?;
        Ok(ResourceResponse::Html { status, body })
    }
}

fn past_tense(action: Action) -> &'static str {
    match action {
        Action::Create => "created",
        Action::Update => "updated",
        Action::Delete => "deleted",
        Action::Show | Action::Index => "loaded",
    }
}

/// Response for a failed action
///
/// API clients get the structured [`ErrorResponse`]; interactive clients a
/// plain page carrying the status and message.
pub fn error_response(error: &ResourceError, api: bool) -> Response {
    if api {
        return (error.status_code(), Json(error.to_response())).into_response();
    }

    let status = error.status_code();
    let title = status.canonical_reason().unwrap_or("Error");
    let body = format!(
        "<!DOCTYPE html>\n<html><head><title>{title}</title></head>\
         <body><h1>{title}</h1><p>{}</p></body></html>",
        escape_html(&error.to_string()),
        title = title
    );
    (status, Html(body)).into_response()
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::query::Criteria;

    fn config() -> Arc<ResourceConfig> {
        Arc::new(ResourceConfig::new("app", "book").with_templates("book"))
    }

    fn composer(renderer: TeraRenderer) -> ResponseComposer {
        let config = config();
        ResponseComposer::new(
            config.clone(),
            Arc::new(renderer),
            Arc::new(RouteUrlGenerator::for_resource(&config)),
        )
    }

    #[test]
    fn test_route_generation() {
        let urls = RouteUrlGenerator::for_resource(&config());
        assert_eq!(urls.generate("app_book_index", &[]).unwrap(), "/books");
        assert_eq!(
            urls.generate("app_book_show", &[("id", "dune".into())]).unwrap(),
            "/books/dune"
        );
        assert!(urls.generate("app_book_show", &[]).is_err());
        assert!(urls.generate("app_author_show", &[]).is_err());
    }

    #[test]
    fn test_view_renders_configured_template() {
        let mut renderer = TeraRenderer::empty();
        renderer
            .add_template("book/show.html", "{{ metadata.plural }}: {{ book.title }}")
            .unwrap();

        let response = composer(renderer)
            .view(Action::Show, StatusCode::OK, "book", json!({"title": "Dune"}), &FlashBag::new())
            .unwrap();
        assert_eq!(
            response,
            ResourceResponse::Html {
                status: StatusCode::OK,
                body: "books: Dune".into()
            }
        );
    }

    #[test]
    fn test_view_drains_flashes() {
        use crate::core::feedback::{FeedbackMessage, FeedbackSink};

        let mut renderer = TeraRenderer::empty();
        renderer
            .add_template(
                "book/index.html",
                "{% for f in flashes %}[{{ f.severity }}] {{ f.text }}{% endfor %}",
            )
            .unwrap();
        let books = composer(renderer);
        let flashes = FlashBag::new();
        flashes.add(FeedbackMessage::success("app.resource.create").with_parameter("%resource%", "Book"));

        let first = books
            .view(Action::Index, StatusCode::OK, "books", json!([]), &flashes)
            .unwrap();
        assert_eq!(
            first,
            ResourceResponse::Html {
                status: StatusCode::OK,
                body: "[success] Book has been successfully created.".into()
            }
        );
        assert!(flashes.is_empty());

        let second = books
            .view(Action::Index, StatusCode::OK, "books", json!([]), &flashes)
            .unwrap();
        assert_eq!(
            second,
            ResourceResponse::Html {
                status: StatusCode::OK,
                body: String::new()
            }
        );
    }

    #[test]
    fn test_missing_template_is_config_error() {
        let config = Arc::new(ResourceConfig::new("app", "book"));
        let composer = ResponseComposer::new(
            config.clone(),
            Arc::new(TeraRenderer::empty()),
            Arc::new(RouteUrlGenerator::for_resource(&config)),
        );
        let err = composer
            .view(Action::Index, StatusCode::OK, "books", json!([]), &FlashBag::new())
            .unwrap_err();
        assert!(matches!(
            err,
            ResourceError::Config(ConfigError::MissingTemplate { .. })
        ));
    }

    #[test]
    fn test_interactive_error_page_escapes_message() {
        let mut criteria = Criteria::new();
        criteria.insert("slug".into(), json!("<b>"));
        let error = ResourceError::not_found("book", criteria);

        let response = error_response(&error, false);
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(escape_html("<b>&"), "&lt;b&gt;&amp;");
    }

    #[test]
    fn test_stopped_response() {
        let response = composer(TeraRenderer::empty()).stopped(Action::Create).unwrap();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(response.json_body().unwrap()["code"], "OPERATION_STOPPED");
    }
}
