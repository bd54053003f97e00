//! The generic resource controller
//!
//! One [`ResourceController`] serves the five canonical actions of one
//! resource type. Every action authorizes first, then resolves its data
//! through the [`OperationResolver`], delegates mutations to the
//! [`DomainManager`] and lets the [`ResponseComposer`] shape the answer.
//!
//! ```rust,ignore
//! let controller = ResourceController::<Article>::builder(config)
//!     .backend(Backend::InMemory)
//!     .renderer(Arc::new(TeraRenderer::new("templates/**/*.html")?))
//!     .checker(Arc::new(RoleChecker))
//!     .build()?;
//!
//! let response = controller.show(&ResourceRequest::get().with_slug("hello")).await?;
//! ```

use crate::config::{Action, ResourceConfig};
use crate::core::auth::{AuthContext, AuthorizationChecker, AuthorizationGate, GrantAll};
use crate::core::driver::{Backend, Driver, DriverArgs, DriverSelector};
use crate::core::error::{ConfigError, ResourceError, ResourceResult};
use crate::core::events::{EventBus, EventDispatcher};
use crate::core::form::{FormBinder, FormState, JsonFormBinder};
use crate::core::manager::DomainManager;
use crate::core::operation::{Operation, OperationOutput, OperationResolver};
use crate::core::query::Criteria;
use crate::core::request::ResourceRequest;
use crate::core::resource::Resource;
use crate::core::validation::FieldRules;
use crate::server::response::{
    ResourceResponse, ResponseComposer, RouteUrlGenerator, TeraRenderer, UrlGenerator,
    ViewRenderer,
};
use axum::http::{HeaderMap, StatusCode};
use std::sync::Arc;

/// Maps request headers to the caller's [`AuthContext`] in the HTTP adapter
pub type AuthResolver = Arc<dyn Fn(&HeaderMap) -> AuthContext + Send + Sync>;

/// Serves show, index, create, update and delete for resources of type `T`
pub struct ResourceController<T: Resource> {
    config: Arc<ResourceConfig>,
    driver: Arc<dyn Driver<T>>,
    gate: AuthorizationGate,
    manager: Arc<DomainManager<T>>,
    form: Arc<dyn FormBinder<T>>,
    composer: ResponseComposer,
    auth_resolver: AuthResolver,
}

impl<T: Resource> Clone for ResourceController<T> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            driver: self.driver.clone(),
            gate: self.gate.clone(),
            manager: self.manager.clone(),
            form: self.form.clone(),
            composer: self.composer.clone(),
            auth_resolver: self.auth_resolver.clone(),
        }
    }
}

impl<T: Resource> ResourceController<T> {
    pub fn builder(config: ResourceConfig) -> ResourceControllerBuilder<T> {
        ResourceControllerBuilder::new(config)
    }

    pub fn config(&self) -> &ResourceConfig {
        &self.config
    }

    pub fn driver(&self) -> &Arc<dyn Driver<T>> {
        &self.driver
    }

    pub(crate) fn auth_context(&self, headers: &HeaderMap) -> AuthContext {
        (self.auth_resolver)(headers)
    }

    /// Run `action` for `request`
    pub async fn handle(
        &self,
        action: Action,
        request: &ResourceRequest,
    ) -> ResourceResult<ResourceResponse> {
        match action {
            Action::Show => self.show(request).await,
            Action::Index => self.index(request).await,
            Action::Create => self.create(request).await,
            Action::Update => self.update(request).await,
            Action::Delete => self.delete(request).await,
        }
    }

    /// Display one resource
    pub async fn show(&self, request: &ResourceRequest) -> ResourceResult<ResourceResponse> {
        self.gate.authorize_or_fail(Action::Show, request).await?;
        let resource = self.find_or_404(request).await?;

        if self.config.is_api_request(request) {
            return self.composer.json(StatusCode::OK, &resource);
        }
        self.composer.view(
            Action::Show,
            StatusCode::OK,
            &self.config.name,
            serde_json::to_value(&resource)?,
            &request.flashes,
        )
    }

    /// List resources, paginated when the configuration says so
    pub async fn index(&self, request: &ResourceRequest) -> ResourceResult<ResourceResponse> {
        self.gate.authorize_or_fail(Action::Index, request).await?;

        let criteria = self.config.request_criteria(request);
        let sorting = self.config.request_sorting(request);

        let data = if self.config.is_paginated() {
            let operation = Operation::CreatePaginator { criteria, sorting };
            let OperationOutput::Paginator(mut paginator) = self.resolve(operation).await? else {
                return Err(unexpected_output("createPaginator"));
            };
            paginator
                .set_current_page(request.page())
                .set_max_per_page(self.config.max_per_page());
            serde_json::to_value(paginator.current_page_results().await?)?
        } else {
            let operation = Operation::FindBy {
                criteria,
                sorting,
                limit: self.config.limit(),
            };
            let OperationOutput::Many(resources) = self.resolve(operation).await? else {
                return Err(unexpected_output("findBy"));
            };
            serde_json::to_value(resources)?
        };

        if self.config.is_api_request(request) {
            return self.composer.json(StatusCode::OK, &data);
        }
        self.composer.view(
            Action::Index,
            StatusCode::OK,
            &self.config.plural_name(),
            data,
            &request.flashes,
        )
    }

    /// Show the creation form, or bind and persist a submitted one
    pub async fn create(&self, request: &ResourceRequest) -> ResourceResult<ResourceResponse> {
        self.gate.authorize_or_fail(Action::Create, request).await?;
        let api = self.config.is_api_request(request);

        let OperationOutput::New(mut resource) = self.resolve(Operation::CreateNew).await? else {
            return Err(unexpected_output("createNew"));
        };

        if !request.submits_creation() {
            let form = self.form.create_view(&resource);
            return self.form_response(request, Action::Create, StatusCode::OK, &resource, &form);
        }

        let mut form = self.form.bind(&mut resource, request);
        if !form.is_valid() {
            return self.form_response(request, Action::Create, StatusCode::BAD_REQUEST, &resource, &form);
        }

        match self.manager.create(resource.clone(), request.flashes.as_ref()).await {
            Ok(Some(created)) if api => self.composer.json(StatusCode::CREATED, &created),
            Ok(Some(created)) => self.composer.redirect_to_resource(&created),
            Ok(None) if api => self.composer.stopped(Action::Create),
            Ok(None) => self.composer.redirect_to_index(),
            Err(ResourceError::Persistence(e)) => {
                form.add_global_error(e.to_string());
                self.form_response(request, Action::Create, e.status_code(), &resource, &form)
            }
            Err(e) => Err(e),
        }
    }

    /// Show the edit form, or bind and persist a submitted one
    pub async fn update(&self, request: &ResourceRequest) -> ResourceResult<ResourceResponse> {
        self.gate.authorize_or_fail(Action::Update, request).await?;
        let api = self.config.is_api_request(request);
        let mut resource = self.find_or_404(request).await?;

        if !request.submits_update() {
            let form = self.form.create_view(&resource);
            return self.form_response(request, Action::Update, StatusCode::OK, &resource, &form);
        }

        let mut form = self.form.bind(&mut resource, request);
        if !form.is_valid() {
            return self.form_response(request, Action::Update, StatusCode::BAD_REQUEST, &resource, &form);
        }

        match self.manager.update(resource.clone(), request.flashes.as_ref()).await {
            Ok(Some(updated)) if api => self.composer.json(StatusCode::OK, &updated),
            Ok(Some(updated)) => self.composer.redirect_to_resource(&updated),
            Ok(None) if api => self.composer.stopped(Action::Update),
            Ok(None) => self.composer.redirect_to_resource(&resource),
            Err(ResourceError::Persistence(e)) => {
                form.add_global_error(e.to_string());
                self.form_response(request, Action::Update, e.status_code(), &resource, &form)
            }
            Err(e) => Err(e),
        }
    }

    /// Remove a resource and go back to the index
    pub async fn delete(&self, request: &ResourceRequest) -> ResourceResult<ResourceResponse> {
        self.gate.authorize_or_fail(Action::Delete, request).await?;
        let api = self.config.is_api_request(request);
        let resource = self.find_or_404(request).await?;
        let identifier = resource.identifier();

        match self.manager.delete(resource, request.flashes.as_ref()).await? {
            Some(_) if api => Ok(ResourceResponse::NoContent),
            Some(_) => self.composer.redirect_to_index(),
            None if api => self.composer.stopped(Action::Delete),
            None => match identifier {
                Some(identifier) => self
                    .composer
                    .redirect(Action::Show, &[("id", identifier.to_string())]),
                None => self.composer.redirect_to_index(),
            },
        }
    }

    /// The resource addressed by the request, or [`ResourceError::NotFound`]
    ///
    /// A request without an identifier addresses nothing and fails without a lookup.
    pub async fn find_or_404(&self, request: &ResourceRequest) -> ResourceResult<T> {
        let Some(identifier) = request.identifier.as_ref() else {
            let mut missing = Criteria::new();
            missing.insert("id".to_string(), serde_json::Value::Null);
            return Err(ResourceError::not_found(
                self.config.name.clone(),
                self.config.criteria(&missing),
            ));
        };
        let criteria = self.config.criteria(&identifier.criteria());

        let found = self
            .resolve(Operation::FindOneBy {
                criteria: criteria.clone(),
            })
            .await?
            .into_one();
        found.ok_or_else(|| ResourceError::not_found(self.config.name.clone(), criteria))
    }

    async fn resolve(&self, operation: Operation) -> ResourceResult<OperationOutput<T>> {
        Ok(OperationResolver::resolve(self.driver.as_ref(), operation).await?)
    }

    fn form_response(
        &self,
        request: &ResourceRequest,
        action: Action,
        status: StatusCode,
        resource: &T,
        form: &FormState,
    ) -> ResourceResult<ResourceResponse> {
        if self.config.is_api_request(request) {
            if form.submitted {
                return self.composer.form_errors(status, form);
            }
            return self
                .composer
                .json(StatusCode::OK, &serde_json::json!({ "form": form }));
        }
        // Interactive forms are re-rendered with the submitted values
        let status = if status.is_server_error() { status } else { StatusCode::OK };
        self.composer
            .form_view(action, status, resource, form, &request.flashes)
    }
}

fn unexpected_output(operation: &str) -> ResourceError {
    ResourceError::Internal(format!("{} resolved to an unexpected output", operation))
}

/// Read the caller from `X-User-Id` and `X-User-Roles` (comma separated)
///
/// Requests without roles are anonymous.
pub fn header_auth_resolver(headers: &HeaderMap) -> AuthContext {
    let roles: Vec<String> = headers
        .get("X-User-Roles")
        .and_then(|value| value.to_str().ok())
        .map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|role| !role.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    if roles.is_empty() {
        return AuthContext::Anonymous;
    }
    let user_id = headers
        .get("X-User-Id")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| uuid::Uuid::parse_str(value).ok())
        .unwrap_or_else(uuid::Uuid::nil);
    AuthContext::User { user_id, roles }
}

/// Wires a [`ResourceController`] from its collaborators
///
/// Only the driver (or a backend to build it from) is mandatory. The other
/// collaborators default to: grant everything, no listeners, a binder
/// accepting every field, an empty tera renderer and the
/// resource's own route table.
pub struct ResourceControllerBuilder<T: Resource> {
    config: ResourceConfig,
    driver: Option<Arc<dyn Driver<T>>>,
    backend: Option<Backend>,
    checker: Arc<dyn AuthorizationChecker>,
    dispatcher: EventDispatcher<T>,
    form: Option<Arc<dyn FormBinder<T>>>,
    renderer: Arc<dyn ViewRenderer>,
    urls: Option<Arc<dyn UrlGenerator>>,
    event_bus: Option<EventBus>,
    auth_resolver: AuthResolver,
}

impl<T: Resource> ResourceControllerBuilder<T> {
    pub fn new(config: ResourceConfig) -> Self {
        Self {
            config,
            driver: None,
            backend: None,
            checker: Arc::new(GrantAll),
            dispatcher: EventDispatcher::new(),
            form: None,
            renderer: Arc::new(TeraRenderer::empty()),
            urls: None,
            event_bus: None,
            auth_resolver: Arc::new(header_auth_resolver),
        }
    }

    /// Use this driver as is
    pub fn driver(mut self, driver: Arc<dyn Driver<T>>) -> Self {
        self.driver = Some(driver);
        self
    }

    /// Build the configured driver kind on this backend
    pub fn backend(mut self, backend: Backend) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn checker(mut self, checker: Arc<dyn AuthorizationChecker>) -> Self {
        self.checker = checker;
        self
    }

    pub fn dispatcher(mut self, dispatcher: EventDispatcher<T>) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn form(mut self, form: Arc<dyn FormBinder<T>>) -> Self {
        self.form = Some(form);
        self
    }

    /// Bind forms through a [`JsonFormBinder`] with these rules
    pub fn form_rules(mut self, rules: FieldRules) -> Self {
        self.form = Some(Arc::new(JsonFormBinder::<T>::new(self.config.form_type(), rules)));
        self
    }

    pub fn renderer(mut self, renderer: Arc<dyn ViewRenderer>) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn urls(mut self, urls: Arc<dyn UrlGenerator>) -> Self {
        self.urls = Some(urls);
        self
    }

    pub fn event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn auth_resolver(
        mut self,
        resolver: impl Fn(&HeaderMap) -> AuthContext + Send + Sync + 'static,
    ) -> Self {
        self.auth_resolver = Arc::new(resolver);
        self
    }

    pub fn build(self) -> Result<ResourceController<T>, ConfigError> {
        self.config.validate()?;
        let config = Arc::new(self.config);

        let driver = match (self.driver, self.backend) {
            (Some(driver), _) => driver,
            (None, Some(backend)) => DriverSelector::select::<T>(
                &config.driver,
                DriverArgs {
                    metadata: config.metadata(),
                    backend,
                },
            )?,
            (None, None) => {
                return Err(ConfigError::InvalidValue {
                    field: "driver".into(),
                    value: config.driver.clone(),
                    message: "no driver or backend was provided".into(),
                });
            }
        };

        let mut manager =
            DomainManager::new(config.clone(), driver.clone(), Arc::new(self.dispatcher));
        if let Some(bus) = self.event_bus {
            manager = manager.with_event_bus(bus);
        }

        let form = self.form.unwrap_or_else(|| {
            Arc::new(JsonFormBinder::<T>::new(config.form_type(), FieldRules::new()))
        });
        let urls = self
            .urls
            .unwrap_or_else(|| Arc::new(RouteUrlGenerator::for_resource(&config)));

        tracing::debug!(
            resource = %config.name,
            driver = %driver.kind(),
            "resource controller ready"
        );

        Ok(ResourceController {
            gate: AuthorizationGate::new(config.clone(), self.checker),
            composer: ResponseComposer::new(config.clone(), self.renderer, urls),
            manager: Arc::new(manager),
            config,
            driver,
            form,
            auth_resolver: self.auth_resolver,
        })
    }
}
