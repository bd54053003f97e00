//! Resource configuration descriptors
//!
//! A [`ResourceConfig`] describes everything the generic controller needs to
//! know about one resource type: its names, templates, pagination, default
//! criteria and sorting, role mapping and which request formats are API calls.
//! Descriptors are built once (usually from YAML) and shared read-only as
//! `Arc<ResourceConfig>`; every lookup is a pure function of the descriptor.
//!
//! ```yaml
//! resources:
//!   - name: article
//!     prefix: blog
//!     driver: relational-orm
//!     templates: blog/article
//!     pagination: { enabled: true, max_per_page: 20 }
//!     sorting: { published_at: desc }
//!     role_prefix: ROLE
//!     roles:
//!       show: ~            # no restriction
//!       index: ~
//! ```

use crate::core::driver::{DriverKind, ResourceMetadata};
use crate::core::error::ConfigError;
use crate::core::events::LifecyclePhase;
use crate::core::naming;
use crate::core::query::{Criteria, DEFAULT_MAX_PER_PAGE, Sorting};
use crate::core::request::ResourceRequest;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// The five canonical resource actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Show,
    Index,
    Create,
    Update,
    Delete,
}

impl Action {
    pub const ALL: [Action; 5] = [
        Action::Show,
        Action::Index,
        Action::Create,
        Action::Update,
        Action::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Show => "show",
            Action::Index => "index",
            Action::Create => "create",
            Action::Update => "update",
            Action::Delete => "delete",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pagination settings for the index action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaginationConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_max_per_page")]
    pub max_per_page: usize,
}

impl Default for PaginationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_per_page: DEFAULT_MAX_PER_PAGE,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_per_page() -> usize {
    DEFAULT_MAX_PER_PAGE
}

fn default_prefix() -> String {
    "app".to_string()
}

fn default_driver() -> String {
    DriverKind::RelationalOrm.as_str().to_string()
}

fn default_api_formats() -> Vec<String> {
    vec!["json".to_string(), "xml".to_string()]
}

/// Configuration descriptor for one resource type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceConfig {
    /// Application prefix used in service, event, route and flash names
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Singular snake_case name (e.g., "article")
    pub name: String,

    /// Plural name; derived from `name` when absent
    #[serde(default)]
    pub plural: Option<String>,

    /// Driver kind (see [`DriverKind`])
    #[serde(default = "default_driver")]
    pub driver: String,

    /// Template namespace; `show` resolves to `{templates}/show.html`
    #[serde(default)]
    pub templates: Option<String>,

    /// Per-action template overrides
    #[serde(default)]
    pub template_overrides: HashMap<Action, String>,

    /// Form type identifier; defaults to `{prefix}_{name}`
    #[serde(default)]
    pub form_type: Option<String>,

    #[serde(default)]
    pub pagination: PaginationConfig,

    /// Maximum number of resources listed when pagination is disabled
    #[serde(default)]
    pub limit: Option<usize>,

    /// Criteria applied to every lookup
    #[serde(default)]
    pub criteria: Criteria,

    /// Default sort order of the index action
    #[serde(default)]
    pub sorting: Sorting,

    /// Whether request filters may extend the criteria
    #[serde(default)]
    pub filterable: bool,

    /// Whether the request sort may replace the default sorting
    #[serde(default)]
    pub sortable: bool,

    /// Prefix of generated role names (`{role_prefix}_{PREFIX}_{NAME}_{ACTION}`)
    #[serde(default)]
    pub role_prefix: Option<String>,

    /// Explicit role per action; a `null` entry means no restriction
    #[serde(default)]
    pub roles: HashMap<Action, Option<String>>,

    /// Request formats answered with structured data instead of views
    #[serde(default = "default_api_formats")]
    pub api_formats: Vec<String>,
}

impl ResourceConfig {
    /// Create a configuration with defaults for every optional setting
    pub fn new(prefix: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            name: name.into(),
            plural: None,
            driver: default_driver(),
            templates: None,
            template_overrides: HashMap::new(),
            form_type: None,
            pagination: PaginationConfig::default(),
            limit: None,
            criteria: Criteria::new(),
            sorting: Sorting::new(),
            filterable: false,
            sortable: false,
            role_prefix: None,
            roles: HashMap::new(),
            api_formats: default_api_formats(),
        }
    }

    /// Load a single resource configuration from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    pub fn with_driver(mut self, kind: DriverKind) -> Self {
        self.driver = kind.as_str().to_string();
        self
    }

    pub fn with_templates(mut self, namespace: impl Into<String>) -> Self {
        self.templates = Some(namespace.into());
        self
    }

    pub fn with_pagination(mut self, max_per_page: usize) -> Self {
        self.pagination = PaginationConfig {
            enabled: true,
            max_per_page,
        };
        self
    }

    pub fn without_pagination(mut self, limit: Option<usize>) -> Self {
        self.pagination.enabled = false;
        self.limit = limit;
        self
    }

    pub fn with_role(mut self, action: Action, role: Option<&str>) -> Self {
        self.roles.insert(action, role.map(str::to_string));
        self
    }

    pub fn with_role_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.role_prefix = Some(prefix.into());
        self
    }

    pub fn with_criteria(mut self, criteria: Criteria) -> Self {
        self.criteria = criteria;
        self
    }

    pub fn with_sorting(mut self, sorting: Sorting) -> Self {
        self.sorting = sorting;
        self
    }

    // === Naming ===

    pub fn resource_name(&self) -> &str {
        &self.name
    }

    pub fn plural_name(&self) -> String {
        self.plural
            .clone()
            .unwrap_or_else(|| naming::pluralize(&self.name))
    }

    /// Human-readable name used in messages ("Blog post")
    pub fn display_name(&self) -> String {
        naming::humanize(&self.name)
    }

    /// Service identifier of a collaborator (`{prefix}.{kind}.{name}`)
    pub fn service_name(&self, kind: &str) -> String {
        format!("{}.{}.{}", self.prefix, kind, self.name)
    }

    pub fn event_name(&self, phase: LifecyclePhase) -> String {
        format!("{}.{}.{}", self.prefix, self.name, phase.as_str())
    }

    pub fn route_name(&self, action: Action) -> String {
        format!("{}_{}_{}", self.prefix, self.name, action)
    }

    /// Translation key of the success message for an action
    pub fn flash_key(&self, action: Action) -> String {
        format!("{}.resource.{}", self.prefix, action)
    }

    pub fn form_type(&self) -> String {
        self.form_type
            .clone()
            .unwrap_or_else(|| format!("{}_{}", self.prefix, self.name))
    }

    pub fn metadata(&self) -> ResourceMetadata {
        ResourceMetadata {
            prefix: self.prefix.clone(),
            name: self.name.clone(),
            plural: self.plural_name(),
        }
    }

    // === Lookups ===

    /// Template reference for an action; an override wins over the namespace
    pub fn template(&self, action: Action) -> Option<String> {
        if let Some(template) = self.template_overrides.get(&action) {
            return Some(template.clone());
        }
        self.templates
            .as_ref()
            .map(|namespace| format!("{}/{}.html", namespace, action))
    }

    /// Role required for an action, `None` when the action is unrestricted
    ///
    /// Without an explicit entry the role is generated as
    /// `{role_prefix}_{prefix}_{name}_{action}`, uppercased.
    pub fn role(&self, action: Action) -> Option<String> {
        if let Some(explicit) = self.roles.get(&action) {
            return explicit.clone();
        }
        self.role_prefix.as_ref().map(|prefix| {
            format!("{}_{}_{}_{}", prefix, self.prefix, self.name, action).to_uppercase()
        })
    }

    /// Configured criteria overridden by `extra`
    pub fn criteria(&self, extra: &Criteria) -> Criteria {
        let mut merged = self.criteria.clone();
        for (field, value) in extra {
            merged.insert(field.clone(), value.clone());
        }
        merged
    }

    /// Criteria for a listing, including request filters when allowed
    pub fn request_criteria(&self, request: &ResourceRequest) -> Criteria {
        match (&request.filter, self.filterable) {
            (Some(filter), true) => self.criteria(filter),
            _ => self.criteria.clone(),
        }
    }

    /// Sort order for a listing, taken from the request when allowed
    pub fn request_sorting(&self, request: &ResourceRequest) -> Sorting {
        match (&request.sort, self.sortable) {
            (Some(sort), true) if !sort.is_empty() => sort.clone(),
            _ => self.sorting.clone(),
        }
    }

    pub fn is_paginated(&self) -> bool {
        self.pagination.enabled
    }

    pub fn max_per_page(&self) -> usize {
        self.pagination.max_per_page
    }

    pub fn limit(&self) -> Option<usize> {
        self.limit
    }

    /// Whether the request expects structured data instead of a rendered view
    pub fn is_api_request(&self, request: &ResourceRequest) -> bool {
        self.api_formats
            .iter()
            .any(|format| format.eq_ignore_ascii_case(&request.format))
    }

    /// Check the settings that can only be wrong at wiring time
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "name".into(),
                value: self.name.clone(),
                message: "resource name must not be empty".into(),
            });
        }
        DriverKind::from_str(&self.driver)?;
        if self.pagination.enabled && self.pagination.max_per_page == 0 {
            return Err(ConfigError::InvalidValue {
                field: "pagination.max_per_page".into(),
                value: "0".into(),
                message: "page size must be at least 1".into(),
            });
        }
        Ok(())
    }
}

/// Configuration for a set of resources
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourcesConfig {
    #[serde(default)]
    pub resources: Vec<ResourceConfig>,
}

impl ResourcesConfig {
    /// Load configuration from a YAML file
    pub fn from_yaml_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
            file: Some(path.to_string()),
            message: e.to_string(),
        })
    }

    /// Load configuration from a YAML string
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Merge another configuration into this one
    ///
    /// A resource defined in both (same prefix and name) is replaced by the
    /// definition from `other`; new resources are appended in order.
    pub fn merge(mut self, other: ResourcesConfig) -> Self {
        for resource in other.resources {
            match self
                .resources
                .iter_mut()
                .find(|r| r.prefix == resource.prefix && r.name == resource.name)
            {
                Some(existing) => *existing = resource,
                None => self.resources.push(resource),
            }
        }
        self
    }

    /// Find a resource by name
    pub fn get(&self, name: &str) -> Option<&ResourceConfig> {
        self.resources.iter().find(|r| r.name == name)
    }

    /// Validate every resource, failing on the first misconfiguration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.resources.iter().try_for_each(ResourceConfig::validate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::query::SortDirection;
    use serde_json::json;

    const YAML: &str = r#"
resources:
  - name: article
    prefix: blog
    templates: blog/article
    template_overrides:
      index: blog/article/list.html
    pagination: { max_per_page: 5 }
    criteria: { status: published }
    sorting: { published_at: desc, title: asc }
    role_prefix: ROLE
    roles:
      show: ~
      delete: ROLE_EDITOR
  - name: category
    driver: document-odm
    pagination: { enabled: false }
    limit: 50
"#;

    fn article() -> ResourceConfig {
        ResourcesConfig::from_yaml_str(YAML)
            .unwrap()
            .get("article")
            .cloned()
            .unwrap()
    }

    #[test]
    fn test_yaml_defaults() {
        let config = ResourcesConfig::from_yaml_str(YAML).unwrap();
        config.validate().unwrap();

        let category = config.get("category").unwrap();
        assert_eq!(category.prefix, "app");
        assert_eq!(category.plural_name(), "categories");
        assert!(!category.is_paginated());
        assert_eq!(category.limit(), Some(50));
        assert_eq!(category.template(Action::Show), None);
        assert_eq!(category.role(Action::Delete), None);
        assert_eq!(category.form_type(), "app_category");
    }

    #[test]
    fn test_templates() {
        let config = article();
        assert_eq!(
            config.template(Action::Show).as_deref(),
            Some("blog/article/show.html")
        );
        assert_eq!(
            config.template(Action::Index).as_deref(),
            Some("blog/article/list.html")
        );
    }

    #[test]
    fn test_roles() {
        let config = article();
        assert_eq!(config.role(Action::Show), None);
        assert_eq!(config.role(Action::Delete).as_deref(), Some("ROLE_EDITOR"));
        assert_eq!(
            config.role(Action::Update).as_deref(),
            Some("ROLE_BLOG_ARTICLE_UPDATE")
        );
    }

    #[test]
    fn test_names() {
        let config = article();
        assert_eq!(config.service_name("repository"), "blog.repository.article");
        assert_eq!(
            config.event_name(LifecyclePhase::PreCreate),
            "blog.article.pre_create"
        );
        assert_eq!(config.route_name(Action::Show), "blog_article_show");
        assert_eq!(config.flash_key(Action::Create), "blog.resource.create");
        assert_eq!(config.metadata().plural, "articles");
    }

    #[test]
    fn test_criteria_merge_extra_wins() {
        let config = article();
        let extra = json!({"slug": "intro", "status": "draft"})
            .as_object()
            .cloned()
            .unwrap();
        let merged = config.criteria(&extra);
        assert_eq!(merged.get("status"), Some(&json!("draft")));
        assert_eq!(merged.get("slug"), Some(&json!("intro")));
        assert_eq!(config.criteria(&Criteria::new()).get("status"), Some(&json!("published")));
    }

    #[test]
    fn test_sorting_keeps_declared_order() {
        let config = article();
        let keys: Vec<_> = config.sorting.keys().cloned().collect();
        assert_eq!(keys, vec!["published_at", "title"]);
        assert_eq!(config.sorting["published_at"], SortDirection::Desc);
    }

    #[test]
    fn test_request_filters_only_when_enabled() {
        let mut config = article();
        let mut request = ResourceRequest::get();
        request.filter = json!({"author": "ada"}).as_object().cloned();
        assert!(config.request_criteria(&request).get("author").is_none());

        config.filterable = true;
        assert_eq!(
            config.request_criteria(&request).get("author"),
            Some(&json!("ada"))
        );
    }

    #[test]
    fn test_api_detection() {
        let config = article();
        assert!(!config.is_api_request(&ResourceRequest::get()));
        assert!(config.is_api_request(&ResourceRequest::get().with_format("json")));
        assert!(config.is_api_request(&ResourceRequest::get().with_format("XML")));
    }

    #[test]
    fn test_validate_rejects_unknown_driver() {
        let yaml = "resources:\n  - name: order\n    driver: unknown-backend\n";
        let config = ResourcesConfig::from_yaml_str(yaml).unwrap();
        match config.validate() {
            Err(ConfigError::DriverNotFound { kind }) => assert_eq!(kind, "unknown-backend"),
            other => panic!("Expected DriverNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_merge_replaces_and_appends() {
        let base = ResourcesConfig::from_yaml_str(YAML).unwrap();
        let other = ResourcesConfig {
            resources: vec![
                ResourceConfig::new("app", "category").without_pagination(Some(10)),
                ResourceConfig::new("app", "tag"),
            ],
        };
        let merged = base.merge(other);
        assert_eq!(merged.resources.len(), 3);
        assert_eq!(merged.get("category").unwrap().limit(), Some(10));
        assert!(merged.get("tag").is_some());
    }
}
