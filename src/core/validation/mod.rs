//! Declarative field rules for form binding
//!
//! A [`FieldRules`] set declares which fields a form accepts and, per field,
//! the filters that normalize submitted values and the validators that check
//! the resulting resource.
//!
//! ```rust,ignore
//! let rules = FieldRules::new()
//!     .field("title", |f| f.filter(filters::trim()).validate(validators::required()))
//!     .field("slug", |f| f.filter(filters::slugify()))
//!     .field("status", |f| f.validate(validators::in_list(vec!["draft".into()])));
//! ```

pub mod filters;
pub mod validators;

use crate::core::error::FieldValidationError;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use std::sync::Arc;

type Validator = Arc<dyn Fn(&str, &Value) -> Result<(), String> + Send + Sync>;
type Filter = Arc<dyn Fn(&str, Value) -> anyhow::Result<Value> + Send + Sync>;

/// Filters and validators of one field, applied in declaration order
#[derive(Clone, Default)]
pub struct FieldRule {
    filters: Vec<Filter>,
    validators: Vec<Validator>,
}

impl FieldRule {
    pub fn filter(
        mut self,
        filter: impl Fn(&str, Value) -> anyhow::Result<Value> + Send + Sync + 'static,
    ) -> Self {
        self.filters.push(Arc::new(filter));
        self
    }

    pub fn validate(
        mut self,
        validator: impl Fn(&str, &Value) -> Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        self.validators.push(Arc::new(validator));
        self
    }
}

/// The accepted fields of a form and their rules
#[derive(Clone, Default)]
pub struct FieldRules {
    fields: IndexMap<String, FieldRule>,
}

impl FieldRules {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a field, configuring its rule with `build`
    pub fn field(mut self, name: impl Into<String>, build: impl FnOnce(FieldRule) -> FieldRule) -> Self {
        let name = name.into();
        let rule = self.fields.shift_remove(&name).unwrap_or_default();
        self.fields.insert(name, build(rule));
        self
    }

    /// Declare fields that are bound as submitted
    pub fn fields<'a>(mut self, names: impl IntoIterator<Item = &'a str>) -> Self {
        for name in names {
            self.fields.entry(name.to_string()).or_default();
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn accepts(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Run the filters of each submitted field
    ///
    /// Returns the filtered values of accepted fields; fields that are not
    /// declared are dropped. With no declared fields every value is kept.
    pub fn filter(&self, submitted: &Map<String, Value>) -> (Map<String, Value>, Vec<FieldValidationError>) {
        let mut values = Map::new();
        let mut errors = Vec::new();

        for (field, value) in submitted {
            let Some(rule) = self.fields.get(field) else {
                if self.fields.is_empty() {
                    values.insert(field.clone(), value.clone());
                }
                continue;
            };

            let filtered = rule
                .filters
                .iter()
                .try_fold(value.clone(), |value, filter| filter(field.as_str(), value));
            match filtered {
                Ok(value) => {
                    values.insert(field.clone(), value);
                }
                Err(e) => {
                    errors.push(FieldValidationError::field(field.clone(), e.to_string()));
                    values.insert(field.clone(), value.clone());
                }
            }
        }

        (values, errors)
    }

    /// Run the validators of every declared field against `data`
    ///
    /// Missing fields are validated as `null`.
    pub fn validate(&self, data: &Map<String, Value>) -> Vec<FieldValidationError> {
        let mut errors = Vec::new();
        for (field, rule) in &self.fields {
            let value = data.get(field).unwrap_or(&Value::Null);
            for validator in &rule.validators {
                if let Err(message) = validator(field.as_str(), value) {
                    errors.push(FieldValidationError::field(field.clone(), message));
                }
            }
        }
        errors
    }
}
