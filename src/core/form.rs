//! Form binding
//!
//! A [`FormBinder`] merges submitted data into a resource and reports whether
//! the result is valid. The resource is only modified when binding succeeds;
//! the submitted values are kept on the [`FormState`] so an invalid form can be
//! shown again as the user filled it.

use crate::core::error::FieldValidationError;
use crate::core::request::ResourceRequest;
use crate::core::resource::Resource;
use crate::core::validation::FieldRules;
use serde::Serialize;
use serde_json::{Map, Value};
use std::marker::PhantomData;

/// Outcome of binding a request to a resource
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FormState {
    /// Form type identifier
    pub name: String,
    pub submitted: bool,
    pub values: Map<String, Value>,
    pub errors: Vec<FieldValidationError>,
}

impl FormState {
    /// An unsubmitted form showing `values`
    pub fn new(name: impl Into<String>, values: Map<String, Value>) -> Self {
        Self {
            name: name.into(),
            submitted: false,
            values,
            errors: Vec::new(),
        }
    }

    /// Whether the form was submitted without errors
    pub fn is_valid(&self) -> bool {
        self.submitted && self.errors.is_empty()
    }

    /// Attach an error that concerns the whole form
    pub fn add_global_error(&mut self, message: impl Into<String>) {
        self.errors.push(FieldValidationError::global(message));
    }

    /// Errors of one field
    pub fn field_errors(&self, field: &str) -> Vec<&str> {
        self.errors
            .iter()
            .filter(|e| e.field.as_deref() == Some(field))
            .map(|e| e.message.as_str())
            .collect()
    }

    /// Errors not attached to a field
    pub fn global_errors(&self) -> Vec<&str> {
        self.errors
            .iter()
            .filter(|e| e.field.is_none())
            .map(|e| e.message.as_str())
            .collect()
    }
}

/// Binds submitted data to resources of type `T`
pub trait FormBinder<T: Resource>: Send + Sync {
    /// The form for an existing resource, before any submission
    fn create_view(&self, resource: &T) -> FormState;

    /// Bind the request body to `resource`
    ///
    /// On success the resource holds the submitted values. On failure it is
    /// left untouched and the returned state carries the errors.
    fn bind(&self, resource: &mut T, request: &ResourceRequest) -> FormState;
}

/// Binds JSON object bodies field by field through [`FieldRules`]
pub struct JsonFormBinder<T> {
    name: String,
    rules: FieldRules,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Resource> JsonFormBinder<T> {
    pub fn new(name: impl Into<String>, rules: FieldRules) -> Self {
        Self {
            name: name.into(),
            rules,
            _marker: PhantomData,
        }
    }

    fn resource_object(&self, resource: &T) -> Result<Map<String, Value>, String> {
        match serde_json::to_value(resource) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(_) => Err(format!("{} does not serialize to an object", T::resource_name())),
            Err(e) => Err(e.to_string()),
        }
    }

    fn visible_values(&self, object: Map<String, Value>) -> Map<String, Value> {
        if self.rules.is_empty() {
            object
        } else {
            object
                .into_iter()
                .filter(|(field, _)| self.rules.accepts(field))
                .collect()
        }
    }
}

impl<T: Resource> FormBinder<T> for JsonFormBinder<T> {
    fn create_view(&self, resource: &T) -> FormState {
        let values = self
            .resource_object(resource)
            .map(|object| self.visible_values(object))
            .unwrap_or_default();
        FormState::new(self.name.clone(), values)
    }

    fn bind(&self, resource: &mut T, request: &ResourceRequest) -> FormState {
        let mut state = FormState {
            name: self.name.clone(),
            submitted: true,
            ..FormState::default()
        };

        let submitted = match &request.body {
            None => Map::new(),
            Some(Value::Object(map)) => map.clone(),
            Some(_) => {
                state.add_global_error("Submitted data must be a JSON object.");
                return state;
            }
        };

        let (mut values, filter_errors) = self.rules.filter(&submitted);
        values.remove("id");
        state.values = values;
        state.errors = filter_errors;

        let mut merged = match self.resource_object(resource) {
            Ok(object) => object,
            Err(message) => {
                state.add_global_error(message);
                return state;
            }
        };
        for (field, value) in &state.values {
            merged.insert(field.clone(), value.clone());
        }

        state.errors.extend(self.rules.validate(&merged));
        if !state.errors.is_empty() {
            tracing::debug!(
                form = %self.name,
                errors = state.errors.len(),
                "form is invalid"
            );
            return state;
        }

        match serde_json::from_value::<T>(Value::Object(merged)) {
            Ok(bound) => *resource = bound,
            Err(e) => state.add_global_error(format!("This value is not valid: {}", e)),
        }
        state
    }
}
