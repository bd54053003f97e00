//! Typed error handling for the resource orchestrator
//!
//! Every action of a [`ResourceController`](crate::server::ResourceController)
//! fails with a [`ResourceError`]. The variants follow the lifetime of a request:
//!
//! - [`ResourceError::Config`]: wiring problems (unknown driver kind, unknown
//!   operation, missing template). Raised at startup when possible.
//! - [`ResourceError::AccessDenied`]: the authorization gate refused the action.
//!   Always raised before the driver is touched.
//! - [`ResourceError::NotFound`]: a singular lookup matched nothing.
//! - [`ResourceError::Validation`]: submitted data was rejected.
//! - [`ResourceError::Persistence`]: the driver failed while writing.
//!
//! # Example
//!
//! ```rust,ignore
//! match controller.show(&request).await {
//!     Ok(response) => response.into_response(),
//!     Err(ResourceError::NotFound { resource, .. }) => {
//!         tracing::debug!("{} not found", resource);
//!         StatusCode::NOT_FOUND.into_response()
//!     }
//!     Err(e) => e.into_response(),
//! }
//! ```

use crate::config::Action;
use crate::core::naming;
use crate::core::query::Criteria;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use std::fmt;

/// The main error type for the resource orchestrator
#[derive(Debug)]
pub enum ResourceError {
    /// A singular lookup matched nothing
    NotFound {
        resource: String,
        criteria: Criteria,
    },

    /// The authorization collaborator denied the role required for an action
    AccessDenied { action: Action, role: String },

    /// Submitted data was rejected
    Validation(ValidationError),

    /// The persistence driver failed during a write
    Persistence(PersistenceError),

    /// Configuration or wiring errors
    Config(ConfigError),

    /// Collaborator failures that have no better category
    Internal(String),
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceError::NotFound { resource, criteria } => {
                let criteria = serde_json::Value::Object(criteria.clone());
                write!(
                    f,
                    "Requested {} does not exist with these criteria: {}.",
                    naming::humanize(resource),
                    criteria
                )
            }
            ResourceError::AccessDenied { action, role } => {
                write!(f, "Access denied: action '{}' requires {}", action, role)
            }
            ResourceError::Validation(e) => write!(f, "{}", e),
            ResourceError::Persistence(e) => write!(f, "{}", e),
            ResourceError::Config(e) => write!(f, "{}", e),
            ResourceError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for ResourceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ResourceError::Validation(e) => Some(e),
            ResourceError::Persistence(e) => Some(e),
            ResourceError::Config(e) => Some(e),
            _ => None,
        }
    }
}

/// Error response structure for HTTP responses
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Optional additional details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ResourceError {
    /// Build a not-found error for a resource and the criteria that missed
    pub fn not_found(resource: impl Into<String>, criteria: Criteria) -> Self {
        ResourceError::NotFound {
            resource: resource.into(),
            criteria,
        }
    }

    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            ResourceError::NotFound { .. } => StatusCode::NOT_FOUND,
            ResourceError::AccessDenied { .. } => StatusCode::FORBIDDEN,
            ResourceError::Validation(_) => StatusCode::BAD_REQUEST,
            ResourceError::Persistence(e) => e.status_code(),
            ResourceError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ResourceError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            ResourceError::NotFound { .. } => "RESOURCE_NOT_FOUND",
            ResourceError::AccessDenied { .. } => "ACCESS_DENIED",
            ResourceError::Validation(_) => "VALIDATION_ERROR",
            ResourceError::Persistence(e) => e.error_code(),
            ResourceError::Config(e) => e.error_code(),
            ResourceError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the user can recover from this error by changing the request
    ///
    /// Not-found and validation outcomes are rendered back into the interactive
    /// flow; everything else terminates the request.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ResourceError::NotFound { .. } | ResourceError::Validation(_)
        )
    }

    /// Convert to an error response
    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            code: self.error_code().to_string(),
            message: self.to_string(),
            details: self.details(),
        }
    }

    fn details(&self) -> Option<serde_json::Value> {
        match self {
            ResourceError::NotFound { resource, criteria } => Some(serde_json::json!({
                "resource": resource,
                "criteria": criteria,
            })),
            ResourceError::AccessDenied { action, role } => Some(serde_json::json!({
                "action": action,
                "role": role,
            })),
            ResourceError::Validation(ValidationError::FieldErrors(errors)) => {
                Some(serde_json::json!({ "fields": errors }))
            }
            ResourceError::Config(ConfigError::DriverNotFound { kind }) => {
                Some(serde_json::json!({ "kind": kind }))
            }
            _ => None,
        }
    }
}

impl IntoResponse for ResourceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(self.to_response());
        (status, body).into_response()
    }
}

// =============================================================================
// Persistence Errors
// =============================================================================

/// Errors raised by persistence drivers
///
/// Drivers return empty results for lookups that match nothing; these errors
/// only describe genuine backend failures.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    /// An update or delete targeted a resource the backend does not hold
    #[error("{resource} '{id}' is not persisted")]
    Missing { resource: String, id: String },

    /// A uniqueness or integrity constraint rejected the write
    #[error("{resource} violates constraint '{constraint}': {message}")]
    ConstraintViolation {
        resource: String,
        constraint: String,
        message: String,
    },

    /// A concurrent modification was detected by the backend
    #[error("{resource} was modified concurrently: {message}")]
    Conflict { resource: String, message: String },

    /// The resource could not be converted to or from the backend format
    #[error("failed to (de)serialize {resource}: {message}")]
    Serialization { resource: String, message: String },

    /// Any other backend failure
    #[error("{backend} error: {message}")]
    Backend { backend: String, message: String },
}

impl PersistenceError {
    pub fn backend(backend: impl Into<String>, message: impl ToString) -> Self {
        PersistenceError::Backend {
            backend: backend.into(),
            message: message.to_string(),
        }
    }

    pub fn serialization(resource: impl Into<String>, message: impl ToString) -> Self {
        PersistenceError::Serialization {
            resource: resource.into(),
            message: message.to_string(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            PersistenceError::Missing { .. } => StatusCode::NOT_FOUND,
            PersistenceError::ConstraintViolation { .. } => StatusCode::CONFLICT,
            PersistenceError::Conflict { .. } => StatusCode::CONFLICT,
            PersistenceError::Serialization { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            PersistenceError::Backend { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            PersistenceError::Missing { .. } => "RESOURCE_NOT_PERSISTED",
            PersistenceError::ConstraintViolation { .. } => "CONSTRAINT_VIOLATION",
            PersistenceError::Conflict { .. } => "CONCURRENT_MODIFICATION",
            PersistenceError::Serialization { .. } => "SERIALIZATION_ERROR",
            PersistenceError::Backend { .. } => "STORAGE_ERROR",
        }
    }
}

impl From<PersistenceError> for ResourceError {
    fn from(err: PersistenceError) -> Self {
        ResourceError::Persistence(err)
    }
}

// =============================================================================
// Config Errors
// =============================================================================

/// Errors related to configuration and wiring
#[derive(Debug)]
pub enum ConfigError {
    /// The declared driver kind has no builder
    DriverNotFound { kind: String },

    /// A known driver kind was paired with a backend handle it cannot use
    BackendMismatch { kind: String, backend: String },

    /// An operation name outside the resolver whitelist
    UnknownOperation { name: String },

    /// An action needs a template but none is configured
    MissingTemplate { resource: String, action: Action },

    /// Invalid value in configuration
    InvalidValue {
        field: String,
        value: String,
        message: String,
    },

    /// Failed to parse configuration
    ParseError {
        file: Option<String>,
        message: String,
    },

    /// IO error while reading configuration
    IoError { message: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::DriverNotFound { kind } => {
                write!(f, "Unknown driver kind '{}'", kind)
            }
            ConfigError::BackendMismatch { kind, backend } => {
                write!(
                    f,
                    "Driver kind '{}' cannot be built from a {} backend",
                    kind, backend
                )
            }
            ConfigError::UnknownOperation { name } => {
                write!(f, "Unknown repository operation '{}'", name)
            }
            ConfigError::MissingTemplate { resource, action } => {
                write!(f, "No template configured for {} {}", resource, action)
            }
            ConfigError::InvalidValue {
                field,
                value,
                message,
            } => {
                write!(
                    f,
                    "Invalid value '{}' for field '{}': {}",
                    value, field, message
                )
            }
            ConfigError::ParseError { file, message } => {
                if let Some(file) = file {
                    write!(f, "Failed to parse config file '{}': {}", file, message)
                } else {
                    write!(f, "Failed to parse config: {}", message)
                }
            }
            ConfigError::IoError { message } => {
                write!(f, "IO error: {}", message)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl ConfigError {
    pub fn error_code(&self) -> &'static str {
        match self {
            ConfigError::DriverNotFound { .. } => "DRIVER_NOT_FOUND",
            ConfigError::BackendMismatch { .. } => "BACKEND_MISMATCH",
            ConfigError::UnknownOperation { .. } => "UNKNOWN_OPERATION",
            ConfigError::MissingTemplate { .. } => "MISSING_TEMPLATE",
            _ => "CONFIG_ERROR",
        }
    }
}

impl From<ConfigError> for ResourceError {
    fn from(err: ConfigError) -> Self {
        ResourceError::Config(err)
    }
}

// =============================================================================
// Validation Errors
// =============================================================================

/// Errors related to submitted data
#[derive(Debug)]
pub enum ValidationError {
    /// One or more fields were rejected
    FieldErrors(Vec<FieldValidationError>),

    /// The submitted body is not a JSON object
    InvalidJson { message: String },
}

/// A single field validation error
///
/// `field` is `None` for errors that concern the whole form.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldValidationError {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub message: String,
}

impl FieldValidationError {
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: Some(field.into()),
            message: message.into(),
        }
    }

    pub fn global(message: impl Into<String>) -> Self {
        Self {
            field: None,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::FieldErrors(errors) => {
                let msgs: Vec<String> = errors
                    .iter()
                    .map(|e| match &e.field {
                        Some(field) => format!("{}: {}", field, e.message),
                        None => e.message.clone(),
                    })
                    .collect();
                write!(f, "Validation errors: {}", msgs.join(", "))
            }
            ValidationError::InvalidJson { message } => {
                write!(f, "Invalid JSON: {}", message)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationError> for ResourceError {
    fn from(err: ValidationError) -> Self {
        ResourceError::Validation(err)
    }
}

// =============================================================================
// Conversions from external errors
// =============================================================================

impl From<serde_json::Error> for ResourceError {
    fn from(err: serde_json::Error) -> Self {
        ResourceError::Internal(format!("serialization failed: {}", err))
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::IoError {
            message: err.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::ParseError {
            file: None,
            message: err.to_string(),
        }
    }
}

/// Collaborators report failures through `anyhow`
impl From<anyhow::Error> for ResourceError {
    fn from(err: anyhow::Error) -> Self {
        ResourceError::Internal(format!("{:#}", err))
    }
}

/// A specialized Result type for resource operations
pub type ResourceResult<T> = Result<T, ResourceError>;
