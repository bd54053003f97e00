//! Authorization for resource actions
//!
//! Every action asks the [`AuthorizationGate`] before touching a driver. The
//! gate resolves the role an action requires from the resource configuration
//! and asks the [`AuthorizationChecker`] whether the request's
//! [`AuthContext`] holds it. An action without a role is unrestricted.

use crate::config::{Action, ResourceConfig};
use crate::core::error::ResourceError;
use crate::core::request::ResourceRequest;
use crate::core::resource::ResourceIdentifier;
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use uuid::Uuid;

/// Who is making a request
#[derive(Debug, Clone, Default)]
pub enum AuthContext {
    /// Authenticated user with granted roles
    User { user_id: Uuid, roles: Vec<String> },

    /// Service-to-service call
    Service { service_name: String },

    /// System administrator
    Admin { admin_id: Uuid },

    /// No authentication
    #[default]
    Anonymous,
}

impl AuthContext {
    pub fn user(roles: &[&str]) -> Self {
        AuthContext::User {
            user_id: Uuid::new_v4(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, AuthContext::Admin { .. })
    }

    pub fn is_anonymous(&self) -> bool {
        matches!(self, AuthContext::Anonymous)
    }

    pub fn user_id(&self) -> Option<Uuid> {
        match self {
            AuthContext::User { user_id, .. } => Some(*user_id),
            AuthContext::Admin { admin_id } => Some(*admin_id),
            _ => None,
        }
    }

    pub fn has_role(&self, role: &str) -> bool {
        match self {
            AuthContext::User { roles, .. } => roles.iter().any(|r| r == role),
            AuthContext::Admin { .. } => true,
            _ => false,
        }
    }
}

/// Decides whether a context holds a role
///
/// `subject` identifies the resource the action targets, when there is one.
#[async_trait]
pub trait AuthorizationChecker: Send + Sync {
    async fn is_granted(
        &self,
        context: &AuthContext,
        role: &str,
        subject: Option<&ResourceIdentifier>,
    ) -> Result<bool>;
}

/// Grants every role (development and tests)
pub struct GrantAll;

#[async_trait]
impl AuthorizationChecker for GrantAll {
    async fn is_granted(&self, _: &AuthContext, _: &str, _: Option<&ResourceIdentifier>) -> Result<bool> {
        Ok(true)
    }
}

/// Grants a role when the context carries it; administrators hold every role
pub struct RoleChecker;

#[async_trait]
impl AuthorizationChecker for RoleChecker {
    async fn is_granted(
        &self,
        context: &AuthContext,
        role: &str,
        _subject: Option<&ResourceIdentifier>,
    ) -> Result<bool> {
        Ok(context.has_role(role))
    }
}

/// Enforces the configured role of each action
#[derive(Clone)]
pub struct AuthorizationGate {
    config: Arc<ResourceConfig>,
    checker: Arc<dyn AuthorizationChecker>,
}

impl AuthorizationGate {
    pub fn new(config: Arc<ResourceConfig>, checker: Arc<dyn AuthorizationChecker>) -> Self {
        Self { config, checker }
    }

    /// Fail with [`ResourceError::AccessDenied`] unless the request may run `action`
    pub async fn authorize_or_fail(
        &self,
        action: Action,
        request: &ResourceRequest,
    ) -> Result<(), ResourceError> {
        let Some(role) = self.config.role(action) else {
            return Ok(());
        };

        let granted = self
            .checker
            .is_granted(&request.auth, &role, request.identifier.as_ref())
            .await?;

        if granted {
            Ok(())
        } else {
            tracing::warn!(
                resource = %self.config.name,
                action = %action,
                role = %role,
                "access denied"
            );
            Err(ResourceError::AccessDenied { action, role })
        }
    }
}
