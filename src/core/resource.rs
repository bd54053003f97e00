//! The resource abstraction managed by the orchestrator

use crate::core::query::Criteria;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use std::fmt;
use uuid::Uuid;

/// Base trait for every resource type handled by a controller.
///
/// Resources are plain serde types. The orchestrator never inspects their
/// fields directly: drivers match criteria against the serialized form, the
/// API mode returns it as-is and form binding merges submitted fields into it.
///
/// `Default` is the `createNew` constructor: it yields an unsaved instance
/// without an id. Drivers assign the id when the resource is first written.
///
/// The serialized form must expose the id under `id` (and the slug under
/// `slug` when slugs are used), since identifier lookups are plain criteria.
pub trait Resource:
    Clone + Default + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// The singular resource name (e.g., "article")
    fn resource_name() -> &'static str;

    /// Surrogate identifier, `None` until persisted
    fn id(&self) -> Option<Uuid>;

    /// Called by drivers when the resource is first written
    fn assign_id(&mut self, id: Uuid);

    /// Human-readable unique key used in URLs, if the resource has one
    fn slug(&self) -> Option<&str> {
        None
    }

    /// Identifier to address this resource in routes, preferring the surrogate id
    fn identifier(&self) -> Option<ResourceIdentifier> {
        self.id()
            .map(ResourceIdentifier::Id)
            .or_else(|| self.slug().map(|s| ResourceIdentifier::Slug(s.to_string())))
    }
}

/// How a single resource is addressed by a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceIdentifier {
    Id(Uuid),
    Slug(String),
}

impl ResourceIdentifier {
    /// Parse a path segment: UUIDs are ids, anything else is a slug
    pub fn parse(segment: &str) -> Self {
        match Uuid::parse_str(segment) {
            Ok(id) => ResourceIdentifier::Id(id),
            Err(_) => ResourceIdentifier::Slug(segment.to_string()),
        }
    }

    /// The lookup criteria for this identifier (`{"id": ..}` or `{"slug": ..}`)
    pub fn criteria(&self) -> Criteria {
        let mut criteria = Criteria::new();
        match self {
            ResourceIdentifier::Id(id) => criteria.insert("id".into(), json!(id.to_string())),
            ResourceIdentifier::Slug(slug) => criteria.insert("slug".into(), json!(slug)),
        };
        criteria
    }
}

impl fmt::Display for ResourceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceIdentifier::Id(id) => write!(f, "{}", id),
            ResourceIdentifier::Slug(slug) => write!(f, "{}", slug),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_identifier() {
        let id = Uuid::new_v4();
        assert_eq!(
            ResourceIdentifier::parse(&id.to_string()),
            ResourceIdentifier::Id(id)
        );
        assert_eq!(
            ResourceIdentifier::parse("hello-world"),
            ResourceIdentifier::Slug("hello-world".into())
        );
    }

    #[test]
    fn test_identifier_criteria() {
        let id = Uuid::new_v4();
        let criteria = ResourceIdentifier::Id(id).criteria();
        assert_eq!(criteria.get("id"), Some(&json!(id.to_string())));

        let criteria = ResourceIdentifier::Slug("intro".into()).criteria();
        assert_eq!(criteria.get("slug"), Some(&json!("intro")));
        assert!(criteria.get("id").is_none());
    }
}
