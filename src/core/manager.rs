//! Transactional domain layer for resource mutations
//!
//! Each mutation runs the same sequence:
//!
//! ```text
//! begin ─▶ pre event ─┬─ stopped ─▶ rollback ─▶ stop message ─▶ None
//!                     └─ write ─▶ commit ─▶ post event ─▶ success flash ─▶ publish ─▶ Some(resource)
//! ```
//!
//! A failed write rolls back and surfaces as
//! [`ResourceError::Persistence`](crate::core::error::ResourceError::Persistence)
//! without dispatching the post event. Once the commit succeeded the mutation
//! is reported as done: a failing post listener is logged, not returned.
//!
//! Feedback goes to the sink handed in with each call, normally the flash bag
//! of the request being served.

use crate::config::{Action, ResourceConfig};
use crate::core::driver::{Driver, DriverTransaction};
use crate::core::error::ResourceResult;
use crate::core::events::{EventBus, EventDispatcher, LifecyclePhase, ResourceChange, ResourceEvent};
use crate::core::feedback::{FeedbackSink, FlashHelper};
use crate::core::resource::Resource;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mutation {
    Create,
    Update,
    Delete,
}

impl Mutation {
    fn action(self) -> Action {
        match self {
            Mutation::Create => Action::Create,
            Mutation::Update => Action::Update,
            Mutation::Delete => Action::Delete,
        }
    }

    fn phases(self) -> (LifecyclePhase, LifecyclePhase) {
        match self {
            Mutation::Create => (LifecyclePhase::PreCreate, LifecyclePhase::PostCreate),
            Mutation::Update => (LifecyclePhase::PreUpdate, LifecyclePhase::PostUpdate),
            Mutation::Delete => (LifecyclePhase::PreDelete, LifecyclePhase::PostDelete),
        }
    }
}

/// Runs create, update and delete inside a driver transaction with events and feedback
pub struct DomainManager<T: Resource> {
    config: Arc<ResourceConfig>,
    driver: Arc<dyn Driver<T>>,
    dispatcher: Arc<EventDispatcher<T>>,
    flash: FlashHelper,
    event_bus: Option<EventBus>,
}

impl<T: Resource> DomainManager<T> {
    pub fn new(
        config: Arc<ResourceConfig>,
        driver: Arc<dyn Driver<T>>,
        dispatcher: Arc<EventDispatcher<T>>,
    ) -> Self {
        Self {
            flash: FlashHelper::new(config.clone()),
            config,
            driver,
            dispatcher,
            event_bus: None,
        }
    }

    /// Publish committed mutations on `bus`
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.event_bus = Some(bus);
        self
    }

    /// Persist a new resource; `None` when a listener stopped the creation
    pub async fn create(&self, resource: T, feedback: &dyn FeedbackSink) -> ResourceResult<Option<T>> {
        self.apply(Mutation::Create, resource, feedback).await
    }

    /// Persist changes; `None` when a listener stopped the update
    pub async fn update(&self, resource: T, feedback: &dyn FeedbackSink) -> ResourceResult<Option<T>> {
        self.apply(Mutation::Update, resource, feedback).await
    }

    /// Remove a resource; `None` when a listener stopped the deletion
    pub async fn delete(&self, resource: T, feedback: &dyn FeedbackSink) -> ResourceResult<Option<T>> {
        self.apply(Mutation::Delete, resource, feedback).await
    }

    async fn apply(
        &self,
        mutation: Mutation,
        resource: T,
        feedback: &dyn FeedbackSink,
    ) -> ResourceResult<Option<T>> {
        let (pre, post) = mutation.phases();
        let mut tx = self.driver.begin().await?;

        let mut event = ResourceEvent::new(pre, self.config.event_name(pre), resource);
        if let Err(e) = self.dispatcher.dispatch(&mut event).await {
            Self::rollback(tx).await;
            return Err(e.into());
        }

        let (resource, stopped, message) = event.into_parts();
        if stopped {
            tracing::warn!(
                resource = %self.config.name,
                event = %self.config.event_name(pre),
                "mutation stopped by listener"
            );
            Self::rollback(tx).await;
            if let Some(message) = message {
                feedback.add(message);
            }
            return Ok(None);
        }

        let written = match Self::write(tx.as_mut(), mutation, resource).await {
            Ok(written) => written,
            Err(e) => {
                tracing::error!(
                    resource = %self.config.name,
                    action = %mutation.action(),
                    error = %e,
                    "write failed"
                );
                Self::rollback(tx).await;
                return Err(e);
            }
        };

        if let Err(e) = tx.commit().await {
            tracing::error!(
                resource = %self.config.name,
                action = %mutation.action(),
                error = %e,
                "commit failed"
            );
            return Err(e.into());
        }
        tracing::info!(
            resource = %self.config.name,
            action = %mutation.action(),
            id = ?written.id(),
            "committed"
        );

        let mut event = ResourceEvent::new(post, self.config.event_name(post), written);
        if let Err(e) = self.dispatcher.dispatch(&mut event).await {
            tracing::error!(
                resource = %self.config.name,
                event = %self.config.event_name(post),
                error = %e,
                "post listener failed after commit"
            );
        }
        let resource = event.resource;

        self.flash.success(feedback, mutation.action());
        if let Some(bus) = &self.event_bus {
            bus.publish(Self::change(mutation, &resource));
        }

        Ok(Some(resource))
    }

    async fn write(
        tx: &mut dyn DriverTransaction<T>,
        mutation: Mutation,
        resource: T,
    ) -> ResourceResult<T> {
        let written = match mutation {
            Mutation::Create => tx.create(resource).await?,
            Mutation::Update => tx.update(resource).await?,
            Mutation::Delete => {
                tx.delete(&resource).await?;
                resource
            }
        };
        Ok(written)
    }

    async fn rollback(tx: Box<dyn DriverTransaction<T>>) {
        if let Err(e) = tx.rollback().await {
            tracing::error!(resource = T::resource_name(), error = %e, "rollback failed");
        }
    }

    fn change(mutation: Mutation, resource: &T) -> ResourceChange {
        let resource_type = T::resource_name().to_string();
        let resource_id = resource.id();
        let data = || serde_json::to_value(resource).unwrap_or_default();
        match mutation {
            Mutation::Create => ResourceChange::Created {
                resource_type,
                resource_id,
                data: data(),
            },
            Mutation::Update => ResourceChange::Updated {
                resource_type,
                resource_id,
                data: data(),
            },
            Mutation::Delete => ResourceChange::Deleted {
                resource_type,
                resource_id,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::driver::ResourceMetadata;
    use crate::core::error::ResourceError;
    use crate::core::feedback::{FeedbackSeverity, FlashBag};
    use crate::storage::InMemoryDriver;
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    struct Note {
        id: Option<Uuid>,
        slug: String,
    }

    impl Resource for Note {
        fn resource_name() -> &'static str {
            "note"
        }
        fn id(&self) -> Option<Uuid> {
            self.id
        }
        fn assign_id(&mut self, id: Uuid) {
            self.id = Some(id);
        }
    }

    struct Fixture {
        manager: DomainManager<Note>,
        driver: Arc<InMemoryDriver<Note>>,
        flash: Arc<FlashBag>,
    }

    fn fixture(dispatcher: EventDispatcher<Note>) -> Fixture {
        let driver = Arc::new(
            InMemoryDriver::<Note>::new(ResourceMetadata::new("app", "note")).with_unique("slug"),
        );
        let flash = Arc::new(FlashBag::new());
        let manager = DomainManager::new(
            Arc::new(ResourceConfig::new("app", "note")),
            driver.clone(),
            Arc::new(dispatcher),
        );
        Fixture {
            manager,
            driver,
            flash,
        }
    }

    fn note(slug: &str) -> Note {
        Note {
            id: None,
            slug: slug.into(),
        }
    }

    #[tokio::test]
    async fn test_create_assigns_id_and_flashes() {
        let f = fixture(EventDispatcher::new());
        let created = f.manager.create(note("a"), f.flash.as_ref()).await.unwrap().unwrap();

        assert!(created.id.is_some());
        assert_eq!(f.driver.len(), 1);
        let messages = f.flash.take_all();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].key, "app.resource.create");
    }

    #[tokio::test]
    async fn test_stopped_create_writes_nothing() {
        let mut dispatcher = EventDispatcher::<Note>::new();
        dispatcher.on(LifecyclePhase::PreCreate, |e| {
            e.stop("Creation is closed");
            Ok(())
        });
        dispatcher.on(LifecyclePhase::PostCreate, |_| {
            Err(anyhow::anyhow!("post event must not run"))
        });
        let f = fixture(dispatcher);

        let result = f.manager.create(note("a"), f.flash.as_ref()).await.unwrap();
        assert!(result.is_none());
        assert_eq!(f.driver.len(), 0);

        let messages = f.flash.take_all();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].severity, FeedbackSeverity::Error);
        assert_eq!(messages[0].key, "Creation is closed");
    }

    #[tokio::test]
    async fn test_silent_stop_records_no_feedback() {
        let mut dispatcher = EventDispatcher::<Note>::new();
        dispatcher.on(LifecyclePhase::PreDelete, |e| {
            e.stop_silently();
            Ok(())
        });
        let f = fixture(dispatcher);
        let created = f.manager.create(note("a"), f.flash.as_ref()).await.unwrap().unwrap();
        f.flash.take_all();

        assert!(f.manager.delete(created, f.flash.as_ref()).await.unwrap().is_none());
        assert_eq!(f.driver.len(), 1);
        assert!(f.flash.is_empty());
    }

    #[tokio::test]
    async fn test_persistence_failure_skips_post_event() {
        let mut dispatcher = EventDispatcher::<Note>::new();
        dispatcher.on(LifecyclePhase::PostCreate, |e| {
            e.resource.slug.push_str("-seen");
            Ok(())
        });
        let f = fixture(dispatcher);
        f.manager.create(note("taken"), f.flash.as_ref()).await.unwrap();
        f.flash.take_all();

        let err = f.manager.create(note("taken"), f.flash.as_ref()).await.unwrap_err();
        assert!(matches!(err, ResourceError::Persistence(_)));
        assert_eq!(f.driver.len(), 1);
        assert!(f.flash.is_empty());
    }

    #[tokio::test]
    async fn test_pre_event_sees_unsaved_resource_and_may_modify_it() {
        let mut dispatcher = EventDispatcher::<Note>::new();
        dispatcher.on(LifecyclePhase::PreCreate, |e| {
            e.resource.slug = e.resource.slug.to_uppercase();
            Ok(())
        });
        let f = fixture(dispatcher);

        let created = f.manager.create(note("abc"), f.flash.as_ref()).await.unwrap().unwrap();
        assert_eq!(created.slug, "ABC");
    }

    #[tokio::test]
    async fn test_update_and_delete_publish_changes() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        let f = fixture(EventDispatcher::new());
        let manager = f.manager.with_event_bus(bus);

        let mut created = manager.create(note("a"), f.flash.as_ref()).await.unwrap().unwrap();
        created.slug = "b".into();
        manager.update(created.clone(), f.flash.as_ref()).await.unwrap().unwrap();
        manager.delete(created, f.flash.as_ref()).await.unwrap().unwrap();

        let actions: Vec<String> = (0..3)
            .map(|_| rx.try_recv().unwrap().change.action().to_string())
            .collect();
        assert_eq!(actions, vec!["created", "updated", "deleted"]);
        assert_eq!(f.driver.len(), 0);
    }

    #[tokio::test]
    async fn test_listener_error_rolls_back() {
        let mut dispatcher = EventDispatcher::<Note>::new();
        dispatcher.on(LifecyclePhase::PreUpdate, |_| Err(anyhow::anyhow!("audit offline")));
        let f = fixture(dispatcher);
        let mut created = f.manager.create(note("a"), f.flash.as_ref()).await.unwrap().unwrap();
        created.slug = "changed".into();

        let err = f.manager.update(created, f.flash.as_ref()).await.unwrap_err();
        assert!(matches!(err, ResourceError::Internal(_)));
        let stored = f.driver.snapshot();
        assert_eq!(stored[0].slug, "a");
    }

    #[tokio::test]
    async fn test_post_listener_failure_keeps_committed_mutation() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();
        let mut dispatcher = EventDispatcher::<Note>::new();
        dispatcher.on(LifecyclePhase::PostCreate, |_| Err(anyhow::anyhow!("mailer down")));
        let f = fixture(dispatcher);
        let manager = f.manager.with_event_bus(bus);

        let created = manager.create(note("a"), f.flash.as_ref()).await.unwrap();

        assert!(created.is_some());
        assert_eq!(f.driver.len(), 1);
        assert_eq!(f.flash.take_all()[0].key, "app.resource.create");
        assert_eq!(rx.try_recv().unwrap().change.action(), "created");
    }

    #[tokio::test]
    async fn test_feedback_goes_to_the_given_sink() {
        let f = fixture(EventDispatcher::new());
        let first = FlashBag::new();
        let second = FlashBag::new();

        f.manager.create(note("a"), &first).await.unwrap();
        f.manager.create(note("b"), &second).await.unwrap();

        assert_eq!(first.take_all().len(), 1);
        assert_eq!(second.take_all().len(), 1);
        assert!(f.flash.is_empty());
    }
}
