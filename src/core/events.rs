//! Resource lifecycle events and change notifications
//!
//! Two mechanisms live here:
//!
//! - [`EventDispatcher`]: synchronous, ordered listener lists per
//!   [`LifecyclePhase`]. Listeners run inside the mutation, may modify the
//!   resource and may stop a pre-phase event to cancel the write.
//! - [`EventBus`]: a `tokio::sync::broadcast` channel publishing
//!   [`ResourceChange`] notifications after a mutation has been committed.
//!
//! ```text
//! DomainManager ──▶ EventDispatcher::dispatch(pre_*)  ──▶ listeners (may stop)
//!               ──▶ driver write + commit
//!               ──▶ EventDispatcher::dispatch(post_*)
//!               ──▶ EventBus::publish() ──▶ broadcast channel ──▶ subscribers
//! ```

use crate::core::feedback::FeedbackMessage;
use crate::core::resource::Resource;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Phase of a resource mutation at which listeners are notified
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecyclePhase {
    PreCreate,
    PostCreate,
    PreUpdate,
    PostUpdate,
    PreDelete,
    PostDelete,
}

impl LifecyclePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecyclePhase::PreCreate => "pre_create",
            LifecyclePhase::PostCreate => "post_create",
            LifecyclePhase::PreUpdate => "pre_update",
            LifecyclePhase::PostUpdate => "post_update",
            LifecyclePhase::PreDelete => "pre_delete",
            LifecyclePhase::PostDelete => "post_delete",
        }
    }

    /// Pre-phases run before the write and honour the stop flag
    pub fn is_pre(&self) -> bool {
        matches!(
            self,
            LifecyclePhase::PreCreate | LifecyclePhase::PreUpdate | LifecyclePhase::PreDelete
        )
    }
}

impl fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event handed to lifecycle listeners
#[derive(Debug, Clone)]
pub struct ResourceEvent<T> {
    pub phase: LifecyclePhase,
    /// Fully qualified name (`{prefix}.{resource}.{phase}`)
    pub name: String,
    pub resource: T,
    stopped: bool,
    message: Option<FeedbackMessage>,
}

impl<T> ResourceEvent<T> {
    pub fn new(phase: LifecyclePhase, name: impl Into<String>, resource: T) -> Self {
        Self {
            phase,
            name: name.into(),
            resource,
            stopped: false,
            message: None,
        }
    }

    /// Cancel the mutation and report `message` to the user as an error
    pub fn stop(&mut self, message: impl Into<String>) {
        self.stop_with(FeedbackMessage::error(message));
    }

    /// Cancel the mutation with a prepared feedback message
    pub fn stop_with(&mut self, message: FeedbackMessage) {
        self.stopped = true;
        self.message = Some(message);
    }

    /// Cancel the mutation without telling the user
    pub fn stop_silently(&mut self) {
        self.stopped = true;
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn message(&self) -> Option<&FeedbackMessage> {
        self.message.as_ref()
    }

    pub fn into_parts(self) -> (T, bool, Option<FeedbackMessage>) {
        (self.resource, self.stopped, self.message)
    }
}

/// A listener subscribed to one lifecycle phase
#[async_trait]
pub trait LifecycleListener<T: Resource>: Send + Sync {
    async fn handle(&self, event: &mut ResourceEvent<T>) -> anyhow::Result<()>;
}

/// Adapter running a plain closure as a listener
struct FnListener<F>(F);

#[async_trait]
impl<T, F> LifecycleListener<T> for FnListener<F>
where
    T: Resource,
    F: Fn(&mut ResourceEvent<T>) -> anyhow::Result<()> + Send + Sync,
{
    async fn handle(&self, event: &mut ResourceEvent<T>) -> anyhow::Result<()> {
        (self.0)(event)
    }
}

/// Ordered listener lists per lifecycle phase
pub struct EventDispatcher<T: Resource> {
    listeners: HashMap<LifecyclePhase, Vec<Arc<dyn LifecycleListener<T>>>>,
}

impl<T: Resource> Default for EventDispatcher<T> {
    fn default() -> Self {
        Self {
            listeners: HashMap::new(),
        }
    }
}

impl<T: Resource> EventDispatcher<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a listener; listeners run in registration order
    pub fn listen(&mut self, phase: LifecyclePhase, listener: impl LifecycleListener<T> + 'static) {
        self.listeners
            .entry(phase)
            .or_default()
            .push(Arc::new(listener));
    }

    /// Append a closure listener
    pub fn on<F>(&mut self, phase: LifecyclePhase, listener: F)
    where
        F: Fn(&mut ResourceEvent<T>) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.listen(phase, FnListener(listener));
    }

    pub fn listener_count(&self, phase: LifecyclePhase) -> usize {
        self.listeners.get(&phase).map_or(0, Vec::len)
    }

    /// Run the listeners of the event's phase
    ///
    /// Dispatch ends at the first listener that stops the event; later
    /// listeners of the same phase are not called.
    pub async fn dispatch(&self, event: &mut ResourceEvent<T>) -> anyhow::Result<()> {
        let Some(listeners) = self.listeners.get(&event.phase) else {
            return Ok(());
        };

        tracing::debug!(event = %event.name, listeners = listeners.len(), "dispatching");
        for listener in listeners {
            listener.handle(event).await?;
            if event.is_stopped() {
                tracing::debug!(event = %event.name, "propagation stopped");
                break;
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Change notifications
// ---------------------------------------------------------------------------

/// Notification of a committed resource mutation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ResourceChange {
    Created {
        resource_type: String,
        resource_id: Option<Uuid>,
        data: serde_json::Value,
    },
    Updated {
        resource_type: String,
        resource_id: Option<Uuid>,
        data: serde_json::Value,
    },
    Deleted {
        resource_type: String,
        resource_id: Option<Uuid>,
    },
}

impl ResourceChange {
    pub fn resource_type(&self) -> &str {
        match self {
            ResourceChange::Created { resource_type, .. }
            | ResourceChange::Updated { resource_type, .. }
            | ResourceChange::Deleted { resource_type, .. } => resource_type,
        }
    }

    pub fn resource_id(&self) -> Option<Uuid> {
        match self {
            ResourceChange::Created { resource_id, .. }
            | ResourceChange::Updated { resource_id, .. }
            | ResourceChange::Deleted { resource_id, .. } => *resource_id,
        }
    }

    pub fn action(&self) -> &str {
        match self {
            ResourceChange::Created { .. } => "created",
            ResourceChange::Updated { .. } => "updated",
            ResourceChange::Deleted { .. } => "deleted",
        }
    }
}

/// Envelope wrapping a change with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub change: ResourceChange,
}

impl EventEnvelope {
    pub fn new(change: ResourceChange) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            change,
        }
    }
}

/// Broadcast-based bus for change notifications
///
/// Cheap to clone; all clones share the same channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<EventEnvelope>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` envelopes for slow receivers
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish to all subscribers, returning how many will receive it
    ///
    /// Never fails: without subscribers the change is dropped.
    pub fn publish(&self, change: ResourceChange) -> usize {
        self.sender.send(EventEnvelope::new(change)).unwrap_or(0)
    }

    /// Receive every change published from now on
    pub fn subscribe(&self) -> broadcast::Receiver<EventEnvelope> {
        self.sender.subscribe()
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
