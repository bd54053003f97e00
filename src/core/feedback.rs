//! User feedback (flash messages)
//!
//! The domain manager records one message per completed or stopped mutation.
//! Messages carry a translation key plus parameters; [`FeedbackMessage::text`]
//! renders the default English wording when no translator sits in between.

use crate::config::{Action, ResourceConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

/// Severity of a feedback message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackSeverity {
    Success,
    Info,
    Warning,
    Error,
}

/// A single message shown to the user after a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackMessage {
    pub severity: FeedbackSeverity,
    pub key: String,
    pub parameters: BTreeMap<String, String>,
}

impl FeedbackMessage {
    pub fn new(severity: FeedbackSeverity, key: impl Into<String>) -> Self {
        Self {
            severity,
            key: key.into(),
            parameters: BTreeMap::new(),
        }
    }

    pub fn success(key: impl Into<String>) -> Self {
        Self::new(FeedbackSeverity::Success, key)
    }

    pub fn error(key: impl Into<String>) -> Self {
        Self::new(FeedbackSeverity::Error, key)
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    /// Default English text with parameters substituted
    ///
    /// Keys ending in `.create`, `.update` or `.delete` get the standard
    /// success wording; any other key is used as the text itself.
    pub fn text(&self) -> String {
        let template = match self.key.rsplit('.').next() {
            Some("create") => "%resource% has been successfully created.",
            Some("update") => "%resource% has been successfully updated.",
            Some("delete") => "%resource% has been successfully deleted.",
            _ => self.key.as_str(),
        };

        self.parameters
            .iter()
            .fold(template.to_string(), |text, (name, value)| {
                text.replace(name.as_str(), value)
            })
    }
}

/// Destination of feedback messages
pub trait FeedbackSink: Send + Sync {
    fn add(&self, message: FeedbackMessage);
}

/// Flash bag collecting the messages of one request
///
/// Every [`ResourceRequest`](crate::core::request::ResourceRequest) owns a
/// bag. Messages stay until [`FlashBag::take_all`] drains them, which a
/// rendered view does.
#[derive(Debug, Default)]
pub struct FlashBag {
    messages: Mutex<Vec<FeedbackMessage>>,
}

impl FlashBag {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages currently held, without removing them
    pub fn peek(&self) -> Vec<FeedbackMessage> {
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Remove and return every message
    pub fn take_all(&self) -> Vec<FeedbackMessage> {
        let mut messages = self.messages.lock().unwrap_or_else(|e| e.into_inner());
        std::mem::take(&mut *messages)
    }

    pub fn is_empty(&self) -> bool {
        self.peek().is_empty()
    }
}

impl FeedbackSink for FlashBag {
    fn add(&self, message: FeedbackMessage) {
        self.messages
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(message);
    }
}

/// Records action feedback for one resource type
#[derive(Clone)]
pub struct FlashHelper {
    config: Arc<ResourceConfig>,
}

impl FlashHelper {
    pub fn new(config: Arc<ResourceConfig>) -> Self {
        Self { config }
    }

    /// Record the success message of a completed action
    pub fn success(&self, sink: &dyn FeedbackSink, action: Action) {
        let message = FeedbackMessage::success(self.config.flash_key(action))
            .with_parameter("%resource%", self.config.display_name());
        sink.add(message);
    }
}
