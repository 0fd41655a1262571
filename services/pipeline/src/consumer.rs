//! Notification consumer side.
//!
//! Unwraps topic notifications delivered in a batch into
//! [`IncomingMessage`]s and provides the handler trait that processes them.

use crate::event::{batch_records, EventError};
use crate::producer::EVENT_TYPE_ATTRIBUTE;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use tracing::warn;

/// Metadata about a received notification
#[derive(Debug, Clone, Default)]
pub struct MessageMetadata {
    pub message_id: Option<String>,
    pub topic_arn: Option<String>,
    pub timestamp: Option<String>,
    /// String message attributes
    pub attributes: HashMap<String, String>,
}

/// A notification unwrapped from its transport envelope
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    /// Raw message body
    pub payload: String,
    pub metadata: MessageMetadata,
}

#[derive(Debug, Deserialize)]
struct RawNotificationRecord {
    #[serde(rename = "Sns")]
    sns: Option<RawNotification>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawNotification {
    message_id: Option<String>,
    topic_arn: Option<String>,
    timestamp: Option<String>,
    message: Option<String>,
    #[serde(default)]
    message_attributes: HashMap<String, RawAttribute>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawAttribute {
    #[serde(rename = "Type")]
    kind: Option<String>,
    value: Option<String>,
}

impl IncomingMessage {
    /// Unwrap one element of a notification batch
    pub fn from_value(value: &Value) -> Result<Self, EventError> {
        let raw: RawNotificationRecord = serde_json::from_value(value.clone())
            .map_err(|e| EventError::Malformed(e.to_string()))?;
        let sns = raw.sns.ok_or(EventError::MissingField("Sns"))?;
        let payload = sns.message.ok_or(EventError::MissingField("Sns.Message"))?;

        let attributes = sns
            .message_attributes
            .into_iter()
            .filter(|(_, attr)| attr.kind.as_deref().map_or(true, |k| k.starts_with("String")))
            .filter_map(|(name, attr)| attr.value.map(|v| (name, v)))
            .collect();

        Ok(Self {
            payload,
            metadata: MessageMetadata {
                message_id: sns.message_id,
                topic_arn: sns.topic_arn,
                timestamp: sns.timestamp,
                attributes,
            },
        })
    }

    /// Deserialize the payload as JSON
    pub fn decode_json<T: serde::de::DeserializeOwned>(&self) -> Result<T, EventError> {
        serde_json::from_str(&self.payload).map_err(|e| EventError::Payload(e.to_string()))
    }

    /// Get an attribute value
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.metadata.attributes.get(name).map(|s| s.as_str())
    }

    /// Get the classification attribute
    pub fn event_type(&self) -> Option<&str> {
        self.attribute(EVENT_TYPE_ATTRIBUTE)
    }
}

/// Unwrap every element of a notification batch, keeping per-element
/// failures in place
pub fn parse_notification_batch(
    event: &Value,
) -> Result<Vec<Result<IncomingMessage, EventError>>, EventError> {
    Ok(batch_records(event)?
        .iter()
        .map(IncomingMessage::from_value)
        .collect())
}

/// Handler trait for processing notifications
#[async_trait]
pub trait MessageHandler: Send + Sync {
    type Output: Send;

    /// Process a single message
    async fn handle(&self, message: IncomingMessage) -> Result<Self::Output, crate::StageError>;

    /// Called when message processing fails
    async fn on_error(&self, message: &IncomingMessage, error: &crate::StageError) {
        warn!(
            message_id = ?message.metadata.message_id,
            topic = ?message.metadata.topic_arn,
            error = %error,
            "Message processing failed"
        );
    }
}
