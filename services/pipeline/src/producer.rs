//! Notification topic producer.
//!
//! Provides the outgoing message type, the publisher seam, and the SNS
//! implementation used in deployment.

use async_trait::async_trait;
use aws_sdk_sns::error::DisplayErrorContext;
use aws_sdk_sns::types::MessageAttributeValue;
use aws_sdk_sns::Client as SnsClient;
use thiserror::Error;
use tracing::{debug, instrument};

/// Attribute carrying the message classification
pub const EVENT_TYPE_ATTRIBUTE: &str = "eventType";

/// Errors that can occur while publishing
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("Failed to serialize message: {0}")]
    SerializationError(String),

    #[error("Invalid message attribute {name}: {message}")]
    InvalidAttribute { name: String, message: String },

    #[error("Failed to publish message to topic {topic}: {message}")]
    SendError { topic: String, message: String },
}

/// Result of a successful publish
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryReceipt {
    /// Topic the message was published to
    pub topic: String,
    /// Identifier assigned by the topic, if returned
    pub message_id: Option<String>,
}

/// Message to be published
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMessage {
    /// Topic to publish to
    pub topic: String,
    /// JSON payload
    pub payload: String,
    /// String-typed message attributes
    pub attributes: Vec<(String, String)>,
}

impl OutgoingMessage {
    /// Create a new outgoing message with a JSON payload
    pub fn new_json<T: serde::Serialize>(
        topic: impl Into<String>,
        message: &T,
    ) -> Result<Self, PublishError> {
        let payload = serde_json::to_string(message)
            .map_err(|e| PublishError::SerializationError(e.to_string()))?;
        Ok(Self {
            topic: topic.into(),
            payload,
            attributes: Vec::new(),
        })
    }

    /// Add an attribute to the message
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.push((name.into(), value.into()));
        self
    }

    /// Add the classification attribute
    pub fn with_event_type(self, event_type: impl Into<String>) -> Self {
        self.with_attribute(EVENT_TYPE_ATTRIBUTE, event_type)
    }

    /// Look up an attribute value
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Publishes messages to a notification topic
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationPublisher: Send + Sync {
    async fn publish(&self, message: OutgoingMessage) -> Result<DeliveryReceipt, PublishError>;
}

/// SNS-backed publisher
pub struct SnsPublisher {
    client: SnsClient,
}

impl SnsPublisher {
    pub fn new(client: SnsClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NotificationPublisher for SnsPublisher {
    #[instrument(skip(self, message), fields(topic = %message.topic))]
    async fn publish(&self, message: OutgoingMessage) -> Result<DeliveryReceipt, PublishError> {
        let mut request = self
            .client
            .publish()
            .topic_arn(&message.topic)
            .message(&message.payload);

        for (name, value) in &message.attributes {
            let attribute = MessageAttributeValue::builder()
                .data_type("String")
                .string_value(value)
                .build()
                .map_err(|e| PublishError::InvalidAttribute {
                    name: name.clone(),
                    message: e.to_string(),
                })?;
            request = request.message_attributes(name, attribute);
        }

        debug!(
            size_bytes = message.payload.len(),
            attributes = message.attributes.len(),
            "Publishing message"
        );

        let output = request.send().await.map_err(|e| PublishError::SendError {
            topic: message.topic.clone(),
            message: DisplayErrorContext(&e).to_string(),
        })?;

        Ok(DeliveryReceipt {
            topic: message.topic,
            message_id: output.message_id().map(String::from),
        })
    }
}
