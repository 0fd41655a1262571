//! Enrichment dispatcher: announces a newly recorded object on the topic so
//! labeling runs outside the intake invocation.

use crate::event::ObjectCreated;
use crate::producer::{DeliveryReceipt, NotificationPublisher, OutgoingMessage, PublishError};
use crate::record::RecordId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};

/// Classification attribute value for dispatch messages
pub const OBJECT_CREATED_EVENT: &str = "OBJECT_CREATED";

/// Payload announcing an object ready for analysis. `key` is the decoded
/// record id and is used verbatim by the consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchMessage {
    pub bucket: String,
    pub key: String,
}

impl DispatchMessage {
    pub fn new(bucket: impl Into<String>, id: &RecordId) -> Self {
        Self {
            bucket: bucket.into(),
            key: id.as_str().to_string(),
        }
    }
}

impl From<&ObjectCreated> for DispatchMessage {
    fn from(object: &ObjectCreated) -> Self {
        Self::new(object.bucket.clone(), &object.id)
    }
}

/// Publishes dispatch messages to the configured topic
pub struct Dispatcher {
    publisher: Arc<dyn NotificationPublisher>,
    topic: String,
}

impl Dispatcher {
    pub fn new(publisher: Arc<dyn NotificationPublisher>, topic: impl Into<String>) -> Self {
        Self {
            publisher,
            topic: topic.into(),
        }
    }

    /// Build the topic message for an object
    pub fn message_for(&self, object: &ObjectCreated) -> Result<OutgoingMessage, PublishError> {
        Ok(OutgoingMessage::new_json(&self.topic, &DispatchMessage::from(object))?
            .with_event_type(OBJECT_CREATED_EVENT))
    }

    #[instrument(skip(self, object), fields(id = %object.id, bucket = %object.bucket))]
    pub async fn dispatch(&self, object: &ObjectCreated) -> Result<DeliveryReceipt, PublishError> {
        let message = self.message_for(object)?;
        let receipt = self.publisher.publish(message).await?;

        metrics::counter!("pipeline.dispatch.published").increment(1);
        info!(message_id = ?receipt.message_id, "Dispatched object for analysis");

        Ok(receipt)
    }
}
