//! Label enrichment: asks the detector for labels and patches them onto the
//! existing record.

use crate::config::LabelPolicy;
use crate::consumer::{IncomingMessage, MessageHandler};
use crate::dispatcher::{DispatchMessage, OBJECT_CREATED_EVENT};
use crate::event::EventError;
use crate::labels::{label_names, LabelDetector, LabelRequest};
use crate::record::{LabelPatch, RecordId};
use crate::store::MetadataTable;
use crate::StageError;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Attaches detected labels to upload records
pub struct LabelEnricher {
    detector: Arc<dyn LabelDetector>,
    table: Arc<dyn MetadataTable>,
    policy: LabelPolicy,
}

impl LabelEnricher {
    pub fn new(
        detector: Arc<dyn LabelDetector>,
        table: Arc<dyn MetadataTable>,
        policy: LabelPolicy,
    ) -> Self {
        Self {
            detector,
            table,
            policy,
        }
    }

    /// Detect labels for the object and mark its record complete. An empty
    /// detector result still completes the record.
    #[instrument(skip(self), fields(id = %id))]
    pub async fn enrich(&self, bucket: &str, id: &RecordId) -> Result<LabelPatch, StageError> {
        let request = LabelRequest::new(bucket, id.as_str(), &self.policy);
        let detected = self.detector.detect_labels(&request).await?;
        let labels = label_names(detected, self.policy.max_labels);

        debug!(labels = ?labels, "Applying labels");

        let patch = LabelPatch::completed(labels, Utc::now());
        self.table.patch_attributes(id, &patch).await?;

        metrics::counter!("pipeline.enrichment.completed").increment(1);
        info!(label_count = patch.labels.len(), "Record analysis complete");

        Ok(patch)
    }
}

#[async_trait]
impl MessageHandler for LabelEnricher {
    type Output = LabelPatch;

    async fn handle(&self, message: IncomingMessage) -> Result<LabelPatch, StageError> {
        if let Some(event_type) = message.event_type() {
            if event_type != OBJECT_CREATED_EVENT {
                return Err(EventError::Unsupported(event_type.to_string()).into());
            }
        }

        let dispatched: DispatchMessage = message.decode_json()?;
        if dispatched.bucket.is_empty() {
            return Err(EventError::MissingField("bucket").into());
        }
        let id = RecordId::from_normalized(dispatched.key)?;

        self.enrich(&dispatched.bucket, &id).await
    }
}
