//! Upload intake: records one metadata entry per created object.

use crate::event::ObjectCreated;
use crate::record::UploadRecord;
use crate::store::{MetadataTable, PutOutcome, StoreError};
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Writes the initial record for created objects
pub struct UploadIntake {
    table: Arc<dyn MetadataTable>,
}

impl UploadIntake {
    pub fn new(table: Arc<dyn MetadataTable>) -> Self {
        Self { table }
    }

    /// Write the `INITIALIZED` record for an object. Safe to repeat for the
    /// same notification.
    #[instrument(skip(self, object), fields(id = %object.id, bucket = %object.bucket))]
    pub async fn record(&self, object: &ObjectCreated) -> Result<PutOutcome, StoreError> {
        let record = UploadRecord::initialized(
            object.id.clone(),
            object.bucket.clone(),
            object.size,
            object.event_time,
            Utc::now(),
        );

        let outcome = self.table.put_full(&record).await?;

        match outcome {
            PutOutcome::Written => {
                metrics::counter!("pipeline.records.written").increment(1);
                info!(size_bytes = object.size, "Upload metadata recorded");
            }
            PutOutcome::AlreadyAdvanced => {
                metrics::counter!("pipeline.records.already_advanced").increment(1);
                debug!("Record already past intake, redelivered notification ignored");
            }
        }

        Ok(outcome)
    }
}
