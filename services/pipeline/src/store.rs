//! Metadata table seam.
//!
//! Full-record writes and attribute patches are separate operations so the
//! ownership of each attribute group stays explicit: intake owns the full
//! record, enrichment owns [`LabelPatch`].

use crate::record::{LabelPatch, RecordId, RecordStatus, UploadRecord};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Errors returned by table implementations
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Record {0} not found")]
    NotFound(RecordId),

    #[error("Table request failed: {0}")]
    Request(String),

    #[error("Stored item is malformed: {0}")]
    MalformedItem(String),
}

/// Result of a full-record write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PutOutcome {
    /// The record was created or rewritten with identical intake data
    Written,
    /// The record had already moved past `INITIALIZED`; nothing was written
    AlreadyAdvanced,
}

/// Storage operations on upload records
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MetadataTable: Send + Sync {
    /// Upsert the full record. Lands only while the stored record is absent
    /// or still `INITIALIZED`; a rewrite keeps the stored `created_at` and
    /// `upload_time`.
    async fn put_full(&self, record: &UploadRecord) -> Result<PutOutcome, StoreError>;

    /// Set the enrichment attributes on an existing record, leaving every
    /// other attribute untouched
    async fn patch_attributes(&self, id: &RecordId, patch: &LabelPatch) -> Result<(), StoreError>;

    /// Fetch one record
    async fn get(&self, id: &RecordId) -> Result<Option<UploadRecord>, StoreError>;

    /// List records in a given status, optionally only those created before
    /// a cutoff
    async fn list_by_status(
        &self,
        status: RecordStatus,
        created_before: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<UploadRecord>, StoreError>;

    /// Check that the table is reachable
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
