//! Upload record model shared by every pipeline stage.
//!
//! The table is the single source of truth for an uploaded object. Intake
//! creates the full record, enrichment patches only the attribute group it
//! owns ([`LabelPatch`]). Both sides address the record through a
//! [`RecordId`], which can only be built from a raw notification key (decoded
//! once) or from a key that was already decoded upstream.

use chrono::{DateTime, Utc};
use percent_encoding::percent_decode_str;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while deriving record identity
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecordError {
    #[error("Object key is empty")]
    EmptyKey,

    #[error("Malformed percent escape at byte {position} in key {key:?}")]
    MalformedEscape { key: String, position: usize },

    #[error("Decoded key is not valid UTF-8: {0:?}")]
    InvalidUtf8(String),

    #[error("Unknown record status: {0}")]
    UnknownStatus(String),
}

/// Stable record identifier, equal to the decoded object key
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// Derive the id from a key as it appears in an object-created
    /// notification: `+` becomes a space, then percent escapes are decoded.
    pub fn from_notification_key(raw: &str) -> Result<Self, RecordError> {
        if raw.is_empty() {
            return Err(RecordError::EmptyKey);
        }

        let bytes = raw.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'%' {
                let valid = bytes.len() > i + 2
                    && bytes[i + 1].is_ascii_hexdigit()
                    && bytes[i + 2].is_ascii_hexdigit();
                if !valid {
                    return Err(RecordError::MalformedEscape {
                        key: raw.to_string(),
                        position: i,
                    });
                }
                i += 3;
            } else {
                i += 1;
            }
        }

        let spaced = raw.replace('+', " ");
        let decoded = percent_decode_str(&spaced)
            .decode_utf8()
            .map_err(|_| RecordError::InvalidUtf8(raw.to_string()))?;

        Ok(Self(decoded.into_owned()))
    }

    /// Wrap a key that has already been decoded (dispatched messages, API
    /// lookups). The value is used verbatim.
    pub fn from_normalized(key: impl Into<String>) -> Result<Self, RecordError> {
        let key = key.into();
        if key.is_empty() {
            return Err(RecordError::EmptyKey);
        }
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RecordId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Lifecycle marker of an upload record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordStatus {
    /// Written by intake, waiting for enrichment
    Initialized,
    /// Legacy terminal marker; read but never written
    Processed,
    /// Labels attached by enrichment
    AnalysisComplete,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Initialized => "INITIALIZED",
            RecordStatus::Processed => "PROCESSED",
            RecordStatus::AnalysisComplete => "ANALYSIS_COMPLETE",
        }
    }

    /// Position in the lifecycle. Transitions only ever move to a higher rank.
    pub fn rank(&self) -> u8 {
        match self {
            RecordStatus::Initialized => 0,
            RecordStatus::Processed | RecordStatus::AnalysisComplete => 1,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.rank() > 0
    }

    pub fn can_advance_to(&self, next: RecordStatus) -> bool {
        next.rank() >= self.rank()
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordStatus {
    type Err = RecordError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INITIALIZED" => Ok(RecordStatus::Initialized),
            "PROCESSED" => Ok(RecordStatus::Processed),
            "ANALYSIS_COMPLETE" => Ok(RecordStatus::AnalysisComplete),
            other => Err(RecordError::UnknownStatus(other.to_string())),
        }
    }
}

/// Metadata stored for one uploaded object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRecord {
    /// Decoded object key
    pub id: RecordId,
    /// Source bucket
    pub bucket: String,
    /// Object size in bytes at upload time
    pub size: i64,
    /// Event time from the trigger, or write time when the trigger had none
    pub upload_time: DateTime<Utc>,
    pub status: RecordStatus,
    /// Present once enrichment succeeded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labels: Option<Vec<String>>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analyzed_at: Option<DateTime<Utc>>,
}

impl UploadRecord {
    /// Build the record intake writes for a freshly created object
    pub fn initialized(
        id: RecordId,
        bucket: impl Into<String>,
        size: i64,
        event_time: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            bucket: bucket.into(),
            size,
            upload_time: event_time.unwrap_or(now),
            status: RecordStatus::Initialized,
            labels: None,
            created_at: now,
            analyzed_at: None,
        }
    }

    /// Apply an enrichment patch in place, touching only the patched
    /// attributes. A patch never moves the status backwards.
    pub fn apply_patch(&mut self, patch: &LabelPatch) {
        self.labels = Some(patch.labels.clone());
        if self.status.can_advance_to(patch.status) {
            self.status = patch.status;
        }
        self.analyzed_at = Some(patch.analyzed_at);
    }
}

/// Attribute group owned by the enrichment stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelPatch {
    pub labels: Vec<String>,
    pub status: RecordStatus,
    pub analyzed_at: DateTime<Utc>,
}

impl LabelPatch {
    pub fn completed(labels: Vec<String>, analyzed_at: DateTime<Utc>) -> Self {
        Self {
            labels,
            status: RecordStatus::AnalysisComplete,
            analyzed_at,
        }
    }
}
