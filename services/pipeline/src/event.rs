//! Object-created trigger events.
//!
//! Batches are parsed one element at a time from raw JSON so a malformed
//! element is reported on its own and never prevents the rest of the batch
//! from being processed.

use crate::record::{RecordError, RecordId};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// Errors raised while reading trigger events
#[derive(Error, Debug)]
pub enum EventError {
    #[error("Event has no Records array")]
    MissingRecords,

    #[error("Malformed record: {0}")]
    Malformed(String),

    #[error("Record is missing field {0}")]
    MissingField(&'static str),

    #[error("Unsupported event type {0}")]
    Unsupported(String),

    #[error("Invalid object key: {0}")]
    InvalidKey(#[from] RecordError),

    #[error("Failed to decode message payload: {0}")]
    Payload(String),
}

/// One object-created notification, with its key already normalized
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectCreated {
    pub bucket: String,
    pub id: RecordId,
    pub size: i64,
    /// Time reported by the trigger, when present and parseable
    pub event_time: Option<DateTime<Utc>>,
    pub event_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawObjectRecord {
    event_name: Option<String>,
    event_time: Option<String>,
    s3: Option<RawS3Entity>,
}

#[derive(Debug, Deserialize)]
struct RawS3Entity {
    bucket: Option<RawBucket>,
    object: Option<RawObject>,
}

#[derive(Debug, Deserialize)]
struct RawBucket {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawObject {
    key: Option<String>,
    size: Option<i64>,
}

impl ObjectCreated {
    /// Parse one element of an object-created batch
    pub fn from_value(value: &Value) -> Result<Self, EventError> {
        let raw: RawObjectRecord = serde_json::from_value(value.clone())
            .map_err(|e| EventError::Malformed(e.to_string()))?;

        if let Some(ref name) = raw.event_name {
            if !name.starts_with("ObjectCreated") {
                return Err(EventError::Unsupported(name.clone()));
            }
        }

        let entity = raw.s3.ok_or(EventError::MissingField("s3"))?;
        let bucket = entity
            .bucket
            .and_then(|b| b.name)
            .filter(|n| !n.is_empty())
            .ok_or(EventError::MissingField("s3.bucket.name"))?;
        let object = entity.object.ok_or(EventError::MissingField("s3.object"))?;
        let key = object.key.ok_or(EventError::MissingField("s3.object.key"))?;
        let size = object.size.ok_or(EventError::MissingField("s3.object.size"))?;

        let id = RecordId::from_notification_key(&key)?;

        let event_time = raw.event_time.as_deref().and_then(|t| {
            match DateTime::parse_from_rfc3339(t) {
                Ok(parsed) => Some(parsed.with_timezone(&Utc)),
                Err(e) => {
                    debug!(event_time = %t, error = %e, "Unparseable event time, using write time");
                    None
                }
            }
        });

        Ok(Self {
            bucket,
            id,
            size,
            event_time,
            event_name: raw.event_name,
        })
    }
}

/// Split a batch envelope into its raw records
pub fn batch_records(event: &Value) -> Result<&[Value], EventError> {
    event
        .get("Records")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .ok_or(EventError::MissingRecords)
}

/// Parse every element of an object-created batch, keeping per-element
/// failures in place
pub fn parse_object_batch(event: &Value) -> Result<Vec<Result<ObjectCreated, EventError>>, EventError> {
    Ok(batch_records(event)?
        .iter()
        .map(ObjectCreated::from_value)
        .collect())
}

/// Kind of record delivered to the analysis entry point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    /// Object-created notifications straight from the bucket
    ObjectCreated,
    /// Dispatch messages wrapped in topic notifications
    Notification,
}

impl TriggerKind {
    /// Classify one batch record by its shape
    pub fn of_record(record: &Value) -> Result<Self, EventError> {
        if record.get("Sns").is_some() {
            Ok(TriggerKind::Notification)
        } else if record.get("s3").is_some() {
            Ok(TriggerKind::ObjectCreated)
        } else {
            Err(EventError::Malformed(
                "record is neither an object notification nor a topic message".to_string(),
            ))
        }
    }
}
