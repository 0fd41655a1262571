//! In-memory collaborators for end-to-end batch tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use image_pipeline::{
    DeliveryReceipt, DetectError, DetectedLabel, LabelDetector, LabelPatch, LabelRequest,
    MetadataTable, NotificationPublisher, OutgoingMessage, PublishError, PutOutcome, RecordId,
    RecordStatus, StoreError, UploadRecord,
};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// Table with the same conditional semantics as the deployed one
#[derive(Default)]
pub struct InMemoryTable {
    items: Mutex<HashMap<RecordId, UploadRecord>>,
}

impl InMemoryTable {
    pub fn insert(&self, record: UploadRecord) {
        self.items.lock().unwrap().insert(record.id.clone(), record);
    }

    pub fn len(&self) -> usize {
        self.items.lock().unwrap().len()
    }

    pub fn record(&self, id: &str) -> Option<UploadRecord> {
        self.items
            .lock()
            .unwrap()
            .get(&RecordId::from_normalized(id).unwrap())
            .cloned()
    }
}

#[async_trait]
impl MetadataTable for InMemoryTable {
    async fn put_full(&self, record: &UploadRecord) -> Result<PutOutcome, StoreError> {
        let mut items = self.items.lock().unwrap();
        let mut next = record.clone();
        if let Some(existing) = items.get(&record.id) {
            if existing.status != RecordStatus::Initialized {
                return Ok(PutOutcome::AlreadyAdvanced);
            }
            // First-write attributes survive redelivery
            next.created_at = existing.created_at;
            next.upload_time = existing.upload_time;
        }
        items.insert(record.id.clone(), next);
        Ok(PutOutcome::Written)
    }

    async fn patch_attributes(&self, id: &RecordId, patch: &LabelPatch) -> Result<(), StoreError> {
        let mut items = self.items.lock().unwrap();
        let record = items
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        record.apply_patch(patch);
        Ok(())
    }

    async fn get(&self, id: &RecordId) -> Result<Option<UploadRecord>, StoreError> {
        Ok(self.items.lock().unwrap().get(id).cloned())
    }

    async fn list_by_status(
        &self,
        status: RecordStatus,
        created_before: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<UploadRecord>, StoreError> {
        Ok(self
            .items
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.status == status)
            .filter(|r| created_before.map_or(true, |cutoff| r.created_at < cutoff))
            .take(limit)
            .cloned()
            .collect())
    }
}

/// Publisher that keeps every message and can be told to reject some keys
#[derive(Default)]
pub struct RecordingPublisher {
    pub sent: Mutex<Vec<OutgoingMessage>>,
    pub reject_containing: Mutex<Option<String>>,
}

impl RecordingPublisher {
    pub fn rejecting(fragment: &str) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            reject_containing: Mutex::new(Some(fragment.to_string())),
        }
    }

    pub fn sent(&self) -> Vec<OutgoingMessage> {
        self.sent.lock().unwrap().clone()
    }

    /// Wrap everything published so far in a topic notification batch
    pub fn as_notification_batch(&self) -> Value {
        let records: Vec<Value> = self
            .sent()
            .iter()
            .enumerate()
            .map(|(i, m)| {
                let attributes: serde_json::Map<String, Value> = m
                    .attributes
                    .iter()
                    .map(|(k, v)| (k.clone(), json!({ "Type": "String", "Value": v })))
                    .collect();
                json!({
                    "EventSource": "aws:sns",
                    "Sns": {
                        "MessageId": format!("msg-{i}"),
                        "TopicArn": m.topic,
                        "Message": m.payload,
                        "MessageAttributes": attributes
                    }
                })
            })
            .collect();
        json!({ "Records": records })
    }
}

#[async_trait]
impl NotificationPublisher for RecordingPublisher {
    async fn publish(&self, message: OutgoingMessage) -> Result<DeliveryReceipt, PublishError> {
        if let Some(fragment) = self.reject_containing.lock().unwrap().as_deref() {
            if message.payload.contains(fragment) {
                return Err(PublishError::SendError {
                    topic: message.topic,
                    message: "AuthorizationError".to_string(),
                });
            }
        }
        let mut sent = self.sent.lock().unwrap();
        let receipt = DeliveryReceipt {
            topic: message.topic.clone(),
            message_id: Some(format!("msg-{}", sent.len())),
        };
        sent.push(message);
        Ok(receipt)
    }
}

/// Detector answering from a fixed table of keys
#[derive(Default)]
pub struct StaticDetector {
    pub labels: HashMap<String, Vec<String>>,
    pub failing: HashSet<String>,
    pub requests: Mutex<Vec<LabelRequest>>,
}

impl StaticDetector {
    pub fn with(mut self, key: &str, labels: &[&str]) -> Self {
        self.labels
            .insert(key.to_string(), labels.iter().map(|l| l.to_string()).collect());
        self
    }

    pub fn failing_on(mut self, key: &str) -> Self {
        self.failing.insert(key.to_string());
        self
    }

    pub fn requests(&self) -> Vec<LabelRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LabelDetector for StaticDetector {
    async fn detect_labels(&self, request: &LabelRequest) -> Result<Vec<DetectedLabel>, DetectError> {
        self.requests.lock().unwrap().push(request.clone());
        if self.failing.contains(&request.key) {
            return Err(DetectError::Service {
                bucket: request.bucket.clone(),
                key: request.key.clone(),
                message: "ServiceUnavailable".to_string(),
            });
        }
        Ok(self
            .labels
            .get(&request.key)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .map(|name| DetectedLabel {
                name,
                confidence: 90.0,
            })
            .collect())
    }
}

/// One object-created notification as the bucket sends it
pub fn object_created(bucket: &str, raw_key: &str, size: i64) -> Value {
    json!({
        "eventVersion": "2.1",
        "eventSource": "aws:s3",
        "awsRegion": "us-east-1",
        "eventTime": "2024-01-15T10:30:00.000Z",
        "eventName": "ObjectCreated:Put",
        "s3": {
            "s3SchemaVersion": "1.0",
            "bucket": { "name": bucket, "arn": format!("arn:aws:s3:::{bucket}") },
            "object": { "key": raw_key, "size": size, "eTag": "d41d8cd98f00b204e9800998ecf8427e" }
        }
    })
}

pub fn batch(records: Vec<Value>) -> Value {
    json!({ "Records": records })
}
