use async_trait::async_trait;
use aws_sdk_dynamodb::error::DisplayErrorContext;
use aws_sdk_dynamodb::operation::update_item::builders::UpdateItemFluentBuilder;
use aws_sdk_dynamodb::types::AttributeValue;
use aws_sdk_dynamodb::Client as DynamoClient;
use chrono::{DateTime, SecondsFormat, Utc};
use image_pipeline::{
    LabelPatch, MetadataTable, PutOutcome, RecordId, RecordStatus, StoreError, UploadRecord,
};
use std::collections::HashMap;
use tracing::{debug, info, instrument};

type Item = HashMap<String, AttributeValue>;

// Attribute names
const ID: &str = "id";
const BUCKET: &str = "bucket";
const SIZE: &str = "size";
const UPLOAD_TIME: &str = "uploadTime";
const STATUS: &str = "status";
const LABELS: &str = "labels";
const CREATED_AT: &str = "createdAt";
const ANALYZED_AT: &str = "analyzedAt";

/// Intake lands only while the record is absent or still INITIALIZED
const INTAKE_CONDITION: &str = "attribute_not_exists(#id) OR #status = :initialized";

/// Intake attributes; the first write's times survive redelivery
const INTAKE_UPDATE: &str = "SET #bucket = :bucket, #size = :size, #status = :initialized, \
     #upload_time = if_not_exists(#upload_time, :upload_time), \
     #created_at = if_not_exists(#created_at, :created_at)";

/// Enrichment only touches records intake already wrote
const PATCH_CONDITION: &str = "attribute_exists(#id)";

const PATCH_UPDATE: &str = "SET #labels = :labels, #status = :status, #analyzed_at = :analyzed_at";

/// Upload metadata stored in DynamoDB, one item per object keyed by `id`
pub struct DynamoMetadataStore {
    client: DynamoClient,
    table_name: String,
}

impl DynamoMetadataStore {
    pub fn new(client: DynamoClient, table_name: impl Into<String>) -> Self {
        let table_name = table_name.into();
        info!(table = %table_name, "Metadata store initialized");
        Self { client, table_name }
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    fn key(id: &RecordId) -> AttributeValue {
        AttributeValue::S(id.as_str().to_string())
    }

    /// Conditional intake write for `record`
    fn intake_request(&self, record: &UploadRecord) -> UpdateItemFluentBuilder {
        self.client
            .update_item()
            .table_name(&self.table_name)
            .key(ID, Self::key(&record.id))
            .update_expression(INTAKE_UPDATE)
            .condition_expression(INTAKE_CONDITION)
            .expression_attribute_names("#id", ID)
            .expression_attribute_names("#bucket", BUCKET)
            .expression_attribute_names("#size", SIZE)
            .expression_attribute_names("#status", STATUS)
            .expression_attribute_names("#upload_time", UPLOAD_TIME)
            .expression_attribute_names("#created_at", CREATED_AT)
            .expression_attribute_values(":bucket", AttributeValue::S(record.bucket.clone()))
            .expression_attribute_values(":size", AttributeValue::N(record.size.to_string()))
            .expression_attribute_values(
                ":initialized",
                AttributeValue::S(RecordStatus::Initialized.as_str().to_string()),
            )
            .expression_attribute_values(":upload_time", AttributeValue::S(timestamp(&record.upload_time)))
            .expression_attribute_values(":created_at", AttributeValue::S(timestamp(&record.created_at)))
    }

    /// Conditional enrichment patch for an existing record
    fn patch_request(&self, id: &RecordId, patch: &LabelPatch) -> UpdateItemFluentBuilder {
        let labels = patch
            .labels
            .iter()
            .map(|l| AttributeValue::S(l.clone()))
            .collect();

        self.client
            .update_item()
            .table_name(&self.table_name)
            .key(ID, Self::key(id))
            .update_expression(PATCH_UPDATE)
            .condition_expression(PATCH_CONDITION)
            .expression_attribute_names("#id", ID)
            .expression_attribute_names("#labels", LABELS)
            .expression_attribute_names("#status", STATUS)
            .expression_attribute_names("#analyzed_at", ANALYZED_AT)
            .expression_attribute_values(":labels", AttributeValue::L(labels))
            .expression_attribute_values(":status", AttributeValue::S(patch.status.as_str().to_string()))
            .expression_attribute_values(":analyzed_at", AttributeValue::S(timestamp(&patch.analyzed_at)))
    }
}

#[async_trait]
impl MetadataTable for DynamoMetadataStore {
    #[instrument(skip(self, record), fields(id = %record.id))]
    async fn put_full(&self, record: &UploadRecord) -> Result<PutOutcome, StoreError> {
        let result = self.intake_request(record).send().await;

        match result {
            Ok(_) => Ok(PutOutcome::Written),
            Err(e)
                if e.as_service_error()
                    .map(|se| se.is_conditional_check_failed_exception())
                    .unwrap_or(false) =>
            {
                debug!("Record already advanced past intake");
                Ok(PutOutcome::AlreadyAdvanced)
            }
            Err(e) => Err(StoreError::Request(DisplayErrorContext(&e).to_string())),
        }
    }

    #[instrument(skip(self, patch), fields(id = %id, labels = patch.labels.len()))]
    async fn patch_attributes(&self, id: &RecordId, patch: &LabelPatch) -> Result<(), StoreError> {
        let result = self.patch_request(id, patch).send().await;

        match result {
            Ok(_) => Ok(()),
            Err(e)
                if e.as_service_error()
                    .map(|se| se.is_conditional_check_failed_exception())
                    .unwrap_or(false) =>
            {
                Err(StoreError::NotFound(id.clone()))
            }
            Err(e) => Err(StoreError::Request(DisplayErrorContext(&e).to_string())),
        }
    }

    async fn get(&self, id: &RecordId) -> Result<Option<UploadRecord>, StoreError> {
        let output = self
            .client
            .get_item()
            .table_name(&self.table_name)
            .key(ID, Self::key(id))
            .consistent_read(true)
            .send()
            .await
            .map_err(|e| StoreError::Request(DisplayErrorContext(&e).to_string()))?;

        output.item().map(item_to_record).transpose()
    }

    #[instrument(skip(self))]
    async fn list_by_status(
        &self,
        status: RecordStatus,
        created_before: Option<DateTime<Utc>>,
        limit: usize,
    ) -> Result<Vec<UploadRecord>, StoreError> {
        let mut records = Vec::new();
        let mut start_key: Option<Item> = None;

        let filter = match created_before {
            Some(_) => "#status = :status AND #created_at < :cutoff",
            None => "#status = :status",
        };

        loop {
            let mut request = self
                .client
                .scan()
                .table_name(&self.table_name)
                .filter_expression(filter)
                .expression_attribute_names("#status", STATUS)
                .expression_attribute_values(":status", AttributeValue::S(status.as_str().to_string()))
                .set_exclusive_start_key(start_key.take());

            if let Some(cutoff) = created_before {
                request = request
                    .expression_attribute_names("#created_at", CREATED_AT)
                    .expression_attribute_values(":cutoff", AttributeValue::S(timestamp(&cutoff)));
            }

            let output = request
                .send()
                .await
                .map_err(|e| StoreError::Request(DisplayErrorContext(&e).to_string()))?;

            for item in output.items() {
                records.push(item_to_record(item)?);
                if records.len() >= limit {
                    return Ok(records);
                }
            }

            match output.last_evaluated_key() {
                Some(key) if !key.is_empty() => start_key = Some(key.clone()),
                _ => break,
            }
        }

        Ok(records)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.client
            .describe_table()
            .table_name(&self.table_name)
            .send()
            .await
            .map_err(|e| StoreError::Request(DisplayErrorContext(&e).to_string()))?;
        Ok(())
    }
}

/// Sortable timestamp representation used for every time attribute
fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a stored item back into a record
pub fn item_to_record(item: &Item) -> Result<UploadRecord, StoreError> {
    let id = RecordId::from_normalized(string_attr(item, ID)?)
        .map_err(|e| StoreError::MalformedItem(e.to_string()))?;

    let size = item
        .get(SIZE)
        .and_then(|v| v.as_n().ok())
        .ok_or_else(|| missing(SIZE))?
        .parse::<i64>()
        .map_err(|e| StoreError::MalformedItem(format!("{SIZE}: {e}")))?;

    let status = string_attr(item, STATUS)?
        .parse::<RecordStatus>()
        .map_err(|e| StoreError::MalformedItem(e.to_string()))?;

    let labels = match item.get(LABELS) {
        Some(AttributeValue::L(values)) => Some(
            values
                .iter()
                .filter_map(|v| v.as_s().ok().cloned())
                .collect(),
        ),
        Some(AttributeValue::Ss(values)) => Some(values.clone()),
        _ => None,
    };

    let analyzed_at = match item.get(ANALYZED_AT) {
        Some(_) => Some(time_attr(item, ANALYZED_AT)?),
        None => None,
    };

    Ok(UploadRecord {
        id,
        bucket: string_attr(item, BUCKET)?,
        size,
        upload_time: time_attr(item, UPLOAD_TIME)?,
        status,
        labels,
        created_at: time_attr(item, CREATED_AT)?,
        analyzed_at,
    })
}

fn missing(name: &str) -> StoreError {
    StoreError::MalformedItem(format!("missing attribute {name}"))
}

fn string_attr(item: &Item, name: &str) -> Result<String, StoreError> {
    item.get(name)
        .and_then(|v| v.as_s().ok())
        .cloned()
        .ok_or_else(|| missing(name))
}

fn time_attr(item: &Item, name: &str) -> Result<DateTime<Utc>, StoreError> {
    let raw = string_attr(item, name)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StoreError::MalformedItem(format!("{name}: {e}")))
}
