mod common;

use chrono::{TimeZone, Utc};
use common::{batch, object_created, InMemoryTable, RecordingPublisher, StaticDetector};
use image_pipeline::{
    AnalysisEventHandler, PipelineConfig, PipelineContext, PipelineMode, RecordId, RecordStatus,
    StageError, UploadEventHandler, UploadRecord,
};
use serde_json::json;
use std::sync::Arc;

const TOPIC: &str = "arn:aws:sns:us-east-1:123456789012:image-uploads";

fn fan_out_config() -> PipelineConfig {
    PipelineConfig {
        mode: PipelineMode::FanOut,
        topic_arn: Some(TOPIC.to_string()),
        ..Default::default()
    }
}

fn existing_record(key: &str) -> UploadRecord {
    let at = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap();
    UploadRecord::initialized(RecordId::from_normalized(key).unwrap(), "b1", 1024, Some(at), at)
}

#[tokio::test]
async fn test_malformed_element_does_not_block_batch() {
    let table = Arc::new(InMemoryTable::default());
    let publisher = Arc::new(RecordingPublisher::default());
    let ctx = PipelineContext::new(table.clone(), fan_out_config()).with_publisher(publisher.clone());
    let handler = UploadEventHandler::new(&ctx).unwrap();

    let mut malformed = object_created("b1", "ignored.jpg", 5);
    malformed["s3"]["object"].as_object_mut().unwrap().remove("key");
    let event = batch(vec![object_created("b1", "photo.jpg", 1024), malformed]);

    let report = handler.handle(&event).await.unwrap();

    assert_eq!(report.total, 2);
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].index, 1);
    assert!(report.failures[0].malformed);

    assert_eq!(table.len(), 1);
    let record = table.record("photo.jpg").unwrap();
    assert_eq!(record.status, RecordStatus::Initialized);
    assert_eq!(record.bucket, "b1");
    assert_eq!(record.size, 1024);
    assert_eq!(publisher.sent().len(), 1);
}

#[tokio::test]
async fn test_dispatched_message_completes_existing_record() {
    let table = Arc::new(InMemoryTable::default());
    table.insert(existing_record("photo.jpg"));
    let detector = Arc::new(StaticDetector::default().with("photo.jpg", &["Cat", "Outdoor"]));
    let ctx = PipelineContext::new(table.clone(), fan_out_config()).with_detector(detector.clone());
    let handler = AnalysisEventHandler::new(&ctx).unwrap();

    let event = json!({
        "Records": [{
            "EventSource": "aws:sns",
            "Sns": {
                "MessageId": "m-1",
                "Message": r#"{"bucket":"b1","key":"photo.jpg"}"#,
                "MessageAttributes": { "eventType": { "Type": "String", "Value": "OBJECT_CREATED" } }
            }
        }]
    });

    let report = handler.handle(&event).await.unwrap();
    assert!(report.is_clean());

    let record = table.record("photo.jpg").unwrap();
    assert_eq!(record.status, RecordStatus::AnalysisComplete);
    assert_eq!(record.labels, Some(vec!["Cat".to_string(), "Outdoor".to_string()]));
    assert!(record.analyzed_at.is_some());
    assert_eq!(record.bucket, "b1");
    assert_eq!(record.size, 1024);
    assert_eq!(record.upload_time, existing_record("photo.jpg").upload_time);

    let requests = detector.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].max_labels, 5);
    assert_eq!(requests[0].min_confidence, 70.0);
}

#[tokio::test]
async fn test_repeated_notification_yields_one_record() {
    let table = Arc::new(InMemoryTable::default());
    let publisher = Arc::new(RecordingPublisher::default());
    let ctx = PipelineContext::new(table.clone(), fan_out_config()).with_publisher(publisher);
    let handler = UploadEventHandler::new(&ctx).unwrap();

    let event = batch(vec![object_created("b1", "photo.jpg", 1024)]);
    handler.handle(&event).await.unwrap();
    handler.handle(&event).await.unwrap();

    assert_eq!(table.len(), 1);
    assert_eq!(
        table.record("photo.jpg").unwrap().status,
        RecordStatus::Initialized
    );
}

#[tokio::test]
async fn test_encoded_key_reaches_the_same_record() {
    let table = Arc::new(InMemoryTable::default());
    let publisher = Arc::new(RecordingPublisher::default());
    let detector = Arc::new(StaticDetector::default().with("summer trip (1)+.jpg", &["Beach"]));
    let ctx = PipelineContext::new(table.clone(), fan_out_config())
        .with_publisher(publisher.clone())
        .with_detector(detector);

    let intake = UploadEventHandler::new(&ctx).unwrap();
    intake
        .handle(&batch(vec![object_created(
            "b1",
            "summer+trip+%281%29%2B.jpg",
            2048,
        )]))
        .await
        .unwrap();

    let analysis = AnalysisEventHandler::new(&ctx).unwrap();
    let report = analysis
        .handle(&publisher.as_notification_batch())
        .await
        .unwrap();

    assert!(report.is_clean());
    assert_eq!(table.len(), 1);
    let record = table.record("summer trip (1)+.jpg").unwrap();
    assert_eq!(record.status, RecordStatus::AnalysisComplete);
    assert_eq!(record.labels, Some(vec!["Beach".to_string()]));
}

#[tokio::test]
async fn test_redelivered_intake_never_downgrades() {
    let table = Arc::new(InMemoryTable::default());
    let publisher = Arc::new(RecordingPublisher::default());
    let detector = Arc::new(StaticDetector::default().with("photo.jpg", &["Cat"]));
    let ctx = PipelineContext::new(table.clone(), fan_out_config())
        .with_publisher(publisher.clone())
        .with_detector(detector);

    let intake = UploadEventHandler::new(&ctx).unwrap();
    let analysis = AnalysisEventHandler::new(&ctx).unwrap();
    let event = batch(vec![object_created("b1", "photo.jpg", 1024)]);

    intake.handle(&event).await.unwrap();
    analysis
        .handle(&publisher.as_notification_batch())
        .await
        .unwrap();
    intake.handle(&event).await.unwrap();

    let record = table.record("photo.jpg").unwrap();
    assert_eq!(record.status, RecordStatus::AnalysisComplete);
    assert_eq!(record.labels, Some(vec!["Cat".to_string()]));
    // The redelivered notification is not dispatched again
    assert_eq!(publisher.sent().len(), 1);
}

#[tokio::test]
async fn test_publish_failure_keeps_record_initialized() {
    let table = Arc::new(InMemoryTable::default());
    let publisher = Arc::new(RecordingPublisher::rejecting("broken.jpg"));
    let ctx = PipelineContext::new(table.clone(), fan_out_config()).with_publisher(publisher.clone());
    let handler = UploadEventHandler::new(&ctx).unwrap();

    let event = batch(vec![
        object_created("b1", "broken.jpg", 10),
        object_created("b1", "fine.jpg", 20),
    ]);
    let report = handler.handle(&event).await.unwrap();

    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failures[0].id.as_deref(), Some("broken.jpg"));
    assert!(!report.failures[0].malformed);
    assert_eq!(
        table.record("broken.jpg").unwrap().status,
        RecordStatus::Initialized
    );
    assert_eq!(publisher.sent().len(), 1);
}

#[tokio::test]
async fn test_fail_batch_on_error_requests_redelivery() {
    let table = Arc::new(InMemoryTable::default());
    let publisher = Arc::new(RecordingPublisher::rejecting("broken.jpg"));
    let config = PipelineConfig {
        fail_batch_on_error: true,
        ..fan_out_config()
    };
    let ctx = PipelineContext::new(table.clone(), config).with_publisher(publisher);
    let handler = UploadEventHandler::new(&ctx).unwrap();

    let err = handler
        .handle(&batch(vec![object_created("b1", "broken.jpg", 10)]))
        .await
        .unwrap_err();

    assert!(matches!(err, StageError::BatchFailed { failed: 1, total: 1 }));
    assert_eq!(table.len(), 1);
}

#[tokio::test]
async fn test_direct_mode_labels_in_one_invocation() {
    let table = Arc::new(InMemoryTable::default());
    let detector = Arc::new(StaticDetector::default().with("dog.png", &["Dog", "Pet"]));
    let config = PipelineConfig {
        mode: PipelineMode::Direct,
        ..Default::default()
    };
    let ctx = PipelineContext::new(table.clone(), config).with_detector(detector);
    let handler = UploadEventHandler::new(&ctx).unwrap();

    let report = handler
        .handle(&batch(vec![object_created("b1", "dog.png", 512)]))
        .await
        .unwrap();

    assert!(report.is_clean());
    let record = table.record("dog.png").unwrap();
    assert_eq!(record.status, RecordStatus::AnalysisComplete);
    assert_eq!(record.labels, Some(vec!["Dog".to_string(), "Pet".to_string()]));
    assert_eq!(record.size, 512);
}

#[tokio::test]
async fn test_zero_labels_complete_with_empty_list() {
    let table = Arc::new(InMemoryTable::default());
    table.insert(existing_record("blank.jpg"));
    let detector = Arc::new(StaticDetector::default());
    let ctx = PipelineContext::new(table.clone(), fan_out_config()).with_detector(detector);
    let handler = AnalysisEventHandler::new(&ctx).unwrap();

    // Object-created batch delivered straight to the analyzer
    let report = handler
        .handle(&batch(vec![object_created("b1", "blank.jpg", 1024)]))
        .await
        .unwrap();

    assert!(report.is_clean());
    let record = table.record("blank.jpg").unwrap();
    assert_eq!(record.status, RecordStatus::AnalysisComplete);
    assert_eq!(record.labels, Some(Vec::new()));
}

#[tokio::test]
async fn test_enrichment_failures_are_isolated() {
    let table = Arc::new(InMemoryTable::default());
    table.insert(existing_record("down.jpg"));
    table.insert(existing_record("ok.jpg"));
    let detector = Arc::new(
        StaticDetector::default()
            .with("ok.jpg", &["Tree"])
            .failing_on("down.jpg"),
    );
    let ctx = PipelineContext::new(table.clone(), fan_out_config()).with_detector(detector);
    let handler = AnalysisEventHandler::new(&ctx).unwrap();

    let report = handler
        .handle(&batch(vec![
            object_created("b1", "down.jpg", 1),
            object_created("b1", "missing.jpg", 1),
            object_created("b1", "ok.jpg", 1),
        ]))
        .await
        .unwrap();

    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failures.len(), 2);
    assert_eq!(
        table.record("down.jpg").unwrap().status,
        RecordStatus::Initialized
    );
    assert_eq!(
        table.record("ok.jpg").unwrap().status,
        RecordStatus::AnalysisComplete
    );
    // No orphan item for the object that was never recorded
    assert!(table.record("missing.jpg").is_none());
    assert_eq!(table.len(), 2);
}

#[tokio::test]
async fn test_unrecognized_first_record_does_not_block_notifications() {
    let table = Arc::new(InMemoryTable::default());
    table.insert(existing_record("photo.jpg"));
    let detector = Arc::new(StaticDetector::default().with("photo.jpg", &["Cat"]));
    let config = PipelineConfig {
        fail_batch_on_error: true,
        ..fan_out_config()
    };
    let ctx = PipelineContext::new(table.clone(), config).with_detector(detector);
    let handler = AnalysisEventHandler::new(&ctx).unwrap();

    let event = json!({
        "Records": [
            { "EventSource": "aws:sns" },
            {
                "EventSource": "aws:sns",
                "Sns": {
                    "MessageId": "m-2",
                    "Message": r#"{"bucket":"b1","key":"photo.jpg"}"#,
                    "MessageAttributes": { "eventType": { "Type": "String", "Value": "OBJECT_CREATED" } }
                }
            }
        ]
    });

    // Only malformed input failed, so no redelivery is requested
    let report = handler.handle(&event).await.unwrap();

    assert_eq!(report.total, 2);
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failures[0].index, 0);
    assert!(report.failures[0].malformed);

    let record = table.record("photo.jpg").unwrap();
    assert_eq!(record.status, RecordStatus::AnalysisComplete);
    assert_eq!(record.labels, Some(vec!["Cat".to_string()]));
}

#[tokio::test]
async fn test_redelivered_intake_keeps_first_write_times() {
    let table = Arc::new(InMemoryTable::default());
    let original = existing_record("photo.jpg");
    table.insert(original.clone());
    let publisher = Arc::new(RecordingPublisher::default());
    let ctx = PipelineContext::new(table.clone(), fan_out_config()).with_publisher(publisher);
    let handler = UploadEventHandler::new(&ctx).unwrap();

    let mut redelivered = object_created("b1", "photo.jpg", 1024);
    redelivered.as_object_mut().unwrap().remove("eventTime");
    handler.handle(&batch(vec![redelivered])).await.unwrap();

    let record = table.record("photo.jpg").unwrap();
    assert_eq!(record.status, RecordStatus::Initialized);
    assert_eq!(record.created_at, original.created_at);
    assert_eq!(record.upload_time, original.upload_time);
}
