//! Image Pipeline - upload ingestion and label enrichment
//!
//! Reacts to object-created notifications from the upload bucket, records one
//! metadata entry per object, and enriches the entry with labels from an
//! image-labeling service. Enrichment either runs in the same invocation or is
//! fanned out through a notification topic.
//!
//! ```text
//! bucket ──▶ UploadEventHandler ──▶ table (INITIALIZED)
//!                 │
//!                 ├─ fan_out ──▶ topic ──▶ AnalysisEventHandler ─┐
//!                 │                                              ▼
//!                 └─ direct ─────────────────────────▶ LabelEnricher ──▶ table (ANALYSIS_COMPLETE)
//! ```
//!
//! Delivery from every trigger source is at-least-once. Every table write is
//! keyed by the record id and safe to repeat, and no stage retries on its
//! own: redelivery of the triggering batch is the only recovery path.
//!
//! # Example
//!
//! ```rust,no_run
//! use image_pipeline::{AnalysisEventHandler, PipelineContext};
//!
//! async fn on_notification(ctx: &PipelineContext, event: serde_json::Value) {
//!     let handler = AnalysisEventHandler::new(ctx).expect("detector configured");
//!     let report = handler.handle(&event).await;
//!     println!("{report:?}");
//! }
//! ```

pub mod batch;
pub mod config;
pub mod consumer;
pub mod context;
pub mod dispatcher;
pub mod enrichment;
mod error;
pub mod event;
pub mod handlers;
pub mod intake;
pub mod labels;
pub mod producer;
pub mod record;
pub mod store;

// Re-export main types
pub use batch::{BatchReport, ElementFailure};
pub use config::{ConfigError, LabelPolicy, PipelineConfig, PipelineMode};
pub use consumer::{IncomingMessage, MessageHandler, MessageMetadata};
pub use context::PipelineContext;
pub use dispatcher::{DispatchMessage, Dispatcher, OBJECT_CREATED_EVENT};
pub use enrichment::LabelEnricher;
pub use error::StageError;
pub use event::{EventError, ObjectCreated, TriggerKind};
pub use handlers::{AnalysisEventHandler, UploadEventHandler};
pub use intake::UploadIntake;
pub use labels::{DetectError, DetectedLabel, LabelDetector, LabelRequest, RekognitionDetector};
pub use producer::{
    DeliveryReceipt, NotificationPublisher, OutgoingMessage, PublishError, SnsPublisher,
};
pub use record::{LabelPatch, RecordError, RecordId, RecordStatus, UploadRecord};
pub use store::{MetadataTable, PutOutcome, StoreError};
