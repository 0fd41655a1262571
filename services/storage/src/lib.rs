//! Image Storage Service
//!
//! Deployable side of the image logger: configuration, the DynamoDB metadata
//! table, upload URL issuance against the S3 upload bucket, and the function
//! entry points wrapping the [`image_pipeline`] stages.
//!
//! ## Entry points
//!
//! - `upload-intake`: object-created batches from the upload bucket
//! - `label-analyzer`: dispatched topic notifications (or object-created
//!   batches) for label enrichment
//! - `upload-url`: HTTP API requests for presigned upload URLs
//! - `image-storage`: long-running HTTP API serving upload URLs and record
//!   lookups, including the listing of records stuck at `INITIALIZED`
//!
//! ## Architecture
//!
//! ```text
//!  client ──▶ upload-url ──▶ presigned PUT ──▶ S3 upload bucket
//!                                                   │
//!                                                   ▼
//!                                            upload-intake ──▶ DynamoDB
//!                                                   │              ▲
//!                                                   ▼              │
//!                                              SNS topic ──▶ label-analyzer
//!                                                                  │
//!                                                                  ▼
//!                                                             Rekognition
//! ```

pub mod config;
pub mod context;
pub mod lambda;
pub mod metadata_store;
pub mod presigned_urls;
pub mod s3_presigner;
pub mod telemetry;

pub use config::Config;
pub use metadata_store::DynamoMetadataStore;
pub use presigned_urls::{AppState, IssueOutcome, UploadUrlIssuer, UploadUrlResponse};
pub use s3_presigner::{PresignError, S3Presigner, UploadPresigner};
