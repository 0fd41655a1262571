//! Stage entry points invoked once per trigger batch.

use crate::batch::{run_batch, BatchReport, ElementId};
use crate::config::{ConfigError, PipelineConfig, PipelineMode};
use crate::consumer::{IncomingMessage, MessageHandler};
use crate::context::PipelineContext;
use crate::dispatcher::Dispatcher;
use crate::enrichment::LabelEnricher;
use crate::event::{batch_records, parse_object_batch, EventError, ObjectCreated, TriggerKind};
use crate::intake::UploadIntake;
use crate::store::PutOutcome;
use crate::StageError;
use serde_json::Value;
use tracing::{info, instrument, warn};

/// Work done for an object after its record is written
enum FollowUp {
    Dispatch(Dispatcher),
    Label(LabelEnricher),
}

/// Handles object-created batches: records each object, then dispatches or
/// labels it depending on the pipeline mode
pub struct UploadEventHandler {
    intake: UploadIntake,
    follow_up: FollowUp,
    config: PipelineConfig,
}

impl UploadEventHandler {
    pub fn new(ctx: &PipelineContext) -> Result<Self, ConfigError> {
        ctx.config.validate()?;

        let follow_up = match ctx.config.mode {
            PipelineMode::FanOut => {
                let publisher = ctx
                    .publisher
                    .clone()
                    .ok_or_else(|| ConfigError::MissingRequired("notification publisher".to_string()))?;
                FollowUp::Dispatch(Dispatcher::new(publisher, ctx.config.topic()?))
            }
            PipelineMode::Direct => FollowUp::Label(enricher(ctx)?),
        };

        Ok(Self {
            intake: UploadIntake::new(ctx.table.clone()),
            follow_up,
            config: ctx.config.clone(),
        })
    }

    #[instrument(skip(self, event), fields(mode = self.config.mode.as_str()))]
    pub async fn handle(&self, event: &Value) -> Result<BatchReport, StageError> {
        let elements = match parse_object_batch(event) {
            Ok(elements) => elements,
            Err(e) => {
                warn!(error = %e, "Ignoring event without upload records");
                return Ok(BatchReport::default());
            }
        };

        let report = run_batch(elements, self.config.concurrency, |object| async move {
            self.process(&object).await
        })
        .await;

        info!(
            total = report.total,
            succeeded = report.succeeded,
            failed = report.failed(),
            "Upload batch processed"
        );

        report.into_result(self.config.fail_batch_on_error)
    }

    async fn process(&self, object: &ObjectCreated) -> Result<(), StageError> {
        if self.intake.record(object).await? == PutOutcome::AlreadyAdvanced {
            return Ok(());
        }

        // A failure past this point leaves the record at INITIALIZED
        match &self.follow_up {
            FollowUp::Dispatch(dispatcher) => {
                dispatcher.dispatch(object).await?;
            }
            FollowUp::Label(enricher) => {
                enricher.enrich(&object.bucket, &object.id).await?;
            }
        }

        Ok(())
    }
}

/// Handles enrichment batches, either topic notifications carrying dispatch
/// messages or object-created notifications delivered directly
pub struct AnalysisEventHandler {
    enricher: LabelEnricher,
    config: PipelineConfig,
}

impl AnalysisEventHandler {
    pub fn new(ctx: &PipelineContext) -> Result<Self, ConfigError> {
        Ok(Self {
            enricher: enricher(ctx)?,
            config: ctx.config.clone(),
        })
    }

    #[instrument(skip(self, event))]
    pub async fn handle(&self, event: &Value) -> Result<BatchReport, StageError> {
        let records = match batch_records(event) {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, "Ignoring event without analysis records");
                return Ok(BatchReport::default());
            }
        };

        // Each record is classified on its own; an unrecognized one fails alone
        let elements: Vec<_> = records.iter().map(AnalysisElement::from_value).collect();

        let report = run_batch(elements, self.config.concurrency, |element| async move {
            match element {
                AnalysisElement::Notification(message) => {
                    match self.enricher.handle(message.clone()).await {
                        Ok(_) => Ok(()),
                        Err(e) => {
                            self.enricher.on_error(&message, &e).await;
                            Err(e)
                        }
                    }
                }
                AnalysisElement::Object(object) => self
                    .enricher
                    .enrich(&object.bucket, &object.id)
                    .await
                    .map(|_| ()),
            }
        })
        .await;

        info!(
            total = report.total,
            succeeded = report.succeeded,
            failed = report.failed(),
            "Analysis batch processed"
        );

        report.into_result(self.config.fail_batch_on_error)
    }
}

/// One record of an analysis batch
enum AnalysisElement {
    Notification(IncomingMessage),
    Object(ObjectCreated),
}

impl AnalysisElement {
    fn from_value(record: &Value) -> Result<Self, EventError> {
        match TriggerKind::of_record(record)? {
            TriggerKind::Notification => IncomingMessage::from_value(record).map(Self::Notification),
            TriggerKind::ObjectCreated => ObjectCreated::from_value(record).map(Self::Object),
        }
    }
}

impl ElementId for AnalysisElement {
    fn element_id(&self) -> Option<String> {
        match self {
            AnalysisElement::Notification(message) => message.element_id(),
            AnalysisElement::Object(object) => object.element_id(),
        }
    }
}

fn enricher(ctx: &PipelineContext) -> Result<LabelEnricher, ConfigError> {
    let detector = ctx
        .detector
        .clone()
        .ok_or_else(|| ConfigError::MissingRequired("label detector".to_string()))?;
    Ok(LabelEnricher::new(
        detector,
        ctx.table.clone(),
        ctx.config.labels.clone(),
    ))
}
