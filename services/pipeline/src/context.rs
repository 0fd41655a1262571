//! Process-wide collaborators handed to every stage entry point.

use crate::config::PipelineConfig;
use crate::labels::LabelDetector;
use crate::producer::NotificationPublisher;
use crate::store::MetadataTable;
use std::sync::Arc;

/// Clients built once at startup and shared across invocations
#[derive(Clone)]
pub struct PipelineContext {
    pub table: Arc<dyn MetadataTable>,
    pub publisher: Option<Arc<dyn NotificationPublisher>>,
    pub detector: Option<Arc<dyn LabelDetector>>,
    pub config: PipelineConfig,
}

impl PipelineContext {
    pub fn new(table: Arc<dyn MetadataTable>, config: PipelineConfig) -> Self {
        Self {
            table,
            publisher: None,
            detector: None,
            config,
        }
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn NotificationPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn with_detector(mut self, detector: Arc<dyn LabelDetector>) -> Self {
        self.detector = Some(detector);
        self
    }
}
