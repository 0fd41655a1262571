//! Per-element isolation for trigger batches.

use crate::consumer::IncomingMessage;
use crate::event::ObjectCreated;
use crate::StageError;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::future::Future;
use tracing::{error, warn};

/// Why an element did not complete
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ElementFailure {
    /// Position of the element in the batch
    pub index: usize,
    /// Record id, when it could be derived
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub error: String,
    /// The input itself was bad; redelivery cannot help
    pub malformed: bool,
}

/// Summary of one batch invocation
#[derive(Debug, Clone, Default, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub total: usize,
    pub succeeded: usize,
    pub failures: Vec<ElementFailure>,
}

impl BatchReport {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Whether any failure came from a downstream service rather than input
    pub fn has_retryable_failures(&self) -> bool {
        self.failures.iter().any(|f| !f.malformed)
    }

    /// Convert into an error when the caller wants failed batches redelivered
    pub fn into_result(self, fail_on_error: bool) -> Result<Self, StageError> {
        if fail_on_error && self.has_retryable_failures() {
            return Err(StageError::BatchFailed {
                failed: self.failed(),
                total: self.total,
            });
        }
        Ok(self)
    }

    fn record(&mut self, index: usize, id: Option<String>, result: Result<(), StageError>) {
        match result {
            Ok(()) => self.succeeded += 1,
            Err(e) => {
                let malformed = e.is_malformed_input();
                if malformed {
                    warn!(index, id = ?id, error = %e, "Skipping malformed batch element");
                } else {
                    error!(index, id = ?id, error = %e, "Batch element failed");
                }
                metrics::counter!("pipeline.elements.failed").increment(1);
                self.failures.push(ElementFailure {
                    index,
                    id,
                    error: e.to_string(),
                    malformed,
                });
            }
        }
    }
}

/// Something a batch element can be identified by in logs and reports
pub trait ElementId {
    fn element_id(&self) -> Option<String>;
}

impl ElementId for ObjectCreated {
    fn element_id(&self) -> Option<String> {
        Some(self.id.to_string())
    }
}

impl ElementId for IncomingMessage {
    fn element_id(&self) -> Option<String> {
        self.metadata.message_id.clone()
    }
}

/// Run `process` over every successfully parsed element, at most
/// `concurrency` at a time, in batch order. Parse failures and processing
/// failures are logged and reported; none of them stops the batch.
pub async fn run_batch<T, E, F, Fut>(
    elements: Vec<Result<T, E>>,
    concurrency: usize,
    process: F,
) -> BatchReport
where
    T: ElementId,
    E: Into<StageError>,
    F: Fn(T) -> Fut,
    Fut: Future<Output = Result<(), StageError>>,
{
    let total = elements.len();
    let process = &process;

    let results: Vec<(usize, Option<String>, Result<(), StageError>)> =
        stream::iter(elements.into_iter().enumerate())
            .map(|(index, element)| async move {
                match element {
                    Ok(item) => {
                        let id = item.element_id();
                        (index, id, process(item).await)
                    }
                    Err(e) => (index, None, Err(e.into())),
                }
            })
            .buffered(concurrency.max(1))
            .collect()
            .await;

    let mut report = BatchReport {
        total,
        ..Default::default()
    };
    for (index, id, result) in results {
        report.record(index, id, result);
    }
    report
}
