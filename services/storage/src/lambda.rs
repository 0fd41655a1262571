//! Function entry points.
//!
//! Each binary loads [`Config`](crate::Config), builds its handler once and
//! serves invocations with `lambda_runtime`. Batch handlers return the
//! [`BatchReport`] as the invocation result; an `Err` is only returned when
//! `fail_batch_on_error` asks the trigger source to redeliver.

use crate::presigned_urls::{IssueOutcome, UploadUrlIssuer};
use aws_lambda_events::apigw::{ApiGatewayV2httpRequest, ApiGatewayV2httpResponse};
use aws_lambda_events::encodings::Body;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use http::header::CONTENT_TYPE;
use http::{HeaderMap, HeaderValue};
use image_pipeline::{AnalysisEventHandler, BatchReport, UploadEventHandler};
use lambda_runtime::{Error, LambdaEvent};
use serde_json::Value;
use tracing::{error, info};

/// Object-created batches from the upload bucket
pub async fn upload_intake(
    handler: &UploadEventHandler,
    event: LambdaEvent<Value>,
) -> Result<BatchReport, Error> {
    info!(request_id = %event.context.request_id, "Upload intake invoked");
    Ok(handler.handle(&event.payload).await?)
}

/// Topic notifications or object-created batches for label enrichment
pub async fn label_analyzer(
    handler: &AnalysisEventHandler,
    event: LambdaEvent<Value>,
) -> Result<BatchReport, Error> {
    info!(request_id = %event.context.request_id, "Label analyzer invoked");
    Ok(handler.handle(&event.payload).await?)
}

/// HTTP API upload URL requests. Always answers; failures become a 500 body.
pub async fn upload_url(
    issuer: &UploadUrlIssuer,
    event: LambdaEvent<ApiGatewayV2httpRequest>,
) -> Result<ApiGatewayV2httpResponse, Error> {
    let outcome = match request_body(&event.payload) {
        Ok(body) => issuer.issue(body.as_deref()).await,
        Err(e) => {
            error!(error = %e, "Undecodable request body");
            metrics::counter!("issuer.urls.failed").increment(1);
            IssueOutcome::Failed
        }
    };

    Ok(api_response(&outcome))
}

fn request_body(request: &ApiGatewayV2httpRequest) -> Result<Option<Vec<u8>>, base64::DecodeError> {
    match request.body {
        Some(ref body) if request.is_base64_encoded => STANDARD.decode(body).map(Some),
        Some(ref body) => Ok(Some(body.clone().into_bytes())),
        None => Ok(None),
    }
}

fn api_response(outcome: &IssueOutcome) -> ApiGatewayV2httpResponse {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

    ApiGatewayV2httpResponse {
        status_code: i64::from(outcome.status().as_u16()),
        headers,
        body: Some(Body::Text(outcome.body().to_string())),
        ..Default::default()
    }
}
