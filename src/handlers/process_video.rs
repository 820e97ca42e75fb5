//! One-shot upload endpoint: the whole recording in one request body.
//!
//! Every outcome is answered with 200 and a JSON report; failures are told apart by
//! the `error` field and a score of 0.

use crate::audio::processor::ContainerFormat;
use crate::pipeline::ProcessVideoResponse;
use crate::state::AppState;
use actix_web::{web, HttpResponse};
use futures_util::StreamExt;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct UploadParams {
    format: Option<String>,
}

/// Read the request body, refusing more than `limit` bytes.
async fn read_body(mut payload: web::Payload, limit: usize) -> Result<Vec<u8>, String> {
    let mut body = Vec::new();
    while let Some(chunk) = payload.next().await {
        let chunk = chunk.map_err(|e| e.to_string())?;
        if body.len() + chunk.len() > limit {
            return Err(format!("upload exceeds the {} byte limit", limit));
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}

pub async fn process_video(
    payload: web::Payload,
    params: web::Query<UploadParams>,
    state: web::Data<AppState>,
) -> HttpResponse {
    let limit = state.get_config().performance.max_upload_bytes;

    let format = match params.format.as_deref().map(str::parse::<ContainerFormat>) {
        None => ContainerFormat::Auto,
        Some(Ok(format)) => format,
        Some(Err(err)) => {
            tracing::warn!("Rejecting upload: {}", err);
            return HttpResponse::Ok().json(ProcessVideoResponse::invalid_request());
        }
    };

    let body = match read_body(payload, limit).await {
        Ok(body) => body,
        Err(err) => {
            tracing::warn!("Could not read upload body: {}", err);
            return HttpResponse::Ok().json(ProcessVideoResponse::invalid_request());
        }
    };

    tracing::info!(bytes = body.len(), %format, "Processing uploaded recording");

    let outcome = state.pipeline.process_upload(&body, format).await;
    state.record_pipeline_run(outcome.used_fallback);

    HttpResponse::Ok().json(outcome.response)
}

/// Pre-flight answer; the CORS headers come from the app-wide middleware.
pub async fn preflight() -> HttpResponse {
    HttpResponse::Ok().finish()
}
