use crate::models::Prescription;
use crate::prompts::READ_DOCTOR_PRESCRIPTION_V1;
use crate::services::file_type::ALLOWED_CONTENT_TYPE;
use crate::services::providers::{FileSource, FinishReason, GenerationParams};
use crate::services::{validate_file_type, AssetGuard, FileTypeError};
use crate::startup::AppState;
use anyhow::Context;
use axum::{
    body::Bytes,
    extract::{multipart::MultipartError, FromRequest, Multipart, Request, State},
    http::{
        header::{CONTENT_LENGTH, CONTENT_TYPE},
        HeaderMap, StatusCode,
    },
    Json,
};
use serde::Deserialize;
use service_core::error::AppError;
use std::io::Cursor;
use validator::Validate;

/// Body ceiling for multipart uploads (15 MiB).
pub const MAX_FILE_BODY_BYTES: usize = 15 << 20;

/// Body ceiling for JSON requests carrying only a URL (16 KiB).
pub const MAX_URL_BODY_BYTES: usize = 1 << 14;

/// Display name every upload is stored under.
pub const UPLOAD_NAME: &str = "prescription";

#[derive(Debug, Deserialize, Validate)]
pub struct UrlRequest {
    #[serde(default)]
    #[validate(url)]
    pub url: String,
}

#[derive(Debug)]
enum PrescriptionInput {
    File(Bytes),
    Url(String),
}

/// Extract medicines, dosages, probable causes and a fatality score from a
/// prescription image.
///
/// Accepts `multipart/form-data` with a PNG `file` and/or a `url` field, or a
/// JSON body `{"url": "..."}`. A file wins when both are sent. Model output
/// that does not decode still answers 200 with an undetermined result.
pub async fn get_drugs(
    State(state): State<AppState>,
    request: Request,
) -> Result<Json<Prescription>, AppError> {
    let input = if is_multipart(request.headers()) {
        enforce_content_length(request.headers(), MAX_FILE_BODY_BYTES)?;
        read_multipart(request, &state).await?
    } else {
        enforce_content_length(request.headers(), MAX_URL_BODY_BYTES)?;
        read_json(request).await?
    };

    let client = state
        .model_factory
        .create_client(&state.config.gemini.api_key)
        .context("failed to create a model client")?;

    // The guard lives until the handler returns so the upload is removed on every exit path.
    let (source, _asset_guard) = match input {
        PrescriptionInput::File(bytes) => {
            let size = bytes.len();
            let asset = client
                .upload_file(UPLOAD_NAME, ALLOWED_CONTENT_TYPE, bytes)
                .await
                .context("failed to upload the file")?;

            tracing::info!(asset = %asset.name, size, "Uploaded prescription image");

            let guard = AssetGuard::new(client.clone(), asset.clone());
            (FileSource::Asset(asset), Some(guard))
        }
        PrescriptionInput::Url(url) => {
            tracing::info!(url = %url, "Reading prescription from URL");
            (FileSource::Url(url), None)
        }
    };

    let response = client
        .generate(
            &source,
            READ_DOCTOR_PRESCRIPTION_V1,
            &GenerationParams::deterministic(),
        )
        .await
        .context("failed to generate content")?;

    let data = response.text();
    if response.finish_reason == FinishReason::Length {
        tracing::warn!(
            output_tokens = response.output_tokens,
            "Model output hit the token limit and may be truncated"
        );
    }

    match Prescription::from_model_output(&data) {
        Ok(prescription) => {
            tracing::info!(
                medicines = prescription.medicines.len(),
                fatality = prescription.fatality,
                input_tokens = response.input_tokens,
                output_tokens = response.output_tokens,
                "Prescription extracted"
            );
            Ok(Json(prescription))
        }
        Err(e) => {
            tracing::error!(error = %e, data = %data, "Failed to decode the model output");
            Ok(Json(Prescription::undetermined()))
        }
    }
}

fn is_multipart(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.trim_start().to_ascii_lowercase().starts_with("multipart/form-data"))
        .unwrap_or(false)
}

/// Reject a declared body size above `limit` before any of it is read.
fn enforce_content_length(headers: &HeaderMap, limit: usize) -> Result<(), AppError> {
    let declared = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());

    match declared {
        Some(len) if len > limit as u64 => Err(AppError::PayloadTooLarge),
        _ => Ok(()),
    }
}

fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge
    } else {
        tracing::debug!(error = %err, "Failed to read multipart body");
        AppError::bad_request("invalid file")
    }
}

async fn read_multipart(request: Request, state: &AppState) -> Result<PrescriptionInput, AppError> {
    let mut multipart = Multipart::from_request(request, state)
        .await
        .map_err(|_| AppError::bad_request("invalid request body"))?;

    let mut file: Option<Bytes> = None;
    let mut url: Option<String> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().map(str::to_owned);
        match name.as_deref() {
            Some("file") => {
                let bytes = field.bytes().await.map_err(multipart_error)?;
                if !bytes.is_empty() {
                    file = Some(bytes);
                }
            }
            Some("url") => {
                let text = field.text().await.map_err(multipart_error)?;
                let text = text.trim();
                if !text.is_empty() {
                    url = Some(text.to_string());
                }
            }
            _ => {}
        }
    }

    if let Some(bytes) = file {
        let mut cursor = Cursor::new(bytes);
        validate_file_type(&mut cursor).map_err(|e| match e {
            FileTypeError::InvalidType { detected } => {
                tracing::debug!(detected, "Rejected upload");
                AppError::bad_request("invalid file type, only PNG files are allowed")
            }
            other => AppError::InternalError(anyhow::Error::new(other)),
        })?;
        return Ok(PrescriptionInput::File(cursor.into_inner()));
    }

    match url {
        Some(url) => {
            let body = UrlRequest { url };
            body.validate()?;
            Ok(PrescriptionInput::Url(body.url))
        }
        None => Err(AppError::bad_request("invalid file")),
    }
}

async fn read_json(request: Request) -> Result<PrescriptionInput, AppError> {
    let bytes = axum::body::to_bytes(request.into_body(), MAX_URL_BODY_BYTES)
        .await
        .map_err(|e| {
            if is_length_limit(&e) {
                AppError::PayloadTooLarge
            } else {
                AppError::bad_request("invalid request body")
            }
        })?;

    let body: UrlRequest = serde_json::from_slice(&bytes).map_err(|e| {
        tracing::debug!(error = %e, "Invalid JSON body");
        AppError::bad_request("invalid request body")
    })?;

    body.validate()?;
    Ok(PrescriptionInput::Url(body.url))
}

fn is_length_limit(err: &(dyn std::error::Error + 'static)) -> bool {
    let mut current = Some(err);
    while let Some(e) = current {
        if e.is::<http_body_util::LengthLimitError>() {
            return true;
        }
        current = e.source();
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn detects_multipart_content_type() {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("Multipart/Form-Data; boundary=abc"),
        );
        assert!(is_multipart(&headers));

        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        assert!(!is_multipart(&headers));

        assert!(!is_multipart(&HeaderMap::new()));
    }

    #[test]
    fn content_length_over_limit_is_rejected() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_LENGTH, HeaderValue::from(MAX_URL_BODY_BYTES + 1));
        assert!(matches!(
            enforce_content_length(&headers, MAX_URL_BODY_BYTES),
            Err(AppError::PayloadTooLarge)
        ));

        headers.insert(CONTENT_LENGTH, HeaderValue::from(MAX_URL_BODY_BYTES));
        assert!(enforce_content_length(&headers, MAX_URL_BODY_BYTES).is_ok());
    }

    #[test]
    fn url_request_requires_well_formed_url() {
        assert!(UrlRequest {
            url: "https://example.com/rx.png".to_string()
        }
        .validate()
        .is_ok());
        assert!(UrlRequest {
            url: "example dot com".to_string()
        }
        .validate()
        .is_err());
        assert!(UrlRequest { url: String::new() }.validate().is_err());
    }
}
