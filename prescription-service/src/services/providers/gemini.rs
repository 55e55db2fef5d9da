//! Gemini provider implementation.
//!
//! Uses the Gemini REST API: the Files API for uploads and
//! `generateContent` for extraction.

use super::{
    AssetReference, FileSource, FinishReason, GenerationParams, ModelClientFactory,
    ModelResponse, PrescriptionModel, ProviderError,
};
use async_trait::async_trait;
use axum::body::Bytes;
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Gemini API base URL.
pub const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com";

const UPLOAD_URL_HEADER: &str = "x-goog-upload-url";
const API_KEY_HEADER: &str = "x-goog-api-key";

/// Gemini client configuration.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

/// Gemini REST client.
pub struct GeminiClient {
    config: GeminiConfig,
    client: Client,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig, client: Client) -> Result<Self, ProviderError> {
        if config.api_key.trim().is_empty() {
            return Err(ProviderError::NotConfigured(
                "Gemini API key not configured".to_string(),
            ));
        }

        Ok(Self { config, client })
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/v1beta/{}", self.config.base_url, path)
    }

    fn upload_start_url(&self) -> String {
        format!("{}/upload/v1beta/files", self.config.base_url)
    }

    async fn start_upload(
        &self,
        name: &str,
        mime_type: &str,
        len: usize,
    ) -> Result<String, ProviderError> {
        let response = self
            .client
            .post(self.upload_start_url())
            .header(API_KEY_HEADER, &self.config.api_key)
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", len.to_string())
            .header("X-Goog-Upload-Header-Content-Type", mime_type)
            .json(&UploadMetadata {
                file: UploadFileMetadata { display_name: name },
            })
            .send()
            .await
            .map_err(network_error)?;

        let response = check_status(response).await?;

        response
            .headers()
            .get(UPLOAD_URL_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string())
            .ok_or_else(|| {
                ProviderError::InvalidResponse("upload session URL missing".to_string())
            })
    }
}

/// Transport failure with the request URL stripped.
fn network_error(e: reqwest::Error) -> ProviderError {
    ProviderError::NetworkError(e.without_url().to_string())
}

async fn check_status(response: Response) -> Result<Response, ProviderError> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let error_text = response.text().await.unwrap_or_default();

    if status.as_u16() == 429 {
        return Err(ProviderError::RateLimited);
    }

    Err(ProviderError::ApiError(format!(
        "Gemini API error {}: {}",
        status, error_text
    )))
}

#[async_trait]
impl PrescriptionModel for GeminiClient {
    async fn upload_file(
        &self,
        name: &str,
        mime_type: &str,
        bytes: Bytes,
    ) -> Result<AssetReference, ProviderError> {
        let len = bytes.len();
        let upload_url = self.start_upload(name, mime_type, len).await?;

        tracing::debug!(display_name = %name, size = len, "Uploading file to Gemini");

        let response = self
            .client
            .post(&upload_url)
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .body(bytes)
            .send()
            .await
            .map_err(network_error)?;

        let uploaded: UploadResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| {
                ProviderError::InvalidResponse(format!(
                    "Failed to parse upload: {}",
                    e.without_url()
                ))
            })?;

        Ok(AssetReference {
            name: uploaded.file.name,
            uri: uploaded.file.uri,
            mime_type: uploaded
                .file
                .mime_type
                .unwrap_or_else(|| mime_type.to_string()),
        })
    }

    async fn delete_file(&self, asset: &AssetReference) -> Result<(), ProviderError> {
        let response = self
            .client
            .delete(self.api_url(&asset.name))
            .header(API_KEY_HEADER, &self.config.api_key)
            .send()
            .await
            .map_err(network_error)?;

        check_status(response).await?;
        Ok(())
    }

    async fn generate(
        &self,
        source: &FileSource,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<ModelResponse, ProviderError> {
        let request = GenerateContentRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![
                    RequestPart::FileData {
                        file_data: FileData {
                            mime_type: source.mime_type(),
                            file_uri: source.uri(),
                        },
                    },
                    RequestPart::Text { text: prompt },
                ],
            }],
            generation_config: GenerationConfig::from(params),
        };

        tracing::debug!(
            model = %self.config.model,
            prompt_len = prompt.len(),
            "Sending request to Gemini API"
        );

        let response = self
            .client
            .post(self.api_url(&format!("models/{}:generateContent", self.config.model)))
            .header(API_KEY_HEADER, &self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(network_error)?;

        let api_response: GenerateContentResponse = check_status(response)
            .await?
            .json()
            .await
            .map_err(|e| {
                ProviderError::InvalidResponse(format!(
                    "Failed to parse response: {}",
                    e.without_url()
                ))
            })?;

        let candidate = api_response.candidates.into_iter().next();

        let finish_reason = match candidate
            .as_ref()
            .and_then(|c| c.finish_reason.as_deref())
        {
            Some("MAX_TOKENS") => FinishReason::Length,
            Some("SAFETY") => FinishReason::ContentFilter,
            _ => FinishReason::Complete,
        };

        if finish_reason == FinishReason::ContentFilter {
            return Err(ProviderError::ContentFiltered);
        }

        let parts = candidate
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect()
            })
            .unwrap_or_default();

        let usage = api_response.usage_metadata.unwrap_or_default();

        Ok(ModelResponse {
            parts,
            input_tokens: usage.prompt_token_count.unwrap_or(0),
            output_tokens: usage.candidates_token_count.unwrap_or(0),
            finish_reason,
        })
    }
}

/// Builds [`GeminiClient`]s that share one connection pool.
pub struct GeminiClientFactory {
    model: String,
    base_url: String,
    client: Client,
}

impl GeminiClientFactory {
    pub fn new(model: impl Into<String>) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {}", e)))?;

        Ok(Self {
            model: model.into(),
            base_url: GEMINI_API_BASE.to_string(),
            client,
        })
    }

    /// Point clients at a different API host.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

impl ModelClientFactory for GeminiClientFactory {
    fn create_client(&self, api_key: &str) -> Result<Arc<dyn PrescriptionModel>, ProviderError> {
        let client = GeminiClient::new(
            GeminiConfig {
                api_key: api_key.to_string(),
                model: self.model.clone(),
                base_url: self.base_url.clone(),
            },
            self.client.clone(),
        )?;

        Ok(Arc::new(client))
    }
}

// ============================================================================
// Gemini API Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
struct UploadMetadata<'a> {
    file: UploadFileMetadata<'a>,
}

#[derive(Debug, Serialize)]
struct UploadFileMetadata<'a> {
    display_name: &'a str,
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    file: UploadedFile,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadedFile {
    name: String,
    uri: String,
    #[serde(default)]
    mime_type: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig<'a>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    role: &'a str,
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum RequestPart<'a> {
    Text {
        text: &'a str,
    },
    FileData {
        #[serde(rename = "fileData")]
        file_data: FileData<'a>,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FileData<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    mime_type: Option<&'a str>,
    file_uri: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig<'a> {
    temperature: f32,
    top_k: i32,
    top_p: f32,
    max_output_tokens: i32,
    response_mime_type: &'a str,
}

impl<'a> From<&'a GenerationParams> for GenerationConfig<'a> {
    fn from(params: &'a GenerationParams) -> Self {
        Self {
            temperature: params.temperature,
            top_k: params.top_k,
            top_p: params.top_p,
            max_output_tokens: params.max_output_tokens,
            response_mime_type: &params.response_mime_type,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<ResponseContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    prompt_token_count: Option<i32>,
    candidates_token_count: Option<i32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_api_key_is_not_configured() {
        let factory = GeminiClientFactory::new("gemini-1.5-flash-002").unwrap();
        assert!(matches!(
            factory.create_client(""),
            Err(ProviderError::NotConfigured(_))
        ));
    }

    #[test]
    fn generation_request_uses_gemini_field_names() {
        let params = GenerationParams::deterministic();
        let request = GenerateContentRequest {
            contents: vec![Content {
                role: "user",
                parts: vec![
                    RequestPart::FileData {
                        file_data: FileData {
                            mime_type: Some("image/png"),
                            file_uri: "https://files/abc",
                        },
                    },
                    RequestPart::Text { text: "read it" },
                ],
            }],
            generation_config: GenerationConfig::from(&params),
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "contents": [{
                    "role": "user",
                    "parts": [
                        { "fileData": { "mimeType": "image/png", "fileUri": "https://files/abc" } },
                        { "text": "read it" }
                    ]
                }],
                "generationConfig": {
                    "temperature": 0.0,
                    "topK": 40,
                    "topP": 0.95f32,
                    "maxOutputTokens": 8192,
                    "responseMimeType": "application/json"
                }
            })
        );
    }

    #[test]
    fn response_tolerates_non_text_parts() {
        let response: GenerateContentResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": { "parts": [ { "text": "{}" }, { "functionCall": { "name": "x" } } ] },
                "finishReason": "STOP"
            }]
        }))
        .unwrap();

        let content = response.candidates[0].content.as_ref().unwrap();
        assert_eq!(content.parts.len(), 2);
        assert!(content.parts[1].text.is_none());
    }
}
