//! Generative model abstractions and implementations.
//!
//! The handler only talks to [`PrescriptionModel`], so the Gemini backend can
//! be swapped for the deterministic mock in tests.

pub mod gemini;
pub mod mock;

use async_trait::async_trait;
use axum::body::Bytes;
use std::sync::Arc;
use thiserror::Error;

/// Error type for provider operations.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("Content filtered")]
    ContentFiltered,

    #[error("Network error: {0}")]
    NetworkError(String),
}

/// Handle returned by the model service after an upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetReference {
    /// Resource name used for deletion, e.g. `files/abc123`.
    pub name: String,
    /// URI referenced from generation requests.
    pub uri: String,
    pub mime_type: String,
}

/// What the model should read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileSource {
    /// A file previously uploaded with [`PrescriptionModel::upload_file`].
    Asset(AssetReference),
    /// A caller-supplied remote URL.
    Url(String),
}

impl FileSource {
    pub fn uri(&self) -> &str {
        match self {
            FileSource::Asset(asset) => &asset.uri,
            FileSource::Url(url) => url,
        }
    }

    pub fn mime_type(&self) -> Option<&str> {
        match self {
            FileSource::Asset(asset) => Some(&asset.mime_type),
            FileSource::Url(_) => None,
        }
    }
}

/// Reason why generation stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    Complete,
    Length,
    ContentFilter,
}

/// Text output of the first candidate.
#[derive(Debug, Clone)]
pub struct ModelResponse {
    /// Textual parts in the order the model produced them.
    pub parts: Vec<String>,
    pub input_tokens: i32,
    pub output_tokens: i32,
    pub finish_reason: FinishReason,
}

impl ModelResponse {
    /// All text parts joined into one string. Empty when there was no candidate.
    pub fn text(&self) -> String {
        self.parts.concat()
    }
}

/// Decoding parameters sent with every generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub temperature: f32,
    pub top_k: i32,
    pub top_p: f32,
    pub max_output_tokens: i32,
    pub response_mime_type: String,
}

impl GenerationParams {
    /// Fixed configuration for extraction: greedy decoding and JSON output.
    pub fn deterministic() -> Self {
        Self {
            temperature: 0.0,
            top_k: 40,
            top_p: 0.95,
            max_output_tokens: 8192,
            response_mime_type: "application/json".to_string(),
        }
    }
}

/// Client for a multimodal generative model.
#[async_trait]
pub trait PrescriptionModel: Send + Sync {
    /// Upload `bytes` under the display name `name`.
    async fn upload_file(
        &self,
        name: &str,
        mime_type: &str,
        bytes: Bytes,
    ) -> Result<AssetReference, ProviderError>;

    /// Remove a previously uploaded file.
    async fn delete_file(&self, asset: &AssetReference) -> Result<(), ProviderError>;

    /// Run one generation over `source` with `prompt`.
    async fn generate(
        &self,
        source: &FileSource,
        prompt: &str,
        params: &GenerationParams,
    ) -> Result<ModelResponse, ProviderError>;
}

/// Creates model clients from an API key.
pub trait ModelClientFactory: Send + Sync {
    fn create_client(&self, api_key: &str) -> Result<Arc<dyn PrescriptionModel>, ProviderError>;
}
