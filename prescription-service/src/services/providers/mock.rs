//! Mock provider implementations for testing.

use super::{
    AssetReference, FileSource, FinishReason, GenerationParams, ModelClientFactory,
    ModelResponse, PrescriptionModel, ProviderError,
};
use async_trait::async_trait;
use axum::body::Bytes;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

/// Deterministic stand-in for the generative model.
#[derive(Default)]
pub struct MockModel {
    response_text: Option<String>,
    fail_upload: bool,
    fail_generate: bool,
    panic_on_generate: bool,
    truncated: bool,
    latency: Duration,
    uploads: Mutex<Vec<String>>,
    deleted: Mutex<Vec<String>>,
    sources: Mutex<Vec<FileSource>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockModel {
    /// A model whose only candidate contains `text`.
    pub fn responding(text: impl Into<String>) -> Self {
        Self {
            response_text: Some(text.into()),
            ..Self::default()
        }
    }

    /// A model that answers with no candidates at all.
    pub fn without_candidates() -> Self {
        Self::default()
    }

    pub fn failing_upload(mut self) -> Self {
        self.fail_upload = true;
        self
    }

    pub fn failing_generation(mut self) -> Self {
        self.fail_generate = true;
        self
    }

    /// Panic inside `generate`, after the source has been recorded.
    pub fn panicking_generation(mut self) -> Self {
        self.panic_on_generate = true;
        self
    }

    /// Report that generation stopped at the token limit.
    pub fn truncated(mut self) -> Self {
        self.truncated = true;
        self
    }

    /// Delay every generation call by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Display names of every upload, in order.
    pub fn uploaded_names(&self) -> Vec<String> {
        lock(&self.uploads).clone()
    }

    /// Resource names of every deleted asset, in order.
    pub fn deleted_assets(&self) -> Vec<String> {
        lock(&self.deleted).clone()
    }

    /// Sources passed to `generate`, in order.
    pub fn generated_sources(&self) -> Vec<FileSource> {
        lock(&self.sources).clone()
    }
}

#[async_trait]
impl PrescriptionModel for MockModel {
    async fn upload_file(
        &self,
        name: &str,
        mime_type: &str,
        bytes: Bytes,
    ) -> Result<AssetReference, ProviderError> {
        if self.fail_upload {
            return Err(ProviderError::ApiError("mock upload failure".to_string()));
        }

        let mut uploads = lock(&self.uploads);
        uploads.push(name.to_string());

        let id = format!("files/mock-{}", uploads.len());
        Ok(AssetReference {
            uri: format!("https://mock.invalid/{}?size={}", id, bytes.len()),
            name: id,
            mime_type: mime_type.to_string(),
        })
    }

    async fn delete_file(&self, asset: &AssetReference) -> Result<(), ProviderError> {
        lock(&self.deleted).push(asset.name.clone());
        Ok(())
    }

    async fn generate(
        &self,
        source: &FileSource,
        _prompt: &str,
        _params: &GenerationParams,
    ) -> Result<ModelResponse, ProviderError> {
        lock(&self.sources).push(source.clone());

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        if self.panic_on_generate {
            panic!("mock generation panicked");
        }

        if self.fail_generate {
            return Err(ProviderError::NetworkError(
                "mock generation failure".to_string(),
            ));
        }

        Ok(ModelResponse {
            parts: self.response_text.iter().cloned().collect(),
            input_tokens: 0,
            output_tokens: 0,
            finish_reason: if self.truncated {
                FinishReason::Length
            } else {
                FinishReason::Complete
            },
        })
    }
}

/// Hands out one shared [`MockModel`] so tests can inspect it afterwards.
pub struct MockModelFactory {
    model: Arc<MockModel>,
    reject_clients: bool,
}

impl MockModelFactory {
    pub fn new(model: Arc<MockModel>) -> Self {
        Self {
            model,
            reject_clients: false,
        }
    }

    /// A factory whose client construction always fails.
    pub fn rejecting() -> Self {
        Self {
            model: Arc::new(MockModel::default()),
            reject_clients: true,
        }
    }
}

impl ModelClientFactory for MockModelFactory {
    fn create_client(&self, api_key: &str) -> Result<Arc<dyn PrescriptionModel>, ProviderError> {
        if self.reject_clients || api_key.is_empty() {
            return Err(ProviderError::NotConfigured(
                "Mock client rejected".to_string(),
            ));
        }

        Ok(self.model.clone())
    }
}
