use prescription_service::config::PrescriptionConfig;
use prescription_service::services::providers::gemini::GeminiClientFactory;
use prescription_service::services::providers::ModelClientFactory;
use prescription_service::startup::{Application, ShutdownOutcome};
use service_core::observability::init_tracing;
use std::sync::Arc;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let config = PrescriptionConfig::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        std::io::Error::other(format!("Configuration error: {}", e))
    })?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.common.environment,
    );

    let model_factory: Arc<dyn ModelClientFactory> = Arc::new(
        GeminiClientFactory::new(config.gemini.model.clone()).map_err(|e| {
            tracing::error!("Failed to initialize Gemini client factory: {}", e);
            std::io::Error::other(e.to_string())
        })?,
    );

    tracing::info!(
        model = %config.gemini.model,
        environment = %config.common.environment,
        "Initialized Gemini client factory"
    );

    let app = Application::build(config, model_factory)
        .await
        .map_err(|e| std::io::Error::other(e.to_string()))?;

    match app.run_until_stopped().await? {
        ShutdownOutcome::Graceful => Ok(()),
        ShutdownOutcome::Forced => Err(std::io::Error::other(
            "in-flight requests did not finish before the shutdown deadline",
        )),
    }
}
