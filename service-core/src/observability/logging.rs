use crate::config::Environment;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `log_level`. Development gets a readable
/// console format; staging and production emit flattened JSON lines.
pub fn init_tracing(service_name: &str, log_level: &str, environment: Environment) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    match environment {
        Environment::Dev => registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .init(),
        Environment::Stg | Environment::Prd => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_file(true)
                    .with_line_number(true)
                    .json()
                    .flatten_event(true),
            )
            .init(),
    }

    tracing::debug!(
        service = %service_name,
        environment = %environment,
        "Tracing initialized"
    );
}
