//! Application startup and lifecycle management.
//!
//! Builds the HTTP router and runs it until a termination signal arrives,
//! then drains in-flight requests within [`SHUTDOWN_TIMEOUT`].

use crate::config::PrescriptionConfig;
use crate::handlers;
use crate::handlers::drugs::MAX_FILE_BODY_BYTES;
use crate::services::providers::ModelClientFactory;
use axum::{
    extract::DefaultBodyLimit,
    http::StatusCode,
    middleware::from_fn,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use service_core::error::{AppError, GENERIC_ERROR_MESSAGE};
use service_core::middleware::{
    request_id_middleware, security_headers_middleware, REQUEST_ID_HEADER,
};
use std::any::Any;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

/// How long in-flight requests get to finish once shutdown starts.
pub const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared application state. Immutable after startup.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<PrescriptionConfig>,
    pub model_factory: Arc<dyn ModelClientFactory>,
}

/// How the server stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownOutcome {
    /// Every in-flight request finished before the deadline.
    Graceful,
    /// The deadline passed and the server task was aborted.
    Forced,
}

fn handle_panic(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s
    } else {
        "unknown panic"
    };

    tracing::error!(panic = %detail, "Request handler panicked");

    (StatusCode::INTERNAL_SERVER_ERROR, GENERIC_ERROR_MESSAGE).into_response()
}

pub fn build_router(state: AppState) -> Router {
    let api = Router::new().route(
        "/drugs",
        post(handlers::get_drugs).layer(DefaultBodyLimit::max(MAX_FILE_BODY_BYTES)),
    );

    Router::new()
        .route("/health", get(handlers::health_check))
        .nest("/api/v1", api)
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(from_fn(security_headers_middleware))
        .layer(
            TraceLayer::new_for_http().make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            }),
        )
        .layer(from_fn(request_id_middleware))
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
    shutdown_timeout: Duration,
}

impl Application {
    /// Build the application with the given configuration.
    ///
    /// Port 0 binds a random port, which tests rely on.
    pub async fn build(
        config: PrescriptionConfig,
        model_factory: Arc<dyn ModelClientFactory>,
    ) -> Result<Self, AppError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));

        let state = AppState {
            config: Arc::new(config),
            model_factory,
        };

        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        Ok(Self {
            port,
            listener,
            router: build_router(state),
            shutdown_timeout: SHUTDOWN_TIMEOUT,
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Run until SIGINT or SIGTERM.
    pub async fn run_until_stopped(self) -> std::io::Result<ShutdownOutcome> {
        self.run_with_shutdown(shutdown_signal()).await
    }

    /// Serve on a background task until `signal` resolves, then shut down.
    ///
    /// Shutdown races the drain of in-flight requests against the configured
    /// timeout; if the timeout wins the server task is aborted.
    pub async fn run_with_shutdown<F>(self, signal: F) -> std::io::Result<ShutdownOutcome>
    where
        F: Future<Output = ()> + Send,
    {
        let Application {
            port,
            listener,
            router,
            shutdown_timeout,
        } = self;

        let token = CancellationToken::new();
        let server_token = token.clone();

        let mut server = tokio::spawn(async move {
            tracing::info!("Starting server on port {}", port);
            axum::serve(listener, router)
                .with_graceful_shutdown(async move { server_token.cancelled().await })
                .await
        });

        tokio::select! {
            _ = signal => {}
            result = &mut server => {
                let result = result.map_err(std::io::Error::other)?;
                if let Err(e) = &result {
                    tracing::error!("HTTP server error: {}", e);
                }
                return result.map(|_| ShutdownOutcome::Graceful);
            }
        }

        tracing::info!("Shutting down server");
        token.cancel();

        match tokio::time::timeout(shutdown_timeout, &mut server).await {
            Ok(joined) => {
                joined.map_err(std::io::Error::other)??;
                tracing::info!("Server shutdown successfully");
                Ok(ShutdownOutcome::Graceful)
            }
            Err(_) => {
                server.abort();
                tracing::error!(
                    timeout_ms = shutdown_timeout.as_millis() as u64,
                    "Server shutdown failed, forcing shutdown"
                );
                Ok(ShutdownOutcome::Forced)
            }
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
