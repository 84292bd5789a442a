//! HTTP server with graceful shutdown

use std::any::Any;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{http::StatusCode, Router};
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::{
    catch_panic::CatchPanicLayer,
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};

use crate::{
    boundary::panic_response,
    config::Config,
    error::Result,
    messages::MessageCatalog,
    middleware::{
        parse_header_name, request_id_layer, request_id_propagation_layer,
        sensitive_headers_layer,
    },
};

/// Server instance
pub struct Server {
    config: Config,
    messages: Arc<MessageCatalog>,
}

impl Server {
    /// Create a new server instance
    pub fn new(config: Config) -> Self {
        let messages = Arc::new(MessageCatalog::from_config(&config.messages));
        Self { config, messages }
    }

    /// Wrap `app` in the configured middleware stack
    ///
    /// The last layer added is the outermost, so the trace ID is assigned
    /// before anything else sees the request.
    ///
    /// # Errors
    ///
    /// Fails if `middleware.request_id_header` is not a valid header name.
    pub fn router(&self, app: Router) -> Result<Router> {
        let header = parse_header_name(&self.config.middleware.request_id_header)?;

        let app = if self.config.middleware.catch_panic {
            let messages = Arc::clone(&self.messages);
            app.layer(CatchPanicLayer::custom(
                move |panic: Box<dyn Any + Send + 'static>| panic_response(&messages, panic),
            ))
        } else {
            app
        };

        Ok(app
            .layer(TimeoutLayer::with_status_code(
                StatusCode::REQUEST_TIMEOUT,
                self.config.service.timeout(),
            ))
            .layer(RequestBodyLimitLayer::new(self.config.body_limit_bytes()))
            .layer(
                TraceLayer::new_for_http()
                    .make_span_with(DefaultMakeSpan::new().include_headers(true))
                    .on_response(DefaultOnResponse::new().include_headers(true)),
            )
            .layer(sensitive_headers_layer())
            .layer(request_id_propagation_layer(header.clone()))
            .layer(request_id_layer(header)))
    }

    /// Run the server with the given router
    pub async fn serve(self, app: Router) -> Result<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.service.port));

        tracing::info!("Starting {} on {}", self.config.service.name, addr);
        self.log_middleware_config();

        let app = self.router(app)?;
        let listener = TcpListener::bind(&addr).await?;

        tracing::info!("Server listening on {}", addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Server shutdown complete");

        Ok(())
    }

    fn log_middleware_config(&self) {
        let middleware = &self.config.middleware;
        tracing::info!("Middleware configuration:");
        tracing::info!("  - Panic recovery: {}", middleware.catch_panic);
        tracing::info!("  - Request ID header: {}", middleware.request_id_header);
        tracing::info!("  - Request body limit: {} MB", middleware.body_limit_mb);
        tracing::info!(
            "  - Request timeout: {} seconds",
            self.config.service.timeout_secs
        );
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl+C), starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }

    tracing::info!("Shutdown signal received, draining requests...");
}
