//! # api-pipeline
//!
//! Request pipeline for axum services. Every call is dispatched to a single
//! handler through a fixed chain of stages, and every response leaves the
//! service in the same JSON envelope.
//!
//! ## Features
//!
//! - **Dispatch pipeline**: one handler per request type, tracing and validation stages
//! - **Validation**: per-type validators run concurrently, failures merged per field
//! - **Uniform envelopes**: `data` / `meta` / `errors` for successes and failures alike
//! - **Pagination**: clamped page numbers and sizes, one count and one fetch per page
//! - **Failure boundary**: functional errors surface verbatim, everything else becomes a
//!   localized 500 with no internal detail
//! - **Enveloped rejections**: malformed bodies and path parameters answer with the
//!   same envelope as any other failure
//! - **Request tracking**: TypeID trace identifiers, propagated on the response
//! - **Graceful shutdown**: Proper signal handling (SIGTERM, SIGINT)
//!
//! ## Example
//!
//! ```rust,no_run
//! use api_pipeline::prelude::*;
//!
//! struct GetStudent {
//!     id: u32,
//! }
//!
//! impl Request for GetStudent {
//!     type Response = Reply<serde_json::Value>;
//! }
//!
//! async fn get_student(
//!     State(api): State<Api>,
//!     ctx: RequestContext,
//!     ApiPath(id): ApiPath<u32>,
//! ) -> Response {
//!     api.send(ctx, GetStudent { id }).await
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     // Load configuration
//!     let config = Config::load()?;
//!
//!     // Initialize tracing
//!     init_tracing(&config)?;
//!
//!     // Register handlers and validators
//!     let dispatcher = Dispatcher::builder()
//!         .handler::<GetStudent, _>(handler_fn(
//!             |request: GetStudent, _ctx: RequestContext| async move {
//!                 Ok::<_, PipelineError>(Reply::ok(serde_json::json!({ "id": request.id })))
//!             },
//!         ))?
//!         .build();
//!
//!     // Create router
//!     let app = Router::new()
//!         .route("/students/{id}", get(get_student))
//!         .with_state(Api::from_config(dispatcher, &config)?);
//!
//!     // Run server
//!     Server::new(config).serve(app).await
//! }
//! ```

pub mod boundary;
pub mod config;
pub mod context;
pub mod envelope;
pub mod error;
pub mod extract;
pub mod failure;
pub mod ids;
pub mod messages;
pub mod middleware;
pub mod observability;
pub mod pagination;
pub mod pipeline;
pub mod server;
pub mod validation;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::boundary::Api;
    pub use crate::config::Config;
    pub use crate::context::RequestContext;
    pub use crate::envelope::{ApiEnvelope, ApiError, ApiMeta, IntoReply, Items, Reply};
    pub use crate::error::{Error, Result};
    pub use crate::extract::{ApiJson, ApiPath, ApiRejection};
    pub use crate::failure::{ErrorKind, FunctionalError, PipelineError};
    pub use crate::ids::TraceId;
    pub use crate::messages::MessageCatalog;
    pub use crate::observability::{init_tracing, shutdown_tracing};
    pub use crate::pagination::{
        paginate, PageQuery, PageSource, PagedResult, PaginationMeta, VecSource,
    };
    pub use crate::pipeline::{
        handler_fn, Behavior, Dispatcher, Handler, Next, PipelineResult, Request,
    };
    pub use crate::server::Server;
    pub use crate::validation::{validator_fn, FieldErrors, FieldFailure, Validator};

    // Re-exported axum types
    pub use axum::{
        extract::{Path, Query, State},
        http::StatusCode,
        response::{IntoResponse, Json, Response},
        routing::{delete, get, patch, post, put},
        Router,
    };

    pub use serde::{Deserialize, Serialize};

    // Re-export tracing macros
    pub use tracing::{debug, error, info, trace, warn};

    // Re-export async-trait for handler and validator impls
    pub use async_trait::async_trait;

    // Re-export error handling utilities
    pub use anyhow::{self, Context as AnyhowContext};
}
