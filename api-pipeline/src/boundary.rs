//! Failure boundary
//!
//! The boundary wraps one whole pipeline call and turns its outcome into
//! exactly one HTTP response carrying an [`ApiEnvelope`]:
//!
//! - success: the reply's 2xx status and a success envelope
//! - functional failure: the error's own status, code, message and details
//! - anything else (unexpected error, cancellation, panic, unserializable
//!   data): 500 with [`INTERNAL_ERROR_CODE`] and a localized generic message
//!
//! Unexpected failures are logged at error level with their full chain; their
//! text never reaches the caller.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use axum::{
    http::{header, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use futures::FutureExt;
use serde::Serialize;
use serde_json::Value;

use crate::config::Config;
use crate::context::{RequestContext, DEFAULT_TRACE_HEADER};
use crate::envelope::{ApiEnvelope, IntoReply};
use crate::failure::{FunctionalError, PipelineError, INTERNAL_ERROR_CODE};
use crate::ids::TraceId;
use crate::messages::MessageCatalog;
use crate::middleware::parse_header_name;
use crate::pipeline::{Dispatcher, PipelineResult, Request};

/// Shared entry point for route handlers
///
/// Cheap to clone; use it as axum router state.
///
/// # Example
///
/// ```rust,ignore
/// async fn get_student(
///     State(api): State<Api>,
///     ctx: RequestContext,
///     ApiPath(id): ApiPath<u32>,
/// ) -> Response {
///     api.send(ctx, GetStudent { id }).await
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Api {
    dispatcher: Arc<Dispatcher>,
    messages: Arc<MessageCatalog>,
    trace_header: HeaderName,
}

impl Api {
    /// Create the facade, reading trace IDs from [`DEFAULT_TRACE_HEADER`]
    pub fn new(dispatcher: Dispatcher, messages: MessageCatalog) -> Self {
        Self {
            dispatcher: Arc::new(dispatcher),
            messages: Arc::new(messages),
            trace_header: HeaderName::from_static(DEFAULT_TRACE_HEADER),
        }
    }

    /// Create the facade with messages and trace header from configuration
    ///
    /// # Errors
    ///
    /// Fails if `middleware.request_id_header` is not a valid header name.
    pub fn from_config(dispatcher: Dispatcher, config: &Config) -> crate::error::Result<Self> {
        let header = parse_header_name(&config.middleware.request_id_header)?;
        Ok(Self::new(dispatcher, MessageCatalog::from_config(&config.messages))
            .with_trace_header(header))
    }

    /// Read inbound trace IDs from `header`
    #[must_use]
    pub fn with_trace_header(mut self, header: HeaderName) -> Self {
        self.trace_header = header;
        self
    }

    /// Header that carries inbound trace IDs
    pub fn trace_header(&self) -> &HeaderName {
        &self.trace_header
    }

    /// The dispatcher
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// The message catalog
    pub fn messages(&self) -> &MessageCatalog {
        &self.messages
    }

    /// Dispatch a request inside the boundary
    pub async fn send<R: Request>(&self, ctx: RequestContext, request: R) -> Response {
        guard(&ctx, &self.messages, self.dispatcher.dispatch(request, &ctx)).await
    }

    /// Answer with a functional failure without dispatching
    ///
    /// For route handlers that reject input before a request can be built.
    pub fn fail(&self, ctx: &RequestContext, error: FunctionalError) -> Response {
        functional_response(ctx, error)
    }
}

/// Run `call` and translate its outcome into one enveloped response
///
/// The context's cancellation token is fired when this returns or is
/// dropped, so work spawned by the call can stop.
pub async fn guard<F, T>(ctx: &RequestContext, messages: &MessageCatalog, call: F) -> Response
where
    F: Future<Output = PipelineResult<T>>,
    T: IntoReply,
{
    let _cancel_on_exit = ctx.cancellation().clone().drop_guard();

    match AssertUnwindSafe(call).catch_unwind().await {
        Ok(Ok(output)) => {
            let (status, envelope) = output.into_reply().into_envelope(ctx);
            envelope_response(ctx, messages, status, &envelope)
        }
        Ok(Err(PipelineError::Functional(error))) => functional_response(ctx, error),
        Ok(Err(error)) => {
            tracing::error!(
                trace_id = %ctx.trace_id(),
                error = ?error,
                "Unexpected failure while handling request"
            );
            internal_error_response(ctx, messages)
        }
        Err(panic) => {
            tracing::error!(
                trace_id = %ctx.trace_id(),
                panic = panic_message(panic.as_ref()),
                "Panic while handling request"
            );
            internal_error_response(ctx, messages)
        }
    }
}

/// Error envelope for a functional failure, with the error's own status
pub fn functional_response(ctx: &RequestContext, error: FunctionalError) -> Response {
    tracing::debug!(
        trace_id = %ctx.trace_id(),
        code = error.code(),
        status = error.status().as_u16(),
        "Functional failure"
    );
    let status = error.status();
    let envelope = ApiEnvelope::<Value>::from_functional(ctx, error);
    (status, Json(envelope)).into_response()
}

/// 500 envelope with the generic message in the caller's locale
pub fn internal_error_response(ctx: &RequestContext, messages: &MessageCatalog) -> Response {
    let envelope = ApiEnvelope::<Value>::error(
        ctx,
        INTERNAL_ERROR_CODE,
        messages.generic_failure(ctx.locale()),
        None,
    );
    (StatusCode::INTERNAL_SERVER_ERROR, Json(envelope)).into_response()
}

/// 500 envelope for a panic caught outside the pipeline
///
/// Used by the server's catch-panic layer, which has no request context; a
/// fresh trace ID is generated.
pub fn panic_response(messages: &MessageCatalog, panic: Box<dyn Any + Send + 'static>) -> Response {
    let ctx = RequestContext::new(TraceId::new());
    tracing::error!(
        trace_id = %ctx.trace_id(),
        panic = panic_message(panic.as_ref()),
        "Panic outside the request pipeline"
    );
    internal_error_response(&ctx, messages)
}

fn envelope_response<T: Serialize>(
    ctx: &RequestContext,
    messages: &MessageCatalog,
    status: StatusCode,
    envelope: &ApiEnvelope<T>,
) -> Response {
    match serde_json::to_vec(envelope) {
        Ok(body) => (
            status,
            [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
            body,
        )
            .into_response(),
        Err(err) => {
            tracing::error!(
                trace_id = %ctx.trace_id(),
                error = %err,
                "Failed to serialize response data"
            );
            internal_error_response(ctx, messages)
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&'static str>() {
        *message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::Reply;
    use crate::failure::VALIDATION_FAILED_CODE;
    use crate::pipeline::handler_fn;
    use crate::validation::{validator_fn, FieldFailure};
    use axum::{body::to_bytes, extract::State, routing::get, Router};
    use serde::ser::Error as _;
    use serde_json::json;
    use std::sync::Mutex;
    use tower::ServiceExt;
    use tracing::{subscriber::DefaultGuard, Level};
    use tracing_subscriber::layer::{self, Layer, SubscriberExt};

    /// Records the level of every event
    #[derive(Clone, Default)]
    struct LevelRecorder(Arc<Mutex<Vec<Level>>>);

    impl LevelRecorder {
        fn count(&self, level: Level) -> usize {
            self.0.lock().unwrap().iter().filter(|seen| **seen == level).count()
        }
    }

    impl<S: tracing::Subscriber> Layer<S> for LevelRecorder {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: layer::Context<'_, S>) {
            self.0.lock().unwrap().push(*event.metadata().level());
        }
    }

    fn record_levels() -> (LevelRecorder, DefaultGuard) {
        let recorder = LevelRecorder::default();
        let subscriber = tracing_subscriber::registry().with(recorder.clone());
        (recorder, tracing::subscriber::set_default(subscriber))
    }

    struct Lookup {
        id: u32,
    }

    impl Request for Lookup {
        type Response = Reply<Value>;
    }

    struct Broken;

    impl Serialize for Broken {
        fn serialize<S: serde::Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
            Err(S::Error::custom("cannot serialize secret-field"))
        }
    }

    fn ctx() -> RequestContext {
        RequestContext::new(TraceId::from_inbound("trace-boundary").unwrap())
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn api() -> Api {
        let dispatcher = Dispatcher::builder()
            .handler::<Lookup, _>(handler_fn(|request: Lookup, _ctx: RequestContext| async move {
                match request.id {
                    0 => Err(FunctionalError::not_found("X").into()),
                    1 => Err(PipelineError::Unexpected(anyhow::anyhow!(
                        "connection refused: postgres://admin:hunter2@db"
                    ))),
                    2 => panic!("index out of bounds in secret-module"),
                    id => Ok(Reply::created(json!({ "id": id }))),
                }
            }))
            .unwrap()
            .validator::<Lookup, _>(validator_fn(|request: &Lookup| {
                if request.id > 1000 {
                    vec![FieldFailure::new("id", "out of range")]
                } else {
                    Vec::new()
                }
            }))
            .build();
        Api::new(dispatcher, MessageCatalog::default())
    }

    #[tokio::test]
    async fn test_success_envelope() {
        let response = api().send(ctx(), Lookup { id: 7 }).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );

        let body = body_json(response).await;
        assert_eq!(body["data"], json!({ "id": 7 }));
        assert_eq!(body["errors"], json!([]));
        assert_eq!(body["meta"]["traceId"], "trace-boundary");
    }

    #[tokio::test]
    async fn test_not_found_envelope() {
        let response = api().send(ctx(), Lookup { id: 0 }).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = body_json(response).await;
        assert_eq!(body["data"], Value::Null);
        assert_eq!(
            body["errors"],
            json!([{ "code": "NOT_FOUND", "message": "X", "details": null }])
        );
    }

    #[tokio::test]
    async fn test_validation_envelope() {
        let response = api().send(ctx(), Lookup { id: 5000 }).await;
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body = body_json(response).await;
        assert_eq!(body["errors"][0]["code"], VALIDATION_FAILED_CODE);
        assert_eq!(body["errors"][0]["details"], json!({ "id": ["out of range"] }));
    }

    #[tokio::test]
    async fn test_unexpected_failure_hides_detail() {
        let response = api().send(ctx(), Lookup { id: 1 }).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(!text.contains("hunter2"));
        assert!(!text.contains("connection refused"));

        let body: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(body["data"], Value::Null);
        assert_eq!(body["errors"][0]["code"], INTERNAL_ERROR_CODE);
        assert_eq!(
            body["errors"][0]["message"],
            MessageCatalog::default().generic_failure(None)
        );
        assert_eq!(body["errors"][0]["details"], Value::Null);
    }

    #[tokio::test]
    async fn test_panic_becomes_internal_error() {
        let response = api().send(ctx(), Lookup { id: 2 }).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(!text.contains("secret-module"));
        assert!(text.contains(INTERNAL_ERROR_CODE));
    }

    #[tokio::test]
    async fn test_generic_message_is_localized() {
        let ctx = ctx().with_locale("es");
        let response = api().send(ctx, Lookup { id: 1 }).await;

        let body = body_json(response).await;
        assert_eq!(
            body["errors"][0]["message"],
            MessageCatalog::default().generic_failure(Some("es"))
        );
    }

    #[tokio::test]
    async fn test_unserializable_data_yields_valid_envelope() {
        let messages = MessageCatalog::default();
        let call = async { Ok::<_, PipelineError>(Reply::ok(Broken)) };
        let response = guard(&ctx(), &messages, call).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(!text.contains("secret-field"));

        let body: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(body["errors"][0]["code"], INTERNAL_ERROR_CODE);
    }

    #[tokio::test]
    async fn test_cancelled_call_is_internal_error() {
        let ctx = ctx();
        ctx.cancellation().cancel();

        let response = api().send(ctx, Lookup { id: 7 }).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert_eq!(body["errors"][0]["code"], INTERNAL_ERROR_CODE);
    }

    #[tokio::test]
    async fn test_token_fired_when_call_completes() {
        let ctx = ctx();
        let observer = ctx.clone();

        let response = api().send(ctx, Lookup { id: 7 }).await;
        assert_eq!(response.status(), StatusCode::CREATED);
        assert!(observer.is_cancelled());
    }

    #[tokio::test]
    async fn test_fail_without_dispatch() {
        let response = api().fail(&ctx(), FunctionalError::bad_request("malformed body"));
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["errors"][0]["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn test_panic_response_shape() {
        let response = panic_response(&MessageCatalog::default(), Box::new("boom"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = body_json(response).await;
        assert!(body["meta"]["traceId"].as_str().unwrap().starts_with("trace_"));
        assert_eq!(body["errors"][0]["code"], INTERNAL_ERROR_CODE);
    }

    #[tokio::test]
    async fn test_functional_failure_logs_no_error() {
        let (recorder, _subscriber) = record_levels();

        let response = api().send(ctx(), Lookup { id: 0 }).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(recorder.count(Level::ERROR), 0);
        assert!(recorder.count(Level::DEBUG) > 0);
    }

    #[tokio::test]
    async fn test_unexpected_failure_logs_one_error() {
        let (recorder, _subscriber) = record_levels();

        let response = api().send(ctx(), Lookup { id: 1 }).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(recorder.count(Level::ERROR), 1);
    }

    #[tokio::test]
    async fn test_panic_logs_one_error() {
        let (recorder, _subscriber) = record_levels();

        let response = api().send(ctx(), Lookup { id: 2 }).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(recorder.count(Level::ERROR), 1);
    }

    #[tokio::test]
    async fn test_extractor_reads_configured_trace_header() {
        let mut config = Config::default();
        config.middleware.request_id_header = "x-correlation-id".to_string();
        let configured = Api::from_config(Dispatcher::builder().build(), &config).unwrap();
        let header = configured.trace_header().clone();
        assert_eq!(header.as_str(), "x-correlation-id");

        let app = Router::new()
            .route(
                "/lookup/{id}",
                get(|State(api): State<Api>, ctx: RequestContext| async move {
                    api.send(ctx, Lookup { id: 0 }).await
                }),
            )
            .with_state(api().with_trace_header(header));
        let request = axum::http::Request::builder()
            .uri("/lookup/0")
            .header("x-correlation-id", "corr-9")
            .header("x-request-id", "ignored")
            .body(axum::body::Body::empty())
            .unwrap();

        let body = body_json(app.oneshot(request).await.unwrap()).await;
        assert_eq!(body["meta"]["traceId"], "corr-9");
    }

    #[test]
    fn test_from_config_rejects_invalid_header() {
        let mut config = Config::default();
        config.middleware.request_id_header = "not valid".to_string();
        assert!(Api::from_config(Dispatcher::builder().build(), &config).is_err());
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(payload.as_ref()), "owned");
        let payload: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(payload.as_ref()), "non-string panic payload");
    }
}
