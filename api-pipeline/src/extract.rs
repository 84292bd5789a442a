//! Extractors whose rejections use the envelope
//!
//! axum's `Json` and `Path` answer malformed input with a plain-text body.
//! [`ApiJson`] and [`ApiPath`] report the same input as a `BAD_REQUEST`
//! functional failure carrying the call's trace ID. Both need [`Api`] to be
//! reachable from the router state.

use axum::{
    extract::{FromRef, FromRequest, FromRequestParts, Path, Request},
    http::request::Parts,
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;

use crate::boundary::{functional_response, Api};
use crate::context::RequestContext;
use crate::failure::FunctionalError;

/// Rejection of [`ApiJson`] and [`ApiPath`]
#[derive(Debug)]
pub struct ApiRejection {
    ctx: RequestContext,
    error: FunctionalError,
}

impl ApiRejection {
    fn bad_request(ctx: RequestContext, message: String) -> Self {
        Self {
            ctx,
            error: FunctionalError::bad_request(message),
        }
    }

    /// The failure that will be rendered
    pub fn error(&self) -> &FunctionalError {
        &self.error
    }
}

impl IntoResponse for ApiRejection {
    fn into_response(self) -> Response {
        functional_response(&self.ctx, self.error)
    }
}

/// JSON request body
///
/// ```rust,ignore
/// async fn create_student(
///     State(api): State<Api>,
///     ctx: RequestContext,
///     ApiJson(request): ApiJson<CreateStudent>,
/// ) -> Response {
///     api.send(ctx, request).await
/// }
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    Api: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiRejection;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let (parts, body) = req.into_parts();
        let ctx = context(&parts, state);

        match Json::<T>::from_request(Request::from_parts(parts, body), state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(ApiRejection::bad_request(ctx, rejection.body_text())),
        }
    }
}

/// Path parameters
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiPath<T>(pub T);

impl<T, S> FromRequestParts<S> for ApiPath<T>
where
    T: DeserializeOwned + Send,
    Api: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Path::<T>::from_request_parts(parts, state).await {
            Ok(Path(value)) => Ok(Self(value)),
            Err(rejection) => Err(ApiRejection::bad_request(
                context(parts, state),
                rejection.body_text(),
            )),
        }
    }
}

fn context<S>(parts: &Parts, state: &S) -> RequestContext
where
    Api: FromRef<S>,
{
    let api = Api::from_ref(state);
    RequestContext::from_parts_with_header(parts, api.trace_header())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::MessageCatalog;
    use crate::pipeline::Dispatcher;
    use axum::{
        body::{to_bytes, Body},
        http::{header, StatusCode},
        routing::{get, post},
        Router,
    };
    use serde::Deserialize;
    use serde_json::Value;
    use tower::ServiceExt;

    #[derive(Deserialize)]
    struct Rename {
        name: String,
    }

    async fn rename(ApiJson(request): ApiJson<Rename>) -> String {
        request.name
    }

    async fn show(ApiPath(id): ApiPath<u32>) -> String {
        id.to_string()
    }

    fn app() -> Router {
        let api = Api::new(Dispatcher::builder().build(), MessageCatalog::default());
        Router::new()
            .route("/things", post(rename))
            .route("/things/{id}", get(show))
            .with_state(api)
    }

    async fn body_json(response: Response) -> Value {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(body: &'static str) -> axum::http::Request<Body> {
        axum::http::Request::builder()
            .method("POST")
            .uri("/things")
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-request-id", "trace-extract")
            .body(Body::from(body))
            .unwrap()
    }

    #[tokio::test]
    async fn test_json_passes_through() {
        let response = app().oneshot(post_json(r#"{"name":"Ada"}"#)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"Ada");
    }

    #[tokio::test]
    async fn test_malformed_json_is_enveloped() {
        let response = app().oneshot(post_json(r#"{"name":"#)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert_eq!(body["data"], Value::Null);
        assert_eq!(body["errors"][0]["code"], "BAD_REQUEST");
        assert_eq!(body["meta"]["traceId"], "trace-extract");
    }

    #[tokio::test]
    async fn test_missing_field_is_enveloped() {
        let response = app().oneshot(post_json(r#"{"title":"x"}"#)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = body_json(response).await;
        assert_eq!(body["errors"][0]["code"], "BAD_REQUEST");
    }

    #[tokio::test]
    async fn test_unparsable_path_is_enveloped() {
        let request = axum::http::Request::builder()
            .uri("/things/abc")
            .body(Body::empty())
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = body_json(response).await;
        assert_eq!(body["errors"][0]["code"], "BAD_REQUEST");
        assert!(body["meta"]["traceId"].as_str().unwrap().starts_with("trace_"));
    }

    #[tokio::test]
    async fn test_path_passes_through() {
        let request = axum::http::Request::builder()
            .uri("/things/42")
            .body(Body::empty())
            .unwrap();
        let response = app().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
