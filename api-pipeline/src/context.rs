//! Per-call request context
//!
//! A [`RequestContext`] is created once per inbound call and passed by
//! reference through every pipeline stage. It is the only carrier of the
//! trace identifier; nothing in the crate reads it from ambient state.

use std::convert::Infallible;

use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use http::header::{HeaderName, ACCEPT_LANGUAGE};
use tokio_util::sync::CancellationToken;
use tower_http::request_id::RequestId;

use crate::boundary::Api;
use crate::ids::TraceId;

/// Header consulted when no request-id extension was set by middleware
pub const DEFAULT_TRACE_HEADER: &str = "x-request-id";

/// State threaded through one pipeline call
#[derive(Debug, Clone)]
pub struct RequestContext {
    trace_id: TraceId,
    locale: Option<String>,
    cancellation: CancellationToken,
}

impl RequestContext {
    /// Create a context with a fresh cancellation token
    pub fn new(trace_id: TraceId) -> Self {
        Self {
            trace_id,
            locale: None,
            cancellation: CancellationToken::new(),
        }
    }

    /// Set the caller's preferred locale
    #[must_use]
    pub fn with_locale(mut self, locale: impl Into<String>) -> Self {
        self.locale = Some(locale.into());
        self
    }

    /// Use an externally owned cancellation token
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Trace identifier of this call
    pub fn trace_id(&self) -> &TraceId {
        &self.trace_id
    }

    /// Preferred locale, if the caller stated one
    pub fn locale(&self) -> Option<&str> {
        self.locale.as_deref()
    }

    /// Cancellation token of this call
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Whether the call has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Build a context from request parts, reading [`DEFAULT_TRACE_HEADER`]
    pub fn from_parts(parts: &Parts) -> Self {
        Self::from_parts_with_header(parts, &HeaderName::from_static(DEFAULT_TRACE_HEADER))
    }

    /// Build a context from request parts
    ///
    /// The trace ID comes from the `RequestId` extension set by
    /// [`crate::middleware::request_id_layer`], then from `trace_header`,
    /// and is generated when neither is usable.
    pub fn from_parts_with_header(parts: &Parts, trace_header: &HeaderName) -> Self {
        let trace_id = parts
            .extensions
            .get::<RequestId>()
            .and_then(|id| TraceId::from_header(id.header_value()))
            .or_else(|| parts.headers.get(trace_header).and_then(TraceId::from_header))
            .unwrap_or_default();

        let mut context = Self::new(trace_id);
        if let Some(locale) = parts
            .headers
            .get(ACCEPT_LANGUAGE)
            .and_then(|value| value.to_str().ok())
            .and_then(preferred_language)
        {
            context = context.with_locale(locale);
        }
        context
    }
}

impl<S> FromRequestParts<S> for RequestContext
where
    Api: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let api = Api::from_ref(state);
        Ok(Self::from_parts_with_header(parts, api.trace_header()))
    }
}

/// First language tag of an `Accept-Language` value, ignoring `*`
///
/// Quality weights are not ranked; clients list their preference first.
fn preferred_language(header: &str) -> Option<String> {
    header
        .split(',')
        .filter_map(|entry| entry.split(';').next())
        .map(str::trim)
        .find(|tag| !tag.is_empty() && *tag != "*")
        .map(str::to_ascii_lowercase)
}
