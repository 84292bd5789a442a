//! Uniform response envelope
//!
//! Every response, success or failure, has the same top-level shape:
//!
//! ```json
//! {
//!   "data": { "items": [] },
//!   "meta": {
//!     "traceId": "trace_01h4...",
//!     "timestamp": "2024-05-01T12:00:00Z",
//!     "pagination": null
//!   },
//!   "errors": []
//! }
//! ```
//!
//! On success `data` is populated and `errors` is empty; on failure `data` is
//! `null` and `errors` holds the failure. List endpoints never put a bare array
//! in `data`: collections are wrapped in [`Items`].

use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::context::RequestContext;
use crate::failure::FunctionalError;
use crate::pagination::{PagedResult, PaginationMeta};

/// Metadata attached to every envelope
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ApiMeta {
    /// Trace identifier of the call
    pub trace_id: String,
    /// Instant the envelope was built
    pub timestamp: DateTime<Utc>,
    /// Normalized pagination, for list responses
    pub pagination: Option<PaginationMeta>,
}

impl ApiMeta {
    /// Metadata for the given call, stamped now
    pub fn new(ctx: &RequestContext, pagination: Option<PaginationMeta>) -> Self {
        Self {
            trace_id: ctx.trace_id().to_string(),
            timestamp: Utc::now(),
            pagination,
        }
    }
}

/// One entry of the `errors` array
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiError {
    /// Machine-readable error code
    pub code: String,
    /// Caller-facing message
    pub message: String,
    /// Structured details, `null` when absent
    pub details: Option<Value>,
}

/// Single-field container keeping list `data` an object
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Items<T> {
    /// The collection
    pub items: Vec<T>,
}

impl<T> From<Vec<T>> for Items<T> {
    fn from(items: Vec<T>) -> Self {
        Self { items }
    }
}

/// Top-level response body
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApiEnvelope<T> {
    /// Payload; `null` on failure
    pub data: Option<T>,
    /// Trace and pagination metadata
    pub meta: ApiMeta,
    /// Failures; empty on success
    pub errors: Vec<ApiError>,
}

impl<T> ApiEnvelope<T> {
    /// Build a success envelope
    ///
    /// # Example
    ///
    /// ```rust
    /// use api_pipeline::context::RequestContext;
    /// use api_pipeline::envelope::ApiEnvelope;
    /// use api_pipeline::ids::TraceId;
    ///
    /// let ctx = RequestContext::new(TraceId::new());
    /// let envelope = ApiEnvelope::success(&ctx, "hello", None);
    /// assert_eq!(envelope.data, Some("hello"));
    /// assert!(envelope.errors.is_empty());
    /// ```
    pub fn success(ctx: &RequestContext, data: T, pagination: Option<PaginationMeta>) -> Self {
        Self {
            data: Some(data),
            meta: ApiMeta::new(ctx, pagination),
            errors: Vec::new(),
        }
    }

    /// Build an error envelope with a single error entry
    pub fn error(
        ctx: &RequestContext,
        code: impl Into<String>,
        message: impl Into<String>,
        details: Option<Value>,
    ) -> Self {
        Self {
            data: None,
            meta: ApiMeta::new(ctx, None),
            errors: vec![ApiError {
                code: code.into(),
                message: message.into(),
                details,
            }],
        }
    }

    /// Build the error envelope for a functional failure
    pub fn from_functional(ctx: &RequestContext, error: FunctionalError) -> Self {
        let (code, _status, message, details) = error.into_parts();
        Self::error(ctx, code, message, details)
    }

    /// Whether this envelope represents a success
    pub fn is_success(&self) -> bool {
        self.data.is_some() && self.errors.is_empty()
    }
}

impl<T> ApiEnvelope<Items<T>> {
    /// Build a success envelope for a collection, nested under `items`
    ///
    /// # Example
    ///
    /// ```rust
    /// use api_pipeline::context::RequestContext;
    /// use api_pipeline::envelope::ApiEnvelope;
    /// use api_pipeline::ids::TraceId;
    ///
    /// let ctx = RequestContext::new(TraceId::new());
    /// let envelope = ApiEnvelope::items(&ctx, vec![1, 2, 3], None);
    /// let json = serde_json::to_value(&envelope).unwrap();
    /// assert_eq!(json["data"]["items"], serde_json::json!([1, 2, 3]));
    /// ```
    pub fn items(ctx: &RequestContext, items: Vec<T>, pagination: Option<PaginationMeta>) -> Self {
        Self::success(ctx, Items::from(items), pagination)
    }
}

/// Successful handler output: data, a 2xx status and optional pagination
#[derive(Debug, Clone, PartialEq)]
pub struct Reply<T> {
    status: StatusCode,
    data: T,
    pagination: Option<PaginationMeta>,
}

impl<T> Reply<T> {
    /// 200 OK
    pub fn ok(data: T) -> Self {
        Self::with_status(StatusCode::OK, data)
    }

    /// 201 Created
    pub fn created(data: T) -> Self {
        Self::with_status(StatusCode::CREATED, data)
    }

    /// 202 Accepted
    pub fn accepted(data: T) -> Self {
        Self::with_status(StatusCode::ACCEPTED, data)
    }

    /// Any success status
    ///
    /// Non-2xx statuses are replaced by 200; failures must go through
    /// [`FunctionalError`] so they get an error envelope.
    pub fn with_status(status: StatusCode, data: T) -> Self {
        let status = if status.is_success() {
            status
        } else {
            tracing::warn!(%status, "Non-success status on a reply, using 200");
            StatusCode::OK
        };
        Self {
            status,
            data,
            pagination: None,
        }
    }

    /// Attach pagination metadata
    #[must_use]
    pub fn with_pagination(mut self, pagination: PaginationMeta) -> Self {
        self.pagination = Some(pagination);
        self
    }

    /// Status the boundary answers with
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Pagination metadata, if any
    pub fn pagination(&self) -> Option<&PaginationMeta> {
        self.pagination.as_ref()
    }

    /// Build the success envelope for this reply
    pub fn into_envelope(self, ctx: &RequestContext) -> (StatusCode, ApiEnvelope<T>) {
        (self.status, ApiEnvelope::success(ctx, self.data, self.pagination))
    }
}

/// Conversion from a handler's response type into a [`Reply`]
pub trait IntoReply {
    /// Serialized payload type
    type Data: Serialize;

    /// Convert into a reply
    fn into_reply(self) -> Reply<Self::Data>;
}

impl<T: Serialize> IntoReply for Reply<T> {
    type Data = T;

    fn into_reply(self) -> Reply<T> {
        self
    }
}

impl<T: Serialize> IntoReply for Vec<T> {
    type Data = Items<T>;

    fn into_reply(self) -> Reply<Items<T>> {
        Reply::ok(Items::from(self))
    }
}

impl<T: Serialize> IntoReply for PagedResult<T> {
    type Data = Items<T>;

    fn into_reply(self) -> Reply<Items<T>> {
        Reply::ok(Items::from(self.items)).with_pagination(self.pagination)
    }
}
