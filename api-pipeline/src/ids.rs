//! Per-request trace identifiers
//!
//! Every call carries exactly one [`TraceId`]. When the caller (or an upstream
//! proxy) supplies one in the request-id header it is used verbatim;
//! otherwise a new one is generated in the TypeID format with a `trace`
//! prefix and a UUIDv7 suffix, so generated ids sort by creation time:
//!
//! ```rust
//! use api_pipeline::ids::TraceId;
//!
//! let id = TraceId::new();
//! assert!(id.as_str().starts_with("trace_"));
//! ```

use std::fmt;

use http::{HeaderValue, Request};
use mti::prelude::*;
use tower_http::request_id::{MakeRequestId, RequestId};

/// Upper bound on accepted inbound identifiers
const MAX_INBOUND_LEN: usize = 128;

/// Identifier correlating one call across logs and the response envelope
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TraceId(String);

impl TraceId {
    /// The prefix used for generated trace IDs
    pub const PREFIX: &'static str = "trace";

    /// Generate a new time-sortable trace ID
    #[must_use]
    pub fn new() -> Self {
        Self(Self::PREFIX.create_type_id::<V7>().to_string())
    }

    /// Accept an identifier supplied by the transport
    ///
    /// Returns `None` for empty, oversized or non-visible-ASCII values so
    /// the caller can fall back to [`TraceId::new`].
    ///
    /// # Example
    ///
    /// ```rust
    /// use api_pipeline::ids::TraceId;
    ///
    /// assert!(TraceId::from_inbound("abc-123").is_some());
    /// assert!(TraceId::from_inbound("   ").is_none());
    /// ```
    pub fn from_inbound(value: &str) -> Option<Self> {
        let value = value.trim();
        let acceptable = !value.is_empty()
            && value.len() <= MAX_INBOUND_LEN
            && value.bytes().all(|b| b.is_ascii_graphic());
        acceptable.then(|| Self(value.to_string()))
    }

    /// Read a trace ID from a header value
    pub fn from_header(value: &HeaderValue) -> Option<Self> {
        value.to_str().ok().and_then(Self::from_inbound)
    }

    /// Returns the trace ID as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TraceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TraceId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl From<TraceId> for String {
    fn from(id: TraceId) -> Self {
        id.0
    }
}

/// A `MakeRequestId` implementation that generates [`TraceId`]s for tower-http
///
/// Used by [`crate::middleware::request_id_layer`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeTraceId;

impl MakeRequestId for MakeTraceId {
    fn make_request_id<B>(&mut self, _request: &Request<B>) -> Option<RequestId> {
        let id = TraceId::new();
        let header_value = HeaderValue::from_str(id.as_str()).ok()?;
        Some(RequestId::new(header_value))
    }
}
