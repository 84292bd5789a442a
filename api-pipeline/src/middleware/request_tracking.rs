//! Request tracking middleware
//!
//! Sets a trace identifier on every request that lacks one, echoes it on the
//! response and masks credentials in logged headers.

use http::header::{HeaderName, AUTHORIZATION, COOKIE, SET_COOKIE};
use tower_http::{
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    sensitive_headers::SetSensitiveRequestHeadersLayer,
};

use crate::error::{Error, Result};
use crate::ids::MakeTraceId;

/// Sensitive headers that should be masked in logs
pub const SENSITIVE_HEADERS: [HeaderName; 5] = [
    AUTHORIZATION,
    COOKIE,
    SET_COOKIE,
    HeaderName::from_static("x-api-key"),
    HeaderName::from_static("x-auth-token"),
];

/// Parse a configured header name
///
/// # Errors
///
/// Returns [`Error::Internal`] if `name` is not a valid header name.
pub fn parse_header_name(name: &str) -> Result<HeaderName> {
    HeaderName::try_from(name.trim())
        .map_err(|e| Error::Internal(format!("Invalid request ID header '{name}': {e}")))
}

/// Create a layer that assigns a trace ID to requests without one
///
/// Generated IDs use the TypeID format with a "trace" prefix and UUIDv7.
/// Example format: `trace_01h455vb4pex5vsknk084sn02q`
pub fn request_id_layer(header: HeaderName) -> SetRequestIdLayer<MakeTraceId> {
    SetRequestIdLayer::new(header, MakeTraceId)
}

/// Create a layer that copies the trace ID onto the response
pub fn request_id_propagation_layer(header: HeaderName) -> PropagateRequestIdLayer {
    PropagateRequestIdLayer::new(header)
}

/// Create a sensitive headers layer
pub fn sensitive_headers_layer() -> SetSensitiveRequestHeadersLayer {
    SetSensitiveRequestHeadersLayer::new(SENSITIVE_HEADERS)
}
