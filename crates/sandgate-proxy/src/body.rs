//! Response body plumbing shared by the gateway surfaces.

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, Response, StatusCode};
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full};

/// Boxed error type used across body conversions.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Unified response body: upstream streams, JSON errors, and admin
/// responses all box into this.
pub type ProxyBody = UnsyncBoxBody<Bytes, BoxError>;

/// An empty body.
pub fn empty() -> ProxyBody {
    Empty::<Bytes>::new()
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// A complete in-memory body.
pub fn full(data: impl Into<Bytes>) -> ProxyBody {
    Full::new(data.into())
        .map_err(|never| match never {})
        .boxed_unsync()
}

/// A JSON error response: `{"error": "<message>"}`.
pub fn json_error(status: StatusCode, message: &str) -> Response<ProxyBody> {
    let payload = serde_json::json!({ "error": message }).to_string();
    let mut resp = Response::new(full(payload));
    *resp.status_mut() = status;
    resp.headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    resp
}
