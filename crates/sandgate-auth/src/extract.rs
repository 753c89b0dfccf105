//! Ordered token-source lookup.
//!
//! A short-circuiting scan over the three admission sources. The first
//! present source wins; later sources are never consulted, so precedence
//! stays unambiguous.

use http::header::{AUTHORIZATION, COOKIE};
use http::Request;

/// Cookie name carrying a session-continuity token. Fixed by contract.
pub const SANDBOX_TOKEN_COOKIE: &str = "sandbox_token";

/// Where the token material came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenSource {
    BearerHeader,
    QueryParam,
    Cookie,
}

/// Raw token material plus its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedToken {
    pub value: String,
    pub source: TokenSource,
}

/// Extract token material from a request, or `None` when no source is
/// present. Does not verify anything.
pub fn extract_token<B>(req: &Request<B>) -> Option<ExtractedToken> {
    if let Some(value) = bearer_header(req) {
        return Some(ExtractedToken {
            value,
            source: TokenSource::BearerHeader,
        });
    }
    if let Some(value) = query_param(req.uri().query()) {
        return Some(ExtractedToken {
            value,
            source: TokenSource::QueryParam,
        });
    }
    if let Some(value) = cookie_value(req) {
        return Some(ExtractedToken {
            value,
            source: TokenSource::Cookie,
        });
    }
    None
}

fn bearer_header<B>(req: &Request<B>) -> Option<String> {
    let header = req.headers().get(AUTHORIZATION)?.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?;
    (!token.is_empty()).then(|| token.to_string())
}

fn query_param(query: Option<&str>) -> Option<String> {
    let query = query?;
    for pair in query.split('&') {
        if let Some(value) = pair.strip_prefix("token=") {
            if value.is_empty() {
                continue;
            }
            return Some(
                urlencoding::decode(value)
                    .map(|v| v.into_owned())
                    .unwrap_or_else(|_| value.to_string()),
            );
        }
    }
    None
}

fn cookie_value<B>(req: &Request<B>) -> Option<String> {
    let header = req.headers().get(COOKIE)?.to_str().ok()?;
    for cookie in header.split(';') {
        let cookie = cookie.trim();
        if let Some(value) = cookie.strip_prefix("sandbox_token=") {
            if value.is_empty() {
                continue;
            }
            return Some(
                urlencoding::decode(value)
                    .map(|v| v.into_owned())
                    .unwrap_or_else(|_| value.to_string()),
            );
        }
    }
    None
}
