use axum::{extract::Request, http::HeaderMap, middleware::Next, response::Response};

use crate::context::CallerContext;

/// Header the gateway sets after authenticating the caller.
pub const CALLER_HEADER: &str = "x-authenticated-user";

/// Attach a [`CallerContext`] to every request. No token validation happens here.
pub async fn caller_middleware(mut req: Request, next: Next) -> Response {
    let caller = caller_from(req.headers());
    req.extensions_mut().insert(caller);
    next.run(req).await
}

fn caller_from(headers: &HeaderMap) -> CallerContext {
    headers
        .get(CALLER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(CallerContext::new)
        .unwrap_or_else(CallerContext::anonymous)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn missing_or_blank_header_is_anonymous() {
        let mut headers = HeaderMap::new();
        assert_eq!(caller_from(&headers).actor(), "anonymous");

        headers.insert(CALLER_HEADER, HeaderValue::from_static("   "));
        assert_eq!(caller_from(&headers).actor(), "anonymous");

        headers.insert(CALLER_HEADER, HeaderValue::from_static(" dana@example.com "));
        assert_eq!(caller_from(&headers).actor(), "dana@example.com");
    }
}
