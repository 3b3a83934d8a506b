//! Stamps every request/response pair with `X-Request-ID` (spec §6), grounded
//! in the teacher's `middleware::RequestIdLayer` usage in `server.rs` but
//! expressed as axum function middleware rather than a hand-rolled
//! `tower::Layer`.

use axum::extract::Request;
use axum::http::{HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::Response;
use uuid::Uuid;

pub static REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// If the inbound request already carries `X-Request-ID`, it is preserved
/// end to end; otherwise a UUIDv4 is generated and stamped on both the
/// request (so downstream handlers and the outbound worker call see it) and
/// the response.
pub async fn stamp_request_id(mut request: Request, next: Next) -> Response {
    let id = request
        .headers()
        .get(&REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    if let Ok(value) = HeaderValue::from_str(&id) {
        request.headers_mut().insert(REQUEST_ID_HEADER.clone(), value.clone());
        let mut response = next.run(request).await;
        response.headers_mut().insert(REQUEST_ID_HEADER.clone(), value);
        response
    } else {
        next.run(request).await
    }
}
