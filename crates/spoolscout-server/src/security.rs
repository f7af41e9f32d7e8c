use axum::{
    body::Body,
    http::{HeaderMap, HeaderValue, Method, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use tracing::Instrument;

use crate::error::json_error;

pub const REQUEST_ID_HEADER: &str = "x-request-id";
const MAX_REQUEST_ID_LEN: usize = 128;

fn is_unsafe_method(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

pub fn parse_allowed_origins(raw: Option<&str>) -> Vec<String> {
    // Dev-friendly defaults; production sets SPOOLSCOUT_ALLOWED_ORIGINS.
    raw.unwrap_or("http://localhost:5173,http://127.0.0.1:5173")
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .collect()
}

fn origin_is_allowed(headers: &HeaderMap, allowed: &[String]) -> bool {
    // Missing Origin means a non-browser client (curl, service-to-service).
    let origin = match headers.get(axum::http::header::ORIGIN) {
        Some(v) => match v.to_str() {
            Ok(s) => s,
            Err(_) => return false,
        },
        None => return true,
    };

    allowed.iter().any(|a| a == origin)
}

// Middleware: Origin allowlist for state-changing requests.
pub async fn origin_allowlist(req: Request<Body>, next: Next) -> Response {
    if !is_unsafe_method(req.method()) {
        return next.run(req).await;
    }

    let raw = std::env::var("SPOOLSCOUT_ALLOWED_ORIGINS").ok();
    let allowed = parse_allowed_origins(raw.as_deref());
    if !origin_is_allowed(req.headers(), &allowed) {
        return json_error(StatusCode::FORBIDDEN, "origin not allowed");
    }

    next.run(req).await
}

fn incoming_request_id(headers: &HeaderMap) -> Option<String> {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty() && v.len() <= MAX_REQUEST_ID_LEN)
        .map(str::to_string)
}

// Middleware: reuse or mint a request id, run the request inside its span.
pub async fn request_id(req: Request<Body>, next: Next) -> Response {
    let id = incoming_request_id(req.headers()).unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let span = tracing::info_span!(
        "request",
        request_id = %id,
        method = %req.method(),
        path = %req.uri().path(),
    );
    let mut resp = next.run(req).instrument(span).await;

    if let Ok(v) = HeaderValue::from_str(&id) {
        resp.headers_mut().insert(REQUEST_ID_HEADER, v);
    }
    resp
}
