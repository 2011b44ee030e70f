//! Request correlation for logs and error bodies.
//!
//! Every request carries an `x-request-id` (generated by the outer
//! `SetRequestIdLayer` when the client sends none). The id is attached to the
//! request span and stored in a task-local so error responses can echo it.

use axum::{body::Body, http::Request, middleware::Next, response::Response};
use std::{cell::RefCell, fmt, future::Future};
use tower_http::trace::MakeSpan;
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Request ID tracking information
#[derive(Clone, Debug)]
pub struct RequestId(pub String);

impl Default for RequestId {
    fn default() -> Self {
        RequestId(Uuid::new_v4().to_string())
    }
}

impl RequestId {
    pub fn new(value: impl Into<String>) -> Self {
        RequestId(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn from_request<B>(request: &Request<B>) -> Option<Self> {
        request
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(RequestId::new)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

tokio::task_local! {
    static CURRENT_REQUEST_ID: RefCell<Option<RequestId>>;
}

pub async fn scope_request_id<Fut, R>(request_id: RequestId, future: Fut) -> R
where
    Fut: Future<Output = R>,
{
    CURRENT_REQUEST_ID
        .scope(RefCell::new(Some(request_id)), future)
        .await
}

pub fn current_request_id() -> Option<RequestId> {
    CURRENT_REQUEST_ID
        .try_with(|cell| cell.borrow().clone())
        .ok()
        .flatten()
}

/// Runs the rest of the stack inside the request-id task-local scope.
pub async fn request_id_scope(request: Request<Body>, next: Next) -> Response {
    let request_id = RequestId::from_request(&request).unwrap_or_default();
    scope_request_id(request_id, next.run(request)).await
}

#[derive(Clone, Default)]
pub struct RequestSpanMaker;

impl<B> MakeSpan<B> for RequestSpanMaker {
    fn make_span(&mut self, request: &Request<B>) -> tracing::Span {
        let request_id = RequestId::from_request(request).unwrap_or_default();

        tracing::info_span!(
            "http.request",
            request_id = %request_id.as_str(),
            method = %request.method(),
            uri = %request.uri(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn request_id_visible_inside_scope_only() {
        assert!(current_request_id().is_none());

        let seen = scope_request_id(RequestId::new("abc"), async {
            current_request_id().map(|rid| rid.0)
        })
        .await;

        assert_eq!(seen.as_deref(), Some("abc"));
        assert!(current_request_id().is_none());
    }

    #[test]
    fn blank_header_is_ignored() {
        let request = Request::builder()
            .header(REQUEST_ID_HEADER, "")
            .body(())
            .unwrap();
        assert!(RequestId::from_request(&request).is_none());
    }
}
