//! Back-office access control.
//!
//! Admin routes require the shared key configured as `admin_api_key`, sent
//! in the `x-admin-key` header. A missing header is 401; a wrong key, or no
//! key configured at all, is 403.

use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::errors::ServiceError;
use crate::services::payment_gateway::constant_time_eq;

pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

/// The configured admin key, if any.
#[derive(Clone, Debug, Default)]
pub struct AdminKey(Option<Arc<str>>);

impl AdminKey {
    pub fn new(key: Option<&str>) -> Self {
        Self(
            key.map(str::trim)
                .filter(|k| !k.is_empty())
                .map(Arc::from),
        )
    }

    /// Checks the request headers against the configured key.
    pub fn authorize(&self, headers: &HeaderMap) -> Result<(), ServiceError> {
        let supplied = headers
            .get(ADMIN_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| ServiceError::Unauthorized("admin key required".to_string()))?;

        let Some(expected) = self.0.as_deref() else {
            warn!("Admin request refused: no admin key configured");
            return Err(ServiceError::Forbidden("admin access disabled".to_string()));
        };

        if !constant_time_eq(expected.as_bytes(), supplied.as_bytes()) {
            warn!("Admin request refused: key mismatch");
            return Err(ServiceError::Forbidden("invalid admin key".to_string()));
        }

        Ok(())
    }
}

pub async fn admin_key_middleware(
    State(key): State<AdminKey>,
    request: Request,
    next: Next,
) -> Response {
    match key.authorize(request.headers()) {
        Ok(()) => {
            debug!(path = %request.uri().path(), "Admin request authorized");
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

/// Extension methods for Router to add admin auth middleware
pub trait AuthRouterExt {
    fn with_admin_key(self, key: AdminKey) -> Self;
}

impl<S> AuthRouterExt for axum::Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_admin_key(self, key: AdminKey) -> Self {
        self.layer(axum::middleware::from_fn_with_state(
            key,
            admin_key_middleware,
        ))
    }
}
