//! cinedex/crates/cx-api/src/middleware.rs
//!
//! Request tracing, CORS, caller resolution and error rendering.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use cx_core::access::authorize;
use cx_core::error::AppError;
use cx_core::models::Identity;
use serde::Serialize;
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers::AppState;

pub fn trace_layer() -> TraceLayer<SharedClassifier<ServerErrorsAsFailures>> {
    TraceLayer::new_for_http()
}

pub fn cors_policy() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::DELETE])
        .allow_headers([AUTHORIZATION, axum::http::header::CONTENT_TYPE])
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: String,
}

/// HTTP rendering of [`AppError`].
#[derive(Debug)]
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            AppError::NotFound(..) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let message = match &self.0 {
            AppError::Internal(e) => {
                tracing::error!(error = ?e, "request failed");
                "internal server error".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(ErrorBody { error: self.0.kind(), message })).into_response()
    }
}

/// Raw `Authorization` header value.
pub fn authorization(headers: &HeaderMap) -> Result<&str, ApiError> {
    headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::BadRequest("missing authorization header".into()).into())
}

/// The verified caller of a request, if it presented an access token.
#[derive(Debug, Clone, Copy)]
pub struct Caller(pub Option<Identity>);

impl Caller {
    /// Checks the access table and hands back whatever identity there is.
    pub fn permit(&self, operation: &str) -> Result<Option<Identity>, ApiError> {
        authorize(operation, self.0.as_ref())?;
        Ok(self.0)
    }

    pub fn require(&self, operation: &str) -> Result<Identity, ApiError> {
        self.permit(operation)?
            .ok_or_else(|| AppError::Unauthorized("a valid access token is required".into()).into())
    }
}

impl FromRequestParts<Arc<AppState>> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let Some(raw) = parts.headers.get(AUTHORIZATION) else {
            return Ok(Caller(None));
        };
        let raw = raw
            .to_str()
            .map_err(|_| AppError::BadRequest("authorization header is not valid text".into()))?;

        let identity = state.auth.identify(raw).await?;
        Ok(Caller(Some(identity)))
    }
}
