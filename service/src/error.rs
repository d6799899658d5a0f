//! HTTP error responses.
//!
//! Handlers return [`AppError`], which renders as a JSON `{code, message}`
//! body. Server-side failures are logged with their source before the
//! response leaves.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use farm_mfa_replay::ReplayError;
use serde::Serialize;
use std::fmt;

/// Error returned by service handlers.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
    code: &'static str,
    /// Logged on 5xx, never sent to the caller
    source: Option<anyhow::Error>,
}

impl AppError {
    /// Error with an explicit status and code.
    #[must_use]
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            code,
            source: None,
        }
    }

    /// Attach the underlying failure.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// 401: the caller did not identify itself.
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    /// 403: the caller is not a farm administrator.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "FORBIDDEN", message)
    }

    /// 404
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    /// 500
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_SERVER_ERROR", message)
    }

    /// 502: a farm peer failed.
    #[must_use]
    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, "BAD_GATEWAY", message)
    }

    /// 503: a local dependency is not ready.
    #[must_use]
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", message)
    }

    /// Response status.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        self.code
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<ReplayError> for AppError {
    fn from(error: ReplayError) -> Self {
        let base = match &error {
            ReplayError::Notification(_) => Self::unavailable("Local notification listener is gone"),
            ReplayError::Http(_) | ReplayError::Status { .. } => Self::bad_gateway("Farm peer call failed"),
            ReplayError::Crypto(_) => Self::internal("Security metadata could not be decrypted"),
            ReplayError::InvalidFeed { .. } | ReplayError::Io(_) | ReplayError::Serialization(_) => {
                Self::internal("Local cache failure")
            },
        };
        base.with_source(error)
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    code: &'a str,
    message: &'a str,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            match &self.source {
                Some(source) => tracing::error!(
                    status = %self.status,
                    code = self.code,
                    error = %source,
                    "{}",
                    self.message
                ),
                None => tracing::error!(status = %self.status, code = self.code, "{}", self.message),
            }
        }

        let body = ErrorBody {
            code: self.code,
            message: &self.message,
        };
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_code_and_message() {
        let error = AppError::forbidden("caller is not an administrator");
        assert_eq!(error.to_string(), "[FORBIDDEN] caller is not an administrator");
    }

    #[test]
    fn replay_errors_map_to_statuses() {
        let gone = AppError::from(ReplayError::Notification("closed".into()));
        assert_eq!(gone.status(), StatusCode::SERVICE_UNAVAILABLE);

        let peer = AppError::from(ReplayError::Status {
            url: "http://adfs2:5987/notify".into(),
            status: 500,
        });
        assert_eq!(peer.status(), StatusCode::BAD_GATEWAY);
        assert!(std::error::Error::source(&peer).is_some());

        let crypto = AppError::from(ReplayError::Crypto("tag mismatch".into()));
        assert_eq!(crypto.code(), "INTERNAL_SERVER_ERROR");
    }

    #[test]
    fn response_uses_status() {
        let response = AppError::not_found("no metrics recorder").into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
