use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use super::platform::PlatformError;
use super::registry::RegistryError;
use super::twiml::TwimlError;
use crate::address::AddressError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Duplicate(String),

    #[error("Platform request failed: {0}")]
    Upstream(#[from] PlatformError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<AddressError> for AppError {
    fn from(e: AddressError) -> Self {
        AppError::Validation(e.to_string())
    }
}

impl From<RegistryError> for AppError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::ConferenceNotFound(_) | RegistryError::CallNotFound(_) => {
                AppError::NotFound(e.to_string())
            }
            RegistryError::DuplicateConference(_) | RegistryError::CallEnded(_) => {
                AppError::Duplicate(e.to_string())
            }
        }
    }
}

impl From<TwimlError> for AppError {
    fn from(e: TwimlError) -> Self {
        if e.is_validation() {
            AppError::Validation(e.to_string())
        } else {
            AppError::Internal(e.to_string())
        }
    }
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Duplicate(_) => StatusCode::CONFLICT,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = match &self {
            AppError::Upstream(e) => {
                tracing::error!("Platform error: {:?}", e);
                self.to_string()
            }
            AppError::Internal(_) => {
                tracing::error!("Internal error: {:?}", self);
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        };

        let body = Json(json!({
            "error": message,
            "code": status.as_u16()
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let cases: Vec<(AppError, StatusCode)> = vec![
            (AddressError::Invalid("x".to_string()).into(), StatusCode::BAD_REQUEST),
            (RegistryError::CallNotFound("CA1".to_string()).into(), StatusCode::NOT_FOUND),
            (RegistryError::ConferenceNotFound("c1".to_string()).into(), StatusCode::NOT_FOUND),
            (RegistryError::DuplicateConference("c1".to_string()).into(), StatusCode::CONFLICT),
            (RegistryError::CallEnded("CA1".to_string()).into(), StatusCode::CONFLICT),
            (TwimlError::EmptyConferenceName.into(), StatusCode::BAD_REQUEST),
            (TwimlError::Serialize("io".to_string()).into(), StatusCode::INTERNAL_SERVER_ERROR),
            (
                PlatformError::Api { status: 401, message: "bad auth".to_string() }.into(),
                StatusCode::BAD_GATEWAY,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.status_code(), expected, "{}", error);
        }
    }

    #[test]
    fn test_into_response_status() {
        let response = AppError::NotFound("Call not found: CA1".to_string()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
