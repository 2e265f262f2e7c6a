use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use serde_json::Value;

use crate::profiles::ProfileInputError;
use crate::repo::RepoError;
use crate::session::SessionError;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("{0}")] BadRequest(String),
    #[error("Not found")] NotFound,
    #[error("Method not allowed")] MethodNotAllowed,
    #[error("{0}")] Conflict(String),
    #[error("Server misconfiguration")] Misconfigured,
    #[error("{message}")] Upstream { message: String, details: Option<Value> },
    #[error("Internal server error")] Internal,
}

impl From<RepoError> for ApiError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound => ApiError::NotFound,
            RepoError::Invalid(v) => ApiError::BadRequest(v.to_string()),
            RepoError::Storage(_) => ApiError::Internal,
        }
    }
}

impl From<ProfileInputError> for ApiError {
    fn from(e: ProfileInputError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl From<SessionError> for ApiError {
    fn from(e: SessionError) -> Self {
        match e {
            SessionError::EmptyVoiceKey => ApiError::BadRequest(e.to_string()),
            SessionError::VoiceKeyRequired | SessionError::InvalidTransition { .. } => ApiError::Conflict(e.to_string()),
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        use actix_web::http::StatusCode;
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Misconfigured | ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Upstream { .. } => StatusCode::BAD_GATEWAY,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let details = match self {
            ApiError::Upstream { details, .. } => details.clone(),
            _ => None,
        };
        HttpResponse::build(self.status_code()).json(ApiErrorBody { error: self.to_string(), details })
    }
}
