use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use derive_more::{Display, Error};
use log::{error, warn};
use serde_json::json;

/// Failures surfaced by the persistence layer.
#[derive(Debug, Display, Error)]
pub enum StoreError {
    /// Carries the store's own description of the clash, for logs only.
    #[display(fmt = "Duplicate value: {}", _0)]
    Duplicate(#[error(not(source))] String),
    #[display(fmt = "Database error: {}", _0)]
    Database(mongodb::error::Error),
    #[display(fmt = "Serialization error: {}", _0)]
    Serialization(#[error(not(source))] String),
}

impl From<mongodb::error::Error> for StoreError {
    fn from(err: mongodb::error::Error) -> Self {
        if is_duplicate_key(&err) {
            return StoreError::Duplicate(err.to_string());
        }
        StoreError::Database(err)
    }
}

impl From<mongodb::bson::ser::Error> for StoreError {
    fn from(err: mongodb::bson::ser::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<mongodb::bson::de::Error> for StoreError {
    fn from(err: mongodb::bson::de::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<StoreError> for std::io::Error {
    fn from(err: StoreError) -> Self {
        std::io::Error::new(std::io::ErrorKind::Other, err.to_string())
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    use mongodb::error::{ErrorKind, WriteFailure};

    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(e)) => e.code == 11000,
        ErrorKind::Command(e) => e.code == 11000,
        _ => false,
    }
}

/// Errors returned by request handlers. Each variant maps to one HTTP status.
#[derive(Debug, Display, Error)]
pub enum ApiError {
    #[display(fmt = "{}", _0)]
    BadRequest(#[error(not(source))] String),
    #[display(fmt = "{}", _0)]
    Unauthorized(#[error(not(source))] String),
    #[display(fmt = "{}", _0)]
    Forbidden(#[error(not(source))] String),
    #[display(fmt = "{}", _0)]
    NotFound(#[error(not(source))] String),
    #[display(fmt = "{}", _0)]
    Conflict(#[error(not(source))] String),
    #[display(fmt = "{}", _0)]
    Internal(#[error(not(source))] String),
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        ApiError::BadRequest(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        ApiError::Unauthorized(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        ApiError::Forbidden(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        ApiError::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        ApiError::Conflict(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        ApiError::Internal(msg.into())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(detail) => {
                warn!("Rejected duplicate write: {}", detail);
                ApiError::conflict("Duplicate value")
            }
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<bcrypt::BcryptError> for ApiError {
    fn from(err: bcrypt::BcryptError) -> Self {
        ApiError::Internal(format!("Password hashing failed: {}", err))
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            ApiError::Internal(detail) => {
                error!("Internal error: {}", detail);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        HttpResponse::build(self.status_code()).json(json!({ "message": message }))
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_store_error_becomes_conflict() {
        let detail = "E11000 duplicate key error collection: andon.users index: email_1 \
                      dup key: { email: \"dana@plant.example\" }";
        let err: ApiError = StoreError::Duplicate(detail.into()).into();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
        assert_eq!(err.to_string(), "Duplicate value");
    }

    #[test]
    fn serialization_error_is_internal() {
        let err: ApiError = StoreError::Serialization("bad".into()).into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
