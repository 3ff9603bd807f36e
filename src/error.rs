//! Typed errors and HTTP mapping.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing reference: {kind} id '{id}'")]
    MissingReference { kind: &'static str, id: String },
    #[error("invalid primary key: table {table_id} column {column}")]
    InvalidPrimaryKey { table_id: String, column: String },
    #[error("duplicate path segment: {0}")]
    DuplicatePathSegment(String),
    #[error("environment variable {var}: {message}")]
    Env { var: &'static str, message: String },
    #[error("validation: {0}")]
    Validation(String),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("validation: {0}")]
    Validation(String),
    #[error("privilege: {0}")]
    Privilege(String),
    #[error("reference: {0}")]
    Reference(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("database: {0}")]
    Db(sqlx::Error),
    #[error("bad request: {0}")]
    BadRequest(String),
}

/// PostgreSQL SQLSTATE codes surfaced as caller errors rather than server errors.
mod sqlstate {
    pub const NOT_NULL_VIOLATION: &str = "23502";
    pub const FOREIGN_KEY_VIOLATION: &str = "23503";
    pub const UNIQUE_VIOLATION: &str = "23505";
    pub const CHECK_VIOLATION: &str = "23514";
    pub const INVALID_TEXT_REPRESENTATION: &str = "22P02";
    pub const INVALID_DATETIME_FORMAT: &str = "22007";
    pub const NUMERIC_VALUE_OUT_OF_RANGE: &str = "22003";
}

/// Map a SQLSTATE to the caller-facing error class. `None` means the error stays a database error.
pub fn classify_sqlstate(code: &str, message: &str) -> Option<AppError> {
    let message = message.to_string();
    match code {
        sqlstate::UNIQUE_VIOLATION
        | sqlstate::NOT_NULL_VIOLATION
        | sqlstate::CHECK_VIOLATION
        | sqlstate::INVALID_TEXT_REPRESENTATION
        | sqlstate::INVALID_DATETIME_FORMAT
        | sqlstate::NUMERIC_VALUE_OUT_OF_RANGE => Some(AppError::Validation(message)),
        sqlstate::FOREIGN_KEY_VIOLATION => Some(AppError::Reference(message)),
        _ => None,
    }
}

impl From<sqlx::Error> for AppError {
    fn from(e: sqlx::Error) -> Self {
        if let Some(db_err) = e.as_database_error() {
            if let Some(code) = db_err.code() {
                if let Some(mapped) = classify_sqlstate(&code, db_err.message()) {
                    return mapped;
                }
            }
        }
        AppError::Db(e)
    }
}

#[derive(Serialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Serialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl AppError {
    pub fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            AppError::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "config_error"),
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            AppError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "validation_error"),
            AppError::Privilege(_) => (StatusCode::UNPROCESSABLE_ENTITY, "privilege_error"),
            AppError::Reference(_) => (StatusCode::UNPROCESSABLE_ENTITY, "reference_error"),
            AppError::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "unauthorized"),
            AppError::Db(e) => {
                if let sqlx::Error::RowNotFound = e {
                    (StatusCode::NOT_FOUND, "not_found")
                } else {
                    (StatusCode::INTERNAL_SERVER_ERROR, "database_error")
                }
            }
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message: self.to_string(),
                details: None,
            },
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unique_violation_is_a_validation_error() {
        let err = classify_sqlstate("23505", "duplicate key value violates unique constraint \"users_email_key\"");
        assert!(matches!(err, Some(AppError::Validation(m)) if m.contains("users_email_key")));
    }

    #[test]
    fn foreign_key_violation_is_a_reference_error() {
        let err = classify_sqlstate("23503", "insert or update on table \"lessons\" violates foreign key constraint");
        assert!(matches!(err, Some(AppError::Reference(_))));
    }

    #[test]
    fn bad_enum_text_is_a_validation_error() {
        assert!(matches!(
            classify_sqlstate("22P02", "invalid input value for enum onset.course_level: \"expert\""),
            Some(AppError::Validation(_))
        ));
    }

    #[test]
    fn unknown_sqlstate_stays_a_database_error() {
        assert!(classify_sqlstate("40001", "could not serialize access").is_none());
    }

    #[test]
    fn status_codes() {
        assert_eq!(
            AppError::Validation("x".into()).status_and_code(),
            (StatusCode::UNPROCESSABLE_ENTITY, "validation_error")
        );
        assert_eq!(
            AppError::Privilege("x".into()).status_and_code().1,
            "privilege_error"
        );
        assert_eq!(AppError::NotFound("x".into()).status_and_code().0, StatusCode::NOT_FOUND);
        assert_eq!(AppError::Db(sqlx::Error::RowNotFound).status_and_code().0, StatusCode::NOT_FOUND);
        assert_eq!(
            AppError::Unauthorized("x".into()).status_and_code().0,
            StatusCode::UNAUTHORIZED
        );
    }
}
