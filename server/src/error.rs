use axum::{
    Json,
    extract::{FromRequest, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use sqlx::Error as SqlxError;
use std::collections::BTreeMap;
use utoipa::ToSchema;

// ═══════════════════════════════════════════════════════════════════════════════
// API ERROR
// ═══════════════════════════════════════════════════════════════════════════════

/// The single HTTP error responder. Every domain error ends up here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    BadRequest {
        message: String,
        errors: Option<BTreeMap<String, String>>,
    },
    Unauthorized(String),
    Forbidden(String),
    NotFound(String),
    InternalServerError(String),
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<BTreeMap<String, String>>,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest {
            message: message.into(),
            errors: None,
        }
    }

    pub fn internal() -> Self {
        ApiError::InternalServerError("Internal server error".to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        ApiError::BadRequest {
            message: "Bad Request".to_string(),
            errors: Some(errors.0),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ApiError::BadRequest { message, errors } => ErrorBody { message, errors },
            ApiError::Unauthorized(message)
            | ApiError::Forbidden(message)
            | ApiError::NotFound(message) => ErrorBody {
                message,
                errors: None,
            },
            ApiError::InternalServerError(_) => ErrorBody {
                message: "Internal server error".to_string(),
                errors: None,
            },
        };

        (status, Json(body)).into_response()
    }
}

/// `Json` extractor whose rejections are answered with the 400 error body.
#[derive(Debug, FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
pub struct AppJson<T>(pub T);

// ═══════════════════════════════════════════════════════════════════════════════
// VALIDATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Field name → message, sorted by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationErrors(pub BTreeMap<String, String>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_insert_with(|| message.into());
    }

    pub fn check(&mut self, valid: bool, field: &str, message: &str) {
        if !valid {
            self.add(field, message);
        }
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let fields: Vec<String> = self
            .0
            .iter()
            .map(|(field, message)| format!("{}: {}", field, message))
            .collect();
        write!(f, "{}", fields.join(", "))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DATABASE ERROR
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, thiserror::Error)]
pub enum DatabaseError {
    #[error("Unique constraint violation: duplicate value for '{constraint}'")]
    UniqueConstraintViolation { constraint: String },

    #[error("Foreign key violation: invalid reference in '{constraint}'")]
    ForeignKeyViolation { constraint: String },

    #[error("Check constraint violation: constraint '{constraint}' failed")]
    CheckConstraintViolation { constraint: String },

    #[error("No matching row found")]
    RowNotFound,

    #[error("Database error: {message}")]
    InternalServerError { message: String },
}

impl From<SqlxError> for DatabaseError {
    fn from(error: SqlxError) -> Self {
        let db_error = match error {
            SqlxError::RowNotFound => return DatabaseError::RowNotFound,
            SqlxError::Database(db_error) => db_error,
            other => {
                return DatabaseError::InternalServerError {
                    message: other.to_string(),
                };
            }
        };

        let code = db_error.code().unwrap_or_default();
        let constraint = db_error
            .constraint()
            .unwrap_or("unknown_constraint")
            .to_string();

        match code.as_ref() {
            "23505" => DatabaseError::UniqueConstraintViolation { constraint },
            "23503" => DatabaseError::ForeignKeyViolation { constraint },
            "23514" => DatabaseError::CheckConstraintViolation { constraint },
            _ => DatabaseError::InternalServerError {
                message: format!("Database error ({}): {}", code, db_error.message()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_keep_first_message_per_field() {
        let mut errors = ValidationErrors::new();
        errors.check(false, "name", "Name must be 60 characters or less");
        errors.check(false, "name", "Name is required");
        errors.check(true, "city", "City is required");

        assert!(errors.contains("name"));
        assert!(!errors.contains("city"));
        assert_eq!(
            errors.0.get("name").map(String::as_str),
            Some("Name must be 60 characters or less")
        );
    }

    #[test]
    fn validation_errors_are_sorted_by_field() {
        let mut errors = ValidationErrors::new();
        errors.add("state", "State is required");
        errors.add("about", "About must be 50 characters or more");
        errors.add("name", "Name is required");

        let fields: Vec<&str> = errors.0.keys().map(String::as_str).collect();
        assert_eq!(fields, ["about", "name", "state"]);
    }

    #[test]
    fn validation_errors_map_to_bad_request() {
        let mut errors = ValidationErrors::new();
        errors.add("status", "Cannot change a membership status to pending");

        let api: ApiError = errors.into();
        assert_eq!(api.status(), StatusCode::BAD_REQUEST);
        match api {
            ApiError::BadRequest { message, errors } => {
                assert_eq!(message, "Bad Request");
                assert!(errors.unwrap().contains_key("status"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn internal_errors_never_leak_details() {
        let response =
            ApiError::InternalServerError("relation \"groups\" does not exist".into())
                .into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
