//! HTTP response mapping for lifecycle operations.
//!
//! Routing lives outside this crate; handlers return these types so every
//! operation answers with the same status codes and body shapes.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::error::Result;

use super::validation::{Outcome, ValidationErrors};

/// Body for rejected requests: `{"errors": {field: [reason, ...]}}`.
#[derive(Debug, Serialize)]
pub struct ValidationErrorBody {
    pub errors: ValidationErrors,
}

impl IntoResponse for ValidationErrors {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, Json(ValidationErrorBody { errors: self })).into_response()
    }
}

/// Response for a lifecycle operation result.
///
/// - accepted: the success status with the value as JSON
/// - rejected: 400 with the validation map
/// - error: the error's own status with a generic body
pub struct OperationResponse<T: Serialize> {
    result: Result<Outcome<T>>,
    success: StatusCode,
}

impl<T: Serialize> OperationResponse<T> {
    /// Answer 201 on success. Used for checkout.
    pub fn created(result: Result<Outcome<T>>) -> Self {
        Self {
            result,
            success: StatusCode::CREATED,
        }
    }

    /// Answer 200 on success.
    pub fn ok(result: Result<Outcome<T>>) -> Self {
        Self {
            result,
            success: StatusCode::OK,
        }
    }
}

impl<T: Serialize> IntoResponse for OperationResponse<T> {
    fn into_response(self) -> Response {
        match self.result {
            Ok(Outcome::Accepted(value)) => (self.success, Json(value)).into_response(),
            Ok(Outcome::Rejected(errors)) => errors.into_response(),
            Err(err) => err.into_response(),
        }
    }
}
