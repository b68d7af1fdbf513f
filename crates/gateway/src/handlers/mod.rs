//! API handlers module

pub mod ai;
pub mod cases;
pub mod entitlements;
pub mod health;
pub mod intake;
pub mod portal;

use casedesk_common::errors::AppError;

/// Turn request validation failures into a 400 naming the first bad field
pub(crate) fn validation_error(e: validator::ValidationErrors) -> AppError {
    AppError::Validation {
        message: e.to_string(),
        field: e.field_errors().keys().next().map(|k| k.to_string()),
    }
}
