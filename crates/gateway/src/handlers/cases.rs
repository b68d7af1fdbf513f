//! Case handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use casedesk_common::{
    auth::AuthContext,
    db::{models::Case, models::CaseStatus, NewCase},
    entitlements::Action,
    errors::{AppError, Result},
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::validation_error;
use crate::AppState;

/// Request to open a new case
#[derive(Debug, Deserialize, Validate)]
pub struct CreateCaseRequest {
    #[validate(length(min = 1, max = 500))]
    pub title: String,

    #[validate(length(max = 20000))]
    pub description: Option<String>,

    #[validate(length(max = 100))]
    pub case_number: Option<String>,

    pub client_id: Option<Uuid>,

    #[serde(default = "default_priority")]
    #[validate(custom(function = "validate_priority"))]
    pub priority: String,

    /// Defaults to intake
    pub status: Option<CaseStatus>,
}

fn default_priority() -> String {
    "medium".to_string()
}

fn validate_priority(priority: &str) -> std::result::Result<(), validator::ValidationError> {
    match priority {
        "low" | "medium" | "high" | "urgent" => Ok(()),
        _ => Err(validator::ValidationError::new("priority")),
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: CaseStatus,
}

/// Open a case, subject to the caller's active-case quota
pub async fn create_case(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<CreateCaseRequest>,
) -> Result<(StatusCode, Json<Case>)> {
    request.validate().map_err(validation_error)?;

    state
        .entitlements
        .require(auth.owner_id, Action::CreateCase)
        .await?;

    if let Some(client_id) = request.client_id {
        state
            .cases
            .find_client(auth.owner_id, client_id)
            .await?
            .ok_or_else(|| AppError::ClientNotFound {
                id: client_id.to_string(),
            })?;
    }

    let case = state
        .cases
        .create_case(
            auth.owner_id,
            NewCase {
                client_id: request.client_id,
                case_number: request.case_number,
                title: request.title,
                description: request.description,
                status: request.status.unwrap_or(CaseStatus::Intake),
                priority: request.priority,
            },
        )
        .await?;

    tracing::info!(
        case_id = %case.id,
        owner_id = %auth.owner_id,
        request_id = %auth.request_id,
        "Case created"
    );

    Ok((StatusCode::CREATED, Json(case)))
}

/// Move a case to another status
///
/// Closing or archiving frees a quota slot. Reopening a closed or archived
/// case takes one, so it is checked like opening a new case.
pub async fn update_case_status(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<Case>> {
    let current = state
        .cases
        .find_case(auth.owner_id, id)
        .await?
        .ok_or_else(|| AppError::CaseNotFound { id: id.to_string() })?;

    if request.status.is_open() && !current.case_status().is_open() {
        state
            .entitlements
            .require(auth.owner_id, Action::CreateCase)
            .await?;
    }

    let case = state
        .cases
        .update_case_status(auth.owner_id, id, request.status)
        .await?
        .ok_or_else(|| AppError::CaseNotFound { id: id.to_string() })?;

    tracing::debug!(case_id = %id, status = request.status.as_str(), "Case status changed");
    Ok(Json(case))
}
