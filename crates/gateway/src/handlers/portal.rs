//! Client portal handlers
//!
//! Owner side: issue, list and revoke grants. Token holder side: read the
//! one client's cases, documents and reminders a grant scopes.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use casedesk_common::{
    auth::{AuthContext, PortalToken},
    db::models::{Case, CaseDocument, CaseReminder},
    entitlements::Action,
    errors::{AppError, Result},
    portal::{portal_link, GrantSummary, PortalMode},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::validation_error;
use crate::AppState;

/// Request to invite a client to the portal
#[derive(Debug, Deserialize, Validate)]
pub struct IssueGrantRequest {
    #[validate(email)]
    pub email: String,

    /// Overrides the configured lifetime
    #[validate(range(min = 1, max = 365))]
    pub ttl_days: Option<u32>,

    /// Which workflow the link opens
    pub mode: Option<PortalMode>,
}

#[derive(Serialize)]
pub struct IssueGrantResponse {
    pub grant: GrantSummary,
    /// Shown once; only a digest is kept
    pub token: String,
    pub link: String,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Serialize)]
pub struct GrantListResponse {
    pub grants: Vec<GrantSummary>,
}

#[derive(Serialize)]
pub struct PortalViewResponse {
    pub client_id: Uuid,
    pub client_name: Option<String>,
    pub cases: Vec<Case>,
    pub documents: Vec<CaseDocument>,
    pub reminders: Vec<CaseReminder>,
}

async fn ensure_client(state: &AppState, owner_id: Uuid, client_id: Uuid) -> Result<()> {
    state
        .cases
        .find_client(owner_id, client_id)
        .await?
        .map(|_| ())
        .ok_or_else(|| AppError::ClientNotFound {
            id: client_id.to_string(),
        })
}

/// Issue a portal grant for one of the caller's clients
pub async fn issue_grant(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(client_id): Path<Uuid>,
    Json(request): Json<IssueGrantRequest>,
) -> Result<(StatusCode, Json<IssueGrantResponse>)> {
    request.validate().map_err(validation_error)?;

    state
        .entitlements
        .require(auth.owner_id, Action::UseClientPortal)
        .await?;
    ensure_client(&state, auth.owner_id, client_id).await?;

    let issued = state
        .portal
        .issue(auth.owner_id, client_id, &request.email, request.ttl_days)
        .await?;

    let link = portal_link(&state.config.portal.base_url, &issued.token, request.mode);

    Ok((
        StatusCode::CREATED,
        Json(IssueGrantResponse {
            expires_at: issued.grant.expires_at,
            grant: issued.grant.summary(issued.grant.created_at),
            link,
            token: issued.token,
        }),
    ))
}

/// Grants the caller has issued for a client, with computed status
pub async fn list_grants(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(client_id): Path<Uuid>,
) -> Result<Json<GrantListResponse>> {
    ensure_client(&state, auth.owner_id, client_id).await?;
    let grants = state.portal.list_grants(auth.owner_id, client_id).await?;
    Ok(Json(GrantListResponse { grants }))
}

/// Revoke a grant
pub async fn deactivate_grant(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    state.portal.deactivate(auth.owner_id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Everything the token holder may see
///
/// Rows are queried by the grant's (owner, client) pair and then filtered
/// against it again before they are returned.
pub async fn portal_view(
    State(state): State<AppState>,
    PortalToken(token): PortalToken,
) -> Result<Json<PortalViewResponse>> {
    let grant = state.portal.validate(&token).await?;
    let (owner_id, client_id) = (grant.owner_id(), grant.client_id());

    let client = state.cases.find_client(owner_id, client_id).await?;
    let cases = grant.filter_authorized(state.cases.list_client_cases(owner_id, client_id).await?);

    let case_ids: Vec<Uuid> = cases.iter().map(|c| c.id).collect();
    let (documents, reminders) = tokio::try_join!(
        state.cases.list_case_documents(owner_id, &case_ids),
        state.cases.list_case_reminders(owner_id, &case_ids),
    )?;

    Ok(Json(PortalViewResponse {
        client_id,
        client_name: client.map(|c| c.full_name),
        documents: grant.filter_case_rows(documents, &cases),
        reminders: grant.filter_case_rows(reminders, &cases),
        cases,
    }))
}
