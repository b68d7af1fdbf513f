//! Owner plan handlers

use axum::{extract::State, Json};
use casedesk_common::{
    auth::AuthContext,
    entitlements::{Entitlements, Tier},
    errors::Result,
};
use serde::Deserialize;

use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct UpdateTierRequest {
    pub tier: Tier,
}

/// Current tier, limits and open case count of the caller
pub async fn get_entitlements(
    State(state): State<AppState>,
    auth: AuthContext,
) -> Result<Json<Entitlements>> {
    let snapshot = state.entitlements.snapshot(auth.owner_id).await?;
    Ok(Json(snapshot))
}

/// Change the caller's tier and return the resulting entitlements
pub async fn update_tier(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(request): Json<UpdateTierRequest>,
) -> Result<Json<Entitlements>> {
    tracing::info!(
        owner_id = %auth.owner_id,
        request_id = %auth.request_id,
        tier = request.tier.as_str(),
        "Tier change requested"
    );

    state
        .entitlements
        .upgrade_tier(auth.owner_id, request.tier)
        .await?;

    let snapshot = state.entitlements.snapshot(auth.owner_id).await?;
    Ok(Json(snapshot))
}
