//! AI relay handler

use axum::{extract::State, http::HeaderMap, Json};
use casedesk_common::{
    auth::{extract_bearer, PortalToken},
    errors::{AppError, Result},
    relay::ChatMessage,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Serialize)]
pub struct ChatResponse {
    pub content: String,
}

/// Who is calling the relay
#[derive(Debug, Clone, Copy)]
enum Caller {
    Owner(Uuid),
    Portal { owner_id: Uuid, client_id: Uuid },
}

/// An owner session takes precedence; otherwise a valid portal token is required
async fn identify(state: &AppState, headers: &HeaderMap, token: &str) -> Result<Caller> {
    let bearer = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(extract_bearer);

    if let Some(bearer) = bearer {
        return Ok(Caller::Owner(state.jwt.validate_token(bearer)?));
    }

    let grant = state.portal.validate(token).await?;
    Ok(Caller::Portal {
        owner_id: grant.owner_id(),
        client_id: grant.client_id(),
    })
}

/// Relay a conversation to the completion upstream
///
/// Not metered by plan.
pub async fn chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    PortalToken(token): PortalToken,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>> {
    let caller = identify(&state, &headers, &token).await?;

    if request.messages.is_empty() {
        return Err(AppError::Validation {
            message: "Messages array is required".to_string(),
            field: Some("messages".to_string()),
        });
    }

    let relay = state.relay.as_ref().ok_or_else(|| AppError::Configuration {
        message: "AI relay is not configured".to_string(),
    })?;

    match caller {
        Caller::Owner(owner_id) => {
            tracing::debug!(owner_id = %owner_id, messages = request.messages.len(), "Relaying owner chat")
        }
        Caller::Portal { owner_id, client_id } => tracing::debug!(
            owner_id = %owner_id,
            client_id = %client_id,
            messages = request.messages.len(),
            "Relaying portal chat"
        ),
    }
    let content = relay.complete(&request.messages).await?;

    Ok(Json(ChatResponse { content }))
}
