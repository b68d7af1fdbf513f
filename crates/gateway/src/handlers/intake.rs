//! Client intake handlers
//!
//! Writes made by a portal token holder: the intake form and the intake
//! chat transcript. The (owner, client) pair always comes from the
//! validated grant; nothing in a request body can name another client.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use casedesk_common::{
    auth::PortalToken,
    db::{
        models::{IntakeConversation, IntakeMessage, IntakeStatus},
        ClientContact,
    },
    errors::{AppError, Result},
    portal::ScopedGrant,
    relay::Role,
};
use chrono::NaiveDate;
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use super::validation_error;
use crate::AppState;

/// First line of the transcript message that carries a form submission
pub const FORM_SUBMISSION_HEADER: &str = "CLIENT INTAKE FORM SUBMISSION";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaseType {
    PersonalInjury,
    FamilyLaw,
    CriminalDefense,
    Employment,
    RealEstate,
    Business,
    EstatePlanning,
    Other,
}

impl CaseType {
    pub fn label(&self) -> &'static str {
        match self {
            CaseType::PersonalInjury => "Personal Injury",
            CaseType::FamilyLaw => "Family Law",
            CaseType::CriminalDefense => "Criminal Defense",
            CaseType::Employment => "Employment Law",
            CaseType::RealEstate => "Real Estate",
            CaseType::Business => "Business Law",
            CaseType::EstatePlanning => "Estate Planning",
            CaseType::Other => "Other",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreferredContact {
    #[default]
    Email,
    Phone,
    Text,
}

impl PreferredContact {
    pub fn as_str(&self) -> &'static str {
        match self {
            PreferredContact::Email => "email",
            PreferredContact::Phone => "phone",
            PreferredContact::Text => "text",
        }
    }
}

/// The intake form as the client fills it in
#[derive(Debug, Deserialize, Validate)]
pub struct IntakeFormRequest {
    #[validate(length(min = 1, max = 200))]
    pub full_name: String,

    #[validate(email)]
    pub email: String,

    #[validate(length(min = 1, max = 50))]
    pub phone: String,

    #[validate(length(max = 500))]
    pub address: Option<String>,

    pub date_of_birth: Option<NaiveDate>,

    #[serde(default)]
    pub preferred_contact: PreferredContact,

    pub case_type: CaseType,

    pub incident_date: Option<NaiveDate>,

    #[validate(length(max = 500))]
    pub incident_location: Option<String>,

    #[validate(length(max = 20000))]
    pub description: Option<String>,

    #[validate(length(max = 5000))]
    pub injuries: Option<String>,

    #[validate(length(max = 5000))]
    pub medical_treatment: Option<String>,

    #[validate(length(max = 5000))]
    pub insurance_info: Option<String>,

    #[validate(length(max = 5000))]
    pub witnesses: Option<String>,

    #[validate(length(max = 5000))]
    pub additional_notes: Option<String>,
}

fn provided(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn or_missing(value: &Option<String>) -> &str {
    provided(value).unwrap_or("Not provided")
}

fn date_or_missing(value: Option<NaiveDate>) -> String {
    value
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "Not provided".to_string())
}

impl IntakeFormRequest {
    fn contact(&self) -> ClientContact {
        ClientContact {
            full_name: self.full_name.trim().to_string(),
            email: Some(self.email.trim().to_string()),
            phone: Some(self.phone.trim().to_string()),
            address: provided(&self.address).map(str::to_string),
            date_of_birth: self.date_of_birth,
            notes: provided(&self.additional_notes).map(str::to_string),
        }
    }

    /// Markdown summary kept on the conversation for the owner to review
    pub fn summary(&self) -> String {
        format!(
            "## Client Information\n\
             - **Name:** {name}\n\
             - **Date of Birth:** {dob}\n\
             - **Phone:** {phone}\n\
             - **Email:** {email}\n\
             - **Address:** {address}\n\
             - **Preferred Contact:** {contact}\n\
             \n\
             ## Case Information\n\
             - **Case Type:** {case_type}\n\
             - **Incident Date:** {incident_date}\n\
             - **Incident Location:** {location}\n\
             \n\
             ## Description\n\
             {description}\n\
             \n\
             ## Additional Details\n\
             - **Injuries:** {injuries}\n\
             - **Medical Treatment:** {treatment}\n\
             - **Insurance Information:** {insurance}\n\
             - **Witnesses:** {witnesses}\n\
             \n\
             ## Additional Notes\n\
             {notes}",
            name = self.full_name.trim(),
            dob = date_or_missing(self.date_of_birth),
            phone = self.phone.trim(),
            email = self.email.trim(),
            address = or_missing(&self.address),
            contact = self.preferred_contact.as_str(),
            case_type = self.case_type.label(),
            incident_date = date_or_missing(self.incident_date),
            location = or_missing(&self.incident_location),
            description = or_missing(&self.description),
            injuries = or_missing(&self.injuries),
            treatment = or_missing(&self.medical_treatment),
            insurance = or_missing(&self.insurance_info),
            witnesses = or_missing(&self.witnesses),
            notes = provided(&self.additional_notes).unwrap_or("None"),
        )
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct AppendMessageRequest {
    pub role: Role,

    #[validate(length(min = 1, max = 20000))]
    pub content: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CompleteConversationRequest {
    #[validate(length(min = 1, max = 50000))]
    pub summary: String,
}

/// A conversation inside the grant's scope that still takes messages
async fn open_conversation(
    state: &AppState,
    grant: &ScopedGrant,
    id: Uuid,
) -> Result<IntakeConversation> {
    let conversation = state
        .intake
        .find_conversation(grant.owner_id(), grant.client_id(), id)
        .await?
        .filter(|c| grant.authorize(c))
        .ok_or_else(|| AppError::ConversationNotFound { id: id.to_string() })?;

    if conversation.intake_status() == IntakeStatus::Completed {
        return Err(AppError::ConversationClosed { id: id.to_string() });
    }
    Ok(conversation)
}

/// Submit the intake form
///
/// Overwrites the client's contact details and records a completed
/// conversation holding the rendered summary.
pub async fn submit_form(
    State(state): State<AppState>,
    PortalToken(token): PortalToken,
    Json(request): Json<IntakeFormRequest>,
) -> Result<(StatusCode, Json<IntakeConversation>)> {
    let grant = state.portal.validate(&token).await?;
    request.validate().map_err(validation_error)?;
    let (owner_id, client_id) = (grant.owner_id(), grant.client_id());

    state
        .intake
        .update_client_contact(owner_id, client_id, request.contact())
        .await?
        .ok_or_else(|| AppError::ClientNotFound {
            id: client_id.to_string(),
        })?;

    let summary = request.summary();
    let conversation = state
        .intake
        .create_conversation(owner_id, client_id, IntakeStatus::Completed, Some(summary.clone()))
        .await?;
    state
        .intake
        .append_message(
            conversation.id,
            Role::User,
            format!("{}\n\n{}", FORM_SUBMISSION_HEADER, summary),
        )
        .await?;

    tracing::info!(
        conversation_id = %conversation.id,
        owner_id = %owner_id,
        client_id = %client_id,
        "Intake form submitted"
    );

    Ok((StatusCode::CREATED, Json(conversation)))
}

/// Open an intake chat for the token's client
pub async fn start_conversation(
    State(state): State<AppState>,
    PortalToken(token): PortalToken,
) -> Result<(StatusCode, Json<IntakeConversation>)> {
    let grant = state.portal.validate(&token).await?;

    let conversation = state
        .intake
        .create_conversation(grant.owner_id(), grant.client_id(), IntakeStatus::Active, None)
        .await?;

    tracing::debug!(conversation_id = %conversation.id, "Intake chat started");
    Ok((StatusCode::CREATED, Json(conversation)))
}

/// Record one chat turn
pub async fn append_message(
    State(state): State<AppState>,
    PortalToken(token): PortalToken,
    Path(id): Path<Uuid>,
    Json(request): Json<AppendMessageRequest>,
) -> Result<(StatusCode, Json<IntakeMessage>)> {
    let grant = state.portal.validate(&token).await?;
    request.validate().map_err(validation_error)?;
    if request.role == Role::System {
        return Err(AppError::Validation {
            message: "Only user and assistant messages can be recorded".to_string(),
            field: Some("role".to_string()),
        });
    }

    let conversation = open_conversation(&state, &grant, id).await?;
    let message = state
        .intake
        .append_message(conversation.id, request.role, request.content)
        .await?;

    Ok((StatusCode::CREATED, Json(message)))
}

/// Close an intake chat with its summary
pub async fn complete_conversation(
    State(state): State<AppState>,
    PortalToken(token): PortalToken,
    Path(id): Path<Uuid>,
    Json(request): Json<CompleteConversationRequest>,
) -> Result<Json<IntakeConversation>> {
    let grant = state.portal.validate(&token).await?;
    request.validate().map_err(validation_error)?;

    open_conversation(&state, &grant, id).await?;
    let conversation = state
        .intake
        .complete_conversation(grant.owner_id(), grant.client_id(), id, request.summary)
        .await?
        .ok_or_else(|| AppError::ConversationNotFound { id: id.to_string() })?;

    tracing::info!(
        conversation_id = %id,
        client_id = %grant.client_id(),
        "Intake chat completed"
    );
    Ok(Json(conversation))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form() -> IntakeFormRequest {
        serde_json::from_value(serde_json::json!({
            "full_name": "Ada Client",
            "email": "ada@example.com",
            "phone": "555-0100",
            "case_type": "personal-injury",
            "incident_date": "2025-01-14",
            "additional_notes": "  "
        }))
        .unwrap()
    }

    #[test]
    fn test_summary_fills_gaps() {
        let summary = form().summary();
        assert!(summary.starts_with("## Client Information\n- **Name:** Ada Client"));
        assert!(summary.contains("- **Case Type:** Personal Injury"));
        assert!(summary.contains("- **Incident Date:** 2025-01-14"));
        assert!(summary.contains("- **Date of Birth:** Not provided"));
        assert!(summary.contains("- **Preferred Contact:** email"));
        assert!(summary.ends_with("## Additional Notes\nNone"));
    }

    #[test]
    fn test_contact_drops_blank_fields() {
        let contact = form().contact();
        assert_eq!(contact.full_name, "Ada Client");
        assert_eq!(contact.phone.as_deref(), Some("555-0100"));
        assert_eq!(contact.address, None);
        assert_eq!(contact.notes, None);
    }

    #[test]
    fn test_form_requires_core_fields() {
        let mut request = form();
        request.phone = String::new();
        assert!(request.validate().is_err());

        let unknown_type = serde_json::from_value::<IntakeFormRequest>(serde_json::json!({
            "full_name": "Ada Client",
            "email": "ada@example.com",
            "phone": "555-0100",
            "case_type": "maritime"
        }));
        assert!(unknown_type.is_err());
    }
}
