//! Storage seams used by the evaluators and the gateway
//!
//! `Repository` implements these over Postgres; `MemoryStore` implements
//! them in process for tests.

use crate::db::models::{
    Case, CaseDocument, CaseReminder, CaseStatus, Client, IntakeConversation, IntakeMessage,
    IntakeStatus,
};
use crate::entitlements::{EntitlementProfile, Tier};
use crate::errors::Result;
use crate::portal::PortalGrant;
use crate::relay::Role;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

/// Reads and writes behind `EntitlementResolver`
#[async_trait]
pub trait EntitlementStore: Send + Sync {
    /// Profile of an owner, if one has been created
    async fn find_profile(&self, owner_id: Uuid) -> Result<Option<EntitlementProfile>>;

    /// Cases owned by `owner_id` in intake, active or pending status
    async fn count_open_cases(&self, owner_id: Uuid) -> Result<u64>;

    /// Set the owner's tier, creating the profile if needed
    async fn set_tier(&self, owner_id: Uuid, tier: Tier) -> Result<EntitlementProfile>;
}

/// Reads and writes behind `PortalTokenGate`
#[async_trait]
pub trait PortalStore: Send + Sync {
    /// Exact digest match among active grants
    async fn find_active_grant(&self, token_hash: &str) -> Result<Option<PortalGrant>>;

    async fn insert_grant(&self, grant: &PortalGrant) -> Result<()>;

    /// Set `last_accessed_at`
    async fn touch_grant(&self, grant_id: Uuid, at: DateTime<Utc>) -> Result<()>;

    /// Deactivate a grant issued by `owner_id`. False if there is no such grant.
    async fn deactivate_grant(&self, owner_id: Uuid, grant_id: Uuid) -> Result<bool>;

    async fn list_grants(&self, owner_id: Uuid, client_id: Uuid) -> Result<Vec<PortalGrant>>;
}

/// Fields for a new case
#[derive(Debug, Clone)]
pub struct NewCase {
    pub client_id: Option<Uuid>,
    pub case_number: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub status: CaseStatus,
    pub priority: String,
}

/// Case, client and case-child rows, always filtered by owner
#[async_trait]
pub trait CaseStore: Send + Sync {
    async fn find_client(&self, owner_id: Uuid, client_id: Uuid) -> Result<Option<Client>>;

    async fn find_case(&self, owner_id: Uuid, case_id: Uuid) -> Result<Option<Case>>;

    async fn create_case(&self, owner_id: Uuid, case: NewCase) -> Result<Case>;

    /// None if the case does not exist or belongs to someone else
    async fn update_case_status(
        &self,
        owner_id: Uuid,
        case_id: Uuid,
        status: CaseStatus,
    ) -> Result<Option<Case>>;

    /// Newest first
    async fn list_client_cases(&self, owner_id: Uuid, client_id: Uuid) -> Result<Vec<Case>>;

    async fn list_case_documents(&self, owner_id: Uuid, case_ids: &[Uuid]) -> Result<Vec<CaseDocument>>;

    async fn list_case_reminders(&self, owner_id: Uuid, case_ids: &[Uuid]) -> Result<Vec<CaseReminder>>;
}

/// Contact details a client supplies about themselves
#[derive(Debug, Clone, Default)]
pub struct ClientContact {
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub notes: Option<String>,
}

/// Intake writes made on behalf of a portal token holder.
/// Every call names both the owner and the client it writes for.
#[async_trait]
pub trait IntakeStore: Send + Sync {
    /// None if the client does not belong to `owner_id`
    async fn update_client_contact(
        &self,
        owner_id: Uuid,
        client_id: Uuid,
        contact: ClientContact,
    ) -> Result<Option<Client>>;

    async fn create_conversation(
        &self,
        owner_id: Uuid,
        client_id: Uuid,
        status: IntakeStatus,
        summary: Option<String>,
    ) -> Result<IntakeConversation>;

    /// None unless the conversation belongs to both `owner_id` and `client_id`
    async fn find_conversation(
        &self,
        owner_id: Uuid,
        client_id: Uuid,
        conversation_id: Uuid,
    ) -> Result<Option<IntakeConversation>>;

    async fn append_message(
        &self,
        conversation_id: Uuid,
        role: Role,
        content: String,
    ) -> Result<IntakeMessage>;

    /// Mark a conversation completed with its summary. None if out of scope.
    async fn complete_conversation(
        &self,
        owner_id: Uuid,
        client_id: Uuid,
        conversation_id: Uuid,
        summary: String,
    ) -> Result<Option<IntakeConversation>>;
}
