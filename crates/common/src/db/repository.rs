//! Repository pattern for database operations
//!
//! Postgres-backed implementation of the storage traits. Every query that
//! touches owner data filters by owner id.

use crate::db::models::*;
use crate::db::store::{
    CaseStore, ClientContact, EntitlementStore, IntakeStore, NewCase, PortalStore,
};
use crate::db::DbPool;
use crate::entitlements::{EntitlementProfile, Tier};
use crate::errors::Result;
use crate::portal::PortalGrant;
use crate::relay::Role;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, DbBackend, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, Set, Statement,
};
use uuid::Uuid;

/// Repository for data access operations
#[derive(Clone)]
pub struct Repository {
    pool: DbPool,
}

impl Repository {
    /// Create a new repository with the given connection pool
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get the read connection
    fn read_conn(&self) -> &DatabaseConnection {
        self.pool.read()
    }

    /// Get the write connection
    fn write_conn(&self) -> &DatabaseConnection {
        self.pool.write()
    }

    // ========================================================================
    // Health Check
    // ========================================================================

    /// Ping the database
    pub async fn ping(&self) -> Result<()> {
        self.pool.ping().await
    }

    async fn find_profile_row(&self, owner_id: Uuid) -> Result<Option<Profile>> {
        ProfileEntity::find()
            .filter(ProfileColumn::UserId.eq(owner_id))
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }
}

// ========================================================================
// Profile Operations
// ========================================================================

#[async_trait]
impl EntitlementStore for Repository {
    async fn find_profile(&self, owner_id: Uuid) -> Result<Option<EntitlementProfile>> {
        Ok(self
            .find_profile_row(owner_id)
            .await?
            .map(|p| p.entitlement_profile()))
    }

    async fn count_open_cases(&self, owner_id: Uuid) -> Result<u64> {
        let open: Vec<String> = CaseStatus::OPEN.iter().map(|s| s.as_str().to_string()).collect();

        CaseEntity::find()
            .filter(CaseColumn::UserId.eq(owner_id))
            .filter(CaseColumn::Status.is_in(open))
            .count(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn set_tier(&self, owner_id: Uuid, tier: Tier) -> Result<EntitlementProfile> {
        let now = Utc::now();

        let existing = ProfileEntity::find()
            .filter(ProfileColumn::UserId.eq(owner_id))
            .one(self.write_conn())
            .await?;

        let profile = match existing {
            Some(row) => {
                let mut active: ProfileActiveModel = row.into();
                active.subscription_tier = Set(Some(tier.as_str().to_string()));
                active.updated_at = Set(now.into());
                active.update(self.write_conn()).await?
            }
            None => {
                ProfileActiveModel {
                    id: Set(Uuid::new_v4()),
                    user_id: Set(owner_id),
                    full_name: Set(None),
                    firm_name: Set(None),
                    email: Set(None),
                    subscription_tier: Set(Some(tier.as_str().to_string())),
                    trial_ends_at: Set(None),
                    created_at: Set(now.into()),
                    updated_at: Set(now.into()),
                }
                .insert(self.write_conn())
                .await?
            }
        };

        Ok(profile.entitlement_profile())
    }
}

// ========================================================================
// Portal Grant Operations
// ========================================================================

#[async_trait]
impl PortalStore for Repository {
    async fn find_active_grant(&self, token_hash: &str) -> Result<Option<PortalGrant>> {
        let row = PortalAccessEntity::find()
            .filter(PortalAccessColumn::AccessTokenHash.eq(token_hash))
            .filter(PortalAccessColumn::IsActive.eq(true))
            .one(self.read_conn())
            .await?;

        Ok(row.map(PortalGrant::from))
    }

    async fn insert_grant(&self, grant: &PortalGrant) -> Result<()> {
        PortalAccessActiveModel::from(grant)
            .insert(self.write_conn())
            .await?;
        Ok(())
    }

    async fn touch_grant(&self, grant_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            "UPDATE client_portal_access SET last_accessed_at = $1 WHERE id = $2",
            vec![at.into(), grant_id.into()],
        );

        self.write_conn().execute(stmt).await?;
        Ok(())
    }

    async fn deactivate_grant(&self, owner_id: Uuid, grant_id: Uuid) -> Result<bool> {
        let stmt = Statement::from_sql_and_values(
            DbBackend::Postgres,
            "UPDATE client_portal_access SET is_active = false WHERE id = $1 AND lawyer_user_id = $2",
            vec![grant_id.into(), owner_id.into()],
        );

        let result = self.write_conn().execute(stmt).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_grants(&self, owner_id: Uuid, client_id: Uuid) -> Result<Vec<PortalGrant>> {
        let rows = PortalAccessEntity::find()
            .filter(PortalAccessColumn::LawyerUserId.eq(owner_id))
            .filter(PortalAccessColumn::ClientId.eq(client_id))
            .order_by_desc(PortalAccessColumn::CreatedAt)
            .all(self.read_conn())
            .await?;

        Ok(rows.into_iter().map(PortalGrant::from).collect())
    }
}

// ========================================================================
// Case Operations
// ========================================================================

#[async_trait]
impl CaseStore for Repository {
    async fn find_client(&self, owner_id: Uuid, client_id: Uuid) -> Result<Option<Client>> {
        ClientEntity::find_by_id(client_id)
            .filter(ClientColumn::UserId.eq(owner_id))
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn find_case(&self, owner_id: Uuid, case_id: Uuid) -> Result<Option<Case>> {
        CaseEntity::find_by_id(case_id)
            .filter(CaseColumn::UserId.eq(owner_id))
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn create_case(&self, owner_id: Uuid, case: NewCase) -> Result<Case> {
        let now = Utc::now();

        let model = CaseActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(owner_id),
            client_id: Set(case.client_id),
            case_number: Set(case.case_number),
            title: Set(case.title),
            description: Set(case.description),
            status: Set(case.status.into()),
            priority: Set(case.priority),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        model.insert(self.write_conn()).await.map_err(Into::into)
    }

    async fn update_case_status(
        &self,
        owner_id: Uuid,
        case_id: Uuid,
        status: CaseStatus,
    ) -> Result<Option<Case>> {
        let Some(row) = CaseEntity::find_by_id(case_id)
            .filter(CaseColumn::UserId.eq(owner_id))
            .one(self.write_conn())
            .await?
        else {
            return Ok(None);
        };

        let mut case: CaseActiveModel = row.into();
        case.status = Set(status.into());
        case.updated_at = Set(Utc::now().into());

        Ok(Some(case.update(self.write_conn()).await?))
    }

    async fn list_client_cases(&self, owner_id: Uuid, client_id: Uuid) -> Result<Vec<Case>> {
        CaseEntity::find()
            .filter(CaseColumn::UserId.eq(owner_id))
            .filter(CaseColumn::ClientId.eq(client_id))
            .order_by_desc(CaseColumn::CreatedAt)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn list_case_documents(&self, owner_id: Uuid, case_ids: &[Uuid]) -> Result<Vec<CaseDocument>> {
        if case_ids.is_empty() {
            return Ok(Vec::new());
        }

        CaseDocumentEntity::find()
            .filter(CaseDocumentColumn::UserId.eq(owner_id))
            .filter(CaseDocumentColumn::CaseId.is_in(case_ids.to_vec()))
            .order_by_desc(CaseDocumentColumn::CreatedAt)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn list_case_reminders(&self, owner_id: Uuid, case_ids: &[Uuid]) -> Result<Vec<CaseReminder>> {
        if case_ids.is_empty() {
            return Ok(Vec::new());
        }

        CaseReminderEntity::find()
            .filter(CaseReminderColumn::UserId.eq(owner_id))
            .filter(CaseReminderColumn::CaseId.is_in(case_ids.to_vec()))
            .order_by_asc(CaseReminderColumn::DueDate)
            .all(self.read_conn())
            .await
            .map_err(Into::into)
    }
}

// ========================================================================
// Intake Operations
// ========================================================================

#[async_trait]
impl IntakeStore for Repository {
    async fn update_client_contact(
        &self,
        owner_id: Uuid,
        client_id: Uuid,
        contact: ClientContact,
    ) -> Result<Option<Client>> {
        let Some(row) = ClientEntity::find_by_id(client_id)
            .filter(ClientColumn::UserId.eq(owner_id))
            .one(self.write_conn())
            .await?
        else {
            return Ok(None);
        };

        let mut client: ClientActiveModel = row.into();
        client.full_name = Set(contact.full_name);
        client.email = Set(contact.email);
        client.phone = Set(contact.phone);
        client.address = Set(contact.address);
        client.date_of_birth = Set(contact.date_of_birth);
        client.notes = Set(contact.notes);
        client.updated_at = Set(Utc::now().into());

        Ok(Some(client.update(self.write_conn()).await?))
    }

    async fn create_conversation(
        &self,
        owner_id: Uuid,
        client_id: Uuid,
        status: IntakeStatus,
        summary: Option<String>,
    ) -> Result<IntakeConversation> {
        let now = Utc::now();

        let model = IntakeConversationActiveModel {
            id: Set(Uuid::new_v4()),
            user_id: Set(owner_id),
            client_id: Set(Some(client_id)),
            case_id: Set(None),
            status: Set(status.into()),
            summary: Set(summary),
            created_at: Set(now.into()),
            updated_at: Set(now.into()),
        };

        model.insert(self.write_conn()).await.map_err(Into::into)
    }

    async fn find_conversation(
        &self,
        owner_id: Uuid,
        client_id: Uuid,
        conversation_id: Uuid,
    ) -> Result<Option<IntakeConversation>> {
        IntakeConversationEntity::find_by_id(conversation_id)
            .filter(IntakeConversationColumn::UserId.eq(owner_id))
            .filter(IntakeConversationColumn::ClientId.eq(client_id))
            .one(self.read_conn())
            .await
            .map_err(Into::into)
    }

    async fn append_message(
        &self,
        conversation_id: Uuid,
        role: Role,
        content: String,
    ) -> Result<IntakeMessage> {
        let model = IntakeMessageActiveModel {
            id: Set(Uuid::new_v4()),
            conversation_id: Set(conversation_id),
            role: Set(role.as_str().to_string()),
            content: Set(content),
            created_at: Set(Utc::now().into()),
        };

        model.insert(self.write_conn()).await.map_err(Into::into)
    }

    async fn complete_conversation(
        &self,
        owner_id: Uuid,
        client_id: Uuid,
        conversation_id: Uuid,
        summary: String,
    ) -> Result<Option<IntakeConversation>> {
        let Some(row) = IntakeConversationEntity::find_by_id(conversation_id)
            .filter(IntakeConversationColumn::UserId.eq(owner_id))
            .filter(IntakeConversationColumn::ClientId.eq(client_id))
            .one(self.write_conn())
            .await?
        else {
            return Ok(None);
        };

        let mut conversation: IntakeConversationActiveModel = row.into();
        conversation.status = Set(IntakeStatus::Completed.into());
        conversation.summary = Set(Some(summary));
        conversation.updated_at = Set(Utc::now().into());

        Ok(Some(conversation.update(self.write_conn()).await?))
    }
}
