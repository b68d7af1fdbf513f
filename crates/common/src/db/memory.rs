//! In-process store for tests
//!
//! Implements every storage trait over plain maps, counts the calls the
//! evaluators make, and can be told to fail reads or access touches.

use crate::db::models::{
    Case, CaseDocument, CaseReminder, CaseStatus, Client, IntakeConversation, IntakeMessage,
    IntakeStatus, Profile,
};
use crate::db::store::{
    CaseStore, ClientContact, EntitlementStore, IntakeStore, NewCase, PortalStore,
};
use crate::entitlements::{EntitlementProfile, Tier};
use crate::errors::{AppError, Result};
use crate::portal::PortalGrant;
use crate::relay::Role;
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    profiles: HashMap<Uuid, Profile>,
    clients: HashMap<Uuid, Client>,
    cases: HashMap<Uuid, Case>,
    documents: Vec<CaseDocument>,
    reminders: Vec<CaseReminder>,
    grants: HashMap<Uuid, PortalGrant>,
    conversations: HashMap<Uuid, IntakeConversation>,
    messages: Vec<IntakeMessage>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    seq: AtomicU64,
    fail_reads: AtomicBool,
    fail_touches: AtomicBool,
    profile_reads: AtomicUsize,
    case_count_calls: AtomicUsize,
    grant_lookups: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Strictly increasing timestamps so "newest first" is well defined
    fn stamp(&self) -> DateTime<Utc> {
        let n = self.seq.fetch_add(1, Ordering::SeqCst) as i64;
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().unwrap_or_default() + Duration::seconds(n)
    }

    fn read_guard(&self) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(AppError::DatabaseConnection {
                message: "injected read failure".to_string(),
            });
        }
        Ok(())
    }

    /// Make every read fail until switched off
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Make `touch_grant` fail until switched off
    pub fn fail_touches(&self, fail: bool) {
        self.fail_touches.store(fail, Ordering::SeqCst);
    }

    pub fn profile_reads(&self) -> usize {
        self.profile_reads.load(Ordering::SeqCst)
    }

    pub fn case_count_calls(&self) -> usize {
        self.case_count_calls.load(Ordering::SeqCst)
    }

    pub fn grant_lookups(&self) -> usize {
        self.grant_lookups.load(Ordering::SeqCst)
    }

    pub fn seed_profile(
        &self,
        owner_id: Uuid,
        tier: Option<&str>,
        trial_ends_at: Option<DateTime<Utc>>,
    ) -> Profile {
        let now = self.stamp();
        let profile = Profile {
            id: Uuid::new_v4(),
            user_id: owner_id,
            full_name: None,
            firm_name: None,
            email: None,
            subscription_tier: tier.map(str::to_string),
            trial_ends_at: trial_ends_at.map(Into::into),
            created_at: now.into(),
            updated_at: now.into(),
        };
        self.tables().profiles.insert(owner_id, profile.clone());
        profile
    }

    pub fn seed_client(&self, owner_id: Uuid, full_name: &str) -> Client {
        let now = self.stamp();
        let client = Client {
            id: Uuid::new_v4(),
            user_id: owner_id,
            full_name: full_name.to_string(),
            email: None,
            phone: None,
            address: None,
            date_of_birth: None,
            notes: None,
            created_at: now.into(),
            updated_at: now.into(),
        };
        self.tables().clients.insert(client.id, client.clone());
        client
    }

    pub fn seed_case(&self, owner_id: Uuid, client_id: Option<Uuid>, status: CaseStatus) -> Case {
        let now = self.stamp();
        let case = Case {
            id: Uuid::new_v4(),
            user_id: owner_id,
            client_id,
            case_number: None,
            title: format!("Matter {}", self.seq.load(Ordering::SeqCst)),
            description: None,
            status: status.into(),
            priority: "medium".to_string(),
            created_at: now.into(),
            updated_at: now.into(),
        };
        self.tables().cases.insert(case.id, case.clone());
        case
    }

    /// Change a case's status regardless of owner
    pub fn set_case_status(&self, case_id: Uuid, status: CaseStatus) {
        if let Some(case) = self.tables().cases.get_mut(&case_id) {
            case.status = status.into();
        }
    }

    pub fn seed_document(&self, owner_id: Uuid, case_id: Uuid) -> CaseDocument {
        let now = self.stamp();
        let document = CaseDocument {
            id: Uuid::new_v4(),
            case_id,
            user_id: owner_id,
            document_name: "Engagement letter".to_string(),
            document_type: Some("letter".to_string()),
            file_path: None,
            is_generated: true,
            status: "draft".to_string(),
            created_at: now.into(),
            updated_at: now.into(),
        };
        self.tables().documents.push(document.clone());
        document
    }

    pub fn seed_reminder(&self, owner_id: Uuid, case_id: Uuid) -> CaseReminder {
        let now = self.stamp();
        let reminder = CaseReminder {
            id: Uuid::new_v4(),
            case_id,
            user_id: owner_id,
            title: "File response".to_string(),
            description: None,
            due_date: (now + Duration::days(14)).into(),
            is_completed: false,
            reminder_type: "deadline".to_string(),
            created_at: now.into(),
        };
        self.tables().reminders.push(reminder.clone());
        reminder
    }

    /// Current stored state of a grant
    pub fn grant(&self, grant_id: Uuid) -> Option<PortalGrant> {
        self.tables().grants.get(&grant_id).cloned()
    }

    pub fn case(&self, case_id: Uuid) -> Option<Case> {
        self.tables().cases.get(&case_id).cloned()
    }

    pub fn client(&self, client_id: Uuid) -> Option<Client> {
        self.tables().clients.get(&client_id).cloned()
    }

    pub fn conversation(&self, conversation_id: Uuid) -> Option<IntakeConversation> {
        self.tables().conversations.get(&conversation_id).cloned()
    }

    /// Every intake conversation recorded for a client, any owner
    pub fn client_conversations(&self, client_id: Uuid) -> Vec<IntakeConversation> {
        let mut conversations: Vec<IntakeConversation> = self
            .tables()
            .conversations
            .values()
            .filter(|c| c.client_id == Some(client_id))
            .cloned()
            .collect();
        conversations.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        conversations
    }

    /// Messages of a conversation in the order they were written
    pub fn messages(&self, conversation_id: Uuid) -> Vec<IntakeMessage> {
        self.tables()
            .messages
            .iter()
            .filter(|m| m.conversation_id == conversation_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl EntitlementStore for MemoryStore {
    async fn find_profile(&self, owner_id: Uuid) -> Result<Option<EntitlementProfile>> {
        self.profile_reads.fetch_add(1, Ordering::SeqCst);
        self.read_guard()?;
        Ok(self.tables().profiles.get(&owner_id).map(Profile::entitlement_profile))
    }

    async fn count_open_cases(&self, owner_id: Uuid) -> Result<u64> {
        self.case_count_calls.fetch_add(1, Ordering::SeqCst);
        self.read_guard()?;
        let count = self
            .tables()
            .cases
            .values()
            .filter(|c| c.user_id == owner_id && c.case_status().is_open())
            .count();
        Ok(count as u64)
    }

    async fn set_tier(&self, owner_id: Uuid, tier: Tier) -> Result<EntitlementProfile> {
        let existing = self.tables().profiles.get(&owner_id).cloned();
        let mut profile = match existing {
            Some(profile) => profile,
            None => self.seed_profile(owner_id, None, None),
        };
        profile.subscription_tier = Some(tier.as_str().to_string());
        profile.updated_at = self.stamp().into();
        self.tables().profiles.insert(owner_id, profile.clone());
        Ok(profile.entitlement_profile())
    }
}

#[async_trait]
impl PortalStore for MemoryStore {
    async fn find_active_grant(&self, token_hash: &str) -> Result<Option<PortalGrant>> {
        self.grant_lookups.fetch_add(1, Ordering::SeqCst);
        self.read_guard()?;
        Ok(self
            .tables()
            .grants
            .values()
            .find(|g| g.is_active && g.token_hash == token_hash)
            .cloned())
    }

    async fn insert_grant(&self, grant: &PortalGrant) -> Result<()> {
        self.tables().grants.insert(grant.id, grant.clone());
        Ok(())
    }

    async fn touch_grant(&self, grant_id: Uuid, at: DateTime<Utc>) -> Result<()> {
        if self.fail_touches.load(Ordering::SeqCst) {
            return Err(AppError::DatabaseConnection {
                message: "injected touch failure".to_string(),
            });
        }
        if let Some(grant) = self.tables().grants.get_mut(&grant_id) {
            grant.last_accessed_at = Some(at);
        }
        Ok(())
    }

    async fn deactivate_grant(&self, owner_id: Uuid, grant_id: Uuid) -> Result<bool> {
        match self.tables().grants.get_mut(&grant_id) {
            Some(grant) if grant.owner_id == owner_id => {
                grant.is_active = false;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn list_grants(&self, owner_id: Uuid, client_id: Uuid) -> Result<Vec<PortalGrant>> {
        self.read_guard()?;
        let mut grants: Vec<PortalGrant> = self
            .tables()
            .grants
            .values()
            .filter(|g| g.owner_id == owner_id && g.client_id == client_id)
            .cloned()
            .collect();
        grants.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(grants)
    }
}

#[async_trait]
impl CaseStore for MemoryStore {
    async fn find_client(&self, owner_id: Uuid, client_id: Uuid) -> Result<Option<Client>> {
        self.read_guard()?;
        Ok(self
            .tables()
            .clients
            .get(&client_id)
            .filter(|c| c.user_id == owner_id)
            .cloned())
    }

    async fn find_case(&self, owner_id: Uuid, case_id: Uuid) -> Result<Option<Case>> {
        self.read_guard()?;
        Ok(self
            .tables()
            .cases
            .get(&case_id)
            .filter(|c| c.user_id == owner_id)
            .cloned())
    }

    async fn create_case(&self, owner_id: Uuid, case: NewCase) -> Result<Case> {
        let now = self.stamp();
        let created = Case {
            id: Uuid::new_v4(),
            user_id: owner_id,
            client_id: case.client_id,
            case_number: case.case_number,
            title: case.title,
            description: case.description,
            status: case.status.into(),
            priority: case.priority,
            created_at: now.into(),
            updated_at: now.into(),
        };
        self.tables().cases.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_case_status(
        &self,
        owner_id: Uuid,
        case_id: Uuid,
        status: CaseStatus,
    ) -> Result<Option<Case>> {
        let now = self.stamp();
        let mut tables = self.tables();
        match tables.cases.get_mut(&case_id) {
            Some(case) if case.user_id == owner_id => {
                case.status = status.into();
                case.updated_at = now.into();
                Ok(Some(case.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn list_client_cases(&self, owner_id: Uuid, client_id: Uuid) -> Result<Vec<Case>> {
        self.read_guard()?;
        let mut cases: Vec<Case> = self
            .tables()
            .cases
            .values()
            .filter(|c| c.user_id == owner_id && c.client_id == Some(client_id))
            .cloned()
            .collect();
        cases.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(cases)
    }

    async fn list_case_documents(&self, owner_id: Uuid, case_ids: &[Uuid]) -> Result<Vec<CaseDocument>> {
        self.read_guard()?;
        let mut documents: Vec<CaseDocument> = self
            .tables()
            .documents
            .iter()
            .filter(|d| d.user_id == owner_id && case_ids.contains(&d.case_id))
            .cloned()
            .collect();
        documents.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(documents)
    }

    async fn list_case_reminders(&self, owner_id: Uuid, case_ids: &[Uuid]) -> Result<Vec<CaseReminder>> {
        self.read_guard()?;
        let mut reminders: Vec<CaseReminder> = self
            .tables()
            .reminders
            .iter()
            .filter(|r| r.user_id == owner_id && case_ids.contains(&r.case_id))
            .cloned()
            .collect();
        reminders.sort_by(|a, b| a.due_date.cmp(&b.due_date));
        Ok(reminders)
    }
}

#[async_trait]
impl IntakeStore for MemoryStore {
    async fn update_client_contact(
        &self,
        owner_id: Uuid,
        client_id: Uuid,
        contact: ClientContact,
    ) -> Result<Option<Client>> {
        let now = self.stamp();
        let mut tables = self.tables();
        match tables.clients.get_mut(&client_id) {
            Some(client) if client.user_id == owner_id => {
                client.full_name = contact.full_name;
                client.email = contact.email;
                client.phone = contact.phone;
                client.address = contact.address;
                client.date_of_birth = contact.date_of_birth;
                client.notes = contact.notes;
                client.updated_at = now.into();
                Ok(Some(client.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn create_conversation(
        &self,
        owner_id: Uuid,
        client_id: Uuid,
        status: IntakeStatus,
        summary: Option<String>,
    ) -> Result<IntakeConversation> {
        let now = self.stamp();
        let conversation = IntakeConversation {
            id: Uuid::new_v4(),
            user_id: owner_id,
            client_id: Some(client_id),
            case_id: None,
            status: status.into(),
            summary,
            created_at: now.into(),
            updated_at: now.into(),
        };
        self.tables()
            .conversations
            .insert(conversation.id, conversation.clone());
        Ok(conversation)
    }

    async fn find_conversation(
        &self,
        owner_id: Uuid,
        client_id: Uuid,
        conversation_id: Uuid,
    ) -> Result<Option<IntakeConversation>> {
        self.read_guard()?;
        Ok(self
            .tables()
            .conversations
            .get(&conversation_id)
            .filter(|c| c.user_id == owner_id && c.client_id == Some(client_id))
            .cloned())
    }

    async fn append_message(
        &self,
        conversation_id: Uuid,
        role: Role,
        content: String,
    ) -> Result<IntakeMessage> {
        let message = IntakeMessage {
            id: Uuid::new_v4(),
            conversation_id,
            role: role.as_str().to_string(),
            content,
            created_at: self.stamp().into(),
        };
        self.tables().messages.push(message.clone());
        Ok(message)
    }

    async fn complete_conversation(
        &self,
        owner_id: Uuid,
        client_id: Uuid,
        conversation_id: Uuid,
        summary: String,
    ) -> Result<Option<IntakeConversation>> {
        let now = self.stamp();
        let mut tables = self.tables();
        match tables.conversations.get_mut(&conversation_id) {
            Some(c) if c.user_id == owner_id && c.client_id == Some(client_id) => {
                c.status = IntakeStatus::Completed.into();
                c.summary = Some(summary);
                c.updated_at = now.into();
                Ok(Some(c.clone()))
            }
            _ => Ok(None),
        }
    }
}
