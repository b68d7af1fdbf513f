//! Client portal grants
//!
//! A grant hands an unauthenticated visitor read access to exactly one
//! client of exactly one owner, for a bounded time. Provides:
//! - Token generation and hashing (only the SHA-256 digest is stored)
//! - `PortalTokenGate`: issue, validate, deactivate and list grants
//! - `ScopedGrant`: the validated (owner, client) pair, used to re-check
//!   every row before it leaves the service

use crate::clock::{expires_after, is_past, Clock};
use crate::db::models::{Case, CaseDocument, CaseReminder, IntakeConversation};
use crate::db::PortalStore;
use crate::errors::{AccessError, AppError, Result};
use crate::metrics;
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Longest lifetime a grant may be issued with
pub const MAX_GRANT_TTL_DAYS: u32 = 365;

/// Generate a bearer token from `bytes` bytes of OS randomness, hex encoded
pub fn generate_token(bytes: usize) -> String {
    let mut buf = vec![0u8; bytes];
    rand::rngs::OsRng.fill_bytes(&mut buf);
    hex::encode(buf)
}

/// Hash a token for storage and lookup
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

fn digest_matches(expected: &str, candidate: &str) -> bool {
    expected.as_bytes().ct_eq(candidate.as_bytes()).into()
}

/// Which workflow a portal link opens
///
/// Carried in the link for routing only; it is never an access-control input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PortalMode {
    Form,
    Chat,
    #[default]
    View,
}

impl PortalMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            PortalMode::Form => "form",
            PortalMode::Chat => "chat",
            PortalMode::View => "view",
        }
    }
}

/// Build the link handed to the client out of band
pub fn portal_link(base_url: &str, token: &str, mode: Option<PortalMode>) -> String {
    let mut link = format!("{}/client-portal?token={}", base_url.trim_end_matches('/'), token);
    if let Some(mode) = mode {
        link.push_str("&type=");
        link.push_str(mode.as_str());
    }
    link
}

/// Stored portal grant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalGrant {
    pub id: Uuid,
    pub client_id: Uuid,
    pub owner_id: Uuid,
    pub token_hash: String,
    pub email: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_accessed_at: Option<DateTime<Utc>>,
}

/// Lifecycle state of a grant at a given instant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantStatus {
    Active,
    Expired,
    Deactivated,
}

impl PortalGrant {
    pub fn status(&self, now: DateTime<Utc>) -> GrantStatus {
        if !self.is_active {
            GrantStatus::Deactivated
        } else if is_past(self.expires_at, now) {
            GrantStatus::Expired
        } else {
            GrantStatus::Active
        }
    }

    /// Owner-facing view of this grant as of `now`
    pub fn summary(&self, now: DateTime<Utc>) -> GrantSummary {
        GrantSummary {
            id: self.id,
            client_id: self.client_id,
            email: self.email.clone(),
            status: self.status(now),
            created_at: self.created_at,
            expires_at: self.expires_at,
            last_accessed_at: self.last_accessed_at,
        }
    }
}

/// A freshly issued grant together with its one-time cleartext token
#[derive(Debug, Clone)]
pub struct IssuedGrant {
    pub grant: PortalGrant,
    pub token: String,
}

/// Grant metadata shown to the owner. Never carries the token.
#[derive(Debug, Clone, Serialize)]
pub struct GrantSummary {
    pub id: Uuid,
    pub client_id: Uuid,
    pub email: String,
    pub status: GrantStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub last_accessed_at: Option<DateTime<Utc>>,
}

/// The (owner, client) pair a validated token may read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopedGrant {
    owner_id: Uuid,
    client_id: Uuid,
}

/// Rows that belong to an owner and, optionally, a client
pub trait ClientScoped {
    fn owner_id(&self) -> Uuid;
    fn client_id(&self) -> Option<Uuid>;
}

/// Rows that hang off a case
pub trait CaseScoped {
    fn owner_id(&self) -> Uuid;
    fn case_id(&self) -> Uuid;
}

impl ClientScoped for Case {
    fn owner_id(&self) -> Uuid {
        self.user_id
    }

    fn client_id(&self) -> Option<Uuid> {
        self.client_id
    }
}

impl ClientScoped for IntakeConversation {
    fn owner_id(&self) -> Uuid {
        self.user_id
    }

    fn client_id(&self) -> Option<Uuid> {
        self.client_id
    }
}

impl CaseScoped for CaseDocument {
    fn owner_id(&self) -> Uuid {
        self.user_id
    }

    fn case_id(&self) -> Uuid {
        self.case_id
    }
}

impl CaseScoped for CaseReminder {
    fn owner_id(&self) -> Uuid {
        self.user_id
    }

    fn case_id(&self) -> Uuid {
        self.case_id
    }
}

impl ScopedGrant {
    pub fn owner_id(&self) -> Uuid {
        self.owner_id
    }

    pub fn client_id(&self) -> Uuid {
        self.client_id
    }

    /// Both ids must match exactly
    pub fn authorize_read(&self, resource_owner_id: Uuid, resource_client_id: Uuid) -> bool {
        self.owner_id == resource_owner_id && self.client_id == resource_client_id
    }

    /// Whether one row falls inside this grant. Rows with no client never do.
    pub fn authorize<T: ClientScoped>(&self, row: &T) -> bool {
        match row.client_id() {
            Some(client_id) => self.authorize_read(row.owner_id(), client_id),
            None => false,
        }
    }

    /// Drop every row outside this grant's scope
    pub fn filter_authorized<T: ClientScoped>(&self, rows: Vec<T>) -> Vec<T> {
        let before = rows.len();
        let kept: Vec<T> = rows.into_iter().filter(|row| self.authorize(row)).collect();

        if kept.len() != before {
            warn!(
                owner_id = %self.owner_id,
                client_id = %self.client_id,
                dropped = before - kept.len(),
                "Out-of-scope rows removed from portal result"
            );
        }
        kept
    }

    /// Drop case-owned rows whose case is not among `authorized_cases`
    ///
    /// `authorized_cases` must already have passed `filter_authorized`.
    pub fn filter_case_rows<T: CaseScoped>(&self, rows: Vec<T>, authorized_cases: &[Case]) -> Vec<T> {
        let case_ids: HashSet<Uuid> = authorized_cases
            .iter()
            .filter(|c| c.client_id.is_some_and(|client| self.authorize_read(c.user_id, client)))
            .map(|c| c.id)
            .collect();

        rows.into_iter()
            .filter(|row| row.owner_id() == self.owner_id && case_ids.contains(&row.case_id()))
            .collect()
    }
}

/// Issuance parameters
#[derive(Debug, Clone, Copy)]
pub struct GrantSettings {
    pub ttl_days: u32,
    pub token_bytes: usize,
}

impl Default for GrantSettings {
    fn default() -> Self {
        Self {
            ttl_days: 30,
            token_bytes: 32,
        }
    }
}

impl From<&crate::config::PortalConfig> for GrantSettings {
    fn from(config: &crate::config::PortalConfig) -> Self {
        Self {
            ttl_days: config.grant_ttl_days,
            token_bytes: config.token_bytes.max(32),
        }
    }
}

/// Resolves bearer tokens into scoped grants
#[derive(Clone)]
pub struct PortalTokenGate {
    store: Arc<dyn PortalStore>,
    clock: Arc<dyn Clock>,
    settings: GrantSettings,
}

impl PortalTokenGate {
    pub fn new(store: Arc<dyn PortalStore>, clock: Arc<dyn Clock>, settings: GrantSettings) -> Self {
        Self {
            store,
            clock,
            settings,
        }
    }

    /// Validate a presented token
    ///
    /// An empty token is rejected before the store is touched. Expiry is
    /// computed here and never written back.
    pub async fn validate(&self, token: &str) -> std::result::Result<ScopedGrant, AccessError> {
        let outcome = self.check(token).await;
        metrics::record_portal_validation(match &outcome {
            Ok(_) => "granted",
            Err(AccessError::Missing) => "missing",
            Err(AccessError::InvalidOrRevoked) => "invalid",
            Err(AccessError::Expired) => "expired",
            Err(AccessError::Unavailable) => "unavailable",
        });
        outcome
    }

    async fn check(&self, token: &str) -> std::result::Result<ScopedGrant, AccessError> {
        if token.trim().is_empty() {
            return Err(AccessError::Missing);
        }

        let token_hash = hash_token(token);
        let grant = self
            .store
            .find_active_grant(&token_hash)
            .await
            .map_err(|e| {
                warn!(error = %e, "Portal grant lookup failed");
                AccessError::Unavailable
            })?
            .ok_or(AccessError::InvalidOrRevoked)?;

        if !grant.is_active || !digest_matches(&grant.token_hash, &token_hash) {
            return Err(AccessError::InvalidOrRevoked);
        }

        let now = self.clock.now();
        if is_past(grant.expires_at, now) {
            debug!(grant_id = %grant.id, "Portal grant expired");
            return Err(AccessError::Expired);
        }

        self.touch(grant.id, now);

        Ok(ScopedGrant {
            owner_id: grant.owner_id,
            client_id: grant.client_id,
        })
    }

    /// Record the access without holding up the caller
    fn touch(&self, grant_id: Uuid, at: DateTime<Utc>) {
        let store = self.store.clone();
        tokio::spawn(async move {
            if let Err(e) = store.touch_grant(grant_id, at).await {
                warn!(grant_id = %grant_id, error = %e, "Failed to record portal access");
            }
        });
    }

    /// Create a grant for `client_id`. The returned token is the only copy.
    ///
    /// Callers are expected to have checked the owner's plan and that the
    /// client belongs to the owner.
    pub async fn issue(
        &self,
        owner_id: Uuid,
        client_id: Uuid,
        email: &str,
        ttl_days: Option<u32>,
    ) -> Result<IssuedGrant> {
        let ttl_days = ttl_days.unwrap_or(self.settings.ttl_days);
        if !(1..=MAX_GRANT_TTL_DAYS).contains(&ttl_days) {
            return Err(AppError::Validation {
                message: format!(
                    "Grant lifetime must be between 1 and {} days",
                    MAX_GRANT_TTL_DAYS
                ),
                field: Some("ttl_days".to_string()),
            });
        }

        let token = generate_token(self.settings.token_bytes);
        let now = self.clock.now();
        let grant = PortalGrant {
            id: Uuid::new_v4(),
            client_id,
            owner_id,
            token_hash: hash_token(&token),
            email: email.trim().to_lowercase(),
            is_active: true,
            created_at: now,
            expires_at: Some(expires_after(now, ttl_days)),
            last_accessed_at: None,
        };

        self.store.insert_grant(&grant).await?;
        metrics::record_grant_issued();
        info!(
            grant_id = %grant.id,
            owner_id = %owner_id,
            client_id = %client_id,
            ttl_days,
            "Portal grant issued"
        );

        Ok(IssuedGrant { grant, token })
    }

    /// Revoke a grant. There is no way back.
    pub async fn deactivate(&self, owner_id: Uuid, grant_id: Uuid) -> Result<()> {
        if !self.store.deactivate_grant(owner_id, grant_id).await? {
            return Err(AppError::GrantNotFound {
                id: grant_id.to_string(),
            });
        }
        info!(grant_id = %grant_id, owner_id = %owner_id, "Portal grant deactivated");
        Ok(())
    }

    /// Grants an owner has issued for one client
    pub async fn list_grants(&self, owner_id: Uuid, client_id: Uuid) -> Result<Vec<GrantSummary>> {
        let now = self.clock.now();
        let grants = self.store.list_grants(owner_id, client_id).await?;

        Ok(grants.iter().map(|g| g.summary(now)).collect())
    }
}
