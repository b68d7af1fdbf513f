//! Subscription tiers, derived limits and permission checks
//!
//! Provides:
//! - The closed `Tier` set and its fixed `Limits` table
//! - `EntitlementResolver`, which re-reads the owner's tier and open case
//!   count from the store on every check and fails closed on store errors
//! - `Entitlements`, an explicit per-request snapshot handed to callers

use crate::clock::Clock;
use crate::db::EntitlementStore;
use crate::errors::{AppError, EntitlementError};
use crate::metrics;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Subscription level of an owner
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    #[default]
    Solo,
    Professional,
    Firm,
}

impl Tier {
    /// Read a stored tier value. Missing or unrecognised values are solo.
    pub fn parse(raw: Option<&str>) -> Tier {
        match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
            Some("professional") => Tier::Professional,
            Some("firm") => Tier::Firm,
            _ => Tier::Solo,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Solo => "solo",
            Tier::Professional => "professional",
            Tier::Firm => "firm",
        }
    }

    /// Fixed capability table for this tier
    pub fn limits(&self) -> Limits {
        match self {
            Tier::Solo => Limits {
                max_active_cases: CaseQuota::Limited(25),
                has_advanced_drafting: false,
                has_priority_reminders: false,
                has_client_portal: false,
                has_multi_user_access: false,
                has_custom_templates: false,
            },
            Tier::Professional => Limits {
                max_active_cases: CaseQuota::Limited(100),
                has_advanced_drafting: true,
                has_priority_reminders: true,
                has_client_portal: true,
                has_multi_user_access: false,
                has_custom_templates: false,
            },
            Tier::Firm => Limits {
                max_active_cases: CaseQuota::Unbounded,
                has_advanced_drafting: true,
                has_priority_reminders: true,
                has_client_portal: true,
                has_multi_user_access: true,
                has_custom_templates: true,
            },
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Limits for a tier. Never stored, always recomputed.
pub fn resolve_limits(tier: Tier) -> Limits {
    tier.limits()
}

/// Ceiling on open cases
///
/// Serializes as a number, or `null` when unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum CaseQuota {
    Limited(u32),
    Unbounded,
}

impl CaseQuota {
    /// Whether one more case fits on top of `open_cases`
    pub fn admits(&self, open_cases: u64) -> bool {
        match self {
            CaseQuota::Limited(max) => open_cases < u64::from(*max),
            CaseQuota::Unbounded => true,
        }
    }
}

/// Capabilities and quotas derived from a tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Limits {
    pub max_active_cases: CaseQuota,
    pub has_advanced_drafting: bool,
    pub has_priority_reminders: bool,
    pub has_client_portal: bool,
    pub has_multi_user_access: bool,
    pub has_custom_templates: bool,
}

impl Limits {
    /// Feature flag backing a non-quota action; `None` for `CreateCase`
    pub fn feature(&self, action: Action) -> Option<bool> {
        match action {
            Action::CreateCase => None,
            Action::UseAdvancedDrafting => Some(self.has_advanced_drafting),
            Action::UsePriorityReminders => Some(self.has_priority_reminders),
            Action::UseClientPortal => Some(self.has_client_portal),
            Action::AddTeamMember => Some(self.has_multi_user_access),
            Action::UseCustomTemplate => Some(self.has_custom_templates),
        }
    }
}

/// Owner actions gated by entitlements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    CreateCase,
    UseAdvancedDrafting,
    UsePriorityReminders,
    UseClientPortal,
    AddTeamMember,
    UseCustomTemplate,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::CreateCase => "create_case",
            Action::UseAdvancedDrafting => "use_advanced_drafting",
            Action::UsePriorityReminders => "use_priority_reminders",
            Action::UseClientPortal => "use_client_portal",
            Action::AddTeamMember => "add_team_member",
            Action::UseCustomTemplate => "use_custom_template",
        }
    }

    /// Human-readable name of the limit this action runs into
    fn limit_description(&self, limits: &Limits) -> String {
        match self {
            Action::CreateCase => match limits.max_active_cases {
                CaseQuota::Limited(max) => format!("{} active cases", max),
                CaseQuota::Unbounded => "unlimited active cases".to_string(),
            },
            Action::UseAdvancedDrafting => "advanced AI drafting".to_string(),
            Action::UsePriorityReminders => "priority reminders".to_string(),
            Action::UseClientPortal => "client portal access".to_string(),
            Action::AddTeamMember => "multi-user access".to_string(),
            Action::UseCustomTemplate => "custom templates".to_string(),
        }
    }
}

/// Stored subscription state of an owner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitlementProfile {
    pub owner_id: Uuid,
    pub tier: Tier,
    pub trial_ends_at: Option<DateTime<Utc>>,
}

impl EntitlementProfile {
    /// Profile assumed for an owner whose row does not exist yet
    pub fn new_signup(owner_id: Uuid) -> Self {
        Self {
            owner_id,
            tier: Tier::Solo,
            trial_ends_at: None,
        }
    }
}

/// Everything known about an owner's entitlements at one instant
///
/// Built per request and passed explicitly to whatever needs it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entitlements {
    pub owner_id: Uuid,
    pub tier: Tier,
    pub limits: Limits,
    pub active_case_count: u64,
    pub can_create_case: bool,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub is_in_trial: bool,
}

impl Entitlements {
    pub fn allows(&self, action: Action) -> bool {
        match self.limits.feature(action) {
            Some(flag) => flag,
            None => self.can_create_case,
        }
    }
}

/// Trial status is advisory; it never changes what a tier allows.
pub fn is_in_trial(trial_ends_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
    matches!(trial_ends_at, Some(ends) if now < ends)
}

struct Decision {
    tier: Tier,
    limits: Limits,
    allowed: bool,
}

/// Answers "may this owner do X" against current store state
#[derive(Clone)]
pub struct EntitlementResolver {
    store: Arc<dyn EntitlementStore>,
    clock: Arc<dyn Clock>,
}

impl EntitlementResolver {
    pub fn new(store: Arc<dyn EntitlementStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    async fn profile(&self, owner_id: Uuid) -> Result<EntitlementProfile, EntitlementError> {
        let profile = self
            .store
            .find_profile(owner_id)
            .await
            .map_err(|e| unavailable(owner_id, e))?;

        Ok(profile.unwrap_or_else(|| EntitlementProfile::new_signup(owner_id)))
    }

    async fn open_cases(&self, owner_id: Uuid) -> Result<u64, EntitlementError> {
        self.store
            .count_open_cases(owner_id)
            .await
            .map_err(|e| unavailable(owner_id, e))
    }

    async fn decide(&self, owner_id: Uuid, action: Action) -> Result<Decision, EntitlementError> {
        let (tier, allowed, limits) = match action {
            Action::CreateCase => {
                let (profile, open) =
                    tokio::try_join!(self.profile(owner_id), self.open_cases(owner_id))?;
                let limits = resolve_limits(profile.tier);
                (profile.tier, limits.max_active_cases.admits(open), limits)
            }
            _ => {
                let profile = self.profile(owner_id).await?;
                let limits = resolve_limits(profile.tier);
                (profile.tier, limits.feature(action).unwrap_or(false), limits)
            }
        };

        metrics::record_entitlement_check(action.as_str(), allowed);
        debug!(
            owner_id = %owner_id,
            action = action.as_str(),
            tier = tier.as_str(),
            allowed,
            "Entitlement check"
        );

        Ok(Decision { tier, limits, allowed })
    }

    /// Limits of the owner's current tier
    pub async fn limits_for(&self, owner_id: Uuid) -> Result<Limits, EntitlementError> {
        Ok(resolve_limits(self.profile(owner_id).await?.tier))
    }

    /// Whether `action` is permitted right now. Store failures are errors,
    /// never an implicit allow.
    pub async fn can_perform(
        &self,
        owner_id: Uuid,
        action: Action,
    ) -> Result<bool, EntitlementError> {
        Ok(self.decide(owner_id, action).await?.allowed)
    }

    /// `can_perform` that turns a denial into an upgrade prompt
    pub async fn require(&self, owner_id: Uuid, action: Action) -> crate::errors::Result<()> {
        let decision = self.decide(owner_id, action).await?;
        if decision.allowed {
            return Ok(());
        }

        warn!(
            owner_id = %owner_id,
            action = action.as_str(),
            tier = decision.tier.as_str(),
            "Action denied by plan"
        );
        Err(AppError::UpgradeRequired {
            tier: decision.tier.to_string(),
            limit: action.limit_description(&decision.limits),
        })
    }

    pub async fn is_in_trial(&self, owner_id: Uuid) -> Result<bool, EntitlementError> {
        let profile = self.profile(owner_id).await?;
        Ok(is_in_trial(profile.trial_ends_at, self.clock.now()))
    }

    /// Full entitlement picture for one request
    pub async fn snapshot(&self, owner_id: Uuid) -> Result<Entitlements, EntitlementError> {
        let (profile, open) =
            tokio::try_join!(self.profile(owner_id), self.open_cases(owner_id))?;
        let limits = resolve_limits(profile.tier);

        Ok(Entitlements {
            owner_id,
            tier: profile.tier,
            limits,
            active_case_count: open,
            can_create_case: limits.max_active_cases.admits(open),
            trial_ends_at: profile.trial_ends_at,
            is_in_trial: is_in_trial(profile.trial_ends_at, self.clock.now()),
        })
    }

    /// Move the owner to `tier`. This is the only write to the profile tier.
    pub async fn upgrade_tier(
        &self,
        owner_id: Uuid,
        tier: Tier,
    ) -> crate::errors::Result<EntitlementProfile> {
        let profile = self.store.set_tier(owner_id, tier).await?;
        info!(owner_id = %owner_id, tier = tier.as_str(), "Subscription tier changed");
        Ok(profile)
    }
}

fn unavailable(owner_id: Uuid, err: AppError) -> EntitlementError {
    warn!(owner_id = %owner_id, error = %err, "Entitlement store read failed");
    EntitlementError::Unavailable {
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::db::models::CaseStatus;
    use crate::db::MemoryStore;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    fn resolver(store: &Arc<MemoryStore>) -> EntitlementResolver {
        EntitlementResolver::new(store.clone(), Arc::new(ManualClock::new(now())))
    }

    fn open_cases(store: &MemoryStore, owner: Uuid, n: usize) -> Vec<Uuid> {
        (0..n)
            .map(|i| {
                let status = CaseStatus::OPEN[i % CaseStatus::OPEN.len()];
                store.seed_case(owner, None, status).id
            })
            .collect()
    }

    #[test]
    fn test_tier_limits_table() {
        let solo = resolve_limits(Tier::Solo);
        assert_eq!(solo.max_active_cases, CaseQuota::Limited(25));
        assert!(!solo.has_advanced_drafting);
        assert!(!solo.has_client_portal);

        let pro = resolve_limits(Tier::Professional);
        assert_eq!(pro.max_active_cases, CaseQuota::Limited(100));
        assert!(pro.has_advanced_drafting && pro.has_priority_reminders && pro.has_client_portal);
        assert!(!pro.has_multi_user_access && !pro.has_custom_templates);

        let firm = resolve_limits(Tier::Firm);
        assert_eq!(firm.max_active_cases, CaseQuota::Unbounded);
        assert!(firm.has_multi_user_access && firm.has_custom_templates);
    }

    #[test]
    fn test_unknown_tier_is_solo() {
        assert_eq!(Tier::parse(None), Tier::Solo);
        assert_eq!(Tier::parse(Some("enterprise")), Tier::Solo);
        assert_eq!(Tier::parse(Some("")), Tier::Solo);
        assert_eq!(Tier::parse(Some(" Firm ")), Tier::Firm);
        assert_eq!(resolve_limits(Tier::parse(Some("gold"))), resolve_limits(Tier::Solo));
    }

    #[test]
    fn test_quota_serializes_unbounded_as_null() {
        let json = serde_json::to_value(resolve_limits(Tier::Firm)).unwrap();
        assert!(json["max_active_cases"].is_null());
        let json = serde_json::to_value(resolve_limits(Tier::Solo)).unwrap();
        assert_eq!(json["max_active_cases"], 25);
    }

    #[test]
    fn test_trial_is_strictly_before_end() {
        assert!(is_in_trial(Some(now() + Duration::days(1)), now()));
        assert!(!is_in_trial(Some(now()), now()));
        assert!(!is_in_trial(None, now()));
    }

    #[tokio::test]
    async fn test_quota_boundary_per_tier() {
        for (tier, max) in [(Tier::Solo, 25usize), (Tier::Professional, 100)] {
            let store = Arc::new(MemoryStore::new());
            let owner = Uuid::new_v4();
            store.seed_profile(owner, Some(tier.as_str()), None);
            let resolver = resolver(&store);

            open_cases(&store, owner, max - 1);
            assert!(resolver.can_perform(owner, Action::CreateCase).await.unwrap());

            open_cases(&store, owner, 1);
            assert!(!resolver.can_perform(owner, Action::CreateCase).await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_firm_is_never_capped() {
        let store = Arc::new(MemoryStore::new());
        let owner = Uuid::new_v4();
        store.seed_profile(owner, Some("firm"), None);
        open_cases(&store, owner, 250);

        assert!(resolver(&store).can_perform(owner, Action::CreateCase).await.unwrap());
    }

    #[tokio::test]
    async fn test_closing_a_case_frees_a_slot() {
        let store = Arc::new(MemoryStore::new());
        let owner = Uuid::new_v4();
        store.seed_profile(owner, Some("solo"), None);
        let cases = open_cases(&store, owner, 25);
        let resolver = resolver(&store);

        assert!(!resolver.can_perform(owner, Action::CreateCase).await.unwrap());

        store.set_case_status(cases[0], CaseStatus::Closed);
        assert!(resolver.can_perform(owner, Action::CreateCase).await.unwrap());
    }

    #[tokio::test]
    async fn test_only_owned_open_cases_count() {
        let store = Arc::new(MemoryStore::new());
        let owner = Uuid::new_v4();
        let other = Uuid::new_v4();
        open_cases(&store, other, 30);
        for _ in 0..5 {
            store.seed_case(owner, None, CaseStatus::Archived);
        }

        let snapshot = resolver(&store).snapshot(owner).await.unwrap();
        assert_eq!(snapshot.active_case_count, 0);
        assert!(snapshot.can_create_case);
    }

    #[tokio::test]
    async fn test_feature_flags_follow_tier() {
        let store = Arc::new(MemoryStore::new());
        let solo = Uuid::new_v4();
        let pro = Uuid::new_v4();
        store.seed_profile(pro, Some("professional"), None);
        let resolver = resolver(&store);

        assert!(!resolver.can_perform(solo, Action::UseClientPortal).await.unwrap());
        assert!(resolver.can_perform(pro, Action::UseClientPortal).await.unwrap());
        assert!(resolver.can_perform(pro, Action::UseAdvancedDrafting).await.unwrap());
        assert!(!resolver.can_perform(pro, Action::AddTeamMember).await.unwrap());
        assert!(!resolver.can_perform(pro, Action::UseCustomTemplate).await.unwrap());
    }

    #[tokio::test]
    async fn test_feature_checks_skip_case_count() {
        let store = Arc::new(MemoryStore::new());
        let owner = Uuid::new_v4();
        resolver(&store)
            .can_perform(owner, Action::UsePriorityReminders)
            .await
            .unwrap();
        assert_eq!(store.case_count_calls(), 0);
        assert_eq!(store.profile_reads(), 1);
    }

    #[tokio::test]
    async fn test_store_failure_fails_closed() {
        let store = Arc::new(MemoryStore::new());
        let owner = Uuid::new_v4();
        store.seed_profile(owner, Some("firm"), None);
        store.fail_reads(true);
        let resolver = resolver(&store);

        let err = resolver.can_perform(owner, Action::CreateCase).await.unwrap_err();
        assert!(matches!(err, EntitlementError::Unavailable { .. }));
        assert!(resolver.limits_for(owner).await.is_err());

        let err = resolver.require(owner, Action::UseClientPortal).await.unwrap_err();
        assert!(matches!(err, AppError::Entitlement(_)));
    }

    #[tokio::test]
    async fn test_require_names_tier_and_limit() {
        let store = Arc::new(MemoryStore::new());
        let owner = Uuid::new_v4();
        open_cases(&store, owner, 25);

        let err = resolver(&store)
            .require(owner, Action::CreateCase)
            .await
            .unwrap_err();
        match err {
            AppError::UpgradeRequired { tier, limit } => {
                assert_eq!(tier, "solo");
                assert_eq!(limit, "25 active cases");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_trial_does_not_unlock_features() {
        let store = Arc::new(MemoryStore::new());
        let owner = Uuid::new_v4();
        store.seed_profile(owner, None, Some(now() + Duration::days(14)));
        let resolver = resolver(&store);

        assert!(resolver.is_in_trial(owner).await.unwrap());
        assert!(!resolver.can_perform(owner, Action::UseClientPortal).await.unwrap());

        let snapshot = resolver.snapshot(owner).await.unwrap();
        assert!(snapshot.is_in_trial);
        assert_eq!(snapshot.tier, Tier::Solo);
    }

    #[tokio::test]
    async fn test_expired_trial_keeps_paid_tier() {
        let store = Arc::new(MemoryStore::new());
        let owner = Uuid::new_v4();
        store.seed_profile(owner, Some("professional"), Some(now() - Duration::days(1)));
        let resolver = resolver(&store);

        assert!(!resolver.is_in_trial(owner).await.unwrap());
        assert!(resolver.can_perform(owner, Action::UseClientPortal).await.unwrap());
    }

    #[tokio::test]
    async fn test_upgrade_creates_missing_profile() {
        let store = Arc::new(MemoryStore::new());
        let owner = Uuid::new_v4();
        let resolver = resolver(&store);

        let profile = resolver.upgrade_tier(owner, Tier::Professional).await.unwrap();
        assert_eq!(profile.tier, Tier::Professional);

        let snapshot = resolver.snapshot(owner).await.unwrap();
        assert!(snapshot.allows(Action::UseClientPortal));
        assert!(!snapshot.allows(Action::AddTeamMember));
    }
}
