//! Owner profile entity

use crate::entitlements::{EntitlementProfile, Tier};
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "profiles")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Identity-provider user id of the owner
    #[sea_orm(unique)]
    pub user_id: Uuid,

    #[sea_orm(column_type = "Text", nullable)]
    pub full_name: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub firm_name: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub email: Option<String>,

    /// Raw tier string; absent or unrecognised values read as solo
    #[sea_orm(column_type = "Text", nullable)]
    pub subscription_tier: Option<String>,

    pub trial_ends_at: Option<DateTimeWithTimeZone>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    /// Entitlement view of this row
    pub fn entitlement_profile(&self) -> EntitlementProfile {
        EntitlementProfile {
            owner_id: self.user_id,
            tier: Tier::parse(self.subscription_tier.as_deref()),
            trial_ends_at: self.trial_ends_at.map(|t| t.with_timezone(&chrono::Utc)),
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
