//! Client entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "clients")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Owning practitioner
    pub user_id: Uuid,

    #[sea_orm(column_type = "Text")]
    pub full_name: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub email: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub phone: Option<String>,

    #[sea_orm(column_type = "Text", nullable)]
    pub address: Option<String>,

    pub date_of_birth: Option<Date>,

    /// Free-form notes, also filled from the intake form
    #[sea_orm(column_type = "Text", nullable)]
    pub notes: Option<String>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::case::Entity")]
    Cases,

    #[sea_orm(has_many = "super::portal_access::Entity")]
    PortalAccess,

    #[sea_orm(has_many = "super::intake_conversation::Entity")]
    IntakeConversations,
}

impl Related<super::case::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Cases.def()
    }
}

impl Related<super::portal_access::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PortalAccess.def()
    }
}

impl Related<super::intake_conversation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::IntakeConversations.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
