//! Client portal access entity

use crate::portal::PortalGrant;
use chrono::Utc;
use sea_orm::entity::prelude::*;
use sea_orm::Set;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "client_portal_access")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub client_id: Uuid,

    /// Owner who issued the grant
    pub lawyer_user_id: Uuid,

    /// SHA-256 hex digest of the bearer token
    #[sea_orm(column_type = "Text", unique)]
    #[serde(skip_serializing)]
    pub access_token_hash: String,

    #[sea_orm(column_type = "Text")]
    pub email: String,

    pub is_active: bool,

    pub created_at: DateTimeWithTimeZone,

    pub expires_at: Option<DateTimeWithTimeZone>,

    pub last_accessed_at: Option<DateTimeWithTimeZone>,
}

impl From<Model> for PortalGrant {
    fn from(row: Model) -> Self {
        PortalGrant {
            id: row.id,
            client_id: row.client_id,
            owner_id: row.lawyer_user_id,
            token_hash: row.access_token_hash,
            email: row.email,
            is_active: row.is_active,
            created_at: row.created_at.with_timezone(&Utc),
            expires_at: row.expires_at.map(|t| t.with_timezone(&Utc)),
            last_accessed_at: row.last_accessed_at.map(|t| t.with_timezone(&Utc)),
        }
    }
}

impl From<&PortalGrant> for ActiveModel {
    fn from(grant: &PortalGrant) -> Self {
        ActiveModel {
            id: Set(grant.id),
            client_id: Set(grant.client_id),
            lawyer_user_id: Set(grant.owner_id),
            access_token_hash: Set(grant.token_hash.clone()),
            email: Set(grant.email.clone()),
            is_active: Set(grant.is_active),
            created_at: Set(grant.created_at.into()),
            expires_at: Set(grant.expires_at.map(Into::into)),
            last_accessed_at: Set(grant.last_accessed_at.map(Into::into)),
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::client::Entity",
        from = "Column::ClientId",
        to = "super::client::Column::Id"
    )]
    Client,
}

impl Related<super::client::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Client.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
