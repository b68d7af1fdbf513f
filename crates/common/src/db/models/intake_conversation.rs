//! Intake conversation entity
//!
//! One per intake session started from the client portal, either a chat
//! or a submitted form.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntakeStatus {
    Active,
    Completed,
}

impl IntakeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntakeStatus::Active => "active",
            IntakeStatus::Completed => "completed",
        }
    }
}

impl From<String> for IntakeStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "completed" => IntakeStatus::Completed,
            _ => IntakeStatus::Active,
        }
    }
}

impl From<IntakeStatus> for String {
    fn from(status: IntakeStatus) -> Self {
        status.as_str().to_string()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "intake_conversations")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Owning practitioner
    pub user_id: Uuid,

    pub client_id: Option<Uuid>,

    /// Set once the intake is turned into a case
    pub case_id: Option<Uuid>,

    #[sea_orm(column_type = "Text")]
    pub status: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub summary: Option<String>,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    pub fn intake_status(&self) -> IntakeStatus {
        IntakeStatus::from(self.status.clone())
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

    #[sea_orm(has_many = "super::intake_message::Entity")]
    Messages,
}

impl Related<super::client::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Client.def()
    }
}

impl Related<super::intake_message::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Messages.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
