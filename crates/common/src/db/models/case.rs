//! Case entity

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Case lifecycle status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Intake,
    Active,
    Pending,
    Closed,
    Archived,
}

impl CaseStatus {
    /// Statuses that count toward the active-case quota
    pub const OPEN: [CaseStatus; 3] = [CaseStatus::Intake, CaseStatus::Active, CaseStatus::Pending];

    pub fn as_str(&self) -> &'static str {
        match self {
            CaseStatus::Intake => "intake",
            CaseStatus::Active => "active",
            CaseStatus::Pending => "pending",
            CaseStatus::Closed => "closed",
            CaseStatus::Archived => "archived",
        }
    }

    /// Whether a case in this status occupies a quota slot
    pub fn is_open(&self) -> bool {
        Self::OPEN.contains(self)
    }
}

impl From<String> for CaseStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "intake" => CaseStatus::Intake,
            "active" => CaseStatus::Active,
            "pending" => CaseStatus::Pending,
            "closed" => CaseStatus::Closed,
            "archived" => CaseStatus::Archived,
            _ => CaseStatus::Intake,
        }
    }
}

impl From<CaseStatus> for String {
    fn from(status: CaseStatus) -> Self {
        status.as_str().to_string()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "cases")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Owning practitioner
    pub user_id: Uuid,

    pub client_id: Option<Uuid>,

    #[sea_orm(column_type = "Text", nullable)]
    pub case_number: Option<String>,

    #[sea_orm(column_type = "Text")]
    pub title: String,

    #[sea_orm(column_type = "Text", nullable)]
    pub description: Option<String>,

    #[sea_orm(column_type = "Text")]
    pub status: String,

    #[sea_orm(column_type = "Text")]
    pub priority: String,

    pub created_at: DateTimeWithTimeZone,

    pub updated_at: DateTimeWithTimeZone,
}

impl Model {
    /// Get the case status as an enum
    pub fn case_status(&self) -> CaseStatus {
        CaseStatus::from(self.status.clone())
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

    #[sea_orm(has_many = "super::case_document::Entity")]
    Documents,

    #[sea_orm(has_many = "super::case_reminder::Entity")]
    Reminders,
}

impl Related<super::client::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Client.def()
    }
}

impl Related<super::case_document::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Documents.def()
    }
}

impl Related<super::case_reminder::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Reminders.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_statuses() {
        assert!(CaseStatus::Intake.is_open());
        assert!(CaseStatus::Active.is_open());
        assert!(CaseStatus::Pending.is_open());
        assert!(!CaseStatus::Closed.is_open());
        assert!(!CaseStatus::Archived.is_open());
    }

    #[test]
    fn test_status_string_conversion() {
        assert_eq!(CaseStatus::from("closed".to_string()), CaseStatus::Closed);
        assert_eq!(String::from(CaseStatus::Pending), "pending");
    }
}
