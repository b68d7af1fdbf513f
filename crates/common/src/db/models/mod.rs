//! SeaORM entity models
//!
//! Database entities for Casedesk

mod case;
mod case_document;
mod case_reminder;
mod client;
mod intake_conversation;
mod intake_message;
mod portal_access;
mod profile;

pub use profile::{
    Entity as ProfileEntity,
    Model as Profile,
    ActiveModel as ProfileActiveModel,
    Column as ProfileColumn,
};

pub use client::{
    Entity as ClientEntity,
    Model as Client,
    ActiveModel as ClientActiveModel,
    Column as ClientColumn,
};

pub use case::{
    Entity as CaseEntity,
    Model as Case,
    ActiveModel as CaseActiveModel,
    Column as CaseColumn,
    CaseStatus,
};

pub use case_document::{
    Entity as CaseDocumentEntity,
    Model as CaseDocument,
    ActiveModel as CaseDocumentActiveModel,
    Column as CaseDocumentColumn,
};

pub use case_reminder::{
    Entity as CaseReminderEntity,
    Model as CaseReminder,
    ActiveModel as CaseReminderActiveModel,
    Column as CaseReminderColumn,
};

pub use intake_conversation::{
    Entity as IntakeConversationEntity,
    Model as IntakeConversation,
    ActiveModel as IntakeConversationActiveModel,
    Column as IntakeConversationColumn,
    IntakeStatus,
};

pub use intake_message::{
    Entity as IntakeMessageEntity,
    Model as IntakeMessage,
    ActiveModel as IntakeMessageActiveModel,
    Column as IntakeMessageColumn,
};

pub use portal_access::{
    Entity as PortalAccessEntity,
    Model as PortalAccess,
    ActiveModel as PortalAccessActiveModel,
    Column as PortalAccessColumn,
};
