use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One synced message. Unique on (account_id, gmail_id).
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "email")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub account_id: Uuid,
    pub gmail_id: String,
    pub thread_id: String,
    pub sender_email: String,
    pub sender_name: Option<String>,
    pub subject: String,
    pub snippet: String,
    #[sea_orm(column_type = "Text", nullable)]
    pub body_text: Option<String>,
    pub received_at: DateTimeWithTimeZone,
    pub is_read: bool,
    pub labels: Vec<String>,
    pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::email_account::Entity",
        from = "Column::AccountId",
        to = "super::email_account::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    EmailAccount,
    #[sea_orm(has_one = "super::email_analysis::Entity")]
    EmailAnalysis,
}

impl Related<super::email_account::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::EmailAccount.def()
    }
}

impl Related<super::email_analysis::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::EmailAnalysis.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
