use axum::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{DatabaseConnection, TransactionTrait};
use uuid::Uuid;

use crate::{
    email::parsed_message::ParsedMessage,
    error::AppResult,
    model::{account::AccountCtrl, analysis::AnalysisCtrl, email::EmailCtrl},
    prompt::priority::PriorityAssessment,
};

/// Persistence the sync pipeline writes through.
#[async_trait]
pub trait SyncStore: Send + Sync {
    async fn email_exists(&self, account_id: Uuid, gmail_id: &str) -> AppResult<bool>;

    /// Stores the message together with its analysis, or neither.
    /// `None` when the dedup key is already taken.
    async fn insert_analyzed_email(
        &self,
        parsed: &ParsedMessage,
        assessment: &PriorityAssessment,
    ) -> AppResult<Option<Uuid>>;

    async fn mark_synced(&self, account_id: Uuid, synced_at: DateTime<Utc>) -> AppResult<()>;
}

pub struct DbSyncStore {
    conn: DatabaseConnection,
}

impl DbSyncStore {
    pub fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl SyncStore for DbSyncStore {
    async fn email_exists(&self, account_id: Uuid, gmail_id: &str) -> AppResult<bool> {
        EmailCtrl::exists(&self.conn, account_id, gmail_id).await
    }

    async fn insert_analyzed_email(
        &self,
        parsed: &ParsedMessage,
        assessment: &PriorityAssessment,
    ) -> AppResult<Option<Uuid>> {
        let txn = self.conn.begin().await?;

        let Some(email) = EmailCtrl::insert(&txn, parsed).await? else {
            txn.rollback().await?;
            return Ok(None);
        };
        // dropping the transaction on error rolls the message back
        AnalysisCtrl::insert(&txn, email.id, assessment).await?;
        txn.commit().await?;

        Ok(Some(email.id))
    }

    async fn mark_synced(&self, account_id: Uuid, synced_at: DateTime<Utc>) -> AppResult<()> {
        AccountCtrl::mark_synced(&self.conn, account_id, synced_at.into()).await
    }
}
