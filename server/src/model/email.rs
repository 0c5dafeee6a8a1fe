use chrono::Utc;
use sea_orm::SelectTwo;
use serde::Serialize;

use crate::{
    db_core::prelude::*,
    email::parsed_message::ParsedMessage,
    error::{is_unique_violation, AppError, AppResult},
};

/// Listing filters. Priority bounds only match messages that have an analysis.
#[derive(Debug, Clone)]
pub struct EmailFilter {
    pub min_priority: Option<i32>,
    pub max_priority: Option<i32>,
    pub is_read: Option<bool>,
    pub limit: u64,
    pub offset: u64,
}

impl Default for EmailFilter {
    fn default() -> Self {
        Self {
            min_priority: None,
            max_priority: None,
            is_read: None,
            limit: 50,
            offset: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct EmailWithAnalysis {
    #[serde(flatten)]
    pub email: email::Model,
    pub analysis: Option<email_analysis::Model>,
}

impl From<(email::Model, Option<email_analysis::Model>)> for EmailWithAnalysis {
    fn from((email, analysis): (email::Model, Option<email_analysis::Model>)) -> Self {
        EmailWithAnalysis { email, analysis }
    }
}

pub struct EmailCtrl;

impl EmailCtrl {
    pub async fn exists(
        conn: &DatabaseConnection,
        account_id: Uuid,
        gmail_id: &str,
    ) -> AppResult<bool> {
        let count = Email::find()
            .filter(email::Column::AccountId.eq(account_id))
            .filter(email::Column::GmailId.eq(gmail_id))
            .count(conn)
            .await?;

        Ok(count > 0)
    }

    /// Stores a parsed message. Returns `None` when the (account, gmail id)
    /// pair was stored concurrently.
    pub async fn insert<C: ConnectionTrait>(
        conn: &C,
        parsed: &ParsedMessage,
    ) -> AppResult<Option<email::Model>> {
        let active_model = email::ActiveModel {
            id: ActiveValue::Set(Uuid::new_v4()),
            account_id: ActiveValue::Set(parsed.account_id),
            gmail_id: ActiveValue::Set(parsed.gmail_id.clone()),
            thread_id: ActiveValue::Set(parsed.thread_id.clone()),
            sender_email: ActiveValue::Set(parsed.sender_email.clone()),
            sender_name: ActiveValue::Set(parsed.sender_name.clone()),
            subject: ActiveValue::Set(parsed.subject.clone()),
            snippet: ActiveValue::Set(parsed.snippet.clone()),
            body_text: ActiveValue::Set(parsed.body_text.clone()),
            received_at: ActiveValue::Set(parsed.received_at.into()),
            is_read: ActiveValue::Set(parsed.is_read),
            labels: ActiveValue::Set(parsed.labels.clone()),
            created_at: ActiveValue::Set(Utc::now().into()),
        };

        match active_model.insert(conn).await {
            Ok(model) => Ok(Some(model)),
            Err(e) if is_unique_violation(&e) => {
                tracing::debug!(
                    "Email {} already stored for account {}",
                    parsed.gmail_id,
                    parsed.account_id
                );
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// The caller's messages across all their accounts, newest first.
    /// Filters run in the query so a page is never shrunk after the fact.
    pub async fn list_with_analysis(
        conn: &DatabaseConnection,
        user_id: Uuid,
        filter: &EmailFilter,
    ) -> AppResult<Vec<EmailWithAnalysis>> {
        let rows = Self::list_query(user_id, filter).all(conn).await?;

        Ok(rows.into_iter().map(EmailWithAnalysis::from).collect())
    }

    fn list_query(user_id: Uuid, filter: &EmailFilter) -> SelectTwo<Email, EmailAnalysis> {
        let mut query = Email::find()
            .find_also_related(EmailAnalysis)
            .join(JoinType::InnerJoin, email::Relation::EmailAccount.def())
            .filter(email_account::Column::UserId.eq(user_id));

        if let Some(min) = filter.min_priority {
            query = query.filter(email_analysis::Column::PriorityScore.gte(min));
        }
        if let Some(max) = filter.max_priority {
            query = query.filter(email_analysis::Column::PriorityScore.lte(max));
        }
        if let Some(is_read) = filter.is_read {
            query = query.filter(email::Column::IsRead.eq(is_read));
        }

        query
            .order_by_desc(email::Column::ReceivedAt)
            .order_by_asc(email::Column::Id)
            .limit(filter.limit)
            .offset(filter.offset)
    }

    pub async fn get_owned_with_analysis(
        conn: &DatabaseConnection,
        user_id: Uuid,
        email_id: Uuid,
    ) -> AppResult<EmailWithAnalysis> {
        Email::find_by_id(email_id)
            .find_also_related(EmailAnalysis)
            .join(JoinType::InnerJoin, email::Relation::EmailAccount.def())
            .filter(email_account::Column::UserId.eq(user_id))
            .one(conn)
            .await?
            .map(EmailWithAnalysis::from)
            .ok_or_else(|| AppError::NotFound("Email not found".to_string()))
    }

    pub async fn owned_exists(
        conn: &DatabaseConnection,
        user_id: Uuid,
        email_id: Uuid,
    ) -> AppResult<bool> {
        let count = Email::find_by_id(email_id)
            .join(JoinType::InnerJoin, email::Relation::EmailAccount.def())
            .filter(email_account::Column::UserId.eq(user_id))
            .count(conn)
            .await?;

        Ok(count > 0)
    }
}
