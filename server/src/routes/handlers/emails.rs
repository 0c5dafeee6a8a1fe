use axum::{extract::State, Json};
use sea_orm::DatabaseConnection;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    auth::jwt::Claims,
    error::{AppError, AppJsonResult, AppResult},
    model::{
        analysis::AnalysisCtrl,
        email::{EmailCtrl, EmailFilter, EmailWithAnalysis},
    },
    routes::extract::{AppJson, AppPath, AppQuery},
};

const DEFAULT_LIMIT: u64 = 50;
const MAX_LIMIT: u64 = 100;
const DEFAULT_THRESHOLD: i32 = 60;
const DEFAULT_PRIORITY_LIMIT: u64 = 20;
const MAX_PRIORITY_LIMIT: u64 = 50;

fn check_score(name: &str, value: Option<i32>) -> AppResult<Option<i32>> {
    match value {
        Some(v) if !(0..=100).contains(&v) => Err(AppError::BadRequest(format!(
            "{name} must be between 0 and 100"
        ))),
        _ => Ok(value),
    }
}

fn check_limit(value: Option<u64>, default: u64, max: u64) -> AppResult<u64> {
    match value.unwrap_or(default) {
        limit if (1..=max).contains(&limit) => Ok(limit),
        _ => Err(AppError::BadRequest(format!(
            "limit must be between 1 and {max}"
        ))),
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub min_priority: Option<i32>,
    pub max_priority: Option<i32>,
    pub is_read: Option<bool>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl ListQuery {
    fn into_filter(self) -> AppResult<EmailFilter> {
        Ok(EmailFilter {
            min_priority: check_score("min_priority", self.min_priority)?,
            max_priority: check_score("max_priority", self.max_priority)?,
            is_read: self.is_read,
            limit: check_limit(self.limit, DEFAULT_LIMIT, MAX_LIMIT)?,
            offset: self.offset.unwrap_or(0),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PriorityQuery {
    pub threshold: Option<i32>,
    pub limit: Option<u64>,
}

impl PriorityQuery {
    fn into_filter(self) -> AppResult<EmailFilter> {
        Ok(EmailFilter {
            min_priority: Some(
                check_score("threshold", self.threshold)?.unwrap_or(DEFAULT_THRESHOLD),
            ),
            limit: check_limit(self.limit, DEFAULT_PRIORITY_LIMIT, MAX_PRIORITY_LIMIT)?,
            ..Default::default()
        })
    }
}

pub async fn list_emails(
    claims: Claims,
    State(conn): State<DatabaseConnection>,
    AppQuery(query): AppQuery<ListQuery>,
) -> AppJsonResult<Vec<EmailWithAnalysis>> {
    let filter = query.into_filter()?;
    let emails = EmailCtrl::list_with_analysis(&conn, claims.user_id(), &filter).await?;
    Ok(Json(emails))
}

pub async fn priority_emails(
    claims: Claims,
    State(conn): State<DatabaseConnection>,
    AppQuery(query): AppQuery<PriorityQuery>,
) -> AppJsonResult<Vec<EmailWithAnalysis>> {
    let filter = query.into_filter()?;
    let emails = EmailCtrl::list_with_analysis(&conn, claims.user_id(), &filter).await?;
    Ok(Json(emails))
}

pub async fn get_email(
    claims: Claims,
    State(conn): State<DatabaseConnection>,
    AppPath(email_id): AppPath<Uuid>,
) -> AppJsonResult<EmailWithAnalysis> {
    let email = EmailCtrl::get_owned_with_analysis(&conn, claims.user_id(), email_id).await?;
    Ok(Json(email))
}

#[derive(Debug, Deserialize)]
pub struct FeedbackPayload {
    pub is_correct: bool,
    pub actual_priority: Option<i32>,
}

pub async fn submit_feedback(
    claims: Claims,
    State(conn): State<DatabaseConnection>,
    AppPath(email_id): AppPath<Uuid>,
    AppJson(payload): AppJson<FeedbackPayload>,
) -> AppJsonResult<Value> {
    let actual_priority = check_score("actual_priority", payload.actual_priority)?;

    if !EmailCtrl::owned_exists(&conn, claims.user_id(), email_id).await? {
        return Err(AppError::NotFound("Email not found".to_string()));
    }

    tracing::info!(
        "Priority feedback for {}: correct={} actual={:?}",
        email_id,
        payload.is_correct,
        actual_priority
    );

    if let Some(score) = actual_priority {
        AnalysisCtrl::update_score(&conn, email_id, score).await?;
    }

    Ok(Json(json!({ "message": "Feedback recorded" })))
}
