use axum::{extract::State, Json};
use sea_orm::DatabaseConnection;
use serde::Deserialize;

use crate::{
    auth::jwt::Claims,
    db_core::prelude::user_preferences,
    error::{AppError, AppJsonResult},
    model::preferences::PreferencesCtrl,
    routes::extract::AppJson,
};

#[derive(Debug, Deserialize)]
pub struct PreferencesUpdate {
    pub vip_contacts: Option<Vec<String>>,
    pub vip_domains: Option<Vec<String>>,
}

pub async fn get_preferences(
    claims: Claims,
    State(conn): State<DatabaseConnection>,
) -> AppJsonResult<user_preferences::Model> {
    let prefs = PreferencesCtrl::get_or_create(&conn, claims.user_id()).await?;
    Ok(Json(prefs))
}

pub async fn update_preferences(
    claims: Claims,
    State(conn): State<DatabaseConnection>,
    AppJson(update): AppJson<PreferencesUpdate>,
) -> AppJsonResult<user_preferences::Model> {
    if update.vip_contacts.is_none() && update.vip_domains.is_none() {
        return Err(AppError::BadRequest("No fields to update".to_string()));
    }

    let prefs = PreferencesCtrl::update(
        &conn,
        claims.user_id(),
        update.vip_contacts,
        update.vip_domains,
    )
    .await?;

    Ok(Json(prefs))
}
