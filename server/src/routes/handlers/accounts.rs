use axum::{
    extract::State,
    response::{IntoResponse, Redirect, Response},
    Json,
};
use derive_more::derive::Display;
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{
    auth::{jwt::Claims, oauth_state::OAuthStateStore},
    db_core::prelude::{email_account, DateTimeWithTimeZone},
    email::oauth::GmailOAuth,
    error::{AppError, AppJsonResult},
    model::account::AccountCtrl,
    routes::extract::{AppPath, AppQuery},
    server_config::cfg,
    state::sync::{AccountSyncer, SyncOutcome},
    util::truncate_chars,
    ServerState,
};

const CALLBACK_ERROR_CHARS: usize = 100;

#[derive(Debug, Serialize)]
pub struct AccountSummary {
    pub id: Uuid,
    pub user_id: Uuid,
    pub email_address: String,
    pub last_sync_at: Option<DateTimeWithTimeZone>,
    pub created_at: DateTimeWithTimeZone,
}

impl From<email_account::Model> for AccountSummary {
    fn from(account: email_account::Model) -> Self {
        AccountSummary {
            id: account.id,
            user_id: account.user_id,
            email_address: account.email_address,
            last_sync_at: account.last_sync_at,
            created_at: account.created_at,
        }
    }
}

pub async fn list_accounts(
    claims: Claims,
    State(conn): State<DatabaseConnection>,
) -> AppJsonResult<Vec<AccountSummary>> {
    let accounts = AccountCtrl::list_by_user(&conn, claims.user_id()).await?;
    Ok(Json(accounts.into_iter().map(AccountSummary::from).collect()))
}

#[derive(Debug, Serialize)]
pub struct ConnectResponse {
    pub auth_url: String,
}

pub async fn connect(
    claims: Claims,
    State(oauth_states): State<OAuthStateStore>,
    State(gmail_oauth): State<GmailOAuth>,
) -> AppJsonResult<ConnectResponse> {
    let state = oauth_states.issue(claims.user_id());
    let auth_url = gmail_oauth
        .authorization_url(&state)
        .map_err(|e| AppError::Internal(e.into()))?;

    Ok(Json(ConnectResponse {
        auth_url: auth_url.to_string(),
    }))
}

#[derive(Deserialize, Debug)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Display)]
pub enum AuthCallbackError {
    #[display("Invalid or expired OAuth state")]
    InvalidState,
    #[display("{_0}")]
    Denied(String),
    #[display("Missing authorization code")]
    MissingCode,
    #[display("Gmail profile has no email address")]
    NoEmailAddress,
    #[display("{_0}")]
    Unexpected(String),
}

type CallbackResult<T> = Result<T, AuthCallbackError>;

impl IntoResponse for AuthCallbackError {
    fn into_response(self) -> Response {
        if let AuthCallbackError::InvalidState = self {
            return AppError::BadRequest(self.to_string()).into_response();
        }

        let message = self.to_string();
        let mut url = cfg.frontend.dashboard_url();
        url.query_pairs_mut()
            .append_pair("error", truncate_chars(&message, CALLBACK_ERROR_CHARS));

        Redirect::to(url.as_str()).into_response()
    }
}

/// Completes the connect handshake. Only an unknown state is answered
/// directly; every later failure goes back to the dashboard as `?error=`.
pub async fn callback(
    State(state): State<ServerState>,
    AppQuery(query): AppQuery<CallbackQuery>,
) -> CallbackResult<Redirect> {
    let user_id = query
        .state
        .as_deref()
        .and_then(|s| state.oauth_states.take(s))
        .ok_or(AuthCallbackError::InvalidState)?;

    if let Some(err) = query.error {
        tracing::warn!("Gmail consent failed for user {}: {}", user_id, err);
        return Err(AuthCallbackError::Denied(err));
    }
    let code = query.code.ok_or(AuthCallbackError::MissingCode)?;

    let grant = state.gmail_oauth.exchange_code(&code).await.map_err(|e| {
        tracing::error!("Error exchanging code: {:?}", e);
        AuthCallbackError::Unexpected(e.to_string())
    })?;

    let profile = state
        .gmail_oauth
        .client(grant.access_token.clone())
        .get_profile()
        .await
        .map_err(|e| {
            tracing::error!("Error getting profile: {:?}", e);
            AuthCallbackError::Unexpected(e.to_string())
        })?;
    let email_address = profile
        .email_address
        .ok_or(AuthCallbackError::NoEmailAddress)?;

    let account = AccountCtrl::upsert_from_grant(&state.conn, user_id, &email_address, &grant)
        .await
        .map_err(|e| {
            tracing::error!("Error storing account {}: {:?}", email_address, e);
            AuthCallbackError::Unexpected(e.to_string())
        })?;
    tracing::info!("Connected account {} for user {}", account.id, user_id);

    let mut url = cfg.frontend.dashboard_url();
    url.query_pairs_mut().append_pair("connected", "true");

    Ok(Redirect::to(url.as_str()))
}

pub async fn sync_account(
    claims: Claims,
    State(state): State<ServerState>,
    AppPath(account_id): AppPath<Uuid>,
) -> AppJsonResult<SyncOutcome> {
    let account = AccountCtrl::get_owned(&state.conn, claims.user_id(), account_id).await?;

    let syncer = AccountSyncer {
        conn: &state.conn,
        oauth: &state.gmail_oauth,
        classifier: &state.classifier,
        config: &cfg.sync,
    };
    let outcome = syncer.sync(account).await?;

    Ok(Json(outcome))
}

pub async fn disconnect(
    claims: Claims,
    State(conn): State<DatabaseConnection>,
    AppPath(account_id): AppPath<Uuid>,
) -> AppJsonResult<Value> {
    AccountCtrl::delete_owned(&conn, claims.user_id(), account_id).await?;
    tracing::info!("Account {} disconnected", account_id);

    Ok(Json(json!({ "message": "Account disconnected successfully" })))
}
