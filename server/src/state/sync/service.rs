use sea_orm::DatabaseConnection;

use crate::{
    db_core::prelude::email_account,
    email::{client::ProviderError, oauth::GmailOAuth},
    error::AppResult,
    model::{account::AccountCtrl, preferences::PreferencesCtrl},
    prompt::priority::{PriorityClassifier, VipLists},
    server_config::SyncConfig,
    util::check_expired,
};

use super::{
    pipeline::{SyncOutcome, SyncPipeline},
    store::DbSyncStore,
};

/// Everything a sync of one stored account needs.
pub struct AccountSyncer<'a> {
    pub conn: &'a DatabaseConnection,
    pub oauth: &'a GmailOAuth,
    pub classifier: &'a PriorityClassifier,
    pub config: &'a SyncConfig,
}

impl AccountSyncer<'_> {
    pub async fn sync(&self, account: email_account::Model) -> AppResult<SyncOutcome> {
        let account_id = account.id;
        let user_id = account.user_id;
        let access_token = self.fresh_access_token(account).await?;

        let vip = PreferencesCtrl::find(self.conn, user_id)
            .await?
            .map(|prefs| VipLists::from(&prefs))
            .unwrap_or_default();

        let client = self.oauth.client(access_token);
        let store = DbSyncStore::new(self.conn.clone());

        let outcome = SyncPipeline::new(&client, &store, self.classifier)
            .page_size(self.config.page_size)
            .concurrency(self.config.concurrency)
            .run(account_id, &vip)
            .await?;

        Ok(outcome)
    }

    /// The stored access token, refreshed and persisted first when it is
    /// about to expire.
    async fn fresh_access_token(&self, account: email_account::Model) -> AppResult<String> {
        let tokens = AccountCtrl::decrypt_tokens(&account)?;
        if !check_expired(account.token_expiry) {
            return Ok(tokens.access_token);
        }

        let Some(refresh_token) = tokens.refresh_token else {
            tracing::warn!("Account {} has no refresh token", account.id);
            return Err(ProviderError::Unauthorized.into());
        };

        tracing::info!("Refreshing access token for account {}", account.id);
        let grant = self.oauth.refresh(&refresh_token).await?;
        let access_token = grant.access_token.clone();
        AccountCtrl::update_tokens(self.conn, account, &grant).await?;

        Ok(access_token)
    }
}
