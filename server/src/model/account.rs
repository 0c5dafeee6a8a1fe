use anyhow::Context;
use chrono::Utc;
use lib_utils::crypt;

use crate::{
    db_core::prelude::*,
    email::oauth::TokenGrant,
    error::{AppError, AppResult},
};

/// Decrypted credentials of one account.
pub struct AccountTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

pub struct AccountCtrl;

impl AccountCtrl {
    pub async fn list_by_user(
        conn: &DatabaseConnection,
        user_id: Uuid,
    ) -> AppResult<Vec<email_account::Model>> {
        let accounts = EmailAccount::find()
            .filter(email_account::Column::UserId.eq(user_id))
            .order_by_asc(email_account::Column::CreatedAt)
            .all(conn)
            .await?;

        Ok(accounts)
    }

    pub async fn all(conn: &DatabaseConnection) -> AppResult<Vec<email_account::Model>> {
        let accounts = EmailAccount::find()
            .order_by_asc(email_account::Column::CreatedAt)
            .all(conn)
            .await?;

        Ok(accounts)
    }

    /// The account, if it exists and belongs to `user_id`.
    pub async fn get_owned(
        conn: &DatabaseConnection,
        user_id: Uuid,
        account_id: Uuid,
    ) -> AppResult<email_account::Model> {
        EmailAccount::find_by_id(account_id)
            .filter(email_account::Column::UserId.eq(user_id))
            .one(conn)
            .await?
            .ok_or_else(|| AppError::NotFound("Account not found".to_string()))
    }

    /// Creates the account or refreshes the tokens of an existing
    /// (user, address) pair. A reconnect without a new refresh token keeps the stored one.
    pub async fn upsert_from_grant(
        conn: &DatabaseConnection,
        user_id: Uuid,
        email_address: &str,
        grant: &TokenGrant,
    ) -> AppResult<email_account::Model> {
        let now: DateTimeWithTimeZone = Utc::now().into();
        let refresh_token = grant
            .refresh_token
            .as_deref()
            .map(crypt::encrypt)
            .transpose()?;

        let mut update_columns = vec![
            email_account::Column::AccessToken,
            email_account::Column::TokenExpiry,
            email_account::Column::UpdatedAt,
        ];
        if refresh_token.is_some() {
            update_columns.push(email_account::Column::RefreshToken);
        }

        let active_model = email_account::ActiveModel {
            id: ActiveValue::Set(Uuid::new_v4()),
            user_id: ActiveValue::Set(user_id),
            email_address: ActiveValue::Set(email_address.to_string()),
            access_token: ActiveValue::Set(crypt::encrypt(&grant.access_token)?),
            refresh_token: ActiveValue::Set(refresh_token),
            token_expiry: ActiveValue::Set(grant.expires_at),
            last_sync_at: ActiveValue::Set(None),
            created_at: ActiveValue::Set(now),
            updated_at: ActiveValue::Set(now),
        };

        let account = EmailAccount::insert(active_model)
            .on_conflict(
                OnConflict::columns([
                    email_account::Column::UserId,
                    email_account::Column::EmailAddress,
                ])
                .update_columns(update_columns)
                .to_owned(),
            )
            .exec_with_returning(conn)
            .await
            .context("Error upserting email account")?;

        Ok(account)
    }

    pub async fn update_tokens(
        conn: &DatabaseConnection,
        account: email_account::Model,
        grant: &TokenGrant,
    ) -> AppResult<email_account::Model> {
        let mut active_model: email_account::ActiveModel = account.into();
        active_model.access_token = ActiveValue::Set(crypt::encrypt(&grant.access_token)?);
        if let Some(refresh_token) = grant.refresh_token.as_deref() {
            active_model.refresh_token = ActiveValue::Set(Some(crypt::encrypt(refresh_token)?));
        }
        active_model.token_expiry = ActiveValue::Set(grant.expires_at);
        active_model.updated_at = ActiveValue::Set(Utc::now().into());

        Ok(active_model.update(conn).await?)
    }

    pub async fn mark_synced(
        conn: &DatabaseConnection,
        account_id: Uuid,
        synced_at: DateTimeWithTimeZone,
    ) -> AppResult<()> {
        EmailAccount::update_many()
            .col_expr(email_account::Column::LastSyncAt, Expr::value(synced_at))
            .col_expr(email_account::Column::UpdatedAt, Expr::value(synced_at))
            .filter(email_account::Column::Id.eq(account_id))
            .exec(conn)
            .await?;

        Ok(())
    }

    /// Removes an owned account; its messages and analyses cascade.
    pub async fn delete_owned(
        conn: &DatabaseConnection,
        user_id: Uuid,
        account_id: Uuid,
    ) -> AppResult<()> {
        let result = EmailAccount::delete_many()
            .filter(email_account::Column::Id.eq(account_id))
            .filter(email_account::Column::UserId.eq(user_id))
            .exec(conn)
            .await?;

        if result.rows_affected == 0 {
            return Err(AppError::NotFound("Account not found".to_string()));
        }

        Ok(())
    }

    pub fn decrypt_tokens(account: &email_account::Model) -> AppResult<AccountTokens> {
        Ok(AccountTokens {
            access_token: crypt::decrypt(&account.access_token)?,
            refresh_token: account
                .refresh_token
                .as_deref()
                .map(crypt::decrypt)
                .transpose()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    use super::*;
    use crate::testing::common::account_model;

    #[tokio::test]
    async fn test_get_owned_missing_is_not_found() {
        let conn = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<email_account::Model>::new()])
            .into_connection();

        let result = AccountCtrl::get_owned(&conn, Uuid::new_v4(), Uuid::new_v4()).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_list_by_user() {
        let user_id = Uuid::new_v4();
        let conn = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![
                account_model(user_id, "ada@example.com"),
                account_model(user_id, "ada@work.example.com"),
            ]])
            .into_connection();

        let accounts = AccountCtrl::list_by_user(&conn, user_id).await.unwrap();
        assert_eq!(accounts.len(), 2);
        assert!(accounts.iter().all(|a| a.user_id == user_id));
    }

    #[tokio::test]
    async fn test_delete_owned_without_match_is_not_found() {
        let conn = MockDatabase::new(DatabaseBackend::Postgres)
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 0,
            }])
            .into_connection();

        let result = AccountCtrl::delete_owned(&conn, Uuid::new_v4(), Uuid::new_v4()).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
