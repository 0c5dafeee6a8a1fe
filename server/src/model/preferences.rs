use chrono::Utc;

use crate::{db_core::prelude::*, error::AppResult};

pub struct PreferencesCtrl;

impl PreferencesCtrl {
    pub async fn find(
        conn: &DatabaseConnection,
        user_id: Uuid,
    ) -> AppResult<Option<user_preferences::Model>> {
        let prefs = UserPreferences::find()
            .filter(user_preferences::Column::UserId.eq(user_id))
            .one(conn)
            .await?;

        Ok(prefs)
    }

    /// Preferences for `user_id`, inserting empty VIP lists on first access.
    pub async fn get_or_create(
        conn: &DatabaseConnection,
        user_id: Uuid,
    ) -> AppResult<user_preferences::Model> {
        if let Some(prefs) = Self::find(conn, user_id).await? {
            return Ok(prefs);
        }

        let now: DateTimeWithTimeZone = Utc::now().into();
        let active_model = user_preferences::ActiveModel {
            id: ActiveValue::Set(Uuid::new_v4()),
            user_id: ActiveValue::Set(user_id),
            vip_contacts: ActiveValue::Set(vec![]),
            vip_domains: ActiveValue::Set(vec![]),
            created_at: ActiveValue::Set(now),
            updated_at: ActiveValue::Set(now),
        };

        // A concurrent first read may win the insert; the conflict is ignored and re-read.
        UserPreferences::insert(active_model)
            .on_conflict(
                OnConflict::column(user_preferences::Column::UserId)
                    .do_nothing()
                    .to_owned(),
            )
            .do_nothing()
            .exec(conn)
            .await?;

        Self::find(conn, user_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Preferences missing after insert").into())
    }

    /// Replaces the given lists; `None` leaves a list unchanged.
    pub async fn update(
        conn: &DatabaseConnection,
        user_id: Uuid,
        vip_contacts: Option<Vec<String>>,
        vip_domains: Option<Vec<String>>,
    ) -> AppResult<user_preferences::Model> {
        let prefs = Self::get_or_create(conn, user_id).await?;

        let mut active_model: user_preferences::ActiveModel = prefs.into();
        if let Some(contacts) = vip_contacts {
            active_model.vip_contacts = ActiveValue::Set(normalize(contacts));
        }
        if let Some(domains) = vip_domains {
            active_model.vip_domains = ActiveValue::Set(normalize(domains));
        }
        active_model.updated_at = ActiveValue::Set(Utc::now().into());

        Ok(active_model.update(conn).await?)
    }
}

fn normalize(entries: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(entries.len());
    for entry in entries {
        let entry = entry.trim().to_lowercase();
        if !entry.is_empty() && !out.contains(&entry) {
            out.push(entry);
        }
    }
    out
}
