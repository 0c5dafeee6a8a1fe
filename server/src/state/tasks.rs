use std::panic::AssertUnwindSafe;

use futures::FutureExt;

use crate::{
    error::AppResult, model::account::AccountCtrl, server_config::cfg, state::sync::AccountSyncer,
    ServerState,
};

/// Syncs every connected account, one after another.
/// A failing account is logged and does not stop the run.
pub async fn sync_all_accounts(state: ServerState) -> AppResult<usize> {
    let accounts = AccountCtrl::all(&state.conn).await?;
    tracing::info!("Periodic sync of {} accounts", accounts.len());

    let syncer = AccountSyncer {
        conn: &state.conn,
        oauth: &state.gmail_oauth,
        classifier: &state.classifier,
        config: &cfg.sync,
    };

    let mut synced = 0;
    for account in accounts {
        let account_id = account.id;
        let result = AssertUnwindSafe(syncer.sync(account)).catch_unwind().await;

        match result {
            Ok(Ok(outcome)) => {
                synced += 1;
                tracing::debug!("Account {} periodic sync: {:?}", account_id, outcome);
            }
            Ok(Err(e)) => {
                tracing::error!("Periodic sync failed for account {}: {:?}", account_id, e);
            }
            Err(panic) => {
                let msg = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "Unknown panic".to_string());
                tracing::error!("Periodic sync panicked for account {}: {}", account_id, msg);
            }
        }
    }

    Ok(synced)
}

pub fn sweep_oauth_states(state: &ServerState) {
    state.oauth_states.clean_store();
}
