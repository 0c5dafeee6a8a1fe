//! Single-use correlation tokens for the Gmail connect handshake.
//!
//! Each `/accounts/connect` call issues a state bound to the caller's user id.
//! The callback consumes it exactly once; entries expire after the configured
//! TTL and are swept by a scheduler job.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct PendingConnect {
    user_id: Uuid,
    expires_at: i64,
}

impl PendingConnect {
    fn is_expired(&self, now: i64) -> bool {
        self.expires_at <= now
    }
}

#[derive(Debug, Clone)]
pub struct OAuthStateStore {
    inner: Arc<RwLock<HashMap<String, PendingConnect>>>,
    ttl_secs: i64,
}

impl OAuthStateStore {
    pub fn new(ttl_secs: i64) -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
            ttl_secs,
        }
    }

    /// Issues a fresh, unguessable state for `user_id`.
    pub fn issue(&self, user_id: Uuid) -> String {
        let mut raw = [0u8; 32];
        raw[..16].copy_from_slice(Uuid::new_v4().as_bytes());
        raw[16..].copy_from_slice(Uuid::new_v4().as_bytes());
        let state = URL_SAFE_NO_PAD.encode(raw);

        let pending = PendingConnect {
            user_id,
            expires_at: Utc::now().timestamp() + self.ttl_secs,
        };
        self.write().insert(state.clone(), pending);

        state
    }

    /// Removes the state and returns its user if it was still valid.
    pub fn take(&self, state: &str) -> Option<Uuid> {
        let pending = self.write().remove(state)?;
        if pending.is_expired(Utc::now().timestamp()) {
            None
        } else {
            Some(pending.user_id)
        }
    }

    pub fn clean_store(&self) {
        let now = Utc::now().timestamp();
        let mut inner = self.write();
        let before = inner.len();
        inner.retain(|_, pending| !pending.is_expired(now));
        let removed = before - inner.len();
        if removed > 0 {
            tracing::debug!("Removed {} expired oauth states", removed);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, PendingConnect>> {
        // A poisoned map only ever holds plain data, keep using it.
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}
