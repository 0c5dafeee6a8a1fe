use std::collections::HashSet;

use chrono::Utc;
use derive_more::derive::Display;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    email::{
        client::{MailProvider, ProviderError},
        parsed_message::{ParseError, ParsedMessage},
    },
    error::AppError,
    prompt::priority::{PriorityClassifier, VipLists},
};

use super::store::SyncStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    pub synced_count: usize,
    pub analyzed_count: usize,
    pub failed_count: usize,
}

/// Why one step of a sync failed.
#[derive(Debug, Display)]
pub enum SyncError {
    #[display("provider: {_0}")]
    Provider(ProviderError),
    #[display("parse: {_0}")]
    Parse(ParseError),
    #[display("store: {_0}")]
    Store(AppError),
}

impl std::error::Error for SyncError {}

impl From<ProviderError> for SyncError {
    fn from(error: ProviderError) -> Self {
        SyncError::Provider(error)
    }
}

impl From<ParseError> for SyncError {
    fn from(error: ParseError) -> Self {
        SyncError::Parse(error)
    }
}

impl From<AppError> for SyncError {
    fn from(error: AppError) -> Self {
        SyncError::Store(error)
    }
}

impl From<SyncError> for AppError {
    fn from(error: SyncError) -> Self {
        match error {
            SyncError::Provider(e) => e.into(),
            SyncError::Parse(e) => AppError::Internal(anyhow::anyhow!("{e}")),
            SyncError::Store(e) => e,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum MessageOutcome {
    Stored,
    AlreadyStored,
}

/// One sync pass over an account's inbox: list, dedup, then fetch, parse,
/// classify and store each new message with bounded concurrency.
pub struct SyncPipeline<'a> {
    provider: &'a dyn MailProvider,
    store: &'a dyn SyncStore,
    classifier: &'a PriorityClassifier,
    page_size: u32,
    concurrency: usize,
}

impl<'a> SyncPipeline<'a> {
    pub fn new(
        provider: &'a dyn MailProvider,
        store: &'a dyn SyncStore,
        classifier: &'a PriorityClassifier,
    ) -> Self {
        Self {
            provider,
            store,
            classifier,
            page_size: 30,
            concurrency: 4,
        }
    }

    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Only a listing failure or a failure to record the sync time is fatal.
    /// Everything else is counted in `failed_count` and skipped.
    pub async fn run(&self, account_id: Uuid, vip: &VipLists) -> Result<SyncOutcome, SyncError> {
        let listed = self.provider.list_inbox_ids(self.page_size).await?;
        let mut outcome = SyncOutcome::default();

        let mut seen = HashSet::with_capacity(listed.len());
        let mut new_ids = Vec::new();
        for gmail_id in listed {
            if !seen.insert(gmail_id.clone()) {
                continue;
            }
            match self.store.email_exists(account_id, &gmail_id).await {
                Ok(true) => {}
                Ok(false) => new_ids.push(gmail_id),
                Err(e) => {
                    tracing::warn!(
                        "Skipping {} for account {}: existence check failed: {}",
                        gmail_id,
                        account_id,
                        e
                    );
                    outcome.failed_count += 1;
                }
            }
        }

        tracing::debug!(
            "Account {}: {} listed, {} new",
            account_id,
            seen.len(),
            new_ids.len()
        );

        let results = stream::iter(new_ids)
            .map(|gmail_id| async move {
                let result = self.process_message(account_id, &gmail_id, vip).await;
                (gmail_id, result)
            })
            .buffer_unordered(self.concurrency)
            .collect::<Vec<_>>()
            .await;

        for (gmail_id, result) in results {
            match result {
                Ok(MessageOutcome::Stored) => {
                    outcome.synced_count += 1;
                    outcome.analyzed_count += 1;
                }
                Ok(MessageOutcome::AlreadyStored) => {}
                Err(e) => {
                    tracing::warn!(
                        "Failed to sync message {} for account {}: {}",
                        gmail_id,
                        account_id,
                        e
                    );
                    outcome.failed_count += 1;
                }
            }
        }

        self.store.mark_synced(account_id, Utc::now()).await?;

        tracing::info!(
            "Account {} synced: {} stored, {} analyzed, {} failed",
            account_id,
            outcome.synced_count,
            outcome.analyzed_count,
            outcome.failed_count
        );

        Ok(outcome)
    }

    async fn process_message(
        &self,
        account_id: Uuid,
        gmail_id: &str,
        vip: &VipLists,
    ) -> Result<MessageOutcome, SyncError> {
        let message = self.provider.get_message(gmail_id).await?;
        let parsed = ParsedMessage::from_gmail_message(message, account_id)?;

        let assessment = self.classifier.classify(&parsed, vip).await;

        match self.store.insert_analyzed_email(&parsed, &assessment).await? {
            Some(_) => Ok(MessageOutcome::Stored),
            None => Ok(MessageOutcome::AlreadyStored),
        }
    }
}
