extern crate google_gmail1 as gmail1;

use std::time::Duration;

use axum::async_trait;
use derive_more::derive::Display;
use gmail1::api::{ListMessagesResponse, Message, Profile};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;

use crate::{model::response::GmailErrorResponse, HttpClient};

/// Failure talking to the mail provider.
#[derive(Debug, Display)]
pub enum ProviderError {
    #[display("request timed out")]
    Timeout,
    #[display("credentials rejected by provider")]
    Unauthorized,
    #[display("rate limited by provider")]
    RateLimited,
    #[display("provider api error {status}: {message}")]
    Api { status: u16, message: String },
    #[display("transport error: {_0}")]
    Transport(String),
    #[display("unexpected provider response: {_0}")]
    Decode(String),
}

impl std::error::Error for ProviderError {}

impl From<reqwest::Error> for ProviderError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            ProviderError::Timeout
        } else if error.is_decode() {
            ProviderError::Decode(error.to_string())
        } else {
            ProviderError::Transport(error.to_string())
        }
    }
}

pub type ProviderResult<T> = Result<T, ProviderError>;

/// The mailbox operations the sync pipeline needs.
#[async_trait]
pub trait MailProvider: Send + Sync {
    /// Ids of the newest inbox messages, first page only.
    async fn list_inbox_ids(&self, max_results: u32) -> ProviderResult<Vec<String>>;

    /// Full message content (headers, body parts, labels).
    async fn get_message(&self, message_id: &str) -> ProviderResult<Message>;
}

macro_rules! gmail_url {
    ($base:expr, $($params:expr),*) => {
        {
            let list_params: Vec<&str> = vec![$($params),*];
            let path = list_params.join("/");
            format!("{}/{}", $base.trim_end_matches('/'), path)
        }
    };
}

/// Gmail REST client authorized with a single access token.
#[derive(Debug, Clone)]
pub struct GmailClient {
    http_client: HttpClient,
    api_base: String,
    access_token: String,
    timeout: Duration,
}

impl GmailClient {
    pub fn new(
        http_client: HttpClient,
        api_base: impl Into<String>,
        access_token: String,
        timeout: Duration,
    ) -> Self {
        Self {
            http_client,
            api_base: api_base.into(),
            access_token,
            timeout,
        }
    }

    pub async fn get_profile(&self) -> ProviderResult<Profile> {
        self.get_json(gmail_url!(self.api_base, "profile"), &[])
            .await
    }

    /// First page of message ids carrying all of `label_ids`.
    pub async fn get_message_list(
        &self,
        label_ids: &[&str],
        max_results: u32,
    ) -> ProviderResult<ListMessagesResponse> {
        let mut query = vec![("maxResults".to_string(), max_results.to_string())];
        for label in label_ids {
            query.push(("labelIds".to_string(), label.to_string()));
        }

        self.get_json(gmail_url!(self.api_base, "messages"), &query)
            .await
    }

    pub async fn get_message_by_id(&self, message_id: &str) -> ProviderResult<Message> {
        self.get_json(
            gmail_url!(self.api_base, "messages", message_id),
            &[("format".to_string(), "full".to_string())],
        )
        .await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: String,
        query: &[(String, String)],
    ) -> ProviderResult<T> {
        let resp = self
            .http_client
            .get(url)
            .query(query)
            .bearer_auth(&self.access_token)
            .timeout(self.timeout)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(status_error(status, &body));
        }

        resp.json::<T>().await.map_err(ProviderError::from)
    }
}

fn status_error(status: StatusCode, body: &str) -> ProviderError {
    match status {
        StatusCode::UNAUTHORIZED => ProviderError::Unauthorized,
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited,
        _ => {
            let message = serde_json::from_str::<GmailErrorResponse>(body)
                .map(|e| e.error.message)
                .unwrap_or_else(|_| body.chars().take(200).collect());
            tracing::warn!("Gmail api error {}: {}", status, message);
            ProviderError::Api {
                status: status.as_u16(),
                message,
            }
        }
    }
}

#[async_trait]
impl MailProvider for GmailClient {
    async fn list_inbox_ids(&self, max_results: u32) -> ProviderResult<Vec<String>> {
        let list = self.get_message_list(&["INBOX"], max_results).await?;

        Ok(list
            .messages
            .unwrap_or_default()
            .into_iter()
            .filter_map(|m| m.id)
            .collect())
    }

    async fn get_message(&self, message_id: &str) -> ProviderResult<Message> {
        self.get_message_by_id(message_id).await
    }
}
