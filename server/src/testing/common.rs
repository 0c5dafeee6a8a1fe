use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use axum::async_trait;
use chrono::{DateTime, Duration, Utc};
use google_gmail1::api::{Message, MessagePart, MessagePartBody, MessagePartHeader};
use jsonwebtoken::{EncodingKey, Header};
use sea_orm::DatabaseConnection;
use serde_json::json;
use uuid::Uuid;

use crate::{
    auth::oauth_state::OAuthStateStore,
    db_core::prelude::{email, email_account, email_analysis},
    email::{
        client::{MailProvider, ProviderError, ProviderResult},
        oauth::GmailOAuth,
        parsed_message::ParsedMessage,
    },
    error::{AppError, AppResult},
    prompt::{
        chat::{ModelError, TextModel},
        priority::{PriorityAssessment, PriorityClassifier},
    },
    server_config::{cfg, GmailConfig},
    state::sync::store::SyncStore,
    HttpClient, ServerState,
};

pub const TEST_INTERNAL_DATE: i64 = 1_700_000_000_000;
pub const TEST_JWT_SECRET: &str = "trackmail-test-secret";
pub const TEST_ENCRYPTION_KEY: &str = "trackmail-test-encryption-key";

/// Server state over `conn`. The model behind the classifier always fails.
pub fn test_server_state(conn: DatabaseConnection) -> ServerState {
    test_server_state_with_gmail(conn, cfg.gmail.clone())
}

pub fn test_server_state_with_gmail(conn: DatabaseConnection, gmail: GmailConfig) -> ServerState {
    let http_client = HttpClient::new();
    ServerState {
        gmail_oauth: GmailOAuth::new(http_client.clone(), gmail),
        classifier: PriorityClassifier::new(Arc::new(ScriptedModel::failing())),
        oauth_states: OAuthStateStore::new(cfg.oauth.state_ttl_secs),
        http_client,
        conn,
    }
}

/// Signed bearer token for `user_id`, valid for ten minutes.
pub fn bearer_token(user_id: Uuid) -> String {
    std::env::set_var("JWT_SECRET", TEST_JWT_SECRET);
    jsonwebtoken::encode(
        &Header::default(),
        &json!({
            "sub": user_id,
            "email": "ada@example.com",
            "aud": cfg.auth.audience,
            "exp": Utc::now().timestamp() + 600,
        }),
        &EncodingKey::from_secret(TEST_JWT_SECRET.as_bytes()),
    )
    .expect("token should encode")
}

/// Google endpoints served by a local mock server.
pub fn gmail_config(server_uri: &str) -> GmailConfig {
    GmailConfig {
        auth_uri: "https://accounts.google.com/o/oauth2/auth".to_string(),
        token_uri: format!("{server_uri}/token"),
        api_base: format!("{server_uri}/gmail/v1/users/me"),
        redirect_uri: "http://localhost:8000/api/accounts/callback".to_string(),
        scopes: vec![
            "https://www.googleapis.com/auth/gmail.readonly".to_string(),
            "https://www.googleapis.com/auth/gmail.modify".to_string(),
        ],
        timeout_secs: 5,
        client_id: "client-id".to_string(),
        client_secret: "client-secret".to_string(),
    }
}

/// Installs the token key before anything reads it.
pub fn use_test_encryption_key() {
    std::env::set_var("TOKEN_ENCRYPTION_KEY", TEST_ENCRYPTION_KEY);
}

/// An account whose stored tokens really decrypt.
pub fn encrypted_account_model(
    user_id: Uuid,
    access_token: &str,
    refresh_token: Option<&str>,
    expires_in: Duration,
) -> email_account::Model {
    use_test_encryption_key();
    let mut account = account_model(user_id, "ada@example.com");
    account.access_token = lib_utils::crypt::encrypt(access_token).expect("token should encrypt");
    account.refresh_token = refresh_token
        .map(|t| lib_utils::crypt::encrypt(t).expect("token should encrypt"));
    account.token_expiry = (Utc::now() + expires_in).into();
    account
}

pub fn email_model(account_id: Uuid, gmail_id: &str) -> email::Model {
    email::Model {
        id: Uuid::new_v4(),
        account_id,
        gmail_id: gmail_id.to_string(),
        thread_id: format!("thread-{gmail_id}"),
        sender_email: "ada@example.com".to_string(),
        sender_name: Some("Ada Lovelace".to_string()),
        subject: "Quarterly numbers".to_string(),
        snippet: "Can you review these by Friday?".to_string(),
        body_text: Some("Can you review these by Friday?".to_string()),
        received_at: DateTime::from_timestamp_millis(TEST_INTERNAL_DATE)
            .unwrap_or_default()
            .into(),
        is_read: false,
        labels: vec!["INBOX".to_string(), "UNREAD".to_string()],
        created_at: Utc::now().into(),
    }
}

pub fn analysis_model(email_id: Uuid, priority_score: i32) -> email_analysis::Model {
    email_analysis::Model {
        id: Uuid::new_v4(),
        email_id,
        priority_score,
        explanation: "Direct question with a deadline".to_string(),
        action_items: vec!["Review the numbers".to_string()],
        urgency_factors: json!({"has_deadline": true}),
        analyzed_at: Utc::now().into(),
    }
}

/// Mock row answering a `.count()` query.
pub fn count_row(n: i64) -> BTreeMap<&'static str, sea_orm::Value> {
    BTreeMap::from([("num_items", sea_orm::Value::BigInt(Some(n)))])
}

pub fn header(name: &str, value: &str) -> MessagePartHeader {
    MessagePartHeader {
        name: Some(name.to_string()),
        value: Some(value.to_string()),
    }
}

pub fn text_part(mime_type: &str, body: &str) -> MessagePart {
    MessagePart {
        mime_type: Some(mime_type.to_string()),
        body: Some(MessagePartBody {
            data: Some(body.as_bytes().to_vec()),
            size: Some(body.len() as i32),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub fn multipart(mime_type: &str, parts: Vec<MessagePart>) -> MessagePart {
    MessagePart {
        mime_type: Some(mime_type.to_string()),
        body: Some(MessagePartBody::default()),
        parts: Some(parts),
        ..Default::default()
    }
}

/// A single-part text/plain inbox message.
pub fn gmail_message(id: &str, from: &str, subject: Option<&str>, body: &str) -> Message {
    let mut headers = vec![header("From", from), header("To", "me@example.com")];
    if let Some(subject) = subject {
        headers.push(header("Subject", subject));
    }

    let mut payload = text_part("text/plain", body);
    payload.headers = Some(headers);

    Message {
        id: Some(id.to_string()),
        thread_id: Some(format!("thread-{id}")),
        label_ids: Some(vec!["INBOX".to_string()]),
        snippet: Some(body.chars().take(100).collect()),
        internal_date: Some(TEST_INTERNAL_DATE),
        payload: Some(payload),
        ..Default::default()
    }
}

/// Wire form of [`gmail_message`], as returned by the messages.get endpoint.
pub fn gmail_message_json(
    id: &str,
    from: &str,
    subject: Option<&str>,
    body: &str,
) -> serde_json::Value {
    serde_json::to_value(gmail_message(id, from, subject, body))
        .expect("Message should serialize")
}

pub fn parsed_message(gmail_id: &str, sender_email: &str, subject: &str) -> ParsedMessage {
    ParsedMessage {
        account_id: Uuid::new_v4(),
        gmail_id: gmail_id.to_string(),
        thread_id: format!("thread-{gmail_id}"),
        sender_email: sender_email.to_string(),
        sender_name: Some("Ada Lovelace".to_string()),
        subject: subject.to_string(),
        snippet: String::new(),
        body_text: Some("Could you send the report before the board meeting?".to_string()),
        received_at: DateTime::from_timestamp_millis(TEST_INTERNAL_DATE).unwrap_or_default(),
        is_read: false,
        labels: vec!["INBOX".to_string(), "UNREAD".to_string()],
    }
}

pub fn account_model(user_id: Uuid, email_address: &str) -> email_account::Model {
    let now = Utc::now();
    email_account::Model {
        id: Uuid::new_v4(),
        user_id,
        email_address: email_address.to_string(),
        access_token: "encrypted-access".to_string(),
        refresh_token: Some("encrypted-refresh".to_string()),
        token_expiry: (now + Duration::hours(1)).into(),
        last_sync_at: None,
        created_at: now.into(),
        updated_at: now.into(),
    }
}

/// In-memory mailbox. Ids listed in order of insertion.
#[derive(Default)]
pub struct FakeMailbox {
    order: Vec<String>,
    messages: HashMap<String, Message>,
    broken: HashSet<String>,
    listing_fails: bool,
    fetches: AtomicUsize,
}

impl FakeMailbox {
    pub fn with_messages(messages: Vec<Message>) -> Self {
        let mut mailbox = FakeMailbox::default();
        for message in messages {
            mailbox.push(message);
        }
        mailbox
    }

    pub fn push(&mut self, message: Message) {
        let id = message.id.clone().unwrap_or_default();
        self.order.push(id.clone());
        self.messages.insert(id, message);
    }

    /// Lists `id` without being able to fetch it.
    pub fn push_unfetchable(&mut self, id: &str) {
        self.order.push(id.to_string());
        self.broken.insert(id.to_string());
    }

    /// Lists `id` a second time.
    pub fn push_duplicate_listing(&mut self, id: &str) {
        self.order.push(id.to_string());
    }

    pub fn failing_listing() -> Self {
        FakeMailbox {
            listing_fails: true,
            ..Default::default()
        }
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MailProvider for FakeMailbox {
    async fn list_inbox_ids(&self, max_results: u32) -> ProviderResult<Vec<String>> {
        if self.listing_fails {
            return Err(ProviderError::Api {
                status: 503,
                message: "Backend Error".to_string(),
            });
        }
        Ok(self
            .order
            .iter()
            .take(max_results as usize)
            .cloned()
            .collect())
    }

    async fn get_message(&self, message_id: &str) -> ProviderResult<Message> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if self.broken.contains(message_id) {
            return Err(ProviderError::Api {
                status: 404,
                message: "Requested entity was not found.".to_string(),
            });
        }
        self.messages
            .get(message_id)
            .cloned()
            .ok_or(ProviderError::Api {
                status: 404,
                message: "Requested entity was not found.".to_string(),
            })
    }
}

/// Model double returning a fixed answer, or failing, and counting calls.
pub struct ScriptedModel {
    answer: Option<String>,
    calls: AtomicUsize,
}

impl ScriptedModel {
    pub fn answering(answer: &str) -> Self {
        ScriptedModel {
            answer: Some(answer.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        ScriptedModel {
            answer: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextModel for ScriptedModel {
    async fn complete_json(&self, _system: &str, _prompt: &str) -> Result<String, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answer.clone().ok_or(ModelError::Timeout)
    }
}

#[derive(Debug, Clone)]
pub struct StoredEmail {
    pub id: Uuid,
    pub message: ParsedMessage,
}

/// Store double keyed like the real table on (account, gmail id).
#[derive(Default)]
pub struct MemoryStore {
    pub emails: Mutex<Vec<StoredEmail>>,
    pub analyses: Mutex<HashMap<Uuid, PriorityAssessment>>,
    pub last_sync: Mutex<HashMap<Uuid, DateTime<Utc>>>,
    analysis_inserts_fail: AtomicBool,
}

impl MemoryStore {
    pub fn email_count(&self) -> usize {
        self.emails.lock().unwrap().len()
    }

    pub fn analysis_count(&self) -> usize {
        self.analyses.lock().unwrap().len()
    }

    pub fn last_sync_of(&self, account_id: Uuid) -> Option<DateTime<Utc>> {
        self.last_sync.lock().unwrap().get(&account_id).copied()
    }

    /// While set, every analysis write fails and takes its message with it.
    pub fn fail_analysis_inserts(&self, fail: bool) {
        self.analysis_inserts_fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl SyncStore for MemoryStore {
    async fn email_exists(&self, account_id: Uuid, gmail_id: &str) -> AppResult<bool> {
        Ok(self
            .emails
            .lock()
            .unwrap()
            .iter()
            .any(|e| e.message.account_id == account_id && e.message.gmail_id == gmail_id))
    }

    async fn insert_analyzed_email(
        &self,
        parsed: &ParsedMessage,
        assessment: &PriorityAssessment,
    ) -> AppResult<Option<Uuid>> {
        let mut emails = self.emails.lock().unwrap();
        if emails.iter().any(|e| {
            e.message.account_id == parsed.account_id && e.message.gmail_id == parsed.gmail_id
        }) {
            return Ok(None);
        }
        if self.analysis_inserts_fail.load(Ordering::SeqCst) {
            return Err(AppError::Internal(anyhow::anyhow!("analysis table unavailable")));
        }

        let id = Uuid::new_v4();
        emails.push(StoredEmail {
            id,
            message: parsed.clone(),
        });
        self.analyses
            .lock()
            .unwrap()
            .insert(id, assessment.clone());
        Ok(Some(id))
    }

    async fn mark_synced(&self, account_id: Uuid, synced_at: DateTime<Utc>) -> AppResult<()> {
        self.last_sync
            .lock()
            .unwrap()
            .insert(account_id, synced_at);
        Ok(())
    }
}
