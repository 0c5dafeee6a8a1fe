use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use url::Url;

use crate::{
    model::response::{GmailApiTokenResponse, GmailOAuthErrorResponse},
    server_config::GmailConfig,
    HttpClient,
};

use super::client::{GmailClient, ProviderError, ProviderResult};

/// Tokens returned by a code exchange or a refresh.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<FixedOffset>,
}

impl From<GmailApiTokenResponse> for TokenGrant {
    fn from(resp: GmailApiTokenResponse) -> Self {
        TokenGrant {
            access_token: resp.access_token,
            refresh_token: resp.refresh_token,
            expires_at: (Utc::now() + chrono::Duration::seconds(resp.expires_in as i64))
                .fixed_offset(),
        }
    }
}

/// OAuth2 web-server flow against Google, plus a factory for authorized clients.
#[derive(Debug, Clone)]
pub struct GmailOAuth {
    http_client: HttpClient,
    config: Arc<GmailConfig>,
}

impl GmailOAuth {
    pub fn new(http_client: HttpClient, config: GmailConfig) -> Self {
        Self {
            http_client,
            config: Arc::new(config),
        }
    }

    pub fn authorization_url(&self, state: &str) -> Result<Url, url::ParseError> {
        let GmailConfig {
            auth_uri,
            client_id,
            redirect_uri,
            scopes,
            ..
        } = self.config.as_ref();

        let mut url = Url::parse(auth_uri)?;
        url.query_pairs_mut().extend_pairs(&[
            ("client_id", client_id.as_str()),
            ("redirect_uri", redirect_uri.as_str()),
            ("response_type", "code"),
            ("scope", scopes.join(" ").as_str()),
            ("access_type", "offline"),
            ("include_granted_scopes", "true"),
            ("prompt", "consent"),
            ("state", state),
        ]);

        Ok(url)
    }

    pub async fn exchange_code(&self, code: &str) -> ProviderResult<TokenGrant> {
        let GmailConfig {
            client_id,
            client_secret,
            redirect_uri,
            ..
        } = self.config.as_ref();

        self.token_request(&[
            ("client_id", client_id.as_str()),
            ("client_secret", client_secret.as_str()),
            ("code", code),
            ("redirect_uri", redirect_uri.as_str()),
            ("grant_type", "authorization_code"),
        ])
        .await
    }

    pub async fn refresh(&self, refresh_token: &str) -> ProviderResult<TokenGrant> {
        let GmailConfig {
            client_id,
            client_secret,
            ..
        } = self.config.as_ref();

        self.token_request(&[
            ("client_id", client_id.as_str()),
            ("client_secret", client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ])
        .await
    }

    /// A Gmail client authorized with `access_token`.
    pub fn client(&self, access_token: String) -> GmailClient {
        GmailClient::new(
            self.http_client.clone(),
            self.config.api_base.clone(),
            access_token,
            self.config.timeout(),
        )
    }

    async fn token_request(&self, form: &[(&str, &str)]) -> ProviderResult<TokenGrant> {
        let resp = self
            .http_client
            .post(&self.config.token_uri)
            .form(form)
            .timeout(self.config.timeout())
            .send()
            .await?;

        let status = resp.status();
        let body = resp.json::<serde_json::Value>().await?;

        if !status.is_success() || body.get("error").is_some() {
            let err = serde_json::from_value::<GmailOAuthErrorResponse>(body.clone()).ok();
            return Err(match err {
                Some(e) if e.error == "invalid_grant" => {
                    tracing::warn!(
                        "Token grant rejected: {}",
                        e.error_description.unwrap_or_default()
                    );
                    ProviderError::Unauthorized
                }
                Some(e) => ProviderError::Api {
                    status: status.as_u16(),
                    message: e.error_description.unwrap_or(e.error),
                },
                None => ProviderError::Api {
                    status: status.as_u16(),
                    message: body.to_string(),
                },
            });
        }

        let token = serde_json::from_value::<GmailApiTokenResponse>(body.clone()).map_err(|_| {
            tracing::error!("Unexpected gmail oauth2 response: {:?}", body);
            ProviderError::Decode("token response".to_string())
        })?;

        Ok(token.into())
    }
}
