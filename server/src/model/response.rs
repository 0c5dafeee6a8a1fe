use serde::{Deserialize, Serialize};

/// Token endpoint response for both the code exchange and refresh grants.
/// Google omits `refresh_token` on refresh and on re-consent without `prompt=consent`.
#[derive(Debug, Serialize, Deserialize)]
pub struct GmailApiTokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
    pub expires_in: u64,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GmailOAuthErrorResponse {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GmailError {
    pub code: u32,
    pub message: String,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GmailErrorResponse {
    pub error: GmailError,
}
