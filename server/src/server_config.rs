use config::{Config, ConfigError, Environment};
use lazy_static::lazy_static;
use serde::Deserialize;
use std::{env, path::Path, result::Result, time::Duration};
use url::Url;

#[derive(Debug, Clone, Deserialize)]
pub struct GmailConfig {
    pub auth_uri: String,
    pub token_uri: String,
    pub api_base: String,
    pub redirect_uri: String,
    pub scopes: Vec<String>,
    pub timeout_secs: u64,
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub client_secret: String,
}

impl GmailConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelConfig {
    pub endpoint: String,
    pub id: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    #[serde(default)]
    pub api_key: String,
}

impl ModelConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    pub page_size: u32,
    pub concurrency: usize,
    /// Seconds between scheduled syncs of every account. 0 disables the job.
    pub interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OAuthConfig {
    pub state_ttl_secs: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FrontendConfig {
    pub app_url: Url,
    pub allowed_origins: Vec<String>,
}

impl FrontendConfig {
    pub fn dashboard_url(&self) -> Url {
        let mut url = self.app_url.clone();
        url.set_path("/dashboard");
        url
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    pub audience: String,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    pub gmail: GmailConfig,
    pub model: ModelConfig,
    pub sync: SyncConfig,
    pub oauth: OAuthConfig,
    pub frontend: FrontendConfig,
    pub auth: AuthConfig,
}

impl ServerConfig {
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let mut server_config: ServerConfig = Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(Environment::with_prefix("TRACKMAIL").separator("__"))
            .build()?
            .try_deserialize()?;

        if let Ok(client_id) = env::var("GOOGLE_CLIENT_ID") {
            server_config.gmail.client_id = client_id;
        }
        if let Ok(client_secret) = env::var("GOOGLE_CLIENT_SECRET") {
            server_config.gmail.client_secret = client_secret;
        }
        if let Ok(api_key) = env::var("OPENAI_API_KEY") {
            server_config.model.api_key = api_key;
        }

        Ok(server_config)
    }
}

fn mask(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<unset>"
    } else {
        "<set>"
    }
}

impl std::fmt::Display for ServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Server Config:\n\nGmail: auth_uri={} token_uri={} api_base={} redirect_uri={} scopes=[{}] timeout={}s client_id={} client_secret={}\n\nModel: endpoint={} id={} temperature={} max_tokens={} timeout={}s api_key={}\n\nSync: {:?}\n\nOAuth: {:?}\n\nFrontend: {:?}\n\nAuth: {:?}",
            self.gmail.auth_uri,
            self.gmail.token_uri,
            self.gmail.api_base,
            self.gmail.redirect_uri,
            self.gmail.scopes.join(", "),
            self.gmail.timeout_secs,
            mask(&self.gmail.client_id),
            mask(&self.gmail.client_secret),
            self.model.endpoint,
            self.model.id,
            self.model.temperature,
            self.model.max_tokens,
            self.model.timeout_secs,
            mask(&self.model.api_key),
            self.sync,
            self.oauth,
            self.frontend,
            self.auth,
        )
    }
}

fn config_root() -> String {
    env::var("APP_DIR").unwrap_or_else(|_| {
        let dir =
            env::var("CARGO_MANIFEST_DIR").expect("CARGO_MANIFEST_DIR or APP_DIR is required");
        let dir = Path::new(&dir)
            .parent()
            .expect("Failed to get parent dir")
            .display()
            .to_string();
        format!("{}/config", dir)
    })
}

lazy_static! {
    pub static ref cfg: ServerConfig = {
        let root = config_root();
        let path = format!("{root}/config.toml");
        ServerConfig::load(&path).expect("config.toml is missing or invalid")
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_workspace_config() {
        let path = format!("{}/../config/config.toml", env!("CARGO_MANIFEST_DIR"));
        let server_config = ServerConfig::load(&path).expect("config should load");

        assert_eq!(server_config.sync.page_size, 30);
        assert!(server_config.sync.concurrency > 0);
        assert_eq!(server_config.model.max_tokens, 500);
        assert_eq!(
            server_config.frontend.dashboard_url().as_str(),
            "http://localhost:3000/dashboard"
        );
    }

    #[test]
    fn test_display_masks_secrets() {
        let path = format!("{}/../config/config.toml", env!("CARGO_MANIFEST_DIR"));
        let mut server_config = ServerConfig::load(&path).unwrap();
        server_config.gmail.client_secret = "super-secret-value".to_string();
        server_config.model.api_key = "sk-live".to_string();

        let rendered = server_config.to_string();
        assert!(!rendered.contains("super-secret-value"));
        assert!(!rendered.contains("sk-live"));
    }
}
