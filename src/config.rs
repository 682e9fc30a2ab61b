//! TOML configuration.
//!
//! Read once at process start and treated as immutable afterwards. Every
//! section is optional. Client credentials may come from the environment
//! (`GOOGLE_CLIENT_ID`, `ONEDRIVE_CLIENT_SECRET`, ...), which wins over the
//! file. Missing credentials are not a load error; they surface as
//! `AuthConfigMissing` when a token refresh needs them.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::Provider;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub download: DownloadConfig,
    #[serde(default)]
    pub extract: ExtractConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/dh.sqlite"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DownloadConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Items reporting a larger size are not downloaded at all.
    #[serde(default = "default_preview_max_bytes")]
    pub preview_max_bytes: u64,
    /// Streamed downloads are cut off past this many MiB.
    #[serde(default = "default_hard_cap_mb")]
    pub hard_cap_mb: u64,
}

fn default_concurrency() -> usize {
    crate::throttle::DEFAULT_DOWNLOAD_CONCURRENCY
}
fn default_preview_max_bytes() -> u64 {
    8 * 1024 * 1024
}
fn default_hard_cap_mb() -> u64 {
    32
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            preview_max_bytes: default_preview_max_bytes(),
            hard_cap_mb: default_hard_cap_mb(),
        }
    }
}

impl DownloadConfig {
    pub fn hard_cap_bytes(&self) -> u64 {
        self.hard_cap_mb.max(1) * 1024 * 1024
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExtractConfig {
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_pdf_max_chars")]
    pub pdf_max_chars: usize,
    #[serde(default = "default_pdf_max_pages")]
    pub pdf_max_pages: usize,
    #[serde(default = "default_text_sample_bytes")]
    pub text_sample_bytes: usize,
}

fn default_max_chars() -> usize {
    600
}
fn default_pdf_max_chars() -> usize {
    900
}
fn default_pdf_max_pages() -> usize {
    3
}
fn default_text_sample_bytes() -> usize {
    4096
}

impl Default for ExtractConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
            pdf_max_chars: default_pdf_max_chars(),
            pdf_max_pages: default_pdf_max_pages(),
            text_sample_bytes: default_text_sample_bytes(),
        }
    }
}

/// Per-call-class timeouts. Listing and metadata calls are short, byte
/// downloads long.
#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    #[serde(default = "default_metadata_timeout")]
    pub metadata_timeout_secs: u64,
    #[serde(default = "default_listing_timeout")]
    pub listing_timeout_secs: u64,
    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,
    #[serde(default = "default_token_timeout")]
    pub token_timeout_secs: u64,
}

fn default_metadata_timeout() -> u64 {
    20
}
fn default_listing_timeout() -> u64 {
    30
}
fn default_download_timeout() -> u64 {
    120
}
fn default_token_timeout() -> u64 {
    20
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            metadata_timeout_secs: default_metadata_timeout(),
            listing_timeout_secs: default_listing_timeout(),
            download_timeout_secs: default_download_timeout(),
            token_timeout_secs: default_token_timeout(),
        }
    }
}

impl HttpConfig {
    pub fn metadata_timeout(&self) -> Duration {
        Duration::from_secs(self.metadata_timeout_secs)
    }
    pub fn listing_timeout(&self) -> Duration {
        Duration::from_secs(self.listing_timeout_secs)
    }
    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }
    pub fn token_timeout(&self) -> Duration {
        Duration::from_secs(self.token_timeout_secs)
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub google: GoogleConfig,
    #[serde(default)]
    pub onedrive: OneDriveConfig,
    #[serde(default)]
    pub notion: NotionConfig,
}

/// Application credentials registered with a provider.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ClientCredentials {
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub redirect_uri: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
}

impl ClientCredentials {
    /// Both id and secret, non-empty.
    pub fn pair(&self) -> Option<(&str, &str)> {
        let id = self.client_id.as_deref().filter(|s| !s.trim().is_empty())?;
        let secret = self
            .client_secret
            .as_deref()
            .filter(|s| !s.trim().is_empty())?;
        Some((id, secret))
    }

    fn overlay_env(&mut self, prefix: &str) {
        if let Ok(v) = std::env::var(format!("{}_CLIENT_ID", prefix)) {
            self.client_id = Some(v);
        }
        if let Ok(v) = std::env::var(format!("{}_CLIENT_SECRET", prefix)) {
            self.client_secret = Some(v);
        }
        if let Ok(v) = std::env::var(format!("{}_REDIRECT_URI", prefix)) {
            self.redirect_uri = Some(v);
        }
        if let Ok(v) = std::env::var(format!("{}_SCOPES", prefix)) {
            let scopes: Vec<String> = v.split_whitespace().map(str::to_string).collect();
            if !scopes.is_empty() {
                self.scopes = scopes;
            }
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GoogleConfig {
    #[serde(flatten)]
    pub credentials: ClientCredentials,
    #[serde(default = "default_google_token_url")]
    pub token_url: String,
    #[serde(default = "default_google_api_base")]
    pub api_base: String,
}

fn default_google_token_url() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}
fn default_google_api_base() -> String {
    "https://www.googleapis.com/drive/v3".to_string()
}

impl Default for GoogleConfig {
    fn default() -> Self {
        Self {
            credentials: ClientCredentials {
                redirect_uri: Some("http://localhost:8000/auth/google/callback".to_string()),
                scopes: vec![
                    "openid".to_string(),
                    "email".to_string(),
                    "profile".to_string(),
                    "https://www.googleapis.com/auth/drive.readonly".to_string(),
                ],
                ..Default::default()
            },
            token_url: default_google_token_url(),
            api_base: default_google_api_base(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct OneDriveConfig {
    #[serde(flatten)]
    pub credentials: ClientCredentials,
    #[serde(default = "default_tenant")]
    pub tenant: String,
    /// Defaults to the tenant's v2.0 token endpoint.
    #[serde(default)]
    pub token_url: Option<String>,
    #[serde(default = "default_graph_base")]
    pub graph_base: String,
    #[serde(default = "default_shares_base")]
    pub shares_base: String,
}

fn default_tenant() -> String {
    "common".to_string()
}
fn default_graph_base() -> String {
    "https://graph.microsoft.com/v1.0".to_string()
}
fn default_shares_base() -> String {
    "https://api.onedrive.com/v1.0".to_string()
}

impl Default for OneDriveConfig {
    fn default() -> Self {
        Self {
            credentials: ClientCredentials {
                redirect_uri: Some("http://localhost:8000/auth/onedrive/callback".to_string()),
                scopes: vec![
                    "offline_access".to_string(),
                    "Files.Read".to_string(),
                    "User.Read".to_string(),
                    "openid".to_string(),
                    "email".to_string(),
                    "profile".to_string(),
                ],
                ..Default::default()
            },
            tenant: default_tenant(),
            token_url: None,
            graph_base: default_graph_base(),
            shares_base: default_shares_base(),
        }
    }
}

impl OneDriveConfig {
    pub fn token_url(&self) -> String {
        self.token_url.clone().unwrap_or_else(|| {
            format!(
                "https://login.microsoftonline.com/{}/oauth2/v2.0/token",
                self.tenant
            )
        })
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotionConfig {
    #[serde(flatten)]
    pub credentials: ClientCredentials,
    #[serde(default = "default_notion_api_base")]
    pub api_base: String,
    #[serde(default = "default_notion_version")]
    pub notion_version: String,
}

fn default_notion_api_base() -> String {
    "https://api.notion.com/v1".to_string()
}
fn default_notion_version() -> String {
    "2022-06-28".to_string()
}

impl Default for NotionConfig {
    fn default() -> Self {
        Self {
            credentials: ClientCredentials {
                redirect_uri: Some("http://localhost:8000/auth/notion/callback".to_string()),
                ..Default::default()
            },
            api_base: default_notion_api_base(),
            notion_version: default_notion_version(),
        }
    }
}

impl ProvidersConfig {
    pub fn credentials(&self, provider: Provider) -> &ClientCredentials {
        match provider {
            Provider::Google => &self.google.credentials,
            Provider::OneDrive => &self.onedrive.credentials,
            Provider::Notion => &self.notion.credentials,
        }
    }

    /// Consent page that starts the authorization-code flow.
    pub fn authorize_endpoint(&self, provider: Provider) -> String {
        match provider {
            Provider::Google => "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
            Provider::OneDrive => format!(
                "https://login.microsoftonline.com/{}/oauth2/v2.0/authorize",
                self.onedrive.tenant
            ),
            Provider::Notion => "https://api.notion.com/v1/oauth/authorize".to_string(),
        }
    }
}

impl Config {
    /// Apply environment overrides for secrets and the hard download cap.
    pub fn with_env_overrides(mut self) -> Self {
        self.providers.google.credentials.overlay_env("GOOGLE");
        self.providers.onedrive.credentials.overlay_env("ONEDRIVE");
        self.providers.notion.credentials.overlay_env("NOTION");
        if let Ok(tenant) = std::env::var("ONEDRIVE_TENANT") {
            self.providers.onedrive.tenant = tenant;
        }
        if let Some(mb) = std::env::var("PREVIEW_HARD_CAP_MB")
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
        {
            self.download.hard_cap_mb = mb.max(1);
        }
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.download.concurrency == 0 {
            anyhow::bail!("download.concurrency must be >= 1");
        }
        if self.extract.max_chars == 0 || self.extract.pdf_max_chars == 0 {
            anyhow::bail!("extract.max_chars and extract.pdf_max_chars must be >= 1");
        }
        if self.extract.pdf_max_pages == 0 {
            anyhow::bail!("extract.pdf_max_pages must be >= 1");
        }
        let h = &self.http;
        if [
            h.metadata_timeout_secs,
            h.listing_timeout_secs,
            h.download_timeout_secs,
            h.token_timeout_secs,
        ]
        .contains(&0)
        {
            anyhow::bail!("http timeouts must be >= 1 second");
        }
        Ok(())
    }
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    let config = config.with_env_overrides();
    config.validate()?;
    Ok(config)
}

/// Load the config file. A missing file yields the defaults (plus env
/// overrides), so credentials can be supplied purely through the environment.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        let config = Config::default().with_env_overrides();
        config.validate()?;
        return Ok(config);
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}
