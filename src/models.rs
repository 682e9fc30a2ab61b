//! Core data models used throughout the ingestion pipeline.
//!
//! Tokens and connections are owned by the [`TokenStore`](crate::store::TokenStore);
//! document references and extracted documents are produced fresh for every
//! ingestion call and never read back as an authority.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Cloud provider an adapter talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Google,
    OneDrive,
    Notion,
}

impl Provider {
    /// Fixed order used when every connected provider is queried.
    pub const ALL: [Provider; 3] = [Provider::Google, Provider::OneDrive, Provider::Notion];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Google => "google",
            Provider::OneDrive => "onedrive",
            Provider::Notion => "notion",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "google" | "gdrive" | "drive" => Ok(Provider::Google),
            "onedrive" => Ok(Provider::OneDrive),
            "notion" => Ok(Provider::Notion),
            other => anyhow::bail!(
                "Unknown provider: '{}'. Available: google, onedrive, notion",
                other
            ),
        }
    }
}

/// OAuth token triple plus scope, as held by the token store.
///
/// `expires_at` is already the server-reported expiry minus the safety
/// margin; it is adjusted when the token is written, never when it is read.
/// `None` means the provider never reported an expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub token_type: String,
    pub scope: Option<String>,
    pub expires_at: Option<i64>,
}

impl Default for TokenRecord {
    fn default() -> Self {
        Self {
            access_token: None,
            refresh_token: None,
            token_type: "Bearer".to_string(),
            scope: None,
            expires_at: None,
        }
    }
}

impl TokenRecord {
    /// Merge a partial update into this record. Absent fields keep their
    /// previous value, so a refresh response without a new refresh token
    /// never erases the stored one.
    pub fn apply(&mut self, update: &TokenUpdate) {
        if let Some(ref v) = update.access_token {
            self.access_token = Some(v.clone());
        }
        if let Some(ref v) = update.refresh_token {
            self.refresh_token = Some(v.clone());
        }
        if let Some(ref v) = update.token_type {
            self.token_type = v.clone();
        }
        if let Some(ref v) = update.scope {
            self.scope = Some(v.clone());
        }
        if let Some(v) = update.expires_at {
            self.expires_at = Some(v);
        }
    }
}

/// Partial token write. `None` fields are preserved in the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenUpdate {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub token_type: Option<String>,
    pub scope: Option<String>,
    pub expires_at: Option<i64>,
}

/// One provider's stored credentials plus account metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub user: String,
    pub provider: Provider,
    pub token: TokenRecord,
    pub account_id: Option<String>,
    pub account_email: Option<String>,
    /// Freeform metadata (login time, workspace name, ...). Always a JSON object.
    pub meta: serde_json::Value,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Connection {
    pub fn new(user: &str, provider: Provider, token: TokenRecord) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            user: normalize_user(user),
            provider,
            token,
            account_id: None,
            account_email: None,
            meta: serde_json::json!({}),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Store keys are trimmed user names.
pub fn normalize_user(user: &str) -> String {
    user.trim().to_string()
}

/// A remote item identified by a listing call, before its content is fetched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRef {
    pub id: String,
    pub title: String,
    /// MIME type or file extension as reported by the provider.
    pub mime_or_ext: String,
    /// Reported size; unknown for some providers and item types.
    pub size_bytes: Option<u64>,
    pub web_url: Option<String>,
}

/// Why a document carries no readable text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Placeholder {
    /// Bytes were available but no text could be recovered.
    Binary { bytes: usize },
    /// Reported size exceeded the preview ceiling, or the download hit the hard cap.
    Oversized { bytes: u64 },
    /// Only the item type is known (download/export failed or not offered).
    TypeOnly { kind: String },
    Folder,
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Placeholder::Binary { bytes } => write!(f, "[binary {} bytes]", bytes),
            Placeholder::Oversized { bytes } => write!(f, "[oversized {} bytes]", bytes),
            Placeholder::TypeOnly { kind } => write!(f, "[type: {}]", kind),
            Placeholder::Folder => f.write_str("[folder]"),
        }
    }
}

/// Extraction result: recovered text or a non-content placeholder.
///
/// `Display` renders the legacy string form, where every placeholder starts
/// with `[`. Readability must be decided with [`Content::is_readable`], not
/// by inspecting that prefix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Content {
    Text(String),
    Placeholder(Placeholder),
}

impl Content {
    pub fn is_readable(&self) -> bool {
        matches!(self, Content::Text(t) if !t.is_empty())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Content::Text(t) => Some(t),
            Content::Placeholder(_) => None,
        }
    }
}

impl fmt::Display for Content {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Content::Text(t) => f.write_str(t),
            Content::Placeholder(p) => p.fmt(f),
        }
    }
}

impl From<Placeholder> for Content {
    fn from(p: Placeholder) -> Self {
        Content::Placeholder(p)
    }
}

/// A document with provenance and extracted content, as handed to the
/// question-answering step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedDocument {
    pub provider: Provider,
    pub doc: DocumentRef,
    pub content: Content,
    /// True when the text was cut to the character budget.
    pub truncated: bool,
}

impl ExtractedDocument {
    pub fn new(provider: Provider, doc: DocumentRef, content: Content, truncated: bool) -> Self {
        Self {
            provider,
            doc,
            content,
            truncated,
        }
    }

    pub fn placeholder(provider: Provider, doc: DocumentRef, placeholder: Placeholder) -> Self {
        Self::new(provider, doc, Content::Placeholder(placeholder), false)
    }

    /// Legacy string form of the content.
    pub fn text(&self) -> String {
        self.content.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_keeps_refresh_token_when_absent() {
        let mut rec = TokenRecord {
            access_token: Some("old-access".into()),
            refresh_token: Some("keep-me".into()),
            token_type: "Bearer".into(),
            scope: Some("a".into()),
            expires_at: Some(10),
        };
        rec.apply(&TokenUpdate {
            access_token: Some("new-access".into()),
            refresh_token: None,
            token_type: None,
            scope: Some("b".into()),
            expires_at: Some(99),
        });
        assert_eq!(rec.access_token.as_deref(), Some("new-access"));
        assert_eq!(rec.refresh_token.as_deref(), Some("keep-me"));
        assert_eq!(rec.scope.as_deref(), Some("b"));
        assert_eq!(rec.expires_at, Some(99));
    }

    #[test]
    fn placeholder_renders_legacy_sentinel() {
        let c = Content::from(Placeholder::Binary { bytes: 12 });
        assert_eq!(c.to_string(), "[binary 12 bytes]");
        assert!(!c.is_readable());
    }

    #[test]
    fn bracketed_text_is_still_readable() {
        let c = Content::Text("[ ] buy milk".into());
        assert!(c.is_readable());
        assert!(c.to_string().starts_with('['));
    }

    #[test]
    fn provider_parses_case_insensitively() {
        assert_eq!("OneDrive".parse::<Provider>().unwrap(), Provider::OneDrive);
        assert_eq!(" google ".parse::<Provider>().unwrap(), Provider::Google);
        assert!("dropbox".parse::<Provider>().is_err());
    }
}
