//! Google Drive adapter.
//!
//! Resolves a locator (folder/file URL or bare id) to Drive items, then
//! fetches each item's bytes and extracts its text.
//!
//! # Locators
//!
//! | Shape | Example |
//! |-------|---------|
//! | Folder URL | `https://drive.google.com/drive/folders/<id>` |
//! | File URL | `https://drive.google.com/file/d/<id>/view` |
//! | Docs/Sheets/Slides URL | `https://docs.google.com/document/d/<id>/edit` |
//! | Query parameter | `...open?id=<id>` |
//! | Bare id | 20+ characters of `[A-Za-z0-9_-]` |
//! | Empty | the user's most recently modified files |
//!
//! # Content
//!
//! Google-native documents have no bytes of their own and are exported
//! server-side first (Docs → DOCX, Sheets → XLSX, Slides → PPTX, anything
//! else → PDF). Regular files are downloaded directly unless their reported
//! size exceeds the preview ceiling, in which case only the type is kept.

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::sync::{Arc, LazyLock};

use crate::config::{ExtractConfig, GoogleConfig};
use crate::error::{IngestError, IngestResult};
use crate::extract::Limits;
use crate::http::{self, HttpContext};
use crate::models::{DocumentRef, ExtractedDocument, Placeholder, Provider};
use crate::oauth::{ExpiryPolicy, OAuthClient};
use crate::store::TokenStore;
use crate::traits::{contain, materialize, normalize_locator, ProviderAdapter};

const FOLDER_MIME: &str = "application/vnd.google-apps.folder";
const NATIVE_PREFIX: &str = "application/vnd.google-apps.";
const FILE_FIELDS: &str = "id,name,mimeType,size,webViewLink";
const LIST_FIELDS: &str = "files(id,name,mimeType,size,webViewLink)";
const MAX_PAGE_SIZE: usize = 1000;

static LINK_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"/folders/([a-zA-Z0-9_-]+)",
        r"/file/d/([a-zA-Z0-9_-]+)",
        r"/document/d/([a-zA-Z0-9_-]+)",
        r"/spreadsheets/d/([a-zA-Z0-9_-]+)",
        r"/presentation/d/([a-zA-Z0-9_-]+)",
        r"id=([a-zA-Z0-9_-]+)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static pattern"))
    .collect()
});

static BARE_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]{20,}$").expect("static pattern"));

/// Pull a Drive item id out of a URL, or accept an opaque id as-is.
pub fn extract_drive_id(link: &str) -> Option<String> {
    let link = link.trim();
    LINK_PATTERNS
        .iter()
        .find_map(|re| re.captures(link).map(|c| c[1].to_string()))
        .or_else(|| BARE_ID.is_match(link).then(|| link.to_string()))
}

/// Export target for a Google-native MIME type: (MIME, extension).
pub fn export_target(native_mime: &str) -> (&'static str, &'static str) {
    match native_mime {
        "application/vnd.google-apps.document" => (crate::extract::MIME_DOCX, ".docx"),
        "application/vnd.google-apps.spreadsheet" => (crate::extract::MIME_XLSX, ".xlsx"),
        "application/vnd.google-apps.presentation" => (crate::extract::MIME_PPTX, ".pptx"),
        _ => (crate::extract::MIME_PDF, ".pdf"),
    }
}

/// File resource as returned by `files.get` / `files.list`.
#[derive(Debug, Clone, Deserialize)]
struct DriveFile {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(rename = "mimeType", default)]
    mime_type: String,
    #[serde(default)]
    size: Option<serde_json::Value>,
    #[serde(rename = "webViewLink", default)]
    web_view_link: Option<String>,
}

impl DriveFile {
    fn doc_ref(&self) -> DocumentRef {
        DocumentRef {
            id: self.id.clone(),
            title: self.name.clone(),
            mime_or_ext: self.mime_type.clone(),
            size_bytes: self.size.as_ref().and_then(http::json_size),
            web_url: self.web_view_link.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

pub struct DriveAdapter {
    oauth: OAuthClient,
    api_base: String,
    http: HttpContext,
    limits: Limits,
}

impl DriveAdapter {
    pub fn new(
        config: &GoogleConfig,
        extract: &ExtractConfig,
        store: Arc<dyn TokenStore>,
        http: HttpContext,
    ) -> Self {
        let oauth = OAuthClient::new(
            Provider::Google,
            ExpiryPolicy::Refreshable,
            config.token_url.clone(),
            config.credentials.clone(),
            store,
            http.client.clone(),
            http.token_timeout,
        );
        Self {
            oauth,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            http,
            limits: Limits::from(extract),
        }
    }

    async fn scan(
        &self,
        user: &str,
        locator: Option<&str>,
        max_items: usize,
    ) -> IngestResult<Vec<ExtractedDocument>> {
        let max = max_items.clamp(1, MAX_PAGE_SIZE);

        let (token, files) = match normalize_locator(locator) {
            None => {
                self.oauth
                    .call_with_token(user, None, |token| self.list_recent(token, max))
                    .await?
            }
            Some(link) => {
                let Some(id) = extract_drive_id(link) else {
                    tracing::debug!(locator = link, "not a recognizable Drive link");
                    return Ok(Vec::new());
                };
                let (token, meta) = self
                    .oauth
                    .call_with_token(user, None, |token| self.get_metadata(token, &id))
                    .await?;
                if meta.mime_type == FOLDER_MIME {
                    self.oauth
                        .call_with_token(user, Some(token), |token| {
                            self.list_folder(token, &meta.id, max)
                        })
                        .await?
                } else {
                    (token, vec![meta])
                }
            }
        };

        // Item fetches reuse the token the listing succeeded with.
        let docs = futures::future::join_all(
            files
                .into_iter()
                .take(max)
                .map(|f| self.fetch_item(&token, f)),
        )
        .await;
        Ok(docs)
    }

    // ============ Listing ============

    async fn get_metadata(&self, token: String, id: &str) -> IngestResult<DriveFile> {
        let req = self
            .http
            .client
            .get(format!("{}/files/{}", self.api_base, id))
            .bearer_auth(token)
            .query(&[("fields", FILE_FIELDS), ("supportsAllDrives", "true")])
            .timeout(self.http.metadata_timeout);
        let value = http::send_json(Provider::Google, req).await?;
        serde_json::from_value(value)
            .map_err(|e| IngestError::upstream(Provider::Google, 200, &e.to_string()))
    }

    async fn list_folder(
        &self,
        token: String,
        folder_id: &str,
        max: usize,
    ) -> IngestResult<Vec<DriveFile>> {
        let q = format!("'{}' in parents and trashed = false", folder_id);
        self.list(token, &q, None, max).await
    }

    async fn list_recent(&self, token: String, max: usize) -> IngestResult<Vec<DriveFile>> {
        let q = format!("trashed = false and mimeType != '{}'", FOLDER_MIME);
        self.list(token, &q, Some("modifiedTime desc"), max).await
    }

    async fn list(
        &self,
        token: String,
        q: &str,
        order_by: Option<&str>,
        max: usize,
    ) -> IngestResult<Vec<DriveFile>> {
        let page_size = max.to_string();
        let mut params = vec![
            ("q", q),
            ("pageSize", page_size.as_str()),
            ("fields", LIST_FIELDS),
        ];
        if let Some(order) = order_by {
            params.push(("orderBy", order));
        }
        let req = self
            .http
            .client
            .get(format!("{}/files", self.api_base))
            .bearer_auth(token)
            .query(&params)
            .timeout(self.http.listing_timeout);
        let value = http::send_json(Provider::Google, req).await?;
        let list: FileList = serde_json::from_value(value)
            .map_err(|e| IngestError::upstream(Provider::Google, 200, &e.to_string()))?;
        Ok(list.files)
    }

    // ============ Content ============

    /// Fetch and extract one item. Never fails: problems become placeholders.
    async fn fetch_item(&self, token: &str, file: DriveFile) -> ExtractedDocument {
        let doc = file.doc_ref();
        let type_only = Placeholder::TypeOnly {
            kind: file.mime_type.clone(),
        };

        if file.mime_type == FOLDER_MIME {
            return ExtractedDocument::placeholder(Provider::Google, doc, Placeholder::Folder);
        }

        if file.mime_type.starts_with(NATIVE_PREFIX) {
            let (target, ext) = export_target(&file.mime_type);
            let req = self
                .http
                .client
                .get(format!("{}/files/{}/export", self.api_base, file.id))
                .bearer_auth(token)
                .query(&[("mimeType", target)]);
            let result = http::download(&self.http, Provider::Google, req).await;
            let name = format!("{}{}", file.name, ext);
            return materialize(Provider::Google, doc, &name, result, type_only, &self.limits);
        }

        if let Some(size) = doc.size_bytes {
            if size > self.http.preview_max_bytes {
                tracing::debug!(id = %file.id, size, "over preview ceiling, not downloading");
                return ExtractedDocument::placeholder(Provider::Google, doc, type_only);
            }
        }

        let req = self
            .http
            .client
            .get(format!("{}/files/{}", self.api_base, file.id))
            .bearer_auth(token)
            .query(&[("alt", "media"), ("supportsAllDrives", "true")]);
        let result = http::download(&self.http, Provider::Google, req).await;
        let name = file.name.clone();
        materialize(Provider::Google, doc, &name, result, type_only, &self.limits)
    }
}

#[async_trait]
impl ProviderAdapter for DriveAdapter {
    fn provider(&self) -> Provider {
        Provider::Google
    }

    async fn enumerate(
        &self,
        user: &str,
        locator: Option<&str>,
        max_items: usize,
    ) -> IngestResult<Vec<ExtractedDocument>> {
        contain(Provider::Google, self.scan(user, locator, max_items).await)
    }
}
