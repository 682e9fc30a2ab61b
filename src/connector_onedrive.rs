//! OneDrive adapter.
//!
//! A share link is first resolved anonymously through the shares API (the
//! link is encoded into an opaque share id). If that yields nothing, the
//! adapter falls back to the signed-in user's own drive root via Microsoft
//! Graph, which is the only authenticated call and the only one subject to
//! refresh-and-retry.

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde_json::Value;
use std::sync::Arc;

use crate::config::{ExtractConfig, OneDriveConfig};
use crate::error::IngestResult;
use crate::extract::Limits;
use crate::http::{self, json_size, json_str, HttpContext};
use crate::models::{DocumentRef, ExtractedDocument, Placeholder, Provider};
use crate::oauth::{ExpiryPolicy, OAuthClient};
use crate::store::TokenStore;
use crate::traits::{contain, materialize, normalize_locator, ProviderAdapter};

const MAX_ITEMS: usize = 1000;
const FILE_KIND: &str = "OneDrive file";

/// Opaque share id for a sharing URL: `u!` + unpadded URL-safe base64.
pub fn share_id(link: &str) -> String {
    format!("u!{}", URL_SAFE_NO_PAD.encode(link.trim().as_bytes()))
}

fn download_url(item: &Value) -> Option<&str> {
    ["@content.downloadUrl", "@microsoft.graph.downloadUrl"]
        .iter()
        .find_map(|k| item.get(*k).and_then(Value::as_str))
        .filter(|u| !u.is_empty())
}

fn is_folder(item: &Value) -> bool {
    item.get("folder").is_some()
}

fn doc_ref(item: &Value) -> DocumentRef {
    let name = json_str(item, "name");
    let mime = item
        .get("file")
        .map(|f| json_str(f, "mimeType"))
        .filter(|m| !m.is_empty());
    let mime_or_ext = match mime {
        Some(m) => m.to_string(),
        None => name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default(),
    };
    DocumentRef {
        id: json_str(item, "id").to_string(),
        title: name.to_string(),
        mime_or_ext,
        size_bytes: item.get("size").and_then(json_size),
        web_url: item
            .get("webUrl")
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}

/// Children of a drive item (`children`) or of a listing (`value`).
fn children(data: &Value) -> Vec<Value> {
    ["children", "value"]
        .iter()
        .find_map(|k| data.get(*k).and_then(Value::as_array))
        .cloned()
        .unwrap_or_default()
}

pub struct OneDriveAdapter {
    oauth: OAuthClient,
    graph_base: String,
    shares_base: String,
    http: HttpContext,
    limits: Limits,
}

impl OneDriveAdapter {
    pub fn new(
        config: &OneDriveConfig,
        extract: &ExtractConfig,
        store: Arc<dyn TokenStore>,
        http: HttpContext,
    ) -> Self {
        let oauth = OAuthClient::new(
            Provider::OneDrive,
            ExpiryPolicy::Refreshable,
            config.token_url(),
            config.credentials.clone(),
            store,
            http.client.clone(),
            http.token_timeout,
        );
        Self {
            oauth,
            graph_base: config.graph_base.trim_end_matches('/').to_string(),
            shares_base: config.shares_base.trim_end_matches('/').to_string(),
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
        let max = max_items.clamp(1, MAX_ITEMS);

        if let Some(link) = normalize_locator(locator) {
            match self.resolve_share(link, max).await {
                Ok(docs) if !docs.is_empty() => return Ok(docs),
                Ok(_) => tracing::debug!("share link resolved to no items, using own drive"),
                Err(e) => tracing::debug!(error = %e, "share lookup failed, using own drive"),
            }
        }

        self.list_own_root(user, max).await
    }

    // ============ Shares ============

    async fn resolve_share(&self, link: &str, max: usize) -> IngestResult<Vec<ExtractedDocument>> {
        let req = self
            .http
            .client
            .get(format!(
                "{}/shares/{}/driveItem",
                self.shares_base,
                share_id(link)
            ))
            .query(&[("expand", "children")])
            .timeout(self.http.metadata_timeout);
        let data = http::send_json(Provider::OneDrive, req).await?;

        let mut items = children(&data);
        // A link to a single file has no children; the item is the document.
        if items.is_empty() && data.get("file").is_some() {
            items.push(data);
        }

        let docs = futures::future::join_all(
            items
                .iter()
                .take(max)
                .map(|item| self.fetch_item(item)),
        )
        .await;
        Ok(docs)
    }

    // ============ Own drive ============

    async fn list_own_root(&self, user: &str, max: usize) -> IngestResult<Vec<ExtractedDocument>> {
        let data = self
            .oauth
            .call_with_retry(user, |token| async move {
                let req = self
                    .http
                    .client
                    .get(format!("{}/me/drive/root/children", self.graph_base))
                    .bearer_auth(token)
                    .query(&[("$top", max.to_string())])
                    .timeout(self.http.listing_timeout);
                http::send_json(Provider::OneDrive, req).await
            })
            .await?;

        let items = children(&data);
        let docs = futures::future::join_all(
            items
                .iter()
                .take(max)
                .map(|item| self.fetch_item(item)),
        )
        .await;
        Ok(docs)
    }

    /// Download and extract one item when it offers a download URL.
    /// Pre-authenticated download URLs need no bearer token.
    async fn fetch_item(&self, item: &Value) -> ExtractedDocument {
        let doc = doc_ref(item);
        let type_only = Placeholder::TypeOnly {
            kind: FILE_KIND.to_string(),
        };

        if is_folder(item) {
            return ExtractedDocument::placeholder(Provider::OneDrive, doc, Placeholder::Folder);
        }

        let Some(url) = download_url(item) else {
            return ExtractedDocument::placeholder(Provider::OneDrive, doc, type_only);
        };

        // Unknown size still downloads; the streamed hard cap applies.
        if let Some(size) = doc.size_bytes {
            if size > self.http.preview_max_bytes {
                tracing::debug!(id = %doc.id, size, "over preview ceiling, not downloading");
                return ExtractedDocument::placeholder(Provider::OneDrive, doc, type_only);
            }
        }

        let req = self.http.client.get(url);
        let result = http::download(&self.http, Provider::OneDrive, req).await;
        let name = doc.title.clone();
        materialize(Provider::OneDrive, doc, &name, result, type_only, &self.limits)
    }
}

#[async_trait]
impl ProviderAdapter for OneDriveAdapter {
    fn provider(&self) -> Provider {
        Provider::OneDrive
    }

    async fn enumerate(
        &self,
        user: &str,
        locator: Option<&str>,
        max_items: usize,
    ) -> IngestResult<Vec<ExtractedDocument>> {
        contain(Provider::OneDrive, self.scan(user, locator, max_items).await)
    }
}
