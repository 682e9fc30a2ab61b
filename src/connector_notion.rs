//! Notion adapter: a workspace-wide search, newest edits first.
//!
//! The locator is ignored. Notion offers no byte download for pages, so
//! every result carries a type placeholder and only its title is useful.
//! The integration token never expires and is never refreshed.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use crate::config::NotionConfig;
use crate::error::IngestResult;
use crate::http::{self, json_str, HttpContext};
use crate::models::{DocumentRef, ExtractedDocument, Placeholder, Provider};
use crate::oauth::{ExpiryPolicy, OAuthClient};
use crate::store::TokenStore;
use crate::traits::{contain, ProviderAdapter};

const MAX_PAGE_SIZE: usize = 100;
const UNTITLED: &str = "Untitled";

/// Title of a search result: the first `title`-typed property of a page, or
/// the `title` array of a database.
pub fn result_title(item: &Value) -> String {
    let from_properties = item
        .get("properties")
        .and_then(Value::as_object)
        .and_then(|props| {
            props
                .values()
                .find(|p| json_str(p, "type") == "title")
                .and_then(|p| p.get("title"))
        });
    let title = from_properties
        .or_else(|| item.get("title"))
        .and_then(Value::as_array)
        .and_then(|parts| parts.first())
        .map(|part| json_str(part, "plain_text").trim().to_string())
        .unwrap_or_default();

    if title.is_empty() {
        UNTITLED.to_string()
    } else {
        title
    }
}

fn to_document(item: &Value) -> ExtractedDocument {
    let object = match json_str(item, "object") {
        "" => "page",
        o => o,
    };
    let doc = DocumentRef {
        id: json_str(item, "id").to_string(),
        title: result_title(item),
        mime_or_ext: format!("notion/{}", object),
        size_bytes: None,
        web_url: item.get("url").and_then(Value::as_str).map(str::to_string),
    };
    ExtractedDocument::placeholder(
        Provider::Notion,
        doc,
        Placeholder::TypeOnly {
            kind: format!("Notion {}", object),
        },
    )
}

pub struct NotionAdapter {
    oauth: OAuthClient,
    api_base: String,
    notion_version: String,
    http: HttpContext,
}

impl NotionAdapter {
    pub fn new(config: &NotionConfig, store: Arc<dyn TokenStore>, http: HttpContext) -> Self {
        // Permanent tokens never reach the token endpoint.
        let oauth = OAuthClient::new(
            Provider::Notion,
            ExpiryPolicy::Permanent,
            format!("{}/oauth/token", config.api_base.trim_end_matches('/')),
            config.credentials.clone(),
            store,
            http.client.clone(),
            http.token_timeout,
        );
        Self {
            oauth,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            notion_version: config.notion_version.clone(),
            http,
        }
    }

    async fn search(&self, user: &str, max_items: usize) -> IngestResult<Vec<ExtractedDocument>> {
        let page_size = max_items.clamp(1, MAX_PAGE_SIZE);
        let body = json!({
            "query": "",
            "page_size": page_size,
            "sort": {"direction": "descending", "timestamp": "last_edited_time"},
        });

        let data = self
            .oauth
            .call_with_retry(user, |token| {
                let req = self
                    .http
                    .client
                    .post(format!("{}/search", self.api_base))
                    .bearer_auth(token)
                    .header("Notion-Version", &self.notion_version)
                    .json(&body)
                    .timeout(self.http.listing_timeout);
                http::send_json(Provider::Notion, req)
            })
            .await?;

        let results = data
            .get("results")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or_default();
        Ok(results.iter().take(page_size).map(to_document).collect())
    }
}

#[async_trait]
impl ProviderAdapter for NotionAdapter {
    fn provider(&self) -> Provider {
        Provider::Notion
    }

    async fn enumerate(
        &self,
        user: &str,
        _locator: Option<&str>,
        max_items: usize,
    ) -> IngestResult<Vec<ExtractedDocument>> {
        contain(Provider::Notion, self.search(user, max_items).await)
    }
}
