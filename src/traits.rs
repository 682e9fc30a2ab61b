//! The provider adapter seam.
//!
//! Each cloud provider implements [`ProviderAdapter`] independently; there
//! is no shared base type carrying behavior. The orchestrator only ever sees
//! the single capability `enumerate`.
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │             AdapterRegistry              │
//! │  ┌─────────┐ ┌──────────┐ ┌───────────┐  │
//! │  │ Google  │ │ OneDrive │ │  Notion   │  │
//! │  │  Drive  │ │  Graph   │ │  search   │  │
//! │  └─────────┘ └──────────┘ └───────────┘  │
//! └──────────────┬───────────────────────────┘
//!                ▼
//!          ingest() → (title, text) pairs
//! ```

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::Config;
use crate::connector_gdrive::DriveAdapter;
use crate::connector_notion::NotionAdapter;
use crate::connector_onedrive::OneDriveAdapter;
use crate::error::IngestResult;
use crate::extract::{self, Limits};
use crate::http::{Downloaded, HttpContext};
use crate::models::{DocumentRef, ExtractedDocument, Placeholder, Provider};
use crate::store::TokenStore;

// ═══════════════════════════════════════════════════════════════════════
// Adapter Trait
// ═══════════════════════════════════════════════════════════════════════

/// A cloud provider that can list items and return their extracted text.
///
/// # Contract
///
/// - Per-item failures never escape: the item is returned with a
///   placeholder and the remaining items are still processed.
/// - Token and upstream failures for the listing itself are logged and
///   yield an empty list.
/// - The only error an implementation returns is
///   [`IngestError::AuthConfigMissing`](crate::error::IngestError::AuthConfigMissing).
/// - Every byte download holds a permit of the shared download throttle.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn provider(&self) -> Provider;

    /// List up to `max_items` items under `locator` (folder id, item id or
    /// share link; `None` or empty means the provider's default scope) and
    /// extract each item's text.
    async fn enumerate(
        &self,
        user: &str,
        locator: Option<&str>,
        max_items: usize,
    ) -> IngestResult<Vec<ExtractedDocument>>;
}

/// Apply the adapter contract to a listing result: configuration errors
/// propagate, everything else becomes an empty contribution.
pub fn contain(
    provider: Provider,
    result: IngestResult<Vec<ExtractedDocument>>,
) -> IngestResult<Vec<ExtractedDocument>> {
    match result {
        Ok(docs) => Ok(docs),
        Err(e) if e.is_config() => Err(e),
        Err(e) => {
            tracing::warn!(provider = %provider, error = %e, "provider contributes no documents");
            Ok(Vec::new())
        }
    }
}

/// Turn one item's download outcome into a document. A failed download
/// keeps the item with `on_failure`; an over-cap body keeps its size.
pub(crate) fn materialize(
    provider: Provider,
    doc: DocumentRef,
    filename: &str,
    downloaded: IngestResult<Downloaded>,
    on_failure: Placeholder,
    limits: &Limits,
) -> ExtractedDocument {
    match downloaded {
        Ok(Downloaded::Bytes(bytes)) => {
            let out = extract::extract(filename, &bytes, limits);
            ExtractedDocument::new(provider, doc, out.content, out.truncated)
        }
        Ok(Downloaded::TooLarge(bytes)) => {
            ExtractedDocument::placeholder(provider, doc, Placeholder::Oversized { bytes })
        }
        Err(e) => {
            tracing::debug!(provider = %provider, id = %doc.id, error = %e, "item download failed");
            ExtractedDocument::placeholder(provider, doc, on_failure)
        }
    }
}

/// Treat an empty locator like an absent one.
pub(crate) fn normalize_locator(locator: Option<&str>) -> Option<&str> {
    locator.map(str::trim).filter(|l| !l.is_empty())
}

// ═══════════════════════════════════════════════════════════════════════
// AdapterRegistry
// ═══════════════════════════════════════════════════════════════════════

/// Adapters keyed by provider.
#[derive(Default, Clone)]
pub struct AdapterRegistry {
    adapters: BTreeMap<Provider, Arc<dyn ProviderAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// All three built-in adapters sharing one store, HTTP client and
    /// download throttle.
    pub fn with_builtins(config: &Config, store: Arc<dyn TokenStore>, http: HttpContext) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(DriveAdapter::new(
            &config.providers.google,
            &config.extract,
            store.clone(),
            http.clone(),
        )));
        registry.register(Arc::new(OneDriveAdapter::new(
            &config.providers.onedrive,
            &config.extract,
            store.clone(),
            http.clone(),
        )));
        registry.register(Arc::new(NotionAdapter::new(
            &config.providers.notion,
            store,
            http,
        )));
        registry
    }

    /// Register an adapter, replacing any previous one for the same provider.
    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(adapter.provider(), adapter);
    }

    pub fn get(&self, provider: Provider) -> Option<&Arc<dyn ProviderAdapter>> {
        self.adapters.get(&provider)
    }

    pub fn providers(&self) -> Vec<Provider> {
        self.adapters.keys().copied().collect()
    }
}
