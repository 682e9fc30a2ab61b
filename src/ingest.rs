//! Ingestion orchestration.
//!
//! Resolves which providers to query, fans `enumerate` out to their adapters
//! concurrently and concatenates the results in provider order. A provider
//! that fails contributes nothing; only a missing client configuration for a
//! provider the caller named explicitly is returned as an error.

use std::fmt;
use std::sync::Arc;

use crate::config::Config;
use crate::error::{IngestError, IngestResult};
use crate::http::HttpContext;
use crate::models::{ExtractedDocument, Provider};
use crate::store::{SqliteTokenStore, TokenStore};
use crate::traits::AdapterRegistry;

/// Which providers an ingestion run queries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderSelection {
    /// Every provider the user has a stored connection for.
    Auto,
    /// Exactly these providers, in this order.
    Only(Vec<Provider>),
}

impl ProviderSelection {
    pub fn single(provider: Provider) -> Self {
        ProviderSelection::Only(vec![provider])
    }
}

/// What one provider contributed to a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderOutcome {
    Contributed(usize),
    Skipped(String),
}

impl fmt::Display for ProviderOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderOutcome::Contributed(n) => write!(f, "{} documents", n),
            ProviderOutcome::Skipped(reason) => write!(f, "skipped: {}", reason),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct IngestReport {
    pub documents: Vec<ExtractedDocument>,
    pub outcomes: Vec<(Provider, ProviderOutcome)>,
}

impl IngestReport {
    pub fn providers(&self) -> Vec<Provider> {
        self.outcomes.iter().map(|(p, _)| *p).collect()
    }
}

pub struct Ingestor {
    registry: AdapterRegistry,
    store: Arc<dyn TokenStore>,
}

impl Ingestor {
    pub fn new(registry: AdapterRegistry, store: Arc<dyn TokenStore>) -> Self {
        Self { registry, store }
    }

    /// Providers a run with `selection` would query, in query order.
    pub async fn resolve(
        &self,
        user: &str,
        selection: &ProviderSelection,
    ) -> IngestResult<Vec<Provider>> {
        match selection {
            ProviderSelection::Only(list) => {
                let mut out = Vec::with_capacity(list.len());
                for p in list {
                    if !out.contains(p) {
                        out.push(*p);
                    }
                }
                Ok(out)
            }
            ProviderSelection::Auto => {
                let connected: Vec<Provider> = self
                    .store
                    .list(user)
                    .await?
                    .into_iter()
                    .map(|c| c.provider)
                    .collect();
                Ok(Provider::ALL
                    .into_iter()
                    .filter(|p| connected.contains(p) && self.registry.get(*p).is_some())
                    .collect())
            }
        }
    }

    /// Run one ingestion. Documents keep each adapter's order and are
    /// grouped by provider in resolution order; duplicates across providers
    /// are kept.
    pub async fn ingest(
        &self,
        user: &str,
        selection: &ProviderSelection,
        locator: Option<&str>,
        max_per_provider: usize,
    ) -> IngestResult<IngestReport> {
        let providers = self.resolve(user, selection).await?;
        let explicit = matches!(selection, ProviderSelection::Only(_));

        let runs = providers.iter().map(|&provider| async move {
            let result = match self.registry.get(provider) {
                Some(adapter) => adapter.enumerate(user, locator, max_per_provider).await,
                None => return (provider, None),
            };
            (provider, Some(result))
        });
        let results = futures::future::join_all(runs).await;

        let mut report = IngestReport::default();
        for (provider, result) in results {
            match result {
                None => {
                    tracing::warn!(provider = %provider, "no adapter registered");
                    report
                        .outcomes
                        .push((provider, ProviderOutcome::Skipped("no adapter".into())));
                }
                Some(Ok(mut docs)) => {
                    for d in &mut docs {
                        d.provider = provider;
                    }
                    tracing::info!(provider = %provider, count = docs.len(), "provider enumerated");
                    report
                        .outcomes
                        .push((provider, ProviderOutcome::Contributed(docs.len())));
                    report.documents.extend(docs);
                }
                Some(Err(e)) if explicit && e.is_config() => return Err(e),
                Some(Err(e)) => {
                    tracing::warn!(provider = %provider, error = %e, "provider skipped");
                    report
                        .outcomes
                        .push((provider, ProviderOutcome::Skipped(skip_reason(&e))));
                }
            }
        }
        Ok(report)
    }
}

fn skip_reason(e: &IngestError) -> String {
    match e {
        IngestError::AuthConfigMissing { .. } => "client credentials not configured".into(),
        other => other.to_string(),
    }
}

// ============ CLI ============

/// The SQLite store plus an ingestor over the built-in adapters, sharing
/// one HTTP client and one download throttle.
pub async fn open_pipeline(
    config: &Config,
) -> anyhow::Result<(Arc<SqliteTokenStore>, Ingestor)> {
    let store = Arc::new(SqliteTokenStore::open(&config.db.path).await?);
    let http = HttpContext::from_config(config);
    tracing::debug!(download_permits = http.throttle.capacity(), "pipeline ready");
    let registry = AdapterRegistry::with_builtins(config, store.clone(), http);
    Ok((store.clone(), Ingestor::new(registry, store)))
}

/// `dh ingest`: run the orchestrator, cache previews, print documents.
pub async fn run_ingest(
    config: &Config,
    user: &str,
    selection: &ProviderSelection,
    locator: Option<&str>,
    max_per_provider: usize,
    json: bool,
) -> anyhow::Result<()> {
    let (store, ingestor) = open_pipeline(config).await?;
    let report = ingestor
        .ingest(user, selection, locator, max_per_provider)
        .await?;

    // The cache is display-only; failing to write it does not fail the run.
    if let Err(e) = store.cache_documents(user, &report.documents).await {
        tracing::warn!(error = %e, "document cache not updated");
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&report.documents)?);
    } else {
        for (provider, outcome) in &report.outcomes {
            println!("{:<10} {}", provider.as_str(), outcome);
        }
        println!();
        for d in &report.documents {
            let text: String = d.text().chars().take(80).collect();
            println!(
                "[{}] {}{}\n    {}",
                d.provider,
                d.doc.title,
                if d.truncated { " (truncated)" } else { "" },
                text
            );
        }
        println!();
        println!("{} documents", report.documents.len());
    }

    store.close().await;
    Ok(())
}
