//! Failure taxonomy for the ingestion pipeline.
//!
//! Failures are contained at the smallest unit: a single item degrades to a
//! placeholder, a single provider contributes nothing. Only
//! [`IngestError::AuthConfigMissing`] for an explicitly requested provider
//! reaches the caller.

use thiserror::Error;

use crate::models::Provider;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("{provider}: client id/secret not configured")]
    AuthConfigMissing { provider: Provider },

    #[error("{provider}: no usable token ({reason})")]
    TokenUnavailable { provider: Provider, reason: String },

    #[error("{provider}: upstream returned 401")]
    UpstreamUnauthorized { provider: Provider },

    #[error("{provider}: upstream returned HTTP {status}: {body}")]
    UpstreamError {
        provider: Provider,
        status: u16,
        body: String,
    },

    #[error("{provider}: request failed: {source}")]
    Transport {
        provider: Provider,
        #[source]
        source: reqwest::Error,
    },

    #[error("token store error: {0}")]
    Store(#[from] anyhow::Error),
}

impl IngestError {
    /// Configuration-level failures are the only ones surfaced to callers.
    pub fn is_config(&self) -> bool {
        matches!(self, IngestError::AuthConfigMissing { .. })
    }

    pub fn token_unavailable(provider: Provider, reason: impl Into<String>) -> Self {
        IngestError::TokenUnavailable {
            provider,
            reason: reason.into(),
        }
    }

    pub(crate) fn upstream(provider: Provider, status: u16, body: &str) -> Self {
        IngestError::UpstreamError {
            provider,
            status,
            body: body.chars().take(500).collect(),
        }
    }
}

pub type IngestResult<T> = Result<T, IngestError>;
