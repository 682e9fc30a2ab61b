//! Outbound HTTP plumbing shared by the provider adapters.
//!
//! Every call carries its own timeout (a timeout is a per-call failure, never
//! a batch-wide cancellation). Byte downloads go through the
//! [`DownloadThrottle`] and are streamed with a hard size cap so a single
//! item cannot exhaust memory.

use reqwest::{RequestBuilder, Response, StatusCode};
use std::time::Duration;

use crate::config::Config;
use crate::error::{IngestError, IngestResult};
use crate::models::Provider;
use crate::throttle::DownloadThrottle;

/// Shared client plus the limits every adapter applies.
#[derive(Clone, Debug)]
pub struct HttpContext {
    pub client: reqwest::Client,
    pub throttle: DownloadThrottle,
    pub metadata_timeout: Duration,
    pub listing_timeout: Duration,
    pub download_timeout: Duration,
    pub token_timeout: Duration,
    /// Items reporting a larger size are never downloaded.
    pub preview_max_bytes: u64,
    /// Streamed downloads stop past this many bytes.
    pub hard_cap_bytes: u64,
}

impl HttpContext {
    pub fn new(config: &Config, throttle: DownloadThrottle) -> Self {
        Self {
            client: reqwest::Client::new(),
            throttle,
            metadata_timeout: config.http.metadata_timeout(),
            listing_timeout: config.http.listing_timeout(),
            download_timeout: config.http.download_timeout(),
            token_timeout: config.http.token_timeout(),
            preview_max_bytes: config.download.preview_max_bytes,
            hard_cap_bytes: config.download.hard_cap_bytes(),
        }
    }

    /// Build a context straight from a config, with its own throttle.
    pub fn from_config(config: &Config) -> Self {
        Self::new(config, DownloadThrottle::new(config.download.concurrency))
    }
}

/// Outcome of a capped download.
#[derive(Debug)]
pub enum Downloaded {
    Bytes(Vec<u8>),
    /// The body was announced or grew past the hard cap; carries that size.
    TooLarge(u64),
}

/// Send a request, mapping transport failures and non-2xx statuses onto the
/// error taxonomy: 401 is [`IngestError::UpstreamUnauthorized`], anything
/// else [`IngestError::UpstreamError`].
pub async fn send(provider: Provider, req: RequestBuilder) -> IngestResult<Response> {
    let resp = req
        .send()
        .await
        .map_err(|source| IngestError::Transport { provider, source })?;
    check_status(provider, resp).await
}

pub async fn check_status(provider: Provider, resp: Response) -> IngestResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    if status == StatusCode::UNAUTHORIZED {
        return Err(IngestError::UpstreamUnauthorized { provider });
    }
    let body = resp.text().await.unwrap_or_default();
    Err(IngestError::upstream(provider, status.as_u16(), &body))
}

/// Send and decode a JSON body.
pub async fn send_json(provider: Provider, req: RequestBuilder) -> IngestResult<serde_json::Value> {
    let resp = send(provider, req).await?;
    resp.json::<serde_json::Value>()
        .await
        .map_err(|source| IngestError::Transport { provider, source })
}

/// GET a body while holding a throttle permit. The permit is released when
/// the download ends, on every path.
pub async fn download(
    ctx: &HttpContext,
    provider: Provider,
    req: RequestBuilder,
) -> IngestResult<Downloaded> {
    ctx.throttle
        .run(capped_body(ctx, provider, req))
        .await
}

async fn capped_body(
    ctx: &HttpContext,
    provider: Provider,
    req: RequestBuilder,
) -> IngestResult<Downloaded> {
    let mut resp = send(provider, req.timeout(ctx.download_timeout)).await?;

    if let Some(len) = resp.content_length() {
        if len > ctx.hard_cap_bytes {
            return Ok(Downloaded::TooLarge(len));
        }
    }

    let mut out = Vec::new();
    while let Some(chunk) = resp
        .chunk()
        .await
        .map_err(|source| IngestError::Transport { provider, source })?
    {
        if (out.len() + chunk.len()) as u64 > ctx.hard_cap_bytes {
            return Ok(Downloaded::TooLarge((out.len() + chunk.len()) as u64));
        }
        out.extend_from_slice(&chunk);
    }
    Ok(Downloaded::Bytes(out))
}

/// Read a size that providers report either as a JSON number or a string.
pub fn json_size(v: &serde_json::Value) -> Option<u64> {
    match v {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

pub fn json_str<'a>(v: &'a serde_json::Value, key: &str) -> &'a str {
    v.get(key).and_then(|x| x.as_str()).unwrap_or_default()
}
