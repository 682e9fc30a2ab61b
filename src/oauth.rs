//! Access-token lifecycle for the refreshable providers.
//!
//! [`OAuthClient::valid_access_token`] returns the stored access token while
//! it is comfortably inside its lifetime and otherwise performs exactly one
//! synchronous refresh-token grant against the provider's token endpoint.
//! There is no retry and no per-user lock: concurrent callers may each
//! refresh, and each write is a complete token, so the last writer wins.
//!
//! Expiry bookkeeping: a refreshed token is stored with
//! `expires_at = now + expires_in - 60`, and a token is considered stale
//! when `expires_at < now + 60`.

use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{ClientCredentials, ProvidersConfig};
use crate::error::{IngestError, IngestResult};
use crate::models::{Provider, TokenUpdate};
use crate::store::TokenStore;

/// Safety margin, in seconds, applied both when writing and checking expiry.
pub const EXPIRY_MARGIN_SECS: i64 = 60;
/// Assumed lifetime when a token response omits `expires_in`.
const DEFAULT_EXPIRES_IN: i64 = 3600;

/// How a provider's tokens age.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryPolicy {
    /// Tokens expire and are renewed with a refresh-token grant. A missing
    /// expiry is treated as stale.
    Refreshable,
    /// The token never expires and is never refreshed.
    Permanent,
}

/// Token endpoint response for a refresh-token grant.
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    token_type: Option<String>,
    scope: Option<String>,
    expires_in: Option<i64>,
}

/// One provider's token endpoint plus the application's credentials.
#[derive(Clone)]
pub struct OAuthClient {
    provider: Provider,
    policy: ExpiryPolicy,
    token_url: String,
    credentials: ClientCredentials,
    store: Arc<dyn TokenStore>,
    client: reqwest::Client,
    timeout: Duration,
}

impl OAuthClient {
    pub fn new(
        provider: Provider,
        policy: ExpiryPolicy,
        token_url: impl Into<String>,
        credentials: ClientCredentials,
        store: Arc<dyn TokenStore>,
        client: reqwest::Client,
        timeout: Duration,
    ) -> Self {
        Self {
            provider,
            policy,
            token_url: token_url.into(),
            credentials,
            store,
            client,
            timeout,
        }
    }

    pub fn store(&self) -> &Arc<dyn TokenStore> {
        &self.store
    }

    /// Whether a token with this expiry must be refreshed before use.
    pub fn needs_refresh(&self, expires_at: Option<i64>, now: i64) -> bool {
        match self.policy {
            ExpiryPolicy::Permanent => false,
            ExpiryPolicy::Refreshable => match expires_at {
                Some(at) => at < now + EXPIRY_MARGIN_SECS,
                None => true,
            },
        }
    }

    /// Return a usable access token, refreshing first if the stored one is
    /// stale.
    pub async fn valid_access_token(&self, user: &str) -> IngestResult<String> {
        let conn = self
            .store
            .get(user, self.provider)
            .await?
            .ok_or_else(|| IngestError::token_unavailable(self.provider, "not connected"))?;

        let now = chrono::Utc::now().timestamp();
        if self.needs_refresh(conn.token.expires_at, now) {
            return self.refresh(user).await;
        }
        conn.token
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| IngestError::token_unavailable(self.provider, "no access token stored"))
    }

    /// Run an authenticated call. A 401 triggers exactly one refresh and one
    /// retry of the same call; a second 401 becomes `TokenUnavailable`.
    pub async fn call_with_retry<T, F, Fut>(&self, user: &str, call: F) -> IngestResult<T>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = IngestResult<T>>,
    {
        self.call_with_token(user, None, call)
            .await
            .map(|(_, value)| value)
    }

    /// Like [`call_with_retry`](Self::call_with_retry), starting from `token`
    /// when one is already in hand, and handing back the token that
    /// succeeded so follow-up requests reuse it instead of re-reading the
    /// store.
    pub async fn call_with_token<T, F, Fut>(
        &self,
        user: &str,
        token: Option<String>,
        mut call: F,
    ) -> IngestResult<(String, T)>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = IngestResult<T>>,
    {
        let token = match token {
            Some(t) => t,
            None => self.valid_access_token(user).await?,
        };
        match call(token.clone()).await {
            Ok(value) => Ok((token, value)),
            Err(IngestError::UpstreamUnauthorized { .. }) => {
                tracing::debug!(provider = %self.provider, "401, refreshing once and retrying");
                let token = self.refresh(user).await?;
                match call(token.clone()).await {
                    Ok(value) => Ok((token, value)),
                    Err(IngestError::UpstreamUnauthorized { .. }) => Err(
                        IngestError::token_unavailable(self.provider, "unauthorized after refresh"),
                    ),
                    Err(e) => Err(e),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Perform one refresh-token grant and store the merged result.
    pub async fn refresh(&self, user: &str) -> IngestResult<String> {
        if self.policy == ExpiryPolicy::Permanent {
            return Err(IngestError::token_unavailable(
                self.provider,
                "token cannot be refreshed",
            ));
        }

        let stored = self.store.get(user, self.provider).await?;
        let refresh_token = stored
            .and_then(|c| c.token.refresh_token)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| IngestError::token_unavailable(self.provider, "no refresh token"))?;

        let (client_id, client_secret) = self
            .credentials
            .pair()
            .ok_or(IngestError::AuthConfigMissing {
                provider: self.provider,
            })?;

        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token.trim()),
            ("client_id", client_id),
            ("client_secret", client_secret),
        ];
        let resp = self
            .client
            .post(&self.token_url)
            .timeout(self.timeout)
            .form(&form)
            .send()
            .await
            .map_err(|e| IngestError::token_unavailable(self.provider, e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!(
                provider = %self.provider,
                status = status.as_u16(),
                body = %body.chars().take(200).collect::<String>(),
                "token refresh failed"
            );
            return Err(IngestError::token_unavailable(
                self.provider,
                format!("refresh returned HTTP {}", status.as_u16()),
            ));
        }

        let body: RefreshResponse = resp
            .json()
            .await
            .map_err(|e| IngestError::token_unavailable(self.provider, e.to_string()))?;
        let access_token = body
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                IngestError::token_unavailable(self.provider, "refresh response had no access token")
            })?;

        let now = chrono::Utc::now().timestamp();
        let expires_in = body.expires_in.unwrap_or(DEFAULT_EXPIRES_IN);
        self.store
            .put(
                user,
                self.provider,
                TokenUpdate {
                    access_token: Some(access_token.clone()),
                    refresh_token: body.refresh_token.filter(|t| !t.is_empty()),
                    token_type: body.token_type,
                    scope: body.scope,
                    expires_at: Some(now + expires_in - EXPIRY_MARGIN_SECS),
                },
            )
            .await?;
        tracing::debug!(provider = %self.provider, user, "access token refreshed");
        Ok(access_token)
    }
}

/// Consent URL a user opens to grant access; the provider then redirects
/// to the configured `redirect_uri` with an authorization code.
pub fn authorize_url(
    providers: &ProvidersConfig,
    provider: Provider,
    state: Option<&str>,
) -> anyhow::Result<String> {
    let creds = providers.credentials(provider);
    let present = |v: &Option<String>| v.clone().filter(|s| !s.trim().is_empty());
    let (Some(client_id), Some(redirect_uri)) =
        (present(&creds.client_id), present(&creds.redirect_uri))
    else {
        return Err(IngestError::AuthConfigMissing { provider }.into());
    };
    let scope = creds.scopes.join(" ");

    let mut params: Vec<(&str, &str)> = vec![
        ("client_id", client_id.as_str()),
        ("redirect_uri", redirect_uri.as_str()),
        ("response_type", "code"),
    ];
    match provider {
        Provider::Google => params.extend([("access_type", "offline"), ("prompt", "consent")]),
        Provider::OneDrive => params.extend([("response_mode", "query"), ("prompt", "consent")]),
        Provider::Notion => params.push(("owner", "user")),
    }
    // Notion grants are configured on the integration, not per request.
    if provider != Provider::Notion && !scope.is_empty() {
        params.push(("scope", scope.as_str()));
    }
    if let Some(state) = state.filter(|s| !s.is_empty()) {
        params.push(("state", state));
    }

    let url = reqwest::Url::parse_with_params(&providers.authorize_endpoint(provider), &params)?;
    Ok(url.into())
}
