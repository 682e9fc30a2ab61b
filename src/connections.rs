//! Connection management commands: `dh connect`, `dh connections`,
//! `dh disconnect` and `dh cache`.
//!
//! `connect` stores a token set the way an OAuth callback would, so the
//! pipeline can be driven from a shell without a web front end.

use anyhow::Result;

use crate::config::Config;
use crate::models::{Connection, Provider, TokenRecord};
use crate::oauth::EXPIRY_MARGIN_SECS;
use crate::store::{SqliteTokenStore, TokenStore};

/// Token fields as a provider's token endpoint returns them.
#[derive(Debug, Clone, Default)]
pub struct ConnectArgs {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<i64>,
    pub scope: Option<String>,
    pub account_email: Option<String>,
}

/// Build the record an authorization-code exchange would store. Notion
/// tokens never expire, so they carry no expiry.
pub fn connection_from_grant(
    user: &str,
    provider: Provider,
    args: &ConnectArgs,
    now: i64,
) -> Connection {
    let expires_at = match provider {
        Provider::Notion => None,
        _ => args.expires_in.map(|secs| now + secs - EXPIRY_MARGIN_SECS),
    };
    let mut conn = Connection::new(
        user,
        provider,
        TokenRecord {
            access_token: Some(args.access_token.clone()),
            refresh_token: args.refresh_token.clone(),
            scope: args.scope.clone(),
            expires_at,
            ..Default::default()
        },
    );
    conn.account_email = args.account_email.clone();
    conn.meta = serde_json::json!({ "login_at": now, "connected_via": "cli" });
    conn
}

pub async fn run_connect(
    config: &Config,
    user: &str,
    provider: Provider,
    args: ConnectArgs,
) -> Result<()> {
    let store = SqliteTokenStore::open(&config.db.path).await?;
    let now = chrono::Utc::now().timestamp();
    store
        .save_connection(&connection_from_grant(user, provider, &args, now))
        .await?;
    tracing::info!(user, provider = %provider, "connection stored");
    println!("Connected {} for {}.", provider, user.trim());
    store.close().await;
    Ok(())
}

pub async fn run_connections(config: &Config, user: &str) -> Result<()> {
    let store = SqliteTokenStore::open(&config.db.path).await?;
    let conns = store.list(user).await?;

    if conns.is_empty() {
        println!("No connections for {}.", user.trim());
        store.close().await;
        return Ok(());
    }

    println!(
        "{:<10} {:<28} {:<8} {:<20} UPDATED",
        "PROVIDER", "ACCOUNT", "REFRESH", "EXPIRES"
    );
    println!("{}", "-".repeat(80));
    let now = chrono::Utc::now().timestamp();
    for c in &conns {
        println!(
            "{:<10} {:<28} {:<8} {:<20} {}",
            c.provider.as_str(),
            c.account_email.as_deref().unwrap_or("-"),
            if c.token.refresh_token.is_some() { "yes" } else { "no" },
            format_expiry(c.token.expires_at, now),
            format_seen(c.updated_at, now)
        );
    }

    store.close().await;
    Ok(())
}

pub async fn run_disconnect(config: &Config, user: &str, provider: Provider) -> Result<()> {
    let store = SqliteTokenStore::open(&config.db.path).await?;
    if store.delete(user, provider).await? {
        println!("Disconnected {} for {}.", provider, user.trim());
    } else {
        println!("{} was not connected for {}.", provider, user.trim());
    }
    store.close().await;
    Ok(())
}

pub async fn run_cache(
    config: &Config,
    user: &str,
    provider: Option<Provider>,
    limit: i64,
) -> Result<()> {
    let store = SqliteTokenStore::open(&config.db.path).await?;
    let rows = store.cached_documents(user, provider, limit).await?;

    println!("{:<10} {:<36} {:<14} PREVIEW", "PROVIDER", "TITLE", "SEEN");
    println!("{}", "-".repeat(96));
    let now = chrono::Utc::now().timestamp();
    for r in &rows {
        let title = r.title.as_deref().unwrap_or(&r.doc_id);
        let preview: String = r
            .preview
            .as_deref()
            .unwrap_or_default()
            .chars()
            .take(40)
            .collect();
        println!(
            "{:<10} {:<36} {:<14} {}",
            r.provider,
            title.chars().take(36).collect::<String>(),
            format_seen(r.updated_at, now),
            preview
        );
    }
    println!();
    println!("{} cached documents", rows.len());

    store.close().await;
    Ok(())
}

/// Compact span with at most two units: `45s`, `12m`, `3h 5m`, `2d 4h`.
fn span(secs: i64) -> String {
    let secs = secs.max(0);
    let (d, h, m) = (secs / 86_400, secs % 86_400 / 3600, secs % 3600 / 60);
    match (d, h, m) {
        (0, 0, 0) => format!("{}s", secs),
        (0, 0, m) => format!("{}m", m),
        (0, h, 0) => format!("{}h", h),
        (0, h, m) => format!("{}h {}m", h, m),
        (d, 0, _) => format!("{}d", d),
        (d, h, _) => format!("{}d {}h", d, h),
    }
}

/// Token state as the refresh logic sees it at `now`.
fn format_expiry(expires_at: Option<i64>, now: i64) -> String {
    match expires_at {
        None => "never".to_string(),
        Some(at) if at <= now => "expired".to_string(),
        Some(at) if at < now + EXPIRY_MARGIN_SECS => "refresh due".to_string(),
        Some(at) => format!("in {}", span(at - now)),
    }
}

fn format_seen(ts: i64, now: i64) -> String {
    match now - ts {
        age if (0..60).contains(&age) => "just now".to_string(),
        age if (60..30 * 86_400).contains(&age) => format!("{} ago", span(age)),
        _ => chrono::DateTime::from_timestamp(ts, 0)
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| ts.to_string()),
    }
}
