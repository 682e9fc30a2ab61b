//! SQLite-backed [`TokenStore`] plus the display-only document cache.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use sqlx::{Row, SqlitePool};
use std::path::Path;

use crate::models::{
    normalize_user, Connection, ExtractedDocument, Provider, TokenRecord, TokenUpdate,
};

use super::{merge_meta, TokenStore};

/// Cached previews are cut to this many characters.
const CACHE_PREVIEW_CHARS: usize = 500;

pub struct SqliteTokenStore {
    pool: SqlitePool,
}

/// A row of the document cache.
#[derive(Debug, Clone, Serialize)]
pub struct CachedDocument {
    pub provider: String,
    pub doc_id: String,
    pub title: Option<String>,
    pub preview: Option<String>,
    pub updated_at: i64,
}

impl SqliteTokenStore {
    /// Wrap an existing pool and ensure the schema exists.
    pub async fn new(pool: SqlitePool) -> Result<Self> {
        crate::migrate::apply(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn open(path: &Path) -> Result<Self> {
        let pool = crate::db::open(path).await?;
        Self::new(pool).await
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Record previews of freshly ingested documents for display. Earlier
    /// titles/previews survive when the new value is empty.
    pub async fn cache_documents(&self, user: &str, docs: &[ExtractedDocument]) -> Result<()> {
        let user = normalize_user(user);
        let now = chrono::Utc::now().timestamp();
        for doc in docs {
            if doc.doc.id.is_empty() {
                continue;
            }
            let preview: String = doc.text().chars().take(CACHE_PREVIEW_CHARS).collect();
            let title = Some(doc.doc.title.clone()).filter(|t| !t.is_empty());
            sqlx::query(
                r#"
                INSERT INTO document_cache (user_name, provider, doc_id, doc_title, content_preview,
                                            created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT(user_name, provider, doc_id) DO UPDATE SET
                    doc_title = COALESCE(excluded.doc_title, document_cache.doc_title),
                    content_preview = COALESCE(excluded.content_preview, document_cache.content_preview),
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&user)
            .bind(doc.provider.as_str())
            .bind(&doc.doc.id)
            .bind(title)
            .bind(Some(preview).filter(|p| !p.is_empty()))
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    /// Newest first.
    pub async fn cached_documents(
        &self,
        user: &str,
        provider: Option<Provider>,
        limit: i64,
    ) -> Result<Vec<CachedDocument>> {
        let user = normalize_user(user);
        let rows = match provider {
            Some(p) => {
                sqlx::query(
                    "SELECT provider, doc_id, doc_title, content_preview, updated_at FROM document_cache \
                     WHERE user_name = ? AND provider = ? ORDER BY updated_at DESC LIMIT ?",
                )
                .bind(&user)
                .bind(p.as_str())
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    "SELECT provider, doc_id, doc_title, content_preview, updated_at FROM document_cache \
                     WHERE user_name = ? ORDER BY updated_at DESC LIMIT ?",
                )
                .bind(&user)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };
        Ok(rows
            .iter()
            .map(|row| CachedDocument {
                provider: row.get("provider"),
                doc_id: row.get("doc_id"),
                title: row.get("doc_title"),
                preview: row.get("content_preview"),
                updated_at: row.get("updated_at"),
            })
            .collect())
    }
}

fn row_to_connection(row: &sqlx::sqlite::SqliteRow) -> Result<Connection> {
    let provider: String = row.get("provider");
    let meta_json: String = row.get("meta_json");
    Ok(Connection {
        user: row.get("user_name"),
        provider: provider.parse()?,
        token: TokenRecord {
            access_token: row.get("access_token"),
            refresh_token: row.get("refresh_token"),
            token_type: row.get("token_type"),
            scope: row.get("scope"),
            expires_at: row.get("expires_at"),
        },
        account_id: row.get("account_id"),
        account_email: row.get("account_email"),
        meta: serde_json::from_str(&meta_json).unwrap_or_else(|_| serde_json::json!({})),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

#[async_trait]
impl TokenStore for SqliteTokenStore {
    async fn get(&self, user: &str, provider: Provider) -> Result<Option<Connection>> {
        let row = sqlx::query("SELECT * FROM connections WHERE user_name = ? AND provider = ?")
            .bind(normalize_user(user))
            .bind(provider.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(row_to_connection).transpose()
    }

    async fn put(&self, user: &str, provider: Provider, update: TokenUpdate) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO connections (user_name, provider, access_token, refresh_token, token_type,
                                     scope, expires_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, COALESCE(?, 'Bearer'), ?, ?, ?, ?)
            ON CONFLICT(user_name, provider) DO UPDATE SET
                access_token = COALESCE(excluded.access_token, connections.access_token),
                refresh_token = COALESCE(excluded.refresh_token, connections.refresh_token),
                token_type = COALESCE(?, connections.token_type),
                scope = COALESCE(excluded.scope, connections.scope),
                expires_at = COALESCE(excluded.expires_at, connections.expires_at),
                updated_at = excluded.updated_at
            "#,
        )
        .bind(normalize_user(user))
        .bind(provider.as_str())
        .bind(&update.access_token)
        .bind(&update.refresh_token)
        .bind(&update.token_type)
        .bind(&update.scope)
        .bind(update.expires_at)
        .bind(now)
        .bind(now)
        .bind(&update.token_type)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to update {} token", provider))?;
        Ok(())
    }

    async fn save_connection(&self, conn: &Connection) -> Result<()> {
        let now = chrono::Utc::now().timestamp();
        sqlx::query(
            r#"
            INSERT INTO connections (user_name, provider, access_token, refresh_token, token_type,
                                     scope, expires_at, meta_json, account_id, account_email,
                                     created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(user_name, provider) DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = COALESCE(excluded.refresh_token, connections.refresh_token),
                token_type = excluded.token_type,
                scope = excluded.scope,
                expires_at = excluded.expires_at,
                meta_json = excluded.meta_json,
                account_id = excluded.account_id,
                account_email = excluded.account_email,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(normalize_user(&conn.user))
        .bind(conn.provider.as_str())
        .bind(&conn.token.access_token)
        .bind(&conn.token.refresh_token)
        .bind(&conn.token.token_type)
        .bind(&conn.token.scope)
        .bind(conn.token.expires_at)
        .bind(conn.meta.to_string())
        .bind(&conn.account_id)
        .bind(&conn.account_email)
        .bind(conn.created_at)
        .bind(now)
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to save {} connection", conn.provider))?;
        Ok(())
    }

    async fn delete(&self, user: &str, provider: Provider) -> Result<bool> {
        let res = sqlx::query("DELETE FROM connections WHERE user_name = ? AND provider = ?")
            .bind(normalize_user(user))
            .bind(provider.as_str())
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn list(&self, user: &str) -> Result<Vec<Connection>> {
        let rows = sqlx::query("SELECT * FROM connections WHERE user_name = ? ORDER BY provider")
            .bind(normalize_user(user))
            .fetch_all(&self.pool)
            .await?;
        let mut out = rows
            .iter()
            .map(row_to_connection)
            .collect::<Result<Vec<_>>>()?;
        out.sort_by_key(|c| c.provider);
        Ok(out)
    }

    async fn update_meta(
        &self,
        user: &str,
        provider: Provider,
        patch: serde_json::Value,
    ) -> Result<bool> {
        let Some(mut conn) = self.get(user, provider).await? else {
            return Ok(false);
        };
        merge_meta(&mut conn.meta, patch);
        let res = sqlx::query(
            "UPDATE connections SET meta_json = ?, updated_at = ? WHERE user_name = ? AND provider = ?",
        )
        .bind(conn.meta.to_string())
        .bind(chrono::Utc::now().timestamp())
        .bind(normalize_user(user))
        .bind(provider.as_str())
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }
}
