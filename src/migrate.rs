use anyhow::Result;
use sqlx::SqlitePool;

use crate::config::Config;
use crate::db;

pub async fn run_migrations(config: &Config) -> Result<()> {
    let pool = db::connect(config).await?;
    apply(&pool).await?;
    pool.close().await;
    Ok(())
}

/// Create every table and index. Idempotent.
pub async fn apply(pool: &SqlitePool) -> Result<()> {
    // One row per (user, provider) connection
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS connections (
            user_name TEXT NOT NULL,
            provider TEXT NOT NULL,
            access_token TEXT,
            refresh_token TEXT,
            token_type TEXT NOT NULL DEFAULT 'Bearer',
            scope TEXT,
            expires_at INTEGER,
            meta_json TEXT NOT NULL DEFAULT '{}',
            account_id TEXT,
            account_email TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (user_name, provider)
        )
        "#,
    )
    .execute(pool)
    .await?;

    // Best-effort preview cache for display; never read by the pipeline
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS document_cache (
            user_name TEXT NOT NULL,
            provider TEXT NOT NULL,
            doc_id TEXT NOT NULL,
            doc_title TEXT,
            content_preview TEXT,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (user_name, provider, doc_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_document_cache_updated_at ON document_cache(user_name, updated_at DESC)",
    )
    .execute(pool)
    .await?;

    Ok(())
}
