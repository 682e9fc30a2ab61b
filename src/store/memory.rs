//! In-memory [`TokenStore`] for tests and embedding.
//!
//! Uses a `HashMap` behind `std::sync::RwLock`; no lock is held across an
//! await point.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{normalize_user, Connection, Provider, TokenRecord, TokenUpdate};

use super::{merge_meta, TokenStore};

#[derive(Default)]
pub struct MemoryTokenStore {
    records: RwLock<HashMap<(String, Provider), Connection>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn key(user: &str, provider: Provider) -> (String, Provider) {
    (normalize_user(user), provider)
}

fn poisoned<T>(_: T) -> anyhow::Error {
    anyhow::anyhow!("token store lock poisoned")
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn get(&self, user: &str, provider: Provider) -> Result<Option<Connection>> {
        let records = self.records.read().map_err(poisoned)?;
        Ok(records.get(&key(user, provider)).cloned())
    }

    async fn put(&self, user: &str, provider: Provider, update: TokenUpdate) -> Result<()> {
        let mut records = self.records.write().map_err(poisoned)?;
        let conn = records
            .entry(key(user, provider))
            .or_insert_with(|| Connection::new(user, provider, TokenRecord::default()));
        conn.token.apply(&update);
        conn.updated_at = chrono::Utc::now().timestamp();
        Ok(())
    }

    async fn save_connection(&self, conn: &Connection) -> Result<()> {
        let mut records = self.records.write().map_err(poisoned)?;
        let k = key(&conn.user, conn.provider);
        let mut next = conn.clone();
        next.user = k.0.clone();
        if let Some(prev) = records.get(&k) {
            if next.token.refresh_token.is_none() {
                next.token.refresh_token = prev.token.refresh_token.clone();
            }
            next.created_at = prev.created_at;
        }
        next.updated_at = chrono::Utc::now().timestamp();
        records.insert(k, next);
        Ok(())
    }

    async fn delete(&self, user: &str, provider: Provider) -> Result<bool> {
        let mut records = self.records.write().map_err(poisoned)?;
        Ok(records.remove(&key(user, provider)).is_some())
    }

    async fn list(&self, user: &str) -> Result<Vec<Connection>> {
        let user = normalize_user(user);
        let records = self.records.read().map_err(poisoned)?;
        let mut out: Vec<Connection> = records
            .values()
            .filter(|c| c.user == user)
            .cloned()
            .collect();
        out.sort_by_key(|c| c.provider);
        Ok(out)
    }

    async fn update_meta(
        &self,
        user: &str,
        provider: Provider,
        patch: serde_json::Value,
    ) -> Result<bool> {
        let mut records = self.records.write().map_err(poisoned)?;
        match records.get_mut(&key(user, provider)) {
            Some(conn) => {
                merge_meta(&mut conn.meta, patch);
                conn.updated_at = chrono::Utc::now().timestamp();
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
