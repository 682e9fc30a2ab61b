//! Durable per-(user, provider) connection records.
//!
//! The [`TokenStore`] trait is the only way the pipeline touches stored
//! credentials, so adapters can run against the in-memory store in tests and
//! the SQLite store in the binary.
//!
//! Write semantics shared by every implementation:
//!
//! - [`put`](TokenStore::put) is a partial merge: absent fields keep their
//!   previous value. In particular a refresh response without a refresh token
//!   never erases the stored one (last non-null wins).
//! - [`save_connection`](TokenStore::save_connection) upserts the whole
//!   record, as the OAuth callback does, with the same refresh-token rule.
//! - [`delete`](TokenStore::delete) is immediate and unconditional.
//! - User names are trimmed on every access.
//!
//! There is no locking around refreshes: concurrent writers race and the
//! last one wins, which is safe because each write is a complete, valid
//! token.

pub mod memory;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Connection, Provider, TokenUpdate};

pub use memory::MemoryTokenStore;
pub use sqlite::{CachedDocument, SqliteTokenStore};

#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn get(&self, user: &str, provider: Provider) -> Result<Option<Connection>>;

    /// Merge a partial token update. Creates the record if absent.
    async fn put(&self, user: &str, provider: Provider, update: TokenUpdate) -> Result<()>;

    /// Upsert a full connection (initial OAuth callback).
    async fn save_connection(&self, conn: &Connection) -> Result<()>;

    /// Returns whether a record existed.
    async fn delete(&self, user: &str, provider: Provider) -> Result<bool>;

    /// All connections for a user, ordered by provider.
    async fn list(&self, user: &str) -> Result<Vec<Connection>>;

    /// Shallow-merge `patch` (a JSON object) into the connection's metadata.
    /// Returns whether a record existed.
    async fn update_meta(
        &self,
        user: &str,
        provider: Provider,
        patch: serde_json::Value,
    ) -> Result<bool>;
}

/// Shallow JSON object merge; non-object patches are ignored.
pub(crate) fn merge_meta(target: &mut serde_json::Value, patch: serde_json::Value) {
    let serde_json::Value::Object(patch) = patch else {
        return;
    };
    if !target.is_object() {
        *target = serde_json::json!({});
    }
    if let Some(obj) = target.as_object_mut() {
        for (k, v) in patch {
            obj.insert(k, v);
        }
    }
}
