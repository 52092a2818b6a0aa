//! Metadata Store
//!
//! Relational store for statement rows, tree-state history, the
//! singleton tree-size cursor, tile/receipt audit indexes, and service
//! configuration/keys. The tile log (`crate::tile`) owns tile bytes in
//! the blob store; this module owns everything queryable. See
//! `sqlite.rs` for the concrete `rusqlite`-backed implementation.

pub mod sqlite;

use async_trait::async_trait;
use thiserror::Error;

/// Metadata store errors.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("duplicate statement: entry {entry_id} already has hash {statement_hash}")]
    Duplicate {
        entry_id: u64,
        statement_hash: String,
    },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("connection pool error: {0}")]
    Connection(String),
}

pub type MetadataResult<T> = std::result::Result<T, MetadataError>;

/// A row in `statements`, one per registered entry.
#[derive(Debug, Clone, PartialEq)]
pub struct StatementRow {
    pub entry_id: u64,
    pub statement_hash: String,
    pub iss: Option<String>,
    pub sub: Option<String>,
    pub cty: Option<String>,
    pub typ: Option<String>,
    pub payload_hash_alg: i64,
    pub payload_hash: String,
    pub preimage_content_type: Option<String>,
    pub payload_location: Option<String>,
    pub registered_at: i64,
    pub tree_size_at_registration: u64,
    pub entry_tile_key: String,
    pub entry_tile_offset: u32,
}

/// Fields needed to insert a new statement row; `entry_id` and
/// `registered_at` are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewStatement {
    pub statement_hash: String,
    pub iss: Option<String>,
    pub sub: Option<String>,
    pub cty: Option<String>,
    pub typ: Option<String>,
    pub payload_hash_alg: i64,
    pub payload_hash: String,
    pub preimage_content_type: Option<String>,
    pub payload_location: Option<String>,
    pub tree_size_at_registration: u64,
    pub entry_tile_key: String,
    pub entry_tile_offset: u32,
}

/// A row in `tree_state`: one published checkpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeStateRow {
    pub tree_size: u64,
    pub root_hash: String,
    pub checkpoint_storage_key: Option<String>,
    pub checkpoint_signed_note: Option<String>,
    pub updated_at: i64,
}

/// A row in `tiles`, recording a tile written to the blob store.
#[derive(Debug, Clone, PartialEq)]
pub struct TileRow {
    pub level: i64,
    pub tile_index: u64,
    pub storage_key: String,
    pub is_partial: bool,
    pub width: Option<u32>,
    pub tile_hash: String,
    pub created_at: i64,
}

/// A row in `receipts`, an audit index over issued receipts.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceiptRow {
    pub entry_id: u64,
    pub receipt_hash: String,
    pub storage_key: String,
    pub created_at: i64,
    pub tree_size: u64,
    pub leaf_index: u64,
}

/// A row in `service_keys`.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceKeyRow {
    pub kid: String,
    pub public_key: String,
    pub private_key: Option<String>,
    pub algorithm: String,
    pub created_at: i64,
    pub active: bool,
}

/// Abstract metadata store capability. All mutating operations other
/// than `advance_tree_size` are append-only; `statements` rows are
/// never updated once written.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// Insert a new statement row and advance `current_tree_size` to
    /// `tree_size_at_registration + 1` in the same logical transaction.
    /// Returns `MetadataError::Duplicate` if `statement_hash` already
    /// exists, naming the existing entry_id.
    async fn insert_statement(&self, row: NewStatement) -> MetadataResult<StatementRow>;

    /// Look up a statement by its assigned entry_id.
    async fn get_statement_by_entry_id(&self, entry_id: u64) -> MetadataResult<Option<StatementRow>>;

    /// Look up a statement by its (unique) statement hash.
    async fn get_statement_by_hash(&self, statement_hash: &str) -> MetadataResult<Option<StatementRow>>;

    /// List statements in entry_id order, optionally filtered, for
    /// auditing and the ordered-recomputation root path.
    async fn list_statement_hashes(&self, up_to_tree_size: u64) -> MetadataResult<Vec<String>>;

    /// The authoritative current tree size cursor.
    async fn current_tree_size(&self) -> MetadataResult<u64>;

    /// Record a published checkpoint.
    async fn insert_tree_state(&self, row: TreeStateRow) -> MetadataResult<()>;

    /// Look up a historical checkpoint by tree size.
    async fn get_tree_state(&self, tree_size: u64) -> MetadataResult<Option<TreeStateRow>>;

    /// Record a tile write (optional audit index).
    async fn insert_tile(&self, row: TileRow) -> MetadataResult<()>;

    /// Look up a tile's audit row by (level, tile_index).
    async fn get_tile(&self, level: i64, tile_index: u64) -> MetadataResult<Option<TileRow>>;

    /// Record an issued receipt (optional audit index; receipts remain
    /// recomputable without this row).
    async fn insert_receipt(&self, row: ReceiptRow) -> MetadataResult<()>;

    /// Set a `service_config` key/value pair.
    async fn set_config(&self, key: &str, value: &str) -> MetadataResult<()>;

    /// Read a `service_config` value.
    async fn get_config(&self, key: &str) -> MetadataResult<Option<String>>;

    /// Insert or update a service key row.
    async fn upsert_service_key(&self, row: ServiceKeyRow) -> MetadataResult<()>;

    /// List all active service keys.
    async fn list_active_service_keys(&self) -> MetadataResult<Vec<ServiceKeyRow>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_statement(hash: &str, tree_size: u64) -> NewStatement {
        NewStatement {
            statement_hash: hash.to_string(),
            iss: Some("issuer.example".to_string()),
            sub: None,
            cty: None,
            typ: None,
            payload_hash_alg: -16,
            payload_hash: "deadbeef".to_string(),
            preimage_content_type: None,
            payload_location: None,
            tree_size_at_registration: tree_size,
            entry_tile_key: "tile/entries/000".to_string(),
            entry_tile_offset: tree_size as u32,
        }
    }

    #[tokio::test]
    async fn test_insert_and_get_by_entry_id() {
        let store = sqlite::SqliteMetadataStore::in_memory().unwrap();
        let row = store
            .insert_statement(sample_statement("hash-0", 0))
            .await
            .unwrap();
        assert_eq!(row.entry_id, 0);

        let fetched = store.get_statement_by_entry_id(0).await.unwrap().unwrap();
        assert_eq!(fetched.statement_hash, "hash-0");
    }

    #[tokio::test]
    async fn test_duplicate_hash_rejected() {
        let store = sqlite::SqliteMetadataStore::in_memory().unwrap();
        store
            .insert_statement(sample_statement("hash-dup", 0))
            .await
            .unwrap();

        let err = store
            .insert_statement(sample_statement("hash-dup", 1))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            MetadataError::Duplicate { entry_id: 0, .. }
        ));
    }

    #[tokio::test]
    async fn test_current_tree_size_advances() {
        let store = sqlite::SqliteMetadataStore::in_memory().unwrap();
        assert_eq!(store.current_tree_size().await.unwrap(), 0);

        store
            .insert_statement(sample_statement("hash-a", 0))
            .await
            .unwrap();
        assert_eq!(store.current_tree_size().await.unwrap(), 1);

        store
            .insert_statement(sample_statement("hash-b", 1))
            .await
            .unwrap();
        assert_eq!(store.current_tree_size().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_list_statement_hashes_in_order() {
        let store = sqlite::SqliteMetadataStore::in_memory().unwrap();
        store.insert_statement(sample_statement("h0", 0)).await.unwrap();
        store.insert_statement(sample_statement("h1", 1)).await.unwrap();
        store.insert_statement(sample_statement("h2", 2)).await.unwrap();

        let hashes = store.list_statement_hashes(2).await.unwrap();
        assert_eq!(hashes, vec!["h0".to_string(), "h1".to_string()]);
    }

    #[tokio::test]
    async fn test_config_roundtrip() {
        let store = sqlite::SqliteMetadataStore::in_memory().unwrap();
        store.set_config("origin", "https://log.example").await.unwrap();
        assert_eq!(
            store.get_config("origin").await.unwrap(),
            Some("https://log.example".to_string())
        );
        assert_eq!(store.get_config("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_service_key_roundtrip() {
        let store = sqlite::SqliteMetadataStore::in_memory().unwrap();
        store
            .upsert_service_key(ServiceKeyRow {
                kid: "abc123".to_string(),
                public_key: "pub".to_string(),
                private_key: Some("priv".to_string()),
                algorithm: "ES256".to_string(),
                created_at: 0,
                active: true,
            })
            .await
            .unwrap();

        let keys = store.list_active_service_keys().await.unwrap();
        assert_eq!(keys.len(), 1);
        assert_eq!(keys[0].kid, "abc123");
    }
}
