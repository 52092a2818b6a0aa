//! SQLite Metadata Store
//!
//! Durable storage for statement rows, tree-state history and the
//! `current_tree_size` cursor, pooled via r2d2 exactly as the teacher's
//! `storage/sqlite.rs` pools deposit records. `insert_statement` commits
//! the new row and the size advance in one transaction, matching the
//! atomicity contract: a reader who observes `current_tree_size = n`
//! always sees a statement row for every `entry_id < n`.

use async_trait::async_trait;
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use std::path::Path;

use super::{
    MetadataError, MetadataResult, MetadataStore, NewStatement, ReceiptRow, ServiceKeyRow,
    StatementRow, TileRow, TreeStateRow,
};

/// SQLite-backed metadata store with connection pooling.
pub struct SqliteMetadataStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteMetadataStore {
    /// Open (or create) the database at `db_path` and run migrations.
    pub fn new<P: AsRef<Path>>(db_path: P) -> MetadataResult<Self> {
        if let Some(parent) = db_path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let manager = SqliteConnectionManager::file(db_path);
        let pool = Pool::builder()
            .max_size(10)
            .build(manager)
            .map_err(|e| MetadataError::Connection(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations()?;
        Ok(store)
    }

    /// An in-memory store, for tests and embedders without a durable
    /// backend.
    pub fn in_memory() -> MetadataResult<Self> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| MetadataError::Connection(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations()?;
        Ok(store)
    }

    fn conn(&self) -> MetadataResult<PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| MetadataError::Connection(e.to_string()))
    }

    fn run_migrations(&self) -> MetadataResult<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS statements (
                entry_id INTEGER PRIMARY KEY AUTOINCREMENT,
                statement_hash TEXT NOT NULL UNIQUE,
                iss TEXT,
                sub TEXT,
                cty TEXT,
                typ TEXT,
                payload_hash_alg INTEGER NOT NULL,
                payload_hash TEXT NOT NULL,
                preimage_content_type TEXT,
                payload_location TEXT,
                registered_at INTEGER NOT NULL,
                tree_size_at_registration INTEGER NOT NULL,
                entry_tile_key TEXT NOT NULL,
                entry_tile_offset INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_statements_iss ON statements(iss);
            CREATE INDEX IF NOT EXISTS idx_statements_sub ON statements(sub);
            CREATE INDEX IF NOT EXISTS idx_statements_cty ON statements(cty);
            CREATE INDEX IF NOT EXISTS idx_statements_typ ON statements(typ);
            CREATE INDEX IF NOT EXISTS idx_statements_registered_at ON statements(registered_at);

            CREATE TABLE IF NOT EXISTS tree_state (
                tree_size INTEGER PRIMARY KEY,
                root_hash TEXT NOT NULL,
                checkpoint_storage_key TEXT,
                checkpoint_signed_note TEXT,
                updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS current_tree_size (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                tree_size INTEGER NOT NULL,
                last_updated INTEGER NOT NULL
            );

            INSERT OR IGNORE INTO current_tree_size (id, tree_size, last_updated)
            VALUES (1, 0, 0);

            CREATE TABLE IF NOT EXISTS tiles (
                tile_id INTEGER PRIMARY KEY AUTOINCREMENT,
                level INTEGER NOT NULL,
                tile_index INTEGER NOT NULL,
                storage_key TEXT NOT NULL UNIQUE,
                is_partial INTEGER NOT NULL,
                width INTEGER,
                tile_hash TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                UNIQUE(level, tile_index)
            );

            CREATE TABLE IF NOT EXISTS receipts (
                entry_id INTEGER PRIMARY KEY,
                receipt_hash TEXT NOT NULL,
                storage_key TEXT NOT NULL UNIQUE,
                created_at INTEGER NOT NULL,
                tree_size INTEGER NOT NULL,
                leaf_index INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS service_config (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS service_keys (
                kid TEXT PRIMARY KEY,
                public_key TEXT NOT NULL,
                private_key TEXT,
                algorithm TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                active INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS schema_version (
                version INTEGER PRIMARY KEY,
                applied_at INTEGER NOT NULL
            );

            INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, 0);
            "#,
        )
        .map_err(|e| MetadataError::Database(e.to_string()))?;

        Ok(())
    }

    fn row_to_statement(row: &rusqlite::Row) -> rusqlite::Result<StatementRow> {
        Ok(StatementRow {
            entry_id: row.get::<_, i64>("entry_id")? as u64,
            statement_hash: row.get("statement_hash")?,
            iss: row.get("iss")?,
            sub: row.get("sub")?,
            cty: row.get("cty")?,
            typ: row.get("typ")?,
            payload_hash_alg: row.get("payload_hash_alg")?,
            payload_hash: row.get("payload_hash")?,
            preimage_content_type: row.get("preimage_content_type")?,
            payload_location: row.get("payload_location")?,
            registered_at: row.get("registered_at")?,
            tree_size_at_registration: row.get::<_, i64>("tree_size_at_registration")? as u64,
            entry_tile_key: row.get("entry_tile_key")?,
            entry_tile_offset: row.get::<_, i64>("entry_tile_offset")? as u32,
        })
    }

    fn insert_statement_sync(&self, new_row: NewStatement) -> MetadataResult<StatementRow> {
        let mut conn = self.conn()?;
        let now = now_unix();

        let tx = conn
            .transaction()
            .map_err(|e| MetadataError::Database(e.to_string()))?;

        let entry_id: i64 = tx
            .query_row(
                "SELECT tree_size FROM current_tree_size WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .map_err(|e| MetadataError::Database(e.to_string()))?;

        let insert_result = tx.execute(
            r#"
            INSERT INTO statements (
                entry_id, statement_hash, iss, sub, cty, typ, payload_hash_alg, payload_hash,
                preimage_content_type, payload_location, registered_at,
                tree_size_at_registration, entry_tile_key, entry_tile_offset
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
            "#,
            params![
                entry_id,
                new_row.statement_hash,
                new_row.iss,
                new_row.sub,
                new_row.cty,
                new_row.typ,
                new_row.payload_hash_alg,
                new_row.payload_hash,
                new_row.preimage_content_type,
                new_row.payload_location,
                now,
                new_row.tree_size_at_registration as i64,
                new_row.entry_tile_key,
                new_row.entry_tile_offset as i64,
            ],
        );

        if let Err(rusqlite::Error::SqliteFailure(ref err, _)) = insert_result {
            if err.extended_code == 2067 || err.extended_code == 1555 {
                let existing_entry_id: i64 = tx
                    .query_row(
                        "SELECT entry_id FROM statements WHERE statement_hash = ?1",
                        params![new_row.statement_hash],
                        |row| row.get(0),
                    )
                    .map_err(|e| MetadataError::Database(e.to_string()))?;
                return Err(MetadataError::Duplicate {
                    entry_id: existing_entry_id as u64,
                    statement_hash: new_row.statement_hash,
                });
            }
        }
        insert_result.map_err(|e| MetadataError::Database(e.to_string()))?;

        tx.execute(
            "UPDATE current_tree_size SET tree_size = ?1, last_updated = ?2 WHERE id = 1",
            params![entry_id + 1, now],
        )
        .map_err(|e| MetadataError::Database(e.to_string()))?;

        tx.commit()
            .map_err(|e| MetadataError::Database(e.to_string()))?;

        Ok(StatementRow {
            entry_id: entry_id as u64,
            statement_hash: new_row.statement_hash,
            iss: new_row.iss,
            sub: new_row.sub,
            cty: new_row.cty,
            typ: new_row.typ,
            payload_hash_alg: new_row.payload_hash_alg,
            payload_hash: new_row.payload_hash,
            preimage_content_type: new_row.preimage_content_type,
            payload_location: new_row.payload_location,
            registered_at: now,
            tree_size_at_registration: new_row.tree_size_at_registration,
            entry_tile_key: new_row.entry_tile_key,
            entry_tile_offset: new_row.entry_tile_offset,
        })
    }
}

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[async_trait]
impl MetadataStore for SqliteMetadataStore {
    async fn insert_statement(&self, row: NewStatement) -> MetadataResult<StatementRow> {
        self.insert_statement_sync(row)
    }

    async fn get_statement_by_entry_id(&self, entry_id: u64) -> MetadataResult<Option<StatementRow>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT * FROM statements WHERE entry_id = ?1",
            params![entry_id as i64],
            Self::row_to_statement,
        )
        .optional()
        .map_err(|e| MetadataError::Database(e.to_string()))
    }

    async fn get_statement_by_hash(&self, statement_hash: &str) -> MetadataResult<Option<StatementRow>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT * FROM statements WHERE statement_hash = ?1",
            params![statement_hash],
            Self::row_to_statement,
        )
        .optional()
        .map_err(|e| MetadataError::Database(e.to_string()))
    }

    async fn list_statement_hashes(&self, up_to_tree_size: u64) -> MetadataResult<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT statement_hash FROM statements WHERE entry_id < ?1 ORDER BY entry_id ASC",
            )
            .map_err(|e| MetadataError::Database(e.to_string()))?;

        let hashes = stmt
            .query_map(params![up_to_tree_size as i64], |row| row.get(0))
            .map_err(|e| MetadataError::Database(e.to_string()))?
            .collect::<Result<Vec<String>, _>>()
            .map_err(|e| MetadataError::Database(e.to_string()))?;

        Ok(hashes)
    }

    async fn current_tree_size(&self) -> MetadataResult<u64> {
        let conn = self.conn()?;
        let size: i64 = conn
            .query_row(
                "SELECT tree_size FROM current_tree_size WHERE id = 1",
                [],
                |row| row.get(0),
            )
            .map_err(|e| MetadataError::Database(e.to_string()))?;
        Ok(size as u64)
    }

    async fn insert_tree_state(&self, row: TreeStateRow) -> MetadataResult<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO tree_state (tree_size, root_hash, checkpoint_storage_key, checkpoint_signed_note, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT(tree_size) DO UPDATE SET
                root_hash = excluded.root_hash,
                checkpoint_storage_key = excluded.checkpoint_storage_key,
                checkpoint_signed_note = excluded.checkpoint_signed_note,
                updated_at = excluded.updated_at
            "#,
            params![
                row.tree_size as i64,
                row.root_hash,
                row.checkpoint_storage_key,
                row.checkpoint_signed_note,
                row.updated_at,
            ],
        )
        .map_err(|e| MetadataError::Database(e.to_string()))?;
        Ok(())
    }

    async fn get_tree_state(&self, tree_size: u64) -> MetadataResult<Option<TreeStateRow>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT * FROM tree_state WHERE tree_size = ?1",
            params![tree_size as i64],
            |row| {
                Ok(TreeStateRow {
                    tree_size: row.get::<_, i64>("tree_size")? as u64,
                    root_hash: row.get("root_hash")?,
                    checkpoint_storage_key: row.get("checkpoint_storage_key")?,
                    checkpoint_signed_note: row.get("checkpoint_signed_note")?,
                    updated_at: row.get("updated_at")?,
                })
            },
        )
        .optional()
        .map_err(|e| MetadataError::Database(e.to_string()))
    }

    async fn insert_tile(&self, row: TileRow) -> MetadataResult<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO tiles (level, tile_index, storage_key, is_partial, width, tile_hash, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(level, tile_index) DO UPDATE SET
                storage_key = excluded.storage_key,
                is_partial = excluded.is_partial,
                width = excluded.width,
                tile_hash = excluded.tile_hash
            "#,
            params![
                row.level,
                row.tile_index as i64,
                row.storage_key,
                row.is_partial as i64,
                row.width,
                row.tile_hash,
                row.created_at,
            ],
        )
        .map_err(|e| MetadataError::Database(e.to_string()))?;
        Ok(())
    }

    async fn get_tile(&self, level: i64, tile_index: u64) -> MetadataResult<Option<TileRow>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT * FROM tiles WHERE level = ?1 AND tile_index = ?2",
            params![level, tile_index as i64],
            |row| {
                Ok(TileRow {
                    level: row.get("level")?,
                    tile_index: row.get::<_, i64>("tile_index")? as u64,
                    storage_key: row.get("storage_key")?,
                    is_partial: row.get::<_, i64>("is_partial")? != 0,
                    width: row.get::<_, Option<i64>>("width")?.map(|w| w as u32),
                    tile_hash: row.get("tile_hash")?,
                    created_at: row.get("created_at")?,
                })
            },
        )
        .optional()
        .map_err(|e| MetadataError::Database(e.to_string()))
    }

    async fn insert_receipt(&self, row: ReceiptRow) -> MetadataResult<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO receipts (entry_id, receipt_hash, storage_key, created_at, tree_size, leaf_index)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(entry_id) DO UPDATE SET
                receipt_hash = excluded.receipt_hash,
                storage_key = excluded.storage_key,
                created_at = excluded.created_at,
                tree_size = excluded.tree_size,
                leaf_index = excluded.leaf_index
            "#,
            params![
                row.entry_id as i64,
                row.receipt_hash,
                row.storage_key,
                row.created_at,
                row.tree_size as i64,
                row.leaf_index as i64,
            ],
        )
        .map_err(|e| MetadataError::Database(e.to_string()))?;
        Ok(())
    }

    async fn set_config(&self, key: &str, value: &str) -> MetadataResult<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO service_config (key, value) VALUES (?1, ?2)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
            params![key, value],
        )
        .map_err(|e| MetadataError::Database(e.to_string()))?;
        Ok(())
    }

    async fn get_config(&self, key: &str) -> MetadataResult<Option<String>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT value FROM service_config WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| MetadataError::Database(e.to_string()))
    }

    async fn upsert_service_key(&self, row: ServiceKeyRow) -> MetadataResult<()> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO service_keys (kid, public_key, private_key, algorithm, created_at, active)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(kid) DO UPDATE SET
                public_key = excluded.public_key,
                private_key = excluded.private_key,
                algorithm = excluded.algorithm,
                active = excluded.active
            "#,
            params![
                row.kid,
                row.public_key,
                row.private_key,
                row.algorithm,
                row.created_at,
                row.active as i64,
            ],
        )
        .map_err(|e| MetadataError::Database(e.to_string()))?;
        Ok(())
    }

    async fn list_active_service_keys(&self) -> MetadataResult<Vec<ServiceKeyRow>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT * FROM service_keys WHERE active = 1 ORDER BY created_at ASC")
            .map_err(|e| MetadataError::Database(e.to_string()))?;

        let rows = stmt
            .query_map([], |row| {
                Ok(ServiceKeyRow {
                    kid: row.get("kid")?,
                    public_key: row.get("public_key")?,
                    private_key: row.get("private_key")?,
                    algorithm: row.get("algorithm")?,
                    created_at: row.get("created_at")?,
                    active: row.get::<_, i64>("active")? != 0,
                })
            })
            .map_err(|e| MetadataError::Database(e.to_string()))?
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| MetadataError::Database(e.to_string()))?;

        Ok(rows)
    }
}
