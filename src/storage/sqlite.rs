//! SQLite storage implementation for wallet state
//!
//! Records are stored as JSON documents next to the columns that queries
//! filter on, so schema changes to the record types do not require migrations.

use std::path::Path;

use async_trait::async_trait;
use rusqlite::{params, OptionalExtension, Row};
use serde::{de::DeserializeOwned, Serialize};
use tokio_rusqlite::Connection;

use crate::{
    data_structures::types::{OutputRef, TxId},
    errors::{WalletError, WalletResult},
    storage::{
        AccountRecord, AddressRecord, KeystoreRecord, OutputFilter, OutputStatus, OwnedOutput,
        WalletStorage, WalletTransactionRecord,
    },
};

/// SQLite storage backend
pub struct SqliteStorage {
    connection: Connection,
}

impl SqliteStorage {
    pub async fn new<P: AsRef<Path>>(database_path: P) -> WalletResult<Self> {
        let connection = Connection::open(database_path).await.map_err(|e| {
            WalletError::StorageError(format!("Failed to open SQLite database: {e}"))
        })?;
        Ok(Self { connection })
    }

    /// Create an in-memory SQLite storage instance (useful for testing)
    pub async fn new_in_memory() -> WalletResult<Self> {
        let connection = Connection::open(":memory:").await.map_err(|e| {
            WalletError::StorageError(format!("Failed to create in-memory database: {e}"))
        })?;
        Ok(Self { connection })
    }

    /// Create the database schema
    async fn create_schema(&self) -> WalletResult<()> {
        let sql = r#"
            -- Single account per database
            CREATE TABLE IF NOT EXISTS account (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                account_id TEXT NOT NULL,
                record_json TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS addresses (
                account_id TEXT NOT NULL,
                address_index INTEGER NOT NULL,
                record_json TEXT NOT NULL,
                PRIMARY KEY (account_id, address_index)
            );

            CREATE TABLE IF NOT EXISTS keystore (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                record_json TEXT NOT NULL
            );

            -- Owned outputs
            CREATE TABLE IF NOT EXISTS outputs (
                outref TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                status INTEGER NOT NULL,
                height INTEGER,
                anon_index INTEGER UNIQUE,
                address_index INTEGER NOT NULL,
                record_json TEXT NOT NULL,
                updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
            );

            CREATE TABLE IF NOT EXISTS permanent_locks (
                outref TEXT PRIMARY KEY
            );

            CREATE TABLE IF NOT EXISTS scan_state (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                scanned_height INTEGER
            );

            CREATE TABLE IF NOT EXISTS wallet_transactions (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                txid TEXT UNIQUE NOT NULL,
                record_json TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_outputs_status ON outputs(status);
            CREATE INDEX IF NOT EXISTS idx_outputs_height ON outputs(height);
        "#;

        self.connection
            .call(move |conn| Ok(conn.execute_batch(sql)?))
            .await
            .map_err(|e| WalletError::StorageError(format!("Failed to create schema: {e}")))
    }

    fn to_json<T: Serialize>(value: &T) -> WalletResult<String> {
        Ok(serde_json::to_string(value)?)
    }

    fn from_json<T: DeserializeOwned>(json: &str) -> rusqlite::Result<T> {
        serde_json::from_str(json).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
        })
    }

    /// Convert a database row to a record stored in its `record_json` column
    fn row_to_record<T: DeserializeOwned>(row: &Row) -> rusqlite::Result<T> {
        let json: String = row.get("record_json")?;
        Self::from_json(&json)
    }

    /// Owned output row; the indexed `status` column is authoritative
    fn row_to_output(row: &Row) -> rusqlite::Result<OwnedOutput> {
        let mut output: OwnedOutput = Self::row_to_record(row)?;
        let code: i64 = row.get("status")?;
        output.status = u32::try_from(code)
            .map_err(|e| e.to_string())
            .and_then(|code| OutputStatus::try_from(code).map_err(|e| e.to_string()))
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    0,
                    rusqlite::types::Type::Integer,
                    e.into(),
                )
            })?;
        Ok(output)
    }
}

#[async_trait]
impl WalletStorage for SqliteStorage {
    async fn initialize(&self) -> WalletResult<()> {
        self.create_schema().await
    }

    async fn save_account(&self, account: &AccountRecord) -> WalletResult<()> {
        let json = Self::to_json(account)?;
        let account_id = account.account_id.clone();
        self.connection
            .call(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO account (id, account_id, record_json) VALUES (1, ?, ?)",
                    params![account_id, json],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| WalletError::StorageError(format!("Failed to save account: {e}")))
    }

    async fn get_account(&self) -> WalletResult<Option<AccountRecord>> {
        self.connection
            .call(|conn| {
                let mut stmt = conn.prepare("SELECT record_json FROM account WHERE id = 1")?;
                Ok(stmt.query_row([], Self::row_to_record).optional()?)
            })
            .await
            .map_err(|e| WalletError::StorageError(format!("Failed to get account: {e}")))
    }

    async fn save_address(&self, address: &AddressRecord) -> WalletResult<()> {
        let json = Self::to_json(address)?;
        let account_id = address.account_id.clone();
        let index = address.index;
        self.connection
            .call(move |conn| {
                conn.execute(
                    r#"
                    INSERT OR REPLACE INTO addresses (account_id, address_index, record_json)
                    VALUES (?, ?, ?)
                    "#,
                    params![account_id, index as i64, json],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| WalletError::StorageError(format!("Failed to save address: {e}")))
    }

    async fn get_addresses(&self, account_id: &str) -> WalletResult<Vec<AddressRecord>> {
        let account_id = account_id.to_string();
        self.connection
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT record_json FROM addresses WHERE account_id = ? ORDER BY address_index ASC",
                )?;
                let rows = stmt.query_map(params![account_id], Self::row_to_record)?;
                let mut addresses = Vec::new();
                for row in rows {
                    addresses.push(row?);
                }
                Ok(addresses)
            })
            .await
            .map_err(|e| WalletError::StorageError(format!("Failed to get addresses: {e}")))
    }

    async fn save_keystore(&self, record: &KeystoreRecord) -> WalletResult<()> {
        let json = Self::to_json(record)?;
        self.connection
            .call(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO keystore (id, record_json) VALUES (1, ?)",
                    params![json],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| WalletError::StorageError(format!("Failed to save key store: {e}")))
    }

    async fn get_keystore(&self) -> WalletResult<Option<KeystoreRecord>> {
        self.connection
            .call(|conn| {
                let mut stmt = conn.prepare("SELECT record_json FROM keystore WHERE id = 1")?;
                Ok(stmt.query_row([], Self::row_to_record).optional()?)
            })
            .await
            .map_err(|e| WalletError::StorageError(format!("Failed to get key store: {e}")))
    }

    async fn save_output(&self, output: &OwnedOutput) -> WalletResult<()> {
        let json = Self::to_json(output)?;
        let outref = output.outref.to_string();
        let kind = output.kind.as_str().to_string();
        let status = u32::from(output.status) as i64;
        let height = output.height.map(|h| h as i64);
        let anon_index = output.anon_index.map(|i| i as i64);
        let address_index = output.address_index as i64;
        self.connection
            .call(move |conn| {
                conn.execute(
                    r#"
                    INSERT INTO outputs (outref, kind, status, height, anon_index, address_index, record_json)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                    ON CONFLICT(outref) DO UPDATE SET
                        kind = ?2, status = ?3, height = ?4, anon_index = ?5,
                        address_index = ?6, record_json = ?7, updated_at = CURRENT_TIMESTAMP
                    "#,
                    params![outref, kind, status, height, anon_index, address_index, json],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| WalletError::StorageError(format!("Failed to save output: {e}")))
    }

    async fn get_output(&self, outref: &OutputRef) -> WalletResult<Option<OwnedOutput>> {
        let outref = outref.to_string();
        self.connection
            .call(move |conn| {
                let mut stmt =
                    conn.prepare("SELECT status, record_json FROM outputs WHERE outref = ?")?;
                Ok(stmt
                    .query_row(params![outref], Self::row_to_output)
                    .optional()?)
            })
            .await
            .map_err(|e| WalletError::StorageError(format!("Failed to get output: {e}")))
    }

    async fn get_output_by_anon_index(&self, index: u64) -> WalletResult<Option<OwnedOutput>> {
        self.connection
            .call(move |conn| {
                let mut stmt =
                    conn.prepare("SELECT status, record_json FROM outputs WHERE anon_index = ?")?;
                Ok(stmt
                    .query_row(params![index as i64], Self::row_to_output)
                    .optional()?)
            })
            .await
            .map_err(|e| WalletError::StorageError(format!("Failed to get output: {e}")))
    }

    async fn get_outputs(&self, filter: Option<OutputFilter>) -> WalletResult<Vec<OwnedOutput>> {
        let filter = filter.unwrap_or_default();
        self.connection
            .call(move |conn| {
                let mut query = String::from("SELECT status, record_json FROM outputs WHERE 1 = 1");
                let mut params_values: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

                if let Some(status) = filter.status {
                    query.push_str(" AND status = ?");
                    params_values.push(Box::new(u32::from(status) as i64));
                }
                if let Some(kind) = filter.kind {
                    query.push_str(" AND kind = ?");
                    params_values.push(Box::new(kind.as_str().to_string()));
                }
                if let Some((min, max)) = filter.height_range {
                    query.push_str(" AND height >= ? AND height <= ?");
                    params_values.push(Box::new(min as i64));
                    params_values.push(Box::new(max as i64));
                }
                if let Some(indices) = &filter.address_indices {
                    if indices.is_empty() {
                        return Ok(Vec::new());
                    }
                    let placeholders = vec!["?"; indices.len()].join(", ");
                    query.push_str(&format!(" AND address_index IN ({placeholders})"));
                    for index in indices {
                        params_values.push(Box::new(*index as i64));
                    }
                }

                query.push_str(" ORDER BY height IS NULL, height ASC, outref ASC");
                if let Some(limit) = filter.limit {
                    query.push_str(&format!(" LIMIT {limit}"));
                }

                let mut stmt = conn.prepare(&query)?;
                let param_refs: Vec<&dyn rusqlite::ToSql> = params_values
                    .iter()
                    .map(|p| p.as_ref() as &dyn rusqlite::ToSql)
                    .collect();
                let rows = stmt.query_map(&param_refs[..], Self::row_to_output)?;

                let mut outputs = Vec::new();
                for row in rows {
                    outputs.push(row?);
                }
                Ok(outputs)
            })
            .await
            .map_err(|e| WalletError::StorageError(format!("Failed to get outputs: {e}")))
    }

    async fn delete_output(&self, outref: &OutputRef) -> WalletResult<bool> {
        let outref = outref.to_string();
        self.connection
            .call(move |conn| {
                let rows = conn.execute("DELETE FROM outputs WHERE outref = ?", params![outref])?;
                Ok(rows > 0)
            })
            .await
            .map_err(|e| WalletError::StorageError(format!("Failed to delete output: {e}")))
    }

    async fn delete_outputs_from_height(&self, height: u64) -> WalletResult<usize> {
        self.connection
            .call(move |conn| {
                let rows = conn.execute(
                    "DELETE FROM outputs WHERE height IS NULL OR height >= ?",
                    params![height as i64],
                )?;
                Ok(rows)
            })
            .await
            .map_err(|e| WalletError::StorageError(format!("Failed to delete outputs: {e}")))
    }

    async fn set_permanent_lock(&self, outref: &OutputRef, locked: bool) -> WalletResult<()> {
        let outref = outref.to_string();
        self.connection
            .call(move |conn| {
                if locked {
                    conn.execute(
                        "INSERT OR IGNORE INTO permanent_locks (outref) VALUES (?)",
                        params![outref],
                    )?;
                } else {
                    conn.execute("DELETE FROM permanent_locks WHERE outref = ?", params![outref])?;
                }
                Ok(())
            })
            .await
            .map_err(|e| WalletError::StorageError(format!("Failed to update lock: {e}")))
    }

    async fn get_permanent_locks(&self) -> WalletResult<Vec<OutputRef>> {
        let encoded = self
            .connection
            .call(|conn| {
                let mut stmt = conn.prepare("SELECT outref FROM permanent_locks ORDER BY outref")?;
                let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
                let mut outrefs = Vec::new();
                for row in rows {
                    outrefs.push(row?);
                }
                Ok(outrefs)
            })
            .await
            .map_err(|e| WalletError::StorageError(format!("Failed to get locks: {e}")))?;

        encoded
            .iter()
            .map(|s| s.parse::<OutputRef>().map_err(WalletError::from))
            .collect()
    }

    async fn set_scanned_height(&self, height: Option<u64>) -> WalletResult<()> {
        self.connection
            .call(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO scan_state (id, scanned_height) VALUES (1, ?)",
                    params![height.map(|h| h as i64)],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| WalletError::StorageError(format!("Failed to save scan height: {e}")))
    }

    async fn get_scanned_height(&self) -> WalletResult<Option<u64>> {
        self.connection
            .call(|conn| {
                let mut stmt = conn.prepare("SELECT scanned_height FROM scan_state WHERE id = 1")?;
                let height = stmt
                    .query_row([], |row| row.get::<_, Option<i64>>(0))
                    .optional()?;
                Ok(height.flatten().map(|h| h as u64))
            })
            .await
            .map_err(|e| WalletError::StorageError(format!("Failed to get scan height: {e}")))
    }

    async fn save_transaction(&self, record: &WalletTransactionRecord) -> WalletResult<()> {
        let json = Self::to_json(record)?;
        let txid = record.txid.to_hex();
        self.connection
            .call(move |conn| {
                conn.execute(
                    r#"
                    INSERT INTO wallet_transactions (txid, record_json) VALUES (?1, ?2)
                    ON CONFLICT(txid) DO UPDATE SET record_json = ?2
                    "#,
                    params![txid, json],
                )?;
                Ok(())
            })
            .await
            .map_err(|e| WalletError::StorageError(format!("Failed to save transaction: {e}")))
    }

    async fn get_transaction(&self, txid: &TxId) -> WalletResult<Option<WalletTransactionRecord>> {
        let txid = txid.to_hex();
        self.connection
            .call(move |conn| {
                let mut stmt =
                    conn.prepare("SELECT record_json FROM wallet_transactions WHERE txid = ?")?;
                Ok(stmt
                    .query_row(params![txid], Self::row_to_record)
                    .optional()?)
            })
            .await
            .map_err(|e| WalletError::StorageError(format!("Failed to get transaction: {e}")))
    }

    async fn get_transactions(&self) -> WalletResult<Vec<WalletTransactionRecord>> {
        self.connection
            .call(|conn| {
                let mut stmt =
                    conn.prepare("SELECT record_json FROM wallet_transactions ORDER BY seq ASC")?;
                let rows = stmt.query_map([], Self::row_to_record)?;
                let mut records = Vec::new();
                for row in rows {
                    records.push(row?);
                }
                Ok(records)
            })
            .await
            .map_err(|e| WalletError::StorageError(format!("Failed to get transactions: {e}")))
    }
}
