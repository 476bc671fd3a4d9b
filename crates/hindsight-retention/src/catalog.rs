//! Context catalog: the persistent snapshot index.
//!
//! A single SQLite table in WAL mode (concurrent readers, one writer),
//! schema creation idempotent at open:
//!
//! ```sql
//! CREATE TABLE snapshots (
//!     id        INTEGER PRIMARY KEY,
//!     path      TEXT    NOT NULL,
//!     timestamp INTEGER NOT NULL,   -- epoch ms, UTC
//!     phash     INTEGER NOT NULL    -- compact 64-bit hash
//! );
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use tracing::{debug, info, warn};

use hindsight_core::ContextSnapshot;

/// One catalog row.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogRow {
    pub id: i64,
    pub path: PathBuf,
    pub timestamp_ms: i64,
    pub compact_hash: u64,
}

pub struct Catalog {
    conn: Connection,
}

impl Catalog {
    /// Open (or create) the catalog at `path` in WAL mode.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating catalog directory {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("opening catalog {}", path.display()))?;

        if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
            warn!("failed to enable WAL mode: {err}");
        }
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS snapshots (
                id        INTEGER PRIMARY KEY,
                path      TEXT    NOT NULL,
                timestamp INTEGER NOT NULL,
                phash     INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_snapshots_timestamp
                ON snapshots (timestamp);",
        )
        .context("creating catalog schema")?;

        Ok(Self { conn })
    }

    /// In-memory catalog for tests.
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(
            "CREATE TABLE snapshots (
                id        INTEGER PRIMARY KEY,
                path      TEXT    NOT NULL,
                timestamp INTEGER NOT NULL,
                phash     INTEGER NOT NULL
            );
            CREATE INDEX idx_snapshots_timestamp ON snapshots (timestamp);",
        )?;
        Ok(Self { conn })
    }

    pub fn insert(&self, snapshot: &ContextSnapshot) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO snapshots (path, timestamp, phash) VALUES (?1, ?2, ?3)",
                params![
                    snapshot.path.to_string_lossy(),
                    snapshot.timestamp.timestamp_millis(),
                    snapshot.compact_hash as i64,
                ],
            )
            .context("inserting snapshot row")?;
        Ok(())
    }

    /// Rows with `timestamp` in `[from_ms, to_ms]`, ascending.
    pub fn range(&self, from_ms: i64, to_ms: i64) -> Result<Vec<CatalogRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, path, timestamp, phash
             FROM snapshots
             WHERE timestamp >= ?1 AND timestamp <= ?2
             ORDER BY timestamp ASC",
        )?;
        let rows = stmt
            .query_map(params![from_ms, to_ms], |row| {
                let path: String = row.get(1)?;
                Ok(CatalogRow {
                    id: row.get(0)?,
                    path: PathBuf::from(path),
                    timestamp_ms: row.get(2)?,
                    compact_hash: row.get::<_, i64>(3)? as u64,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// All rows, ascending by timestamp.
    pub fn all(&self) -> Result<Vec<CatalogRow>> {
        self.range(i64::MIN, i64::MAX)
    }

    /// Delete rows older than `cutoff_ms` and best-effort delete their
    /// files. Returns the number of rows removed.
    pub fn delete_before(&mut self, cutoff_ms: i64) -> Result<usize> {
        let victims: Vec<(i64, PathBuf)> = {
            let mut stmt = self
                .conn
                .prepare("SELECT id, path FROM snapshots WHERE timestamp < ?1")?;
            let rows = stmt
                .query_map(params![cutoff_ms], |row| {
                    let path: String = row.get(1)?;
                    Ok((row.get::<_, i64>(0)?, PathBuf::from(path)))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };

        self.delete_rows_and_files(&victims)
    }

    /// If more than `max` rows exist, delete the oldest surplus rows and
    /// their files. Returns the number of rows removed.
    pub fn enforce_max(&mut self, max: usize) -> Result<usize> {
        let total: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM snapshots", [], |row| row.get(0))?;
        let surplus = total - max as i64;
        if surplus <= 0 {
            return Ok(0);
        }

        let victims: Vec<(i64, PathBuf)> = {
            let mut stmt = self.conn.prepare(
                "SELECT id, path FROM snapshots ORDER BY timestamp ASC LIMIT ?1",
            )?;
            let rows = stmt
                .query_map(params![surplus], |row| {
                    let path: String = row.get(1)?;
                    Ok((row.get::<_, i64>(0)?, PathBuf::from(path)))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };

        self.delete_rows_and_files(&victims)
    }

    /// Drop every row whose file no longer exists. Returns the number of
    /// stale rows pruned.
    pub fn reconcile(&mut self) -> Result<usize> {
        let rows = self.all()?;
        let mut pruned = 0;
        for row in rows {
            if !row.path.exists() {
                self.conn
                    .execute("DELETE FROM snapshots WHERE id = ?1", params![row.id])?;
                pruned += 1;
            }
        }
        if pruned > 0 {
            info!("catalog reconcile pruned {pruned} stale row(s)");
        }
        Ok(pruned)
    }

    pub fn count(&self) -> Result<usize> {
        let total: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM snapshots", [], |row| row.get(0))?;
        Ok(total as usize)
    }

    fn delete_rows_and_files(&mut self, victims: &[(i64, PathBuf)]) -> Result<usize> {
        if victims.is_empty() {
            return Ok(0);
        }
        let tx = self.conn.transaction()?;
        for (id, _) in victims {
            tx.execute("DELETE FROM snapshots WHERE id = ?1", params![id])?;
        }
        tx.commit()?;

        for (_, path) in victims {
            match fs::remove_file(path) {
                Ok(()) => debug!("deleted snapshot {}", path.display()),
                Err(err) => warn!("snapshot file {} not removed: {err}", path.display()),
            }
        }
        Ok(victims.len())
    }
}

/// Epoch-ms form of a UTC instant, as stored in the `timestamp` column.
pub fn to_epoch_ms(at: DateTime<Utc>) -> i64 {
    at.timestamp_millis()
}
