//! Sector performance persistence.

use anyhow::Context;
use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::SectorPerformance;
use crate::alerts::StoreError;

#[async_trait]
pub trait SectorStore: Send + Sync {
    /// Insert or replace one row per sector. Returns the rows written.
    async fn upsert_sector_performance(&self, rows: &[SectorPerformance]) -> Result<usize, StoreError>;

    /// Every cached sector, best performer first.
    async fn load_sector_performance(&self) -> Result<Vec<SectorPerformance>, StoreError>;
}

const CREATE_TABLES_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS sector_performance (
    sector TEXT PRIMARY KEY,
    performance_pct REAL NOT NULL,
    last_updated TEXT NOT NULL
);
"#;

/// SQLite-backed sector cache.
pub struct SqliteSectorStore {
    db: Arc<Mutex<Connection>>,
}

impl SqliteSectorStore {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path).context("Failed to open market database")?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .context("Failed to set database pragmas")?;

        let store = Self::from_connection(conn)?;
        info!(db_path = %path.display(), "Initialized sector store");
        Ok(store)
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> anyhow::Result<Self> {
        conn.execute_batch(CREATE_TABLES_SQL)
            .context("Failed to create sector tables")?;

        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }
}

#[async_trait]
impl SectorStore for SqliteSectorStore {
    async fn upsert_sector_performance(&self, rows: &[SectorPerformance]) -> Result<usize, StoreError> {
        if rows.is_empty() {
            return Ok(0);
        }

        let mut db = self.db.lock().await;
        let tx = db.transaction()?;
        let mut written = 0;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO sector_performance (sector, performance_pct, last_updated)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(sector) DO UPDATE SET
                     performance_pct = excluded.performance_pct,
                     last_updated = excluded.last_updated",
            )?;
            for row in rows {
                written += stmt.execute(params![row.sector, row.performance_pct, row.last_updated.to_rfc3339()])?;
            }
        }
        tx.commit()?;

        debug!(written, "Upserted sector performance");
        Ok(written)
    }

    async fn load_sector_performance(&self) -> Result<Vec<SectorPerformance>, StoreError> {
        let db = self.db.lock().await;

        let mut stmt = db.prepare(
            "SELECT sector, performance_pct, last_updated FROM sector_performance
             ORDER BY performance_pct DESC, sector",
        )?;
        let rows = stmt
            .query_map([], |row| {
                let raw: String = row.get(2)?;
                Ok(SectorPerformance {
                    sector: row.get(0)?,
                    performance_pct: row.get(1)?,
                    last_updated: parse_timestamp(2, &raw)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows)
    }
}

fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn row(sector: &str, pct: f64, hour: u32) -> SectorPerformance {
        SectorPerformance {
            sector: sector.into(),
            performance_pct: pct,
            last_updated: Utc.with_ymd_and_hms(2024, 3, 4, hour, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_upsert_replaces_existing_sector() {
        let store = SqliteSectorStore::open_in_memory().unwrap();
        store
            .upsert_sector_performance(&[row("Technology", 2.5, 22), row("Energy", -0.5, 22)])
            .await
            .unwrap();
        store
            .upsert_sector_performance(&[row("Technology", -1.0, 23)])
            .await
            .unwrap();

        let rows = store.load_sector_performance().await.unwrap();
        assert_eq!(rows, vec![row("Energy", -0.5, 22), row("Technology", -1.0, 23)]);
    }

    #[tokio::test]
    async fn test_empty_upsert_is_noop() {
        let store = SqliteSectorStore::open_in_memory().unwrap();
        assert_eq!(store.upsert_sector_performance(&[]).await.unwrap(), 0);
        assert!(store.load_sector_performance().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rows_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("market.db");
        {
            let store = SqliteSectorStore::open(&path).unwrap();
            store.upsert_sector_performance(&[row("Healthcare", 1.1, 22)]).await.unwrap();
        }

        let reopened = SqliteSectorStore::open(&path).unwrap();
        assert_eq!(reopened.load_sector_performance().await.unwrap(), vec![row("Healthcare", 1.1, 22)]);
    }
}
