//! Alert persistence.
//!
//! `AlertStore` is the narrow contract the monitor and the HTTP surface use;
//! `SqliteAlertStore` implements it on a local SQLite database.

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{AlertDirection, DeviceRegistration, NewAlert, PriceAlert};

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<StoreError> for microcap_common::Error {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::InvalidInput(msg) => Self::InvalidInput(msg),
            StoreError::Database(e) => Self::Persistence(e.to_string()),
        }
    }
}

// ============================================================================
// Store contract
// ============================================================================

#[async_trait]
pub trait AlertStore: Send + Sync {
    /// Every alert that has not triggered yet.
    async fn load_active_alerts(&self) -> Result<Vec<PriceAlert>, StoreError>;

    /// Push tokens registered for an owner.
    async fn load_device_tokens(&self, owner_id: &str) -> Result<Vec<String>, StoreError>;

    /// Deactivate the given alerts as one unit. Either every still-active
    /// alert in `alert_ids` flips to inactive, or none does.
    ///
    /// Returns the number of alerts that flipped.
    async fn persist_alert_transitions(&self, alert_ids: &[i64]) -> Result<usize, StoreError>;

    async fn create_alert(&self, alert: NewAlert) -> Result<PriceAlert, StoreError>;

    /// Register a device token, or refresh it if already known.
    async fn register_device(&self, owner_id: &str, token: &str) -> Result<DeviceRegistration, StoreError>;

    /// All alerts of an owner, active or not, newest first.
    async fn alerts_for_owner(&self, owner_id: &str) -> Result<Vec<PriceAlert>, StoreError>;

    /// Delete one of an owner's alerts, active or triggered.
    ///
    /// Returns false when no alert with that id belongs to the owner.
    async fn delete_alert(&self, owner_id: &str, alert_id: i64) -> Result<bool, StoreError>;
}

// ============================================================================
// SQLite implementation
// ============================================================================

const CREATE_TABLES_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS price_alerts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id TEXT NOT NULL,
    ticker TEXT NOT NULL,
    target_price REAL NOT NULL,
    direction TEXT NOT NULL CHECK (direction IN ('above', 'below')),
    is_active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL,
    triggered_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_price_alerts_active ON price_alerts(is_active);
CREATE INDEX IF NOT EXISTS idx_price_alerts_owner ON price_alerts(owner_id);

CREATE TABLE IF NOT EXISTS device_tokens (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id TEXT NOT NULL,
    token TEXT NOT NULL UNIQUE,
    last_registered TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_device_tokens_owner ON device_tokens(owner_id);
"#;

/// SQLite-backed alert store.
pub struct SqliteAlertStore {
    /// rusqlite::Connection is Send but not Sync, hence the Mutex
    db: Arc<Mutex<Connection>>,
}

impl SqliteAlertStore {
    /// Open (or create) the database file and ensure the schema exists.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path).context("Failed to open alert database")?;

        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
            .context("Failed to set database pragmas")?;

        let store = Self::from_connection(conn)?;
        info!(db_path = %path.display(), "Initialized alert store");
        Ok(store)
    }

    /// Private in-memory database.
    pub fn open_in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> anyhow::Result<Self> {
        conn.execute_batch(CREATE_TABLES_SQL)
            .context("Failed to create alert tables")?;

        Ok(Self {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    fn row_to_alert(row: &rusqlite::Row) -> rusqlite::Result<PriceAlert> {
        let direction: String = row.get(4)?;
        let direction = direction.parse::<AlertDirection>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, e.into())
        })?;

        Ok(PriceAlert {
            id: row.get(0)?,
            owner_id: row.get(1)?,
            ticker: row.get(2)?,
            target_price: row.get(3)?,
            direction,
            is_active: row.get(5)?,
        })
    }
}

fn parse_timestamp(idx: usize, raw: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e)))
}

fn validate_new_alert(alert: &NewAlert) -> Result<(), StoreError> {
    if alert.owner_id.trim().is_empty() {
        return Err(StoreError::InvalidInput("owner_id must not be empty".into()));
    }
    if alert.ticker.trim().is_empty() {
        return Err(StoreError::InvalidInput("ticker must not be empty".into()));
    }
    if !alert.target_price.is_finite() || alert.target_price <= 0.0 {
        return Err(StoreError::InvalidInput(format!(
            "target_price must be a positive number, got {}",
            alert.target_price
        )));
    }
    Ok(())
}

#[async_trait]
impl AlertStore for SqliteAlertStore {
    async fn load_active_alerts(&self) -> Result<Vec<PriceAlert>, StoreError> {
        let db = self.db.lock().await;

        let mut stmt = db.prepare(
            "SELECT id, owner_id, ticker, target_price, direction, is_active
             FROM price_alerts WHERE is_active = 1 ORDER BY id",
        )?;
        let alerts = stmt
            .query_map([], Self::row_to_alert)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        debug!(count = alerts.len(), "Loaded active alerts");
        Ok(alerts)
    }

    async fn load_device_tokens(&self, owner_id: &str) -> Result<Vec<String>, StoreError> {
        let db = self.db.lock().await;

        let mut stmt = db.prepare("SELECT token FROM device_tokens WHERE owner_id = ?1 ORDER BY id")?;
        let tokens = stmt
            .query_map(params![owner_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;

        Ok(tokens)
    }

    async fn persist_alert_transitions(&self, alert_ids: &[i64]) -> Result<usize, StoreError> {
        if alert_ids.is_empty() {
            return Ok(0);
        }

        let mut db = self.db.lock().await;
        let now = Utc::now().to_rfc3339();

        // Dropping the transaction without commit rolls back
        let tx = db.transaction()?;
        let mut flipped = 0;
        {
            let mut stmt = tx.prepare(
                "UPDATE price_alerts SET is_active = 0, triggered_at = ?2
                 WHERE id = ?1 AND is_active = 1",
            )?;
            for id in alert_ids {
                flipped += stmt.execute(params![id, now])?;
            }
        }
        tx.commit()?;

        info!(requested = alert_ids.len(), flipped, "Persisted alert transitions");
        Ok(flipped)
    }

    async fn create_alert(&self, alert: NewAlert) -> Result<PriceAlert, StoreError> {
        validate_new_alert(&alert)?;

        let ticker = alert.ticker.trim().to_ascii_uppercase();
        let db = self.db.lock().await;

        db.execute(
            "INSERT INTO price_alerts (owner_id, ticker, target_price, direction, is_active, created_at)
             VALUES (?1, ?2, ?3, ?4, 1, ?5)",
            params![
                alert.owner_id,
                ticker,
                alert.target_price,
                alert.direction.as_str(),
                Utc::now().to_rfc3339(),
            ],
        )?;

        let created = PriceAlert {
            id: db.last_insert_rowid(),
            owner_id: alert.owner_id,
            ticker,
            target_price: alert.target_price,
            direction: alert.direction,
            is_active: true,
        };

        debug!(alert_id = created.id, ticker = %created.ticker, "Created price alert");
        Ok(created)
    }

    async fn register_device(&self, owner_id: &str, token: &str) -> Result<DeviceRegistration, StoreError> {
        if owner_id.trim().is_empty() || token.trim().is_empty() {
            return Err(StoreError::InvalidInput("owner_id and token are required".into()));
        }

        let db = self.db.lock().await;
        let now = Utc::now();

        db.execute(
            "INSERT INTO device_tokens (owner_id, token, last_registered) VALUES (?1, ?2, ?3)
             ON CONFLICT(token) DO UPDATE SET
                 owner_id = excluded.owner_id,
                 last_registered = excluded.last_registered",
            params![owner_id, token, now.to_rfc3339()],
        )?;

        let registration = db.query_row(
            "SELECT owner_id, token, last_registered FROM device_tokens WHERE token = ?1",
            params![token],
            |row| {
                let raw: String = row.get(2)?;
                Ok(DeviceRegistration {
                    owner_id: row.get(0)?,
                    token: row.get(1)?,
                    last_registered: parse_timestamp(2, &raw)?,
                })
            },
        )?;

        debug!(owner_id = %owner_id, "Registered device token");
        Ok(registration)
    }

    async fn alerts_for_owner(&self, owner_id: &str) -> Result<Vec<PriceAlert>, StoreError> {
        let db = self.db.lock().await;

        let mut stmt = db.prepare(
            "SELECT id, owner_id, ticker, target_price, direction, is_active
             FROM price_alerts WHERE owner_id = ?1 ORDER BY id DESC",
        )?;
        let alerts = stmt
            .query_map(params![owner_id], Self::row_to_alert)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(alerts)
    }

    async fn delete_alert(&self, owner_id: &str, alert_id: i64) -> Result<bool, StoreError> {
        let db = self.db.lock().await;

        let deleted = db.execute(
            "DELETE FROM price_alerts WHERE id = ?1 AND owner_id = ?2",
            params![alert_id, owner_id],
        )?;

        debug!(alert_id, owner_id = %owner_id, deleted, "Delete price alert");
        Ok(deleted > 0)
    }
}
