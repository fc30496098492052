use chrono::Local;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Executor, SqlitePool};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::config::DatabaseConfig;
use crate::utils::error::{AppError, Result};

/// Tables are created in dependency order and dropped in reverse.
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS products (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    url TEXT NOT NULL UNIQUE,
    selector TEXT,
    target_price TEXT,
    auto_track INTEGER NOT NULL DEFAULT 1,
    check_interval_minutes INTEGER,
    current_price TEXT,
    last_checked TEXT,
    last_error TEXT,
    error_count INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS price_history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    product_id TEXT NOT NULL REFERENCES products(id) ON DELETE CASCADE,
    price TEXT NOT NULL,
    timestamp TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_price_history_product ON price_history(product_id, id);

CREATE TABLE IF NOT EXISTS alert_state (
    product_id TEXT PRIMARY KEY REFERENCES products(id) ON DELETE CASCADE,
    last_notified_price TEXT NOT NULL,
    last_notified_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS notification_log (
    id TEXT PRIMARY KEY,
    product_id TEXT NOT NULL REFERENCES products(id) ON DELETE CASCADE,
    kind TEXT NOT NULL,
    price TEXT NOT NULL,
    channel TEXT NOT NULL,
    status TEXT NOT NULL,
    error TEXT,
    timestamp TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_notification_log_product ON notification_log(product_id, timestamp DESC);
"#;

const TABLES: [&str; 4] = ["notification_log", "alert_state", "price_history", "products"];

/// Handle on the SQLite store file.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    path: PathBuf,
    config: DatabaseConfig,
}

impl Database {
    pub async fn open(config: &DatabaseConfig) -> Result<Self> {
        info!("Opening price database at {:?}", config.path);

        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let pool = Self::connect(config).await?;
        let database = Self {
            pool,
            path: config.path.clone(),
            config: config.clone(),
        };
        database.init_schema().await?;

        Ok(database)
    }

    async fn connect(config: &DatabaseConfig) -> Result<SqlitePool> {
        // Rollback journal keeps the whole store in one file for backup/restore
        let connect_options = SqliteConnectOptions::new()
            .filename(&config.path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Delete)
            .busy_timeout(Duration::from_secs(config.busy_timeout_secs))
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(connect_options)
            .await?;

        Ok(pool)
    }

    pub async fn init_schema(&self) -> Result<()> {
        self.pool.execute(SCHEMA).await?;
        debug!("Database schema ready");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Writes a consistent copy of the store to
    /// `<backup_dir>/price_tracker_backup_<YYYYmmdd_HHMMSS>.db`.
    pub async fn backup(&self) -> Result<PathBuf> {
        tokio::fs::create_dir_all(&self.config.backup_dir).await?;

        let file_name = format!(
            "price_tracker_backup_{}.db",
            Local::now().format("%Y%m%d_%H%M%S")
        );
        let target = self.config.backup_dir.join(file_name);
        self.backup_to(&target).await?;

        Ok(target)
    }

    pub async fn backup_to(&self, target: &Path) -> Result<()> {
        if tokio::fs::try_exists(target).await? {
            return Err(AppError::Validation(format!(
                "backup target {} already exists",
                target.display()
            )));
        }

        let target_str = target.to_string_lossy().replace('\'', "''");
        sqlx::query(&format!("VACUUM INTO '{}'", target_str))
            .execute(&self.pool)
            .await?;

        info!("Database backed up to {}", target.display());
        Ok(())
    }

    /// Replaces the store file with `backup` and reopens it. Every clone of
    /// this handle, and every pool borrowed from it, is closed.
    pub async fn restore(self, backup: &Path) -> Result<Self> {
        if !tokio::fs::try_exists(backup).await? {
            return Err(AppError::NotFound {
                resource: format!("backup file {}", backup.display()),
            });
        }

        self.pool.close().await;
        tokio::fs::copy(backup, &self.path).await?;
        info!("Database restored from {}", backup.display());

        Self::open(&self.config).await
    }

    /// Removes every observation and alert state; products stay.
    pub async fn clear_history(&self) -> Result<u64> {
        let mut tx = self.pool.begin().await?;

        let removed = sqlx::query("DELETE FROM price_history")
            .execute(&mut *tx)
            .await?
            .rows_affected();
        sqlx::query("DELETE FROM alert_state")
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        info!("Cleared {} price observations", removed);
        Ok(removed)
    }

    /// Drops and recreates every table.
    pub async fn reset(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for table in TABLES {
            sqlx::query(&format!("DROP TABLE IF EXISTS {}", table))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        self.init_schema().await?;
        info!("Database reset");
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
