// SQLite access to the monitor's telemetry database (projects / runs / records).
// Read side: bulk fetch of one run, and "rows after id N" for the watcher.
// The monitor bumps PRAGMA user_version on every write; save_records does the same.

use crate::dispatcher::decode::parse_timestamp_ms;
use crate::models::MetricRecord;
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use std::path::Path;
use std::str::FromStr;
use tracing::instrument;

const RECORD_COLUMNS: &str = "id AS row_id, CAST(id AS TEXT) AS id, CAST(run_id AS TEXT) AS run_id, \
     COALESCE(pid, 0) AS pid, CAST(timestamp AS TEXT) AS timestamp, \
     COALESCE(cpu_usage, 0.0) AS cpu_usage, COALESCE(cpu_energy, 0.0) AS cpu_energy, \
     COALESCE(gpu_usage, 0.0) AS gpu_usage, COALESCE(gpu_energy, 0.0) AS gpu_energy, \
     COALESCE(mem_usage, 0.0) AS mem_usage, COALESCE(mem_energy, 0.0) AS mem_energy, \
     COALESCE(igpu_usage, 0.0) AS igpu_usage, COALESCE(igpu_energy, 0.0) AS igpu_energy";

pub struct RecordRepo {
    pool: SqlitePool,
}

impl RecordRepo {
    pub async fn connect(path: &str, max_pool_size: u32) -> anyhow::Result<Self> {
        if let Some(parent) = Path::new(path).parent() {
            std::fs::create_dir_all(parent)?;
        }
        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}", path))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .busy_timeout(std::time::Duration::from_secs(5))
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_pool_size)
            .connect_with(opts)
            .await?;
        Ok(Self { pool })
    }

    /// Creates the monitor's tables if absent (fresh installs, tests). No-op on an existing DB.
    pub async fn init(&self) -> anyhow::Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS projects (id INTEGER PRIMARY KEY, name TEXT NOT NULL)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS runs (id INTEGER PRIMARY KEY, name TEXT NOT NULL, project_id INTEGER)",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                id INTEGER PRIMARY KEY,
                run_id INTEGER NOT NULL,
                pid INTEGER,
                timestamp TEXT,
                cpu_usage REAL,
                cpu_energy REAL,
                gpu_usage REAL,
                gpu_energy REAL,
                mem_usage REAL,
                mem_energy REAL,
                igpu_usage REAL,
                igpu_energy REAL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_run_id ON records(run_id)")
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Inserts records (ids are assigned by SQLite) and bumps user_version once.
    /// Returns the assigned row ids in input order.
    #[instrument(skip(self, records), fields(repo = "records", operation = "save_records", records_count = records.len()))]
    pub async fn save_records(&self, records: &[MetricRecord]) -> anyhow::Result<Vec<i64>> {
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::with_capacity(records.len());
        for r in records {
            let result = sqlx::query(
                "INSERT INTO records (run_id, pid, timestamp, cpu_usage, cpu_energy, gpu_usage, gpu_energy, mem_usage, mem_energy, igpu_usage, igpu_energy) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
            )
            .bind(&r.run_id)
            .bind(r.process_id)
            .bind(r.timestamp)
            .bind(r.cpu_usage)
            .bind(r.cpu_energy)
            .bind(r.gpu_usage)
            .bind(r.gpu_energy)
            .bind(r.mem_usage)
            .bind(r.mem_energy)
            .bind(r.igpu_usage)
            .bind(r.igpu_energy)
            .execute(&mut *tx)
            .await?;
            ids.push(result.last_insert_rowid());
        }
        let version = Self::read_user_version(&mut *tx).await?;
        // PRAGMA does not take bound parameters.
        sqlx::query(&format!("PRAGMA user_version = {}", version + 1))
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(ids)
    }

    /// Bulk historical fetch: every record of `run_id`, ascending by row id.
    #[instrument(skip(self), fields(repo = "records", operation = "get_run_records"))]
    pub async fn get_run_records(&self, run_id: &str) -> anyhow::Result<Vec<MetricRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM records WHERE run_id = $1 ORDER BY id ASC"
        ))
        .bind(run_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(Self::parse_record_row).collect()
    }

    /// Records with row id > `after_id` (all runs), ascending, at most `limit`.
    /// Returns the highest row id seen alongside the records.
    #[instrument(skip(self), fields(repo = "records", operation = "get_records_after"))]
    pub async fn get_records_after(
        &self,
        after_id: i64,
        limit: u32,
    ) -> anyhow::Result<(i64, Vec<MetricRecord>)> {
        let rows = sqlx::query(&format!(
            "SELECT {RECORD_COLUMNS} FROM records WHERE id > $1 ORDER BY id ASC LIMIT $2"
        ))
        .bind(after_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut last_id = after_id;
        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            last_id = last_id.max(row.try_get::<i64, _>("row_id")?);
            out.push(Self::parse_record_row(row)?);
        }
        Ok((last_id, out))
    }

    /// Highest record row id, 0 when the table is empty.
    pub async fn max_record_id(&self) -> anyhow::Result<i64> {
        let row = sqlx::query("SELECT COALESCE(MAX(id), 0) AS max_id FROM records")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("max_id")?)
    }

    /// Change counter bumped by every writer.
    pub async fn user_version(&self) -> anyhow::Result<i64> {
        let mut conn = self.pool.acquire().await?;
        Self::read_user_version(&mut *conn).await
    }

    async fn read_user_version(conn: &mut sqlx::SqliteConnection) -> anyhow::Result<i64> {
        let row = sqlx::query("PRAGMA user_version").fetch_one(conn).await?;
        Ok(row.try_get(0)?)
    }

    fn parse_record_row(row: &SqliteRow) -> anyhow::Result<MetricRecord> {
        let timestamp: Option<String> = row.try_get("timestamp")?;
        let timestamp = match timestamp {
            Some(ts) => parse_timestamp_ms(&ts)?,
            None => 0,
        };
        Ok(MetricRecord {
            id: row.try_get("id")?,
            run_id: row.try_get("run_id")?,
            process_id: row.try_get("pid")?,
            timestamp,
            cpu_usage: row.try_get("cpu_usage")?,
            cpu_energy: row.try_get("cpu_energy")?,
            gpu_usage: row.try_get("gpu_usage")?,
            gpu_energy: row.try_get("gpu_energy")?,
            mem_usage: row.try_get("mem_usage")?,
            mem_energy: row.try_get("mem_energy")?,
            igpu_usage: row.try_get("igpu_usage")?,
            igpu_energy: row.try_get("igpu_energy")?,
        })
    }
}
