use chrono::{DateTime, TimeZone, Utc};
use engine_core::{EngineError, EngineResult, Preset, PublicLatestRun, Run, RunStatus};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS runs (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    tool TEXT NOT NULL,
    params TEXT NOT NULL,
    result TEXT,
    status TEXT NOT NULL DEFAULT 'running',
    execution_ms INTEGER,
    error_message TEXT,
    created_at_ms INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_runs_user_tool_created ON runs(user_id, tool, created_at_ms);
CREATE TABLE IF NOT EXISTS presets (
    id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    name TEXT NOT NULL,
    tool TEXT NOT NULL,
    params TEXT NOT NULL,
    is_default INTEGER NOT NULL DEFAULT 0,
    created_at_ms INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_presets_user ON presets(user_id, created_at_ms);
CREATE TABLE IF NOT EXISTS public_latest_runs (
    tool TEXT PRIMARY KEY,
    symbol TEXT,
    result TEXT NOT NULL,
    updated_at_ms INTEGER NOT NULL
);
"#;

/// Persistence for runs, presets, and the public landing cache, over one
/// SQLite pool. All JSON payloads are stored as text.
#[derive(Clone)]
pub struct GatewayStore {
    pool: SqlitePool,
}

impl GatewayStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    pub async fn in_memory() -> anyhow::Result<Self> {
        // A single connection keeps the in-memory database alive and shared.
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    async fn init_schema(&self) -> anyhow::Result<()> {
        for statement in SCHEMA.split(';') {
            let statement = statement.trim();
            if !statement.is_empty() {
                sqlx::query(statement).execute(&self.pool).await?;
            }
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    fn db_err(e: sqlx::Error) -> EngineError {
        EngineError::Database(e.to_string())
    }

    /// UTC-day window in epoch milliseconds for quota counting. The day is
    /// a proper half-open interval, not a string prefix match.
    fn utc_day_window(now: DateTime<Utc>) -> (i64, i64) {
        let day_start = now
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|dt| Utc.from_utc_datetime(&dt))
            .unwrap_or(now);
        let start_ms = day_start.timestamp_millis();
        (start_ms, start_ms + 24 * 60 * 60 * 1000)
    }

    pub async fn count_runs_today(&self, user_id: &str, tool: &str) -> EngineResult<i64> {
        let (start, end) = Self::utc_day_window(Utc::now());
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM runs
             WHERE user_id = ? AND tool = ? AND created_at_ms >= ? AND created_at_ms < ?",
        )
        .bind(user_id)
        .bind(tool)
        .bind(start)
        .bind(end)
        .fetch_one(&self.pool)
        .await
        .map_err(Self::db_err)?;
        Ok(row.get::<i64, _>("n"))
    }

    /// Quota check and run creation in one transaction: the run row is the
    /// counter, so concurrent requests cannot double-spend the last slot.
    /// Returns `(run_id, usage_after_insert)`.
    pub async fn begin_run(
        &self,
        user_id: &str,
        tool: &str,
        params: &serde_json::Value,
        daily_quota: Option<i64>,
    ) -> EngineResult<(String, i64)> {
        let mut tx = self.pool.begin().await.map_err(Self::db_err)?;

        let (start, end) = Self::utc_day_window(Utc::now());
        let row = sqlx::query(
            "SELECT COUNT(*) AS n FROM runs
             WHERE user_id = ? AND tool = ? AND created_at_ms >= ? AND created_at_ms < ?",
        )
        .bind(user_id)
        .bind(tool)
        .bind(start)
        .bind(end)
        .fetch_one(&mut *tx)
        .await
        .map_err(Self::db_err)?;
        let used: i64 = row.get("n");

        if let Some(limit) = daily_quota {
            if used >= limit {
                // Roll back: a denied request leaves no row behind.
                return Err(EngineError::QuotaExceeded { used, limit });
            }
        }

        let run_id = Uuid::new_v4().to_string();
        sqlx::query(
            "INSERT INTO runs (id, user_id, tool, params, status, created_at_ms)
             VALUES (?, ?, ?, ?, 'running', ?)",
        )
        .bind(&run_id)
        .bind(user_id)
        .bind(tool)
        .bind(params.to_string())
        .bind(Utc::now().timestamp_millis())
        .execute(&mut *tx)
        .await
        .map_err(Self::db_err)?;

        tx.commit().await.map_err(Self::db_err)?;
        Ok((run_id, used + 1))
    }

    /// Single terminal transition: status, result/error, and execution_ms
    /// land in one statement. A run already out of `running` is left alone.
    pub async fn complete_run(
        &self,
        run_id: &str,
        outcome: Result<&serde_json::Value, &str>,
        execution_ms: i64,
    ) -> EngineResult<()> {
        let (status, result, error_message) = match outcome {
            Ok(value) => (RunStatus::Success.as_str(), Some(value.to_string()), None),
            Err(message) => (RunStatus::Error.as_str(), None, Some(message.to_string())),
        };

        sqlx::query(
            "UPDATE runs SET status = ?, result = ?, error_message = ?, execution_ms = ?
             WHERE id = ? AND status = 'running'",
        )
        .bind(status)
        .bind(result)
        .bind(error_message)
        .bind(execution_ms)
        .bind(run_id)
        .execute(&self.pool)
        .await
        .map_err(Self::db_err)?;
        Ok(())
    }

    pub async fn get_run(&self, run_id: &str) -> EngineResult<Option<Run>> {
        let row = sqlx::query(
            "SELECT id, user_id, tool, params, result, status, execution_ms, error_message, created_at_ms
             FROM runs WHERE id = ?",
        )
        .bind(run_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Self::db_err)?;
        Ok(row.map(Self::row_to_run))
    }

    fn row_to_run(row: sqlx::sqlite::SqliteRow) -> Run {
        let status = match row.get::<String, _>("status").as_str() {
            "success" => RunStatus::Success,
            "error" => RunStatus::Error,
            _ => RunStatus::Running,
        };
        Run {
            id: row.get("id"),
            user_id: row.get("user_id"),
            tool: row.get("tool"),
            params: serde_json::from_str(&row.get::<String, _>("params"))
                .unwrap_or(serde_json::Value::Null),
            result: row
                .get::<Option<String>, _>("result")
                .and_then(|r| serde_json::from_str(&r).ok()),
            status,
            execution_ms: row.get("execution_ms"),
            error_message: row.get("error_message"),
            created_at: Utc
                .timestamp_millis_opt(row.get::<i64, _>("created_at_ms"))
                .single()
                .unwrap_or_else(Utc::now),
        }
    }

    /// Janitor sweep: `running` rows older than `age` become errors.
    pub async fn sweep_orphan_runs(&self, age: Duration) -> EngineResult<u64> {
        let cutoff = Utc::now().timestamp_millis() - age.as_millis() as i64;
        let result = sqlx::query(
            "UPDATE runs SET status = 'error', error_message = 'orphaned'
             WHERE status = 'running' AND created_at_ms < ?",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(Self::db_err)?;
        Ok(result.rows_affected())
    }

    // --- Presets ------------------------------------------------------------

    pub async fn list_presets(&self, user_id: &str) -> EngineResult<Vec<Preset>> {
        let rows = sqlx::query(
            "SELECT id, user_id, name, tool, params, is_default, created_at_ms
             FROM presets WHERE user_id = ? ORDER BY created_at_ms DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Self::db_err)?;
        Ok(rows.into_iter().map(Self::row_to_preset).collect())
    }

    fn row_to_preset(row: sqlx::sqlite::SqliteRow) -> Preset {
        Preset {
            id: row.get("id"),
            user_id: row.get("user_id"),
            name: row.get("name"),
            tool: row.get("tool"),
            params: serde_json::from_str(&row.get::<String, _>("params"))
                .unwrap_or(serde_json::Value::Null),
            is_default: row.get::<i64, _>("is_default") != 0,
            created_at: Utc
                .timestamp_millis_opt(row.get::<i64, _>("created_at_ms"))
                .single()
                .unwrap_or_else(Utc::now),
        }
    }

    /// Insert a preset. Setting `is_default` clears any previous default for
    /// the same `(user, tool)` in the same transaction.
    pub async fn create_preset(
        &self,
        user_id: &str,
        name: &str,
        tool: &str,
        params: &serde_json::Value,
        is_default: bool,
    ) -> EngineResult<Preset> {
        let mut tx = self.pool.begin().await.map_err(Self::db_err)?;

        if is_default {
            sqlx::query("UPDATE presets SET is_default = 0 WHERE user_id = ? AND tool = ?")
                .bind(user_id)
                .bind(tool)
                .execute(&mut *tx)
                .await
                .map_err(Self::db_err)?;
        }

        let id = Uuid::new_v4().to_string();
        let created_at = Utc::now();
        sqlx::query(
            "INSERT INTO presets (id, user_id, name, tool, params, is_default, created_at_ms)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(user_id)
        .bind(name)
        .bind(tool)
        .bind(params.to_string())
        .bind(is_default as i64)
        .bind(created_at.timestamp_millis())
        .execute(&mut *tx)
        .await
        .map_err(Self::db_err)?;

        tx.commit().await.map_err(Self::db_err)?;

        Ok(Preset {
            id,
            user_id: user_id.to_string(),
            name: name.to_string(),
            tool: tool.to_string(),
            params: params.clone(),
            is_default,
            created_at,
        })
    }

    pub async fn update_preset(
        &self,
        user_id: &str,
        id: &str,
        name: Option<&str>,
        params: Option<&serde_json::Value>,
        is_default: Option<bool>,
    ) -> EngineResult<Option<Preset>> {
        let mut tx = self.pool.begin().await.map_err(Self::db_err)?;

        let existing = sqlx::query("SELECT tool FROM presets WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .fetch_optional(&mut *tx)
            .await
            .map_err(Self::db_err)?;
        let Some(existing) = existing else {
            return Ok(None);
        };
        let tool: String = existing.get("tool");

        if is_default == Some(true) {
            sqlx::query("UPDATE presets SET is_default = 0 WHERE user_id = ? AND tool = ?")
                .bind(user_id)
                .bind(&tool)
                .execute(&mut *tx)
                .await
                .map_err(Self::db_err)?;
        }

        sqlx::query(
            "UPDATE presets SET
                name = COALESCE(?, name),
                params = COALESCE(?, params),
                is_default = COALESCE(?, is_default)
             WHERE id = ? AND user_id = ?",
        )
        .bind(name)
        .bind(params.map(|p| p.to_string()))
        .bind(is_default.map(|d| d as i64))
        .bind(id)
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .map_err(Self::db_err)?;

        tx.commit().await.map_err(Self::db_err)?;

        let presets = self.list_presets(user_id).await?;
        Ok(presets.into_iter().find(|p| p.id == id))
    }

    /// Ownership-scoped delete; removing a preset that does not exist is a
    /// successful no-op.
    pub async fn delete_preset(&self, user_id: &str, id: &str) -> EngineResult<()> {
        sqlx::query("DELETE FROM presets WHERE id = ? AND user_id = ?")
            .bind(id)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(Self::db_err)?;
        Ok(())
    }

    // --- Public landing cache ----------------------------------------------

    /// Last-write-wins upsert keyed by tool.
    pub async fn upsert_public_latest(
        &self,
        tool: &str,
        symbol: Option<&str>,
        result: &serde_json::Value,
    ) -> EngineResult<()> {
        sqlx::query(
            "INSERT INTO public_latest_runs (tool, symbol, result, updated_at_ms)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(tool) DO UPDATE SET
                symbol = excluded.symbol,
                result = excluded.result,
                updated_at_ms = excluded.updated_at_ms",
        )
        .bind(tool)
        .bind(symbol)
        .bind(result.to_string())
        .bind(Utc::now().timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(Self::db_err)?;
        Ok(())
    }

    pub async fn public_latest_age(&self, tool: &str) -> EngineResult<Option<Duration>> {
        let row = sqlx::query("SELECT updated_at_ms FROM public_latest_runs WHERE tool = ?")
            .bind(tool)
            .fetch_optional(&self.pool)
            .await
            .map_err(Self::db_err)?;
        Ok(row.map(|r| {
            let age_ms = (Utc::now().timestamp_millis() - r.get::<i64, _>("updated_at_ms")).max(0);
            Duration::from_millis(age_ms as u64)
        }))
    }

    pub async fn list_public_latest(&self) -> EngineResult<Vec<PublicLatestRun>> {
        let rows = sqlx::query(
            "SELECT tool, symbol, result, updated_at_ms
             FROM public_latest_runs ORDER BY updated_at_ms DESC LIMIT 9",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(Self::db_err)?;
        Ok(rows
            .into_iter()
            .map(|row| PublicLatestRun {
                tool: row.get("tool"),
                symbol: row.get("symbol"),
                result: serde_json::from_str(&row.get::<String, _>("result"))
                    .unwrap_or(serde_json::Value::Null),
                updated_at: Utc
                    .timestamp_millis_opt(row.get::<i64, _>("updated_at_ms"))
                    .single()
                    .unwrap_or_else(Utc::now),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn run_lifecycle_success() {
        let store = GatewayStore::in_memory().await.unwrap();
        let (run_id, used) = store
            .begin_run("alice", "analyze_security", &json!({"symbol": "AAPL"}), Some(10))
            .await
            .unwrap();
        assert_eq!(used, 1);

        let run = store.get_run(&run_id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Running);

        store
            .complete_run(&run_id, Ok(&json!({"ok": true})), 42)
            .await
            .unwrap();
        let run = store.get_run(&run_id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Success);
        assert_eq!(run.execution_ms, Some(42));
        assert!(run.result.is_some());
    }

    #[tokio::test]
    async fn quota_denial_leaves_no_row() {
        let store = GatewayStore::in_memory().await.unwrap();
        for n in 1..=3 {
            let (_, used) = store
                .begin_run("bob", "get_trade_plan", &json!({}), Some(3))
                .await
                .unwrap();
            assert_eq!(used, n);
        }

        let err = store
            .begin_run("bob", "get_trade_plan", &json!({}), Some(3))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::QuotaExceeded { used: 3, limit: 3 }));
        assert_eq!(store.count_runs_today("bob", "get_trade_plan").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn quota_is_per_user_and_tool() {
        let store = GatewayStore::in_memory().await.unwrap();
        store
            .begin_run("alice", "analyze_security", &json!({}), Some(1))
            .await
            .unwrap();
        // Different tool and different user both start fresh.
        assert!(store
            .begin_run("alice", "get_trade_plan", &json!({}), Some(1))
            .await
            .is_ok());
        assert!(store
            .begin_run("bob", "analyze_security", &json!({}), Some(1))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn complete_run_is_single_transition() {
        let store = GatewayStore::in_memory().await.unwrap();
        let (run_id, _) = store
            .begin_run("alice", "morning_brief", &json!({}), None)
            .await
            .unwrap();
        store.complete_run(&run_id, Err("boom"), 5).await.unwrap();
        // A second transition attempt leaves the terminal state untouched.
        store
            .complete_run(&run_id, Ok(&json!({"late": true})), 99)
            .await
            .unwrap();

        let run = store.get_run(&run_id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Error);
        assert_eq!(run.error_message.as_deref(), Some("boom"));
        assert_eq!(run.execution_ms, Some(5));
    }

    #[tokio::test]
    async fn orphan_sweep_only_touches_old_running_rows() {
        let store = GatewayStore::in_memory().await.unwrap();
        let (fresh, _) = store
            .begin_run("alice", "scan_trades", &json!({}), None)
            .await
            .unwrap();
        // Nothing is old enough yet.
        assert_eq!(store.sweep_orphan_runs(Duration::from_secs(600)).await.unwrap(), 0);
        // With a zero threshold the fresh running row is swept.
        assert_eq!(store.sweep_orphan_runs(Duration::from_secs(0)).await.unwrap(), 1);
        let run = store.get_run(&fresh).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Error);
        assert_eq!(run.error_message.as_deref(), Some("orphaned"));
    }

    #[tokio::test]
    async fn preset_default_is_unique_per_tool() {
        let store = GatewayStore::in_memory().await.unwrap();
        let first = store
            .create_preset("alice", "daily", "analyze_security", &json!({"period": "1mo"}), true)
            .await
            .unwrap();
        let second = store
            .create_preset("alice", "weekly", "analyze_security", &json!({"period": "3mo"}), true)
            .await
            .unwrap();

        let presets = store.list_presets("alice").await.unwrap();
        assert_eq!(presets.len(), 2);
        let defaults: Vec<&Preset> = presets.iter().filter(|p| p.is_default).collect();
        assert_eq!(defaults.len(), 1);
        assert_eq!(defaults[0].id, second.id);
        assert!(presets.iter().any(|p| p.id == first.id && !p.is_default));
    }

    #[tokio::test]
    async fn preset_delete_is_idempotent_and_ownership_scoped() {
        let store = GatewayStore::in_memory().await.unwrap();
        let preset = store
            .create_preset("alice", "mine", "scan_trades", &json!({}), false)
            .await
            .unwrap();

        // Someone else's delete is a no-op.
        store.delete_preset("bob", &preset.id).await.unwrap();
        assert_eq!(store.list_presets("alice").await.unwrap().len(), 1);

        store.delete_preset("alice", &preset.id).await.unwrap();
        assert!(store.list_presets("alice").await.unwrap().is_empty());

        // Deleting again still succeeds.
        store.delete_preset("alice", &preset.id).await.unwrap();
    }

    #[tokio::test]
    async fn public_latest_is_last_write_wins() {
        let store = GatewayStore::in_memory().await.unwrap();
        store
            .upsert_public_latest("analyze_security", Some("AAPL"), &json!({"v": 1}))
            .await
            .unwrap();
        store
            .upsert_public_latest("analyze_security", Some("MSFT"), &json!({"v": 2}))
            .await
            .unwrap();

        let latest = store.list_public_latest().await.unwrap();
        assert_eq!(latest.len(), 1);
        assert_eq!(latest[0].symbol.as_deref(), Some("MSFT"));
        assert_eq!(latest[0].result["v"], 2);

        let age = store.public_latest_age("analyze_security").await.unwrap();
        assert!(age.unwrap() < Duration::from_secs(5));
        assert!(store.public_latest_age("scan_trades").await.unwrap().is_none());
    }
}
