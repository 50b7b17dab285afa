// ==========================================
// 服务排程编排系统 - 算法指标仓储（SQLite）
// ==========================================
// 表: algorithm_run（逐次增量）/ algorithm_record（累计档案）
// 一次编排的增量在同一事务中写入
// ==========================================

use crate::db::{ensure_schema, open_sqlite_connection};
use crate::domain::algorithm::{AlgorithmRecord, AlgorithmRunDelta};
use crate::domain::types::StrategyKind;
use crate::repository::collaborators::MetricsStore;
use crate::repository::error::{RepositoryError, RepositoryResult};
use async_trait::async_trait;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

pub struct SqliteMetricsStore {
    conn: Arc<Mutex<Connection>>,
}

fn map_record(row: &Row<'_>) -> rusqlite::Result<AlgorithmRecord> {
    let kind: String = row.get(1)?;
    let kind = kind
        .parse::<StrategyKind>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, e.into()))?;
    let parameters_json: String = row.get(3)?;
    Ok(AlgorithmRecord {
        name: row.get(0)?,
        kind,
        version: row.get(2)?,
        parameters: serde_json::from_str(&parameters_json).unwrap_or_else(|_| serde_json::json!({})),
        total_runs: row.get::<_, i64>(4)?.max(0) as u64,
        successful_runs: row.get::<_, i64>(5)?.max(0) as u64,
        avg_execution_time_ms: row.get(6)?,
        avg_score: row.get(7)?,
        last_run_at: row.get(8)?,
    })
}

const SELECT_RECORD: &str = r#"
    SELECT name, kind, version, parameters_json, total_runs, successful_runs,
           avg_execution_time_ms, avg_score, last_run_at
    FROM algorithm_record
"#;

impl SqliteMetricsStore {
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        ensure_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 写入/更新算法身份（版本与参数）
    pub fn upsert_identity(&self, record: &AlgorithmRecord) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO algorithm_record (name, kind, version, parameters_json)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(name) DO UPDATE SET
                kind = excluded.kind,
                version = excluded.version,
                parameters_json = excluded.parameters_json
            "#,
            params![
                record.name,
                record.kind.as_str(),
                record.version,
                serde_json::to_string(&record.parameters)?,
            ],
        )?;
        Ok(())
    }

    /// 某次编排写入的增量条数
    pub fn count_runs(&self, run_id: &str) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM algorithm_run WHERE run_id = ?1",
            params![run_id],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as usize)
    }
}

#[async_trait]
impl MetricsStore for SqliteMetricsStore {
    async fn append_run_deltas(&self, deltas: &[AlgorithmRunDelta]) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;

        for delta in deltas {
            tx.execute(
                r#"
                INSERT INTO algorithm_run (
                    run_id, name, kind, version, success, score, execution_time_ms, recorded_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
                params![
                    delta.run_id,
                    delta.name,
                    delta.kind.as_str(),
                    delta.version,
                    delta.success,
                    delta.score,
                    delta.execution_time_ms as i64,
                    delta.recorded_at,
                ],
            )?;

            let existing = tx
                .query_row(&format!("{} WHERE name = ?1", SELECT_RECORD), params![delta.name], map_record)
                .optional()?;
            let record = match existing {
                Some(mut record) => {
                    record.apply(delta);
                    record
                }
                None => AlgorithmRecord::from_delta(delta),
            };

            tx.execute(
                r#"
                INSERT INTO algorithm_record (
                    name, kind, version, parameters_json, total_runs, successful_runs,
                    avg_execution_time_ms, avg_score, last_run_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                ON CONFLICT(name) DO UPDATE SET
                    kind = excluded.kind,
                    version = excluded.version,
                    total_runs = excluded.total_runs,
                    successful_runs = excluded.successful_runs,
                    avg_execution_time_ms = excluded.avg_execution_time_ms,
                    avg_score = excluded.avg_score,
                    last_run_at = excluded.last_run_at
                "#,
                params![
                    record.name,
                    record.kind.as_str(),
                    record.version,
                    serde_json::to_string(&record.parameters)?,
                    record.total_runs as i64,
                    record.successful_runs as i64,
                    record.avg_execution_time_ms,
                    record.avg_score,
                    record.last_run_at,
                ],
            )?;
        }

        tx.commit()?;
        Ok(deltas.len())
    }

    async fn load_records(&self) -> RepositoryResult<Vec<AlgorithmRecord>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(&format!("{} ORDER BY name", SELECT_RECORD))?;
        let records = stmt
            .query_map([], map_record)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }
}
