// ==========================================
// 服务排程编排系统 - 排程数据仓储（SQLite）
// ==========================================
// 表: schedule（排程头）/ schedule_visit（访问明细）
// 红线: Repository 不含业务逻辑
// ==========================================

use crate::db::{ensure_schema, open_sqlite_connection};
use crate::domain::schedule::{Schedule, Visit};
use crate::domain::types::VisitType;
use crate::repository::collaborators::ScheduleStore;
use crate::repository::error::{RepositoryError, RepositoryResult};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

// ==========================================
// SqliteScheduleStore - 排程仓储
// ==========================================
pub struct SqliteScheduleStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteScheduleStore {
    /// 打开数据库并建表
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        ensure_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建仓储实例（调用方负责建表）
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 按ID读取排程（含访问明细）
    pub fn find_by_id(&self, schedule_id: &str) -> RepositoryResult<Option<Schedule>> {
        let conn = self.get_conn()?;
        let header = conn
            .query_row(
                r#"
                SELECT schedule_id, partner_id, partner_name, installation_code, contract_code,
                       start_date, end_date, total_hours, strategy_name, final_score,
                       confidence, created_at
                FROM schedule WHERE schedule_id = ?1
                "#,
                params![schedule_id],
                |row| {
                    Ok(Schedule {
                        schedule_id: row.get(0)?,
                        partner_id: row.get(1)?,
                        partner_name: row.get(2)?,
                        installation_code: row.get(3)?,
                        contract_code: row.get(4)?,
                        start_date: row.get(5)?,
                        end_date: row.get(6)?,
                        total_hours: row.get(7)?,
                        strategy_name: row.get(8)?,
                        final_score: row.get(9)?,
                        confidence: row.get(10)?,
                        visits: Vec::new(),
                        created_at: row.get(11)?,
                    })
                },
            )
            .optional()?;

        let mut schedule = match header {
            Some(s) => s,
            None => return Ok(None),
        };

        let mut stmt = conn.prepare(
            r#"
            SELECT visit_date, start_time, end_time, duration_hours, visit_type, notes
            FROM schedule_visit WHERE schedule_id = ?1 ORDER BY seq
            "#,
        )?;
        let visits = stmt
            .query_map(params![schedule_id], |row| {
                let visit_type: String = row.get(4)?;
                Ok(Visit {
                    date: row.get(0)?,
                    start_time: row.get(1)?,
                    end_time: row.get(2)?,
                    duration_hours: row.get(3)?,
                    visit_type: VisitType::parse(&visit_type),
                    notes: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        schedule.visits = visits;
        Ok(Some(schedule))
    }

    /// 服务点的排程ID列表（最新在前）
    pub fn list_ids_by_installation(&self, installation_code: &str) -> RepositoryResult<Vec<String>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT schedule_id FROM schedule WHERE installation_code = ?1 ORDER BY created_at DESC, schedule_id",
        )?;
        let ids = stmt
            .query_map(params![installation_code], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }
}

#[async_trait]
impl ScheduleStore for SqliteScheduleStore {
    async fn create_schedule(&self, schedule: &Schedule) -> RepositoryResult<String> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO schedule (
                schedule_id, partner_id, partner_name, installation_code, contract_code,
                start_date, end_date, total_hours, strategy_name, final_score,
                confidence, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
            params![
                schedule.schedule_id,
                schedule.partner_id,
                schedule.partner_name,
                schedule.installation_code,
                schedule.contract_code,
                schedule.start_date,
                schedule.end_date,
                schedule.total_hours,
                schedule.strategy_name,
                schedule.final_score,
                schedule.confidence,
                schedule.created_at,
            ],
        )?;
        Ok(schedule.schedule_id.clone())
    }

    async fn create_visits(&self, schedule_id: &str, visits: &[Visit]) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let tx = conn.unchecked_transaction()?;

        let offset: i64 = tx.query_row(
            "SELECT COALESCE(MAX(seq) + 1, 0) FROM schedule_visit WHERE schedule_id = ?1",
            params![schedule_id],
            |row| row.get(0),
        )?;

        let mut count = 0;
        for (i, visit) in visits.iter().enumerate() {
            tx.execute(
                r#"
                INSERT INTO schedule_visit (
                    schedule_id, seq, visit_date, start_time, end_time,
                    duration_hours, visit_type, notes
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                "#,
                params![
                    schedule_id,
                    offset + i as i64,
                    visit.date,
                    visit.start_time,
                    visit.end_time,
                    visit.duration_hours,
                    visit.visit_type.as_str(),
                    visit.notes,
                ],
            )?;
            count += 1;
        }

        tx.commit()?;
        Ok(count)
    }
}
