// ==========================================
// 库存调拨与再平衡引擎 - 再平衡运行仓储
// ==========================================
// 运行记录在执行完成时一次性落库，作为不可变历史
// 范围/约束/配置快照以 JSON 文本存档，供事后审计还原
// ==========================================

use crate::domain::types::{RebalanceObjective, RunState};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection, Result as SqliteResult, Row};
use std::sync::{Arc, Mutex};

const DT_FMT: &str = "%Y-%m-%d %H:%M:%S";

// ==========================================
// RunRecord - 运行存档行
// ==========================================
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub run_id: String,                       // 运行ID
    pub state: RunState,                      // 终态
    pub objective: RebalanceObjective,        // 业务目标
    pub strategy: String,                     // 策略键
    pub scope_json: Option<String>,           // 圈定范围快照
    pub constraints_json: Option<String>,     // 约束快照
    pub config_snapshot_json: Option<String>, // 配置快照
    pub summary_json: Option<String>,         // 执行汇总
    pub requested_by: String,                 // 发起人
    pub created_at: NaiveDateTime,            // 圈定时间
    pub finished_at: Option<NaiveDateTime>,   // 完成时间
}

// ==========================================
// RunRepository - 再平衡运行仓储
// ==========================================
pub struct RunRepository {
    conn: Arc<Mutex<Connection>>,
}

impl RunRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 存档一次运行
    pub fn insert(&self, record: &RunRecord) -> RepositoryResult<String> {
        let conn = self.get_conn()?;

        conn.execute(
            r#"
            INSERT INTO rebalance_run (
                run_id, state, objective, strategy,
                scope_json, constraints_json, config_snapshot_json, summary_json,
                requested_by, created_at, finished_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                record.run_id,
                record.state.to_db_str(),
                record.objective.to_db_str(),
                record.strategy,
                record.scope_json,
                record.constraints_json,
                record.config_snapshot_json,
                record.summary_json,
                record.requested_by,
                record.created_at.format(DT_FMT).to_string(),
                record.finished_at.map(|d| d.format(DT_FMT).to_string()),
            ],
        )?;

        Ok(record.run_id.clone())
    }

    /// 按 run_id 查询
    pub fn find_by_id(&self, run_id: &str) -> RepositoryResult<Option<RunRecord>> {
        let conn = self.get_conn()?;

        match conn.query_row(
            &format!("{} WHERE run_id = ?", SELECT_BASE),
            params![run_id],
            |row| self.map_row(row),
        ) {
            Ok(record) => Ok(Some(record)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 查询最近的 N 次运行 (新到旧)
    pub fn list_recent(&self, limit: i32) -> RepositoryResult<Vec<RunRecord>> {
        let conn = self.get_conn()?;

        let mut stmt =
            conn.prepare(&format!("{} ORDER BY created_at DESC LIMIT ?", SELECT_BASE))?;

        let records = stmt
            .query_map(params![limit], |row| self.map_row(row))?
            .collect::<SqliteResult<Vec<_>>>()?;

        Ok(records)
    }

    /// 将数据库行映射为 RunRecord
    fn map_row(&self, row: &Row) -> SqliteResult<RunRecord> {
        let created_at_str: String = row.get(9)?;
        let finished_at_str: Option<String> = row.get(10)?;

        let created_at =
            NaiveDateTime::parse_from_str(&created_at_str, DT_FMT).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    9,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?;

        let finished_at = match finished_at_str {
            Some(s) => Some(NaiveDateTime::parse_from_str(&s, DT_FMT).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    10,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?),
            None => None,
        };

        Ok(RunRecord {
            run_id: row.get(0)?,
            state: RunState::from_str(&row.get::<_, String>(1)?),
            objective: RebalanceObjective::from_str(&row.get::<_, String>(2)?),
            strategy: row.get(3)?,
            scope_json: row.get(4)?,
            constraints_json: row.get(5)?,
            config_snapshot_json: row.get(6)?,
            summary_json: row.get(7)?,
            requested_by: row.get(8)?,
            created_at,
            finished_at,
        })
    }
}

/// SELECT 公共列 (与 map_row 的列序一致)
const SELECT_BASE: &str = r#"SELECT run_id, state, objective, strategy,
       scope_json, constraints_json, config_snapshot_json, summary_json,
       requested_by, created_at, finished_at
  FROM rebalance_run"#;
