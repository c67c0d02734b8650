// ==========================================
// 库存调拨与再平衡引擎 - 告警仓储
// ==========================================
// 红线: 同一身份 (sku, location, alert_type) 最多一条未关闭告警
// 红线: 状态迁移只能由本仓储按告警状态机执行
// ==========================================

use crate::domain::alert::{Alert, AlertCandidate, AlertFilter};
use crate::domain::types::{AlertSeverity, AlertStatus, AlertType};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

const DT_FMT: &str = "%Y-%m-%d %H:%M:%S";

// ==========================================
// AlertRepository - 告警仓储
// ==========================================
pub struct AlertRepository {
    conn: Arc<Mutex<Connection>>,
}

impl AlertRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 去重插入: 同一身份已有未关闭告警则不落库
    ///
    /// 返回 `Some(alert_id)` 表示新建，`None` 表示被去重吸收。
    /// 检查与插入在同一事务内，避免生成过程中出现双开告警。
    pub fn insert_if_absent(
        &self,
        candidate: &AlertCandidate,
        alert_id: &str,
        triggered_at: NaiveDateTime,
    ) -> RepositoryResult<Option<String>> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let existing: Result<String, _> = tx.query_row(
            r#"SELECT alert_id FROM alert
               WHERE sku_id = ? AND location_id = ? AND alert_type = ?
                 AND status IN ('ACTIVE', 'ACKNOWLEDGED')"#,
            params![
                &candidate.sku_id,
                &candidate.location_id,
                candidate.alert_type.to_db_str(),
            ],
            |row| row.get(0),
        );

        match existing {
            Ok(_) => {
                // 已有未关闭告警，吸收本次候选
                return Ok(None);
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => {}
            Err(e) => return Err(e.into()),
        }

        tx.execute(
            r#"INSERT INTO alert (
                alert_id, sku_id, location_id, alert_type, severity,
                status, reason, triggered_at
            ) VALUES (?, ?, ?, ?, ?, 'ACTIVE', ?, ?)"#,
            params![
                alert_id,
                &candidate.sku_id,
                &candidate.location_id,
                candidate.alert_type.to_db_str(),
                candidate.severity.to_db_str(),
                &candidate.reason,
                &triggered_at.format(DT_FMT).to_string(),
            ],
        )?;

        tx.commit()?;
        Ok(Some(alert_id.to_string()))
    }

    /// 按 alert_id 查询
    pub fn find_by_id(&self, alert_id: &str) -> RepositoryResult<Option<Alert>> {
        let conn = self.get_conn()?;

        match conn.query_row(
            &format!("{} WHERE alert_id = ?", SELECT_BASE),
            params![alert_id],
            |row| self.map_row(row),
        ) {
            Ok(alert) => Ok(Some(alert)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 查询某身份下的未关闭告警
    pub fn find_open_by_identity(
        &self,
        sku_id: &str,
        location_id: &str,
        alert_type: AlertType,
    ) -> RepositoryResult<Option<Alert>> {
        let conn = self.get_conn()?;

        match conn.query_row(
            &format!(
                "{} WHERE sku_id = ? AND location_id = ? AND alert_type = ? \
                 AND status IN ('ACTIVE', 'ACKNOWLEDGED')",
                SELECT_BASE
            ),
            params![sku_id, location_id, alert_type.to_db_str()],
            |row| self.map_row(row),
        ) {
            Ok(alert) => Ok(Some(alert)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 查询全部未关闭告警 (入库顺序)
    pub fn list_open(&self) -> RepositoryResult<Vec<Alert>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(&format!(
            "{} WHERE status IN ('ACTIVE', 'ACKNOWLEDGED') ORDER BY rowid",
            SELECT_BASE
        ))?;

        let alerts = stmt
            .query_map([], |row| self.map_row(row))?
            .collect::<Result<Vec<Alert>, _>>()?;

        Ok(alerts)
    }

    /// 按过滤条件查询告警 (入库顺序)
    pub fn list(&self, filter: &AlertFilter) -> RepositoryResult<Vec<Alert>> {
        let conn = self.get_conn()?;

        let mut conditions: Vec<&str> = Vec::new();
        let mut values: Vec<String> = Vec::new();

        if let Some(ref sku_id) = filter.sku_id {
            conditions.push("sku_id = ?");
            values.push(sku_id.clone());
        }
        if let Some(ref location_id) = filter.location_id {
            conditions.push("location_id = ?");
            values.push(location_id.clone());
        }
        if let Some(alert_type) = filter.alert_type {
            conditions.push("alert_type = ?");
            values.push(alert_type.to_db_str().to_string());
        }
        if let Some(status) = filter.status {
            conditions.push("status = ?");
            values.push(status.to_db_str().to_string());
        }
        if let Some(severity) = filter.severity {
            conditions.push("severity = ?");
            values.push(severity.to_db_str().to_string());
        }
        if filter.only_open {
            conditions.push("status IN ('ACTIVE', 'ACKNOWLEDGED')");
        }

        let sql = if conditions.is_empty() {
            format!("{} ORDER BY rowid", SELECT_BASE)
        } else {
            format!("{} WHERE {} ORDER BY rowid", SELECT_BASE, conditions.join(" AND "))
        };

        let mut stmt = conn.prepare(&sql)?;
        let alerts = stmt
            .query_map(rusqlite::params_from_iter(values.iter()), |row| {
                self.map_row(row)
            })?
            .collect::<Result<Vec<Alert>, _>>()?;

        Ok(alerts)
    }

    /// 确认告警: ACTIVE -> ACKNOWLEDGED
    ///
    /// 已确认则幂等返回当前记录；已消除/已关闭拒绝确认。
    pub fn acknowledge(
        &self,
        alert_id: &str,
        actor: &str,
        ts: NaiveDateTime,
    ) -> RepositoryResult<Alert> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let current = fetch_alert(&tx, alert_id)?;

        match current.status {
            AlertStatus::Acknowledged => return Ok(current),
            AlertStatus::Resolved | AlertStatus::Dismissed => {
                return Err(RepositoryError::InvalidStateTransition {
                    from: current.status.to_db_str().to_string(),
                    to: AlertStatus::Acknowledged.to_db_str().to_string(),
                });
            }
            AlertStatus::Active => {}
        }

        tx.execute(
            r#"UPDATE alert
               SET status = 'ACKNOWLEDGED', acknowledged_at = ?, acknowledged_by = ?
               WHERE alert_id = ?"#,
            params![&ts.format(DT_FMT).to_string(), actor, alert_id],
        )?;

        tx.commit()?;

        Ok(Alert {
            status: AlertStatus::Acknowledged,
            acknowledged_at: Some(ts),
            acknowledged_by: Some(actor.to_string()),
            ..current
        })
    }

    /// 关闭告警: ACTIVE/ACKNOWLEDGED -> DISMISSED
    ///
    /// 已关闭或已消除均幂等返回当前记录，供补偿流程安全重放。
    pub fn dismiss(
        &self,
        alert_id: &str,
        actor: &str,
        ts: NaiveDateTime,
    ) -> RepositoryResult<Alert> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let current = fetch_alert(&tx, alert_id)?;

        if current.status.is_terminal() {
            return Ok(current);
        }

        tx.execute(
            r#"UPDATE alert
               SET status = 'DISMISSED', dismissed_at = ?, dismissed_by = ?
               WHERE alert_id = ?"#,
            params![&ts.format(DT_FMT).to_string(), actor, alert_id],
        )?;

        tx.commit()?;

        Ok(Alert {
            status: AlertStatus::Dismissed,
            dismissed_at: Some(ts),
            dismissed_by: Some(actor.to_string()),
            ..current
        })
    }

    /// 消除告警: ACTIVE/ACKNOWLEDGED -> RESOLVED (条件不再成立时的自动口径)
    pub fn resolve(&self, alert_id: &str, ts: NaiveDateTime) -> RepositoryResult<Alert> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let current = fetch_alert(&tx, alert_id)?;

        if current.status.is_terminal() {
            return Ok(current);
        }

        tx.execute(
            r#"UPDATE alert SET status = 'RESOLVED', resolved_at = ? WHERE alert_id = ?"#,
            params![&ts.format(DT_FMT).to_string(), alert_id],
        )?;

        tx.commit()?;

        Ok(Alert {
            status: AlertStatus::Resolved,
            resolved_at: Some(ts),
            ..current
        })
    }

    /// 映射数据库行到 Alert 对象
    fn map_row(&self, row: &rusqlite::Row) -> rusqlite::Result<Alert> {
        map_alert_row(row)
    }
}

/// SELECT 公共列 (与 map_alert_row 的列序一致)
const SELECT_BASE: &str = r#"SELECT alert_id, sku_id, location_id, alert_type, severity,
       status, reason, triggered_at,
       acknowledged_at, acknowledged_by,
       resolved_at, dismissed_at, dismissed_by
  FROM alert"#;

/// 事务上下文内按主键取告警
fn fetch_alert(tx: &rusqlite::Transaction, alert_id: &str) -> RepositoryResult<Alert> {
    match tx.query_row(
        &format!("{} WHERE alert_id = ?", SELECT_BASE),
        params![alert_id],
        map_alert_row,
    ) {
        Ok(alert) => Ok(alert),
        Err(rusqlite::Error::QueryReturnedNoRows) => Err(RepositoryError::NotFound {
            entity: "Alert".to_string(),
            id: alert_id.to_string(),
        }),
        Err(e) => Err(e.into()),
    }
}

/// 行映射
fn map_alert_row(row: &rusqlite::Row) -> rusqlite::Result<Alert> {
    Ok(Alert {
        alert_id: row.get(0)?,
        sku_id: row.get(1)?,
        location_id: row.get(2)?,
        alert_type: AlertType::from_str(&row.get::<_, String>(3)?),
        severity: AlertSeverity::from_str(&row.get::<_, String>(4)?),
        status: AlertStatus::from_str(&row.get::<_, String>(5)?),
        reason: row.get(6)?,
        triggered_at: parse_dt(row, 7)?,
        acknowledged_at: parse_opt_dt(row, 8)?,
        acknowledged_by: row.get(9)?,
        resolved_at: parse_opt_dt(row, 10)?,
        dismissed_at: parse_opt_dt(row, 11)?,
        dismissed_by: row.get(12)?,
    })
}

fn parse_dt(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(&row.get::<_, String>(idx)?, DT_FMT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn parse_opt_dt(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Option<NaiveDateTime>> {
    let raw: Option<String> = row.get(idx)?;
    match raw {
        Some(s) => {
            let dt = NaiveDateTime::parse_from_str(&s, DT_FMT).map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    idx,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            })?;
            Ok(Some(dt))
        }
        None => Ok(None),
    }
}
