// ==========================================
// 库存调拨与再平衡引擎 - 调拨单仓储
// ==========================================
// 红线: 调拨单状态机 REQUESTED -> IN_TRANSIT -> RECEIVED / CANCELLED
// 红线: 库存结算与状态变更必须在同一事务内，保证分配行与单据一致
// 红线: 发运/收货/取消对重复调用幂等，供失败重试安全重放
// ==========================================

use crate::domain::transfer::{TransferFilter, TransferOrder};
use crate::domain::types::TransferStatus;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

const DT_FMT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FMT: &str = "%Y-%m-%d";

// ==========================================
// TransferRepository - 调拨单仓储
// ==========================================
pub struct TransferRepository {
    conn: Arc<Mutex<Connection>>,
}

impl TransferRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 创建调拨单 (只记账不动库存)
    pub fn create(&self, order: &TransferOrder) -> RepositoryResult<String> {
        if order.quantity <= 0 {
            return Err(RepositoryError::FieldValueError {
                field: "quantity".to_string(),
                message: format!("调拨量必须为正: {}", order.quantity),
            });
        }

        let conn = self.get_conn()?;
        insert_order(&conn, order)?;
        Ok(order.transfer_id.clone())
    }

    /// 按 transfer_id 查询
    pub fn find_by_id(&self, transfer_id: &str) -> RepositoryResult<Option<TransferOrder>> {
        let conn = self.get_conn()?;

        match conn.query_row(
            &format!("{} WHERE transfer_id = ?", SELECT_BASE),
            params![transfer_id],
            |row| self.map_row(row),
        ) {
            Ok(order) => Ok(Some(order)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 按过滤条件查询调拨单 (入库顺序)
    pub fn list(&self, filter: &TransferFilter) -> RepositoryResult<Vec<TransferOrder>> {
        let conn = self.get_conn()?;

        let mut conditions: Vec<&str> = Vec::new();
        let mut values: Vec<String> = Vec::new();

        if let Some(ref sku_id) = filter.sku_id {
            conditions.push("sku_id = ?");
            values.push(sku_id.clone());
        }
        if let Some(status) = filter.status {
            conditions.push("status = ?");
            values.push(status.to_db_str().to_string());
        }
        if let Some(ref run_id) = filter.run_id {
            conditions.push("run_id = ?");
            values.push(run_id.clone());
        }

        let sql = if conditions.is_empty() {
            format!("{} ORDER BY rowid", SELECT_BASE)
        } else {
            format!(
                "{} WHERE {} ORDER BY rowid",
                SELECT_BASE,
                conditions.join(" AND ")
            )
        };

        let mut stmt = conn.prepare(&sql)?;
        let orders = stmt
            .query_map(rusqlite::params_from_iter(values.iter()), |row| {
                self.map_row(row)
            })?
            .collect::<Result<Vec<TransferOrder>, _>>()?;

        Ok(orders)
    }

    /// 发运: REQUESTED -> IN_TRANSIT
    ///
    /// 同一事务内:
    /// 1. 目的库位无分配行则先建空行 (SKU 借调拨首次进入该库位)
    /// 2. 目的库位 in_transit += quantity
    /// 3. 单据状态置 IN_TRANSIT
    /// 重复发运幂等返回当前单据。
    pub fn mark_in_transit(
        &self,
        transfer_id: &str,
        ts: NaiveDateTime,
    ) -> RepositoryResult<TransferOrder> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let current = fetch_order(&tx, transfer_id)?;

        match current.status {
            TransferStatus::InTransit => return Ok(current),
            TransferStatus::Requested => {}
            other => {
                return Err(RepositoryError::InvalidStateTransition {
                    from: other.to_db_str().to_string(),
                    to: TransferStatus::InTransit.to_db_str().to_string(),
                });
            }
        }

        let now_str = ts.format(DT_FMT).to_string();

        // 目的库位可能尚未铺货，占位行从零计起
        tx.execute(
            r#"INSERT OR IGNORE INTO allocation (
                allocation_id, sku_id, location_id,
                allocated, target, on_hand, in_transit, safety_stock,
                revision, updated_at
            ) VALUES (?, ?, ?, 0, 0, 0, 0, 0, 0, ?)"#,
            params![
                Uuid::new_v4().to_string(),
                &current.sku_id,
                &current.to_location_id,
                &now_str,
            ],
        )?;

        tx.execute(
            r#"UPDATE allocation
               SET in_transit = in_transit + ?, revision = revision + 1, updated_at = ?
               WHERE sku_id = ? AND location_id = ?"#,
            params![
                current.quantity,
                &now_str,
                &current.sku_id,
                &current.to_location_id,
            ],
        )?;

        tx.execute(
            r#"UPDATE transfer_order
               SET status = 'IN_TRANSIT', dispatched_at = ?
               WHERE transfer_id = ?"#,
            params![&now_str, transfer_id],
        )?;

        tx.commit()?;

        Ok(TransferOrder {
            status: TransferStatus::InTransit,
            dispatched_at: Some(ts),
            ..current
        })
    }

    /// 收货: IN_TRANSIT -> RECEIVED
    ///
    /// 同一事务内:
    /// 1. 源库位 on_hand -= quantity (现货不足则拒绝收货)
    /// 2. 目的库位 in_transit -= quantity, on_hand += quantity
    /// 3. 单据状态置 RECEIVED
    /// 重复收货幂等返回当前单据；未发运直接收货按非法迁移拒绝。
    pub fn mark_received(
        &self,
        transfer_id: &str,
        actor: &str,
        ts: NaiveDateTime,
    ) -> RepositoryResult<TransferOrder> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let current = fetch_order(&tx, transfer_id)?;

        match current.status {
            TransferStatus::Received => return Ok(current),
            TransferStatus::InTransit => {}
            other => {
                return Err(RepositoryError::InvalidStateTransition {
                    from: other.to_db_str().to_string(),
                    to: TransferStatus::Received.to_db_str().to_string(),
                });
            }
        }

        let available: i64 = match tx.query_row(
            "SELECT on_hand FROM allocation WHERE sku_id = ? AND location_id = ?",
            params![&current.sku_id, &current.from_location_id],
            |row| row.get(0),
        ) {
            Ok(v) => v,
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                return Err(RepositoryError::NotFound {
                    entity: "Allocation".to_string(),
                    id: format!("{}@{}", current.sku_id, current.from_location_id),
                });
            }
            Err(e) => return Err(e.into()),
        };

        if available < current.quantity {
            return Err(RepositoryError::InsufficientStock {
                location_id: current.from_location_id.clone(),
                requested: current.quantity,
                available,
            });
        }

        let now_str = ts.format(DT_FMT).to_string();

        tx.execute(
            r#"UPDATE allocation
               SET on_hand = on_hand - ?, revision = revision + 1, updated_at = ?
               WHERE sku_id = ? AND location_id = ?"#,
            params![
                current.quantity,
                &now_str,
                &current.sku_id,
                &current.from_location_id,
            ],
        )?;

        tx.execute(
            r#"UPDATE allocation
               SET in_transit = in_transit - ?, on_hand = on_hand + ?,
                   revision = revision + 1, updated_at = ?
               WHERE sku_id = ? AND location_id = ?"#,
            params![
                current.quantity,
                current.quantity,
                &now_str,
                &current.sku_id,
                &current.to_location_id,
            ],
        )?;

        tx.execute(
            r#"UPDATE transfer_order
               SET status = 'RECEIVED', received_at = ?, received_by = ?
               WHERE transfer_id = ?"#,
            params![&now_str, actor, transfer_id],
        )?;

        tx.commit()?;

        Ok(TransferOrder {
            status: TransferStatus::Received,
            received_at: Some(ts),
            received_by: Some(actor.to_string()),
            ..current
        })
    }

    /// 取消: REQUESTED/IN_TRANSIT -> CANCELLED
    ///
    /// 未发运的单据只改状态；已发运的单据同事务冲回目的库位 in_transit。
    /// 已收货拒绝取消；重复取消幂等返回当前单据。
    pub fn cancel(
        &self,
        transfer_id: &str,
        reason: Option<&str>,
        ts: NaiveDateTime,
    ) -> RepositoryResult<TransferOrder> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let current = fetch_order(&tx, transfer_id)?;

        match current.status {
            TransferStatus::Cancelled => return Ok(current),
            TransferStatus::Received => {
                return Err(RepositoryError::InvalidStateTransition {
                    from: TransferStatus::Received.to_db_str().to_string(),
                    to: TransferStatus::Cancelled.to_db_str().to_string(),
                });
            }
            TransferStatus::Requested | TransferStatus::InTransit => {}
        }

        let now_str = ts.format(DT_FMT).to_string();

        if current.status == TransferStatus::InTransit {
            tx.execute(
                r#"UPDATE allocation
                   SET in_transit = in_transit - ?, revision = revision + 1, updated_at = ?
                   WHERE sku_id = ? AND location_id = ?"#,
                params![
                    current.quantity,
                    &now_str,
                    &current.sku_id,
                    &current.to_location_id,
                ],
            )?;
        }

        tx.execute(
            r#"UPDATE transfer_order
               SET status = 'CANCELLED', cancelled_at = ?, cancel_reason = ?
               WHERE transfer_id = ?"#,
            params![&now_str, reason, transfer_id],
        )?;

        tx.commit()?;

        Ok(TransferOrder {
            status: TransferStatus::Cancelled,
            cancelled_at: Some(ts),
            cancel_reason: reason.map(|s| s.to_string()),
            ..current
        })
    }

    /// 映射数据库行到 TransferOrder 对象
    fn map_row(&self, row: &rusqlite::Row) -> rusqlite::Result<TransferOrder> {
        map_order_row(row)
    }
}

/// SELECT 公共列 (与 map_order_row 的列序一致)
const SELECT_BASE: &str = r#"SELECT transfer_id, sku_id, from_location_id, to_location_id,
       quantity, status, run_id, requested_at, required_by, created_by,
       dispatched_at, received_at, received_by, cancelled_at, cancel_reason
  FROM transfer_order"#;

/// 插入调拨单 (供本仓储与再平衡提交事务共用)
pub(crate) fn insert_order(conn: &Connection, order: &TransferOrder) -> rusqlite::Result<()> {
    conn.execute(
        r#"INSERT INTO transfer_order (
            transfer_id, sku_id, from_location_id, to_location_id,
            quantity, status, run_id, requested_at, required_by, created_by,
            dispatched_at, received_at, received_by, cancelled_at, cancel_reason
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        params![
            &order.transfer_id,
            &order.sku_id,
            &order.from_location_id,
            &order.to_location_id,
            &order.quantity,
            order.status.to_db_str(),
            &order.run_id,
            &order.requested_at.format(DT_FMT).to_string(),
            &order.required_by.map(|d| d.format(DATE_FMT).to_string()),
            &order.created_by,
            &order.dispatched_at.map(|d| d.format(DT_FMT).to_string()),
            &order.received_at.map(|d| d.format(DT_FMT).to_string()),
            &order.received_by,
            &order.cancelled_at.map(|d| d.format(DT_FMT).to_string()),
            &order.cancel_reason,
        ],
    )?;
    Ok(())
}

/// 事务上下文内按主键取调拨单
fn fetch_order(tx: &rusqlite::Transaction, transfer_id: &str) -> RepositoryResult<TransferOrder> {
    match tx.query_row(
        &format!("{} WHERE transfer_id = ?", SELECT_BASE),
        params![transfer_id],
        map_order_row,
    ) {
        Ok(order) => Ok(order),
        Err(rusqlite::Error::QueryReturnedNoRows) => Err(RepositoryError::NotFound {
            entity: "TransferOrder".to_string(),
            id: transfer_id.to_string(),
        }),
        Err(e) => Err(e.into()),
    }
}

/// 行映射
fn map_order_row(row: &rusqlite::Row) -> rusqlite::Result<TransferOrder> {
    Ok(TransferOrder {
        transfer_id: row.get(0)?,
        sku_id: row.get(1)?,
        from_location_id: row.get(2)?,
        to_location_id: row.get(3)?,
        quantity: row.get(4)?,
        status: TransferStatus::from_str(&row.get::<_, String>(5)?),
        run_id: row.get(6)?,
        requested_at: parse_dt(row, 7)?,
        required_by: parse_opt_date(row, 8)?,
        created_by: row.get(9)?,
        dispatched_at: parse_opt_dt(row, 10)?,
        received_at: parse_opt_dt(row, 11)?,
        received_by: row.get(12)?,
        cancelled_at: parse_opt_dt(row, 13)?,
        cancel_reason: row.get(14)?,
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
        Some(s) => NaiveDateTime::parse_from_str(&s, DT_FMT)
            .map(Some)
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    idx,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            }),
        None => Ok(None),
    }
}

fn parse_opt_date(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Option<NaiveDate>> {
    let raw: Option<String> = row.get(idx)?;
    match raw {
        Some(s) => NaiveDate::parse_from_str(&s, DATE_FMT)
            .map(Some)
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(
                    idx,
                    rusqlite::types::Type::Text,
                    Box::new(e),
                )
            }),
        None => Ok(None),
    }
}
