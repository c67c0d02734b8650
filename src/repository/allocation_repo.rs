// ==========================================
// 库存调拨与再平衡引擎 - 库存分配仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 红线: 分配行更新必须带 revision 检查，冲突显式分类，绝不静默覆盖
// 红线: 同一 SKU 的再平衡提交在单事务内完成 (全有或全无)
// ==========================================

use crate::domain::allocation::{Allocation, AllocationPatch};
use crate::domain::transfer::TransferOrder;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::transfer_repo;
use chrono::NaiveDateTime;
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

// ==========================================
// TargetCommit - 单行目标提交
// ==========================================
// 再平衡执行对一个分配行的目标/计划份额写入，带期望修订号
#[derive(Debug, Clone)]
pub struct TargetCommit {
    pub allocation_id: String, // 分配行ID
    pub new_target: i64,       // 新目标份额
    pub new_allocated: i64,    // 新计划份额
    pub expected_revision: i32,// 读取快照时的修订号
}

// ==========================================
// AllocationRepository - 库存分配仓储
// ==========================================
pub struct AllocationRepository {
    conn: Arc<Mutex<Connection>>,
}

impl AllocationRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 创建分配行 (SKU 首次铺货到某库位)
    ///
    /// # 错误
    /// - `UniqueConstraintViolation`: (sku_id, location_id) 已存在
    /// - `ForeignKeyViolation`: SKU 或库位不存在
    pub fn create(&self, allocation: &Allocation) -> RepositoryResult<String> {
        validate_non_negative("allocated", allocation.allocated)?;
        validate_non_negative("target", allocation.target)?;
        validate_non_negative("on_hand", allocation.on_hand)?;
        validate_non_negative("in_transit", allocation.in_transit)?;
        validate_non_negative("safety_stock", allocation.safety_stock)?;

        let conn = self.get_conn()?;

        conn.execute(
            r#"INSERT INTO allocation (
                allocation_id, sku_id, location_id,
                allocated, target, on_hand, in_transit, safety_stock,
                revision, updated_at, updated_by
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            params![
                &allocation.allocation_id,
                &allocation.sku_id,
                &allocation.location_id,
                &allocation.allocated,
                &allocation.target,
                &allocation.on_hand,
                &allocation.in_transit,
                &allocation.safety_stock,
                &allocation.revision,
                &allocation.updated_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                &allocation.updated_by,
            ],
        )?;

        Ok(allocation.allocation_id.clone())
    }

    /// 按 allocation_id 查询
    pub fn find_by_id(&self, allocation_id: &str) -> RepositoryResult<Option<Allocation>> {
        let conn = self.get_conn()?;

        match conn.query_row(
            &format!("{} WHERE allocation_id = ?", SELECT_BASE),
            params![allocation_id],
            |row| self.map_row(row),
        ) {
            Ok(allocation) => Ok(Some(allocation)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 查询单 SKU 的全部分配行 (入库顺序，单条 SELECT 保证快照一致)
    pub fn find_by_sku(&self, sku_id: &str) -> RepositoryResult<Vec<Allocation>> {
        let conn = self.get_conn()?;

        let mut stmt =
            conn.prepare(&format!("{} WHERE sku_id = ? ORDER BY rowid", SELECT_BASE))?;

        let allocations = stmt
            .query_map(params![sku_id], |row| self.map_row(row))?
            .collect::<Result<Vec<Allocation>, _>>()?;

        Ok(allocations)
    }

    /// 查询单 SKU 在指定库位集合内的分配行 (入库顺序)
    ///
    /// 用于地理过滤的再平衡: 只在过滤后的库位间守恒
    pub fn find_by_sku_in_locations(
        &self,
        sku_id: &str,
        location_ids: &[String],
    ) -> RepositoryResult<Vec<Allocation>> {
        if location_ids.is_empty() {
            return Ok(vec![]);
        }

        let conn = self.get_conn()?;

        let placeholders = vec!["?"; location_ids.len()].join(", ");
        let sql = format!(
            "{} WHERE sku_id = ? AND location_id IN ({}) ORDER BY rowid",
            SELECT_BASE, placeholders
        );

        let mut stmt = conn.prepare(&sql)?;
        let mut params_vec: Vec<&dyn rusqlite::ToSql> = vec![&sku_id];
        for id in location_ids {
            params_vec.push(id);
        }

        let allocations = stmt
            .query_map(params_vec.as_slice(), |row| self.map_row(row))?
            .collect::<Result<Vec<Allocation>, _>>()?;

        Ok(allocations)
    }

    /// 按 (sku, location) 查询
    pub fn find_by_sku_and_location(
        &self,
        sku_id: &str,
        location_id: &str,
    ) -> RepositoryResult<Option<Allocation>> {
        let conn = self.get_conn()?;

        match conn.query_row(
            &format!("{} WHERE sku_id = ? AND location_id = ?", SELECT_BASE),
            params![sku_id, location_id],
            |row| self.map_row(row),
        ) {
            Ok(allocation) => Ok(Some(allocation)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 查询全部分配行 (入库顺序)
    pub fn list_all(&self) -> RepositoryResult<Vec<Allocation>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(&format!("{} ORDER BY rowid", SELECT_BASE))?;

        let allocations = stmt
            .query_map([], |row| self.map_row(row))?
            .collect::<Result<Vec<Allocation>, _>>()?;

        Ok(allocations)
    }

    /// 更新分配行 (带乐观锁检查)
    ///
    /// # 并发控制
    /// 使用乐观锁 (revision字段) 防止并发更新冲突
    ///
    /// # 错误
    /// - `RepositoryError::OptimisticLockFailure`: revision不匹配 (其他写入者已更新)
    /// - `RepositoryError::NotFound`: allocation_id不存在
    /// - `RepositoryError::ValidationError`: 空补丁
    /// - `RepositoryError::FieldValueError`: 负值字段
    pub fn update(
        &self,
        allocation_id: &str,
        patch: &AllocationPatch,
        expected_revision: i32,
        updated_by: &str,
    ) -> RepositoryResult<Allocation> {
        if patch.is_empty() {
            return Err(RepositoryError::ValidationError(
                "空更新: 至少提供一个字段".to_string(),
            ));
        }
        if let Some(v) = patch.allocated {
            validate_non_negative("allocated", v)?;
        }
        if let Some(v) = patch.target {
            validate_non_negative("target", v)?;
        }
        if let Some(v) = patch.on_hand {
            validate_non_negative("on_hand", v)?;
        }
        if let Some(v) = patch.in_transit {
            validate_non_negative("in_transit", v)?;
        }
        if let Some(v) = patch.safety_stock {
            validate_non_negative("safety_stock", v)?;
        }

        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        let current = match tx.query_row(
            &format!("{} WHERE allocation_id = ?", SELECT_BASE),
            params![allocation_id],
            |row| map_allocation_row(row),
        ) {
            Ok(a) => a,
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                return Err(RepositoryError::NotFound {
                    entity: "Allocation".to_string(),
                    id: allocation_id.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        // 调用方持有的 revision 已过期 -> 冲突，由调用方重读后决定是否重试
        if current.revision != expected_revision {
            return Err(RepositoryError::OptimisticLockFailure {
                allocation_id: allocation_id.to_string(),
                expected: expected_revision,
                actual: current.revision,
            });
        }

        let next = patch.apply_to(&current);
        let now = chrono::Utc::now().naive_utc();
        let now_str = now.format("%Y-%m-%d %H:%M:%S").to_string();

        let rows_affected = tx.execute(
            r#"UPDATE allocation
               SET allocated = ?, target = ?, on_hand = ?, in_transit = ?,
                   safety_stock = ?, revision = revision + 1,
                   updated_at = ?, updated_by = ?
               WHERE allocation_id = ? AND revision = ?"#,
            params![
                next.allocated,
                next.target,
                next.on_hand,
                next.in_transit,
                next.safety_stock,
                &now_str,
                updated_by,
                allocation_id,
                expected_revision,
            ],
        )?;

        // 单连接互斥下理论不可达，仍按冲突口径处理
        if rows_affected == 0 {
            return Err(RepositoryError::VersionConflict {
                message: format!("allocation_id={} 更新竞争失败", allocation_id),
            });
        }

        tx.commit()?;

        Ok(Allocation {
            revision: expected_revision + 1,
            updated_at: now,
            updated_by: Some(updated_by.to_string()),
            ..next
        })
    }

    /// 单 SKU 再平衡提交 (全有或全无)
    ///
    /// 同一事务内:
    /// 1. 逐行写入新目标/计划份额，每行带 revision 检查
    /// 2. 插入本次派生的调拨单
    /// 任一行 revision 不匹配则整体回滚，错误按乐观锁冲突/未找到分类。
    pub fn commit_rebalance(
        &self,
        sku_id: &str,
        commits: &[TargetCommit],
        transfers: &[TransferOrder],
        updated_by: &str,
    ) -> RepositoryResult<()> {
        if commits.is_empty() {
            return Err(RepositoryError::ValidationError(format!(
                "sku_id={} 的再平衡提交为空",
                sku_id
            )));
        }

        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;
        let now_str = chrono::Utc::now()
            .naive_utc()
            .format("%Y-%m-%d %H:%M:%S")
            .to_string();

        for commit in commits {
            validate_non_negative("target", commit.new_target)?;

            let rows_affected = tx.execute(
                r#"UPDATE allocation
                   SET target = ?, allocated = ?, revision = revision + 1,
                       updated_at = ?, updated_by = ?
                   WHERE allocation_id = ? AND revision = ?"#,
                params![
                    commit.new_target,
                    commit.new_allocated,
                    &now_str,
                    updated_by,
                    &commit.allocation_id,
                    commit.expected_revision,
                ],
            )?;

            if rows_affected == 0 {
                let actual: Result<i32, _> = tx.query_row(
                    "SELECT revision FROM allocation WHERE allocation_id = ?",
                    params![&commit.allocation_id],
                    |row| row.get(0),
                );

                // 返回错误使事务随 drop 回滚
                return match actual {
                    Ok(actual_revision) => Err(RepositoryError::OptimisticLockFailure {
                        allocation_id: commit.allocation_id.clone(),
                        expected: commit.expected_revision,
                        actual: actual_revision,
                    }),
                    Err(_) => Err(RepositoryError::NotFound {
                        entity: "Allocation".to_string(),
                        id: commit.allocation_id.clone(),
                    }),
                };
            }
        }

        for order in transfers {
            transfer_repo::insert_order(&tx, order)?;
        }

        tx.commit()?;

        tracing::debug!(
            sku_id = %sku_id,
            commits = commits.len(),
            transfers = transfers.len(),
            "再平衡提交完成"
        );

        Ok(())
    }

    /// 高优先级 SKU 圈定: 任一库位 allocated/max(target,1) < ratio
    pub fn list_high_priority_sku_ids(&self, ratio: f64) -> RepositoryResult<Vec<String>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            r#"SELECT DISTINCT sku_id
               FROM allocation
               WHERE CAST(allocated AS REAL) / CAST(MAX(target, 1) AS REAL) < ?
               ORDER BY sku_id"#,
        )?;

        let ids = stmt
            .query_map(params![ratio], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<String>, _>>()?;

        Ok(ids)
    }

    /// 映射数据库行到 Allocation 对象
    fn map_row(&self, row: &rusqlite::Row) -> rusqlite::Result<Allocation> {
        map_allocation_row(row)
    }
}

/// SELECT 公共列 (与 map_allocation_row 的列序一致)
const SELECT_BASE: &str = r#"SELECT allocation_id, sku_id, location_id,
       allocated, target, on_hand, in_transit, safety_stock,
       revision, updated_at, updated_by
  FROM allocation"#;

/// 行映射 (仓储内部与事务上下文共用)
pub(crate) fn map_allocation_row(row: &rusqlite::Row) -> rusqlite::Result<Allocation> {
    Ok(Allocation {
        allocation_id: row.get(0)?,
        sku_id: row.get(1)?,
        location_id: row.get(2)?,
        allocated: row.get(3)?,
        target: row.get(4)?,
        on_hand: row.get(5)?,
        in_transit: row.get(6)?,
        safety_stock: row.get(7)?,
        revision: row.get(8)?,
        updated_at: NaiveDateTime::parse_from_str(&row.get::<_, String>(9)?, "%Y-%m-%d %H:%M:%S")
            .map_err(|e| {
                rusqlite::Error::FromSqlConversionFailure(9, rusqlite::types::Type::Text, Box::new(e))
            })?,
        updated_by: row.get(10)?,
    })
}

/// 非负字段校验
fn validate_non_negative(field: &str, value: i64) -> RepositoryResult<()> {
    if value < 0 {
        return Err(RepositoryError::FieldValueError {
            field: field.to_string(),
            message: format!("不允许负值: {}", value),
        });
    }
    Ok(())
}
