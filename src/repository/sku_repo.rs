// ==========================================
// 库存调拨与再平衡引擎 - SKU 仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================

use crate::domain::sku::Sku;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDateTime;
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

// ==========================================
// SkuRepository - SKU 仓储
// ==========================================
pub struct SkuRepository {
    conn: Arc<Mutex<Connection>>,
}

impl SkuRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 插入 SKU
    pub fn insert(&self, sku: &Sku) -> RepositoryResult<String> {
        let conn = self.get_conn()?;

        conn.execute(
            r#"INSERT INTO sku_master (
                sku_id, sku_code, sku_name, pack_size, category,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)"#,
            params![
                &sku.sku_id,
                &sku.sku_code,
                &sku.sku_name,
                &sku.pack_size,
                &sku.category,
                &sku.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
                &sku.updated_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            ],
        )?;

        Ok(sku.sku_id.clone())
    }

    /// 按 sku_id 查询
    pub fn find_by_id(&self, sku_id: &str) -> RepositoryResult<Option<Sku>> {
        let conn = self.get_conn()?;

        match conn.query_row(
            r#"SELECT sku_id, sku_code, sku_name, pack_size, category,
                      created_at, updated_at
               FROM sku_master
               WHERE sku_id = ?"#,
            params![sku_id],
            |row| self.map_row(row),
        ) {
            Ok(sku) => Ok(Some(sku)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 判断 SKU 是否存在
    pub fn exists(&self, sku_id: &str) -> RepositoryResult<bool> {
        Ok(self.find_by_id(sku_id)?.is_some())
    }

    /// 查询所有 SKU (入库顺序)
    pub fn list_all(&self) -> RepositoryResult<Vec<Sku>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            r#"SELECT sku_id, sku_code, sku_name, pack_size, category,
                      created_at, updated_at
               FROM sku_master
               ORDER BY rowid"#,
        )?;

        let skus = stmt
            .query_map([], |row| self.map_row(row))?
            .collect::<Result<Vec<Sku>, _>>()?;

        Ok(skus)
    }

    /// 按品类查询 SKU ID 清单 (入库顺序)
    pub fn list_ids_by_category(&self, category: &str) -> RepositoryResult<Vec<String>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            r#"SELECT sku_id FROM sku_master WHERE category = ? ORDER BY rowid"#,
        )?;

        let ids = stmt
            .query_map(params![category], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<String>, _>>()?;

        Ok(ids)
    }

    /// 映射数据库行到 Sku 对象
    fn map_row(&self, row: &rusqlite::Row) -> rusqlite::Result<Sku> {
        Ok(Sku {
            sku_id: row.get(0)?,
            sku_code: row.get(1)?,
            sku_name: row.get(2)?,
            pack_size: row.get(3)?,
            category: row.get(4)?,
            created_at: NaiveDateTime::parse_from_str(&row.get::<_, String>(5)?, "%Y-%m-%d %H:%M:%S")
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e)))?,
            updated_at: NaiveDateTime::parse_from_str(&row.get::<_, String>(6)?, "%Y-%m-%d %H:%M:%S")
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(6, rusqlite::types::Type::Text, Box::new(e)))?,
        })
    }
}
