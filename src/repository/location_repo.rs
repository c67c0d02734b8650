// ==========================================
// 库存调拨与再平衡引擎 - 库位仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================

use crate::domain::location::Location;
use crate::domain::types::LocationRole;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

// ==========================================
// LocationRepository - 库位仓储
// ==========================================
pub struct LocationRepository {
    conn: Arc<Mutex<Connection>>,
}

impl LocationRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 插入库位
    pub fn insert(&self, location: &Location) -> RepositoryResult<String> {
        let conn = self.get_conn()?;

        conn.execute(
            r#"INSERT INTO location_master (location_id, location_name, role)
               VALUES (?, ?, ?)"#,
            params![
                &location.location_id,
                &location.location_name,
                location.role.to_db_str(),
            ],
        )?;

        Ok(location.location_id.clone())
    }

    /// 按 location_id 查询库位
    pub fn find_by_id(&self, location_id: &str) -> RepositoryResult<Option<Location>> {
        let conn = self.get_conn()?;

        match conn.query_row(
            r#"SELECT location_id, location_name, role
               FROM location_master
               WHERE location_id = ?"#,
            params![location_id],
            |row| self.map_row(row),
        ) {
            Ok(location) => Ok(Some(location)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 判断库位是否存在
    pub fn exists(&self, location_id: &str) -> RepositoryResult<bool> {
        Ok(self.find_by_id(location_id)?.is_some())
    }

    /// 查询所有库位 (入库顺序)
    pub fn list_all(&self) -> RepositoryResult<Vec<Location>> {
        let conn = self.get_conn()?;

        let mut stmt = conn.prepare(
            r#"SELECT location_id, location_name, role
               FROM location_master
               ORDER BY rowid"#,
        )?;

        let locations = stmt
            .query_map([], |row| self.map_row(row))?
            .collect::<Result<Vec<Location>, _>>()?;

        Ok(locations)
    }

    /// 映射数据库行到 Location 对象
    fn map_row(&self, row: &rusqlite::Row) -> rusqlite::Result<Location> {
        Ok(Location {
            location_id: row.get(0)?,
            location_name: row.get(1)?,
            role: LocationRole::from_str(&row.get::<_, String>(2)?),
        })
    }
}
