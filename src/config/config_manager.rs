// ==========================================
// 库存调拨与再平衡引擎 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::policy_config_trait::PolicyConfigReader;
use crate::db::open_sqlite_connection;
use async_trait::async_trait;
use rusqlite::{params, Connection};
use serde_json::json;
use std::collections::HashMap;
use std::error::Error;
use std::sync::{Arc, Mutex};

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> Result<Self, Box<dyn Error>> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, Box<dyn Error>> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    ///
    /// # 参数
    /// - key: 配置键
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    fn get_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 读取 global scope 的配置值（公开方法，供其他模块复用）
    pub fn get_global_config_value(&self, key: &str) -> Result<Option<String>, Box<dyn Error>> {
        self.get_config_value(key)
    }

    /// 从 config_kv 表读取配置值，带默认值
    ///
    /// # 参数
    /// - key: 配置键
    /// - default: 默认值
    fn get_config_or_default(&self, key: &str, default: &str) -> Result<String, Box<dyn Error>> {
        Ok(self
            .get_config_value(key)?
            .unwrap_or_else(|| default.to_string()))
    }

    /// 写入 global scope 配置值（UPSERT）
    ///
    /// # 参数
    /// - key: 配置键
    /// - value: 配置值（文本存储，读取方负责解析）
    pub fn set_config_value(&self, key: &str, value: &str) -> Result<(), Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2",
            params![key, value],
        )?;

        tracing::info!(config_key = %key, config_value = %value, "配置已更新");
        Ok(())
    }

    /// 获取所有配置的快照（JSON格式）
    ///
    /// # 返回
    /// - Ok(String): 配置快照的JSON字符串
    /// - Err: 获取失败
    ///
    /// # 用途
    /// - 执行再平衡时随运行记录存档，保证事后可还原决策口径
    pub fn get_config_snapshot(&self) -> Result<String, Box<dyn Error>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let mut stmt = conn
            .prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key")?;

        let mut config_map: HashMap<String, String> = HashMap::new();
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }

        let json_value = json!(config_map);
        Ok(serde_json::to_string(&json_value)?)
    }
}

// ==========================================
// PolicyConfigReader Trait 实现
// ==========================================
#[async_trait]
impl PolicyConfigReader for ConfigManager {
    // ===== 低库存告警阈值 =====

    async fn get_low_stock_warning_ratio(&self) -> Result<f64, Box<dyn Error>> {
        let value = self.get_config_or_default(config_keys::LOW_STOCK_WARNING_RATIO, "0.8")?;
        Ok(value.parse::<f64>().unwrap_or(0.8))
    }

    async fn get_low_stock_critical_ratio(&self) -> Result<f64, Box<dyn Error>> {
        let value = self.get_config_or_default(config_keys::LOW_STOCK_CRITICAL_RATIO, "0.5")?;
        Ok(value.parse::<f64>().unwrap_or(0.5))
    }

    // ===== 临期告警窗口 =====

    async fn get_expiry_window_days(&self) -> Result<i64, Box<dyn Error>> {
        let value = self.get_config_or_default(config_keys::EXPIRY_WINDOW_DAYS, "30")?;
        Ok(value.parse::<i64>().unwrap_or(30))
    }

    async fn get_expiry_critical_days(&self) -> Result<i64, Box<dyn Error>> {
        let value = self.get_config_or_default(config_keys::EXPIRY_CRITICAL_DAYS, "7")?;
        Ok(value.parse::<i64>().unwrap_or(7))
    }

    // ===== 调拨约束默认值 =====

    async fn get_default_min_transfer_quantity(&self) -> Result<i64, Box<dyn Error>> {
        let value = self.get_config_or_default(config_keys::MIN_TRANSFER_QUANTITY, "10")?;
        Ok(value.parse::<i64>().unwrap_or(10))
    }

    async fn get_default_max_transfers_per_sku(&self) -> Result<usize, Box<dyn Error>> {
        let value = self.get_config_or_default(config_keys::MAX_TRANSFERS_PER_SKU, "6")?;
        Ok(value.parse::<usize>().unwrap_or(6))
    }

    // ===== 圈定与执行 =====

    async fn get_high_priority_ratio(&self) -> Result<f64, Box<dyn Error>> {
        let value = self.get_config_or_default(config_keys::HIGH_PRIORITY_RATIO, "0.8")?;
        Ok(value.parse::<f64>().unwrap_or(0.8))
    }

    async fn get_max_execute_retries(&self) -> Result<u32, Box<dyn Error>> {
        let value = self.get_config_or_default(config_keys::MAX_EXECUTE_RETRIES, "3")?;
        Ok(value.parse::<u32>().unwrap_or(3))
    }

    async fn get_execute_worker_count(&self) -> Result<usize, Box<dyn Error>> {
        let value = self.get_config_or_default(config_keys::EXECUTE_WORKER_COUNT, "4")?;
        let count = value.parse::<usize>().unwrap_or(4);
        // 并发批大小至少为 1
        Ok(count.max(1))
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 低库存告警
    pub const LOW_STOCK_WARNING_RATIO: &str = "low_stock_warning_ratio";
    pub const LOW_STOCK_CRITICAL_RATIO: &str = "low_stock_critical_ratio";

    // 临期告警
    pub const EXPIRY_WINDOW_DAYS: &str = "expiry_window_days";
    pub const EXPIRY_CRITICAL_DAYS: &str = "expiry_critical_days";

    // 调拨约束
    pub const MIN_TRANSFER_QUANTITY: &str = "min_transfer_quantity";
    pub const MAX_TRANSFERS_PER_SKU: &str = "max_transfers_per_sku";

    // 圈定与执行
    pub const HIGH_PRIORITY_RATIO: &str = "high_priority_ratio";
    pub const MAX_EXECUTE_RETRIES: &str = "max_execute_retries";
    pub const EXECUTE_WORKER_COUNT: &str = "execute_worker_count";
}
