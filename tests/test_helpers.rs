// ==========================================
// 测试辅助函数
// ==========================================
// 职责: 提供测试所需的数据库初始化、测试数据生成等功能
// ==========================================

use chrono::Utc;
use inventory_rebalance::db;
use inventory_rebalance::domain::Allocation;
use rusqlite::{params, Connection};
use std::error::Error;
use tempfile::NamedTempFile;

/// 创建临时测试数据库并初始化 schema
///
/// # 返回
/// - NamedTempFile: 临时数据库文件（需要保持存活）
/// - String: 数据库文件路径
pub fn create_test_db() -> Result<(NamedTempFile, String), Box<dyn Error>> {
    let temp_file = NamedTempFile::new()?;
    let db_path = temp_file.path().to_str().unwrap().to_string();

    let conn = db::open_sqlite_connection(&db_path)?;
    db::init_schema(&conn)?;

    Ok((temp_file, db_path))
}

/// 插入测试配置数据（告警阈值 + 再平衡默认约束 + 执行参数）
pub fn insert_test_config(conn: &Connection) -> Result<(), Box<dyn Error>> {
    // 告警阈值配置
    conn.execute(
        r#"
        INSERT OR REPLACE INTO config_kv (scope_id, key, value, updated_at) VALUES
        ('global', 'low_stock_warning_ratio', '0.8', datetime('now')),
        ('global', 'low_stock_critical_ratio', '0.5', datetime('now')),
        ('global', 'expiry_window_days', '30', datetime('now')),
        ('global', 'expiry_critical_days', '7', datetime('now'))
        "#,
        [],
    )?;

    // 再平衡约束与执行配置
    conn.execute(
        r#"
        INSERT OR REPLACE INTO config_kv (scope_id, key, value, updated_at) VALUES
        ('global', 'min_transfer_quantity', '10', datetime('now')),
        ('global', 'max_transfers_per_sku', '6', datetime('now')),
        ('global', 'high_priority_ratio', '0.8', datetime('now')),
        ('global', 'max_execute_retries', '3', datetime('now')),
        ('global', 'execute_worker_count', '4', datetime('now'))
        "#,
        [],
    )?;

    Ok(())
}

/// 预置库位网络: 中心仓 / 区域枢纽 / 两家门店
pub fn seed_locations(conn: &Connection) -> Result<(), Box<dyn Error>> {
    conn.execute(
        r#"
        INSERT OR REPLACE INTO location_master (location_id, location_name, role) VALUES
        ('L001', '中心仓', 'CENTRAL_WAREHOUSE'),
        ('L002', '华东枢纽', 'HUB'),
        ('L003', '门店-静安', 'STORE'),
        ('L004', '门店-浦东', 'STORE')
        "#,
        [],
    )?;
    Ok(())
}

/// 插入 SKU 主数据
pub fn seed_sku(
    conn: &Connection,
    sku_id: &str,
    sku_code: &str,
    category: Option<&str>,
) -> Result<(), Box<dyn Error>> {
    conn.execute(
        r#"
        INSERT OR REPLACE INTO sku_master
            (sku_id, sku_code, sku_name, pack_size, category, created_at, updated_at)
        VALUES (?1, ?2, ?3, 1, ?4, datetime('now'), datetime('now'))
        "#,
        params![sku_id, sku_code, format!("测试商品-{}", sku_code), category],
    )?;
    Ok(())
}

/// 直接插入分配行（revision 从 0 起，allocated 默认取 on_hand）
pub fn seed_allocation(
    conn: &Connection,
    allocation_id: &str,
    sku_id: &str,
    location_id: &str,
    on_hand: i64,
    target: i64,
) -> Result<(), Box<dyn Error>> {
    seed_allocation_with_allocated(conn, allocation_id, sku_id, location_id, on_hand, on_hand, target)
}

/// 插入分配行并显式指定计划份额（高优先级圈定测试用）
pub fn seed_allocation_with_allocated(
    conn: &Connection,
    allocation_id: &str,
    sku_id: &str,
    location_id: &str,
    allocated: i64,
    on_hand: i64,
    target: i64,
) -> Result<(), Box<dyn Error>> {
    conn.execute(
        r#"
        INSERT OR REPLACE INTO allocation
            (allocation_id, sku_id, location_id, allocated, target, on_hand,
             in_transit, safety_stock, revision, updated_at, updated_by)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, 0, 0, datetime('now'), 'seed')
        "#,
        params![allocation_id, sku_id, location_id, allocated, target, on_hand],
    )?;
    Ok(())
}

/// 构造内存中的分配行（API 创建入口测试用）
pub fn make_allocation(
    allocation_id: &str,
    sku_id: &str,
    location_id: &str,
    on_hand: i64,
    target: i64,
) -> Allocation {
    Allocation {
        allocation_id: allocation_id.to_string(),
        sku_id: sku_id.to_string(),
        location_id: location_id.to_string(),
        allocated: on_hand,
        target,
        on_hand,
        in_transit: 0,
        safety_stock: 0,
        revision: 0,
        updated_at: Utc::now().naive_utc(),
        updated_by: Some("test_user".to_string()),
    }
}
