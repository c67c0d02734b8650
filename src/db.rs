// ==========================================
// 库存调拨与再平衡引擎 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为，避免“部分模块外键开启/部分不开启”
// - 统一 busy_timeout，减少并发写入时的偶发 busy 错误
// - 提供幂等建表入口，库与测试共用同一份 DDL
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
///
/// 说明：
/// - 版本号用于**提示/告警**（不做自动迁移），避免静默在旧库上运行导致隐性错误。
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

/// 初始化数据库 schema（幂等，CREATE TABLE IF NOT EXISTS）
///
/// 约定:
/// - 时间戳统一存 TEXT（%Y-%m-%d %H:%M:%S），日期存 TEXT（%Y-%m-%d）
/// - allocation 行的并发控制依赖 revision 列（乐观锁）
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS config_scope (
            scope_id TEXT PRIMARY KEY,
            scope_type TEXT NOT NULL,
            scope_key TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            UNIQUE(scope_type, scope_key)
        );

        INSERT OR IGNORE INTO config_scope (scope_id, scope_type, scope_key)
        VALUES ('global', 'GLOBAL', 'global');

        CREATE TABLE IF NOT EXISTS config_kv (
            scope_id TEXT NOT NULL REFERENCES config_scope(scope_id) ON DELETE CASCADE,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (scope_id, key)
        );

        CREATE TABLE IF NOT EXISTS location_master (
            location_id TEXT PRIMARY KEY,
            location_name TEXT NOT NULL,
            role TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS sku_master (
            sku_id TEXT PRIMARY KEY,
            sku_code TEXT NOT NULL UNIQUE,
            sku_name TEXT NOT NULL,
            pack_size INTEGER NOT NULL DEFAULT 1,
            category TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        -- 库存分配行: (sku, location) 唯一，revision 乐观锁
        CREATE TABLE IF NOT EXISTS allocation (
            allocation_id TEXT PRIMARY KEY,
            sku_id TEXT NOT NULL REFERENCES sku_master(sku_id),
            location_id TEXT NOT NULL REFERENCES location_master(location_id),
            allocated INTEGER NOT NULL DEFAULT 0 CHECK (allocated >= 0),
            target INTEGER NOT NULL DEFAULT 0 CHECK (target >= 0),
            on_hand INTEGER NOT NULL DEFAULT 0 CHECK (on_hand >= 0),
            in_transit INTEGER NOT NULL DEFAULT 0 CHECK (in_transit >= 0),
            safety_stock INTEGER NOT NULL DEFAULT 0 CHECK (safety_stock >= 0),
            revision INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT NOT NULL,
            updated_by TEXT,
            UNIQUE(sku_id, location_id)
        );

        CREATE INDEX IF NOT EXISTS idx_allocation_sku ON allocation(sku_id);
        CREATE INDEX IF NOT EXISTS idx_allocation_location ON allocation(location_id);

        -- 告警: 同一 (sku, location, alert_type) 最多一条未关闭告警（仓储层保证）
        CREATE TABLE IF NOT EXISTS alert (
            alert_id TEXT PRIMARY KEY,
            sku_id TEXT NOT NULL,
            location_id TEXT NOT NULL,
            alert_type TEXT NOT NULL,
            severity TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'ACTIVE',
            reason TEXT,
            triggered_at TEXT NOT NULL,
            acknowledged_at TEXT,
            acknowledged_by TEXT,
            resolved_at TEXT,
            dismissed_at TEXT,
            dismissed_by TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_alert_identity ON alert(sku_id, location_id, alert_type);
        CREATE INDEX IF NOT EXISTS idx_alert_status ON alert(status);

        CREATE TABLE IF NOT EXISTS transfer_order (
            transfer_id TEXT PRIMARY KEY,
            sku_id TEXT NOT NULL REFERENCES sku_master(sku_id),
            from_location_id TEXT NOT NULL REFERENCES location_master(location_id),
            to_location_id TEXT NOT NULL REFERENCES location_master(location_id),
            quantity INTEGER NOT NULL CHECK (quantity > 0),
            status TEXT NOT NULL DEFAULT 'REQUESTED',
            run_id TEXT,
            requested_at TEXT NOT NULL,
            required_by TEXT,
            created_by TEXT NOT NULL,
            dispatched_at TEXT,
            received_at TEXT,
            received_by TEXT,
            cancelled_at TEXT,
            cancel_reason TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_transfer_sku ON transfer_order(sku_id);
        CREATE INDEX IF NOT EXISTS idx_transfer_status ON transfer_order(status);

        -- 再平衡运行记录: 执行完成后落一行摘要
        CREATE TABLE IF NOT EXISTS rebalance_run (
            run_id TEXT PRIMARY KEY,
            state TEXT NOT NULL,
            objective TEXT NOT NULL,
            strategy TEXT NOT NULL,
            scope_json TEXT,
            constraints_json TEXT,
            config_snapshot_json TEXT,
            summary_json TEXT,
            requested_by TEXT NOT NULL,
            created_at TEXT NOT NULL,
            finished_at TEXT
        );

        CREATE TABLE IF NOT EXISTS action_log (
            action_id TEXT PRIMARY KEY,
            action_type TEXT NOT NULL,
            action_ts TEXT NOT NULL,
            actor TEXT NOT NULL,
            sku_id TEXT,
            payload_json TEXT,
            detail TEXT
        );

        INSERT OR IGNORE INTO schema_version (version) VALUES (1);
        "#,
    )?;
    Ok(())
}
