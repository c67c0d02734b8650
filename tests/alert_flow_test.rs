// ==========================================
// 告警生成与生命周期集成测试
// ==========================================
// 测试目标: 低库存/临期告警生成、去重、自动消除、确认与关闭
// ==========================================

mod test_helpers;

use chrono::NaiveDate;
use inventory_rebalance::api::AlertApi;
use inventory_rebalance::config::ConfigManager;
use inventory_rebalance::db;
use inventory_rebalance::domain::alert::AlertFilter;
use inventory_rebalance::domain::types::{AlertSeverity, AlertStatus, AlertType};
use inventory_rebalance::engine::{BatchLot, BatchMetadataSource, StaticBatchSource};
use inventory_rebalance::logging;
use inventory_rebalance::repository::{
    ActionLogRepository, AlertRepository, AllocationRepository,
};
use rusqlite::Connection;
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;

/// 评估基准日固定, 保证临期天数断言稳定
fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()
}

fn setup_alert_api(
    batch_source: Arc<dyn BatchMetadataSource>,
) -> (NamedTempFile, Arc<Mutex<Connection>>, AlertApi) {
    logging::init_test();

    let (temp_file, db_path) = test_helpers::create_test_db().expect("Failed to create test db");
    let conn = db::open_sqlite_connection(&db_path).expect("Failed to open db");

    test_helpers::insert_test_config(&conn).expect("Failed to insert config");
    test_helpers::seed_locations(&conn).expect("Failed to seed locations");
    test_helpers::seed_sku(&conn, "SKU-A", "A-001", Some("饮料")).expect("Failed to seed sku");

    let conn = Arc::new(Mutex::new(conn));
    let config = Arc::new(ConfigManager::new(&db_path).expect("Failed to create config"));

    let api = AlertApi::new(
        Arc::new(AlertRepository::new(Arc::clone(&conn))),
        Arc::new(AllocationRepository::new(Arc::clone(&conn))),
        Arc::new(ActionLogRepository::new(Arc::clone(&conn))),
        config,
        batch_source,
    );

    (temp_file, conn, api)
}

fn count_action_logs(conn: &Arc<Mutex<Connection>>, action_type: &str) -> i64 {
    let guard = conn.lock().unwrap();
    guard
        .query_row(
            "SELECT COUNT(*) FROM action_log WHERE action_type = ?1",
            [action_type],
            |row| row.get(0),
        )
        .unwrap()
}

// ==========================================
// 低库存生成
// ==========================================

#[test]
fn test_generate_creates_low_stock_alerts_by_band() {
    let (_temp_file, conn, api) = setup_alert_api(Arc::new(StaticBatchSource::new()));

    {
        let guard = conn.lock().unwrap();
        // 0.4 -> CRITICAL, 0.7 -> WARNING, 0.9 -> 不触发
        test_helpers::seed_allocation(&guard, "AL-1", "SKU-A", "L003", 40, 100).unwrap();
        test_helpers::seed_allocation(&guard, "AL-2", "SKU-A", "L004", 70, 100).unwrap();
        test_helpers::seed_allocation(&guard, "AL-3", "SKU-A", "L001", 90, 100).unwrap();
    }

    let report = api.generate_alerts(today(), "scheduler").expect("generate alerts");

    assert_eq!(report.evaluated_allocations, 3);
    assert_eq!(report.candidates, 2);
    assert_eq!(report.created, 2);
    assert_eq!(report.deduped, 0);
    assert_eq!(report.auto_resolved, 0);

    let open = api
        .list_alerts(&AlertFilter {
            only_open: true,
            ..Default::default()
        })
        .expect("list open alerts");
    assert_eq!(open.len(), 2);

    let critical = open
        .iter()
        .find(|a| a.location_id == "L003")
        .expect("L003 alert exists");
    assert_eq!(critical.alert_type, AlertType::LowStock);
    assert_eq!(critical.severity, AlertSeverity::Critical);
    assert_eq!(critical.status, AlertStatus::Active);
    assert!(critical
        .reason
        .as_deref()
        .unwrap_or("")
        .contains("\"rule\":\"low_stock\""));

    let warning = open
        .iter()
        .find(|a| a.location_id == "L004")
        .expect("L004 alert exists");
    assert_eq!(warning.severity, AlertSeverity::Warning);

    assert_eq!(count_action_logs(&conn, "GenerateAlerts"), 1);

    println!("✅ 低库存告警分级生成测试通过");
}

#[test]
fn test_generate_second_run_dedupes_open_identities() {
    let (_temp_file, conn, api) = setup_alert_api(Arc::new(StaticBatchSource::new()));

    {
        let guard = conn.lock().unwrap();
        test_helpers::seed_allocation(&guard, "AL-1", "SKU-A", "L003", 40, 100).unwrap();
    }

    let first = api.generate_alerts(today(), "scheduler").expect("first run");
    assert_eq!(first.created, 1);

    // 条件未变化, 第二轮不得重复建告警
    let second = api.generate_alerts(today(), "scheduler").expect("second run");
    assert_eq!(second.created, 0);
    assert_eq!(second.deduped, 1);
    assert_eq!(second.auto_resolved, 0);

    let all = api.list_alerts(&AlertFilter::default()).expect("list");
    assert_eq!(all.len(), 1);

    println!("✅ 告警重复生成去重测试通过");
}

// ==========================================
// 自动消除与再触发
// ==========================================

#[test]
fn test_generate_auto_resolves_recovered_stock() {
    let (_temp_file, conn, api) = setup_alert_api(Arc::new(StaticBatchSource::new()));

    {
        let guard = conn.lock().unwrap();
        test_helpers::seed_allocation(&guard, "AL-1", "SKU-A", "L003", 40, 100).unwrap();
    }
    api.generate_alerts(today(), "scheduler").expect("first run");

    // 库存恢复到健康水位
    {
        let guard = conn.lock().unwrap();
        guard
            .execute("UPDATE allocation SET on_hand = 95 WHERE allocation_id = 'AL-1'", [])
            .unwrap();
    }

    let report = api.generate_alerts(today(), "scheduler").expect("second run");
    assert_eq!(report.candidates, 0);
    assert_eq!(report.created, 0);
    assert_eq!(report.auto_resolved, 1);

    let open = api
        .list_alerts(&AlertFilter {
            only_open: true,
            ..Default::default()
        })
        .expect("list open");
    assert!(open.is_empty());

    let all = api.list_alerts(&AlertFilter::default()).expect("list all");
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].status, AlertStatus::Resolved);
    assert!(all[0].resolved_at.is_some());

    println!("✅ 条件消失自动消除测试通过");
}

#[test]
fn test_dismissed_identity_can_retrigger() {
    let (_temp_file, conn, api) = setup_alert_api(Arc::new(StaticBatchSource::new()));

    {
        let guard = conn.lock().unwrap();
        test_helpers::seed_allocation(&guard, "AL-1", "SKU-A", "L003", 40, 100).unwrap();
    }
    api.generate_alerts(today(), "scheduler").expect("first run");

    let open = api
        .list_alerts(&AlertFilter {
            only_open: true,
            ..Default::default()
        })
        .expect("list open");
    let first_id = open[0].alert_id.clone();

    // 人工关闭后条件仍在, 下一轮必须重新告警
    let dismissed = api.dismiss_alert(&first_id, "ops").expect("dismiss");
    assert_eq!(dismissed.status, AlertStatus::Dismissed);
    assert_eq!(dismissed.dismissed_by.as_deref(), Some("ops"));

    let report = api.generate_alerts(today(), "scheduler").expect("second run");
    assert_eq!(report.created, 1);
    assert_eq!(report.deduped, 0);

    let open = api
        .list_alerts(&AlertFilter {
            only_open: true,
            ..Default::default()
        })
        .expect("list open again");
    assert_eq!(open.len(), 1);
    assert_ne!(open[0].alert_id, first_id);

    println!("✅ 已关闭身份可再触发测试通过");
}

// ==========================================
// 临期生成
// ==========================================

#[test]
fn test_expiry_alerts_severity_bands() {
    // 效期 5 天 -> CRITICAL, 20 天 -> WARNING, 60 天 -> 不触发
    let source = StaticBatchSource::new()
        .with_lot(BatchLot {
            batch_id: "B-CRIT".to_string(),
            sku_id: "SKU-A".to_string(),
            location_id: "L003".to_string(),
            quantity: 30,
            expiry_date: NaiveDate::from_ymd_opt(2025, 3, 6).unwrap(),
        })
        .with_lot(BatchLot {
            batch_id: "B-WARN".to_string(),
            sku_id: "SKU-A".to_string(),
            location_id: "L004".to_string(),
            quantity: 50,
            expiry_date: NaiveDate::from_ymd_opt(2025, 3, 21).unwrap(),
        })
        .with_lot(BatchLot {
            batch_id: "B-FAR".to_string(),
            sku_id: "SKU-A".to_string(),
            location_id: "L001".to_string(),
            quantity: 80,
            expiry_date: NaiveDate::from_ymd_opt(2025, 4, 30).unwrap(),
        });
    let (_temp_file, conn, api) = setup_alert_api(Arc::new(source));

    // 批次按分配行出现过的 SKU 拉取, 现货保持健康水位避免混入低库存告警
    {
        let guard = conn.lock().unwrap();
        test_helpers::seed_allocation(&guard, "AL-1", "SKU-A", "L001", 100, 100).unwrap();
    }

    let report = api.generate_alerts(today(), "scheduler").expect("generate");
    assert_eq!(report.created, 2);

    let open = api
        .list_alerts(&AlertFilter {
            alert_type: Some(AlertType::Expiry),
            only_open: true,
            ..Default::default()
        })
        .expect("list expiry alerts");
    assert_eq!(open.len(), 2);

    let critical = open
        .iter()
        .find(|a| a.location_id == "L003")
        .expect("critical expiry alert");
    assert_eq!(critical.severity, AlertSeverity::Critical);
    assert!(critical.reason.as_deref().unwrap_or("").contains("B-CRIT"));

    let warning = open
        .iter()
        .find(|a| a.location_id == "L004")
        .expect("warning expiry alert");
    assert_eq!(warning.severity, AlertSeverity::Warning);

    println!("✅ 临期告警分级生成测试通过");
}

// ==========================================
// 人工确认与关闭
// ==========================================

#[test]
fn test_acknowledge_keeps_identity_open() {
    let (_temp_file, conn, api) = setup_alert_api(Arc::new(StaticBatchSource::new()));

    {
        let guard = conn.lock().unwrap();
        test_helpers::seed_allocation(&guard, "AL-1", "SKU-A", "L003", 40, 100).unwrap();
    }
    api.generate_alerts(today(), "scheduler").expect("first run");

    let open = api
        .list_alerts(&AlertFilter {
            only_open: true,
            ..Default::default()
        })
        .expect("list open");
    let alert_id = open[0].alert_id.clone();

    let acked = api.acknowledge_alert(&alert_id, "ops").expect("acknowledge");
    assert_eq!(acked.status, AlertStatus::Acknowledged);
    assert_eq!(acked.acknowledged_by.as_deref(), Some("ops"));
    assert!(acked.acknowledged_at.is_some());

    // 已确认仍占据身份, 下一轮继续去重
    let report = api.generate_alerts(today(), "scheduler").expect("second run");
    assert_eq!(report.created, 0);
    assert_eq!(report.deduped, 1);

    assert_eq!(count_action_logs(&conn, "AcknowledgeAlert"), 1);
    assert_eq!(count_action_logs(&conn, "GenerateAlerts"), 2);

    println!("✅ 告警确认保持身份占用测试通过");
}
