// ==========================================
// 再平衡全链路集成测试
// ==========================================
// 测试目标: 圈定 -> 预演 -> 执行 staging 全流程
// 覆盖: 范围圈定三种方式、预演零落库、执行落库与审计、约束收口
// ==========================================

mod test_helpers;

use inventory_rebalance::api::{ApiError, RebalanceApi};
use inventory_rebalance::config::ConfigManager;
use inventory_rebalance::db;
use inventory_rebalance::domain::rebalance::{
    AutoRebalanceRequest, RebalanceConstraints, ScopeFilter, SkuSelection,
};
use inventory_rebalance::domain::types::{RebalanceObjective, RunState, TransferStatus};
use inventory_rebalance::engine::{RebalanceOrchestrator, SignalSource, StaticSignalSource};
use inventory_rebalance::logging;
use inventory_rebalance::repository::{
    ActionLogRepository, AllocationRepository, RunRepository, SkuRepository,
};
use rusqlite::Connection;
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;

fn setup_rebalance_api(
    signals: Arc<dyn SignalSource>,
) -> (NamedTempFile, Arc<Mutex<Connection>>, RebalanceApi) {
    logging::init_test();

    let (temp_file, db_path) = test_helpers::create_test_db().expect("Failed to create test db");
    let conn = db::open_sqlite_connection(&db_path).expect("Failed to open db");

    test_helpers::insert_test_config(&conn).expect("Failed to insert config");
    test_helpers::seed_locations(&conn).expect("Failed to seed locations");

    let conn = Arc::new(Mutex::new(conn));
    let config = Arc::new(ConfigManager::new(&db_path).expect("Failed to create config"));

    let orchestrator = Arc::new(RebalanceOrchestrator::new(
        Arc::new(AllocationRepository::new(Arc::clone(&conn))),
        Arc::new(SkuRepository::new(Arc::clone(&conn))),
        Arc::new(RunRepository::new(Arc::clone(&conn))),
        Arc::new(ActionLogRepository::new(Arc::clone(&conn))),
        config,
        signals,
    ));
    let api = RebalanceApi::new(
        orchestrator,
        Arc::new(RunRepository::new(Arc::clone(&conn))),
        Arc::new(ActionLogRepository::new(Arc::clone(&conn))),
    );

    (temp_file, conn, api)
}

fn explicit_request(sku_ids: &[&str], objective: RebalanceObjective) -> AutoRebalanceRequest {
    AutoRebalanceRequest {
        scope: ScopeFilter {
            selection: SkuSelection::Explicit {
                sku_ids: sku_ids.iter().map(|s| s.to_string()).collect(),
            },
            location_ids: None,
        },
        objective,
        constraints: None,
        requested_by: "planner_zhang".to_string(),
    }
}

fn read_allocation_row(conn: &Arc<Mutex<Connection>>, allocation_id: &str) -> (i64, i64, i64, i32) {
    let guard = conn.lock().unwrap();
    guard
        .query_row(
            "SELECT allocated, target, on_hand, revision FROM allocation WHERE allocation_id = ?1",
            [allocation_id],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i32>(3)?,
                ))
            },
        )
        .expect("allocation row should exist")
}

fn count_rows(conn: &Arc<Mutex<Connection>>, sql: &str) -> i64 {
    let guard = conn.lock().unwrap();
    guard.query_row(sql, [], |row| row.get(0)).unwrap()
}

// ==========================================
// 预演
// ==========================================

#[test]
fn test_preview_computes_plan_without_writes() {
    let (_temp_file, conn, api) = setup_rebalance_api(Arc::new(StaticSignalSource::new()));

    {
        let guard = conn.lock().unwrap();
        test_helpers::seed_sku(&guard, "SKU-A", "A-001", Some("饮料")).unwrap();
        // A 盈余 (120/100)，B 深缺口 (30/100)
        test_helpers::seed_allocation(&guard, "AL-1", "SKU-A", "L001", 120, 100).unwrap();
        test_helpers::seed_allocation(&guard, "AL-2", "SKU-A", "L002", 30, 100).unwrap();
    }

    let preview = api
        .preview_rebalance(explicit_request(&["SKU-A"], RebalanceObjective::MinimizeStockouts))
        .expect("preview");

    assert_eq!(preview.sku_count, 1);
    assert_eq!(preview.planned.len(), 1);
    assert!(preview.skipped.is_empty());

    // 缺货最小化: B 先补满目标，剩余均分 -> 25 / 125
    let sku_preview = &preview.planned[0];
    assert_eq!(sku_preview.strategy, "minimize_stockouts");
    let proposed: Vec<i64> = sku_preview.lines.iter().map(|l| l.proposed_target).collect();
    assert_eq!(proposed, vec![25, 125]);

    assert_eq!(sku_preview.legs.len(), 1);
    assert_eq!(sku_preview.legs[0].from_location_id, "L001");
    assert_eq!(sku_preview.legs[0].to_location_id, "L002");
    assert_eq!(sku_preview.legs[0].quantity, 95);
    assert_eq!(preview.total_legs, 1);
    assert_eq!(preview.total_moved_units, 95);

    // 预演零落库: 分配行原样, 无调拨单, 无运行记录
    assert_eq!(read_allocation_row(&conn, "AL-1"), (120, 100, 120, 0));
    assert_eq!(read_allocation_row(&conn, "AL-2"), (30, 100, 30, 0));
    assert_eq!(count_rows(&conn, "SELECT COUNT(*) FROM transfer_order"), 0);
    assert_eq!(count_rows(&conn, "SELECT COUNT(*) FROM rebalance_run"), 0);

    // 预演本身要留审计
    assert_eq!(
        count_rows(
            &conn,
            "SELECT COUNT(*) FROM action_log WHERE action_type = 'PreviewRebalance'"
        ),
        1
    );

    println!("✅ 预演零落库测试通过");
}

#[test]
fn test_preview_reports_drops_and_merges() {
    let (_temp_file, conn, api) = setup_rebalance_api(Arc::new(StaticSignalSource::new()));

    {
        let guard = conn.lock().unwrap();
        test_helpers::seed_sku(&guard, "SKU-A", "A-001", None).unwrap();
        // L001 集中盈余，L004 缺口 3 低于最小调拨量 10
        test_helpers::seed_allocation(&guard, "AL-1", "SKU-A", "L001", 103, 0).unwrap();
        test_helpers::seed_allocation(&guard, "AL-2", "SKU-A", "L002", 0, 50).unwrap();
        test_helpers::seed_allocation(&guard, "AL-3", "SKU-A", "L003", 0, 50).unwrap();
        test_helpers::seed_allocation(&guard, "AL-4", "SKU-A", "L004", 0, 3).unwrap();
    }

    let mut request = explicit_request(&["SKU-A"], RebalanceObjective::MinimizeStockouts);
    request.constraints = Some(RebalanceConstraints {
        max_transfers_per_sku: 6,
        min_transfer_quantity: 10,
    });

    let preview = api.preview_rebalance(request).expect("preview");

    // 缺口 50/50/3 全补满: 大腿保留, 3 的小腿丢弃上报
    let sku_preview = &preview.planned[0];
    assert_eq!(sku_preview.legs.len(), 2);
    assert_eq!(sku_preview.dropped_count, 1);
    assert_eq!(preview.total_moved_units, 100);

    // 腿数上限 1 时合并为单腿
    let mut capped = explicit_request(&["SKU-A"], RebalanceObjective::MinimizeStockouts);
    capped.constraints = Some(RebalanceConstraints {
        max_transfers_per_sku: 1,
        min_transfer_quantity: 10,
    });
    let merged = api.preview_rebalance(capped).expect("preview capped");
    assert_eq!(merged.planned[0].legs.len(), 1);
    assert_eq!(merged.planned[0].legs[0].quantity, 100);

    println!("✅ 预演丢弃与合并上报测试通过");
}

// ==========================================
// 执行
// ==========================================

#[test]
fn test_execute_commits_targets_transfers_and_audit() {
    let (_temp_file, conn, api) = setup_rebalance_api(Arc::new(StaticSignalSource::new()));

    {
        let guard = conn.lock().unwrap();
        test_helpers::seed_sku(&guard, "SKU-A", "A-001", Some("饮料")).unwrap();
        test_helpers::seed_allocation(&guard, "AL-1", "SKU-A", "L001", 120, 100).unwrap();
        test_helpers::seed_allocation(&guard, "AL-2", "SKU-A", "L002", 30, 100).unwrap();
    }

    let summary = api
        .execute_rebalance(explicit_request(&["SKU-A"], RebalanceObjective::MinimizeStockouts))
        .expect("execute");

    assert_eq!(summary.state, RunState::Completed);
    assert_eq!(summary.succeeded.len(), 1);
    assert!(summary.failed.is_empty());
    assert_eq!(summary.total_transfers, 1);
    assert_eq!(summary.total_moved_units, 95);
    assert_eq!(summary.succeeded[0].retries, 0);

    // 目标份额按计划落库, 修订号推进; 现货不动 (物流由调拨单结算)
    assert_eq!(read_allocation_row(&conn, "AL-1"), (25, 25, 120, 1));
    assert_eq!(read_allocation_row(&conn, "AL-2"), (125, 125, 30, 1));

    // 派生调拨单可按运行追溯
    let (qty, status, run_id): (i64, String, Option<String>) = {
        let guard = conn.lock().unwrap();
        guard
            .query_row(
                "SELECT quantity, status, run_id FROM transfer_order WHERE sku_id = 'SKU-A'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .unwrap()
    };
    assert_eq!(qty, 95);
    assert_eq!(status, TransferStatus::Requested.to_db_str());
    assert_eq!(run_id.as_deref(), Some(summary.run_id.as_str()));

    // 运行快照落库
    let run = api.get_run(&summary.run_id).expect("get run");
    assert_eq!(run.state, RunState::Completed);
    assert_eq!(run.objective, RebalanceObjective::MinimizeStockouts);
    assert_eq!(run.strategy, "minimize_stockouts");
    assert_eq!(run.requested_by, "planner_zhang");
    assert!(run.finished_at.is_some());
    assert!(run.scope_json.is_some());
    assert!(run.config_snapshot_json.is_some());

    assert_eq!(
        count_rows(
            &conn,
            "SELECT COUNT(*) FROM action_log WHERE action_type = 'ExecuteRebalance'"
        ),
        1
    );

    println!("✅ 执行落库与审计测试通过");
}

#[test]
fn test_execute_balanced_sku_skips_commit() {
    let (_temp_file, conn, api) = setup_rebalance_api(Arc::new(StaticSignalSource::new()));

    {
        let guard = conn.lock().unwrap();
        test_helpers::seed_sku(&guard, "SKU-A", "A-001", None).unwrap();
        // 已均衡: 目标与现货一致, 无缺口无盈余
        test_helpers::seed_allocation(&guard, "AL-1", "SKU-A", "L001", 50, 50).unwrap();
        test_helpers::seed_allocation(&guard, "AL-2", "SKU-A", "L002", 50, 50).unwrap();
    }

    let summary = api
        .execute_rebalance(explicit_request(&["SKU-A"], RebalanceObjective::MinimizeStockouts))
        .expect("execute");

    assert_eq!(summary.state, RunState::Completed);
    assert_eq!(summary.succeeded.len(), 1);
    assert_eq!(summary.succeeded[0].transfers_created, 0);
    assert_eq!(summary.total_moved_units, 0);

    // 无变化不提交, 修订号不空转
    assert_eq!(read_allocation_row(&conn, "AL-1"), (50, 50, 50, 0));
    assert_eq!(read_allocation_row(&conn, "AL-2"), (50, 50, 50, 0));
    assert_eq!(count_rows(&conn, "SELECT COUNT(*) FROM transfer_order"), 0);

    println!("✅ 已均衡 SKU 跳过提交测试通过");
}

#[test]
fn test_execute_empty_scope_completes_empty() {
    let (_temp_file, _conn, api) = setup_rebalance_api(Arc::new(StaticSignalSource::new()));

    let summary = api
        .execute_rebalance(explicit_request(&[], RebalanceObjective::MinimizeStockouts))
        .expect("execute empty scope");

    assert_eq!(summary.state, RunState::Completed);
    assert!(summary.succeeded.is_empty());
    assert!(summary.failed.is_empty());
    assert_eq!(summary.total_transfers, 0);

    let run = api.get_run(&summary.run_id).expect("run recorded");
    assert_eq!(run.state, RunState::Completed);

    println!("✅ 空范围执行收敛测试通过");
}

// ==========================================
// 范围圈定
// ==========================================

#[test]
fn test_category_scope_only_touches_matching_skus() {
    let (_temp_file, conn, api) = setup_rebalance_api(Arc::new(StaticSignalSource::new()));

    {
        let guard = conn.lock().unwrap();
        test_helpers::seed_sku(&guard, "SKU-A", "A-001", Some("饮料")).unwrap();
        test_helpers::seed_sku(&guard, "SKU-B", "B-001", Some("零食")).unwrap();
        test_helpers::seed_allocation(&guard, "AL-A1", "SKU-A", "L001", 80, 50).unwrap();
        test_helpers::seed_allocation(&guard, "AL-A2", "SKU-A", "L002", 20, 50).unwrap();
        test_helpers::seed_allocation(&guard, "AL-B1", "SKU-B", "L001", 90, 40).unwrap();
        test_helpers::seed_allocation(&guard, "AL-B2", "SKU-B", "L002", 10, 40).unwrap();
    }

    let request = AutoRebalanceRequest {
        scope: ScopeFilter {
            selection: SkuSelection::Category {
                category: "饮料".to_string(),
            },
            location_ids: None,
        },
        // 无信号时按销分配退化为均分
        objective: RebalanceObjective::BalanceForecast,
        constraints: None,
        requested_by: "planner_zhang".to_string(),
    };
    let summary = api.execute_rebalance(request).expect("execute");

    assert_eq!(summary.state, RunState::Completed);
    assert_eq!(summary.succeeded.len(), 1);
    assert_eq!(summary.succeeded[0].sku_id, "SKU-A");

    // 品类外的 SKU 原样
    assert_eq!(read_allocation_row(&conn, "AL-A1"), (50, 50, 80, 1));
    assert_eq!(read_allocation_row(&conn, "AL-A2"), (50, 50, 20, 1));
    assert_eq!(read_allocation_row(&conn, "AL-B1"), (90, 40, 90, 0));
    assert_eq!(read_allocation_row(&conn, "AL-B2"), (10, 40, 10, 0));

    println!("✅ 品类范围圈定测试通过");
}

#[test]
fn test_high_priority_scope_selects_underallocated() {
    let (_temp_file, conn, api) = setup_rebalance_api(Arc::new(StaticSignalSource::new()));

    {
        let guard = conn.lock().unwrap();
        test_helpers::seed_sku(&guard, "SKU-LOW", "LOW-001", None).unwrap();
        test_helpers::seed_sku(&guard, "SKU-OK", "OK-001", None).unwrap();
        // 计划份额比 0.4 < 0.8 命中; 0.95 不命中
        test_helpers::seed_allocation_with_allocated(&guard, "AL-LOW", "SKU-LOW", "L001", 40, 30, 100)
            .unwrap();
        test_helpers::seed_allocation_with_allocated(&guard, "AL-OK", "SKU-OK", "L001", 95, 95, 100)
            .unwrap();
    }

    let request = AutoRebalanceRequest {
        scope: ScopeFilter {
            selection: SkuSelection::HighPriority,
            location_ids: None,
        },
        objective: RebalanceObjective::MinimizeStockouts,
        constraints: None,
        requested_by: "planner_zhang".to_string(),
    };
    let summary = api.execute_rebalance(request).expect("execute");

    assert_eq!(summary.succeeded.len(), 1);
    assert_eq!(summary.succeeded[0].sku_id, "SKU-LOW");

    // 单库位: 整池归位, 目标跟随现货
    assert_eq!(read_allocation_row(&conn, "AL-LOW"), (30, 30, 30, 1));
    assert_eq!(read_allocation_row(&conn, "AL-OK"), (95, 100, 95, 0));

    println!("✅ 高优先级范围圈定测试通过");
}

#[test]
fn test_location_filter_narrows_rebalance() {
    let (_temp_file, conn, api) = setup_rebalance_api(Arc::new(StaticSignalSource::new()));

    {
        let guard = conn.lock().unwrap();
        test_helpers::seed_sku(&guard, "SKU-A", "A-001", None).unwrap();
        test_helpers::seed_allocation(&guard, "AL-1", "SKU-A", "L001", 100, 60).unwrap();
        test_helpers::seed_allocation(&guard, "AL-2", "SKU-A", "L002", 20, 60).unwrap();
        test_helpers::seed_allocation(&guard, "AL-3", "SKU-A", "L003", 60, 60).unwrap();
    }

    let mut request = explicit_request(&["SKU-A"], RebalanceObjective::MinimizeStockouts);
    request.scope.location_ids = Some(vec!["L001".to_string(), "L002".to_string()]);

    let summary = api.execute_rebalance(request).expect("execute");
    assert_eq!(summary.state, RunState::Completed);

    // 两库位重分 120: L002 先补满 60, 余 60 均分 -> 30 / 90
    assert_eq!(read_allocation_row(&conn, "AL-1"), (30, 30, 100, 1));
    assert_eq!(read_allocation_row(&conn, "AL-2"), (90, 90, 20, 1));
    // 范围外库位不参与
    assert_eq!(read_allocation_row(&conn, "AL-3"), (60, 60, 60, 0));

    assert_eq!(summary.total_moved_units, 70);

    println!("✅ 库位过滤范围测试通过");
}

// ==========================================
// 入参与查询
// ==========================================

#[test]
fn test_unknown_explicit_sku_rejected() {
    let (_temp_file, _conn, api) = setup_rebalance_api(Arc::new(StaticSignalSource::new()));

    let err = api
        .preview_rebalance(explicit_request(&["SKU-NOPE"], RebalanceObjective::MinimizeStockouts))
        .unwrap_err();
    match err {
        ApiError::InternalError(msg) => assert!(msg.contains("SKU 不存在")),
        other => panic!("期望内部错误含 SKU 不存在, 实际: {:?}", other),
    }

    println!("✅ 未知显式 SKU 拒绝测试通过");
}

#[test]
fn test_invalid_constraints_rejected() {
    let (_temp_file, _conn, api) = setup_rebalance_api(Arc::new(StaticSignalSource::new()));

    let mut request = explicit_request(&["SKU-A"], RebalanceObjective::MinimizeStockouts);
    request.constraints = Some(RebalanceConstraints {
        max_transfers_per_sku: 0,
        min_transfer_quantity: 10,
    });
    assert!(matches!(
        api.preview_rebalance(request).unwrap_err(),
        ApiError::InvalidInput(_)
    ));

    let mut request = explicit_request(&["SKU-A"], RebalanceObjective::MinimizeStockouts);
    request.requested_by = "".to_string();
    assert!(matches!(
        api.preview_rebalance(request).unwrap_err(),
        ApiError::InvalidInput(_)
    ));

    println!("✅ 非法约束拒绝测试通过");
}

#[test]
fn test_list_runs_returns_recent_first() {
    let (_temp_file, conn, api) = setup_rebalance_api(Arc::new(StaticSignalSource::new()));

    {
        let guard = conn.lock().unwrap();
        test_helpers::seed_sku(&guard, "SKU-A", "A-001", None).unwrap();
        test_helpers::seed_allocation(&guard, "AL-1", "SKU-A", "L001", 80, 50).unwrap();
        test_helpers::seed_allocation(&guard, "AL-2", "SKU-A", "L002", 20, 50).unwrap();
    }

    let first = api
        .execute_rebalance(explicit_request(&["SKU-A"], RebalanceObjective::MinimizeStockouts))
        .expect("first execute");
    let second = api
        .execute_rebalance(explicit_request(&["SKU-A"], RebalanceObjective::MinimizeStockouts))
        .expect("second execute");

    let runs = api.list_runs(10).expect("list runs");
    assert_eq!(runs.len(), 2);
    let ids: Vec<&str> = runs.iter().map(|r| r.run_id.as_str()).collect();
    assert!(ids.contains(&first.run_id.as_str()));
    assert!(ids.contains(&second.run_id.as_str()));

    assert!(matches!(
        api.get_run("RUN-NOPE").unwrap_err(),
        ApiError::NotFound(_)
    ));
    assert!(matches!(api.list_runs(0).unwrap_err(), ApiError::InvalidInput(_)));

    println!("✅ 运行清单查询测试通过");
}
