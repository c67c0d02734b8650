// ==========================================
// 并发控制测试
// ==========================================
// 职责: 验证乐观锁在人工改账与自动再平衡并发下的行为
// ==========================================

#[path = "test_helpers.rs"]
mod test_helpers;

#[cfg(test)]
mod concurrent_rebalance_test {
    use inventory_rebalance::api::RebalanceApi;
    use inventory_rebalance::config::ConfigManager;
    use inventory_rebalance::db;
    use inventory_rebalance::domain::rebalance::{
        AutoRebalanceRequest, ScopeFilter, SkuSelection,
    };
    use inventory_rebalance::domain::types::{RebalanceObjective, RunState};
    use inventory_rebalance::domain::AllocationPatch;
    use inventory_rebalance::engine::{RebalanceOrchestrator, StaticSignalSource};
    use inventory_rebalance::logging;
    use inventory_rebalance::repository::{
        ActionLogRepository, AllocationRepository, RepositoryError, RunRepository, SkuRepository,
    };
    use rusqlite::Connection;
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    use crate::test_helpers;

    // ==========================================
    // 测试辅助函数
    // ==========================================

    /// 创建测试环境
    fn setup_test_env() -> (NamedTempFile, String, Arc<Mutex<Connection>>) {
        logging::init_test();

        let (temp_file, db_path) = test_helpers::create_test_db().unwrap();
        let conn = db::open_sqlite_connection(&db_path).unwrap();

        test_helpers::insert_test_config(&conn).unwrap();
        test_helpers::seed_locations(&conn).unwrap();
        test_helpers::seed_sku(&conn, "SKU-A", "A-001", Some("饮料")).unwrap();

        (temp_file, db_path, Arc::new(Mutex::new(conn)))
    }

    fn build_rebalance_api(db_path: &str, conn: &Arc<Mutex<Connection>>) -> Arc<RebalanceApi> {
        let config = Arc::new(ConfigManager::new(db_path).unwrap());
        let orchestrator = Arc::new(RebalanceOrchestrator::new(
            Arc::new(AllocationRepository::new(Arc::clone(conn))),
            Arc::new(SkuRepository::new(Arc::clone(conn))),
            Arc::new(RunRepository::new(Arc::clone(conn))),
            Arc::new(ActionLogRepository::new(Arc::clone(conn))),
            config,
            Arc::new(StaticSignalSource::new()),
        ));
        Arc::new(RebalanceApi::new(
            orchestrator,
            Arc::new(RunRepository::new(Arc::clone(conn))),
            Arc::new(ActionLogRepository::new(Arc::clone(conn))),
        ))
    }

    fn explicit_request() -> AutoRebalanceRequest {
        AutoRebalanceRequest {
            scope: ScopeFilter {
                selection: SkuSelection::Explicit {
                    sku_ids: vec!["SKU-A".to_string()],
                },
                location_ids: None,
            },
            objective: RebalanceObjective::MinimizeStockouts,
            constraints: None,
            requested_by: "concurrent_runner".to_string(),
        }
    }

    fn sum_sku_a(conn: &Arc<Mutex<Connection>>) -> (i64, i64) {
        let guard = conn.lock().unwrap();
        guard
            .query_row(
                "SELECT SUM(target), SUM(on_hand) FROM allocation WHERE sku_id = 'SKU-A'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap()
    }

    // ==========================================
    // 测试1: 多写入者同一旧修订号
    // ==========================================

    #[test]
    fn test_single_winner_among_stale_writers() {
        let (_temp_file, _db_path, conn) = setup_test_env();

        {
            let guard = conn.lock().unwrap();
            test_helpers::seed_allocation(&guard, "AL-1", "SKU-A", "L001", 100, 100).unwrap();
        }

        // 所有线程都拿 revision 0 的同一份旧快照
        let thread_count = 5;
        let mut handles = vec![];

        for i in 0..thread_count {
            let conn_clone = Arc::clone(&conn);

            let handle = thread::spawn(move || -> Result<(), String> {
                let repo = AllocationRepository::new(conn_clone);
                let patch = AllocationPatch {
                    target: Some(100 + (i as i64) * 10),
                    ..Default::default()
                };

                // 稍微延迟,增加并发冲突概率
                thread::sleep(Duration::from_millis(10));

                repo.update("AL-1", &patch, 0, &format!("writer_{}", i))
                    .map(|_| ())
                    .map_err(|e| e.to_string())
            });

            handles.push(handle);
        }

        let mut success_count = 0;
        let mut failure_count = 0;
        for handle in handles {
            match handle.join().unwrap() {
                Ok(_) => success_count += 1,
                Err(msg) => {
                    assert!(
                        msg.contains("乐观锁冲突") || msg.contains("OptimisticLock"),
                        "落败线程的错误应该是乐观锁冲突: {}",
                        msg
                    );
                    failure_count += 1;
                }
            }
        }

        // 同一旧修订号只能有一个胜者
        assert_eq!(success_count, 1, "应该只有1个线程成功更新");
        assert_eq!(failure_count, thread_count - 1, "其他线程应该因乐观锁冲突失败");

        let repo = AllocationRepository::new(Arc::clone(&conn));
        let row = repo.find_by_id("AL-1").unwrap().unwrap();
        assert_eq!(row.revision, 1, "胜者只推进一次修订号");

        println!(
            "✅ 多写入者并发更新测试通过: {}个线程中1个成功,{}个失败",
            thread_count, failure_count
        );
    }

    // ==========================================
    // 测试2: 再平衡执行吸收旁路写入
    // ==========================================

    #[test]
    fn test_execute_retry_absorbs_rival_update() {
        let (_temp_file, db_path, conn) = setup_test_env();

        {
            let guard = conn.lock().unwrap();
            test_helpers::seed_allocation(&guard, "AL-1", "SKU-A", "L001", 120, 100).unwrap();
            test_helpers::seed_allocation(&guard, "AL-2", "SKU-A", "L002", 30, 100).unwrap();
        }

        let api = build_rebalance_api(&db_path, &conn);

        // 旁路写入者: 改安全库存 (不碰现货与目标), 只为推进修订号
        let rival_conn = Arc::clone(&conn);
        let rival = thread::spawn(move || -> bool {
            let repo = AllocationRepository::new(rival_conn);
            thread::sleep(Duration::from_millis(5));

            for _ in 0..10 {
                let row = repo.find_by_id("AL-1").unwrap().unwrap();
                let patch = AllocationPatch {
                    safety_stock: Some(7),
                    ..Default::default()
                };
                match repo.update("AL-1", &patch, row.revision, "rival_writer") {
                    Ok(_) => return true,
                    Err(RepositoryError::OptimisticLockFailure { .. }) => continue,
                    Err(e) => panic!("旁路写入意外错误: {}", e),
                }
            }
            false
        });

        let api_clone = Arc::clone(&api);
        let runner = thread::spawn(move || api_clone.execute_rebalance(explicit_request()));

        let rival_won = rival.join().unwrap();
        let summary = runner.join().unwrap().expect("执行应该吸收冲突后完成");

        assert!(rival_won, "旁路写入最终应该成功");
        assert_eq!(summary.state, RunState::Completed);
        assert_eq!(summary.failed.len(), 0);

        // 冲突最多触发有限次重试
        assert!(summary.succeeded[0].retries <= 3);

        // 守恒: 目标总量等于现货总量, 旁路写入不破坏
        let (target_sum, on_hand_sum) = sum_sku_a(&conn);
        assert_eq!(target_sum, 150);
        assert_eq!(on_hand_sum, 150);

        let repo = AllocationRepository::new(Arc::clone(&conn));
        let row = repo.find_by_id("AL-1").unwrap().unwrap();
        assert_eq!(row.safety_stock, 7, "旁路写入的安全库存要留存");

        println!("✅ 再平衡执行吸收旁路写入测试通过");
    }

    // ==========================================
    // 测试3: 两次执行并发互撞
    // ==========================================

    #[test]
    fn test_parallel_executes_both_complete() {
        let (_temp_file, db_path, conn) = setup_test_env();

        {
            let guard = conn.lock().unwrap();
            test_helpers::seed_allocation(&guard, "AL-1", "SKU-A", "L001", 90, 20).unwrap();
            test_helpers::seed_allocation(&guard, "AL-2", "SKU-A", "L002", 10, 80).unwrap();
        }

        let api = build_rebalance_api(&db_path, &conn);

        let mut handles = vec![];
        for _ in 0..2 {
            let api_clone = Arc::clone(&api);
            handles.push(thread::spawn(move || {
                api_clone.execute_rebalance(explicit_request())
            }));
        }

        let mut states = vec![];
        for handle in handles {
            let summary = handle.join().unwrap().expect("两次执行都应该完成");
            states.push(summary.state);
        }

        // 互撞由重试吸收, 两次运行都要收敛到全部成功
        assert!(states.iter().all(|s| *s == RunState::Completed));

        // 守恒不因互撞破坏
        let (target_sum, on_hand_sum) = sum_sku_a(&conn);
        assert_eq!(target_sum, 100);
        assert_eq!(on_hand_sum, 100);

        // 两次运行都有留痕
        let run_count: i64 = {
            let guard = conn.lock().unwrap();
            guard
                .query_row("SELECT COUNT(*) FROM rebalance_run", [], |row| row.get(0))
                .unwrap()
        };
        assert_eq!(run_count, 2);

        println!("✅ 并发执行互撞收敛测试通过");
    }
}
