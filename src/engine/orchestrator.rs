// ==========================================
// 库存调拨与再平衡引擎 - 再平衡编排器
// ==========================================
// 职责: 编排 范围圈定 → 预演 → 执行 三段流程
// 红线: 预演绝不落库; 执行按 SKU 独立提交, 单 SKU 失败不回滚他人已提交的工作
// ==========================================

use crate::config::{ConfigManager, PolicyConfigReader};
use crate::domain::action_log::{ActionLog, ActionType};
use crate::domain::allocation::Allocation;
use crate::domain::rebalance::{
    AutoRebalanceRequest, ExecutionSummary, InvalidRunTransition, RebalanceConstraints,
    RebalancePreview, RebalanceRun, ScopeFilter, SkippedSku, SkuExecution, SkuFailure,
    SkuFailureKind, SkuPreview, SkuSelection,
};
use crate::domain::transfer::TransferOrder;
use crate::domain::types::RunState;
use crate::engine::planner::RebalancePlanner;
use crate::engine::signals::{SignalSnapshot, SignalSource};
use crate::engine::strategy::RebalanceStrategy;
use crate::engine::transfer_gen::TransferGenerator;
use crate::repository::{
    ActionLogRepository, AllocationRepository, RepositoryError, RepositoryResult, RunRecord,
    RunRepository, SkuRepository, TargetCommit,
};
use chrono::Utc;
use futures::future::join_all;
use std::collections::HashSet;
use std::error::Error;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

// ==========================================
// AttemptError - 单次提交尝试的失败分类
// ==========================================
// 冲突与校验失败走不同出路: 冲突重读快照重试, 校验失败立即终止该 SKU
enum AttemptError {
    Conflict(String),
    Validation(String),
    Internal(String),
}

// ==========================================
// RebalanceOrchestrator - 再平衡编排器
// ==========================================

pub struct RebalanceOrchestrator {
    allocation_repo: Arc<AllocationRepository>,
    sku_repo: Arc<SkuRepository>,
    run_repo: Arc<RunRepository>,
    action_log_repo: Arc<ActionLogRepository>,
    config: Arc<ConfigManager>,
    signals: Arc<dyn SignalSource>,
}

impl RebalanceOrchestrator {
    /// 创建新的编排器实例
    pub fn new(
        allocation_repo: Arc<AllocationRepository>,
        sku_repo: Arc<SkuRepository>,
        run_repo: Arc<RunRepository>,
        action_log_repo: Arc<ActionLogRepository>,
        config: Arc<ConfigManager>,
        signals: Arc<dyn SignalSource>,
    ) -> Self {
        Self {
            allocation_repo,
            sku_repo,
            run_repo,
            action_log_repo,
            config,
            signals,
        }
    }

    /// 范围圈定: 解析请求, 得到 SCOPED 状态的运行对象
    ///
    /// 显式清单逐一校验 SKU 存在性; 品类与高优先级谓词按查询结果圈定,
    /// 圈定结果为空时运行照常创建 (预演为空, 执行零提交完成)。
    #[instrument(skip(self, request), fields(requested_by = %request.requested_by))]
    pub async fn scope(
        &self,
        request: AutoRebalanceRequest,
    ) -> Result<RebalanceRun, Box<dyn Error>> {
        // ==========================================
        // 步骤1: 解析策略与约束
        // ==========================================
        debug!("步骤1: 解析策略与约束");

        let strategy = RebalanceStrategy::for_objective(request.objective);
        let constraints = match request.constraints {
            Some(c) => c,
            None => RebalanceConstraints {
                max_transfers_per_sku: self.config.get_default_max_transfers_per_sku().await?,
                min_transfer_quantity: self.config.get_default_min_transfer_quantity().await?,
            },
        };

        // ==========================================
        // 步骤2: 圈定 SKU 清单
        // ==========================================
        debug!("步骤2: 圈定 SKU 清单");

        let sku_ids = self.resolve_sku_ids(&request.scope).await?;
        let run_id = Uuid::new_v4().to_string();

        info!(
            run_id = %run_id,
            objective = request.objective.to_db_str(),
            strategy = strategy.as_str(),
            sku_count = sku_ids.len(),
            max_transfers_per_sku = constraints.max_transfers_per_sku,
            min_transfer_quantity = constraints.min_transfer_quantity,
            "再平衡范围圈定完成"
        );

        Ok(RebalanceRun {
            run_id,
            state: RunState::Scoped,
            scope: request.scope,
            objective: request.objective,
            strategy: strategy.as_str().to_string(),
            constraints,
            sku_ids,
            requested_by: request.requested_by,
            created_at: Utc::now().naive_utc(),
            finished_at: None,
        })
    }

    /// 预演: 对范围内每个 SKU 生成计划与调拨草案, 不落库
    ///
    /// SCOPED 运行预演后迁移到 PREVIEWED; PREVIEWED 运行可重复预演
    /// (每次都按当前快照重算)。其余状态拒绝。
    #[instrument(skip(self, run), fields(run_id = %run.run_id))]
    pub async fn preview(
        &self,
        run: &mut RebalanceRun,
    ) -> Result<RebalancePreview, Box<dyn Error>> {
        if run.state != RunState::Scoped && run.state != RunState::Previewed {
            return Err(Box::new(InvalidRunTransition {
                from: run.state,
                to: RunState::Previewed,
            }));
        }

        let strategy: RebalanceStrategy =
            run.strategy.parse().map_err(Box::<dyn Error>::from)?;

        let mut planned: Vec<SkuPreview> = Vec::new();
        let mut skipped: Vec<SkippedSku> = Vec::new();

        for sku_id in &run.sku_ids {
            let allocations =
                self.fetch_allocations(sku_id, run.scope.location_ids.as_deref())?;
            if allocations.is_empty() {
                skipped.push(SkippedSku {
                    sku_id: sku_id.clone(),
                    reason: "范围内无分配行".to_string(),
                });
                continue;
            }

            let location_ids: Vec<String> =
                allocations.iter().map(|a| a.location_id.clone()).collect();
            let signals =
                SignalSnapshot::collect(self.signals.as_ref(), sku_id, &location_ids).await?;
            let plan = RebalancePlanner::plan(&allocations, strategy, &signals)?;
            let draft = TransferGenerator::draft_from_plan(&plan, &allocations, &run.constraints);

            let moved_units = draft.total_moved();
            planned.push(SkuPreview {
                sku_id: sku_id.clone(),
                strategy: run.strategy.clone(),
                lines: plan.lines,
                legs: draft.legs,
                dropped_count: draft.dropped.len(),
                moved_units,
            });
        }

        let total_legs = planned.iter().map(|p| p.legs.len()).sum();
        let total_moved_units = planned.iter().map(|p| p.moved_units).sum();
        let preview = RebalancePreview {
            run_id: run.run_id.clone(),
            sku_count: run.sku_ids.len(),
            planned,
            skipped,
            total_legs,
            total_moved_units,
        };

        if run.state == RunState::Scoped {
            run.mark_previewed()?;
        }

        info!(
            run_id = %run.run_id,
            planned_count = preview.planned.len(),
            skipped_count = preview.skipped.len(),
            total_legs = preview.total_legs,
            total_moved_units = preview.total_moved_units,
            "再平衡预演完成"
        );

        Ok(preview)
    }

    /// 执行: 按 SKU 独立提交, 冲突重试, 失败隔离
    ///
    /// 要求 PREVIEWED 状态。每个 SKU 重读最新快照重算 (绝不复用预演数据),
    /// 按 execute_worker_count 分批并发推进; 结束后落库运行记录与审计日志。
    #[instrument(skip(self, run), fields(run_id = %run.run_id))]
    pub async fn execute(
        &self,
        run: &mut RebalanceRun,
    ) -> Result<ExecutionSummary, Box<dyn Error>> {
        run.begin_execution()?;

        let strategy: RebalanceStrategy =
            run.strategy.parse().map_err(Box::<dyn Error>::from)?;
        let worker_count = self.config.get_execute_worker_count().await?;
        let max_retries = self.config.get_max_execute_retries().await?;
        // 决策口径以执行开始时的配置为准，随运行记录封存
        let config_snapshot = self.config.get_config_snapshot()?;

        info!(
            run_id = %run.run_id,
            sku_count = run.sku_ids.len(),
            worker_count,
            max_retries,
            "开始执行再平衡"
        );

        // ==========================================
        // 步骤1: 按并发批推进各 SKU 的独立提交
        // ==========================================
        debug!("步骤1: 按并发批推进各 SKU");

        let mut succeeded: Vec<SkuExecution> = Vec::new();
        let mut failed: Vec<SkuFailure> = Vec::new();
        let run_ref: &RebalanceRun = run;
        for batch in run_ref.sku_ids.chunks(worker_count) {
            let tasks = batch
                .iter()
                .map(|sku_id| self.execute_one_sku(run_ref, sku_id, strategy, max_retries));
            for outcome in join_all(tasks).await {
                match outcome {
                    Ok(exec) => succeeded.push(exec),
                    Err(failure) => {
                        warn!(
                            sku_id = %failure.sku_id,
                            kind = ?failure.kind,
                            reason = %failure.reason,
                            "单 SKU 再平衡失败"
                        );
                        failed.push(failure);
                    }
                }
            }
        }

        // ==========================================
        // 步骤2: 推导终态并封存运行
        // ==========================================
        debug!("步骤2: 推导终态");

        let state = ExecutionSummary::derive_state(succeeded.len(), failed.len());
        let finished_at = Utc::now().naive_utc();
        run.finish(state, finished_at)?;

        let total_transfers = succeeded.iter().map(|e| e.transfers_created).sum();
        let total_moved_units = succeeded.iter().map(|e| e.moved_units).sum();
        let summary = ExecutionSummary {
            run_id: run.run_id.clone(),
            state,
            succeeded,
            failed,
            total_transfers,
            total_moved_units,
            finished_at,
        };

        // ==========================================
        // 步骤3: 落库运行记录与审计日志
        // ==========================================
        debug!("步骤3: 落库运行记录与审计日志");

        let record = RunRecord {
            run_id: run.run_id.clone(),
            state: run.state,
            objective: run.objective,
            strategy: run.strategy.clone(),
            scope_json: serde_json::to_string(&run.scope).ok(),
            constraints_json: serde_json::to_string(&run.constraints).ok(),
            config_snapshot_json: Some(config_snapshot),
            summary_json: serde_json::to_string(&summary).ok(),
            requested_by: run.requested_by.clone(),
            created_at: run.created_at,
            finished_at: run.finished_at,
        };
        self.run_repo.insert(&record)?;

        let log = ActionLog::new(
            Uuid::new_v4().to_string(),
            ActionType::ExecuteRebalance,
            run.requested_by.clone(),
        )
        .with_payload(&summary)
        .with_detail(&format!(
            "运行 {} 终态 {}: 成功 {} / 失败 {}",
            run.run_id,
            state.to_db_str(),
            summary.succeeded.len(),
            summary.failed.len()
        ));
        self.action_log_repo.insert(&log)?;

        info!(
            run_id = %run.run_id,
            state = state.to_db_str(),
            succeeded_count = summary.succeeded.len(),
            failed_count = summary.failed.len(),
            total_transfers = summary.total_transfers,
            total_moved_units = summary.total_moved_units,
            "再平衡执行完成"
        );

        Ok(summary)
    }

    // ==========================================
    // 内部步骤
    // ==========================================

    /// 按圈定方式解析 SKU 清单 (显式清单去重并校验存在性)
    async fn resolve_sku_ids(&self, scope: &ScopeFilter) -> Result<Vec<String>, Box<dyn Error>> {
        let ids = match &scope.selection {
            SkuSelection::Explicit { sku_ids } => {
                let mut seen = HashSet::new();
                let mut resolved = Vec::new();
                for sku_id in sku_ids {
                    if !self.sku_repo.exists(sku_id)? {
                        return Err(format!("SKU 不存在: {}", sku_id).into());
                    }
                    if seen.insert(sku_id.clone()) {
                        resolved.push(sku_id.clone());
                    }
                }
                resolved
            }
            SkuSelection::Category { category } => self.sku_repo.list_ids_by_category(category)?,
            SkuSelection::HighPriority => {
                let ratio = self.config.get_high_priority_ratio().await?;
                self.allocation_repo.list_high_priority_sku_ids(ratio)?
            }
        };
        Ok(ids)
    }

    /// 读取单 SKU 的分配快照 (范围带地理过滤时只取过滤内库位)
    fn fetch_allocations(
        &self,
        sku_id: &str,
        location_ids: Option<&[String]>,
    ) -> RepositoryResult<Vec<Allocation>> {
        match location_ids {
            Some(ids) => self.allocation_repo.find_by_sku_in_locations(sku_id, ids),
            None => self.allocation_repo.find_by_sku(sku_id),
        }
    }

    /// 单 SKU 执行循环: 乐观锁冲突按新快照重试, 其余失败立即分类返回
    async fn execute_one_sku(
        &self,
        run: &RebalanceRun,
        sku_id: &str,
        strategy: RebalanceStrategy,
        max_retries: u32,
    ) -> Result<SkuExecution, SkuFailure> {
        let mut retries = 0u32;
        loop {
            match self.attempt_commit(run, sku_id, strategy).await {
                Ok(exec) => return Ok(SkuExecution { retries, ..exec }),
                Err(AttemptError::Conflict(reason)) if retries < max_retries => {
                    retries += 1;
                    warn!(sku_id, retries, reason = %reason, "乐观锁冲突，按新快照重试");
                }
                Err(AttemptError::Conflict(reason)) => {
                    return Err(SkuFailure {
                        sku_id: sku_id.to_string(),
                        kind: SkuFailureKind::Conflict,
                        reason,
                    });
                }
                Err(AttemptError::Validation(reason)) => {
                    return Err(SkuFailure {
                        sku_id: sku_id.to_string(),
                        kind: SkuFailureKind::Validation,
                        reason,
                    });
                }
                Err(AttemptError::Internal(reason)) => {
                    return Err(SkuFailure {
                        sku_id: sku_id.to_string(),
                        kind: SkuFailureKind::Internal,
                        reason,
                    });
                }
            }
        }
    }

    /// 单次提交尝试: 重读快照 → 重算计划 → 派生调拨 → 单事务提交
    async fn attempt_commit(
        &self,
        run: &RebalanceRun,
        sku_id: &str,
        strategy: RebalanceStrategy,
    ) -> Result<SkuExecution, AttemptError> {
        let allocations = self
            .fetch_allocations(sku_id, run.scope.location_ids.as_deref())
            .map_err(|e| AttemptError::Internal(format!("读取分配快照失败: {}", e)))?;
        if allocations.is_empty() {
            return Err(AttemptError::Validation("范围内无分配行".to_string()));
        }

        let location_ids: Vec<String> =
            allocations.iter().map(|a| a.location_id.clone()).collect();
        let signals = SignalSnapshot::collect(self.signals.as_ref(), sku_id, &location_ids)
            .await
            .map_err(|e| AttemptError::Internal(format!("信号源读取失败: {}", e)))?;
        let plan = RebalancePlanner::plan(&allocations, strategy, &signals)
            .map_err(|e| AttemptError::Validation(e.to_string()))?;
        let draft = TransferGenerator::draft_from_plan(&plan, &allocations, &run.constraints);

        // 已均衡的 SKU 无目标变化也无调拨腿, 跳过提交避免空转版本号
        if plan.changed_line_count() == 0 && draft.legs.is_empty() {
            return Ok(SkuExecution {
                sku_id: sku_id.to_string(),
                transfers_created: 0,
                moved_units: 0,
                dropped_count: draft.dropped.len(),
                retries: 0,
            });
        }

        let commits: Vec<TargetCommit> = allocations
            .iter()
            .zip(plan.lines.iter())
            .map(|(row, line)| TargetCommit {
                allocation_id: row.allocation_id.clone(),
                new_target: line.proposed_target,
                new_allocated: line.proposed_target,
                expected_revision: row.revision,
            })
            .collect();

        let now = Utc::now().naive_utc();
        let transfers: Vec<TransferOrder> = draft
            .legs
            .iter()
            .map(|leg| {
                let mut order = TransferOrder::new_requested(
                    &Uuid::new_v4().to_string(),
                    sku_id,
                    &leg.from_location_id,
                    &leg.to_location_id,
                    leg.quantity,
                    &run.requested_by,
                    now,
                );
                order.run_id = Some(run.run_id.clone());
                order
            })
            .collect();

        match self
            .allocation_repo
            .commit_rebalance(sku_id, &commits, &transfers, &run.requested_by)
        {
            Ok(()) => Ok(SkuExecution {
                sku_id: sku_id.to_string(),
                transfers_created: transfers.len(),
                moved_units: draft.total_moved(),
                dropped_count: draft.dropped.len(),
                retries: 0,
            }),
            Err(e @ RepositoryError::OptimisticLockFailure { .. }) => {
                Err(AttemptError::Conflict(e.to_string()))
            }
            Err(e @ RepositoryError::VersionConflict { .. }) => {
                Err(AttemptError::Conflict(e.to_string()))
            }
            Err(e @ RepositoryError::ValidationError(_)) => {
                Err(AttemptError::Validation(e.to_string()))
            }
            Err(e @ RepositoryError::FieldValueError { .. }) => {
                Err(AttemptError::Validation(e.to_string()))
            }
            Err(e) => Err(AttemptError::Internal(e.to_string())),
        }
    }
}
