// ==========================================
// 库存调拨与再平衡引擎 - 再平衡 API
// ==========================================
// 职责: 同步封装编排器的 圈定→预演→执行 流程, 运行记录查询
// 红线: 预演绝不落库; 执行必须经过预演 (状态机约束)
// ==========================================

use std::error::Error;
use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult};
use crate::domain::action_log::{ActionLog, ActionType};
use crate::domain::rebalance::{
    AutoRebalanceRequest, ExecutionSummary, InvalidRunTransition, RebalancePreview,
};
use crate::engine::orchestrator::RebalanceOrchestrator;
use crate::repository::error::RepositoryError;
use crate::repository::{ActionLogRepository, RunRecord, RunRepository};

// ==========================================
// RebalanceApi - 再平衡 API
// ==========================================

/// 再平衡API
///
/// 职责：
/// 1. 预演再平衡（只读，汇总计划与调拨草案）
/// 2. 执行再平衡（圈定→预演→执行一站式）
/// 3. 运行记录查询
/// 4. ActionLog记录
pub struct RebalanceApi {
    orchestrator: Arc<RebalanceOrchestrator>,
    run_repo: Arc<RunRepository>,
    action_log_repo: Arc<ActionLogRepository>,
}

impl RebalanceApi {
    /// 创建新的RebalanceApi实例
    pub fn new(
        orchestrator: Arc<RebalanceOrchestrator>,
        run_repo: Arc<RunRepository>,
        action_log_repo: Arc<ActionLogRepository>,
    ) -> Self {
        Self {
            orchestrator,
            run_repo,
            action_log_repo,
        }
    }

    // ==========================================
    // 预演 / 执行
    // ==========================================

    /// 预演再平衡: 圈定 SKU 并生成计划与调拨草案, 不落库
    ///
    /// # 参数
    /// - request: 范围 + 目标 + 约束 (约束缺省用全局配置)
    ///
    /// # 返回
    /// - Ok(RebalancePreview): 预演汇总
    pub fn preview_rebalance(&self, request: AutoRebalanceRequest) -> ApiResult<RebalancePreview> {
        Self::validate_request(&request)?;
        let requested_by = request.requested_by.clone();

        let fut = async {
            let mut run = self.orchestrator.scope(request).await?;
            self.orchestrator.preview(&mut run).await
        };
        let preview = self.block_on_engine(fut)?;

        let log = ActionLog::new(
            Uuid::new_v4().to_string(),
            ActionType::PreviewRebalance,
            requested_by,
        )
        .with_payload(&serde_json::json!({
            "run_id": preview.run_id,
            "sku_count": preview.sku_count,
            "planned_count": preview.planned.len(),
            "skipped_count": preview.skipped.len(),
            "total_legs": preview.total_legs,
            "total_moved_units": preview.total_moved_units,
        }))
        .with_detail(&format!(
            "预演运行 {}: 计划 {} / 跳过 {}",
            preview.run_id,
            preview.planned.len(),
            preview.skipped.len()
        ));
        self.action_log_repo.insert(&log)?;

        Ok(preview)
    }

    /// 执行再平衡: 圈定 → 预演 → 执行 一站式
    ///
    /// 运行记录与 ExecuteRebalance 审计日志由编排器在执行结束时落库。
    ///
    /// # 返回
    /// - Ok(ExecutionSummary): 执行汇总 (终态 + 每 SKU 成败明细)
    pub fn execute_rebalance(&self, request: AutoRebalanceRequest) -> ApiResult<ExecutionSummary> {
        Self::validate_request(&request)?;

        let fut = async {
            let mut run = self.orchestrator.scope(request).await?;
            self.orchestrator.preview(&mut run).await?;
            self.orchestrator.execute(&mut run).await
        };
        let summary = self.block_on_engine(fut)?;

        debug!(
            run_id = %summary.run_id,
            state = summary.state.to_db_str(),
            "再平衡执行返回"
        );
        Ok(summary)
    }

    // ==========================================
    // 运行记录查询
    // ==========================================

    /// 查询最近的运行记录 (按创建时间倒序)
    pub fn list_runs(&self, limit: i32) -> ApiResult<Vec<RunRecord>> {
        if limit <= 0 {
            return Err(ApiError::InvalidInput("limit必须大于0".to_string()));
        }
        Ok(self.run_repo.list_recent(limit)?)
    }

    /// 查询单条运行记录
    pub fn get_run(&self, run_id: &str) -> ApiResult<RunRecord> {
        if run_id.trim().is_empty() {
            return Err(ApiError::InvalidInput("运行ID不能为空".to_string()));
        }
        self.run_repo
            .find_by_id(run_id)?
            .ok_or_else(|| ApiError::NotFound(format!("RebalanceRun(id={})不存在", run_id)))
    }

    // ==========================================
    // 内部辅助
    // ==========================================

    /// 同步桥接: 已在 tokio 运行时中用 block_in_place, 否则新建运行时
    fn block_on_engine<F, T>(&self, fut: F) -> ApiResult<T>
    where
        F: std::future::Future<Output = Result<T, Box<dyn Error>>>,
    {
        let result = if let Ok(handle) = tokio::runtime::Handle::try_current() {
            // 已经在运行时中，使用 block_in_place 来运行异步代码
            tokio::task::block_in_place(|| handle.block_on(fut))
        } else {
            // 不在运行时中，创建新的运行时
            let rt = tokio::runtime::Runtime::new()
                .map_err(|e| ApiError::InternalError(format!("创建运行时失败: {}", e)))?;
            rt.block_on(fut)
        };
        result.map_err(Self::engine_error)
    }

    /// 引擎层错误还原为 API 错误 (保留仓储层分类)
    fn engine_error(e: Box<dyn Error>) -> ApiError {
        let e = match e.downcast::<RepositoryError>() {
            Ok(repo_err) => return ApiError::from(*repo_err),
            Err(e) => e,
        };
        match e.downcast::<InvalidRunTransition>() {
            Ok(transition) => ApiError::InvalidStateTransition {
                from: transition.from.to_db_str().to_string(),
                to: transition.to.to_db_str().to_string(),
            },
            Err(e) => ApiError::InternalError(e.to_string()),
        }
    }

    /// 请求参数验证
    fn validate_request(request: &AutoRebalanceRequest) -> ApiResult<()> {
        if request.requested_by.trim().is_empty() {
            return Err(ApiError::InvalidInput("发起人不能为空".to_string()));
        }
        if let Some(c) = &request.constraints {
            if c.max_transfers_per_sku == 0 {
                return Err(ApiError::InvalidInput(
                    "最大调拨腿数必须大于0".to_string(),
                ));
            }
            if c.min_transfer_quantity < 0 {
                return Err(ApiError::InvalidInput(
                    "最小调拨量不能为负数".to_string(),
                ));
            }
        }
        Ok(())
    }
}
