// ==========================================
// 库存调拨与再平衡引擎 - 告警 API
// ==========================================
// 职责: 告警生成(去重+自动消除)、查询、确认/关闭
// 红线: 同一 (sku, 库位, 类型) 同时至多一条未关闭告警
// 红线: 条件不再成立的未关闭告警在生成轮自动消除
// ==========================================

use std::collections::HashSet;
use std::error::Error;
use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult};
use crate::config::ConfigManager;
use crate::domain::action_log::{ActionLog, ActionType};
use crate::domain::alert::{Alert, AlertFilter, AlertIdentity};
use crate::engine::alerting::AlertEngine;
use crate::engine::signals::{BatchLot, BatchMetadataSource};
use crate::repository::{ActionLogRepository, AlertRepository, AllocationRepository};

// ==========================================
// AlertGenerationReport - 告警生成轮报告
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertGenerationReport {
    pub evaluated_allocations: usize, // 参与评估的分配行数
    pub candidates: usize,            // 引擎产出的候选数
    pub created: usize,               // 新建告警数
    pub deduped: usize,               // 命中未关闭告警被去重的候选数
    pub auto_resolved: usize,         // 条件消失被自动消除的告警数
}

// ==========================================
// AlertApi - 告警 API
// ==========================================

/// 告警API
///
/// 职责：
/// 1. 告警生成轮（评估 → 去重落库 → 自动消除）
/// 2. 告警查询
/// 3. 告警确认 / 关闭（幂等）
/// 4. ActionLog记录
pub struct AlertApi {
    alert_repo: Arc<AlertRepository>,
    allocation_repo: Arc<AllocationRepository>,
    action_log_repo: Arc<ActionLogRepository>,
    engine: AlertEngine<ConfigManager>,
    batch_source: Arc<dyn BatchMetadataSource>,
}

impl AlertApi {
    /// 创建新的AlertApi实例
    pub fn new(
        alert_repo: Arc<AlertRepository>,
        allocation_repo: Arc<AllocationRepository>,
        action_log_repo: Arc<ActionLogRepository>,
        config: Arc<ConfigManager>,
        batch_source: Arc<dyn BatchMetadataSource>,
    ) -> Self {
        Self {
            alert_repo,
            allocation_repo,
            action_log_repo,
            engine: AlertEngine::new(config),
            batch_source,
        }
    }

    // ==========================================
    // 生成
    // ==========================================

    /// 执行一轮告警生成
    ///
    /// 1. 评估全部分配行的低库存与临期条件
    /// 2. 候选按自然身份去重落库 (命中未关闭告警则不重复建)
    /// 3. 未出现在候选中的未关闭告警自动消除 (RESOLVED)
    ///
    /// # 参数
    /// - today: 评估基准日 (临期窗口按此计算)
    /// - operator: 触发人 (定时任务传调度身份)
    pub fn generate_alerts(
        &self,
        today: NaiveDate,
        operator: &str,
    ) -> ApiResult<AlertGenerationReport> {
        if operator.trim().is_empty() {
            return Err(ApiError::InvalidInput("触发人不能为空".to_string()));
        }

        let allocations = self.allocation_repo.list_all()?;

        // 批次按分配行中出现过的 SKU 拉取
        let mut sku_ids: Vec<String> = Vec::new();
        let mut seen = HashSet::new();
        for row in &allocations {
            if seen.insert(row.sku_id.clone()) {
                sku_ids.push(row.sku_id.clone());
            }
        }

        let candidates = self.block_on_engine(async {
            let mut batches: Vec<BatchLot> = Vec::new();
            for sku_id in &sku_ids {
                batches.extend(self.batch_source.list_batches(sku_id).await?);
            }
            self.engine.evaluate_all(&allocations, &batches, today).await
        })?;

        let now = Utc::now().naive_utc();
        let mut created = 0usize;
        let mut deduped = 0usize;
        for candidate in &candidates {
            match self
                .alert_repo
                .insert_if_absent(candidate, &Uuid::new_v4().to_string(), now)?
            {
                Some(_) => created += 1,
                None => deduped += 1,
            }
        }

        // 自动消除: 本轮未复现的未关闭告警视为条件消失
        let identity_set: HashSet<AlertIdentity> =
            candidates.iter().map(|c| c.identity()).collect();
        let mut auto_resolved = 0usize;
        for alert in self.alert_repo.list_open()? {
            if !identity_set.contains(&alert.identity()) {
                self.alert_repo.resolve(&alert.alert_id, now)?;
                auto_resolved += 1;
            }
        }

        let report = AlertGenerationReport {
            evaluated_allocations: allocations.len(),
            candidates: candidates.len(),
            created,
            deduped,
            auto_resolved,
        };

        let log = ActionLog::new(
            Uuid::new_v4().to_string(),
            ActionType::GenerateAlerts,
            operator.to_string(),
        )
        .with_payload(&report)
        .with_detail(&format!(
            "告警生成轮: 新建 {} / 去重 {} / 自动消除 {}",
            created, deduped, auto_resolved
        ));
        self.action_log_repo.insert(&log)?;

        info!(
            evaluated = report.evaluated_allocations,
            candidates = report.candidates,
            created,
            deduped,
            auto_resolved,
            "告警生成轮完成"
        );
        Ok(report)
    }

    // ==========================================
    // 查询
    // ==========================================

    /// 按过滤条件查询告警 (入库顺序)
    pub fn list_alerts(&self, filter: &AlertFilter) -> ApiResult<Vec<Alert>> {
        Ok(self.alert_repo.list(filter)?)
    }

    // ==========================================
    // 确认 / 关闭
    // ==========================================

    /// 确认告警: ACTIVE -> ACKNOWLEDGED, 重复确认幂等
    pub fn acknowledge_alert(&self, alert_id: &str, actor: &str) -> ApiResult<Alert> {
        Self::validate_mutation_params(alert_id, actor)?;

        let alert = self
            .alert_repo
            .acknowledge(alert_id, actor, Utc::now().naive_utc())?;

        let log = ActionLog::new(
            Uuid::new_v4().to_string(),
            ActionType::AcknowledgeAlert,
            actor.to_string(),
        )
        .with_sku(&alert.sku_id)
        .with_payload(&serde_json::json!({ "alert_id": alert_id }))
        .with_detail(&format!("确认告警: {}", alert_id));
        self.action_log_repo.insert(&log)?;

        Ok(alert)
    }

    /// 关闭告警: 人工终态 DISMISSED, 对已终态的告警幂等
    pub fn dismiss_alert(&self, alert_id: &str, actor: &str) -> ApiResult<Alert> {
        Self::validate_mutation_params(alert_id, actor)?;

        let alert = self
            .alert_repo
            .dismiss(alert_id, actor, Utc::now().naive_utc())?;

        let log = ActionLog::new(
            Uuid::new_v4().to_string(),
            ActionType::DismissAlert,
            actor.to_string(),
        )
        .with_sku(&alert.sku_id)
        .with_payload(&serde_json::json!({ "alert_id": alert_id }))
        .with_detail(&format!("关闭告警: {}", alert_id));
        self.action_log_repo.insert(&log)?;

        Ok(alert)
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
        result.map_err(|e| ApiError::InternalError(e.to_string()))
    }

    fn validate_mutation_params(alert_id: &str, actor: &str) -> ApiResult<()> {
        if alert_id.trim().is_empty() {
            return Err(ApiError::InvalidInput("告警ID不能为空".to_string()));
        }
        if actor.trim().is_empty() {
            return Err(ApiError::InvalidInput("操作人不能为空".to_string()));
        }
        Ok(())
    }
}
