// ==========================================
// 库存调拨与再平衡引擎 - 再平衡领域模型
// ==========================================
// 再平衡计划是一次性的瞬态产物，只读不落库
// 运行状态机以值对象形式在 scope → preview → execute 间传递，
// 不藏在组件内部状态里，可脱离任何界面独立测试
// ==========================================

use crate::domain::transfer::TransferDraft;
use crate::domain::types::{RebalanceObjective, RunState};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ==========================================
// PlanLine - 计划行
// ==========================================
// 行序与分配行入库顺序一致；余数永远吸收在最后一行
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanLine {
    pub location_id: String,  // 库位ID
    pub current_target: i64,  // 当前目标份额
    pub proposed_target: i64, // 建议目标份额 (>= 0)
}

// ==========================================
// RebalancePlan - 单 SKU 再平衡计划
// ==========================================
// 守恒不变量: Σ proposed_target == total_on_hand
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebalancePlan {
    pub sku_id: String,       // SKU ID
    pub strategy: String,     // 策略键 (engine::strategy::RebalanceStrategy::as_str)
    pub total_on_hand: i64,   // 计划时的总现货
    pub lines: Vec<PlanLine>, // 计划行 (入库顺序)
}

impl RebalancePlan {
    /// 建议目标合计
    pub fn total_proposed(&self) -> i64 {
        self.lines.iter().map(|l| l.proposed_target).sum()
    }

    /// 守恒校验: 建议目标合计必须等于总现货
    pub fn is_conserving(&self) -> bool {
        self.total_proposed() == self.total_on_hand
    }

    /// 有变化的行数 (proposed != current)
    pub fn changed_line_count(&self) -> usize {
        self.lines
            .iter()
            .filter(|l| l.proposed_target != l.current_target)
            .count()
    }
}

// ==========================================
// RebalanceConstraints - 再平衡约束
// ==========================================
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RebalanceConstraints {
    pub max_transfers_per_sku: usize, // 单 SKU 最大调拨腿数
    pub min_transfer_quantity: i64,   // 最小调拨量 (低于则丢弃上报)
}

// ==========================================
// SkuSelection - SKU 圈定方式
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SkuSelection {
    Explicit { sku_ids: Vec<String> }, // 显式清单
    Category { category: String },     // 按品类
    HighPriority,                      // 高优先级谓词: 任一库位 allocated/target < 阈值
}

// ==========================================
// ScopeFilter - 运行范围
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeFilter {
    pub selection: SkuSelection,           // SKU 圈定
    pub location_ids: Option<Vec<String>>, // 地理过滤: 只在这些库位间再平衡 (None = 全部)
}

// ==========================================
// AutoRebalanceRequest - 自动再平衡请求
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoRebalanceRequest {
    pub scope: ScopeFilter,                          // 范围
    pub objective: RebalanceObjective,               // 目标
    pub constraints: Option<RebalanceConstraints>,   // 约束 (None = 用全局配置默认)
    pub requested_by: String,                        // 发起人
}

// ==========================================
// InvalidRunTransition - 非法状态迁移
// ==========================================
#[derive(Debug, Clone, Error)]
#[error("再平衡运行状态迁移非法: {from} -> {to}")]
pub struct InvalidRunTransition {
    pub from: RunState, // 当前状态
    pub to: RunState,   // 目标状态
}

// ==========================================
// RebalanceRun - 再平衡运行 (显式状态机)
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebalanceRun {
    pub run_id: String,                    // 运行ID
    pub state: RunState,                   // 当前状态
    pub scope: ScopeFilter,                // 范围
    pub objective: RebalanceObjective,     // 目标
    pub strategy: String,                  // 解析后的策略键
    pub constraints: RebalanceConstraints, // 解析后的约束
    pub sku_ids: Vec<String>,              // 圈定的 SKU 清单
    pub requested_by: String,              // 发起人
    pub created_at: NaiveDateTime,         // 创建时间
    pub finished_at: Option<NaiveDateTime>,// 结束时间
}

impl RebalanceRun {
    fn transition(&mut self, next: RunState) -> Result<(), InvalidRunTransition> {
        if !self.state.can_transition_to(next) {
            return Err(InvalidRunTransition {
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        Ok(())
    }

    /// SCOPED → PREVIEWED
    pub fn mark_previewed(&mut self) -> Result<(), InvalidRunTransition> {
        self.transition(RunState::Previewed)
    }

    /// PREVIEWED → EXECUTING
    pub fn begin_execution(&mut self) -> Result<(), InvalidRunTransition> {
        self.transition(RunState::Executing)
    }

    /// EXECUTING → 终态，并记录结束时间
    pub fn finish(
        &mut self,
        outcome: RunState,
        finished_at: NaiveDateTime,
    ) -> Result<(), InvalidRunTransition> {
        self.transition(outcome)?;
        self.finished_at = Some(finished_at);
        Ok(())
    }
}

// ==========================================
// SkuPreview - 单 SKU 预演结果
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkuPreview {
    pub sku_id: String,           // SKU ID
    pub strategy: String,         // 策略键
    pub lines: Vec<PlanLine>,     // 计划行
    pub legs: Vec<TransferDraft>, // 预估调拨腿
    pub dropped_count: usize,     // 被丢弃的腿数
    pub moved_units: i64,         // 预估搬运量
}

// ==========================================
// SkippedSku - 被跳过的 SKU
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedSku {
    pub sku_id: String, // SKU ID
    pub reason: String, // 跳过原因
}

// ==========================================
// RebalancePreview - 预演汇总 (不落库)
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RebalancePreview {
    pub run_id: String,             // 运行ID
    pub sku_count: usize,           // 圈定 SKU 数
    pub planned: Vec<SkuPreview>,   // 成功预演的 SKU
    pub skipped: Vec<SkippedSku>,   // 被跳过的 SKU
    pub total_legs: usize,          // 预估调拨腿总数
    pub total_moved_units: i64,     // 预估搬运总量
}

// ==========================================
// SkuFailureKind - 单 SKU 失败分类
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SkuFailureKind {
    Conflict,   // 乐观锁冲突且重试耗尽
    Validation, // 输入/数据问题
    Internal,   // 其他内部错误
}

// ==========================================
// SkuExecution - 单 SKU 执行成功记录
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkuExecution {
    pub sku_id: String,          // SKU ID
    pub transfers_created: usize,// 创建的调拨单数
    pub moved_units: i64,        // 搬运量
    pub dropped_count: usize,    // 被丢弃的腿数
    pub retries: u32,            // 冲突重试次数
}

// ==========================================
// SkuFailure - 单 SKU 执行失败记录
// ==========================================
// 舱壁语义: 单 SKU 失败只影响自己，不回滚他人已提交的工作
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkuFailure {
    pub sku_id: String,       // SKU ID
    pub kind: SkuFailureKind, // 失败分类
    pub reason: String,       // 失败原因
}

// ==========================================
// ExecutionSummary - 执行汇总
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub run_id: String,               // 运行ID
    pub state: RunState,              // 终态
    pub succeeded: Vec<SkuExecution>, // 成功 SKU
    pub failed: Vec<SkuFailure>,      // 失败 SKU
    pub total_transfers: usize,       // 创建调拨单总数
    pub total_moved_units: i64,       // 搬运总量
    pub finished_at: NaiveDateTime,   // 结束时间
}

impl ExecutionSummary {
    /// 由成败分布推导终态
    pub fn derive_state(succeeded: usize, failed: usize) -> RunState {
        if failed == 0 {
            RunState::Completed
        } else if succeeded > 0 {
            RunState::PartiallyCompleted
        } else {
            RunState::Failed
        }
    }
}
