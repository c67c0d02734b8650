// ==========================================
// 库存调拨与再平衡引擎 - 再平衡策略定义
// ==========================================
// 用途：
// - 预览（不落库试算）与执行（正式提交）使用同一策略键，保证结果可复现；
// - 自动再平衡按业务目标映射到具体策略。

use crate::domain::types::RebalanceObjective;
use serde::{Deserialize, Serialize};

/// 再平衡分配策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebalanceStrategy {
    EqualSplit,
    ProportionalToSales,
    MinimizeStockouts,
    MarginPriority,
}

impl RebalanceStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RebalanceStrategy::EqualSplit => "equal_split",
            RebalanceStrategy::ProportionalToSales => "proportional_to_sales",
            RebalanceStrategy::MinimizeStockouts => "minimize_stockouts",
            RebalanceStrategy::MarginPriority => "margin_priority",
        }
    }

    pub fn title_cn(&self) -> &'static str {
        match self {
            RebalanceStrategy::EqualSplit => "均分策略",
            RebalanceStrategy::ProportionalToSales => "按销分配",
            RebalanceStrategy::MinimizeStockouts => "缺货最小化",
            RebalanceStrategy::MarginPriority => "毛利优先",
        }
    }

    /// 业务目标到策略的映射（自动再平衡入口）
    pub fn for_objective(objective: RebalanceObjective) -> Self {
        match objective {
            RebalanceObjective::MinimizeStockouts => RebalanceStrategy::MinimizeStockouts,
            RebalanceObjective::BalanceForecast => RebalanceStrategy::ProportionalToSales,
            RebalanceObjective::PromoPriority => RebalanceStrategy::MarginPriority,
        }
    }
}

impl Default for RebalanceStrategy {
    fn default() -> Self {
        RebalanceStrategy::EqualSplit
    }
}

impl std::str::FromStr for RebalanceStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "equal_split" | "equal-split" => Ok(RebalanceStrategy::EqualSplit),
            "proportional_to_sales" | "proportional-to-sales" => {
                Ok(RebalanceStrategy::ProportionalToSales)
            }
            "minimize_stockouts" | "minimize-stockouts" => Ok(RebalanceStrategy::MinimizeStockouts),
            "margin_priority" | "margin-priority" => Ok(RebalanceStrategy::MarginPriority),
            other => Err(format!("未知策略类型: {}", other)),
        }
    }
}
