// ==========================================
// 库存调拨与再平衡引擎 - 再平衡计划器
// ==========================================
// 职责: 按策略把 SKU 的总现货重新分配到各库位，产出目标份额计划
// 红线: 纯计算，不读库不写库
// 红线: 守恒 Σ proposed == Σ on_hand; 任何份额不得为负
// 红线: 同序输入必得同序同值输出 (可复现)
// ==========================================

use crate::domain::allocation::Allocation;
use crate::domain::rebalance::{PlanLine, RebalancePlan};
use crate::engine::signals::SignalSnapshot;
use crate::engine::strategy::RebalanceStrategy;
use thiserror::Error;

// ==========================================
// PlanError - 计划输入错误
// ==========================================
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("再平衡计划输入为空")]
    EmptyInput,

    #[error("分配行跨 SKU: expected={expected}, found={found}")]
    MixedSku { expected: String, found: String },
}

// ==========================================
// RebalancePlanner - 再平衡计划器
// ==========================================
pub struct RebalancePlanner;

impl RebalancePlanner {
    /// 为单 SKU 产出再平衡计划
    ///
    /// # 参数
    /// - allocations: 该 SKU 的分配行快照 (入库顺序)
    /// - strategy: 分配策略
    /// - signals: 销量/毛利信号快照 (权重缺失按 0)
    ///
    /// # 返回
    /// - RebalancePlan: 每库位一条计划行，行序与输入一致
    pub fn plan(
        allocations: &[Allocation],
        strategy: RebalanceStrategy,
        signals: &SignalSnapshot,
    ) -> Result<RebalancePlan, PlanError> {
        let first = allocations.first().ok_or(PlanError::EmptyInput)?;
        let sku_id = first.sku_id.clone();

        for row in allocations {
            if row.sku_id != sku_id {
                return Err(PlanError::MixedSku {
                    expected: sku_id,
                    found: row.sku_id.clone(),
                });
            }
        }

        let total: i64 = allocations.iter().map(|a| a.on_hand).sum();

        let shares = match strategy {
            RebalanceStrategy::EqualSplit => apportion_equal(total, allocations.len()),
            RebalanceStrategy::ProportionalToSales => {
                let weights: Vec<f64> = allocations
                    .iter()
                    .map(|a| signals.demand_weight(&a.location_id).max(0.0))
                    .collect();
                apportion_weighted(total, &weights)
            }
            RebalanceStrategy::MarginPriority => {
                let weights: Vec<f64> = allocations
                    .iter()
                    .map(|a| signals.margin_weight(&a.location_id).max(0.0))
                    .collect();
                apportion_weighted(total, &weights)
            }
            RebalanceStrategy::MinimizeStockouts => fill_gaps_then_spread(allocations, total),
        };

        let lines: Vec<PlanLine> = allocations
            .iter()
            .zip(shares.iter())
            .map(|(row, share)| PlanLine {
                location_id: row.location_id.clone(),
                current_target: row.target,
                proposed_target: *share,
            })
            .collect();

        let plan = RebalancePlan {
            sku_id: sku_id.clone(),
            strategy: strategy.as_str().to_string(),
            total_on_hand: total,
            lines,
        };

        tracing::debug!(
            sku_id = %sku_id,
            strategy = strategy.as_str(),
            total_on_hand = total,
            changed = plan.changed_line_count(),
            "再平衡计划完成"
        );

        Ok(plan)
    }
}

/// 均分: 向下取整，余数并入末位
fn apportion_equal(total: i64, n: usize) -> Vec<i64> {
    if n == 0 {
        return Vec::new();
    }
    let n_i64 = n as i64;
    let base = total / n_i64;
    let remainder = total - base * n_i64;

    let mut shares = vec![base; n];
    if let Some(last) = shares.last_mut() {
        *last += remainder;
    }
    shares
}

/// 按权重分摊: 非末位四舍五入并夹取到剩余池，末位取余
///
/// 权重全零时退化为均分。
fn apportion_weighted(total: i64, weights: &[f64]) -> Vec<i64> {
    let n = weights.len();
    if n == 0 {
        return Vec::new();
    }

    let sum_w: f64 = weights.iter().sum();
    if sum_w <= 0.0 {
        return apportion_equal(total, n);
    }

    let mut shares = Vec::with_capacity(n);
    let mut remaining = total;

    for (i, w) in weights.iter().enumerate() {
        if i == n - 1 {
            shares.push(remaining);
        } else {
            let raw = (total as f64 * w / sum_w).round() as i64;
            let share = raw.clamp(0, remaining);
            remaining -= share;
            shares.push(share);
        }
    }

    shares
}

/// 缺货最小化: 两阶段分配
///
/// 阶段一 按缺口比例给缺货库位补到目标为止（缺口 = max(target - on_hand, 0)，
/// 份额封顶于该库位 target）；阶段二 把剩余池对全部库位均分。
/// 无任何缺口时退化为均分。
fn fill_gaps_then_spread(allocations: &[Allocation], total: i64) -> Vec<i64> {
    let n = allocations.len();
    let gaps: Vec<i64> = allocations
        .iter()
        .map(|a| (a.target - a.on_hand).max(0))
        .collect();
    let sum_gap: i64 = gaps.iter().sum();

    if sum_gap == 0 {
        return apportion_equal(total, n);
    }

    let mut shares = vec![0i64; n];
    let mut remaining = total;

    // 阶段一: 缺口比例分摊，封顶于各自 target
    for (i, gap) in gaps.iter().enumerate() {
        if *gap == 0 || remaining == 0 {
            continue;
        }
        let raw = (total as f64 * *gap as f64 / sum_gap as f64).round() as i64;
        let share = raw.clamp(0, remaining).min(allocations[i].target);
        shares[i] = share;
        remaining -= share;
    }

    // 阶段二: 剩余池对全部库位均分
    if remaining > 0 {
        let extra = apportion_equal(remaining, n);
        for (share, add) in shares.iter_mut().zip(extra.iter()) {
            *share += add;
        }
    }

    shares
}
