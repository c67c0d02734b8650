// ==========================================
// 库存调拨与再平衡引擎 - 调拨腿生成器
// ==========================================
// 职责: 把计划的目标份额差转化为库位间调拨腿草案
// 红线: 纯计算，不落库；丢弃/合并/缩量一律如实上报，绝不虚增凑整
// 红线: 同序输入必得同序同值输出 (可复现)
// ==========================================

use crate::domain::allocation::Allocation;
use crate::domain::rebalance::{RebalanceConstraints, RebalancePlan};
use crate::domain::transfer::{DroppedLeg, TransferDraft, TransferDraftSet};
use std::collections::HashMap;

// ==========================================
// TransferGenerator - 调拨腿生成器
// ==========================================
pub struct TransferGenerator;

impl TransferGenerator {
    /// 从计划派生调拨腿草案
    ///
    /// 流程:
    /// 1. 每库位差量 = proposed_target - on_hand，正为缺、负为盈
    /// 2. 盈余库位与缺口库位按输入顺序贪心配对
    /// 3. 低于最小调拨量的腿丢弃并上报
    /// 4. 腿数超上限时，最小腿并入量级最接近的腿，直至满足上限
    /// 5. 合并后按源库位现货重新封顶，超出部分计入 shortfall_units
    pub fn draft_from_plan(
        plan: &RebalancePlan,
        allocations: &[Allocation],
        constraints: &RebalanceConstraints,
    ) -> TransferDraftSet {
        let on_hand_index: HashMap<&str, i64> = allocations
            .iter()
            .map(|a| (a.location_id.as_str(), a.on_hand))
            .collect();

        // 步骤 1: 差量拆分为盈余与缺口 (保持计划行序)
        let mut surpluses: Vec<(String, i64)> = Vec::new();
        let mut deficits: Vec<(String, i64)> = Vec::new();

        for line in &plan.lines {
            let on_hand = on_hand_index
                .get(line.location_id.as_str())
                .copied()
                .unwrap_or(0);
            let delta = line.proposed_target - on_hand;
            if delta > 0 {
                deficits.push((line.location_id.clone(), delta));
            } else if delta < 0 {
                surpluses.push((line.location_id.clone(), -delta));
            }
        }

        // 步骤 2: 双指针贪心配对
        let mut raw_legs: Vec<TransferDraft> = Vec::new();
        let mut si = 0;
        let mut di = 0;

        while si < surpluses.len() && di < deficits.len() {
            let give = surpluses[si].1;
            let need = deficits[di].1;
            let qty = give.min(need);

            raw_legs.push(TransferDraft {
                from_location_id: surpluses[si].0.clone(),
                to_location_id: deficits[di].0.clone(),
                quantity: qty,
            });

            surpluses[si].1 -= qty;
            deficits[di].1 -= qty;
            if surpluses[si].1 == 0 {
                si += 1;
            }
            if deficits[di].1 == 0 {
                di += 1;
            }
        }

        // 步骤 3: 最小调拨量过滤
        let mut dropped: Vec<DroppedLeg> = Vec::new();
        let mut legs: Vec<TransferDraft> = Vec::new();
        for leg in raw_legs {
            if leg.quantity < constraints.min_transfer_quantity {
                dropped.push(DroppedLeg {
                    from_location_id: leg.from_location_id,
                    to_location_id: leg.to_location_id,
                    quantity: leg.quantity,
                    reason: format!(
                        "低于最小调拨量 {} < {}",
                        leg.quantity, constraints.min_transfer_quantity
                    ),
                });
            } else {
                legs.push(leg);
            }
        }

        // 步骤 4: 腿数上限合并
        let mut merged_count = 0usize;
        let cap = constraints.max_transfers_per_sku.max(1);
        while legs.len() > cap {
            let smallest = smallest_leg_index(&legs);
            let absorber = nearest_leg_index(&legs, smallest);
            let absorbed = legs.remove(smallest);
            let absorber = if absorber > smallest {
                absorber - 1
            } else {
                absorber
            };
            legs[absorber].quantity += absorbed.quantity;
            merged_count += 1;
        }

        // 步骤 5: 合并改道后按源库位现货封顶
        let mut shortfall_units = 0i64;
        let mut outflow: HashMap<String, i64> = HashMap::new();
        let mut capped_legs: Vec<TransferDraft> = Vec::new();
        for mut leg in legs {
            let available = on_hand_index
                .get(leg.from_location_id.as_str())
                .copied()
                .unwrap_or(0);
            let spent = outflow.entry(leg.from_location_id.clone()).or_insert(0);
            let allowed = (available - *spent).max(0);

            if leg.quantity > allowed {
                shortfall_units += leg.quantity - allowed;
                leg.quantity = allowed;
            }
            if leg.quantity == 0 {
                dropped.push(DroppedLeg {
                    from_location_id: leg.from_location_id,
                    to_location_id: leg.to_location_id,
                    quantity: 0,
                    reason: "源库位现货不足".to_string(),
                });
                continue;
            }
            *spent += leg.quantity;
            capped_legs.push(leg);
        }

        TransferDraftSet {
            sku_id: plan.sku_id.clone(),
            legs: capped_legs,
            dropped,
            merged_count,
            shortfall_units,
        }
    }

    /// 人工调拨的可满足量: 以源库位现货封顶，绝不超发
    pub fn manual_fulfillable(requested: i64, available: i64) -> i64 {
        requested.min(available.max(0))
    }
}

/// 最小量腿的下标 (同量取较早者)
fn smallest_leg_index(legs: &[TransferDraft]) -> usize {
    let mut best = 0;
    for (i, leg) in legs.iter().enumerate().skip(1) {
        if leg.quantity < legs[best].quantity {
            best = i;
        }
    }
    best
}

/// 量级最接近的吸收腿下标 (差相同先取量大者，再取较早者)
fn nearest_leg_index(legs: &[TransferDraft], exclude: usize) -> usize {
    let base = legs[exclude].quantity;
    let mut best: Option<usize> = None;

    for (i, leg) in legs.iter().enumerate() {
        if i == exclude {
            continue;
        }
        let candidate_delta = (leg.quantity - base).abs();
        match best {
            None => best = Some(i),
            Some(b) => {
                let best_delta = (legs[b].quantity - base).abs();
                if candidate_delta < best_delta
                    || (candidate_delta == best_delta && leg.quantity > legs[b].quantity)
                {
                    best = Some(i);
                }
            }
        }
    }

    // 调用方保证 legs.len() > 1
    best.unwrap_or(0)
}
