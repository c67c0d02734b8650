// ==========================================
// 库存调拨与再平衡引擎 - 告警评估引擎
// ==========================================
// 红线: 只评估不落库; 去重与状态迁移由告警仓储负责
// 红线: 阈值一律来自配置，不得硬编码业务常数
// ==========================================
// 输入: 分配行快照 + 批次效期元数据
// 输出: AlertCandidate 列表 (reason 为机器可读 JSON)
// ==========================================

use crate::config::PolicyConfigReader;
use crate::domain::alert::AlertCandidate;
use crate::domain::allocation::Allocation;
use crate::domain::types::{AlertSeverity, AlertType};
use crate::engine::signals::BatchLot;
use chrono::NaiveDate;
use serde_json::json;
use std::collections::HashMap;
use std::error::Error;
use std::sync::Arc;
use tracing::instrument;

// ==========================================
// AlertEngine - 告警评估引擎
// ==========================================
pub struct AlertEngine<C>
where
    C: PolicyConfigReader,
{
    config: Arc<C>,
}

impl<C> AlertEngine<C>
where
    C: PolicyConfigReader,
{
    /// 创建新的 AlertEngine 实例
    ///
    /// # 参数
    /// - config: 配置读取器
    pub fn new(config: Arc<C>) -> Self {
        Self { config }
    }

    /// 低库存评估
    ///
    /// 口径: ratio = on_hand / max(target, 1)
    /// - ratio < critical_ratio -> CRITICAL
    /// - ratio < warning_ratio  -> WARNING
    /// target = 0 的行 (退役/在途占位) 无补货预期，不参与评估。
    #[instrument(skip(self, allocations))]
    pub async fn evaluate_low_stock(
        &self,
        allocations: &[Allocation],
    ) -> Result<Vec<AlertCandidate>, Box<dyn Error>> {
        let warning_ratio = self.config.get_low_stock_warning_ratio().await?;
        let critical_ratio = self.config.get_low_stock_critical_ratio().await?;

        let mut candidates = Vec::new();

        for row in allocations {
            if row.target == 0 {
                continue;
            }

            let ratio = row.fill_ratio();
            let severity = if ratio < critical_ratio {
                AlertSeverity::Critical
            } else if ratio < warning_ratio {
                AlertSeverity::Warning
            } else {
                continue;
            };

            let reason = json!({
                "rule": "low_stock",
                "on_hand": row.on_hand,
                "target": row.target,
                "ratio": ratio,
                "warning_ratio": warning_ratio,
                "critical_ratio": critical_ratio,
            })
            .to_string();

            candidates.push(AlertCandidate {
                sku_id: row.sku_id.clone(),
                location_id: row.location_id.clone(),
                alert_type: AlertType::LowStock,
                severity,
                reason,
            });
        }

        tracing::debug!(
            evaluated = allocations.len(),
            candidates = candidates.len(),
            "低库存评估完成"
        );

        Ok(candidates)
    }

    /// 临期评估
    ///
    /// 口径: days_to_expiry = expiry_date - today
    /// - days <= critical_days (含已过期的负值) -> CRITICAL
    /// - days <= window_days                    -> WARNING
    /// 同一 (SKU, 库位) 取最差批次产出一条候选。
    #[instrument(skip(self, batches))]
    pub async fn evaluate_expiry(
        &self,
        batches: &[BatchLot],
        today: NaiveDate,
    ) -> Result<Vec<AlertCandidate>, Box<dyn Error>> {
        let window_days = self.config.get_expiry_window_days().await?;
        let critical_days = self.config.get_expiry_critical_days().await?;

        // 同身份取最差批次，身份按首次出现序输出
        let mut order: Vec<(String, String)> = Vec::new();
        let mut worst: HashMap<(String, String), &BatchLot> = HashMap::new();

        for lot in batches {
            let days = lot.days_to_expiry(today);
            if days > window_days {
                continue;
            }

            let key = (lot.sku_id.clone(), lot.location_id.clone());
            let current_days = worst.get(&key).map(|l| l.days_to_expiry(today));
            match current_days {
                Some(d) if d <= days => {}
                Some(_) => {
                    worst.insert(key, lot);
                }
                None => {
                    order.push(key.clone());
                    worst.insert(key, lot);
                }
            }
        }

        let mut candidates = Vec::new();
        for key in order {
            let lot = match worst.get(&key) {
                Some(lot) => *lot,
                None => continue,
            };
            let days = lot.days_to_expiry(today);
            let severity = if days <= critical_days {
                AlertSeverity::Critical
            } else {
                AlertSeverity::Warning
            };

            let reason = json!({
                "rule": "expiry",
                "batch_id": lot.batch_id,
                "quantity": lot.quantity,
                "expiry_date": lot.expiry_date.format("%Y-%m-%d").to_string(),
                "days_to_expiry": days,
                "window_days": window_days,
                "critical_days": critical_days,
            })
            .to_string();

            candidates.push(AlertCandidate {
                sku_id: lot.sku_id.clone(),
                location_id: lot.location_id.clone(),
                alert_type: AlertType::Expiry,
                severity,
                reason,
            });
        }

        tracing::debug!(
            batches = batches.len(),
            candidates = candidates.len(),
            "临期评估完成"
        );

        Ok(candidates)
    }

    /// 全量评估: 低库存 + 临期
    pub async fn evaluate_all(
        &self,
        allocations: &[Allocation],
        batches: &[BatchLot],
        today: NaiveDate,
    ) -> Result<Vec<AlertCandidate>, Box<dyn Error>> {
        let mut candidates = self.evaluate_low_stock(allocations).await?;
        candidates.extend(self.evaluate_expiry(batches, today).await?);
        Ok(candidates)
    }
}
