// ==========================================
// 库存调拨与再平衡引擎 - SKU 聚合器
// ==========================================
// 职责: 把扁平分配行按 SKU 分组为聚合视图
// 红线: 不做隐式排序; SKU 按首次出现序, SKU 内保持行序
// 红线: 参照数据缺失以 "Unknown" 兜底, 绝不丢行
// ==========================================

use crate::domain::allocation::{Allocation, LocationAllocationView, SkuAllocationView};
use crate::domain::location::Location;
use crate::domain::sku::Sku;
use std::collections::HashMap;

// ==========================================
// SkuAggregator - 无状态聚合器
// ==========================================
pub struct SkuAggregator;

impl SkuAggregator {
    /// 聚合扁平分配行为单 SKU 视图列表
    ///
    /// # 参数
    /// - rows: 分配行 (保持仓储返回的入库顺序)
    /// - sku_index: sku_id -> Sku 参照
    /// - location_index: location_id -> Location 参照
    ///
    /// # 返回
    /// - Vec<SkuAllocationView>: SKU 按行中首次出现的顺序排列
    pub fn aggregate(
        rows: &[Allocation],
        sku_index: &HashMap<String, Sku>,
        location_index: &HashMap<String, Location>,
    ) -> Vec<SkuAllocationView> {
        let mut order: Vec<String> = Vec::new();
        let mut grouped: HashMap<String, SkuAllocationView> = HashMap::new();

        for row in rows {
            let view = grouped.entry(row.sku_id.clone()).or_insert_with(|| {
                order.push(row.sku_id.clone());
                Self::empty_view(&row.sku_id, sku_index)
            });

            view.total_on_hand += row.on_hand;
            view.total_target += row.target;
            view.total_in_transit += row.in_transit;
            view.locations.push(Self::location_view(row, location_index));
        }

        order
            .into_iter()
            .filter_map(|sku_id| grouped.remove(&sku_id))
            .collect()
    }

    /// 单 SKU 版本: 行全部属于同一 SKU 时的便捷入口
    pub fn aggregate_one(
        sku_id: &str,
        rows: &[Allocation],
        sku_index: &HashMap<String, Sku>,
        location_index: &HashMap<String, Location>,
    ) -> SkuAllocationView {
        let mut view = Self::empty_view(sku_id, sku_index);

        for row in rows {
            view.total_on_hand += row.on_hand;
            view.total_target += row.target;
            view.total_in_transit += row.in_transit;
            view.locations.push(Self::location_view(row, location_index));
        }

        view
    }

    fn empty_view(sku_id: &str, sku_index: &HashMap<String, Sku>) -> SkuAllocationView {
        match sku_index.get(sku_id) {
            Some(sku) => SkuAllocationView {
                sku_id: sku_id.to_string(),
                sku_code: sku.sku_code.clone(),
                sku_name: sku.sku_name.clone(),
                category: sku.category.clone(),
                pack_size: sku.pack_size,
                total_on_hand: 0,
                total_target: 0,
                total_in_transit: 0,
                locations: Vec::new(),
            },
            None => SkuAllocationView {
                sku_id: sku_id.to_string(),
                sku_code: "Unknown".to_string(),
                sku_name: "Unknown".to_string(),
                category: None,
                pack_size: 1,
                total_on_hand: 0,
                total_target: 0,
                total_in_transit: 0,
                locations: Vec::new(),
            },
        }
    }

    fn location_view(
        row: &Allocation,
        location_index: &HashMap<String, Location>,
    ) -> LocationAllocationView {
        let (location_name, role) = match location_index.get(&row.location_id) {
            Some(location) => (location.location_name.clone(), Some(location.role)),
            None => ("Unknown".to_string(), None),
        };

        LocationAllocationView {
            allocation_id: row.allocation_id.clone(),
            location_id: row.location_id.clone(),
            location_name,
            role,
            allocated: row.allocated,
            target: row.target,
            on_hand: row.on_hand,
            in_transit: row.in_transit,
            safety_stock: row.safety_stock,
            revision: row.revision,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::LocationRole;
    use chrono::NaiveDate;

    fn alloc(sku_id: &str, location_id: &str, on_hand: i64, target: i64) -> Allocation {
        Allocation {
            allocation_id: format!("A-{}-{}", sku_id, location_id),
            sku_id: sku_id.to_string(),
            location_id: location_id.to_string(),
            allocated: target,
            target,
            on_hand,
            in_transit: 0,
            safety_stock: 0,
            revision: 0,
            updated_at: NaiveDate::from_ymd_opt(2025, 1, 14)
                .unwrap()
                .and_hms_opt(8, 0, 0)
                .unwrap(),
            updated_by: None,
        }
    }

    fn sku_index() -> HashMap<String, Sku> {
        let mut index = HashMap::new();
        index.insert(
            "SKU001".to_string(),
            Sku {
                sku_id: "SKU001".to_string(),
                sku_code: "CODE.001".to_string(),
                sku_name: "苹果汁 1L".to_string(),
                pack_size: 12,
                category: Some("饮料".to_string()),
                created_at: NaiveDate::from_ymd_opt(2025, 1, 1)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap(),
                updated_at: NaiveDate::from_ymd_opt(2025, 1, 1)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap(),
            },
        );
        index
    }

    fn location_index() -> HashMap<String, Location> {
        let mut index = HashMap::new();
        index.insert(
            "L001".to_string(),
            Location::new("L001", "华东中心仓", LocationRole::CentralWarehouse),
        );
        index
    }

    #[test]
    fn test_aggregate_groups_by_first_seen_order() {
        let rows = vec![
            alloc("SKU002", "L001", 10, 20),
            alloc("SKU001", "L001", 30, 40),
            alloc("SKU002", "L002", 5, 10),
        ];

        let views = SkuAggregator::aggregate(&rows, &sku_index(), &location_index());

        assert_eq!(views.len(), 2);
        assert_eq!(views[0].sku_id, "SKU002");
        assert_eq!(views[1].sku_id, "SKU001");
        assert_eq!(views[0].total_on_hand, 15);
        assert_eq!(views[0].total_target, 30);
        assert_eq!(views[0].locations.len(), 2);
        // SKU 内保持行序
        assert_eq!(views[0].locations[0].location_id, "L001");
        assert_eq!(views[0].locations[1].location_id, "L002");
    }

    #[test]
    fn test_missing_reference_falls_back_to_unknown() {
        let rows = vec![alloc("SKU999", "L999", 7, 7)];

        let views = SkuAggregator::aggregate(&rows, &sku_index(), &location_index());

        assert_eq!(views.len(), 1);
        assert_eq!(views[0].sku_code, "Unknown");
        assert_eq!(views[0].pack_size, 1);
        assert_eq!(views[0].locations[0].location_name, "Unknown");
        assert!(views[0].locations[0].role.is_none());
    }

    #[test]
    fn test_aggregate_empty_input() {
        let views = SkuAggregator::aggregate(&[], &sku_index(), &location_index());
        assert!(views.is_empty());
    }

    #[test]
    fn test_aggregate_one_totals() {
        let rows = vec![
            alloc("SKU001", "L001", 100, 80),
            alloc("SKU001", "L002", 50, 120),
        ];

        let view = SkuAggregator::aggregate_one("SKU001", &rows, &sku_index(), &location_index());

        assert_eq!(view.sku_code, "CODE.001");
        assert_eq!(view.total_on_hand, 150);
        assert_eq!(view.total_target, 200);
        assert_eq!(view.locations.len(), 2);
    }
}
