// ==========================================
// 库存调拨与再平衡引擎 - 库存分配领域模型
// ==========================================
// 分配行是系统中唯一的可变核心实体
// 红线: 分配行只能经由三条路径变更 —
//   1) 显式的 update_allocation 操作(带期望修订号)
//   2) 再平衡提交(规划引擎产出的目标差异)
//   3) 调拨单结算(发运/收货/取消)
// ==========================================

use crate::domain::types::LocationRole;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// Allocation - 库存分配行
// ==========================================
// 唯一键: (sku_id, location_id)；revision 为乐观锁修订号
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Allocation {
    pub allocation_id: String,     // 分配行ID
    pub sku_id: String,            // SKU ID
    pub location_id: String,       // 库位ID
    pub allocated: i64,            // 计划份额
    pub target: i64,               // 目标稳态份额 (0 = 退役该库位)
    pub on_hand: i64,              // 现货量 (>= 0)
    pub in_transit: i64,           // 在途量 (>= 0)
    pub safety_stock: i64,         // 安全库存
    pub revision: i32,             // 乐观锁：修订号
    pub updated_at: NaiveDateTime, // 更新时间
    pub updated_by: Option<String>,// 更新人
}

impl Allocation {
    /// 现货充足率 = on_hand / max(target, 1)
    ///
    /// target 为 0 的退役库位按 1 计算分母，避免除零
    pub fn fill_ratio(&self) -> f64 {
        self.on_hand as f64 / (self.target.max(1)) as f64
    }

    /// 计划充足率 = allocated / max(target, 1)，用于高优先级圈定
    pub fn allocated_ratio(&self) -> f64 {
        self.allocated as f64 / (self.target.max(1)) as f64
    }

    /// 缺口量 (目标高于现货的部分)
    pub fn shortage(&self) -> i64 {
        (self.target - self.on_hand).max(0)
    }

    /// 盈余量 (现货高于目标的部分)
    pub fn surplus(&self) -> i64 {
        (self.on_hand - self.target).max(0)
    }

    /// 是否已退役 (target = 0 表示不再向该库位供货)
    pub fn is_retired(&self) -> bool {
        self.target == 0
    }
}

// ==========================================
// AllocationPatch - 分配行字段更新
// ==========================================
// None 表示该字段保持不变；校验(非负等)由仓储层兜底
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AllocationPatch {
    pub allocated: Option<i64>,    // 计划份额
    pub target: Option<i64>,       // 目标份额
    pub on_hand: Option<i64>,      // 现货量
    pub in_transit: Option<i64>,   // 在途量
    pub safety_stock: Option<i64>, // 安全库存
}

impl AllocationPatch {
    /// 是否为空更新（所有字段均未给出）
    pub fn is_empty(&self) -> bool {
        self.allocated.is_none()
            && self.target.is_none()
            && self.on_hand.is_none()
            && self.in_transit.is_none()
            && self.safety_stock.is_none()
    }

    /// 将补丁应用到分配行副本上（用于预演与校验）
    pub fn apply_to(&self, base: &Allocation) -> Allocation {
        let mut next = base.clone();
        if let Some(v) = self.allocated {
            next.allocated = v;
        }
        if let Some(v) = self.target {
            next.target = v;
        }
        if let Some(v) = self.on_hand {
            next.on_hand = v;
        }
        if let Some(v) = self.in_transit {
            next.in_transit = v;
        }
        if let Some(v) = self.safety_stock {
            next.safety_stock = v;
        }
        next
    }
}

// ==========================================
// LocationAllocationView - 单库位分配视图
// ==========================================
// 聚合输出: 参照数据缺失时以 "Unknown" 兜底，绝不丢行
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationAllocationView {
    pub allocation_id: String,      // 分配行ID
    pub location_id: String,        // 库位ID
    pub location_name: String,      // 库位名称 (缺失时 "Unknown")
    pub role: Option<LocationRole>, // 库位角色 (参照缺失时 None)
    pub allocated: i64,             // 计划份额
    pub target: i64,                // 目标份额
    pub on_hand: i64,               // 现货量
    pub in_transit: i64,            // 在途量
    pub safety_stock: i64,          // 安全库存
    pub revision: i32,              // 乐观锁修订号
}

// ==========================================
// SkuAllocationView - 单 SKU 聚合视图
// ==========================================
// 行序保持入库顺序，不做隐式排序
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkuAllocationView {
    pub sku_id: String,            // SKU ID
    pub sku_code: String,          // SKU 编码 (缺失时 "Unknown")
    pub sku_name: String,          // SKU 名称 (缺失时 "Unknown")
    pub category: Option<String>,  // 品类
    pub pack_size: i32,            // 箱规 (参照缺失时 1)
    pub total_on_hand: i64,        // 总现货 = Σ on_hand
    pub total_target: i64,         // 总目标 = Σ target
    pub total_in_transit: i64,     // 总在途 = Σ in_transit
    pub locations: Vec<LocationAllocationView>, // 各库位明细
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn make_allocation(on_hand: i64, target: i64) -> Allocation {
        Allocation {
            allocation_id: "A1".to_string(),
            sku_id: "SKU001".to_string(),
            location_id: "L001".to_string(),
            allocated: 0,
            target,
            on_hand,
            in_transit: 0,
            safety_stock: 0,
            revision: 0,
            updated_at: NaiveDate::from_ymd_opt(2026, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            updated_by: None,
        }
    }

    #[test]
    fn test_fill_ratio_guards_zero_target() {
        let a = make_allocation(40, 0);
        // 退役库位分母按 1 计
        assert_eq!(a.fill_ratio(), 40.0);
        assert!(a.is_retired());
    }

    #[test]
    fn test_shortage_and_surplus() {
        let a = make_allocation(40, 100);
        assert_eq!(a.shortage(), 60);
        assert_eq!(a.surplus(), 0);

        let b = make_allocation(120, 100);
        assert_eq!(b.shortage(), 0);
        assert_eq!(b.surplus(), 20);
    }

    #[test]
    fn test_patch_apply_partial() {
        let base = make_allocation(40, 100);
        let patch = AllocationPatch {
            target: Some(80),
            ..Default::default()
        };
        let next = patch.apply_to(&base);
        assert_eq!(next.target, 80);
        assert_eq!(next.on_hand, 40); // 未给出的字段不变
        assert!(!patch.is_empty());
        assert!(AllocationPatch::default().is_empty());
    }
}
