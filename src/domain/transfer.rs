// ==========================================
// 库存调拨与再平衡引擎 - 调拨单领域模型
// ==========================================
// 调拨单是再平衡决策与人工指令的可执行产物
// 红线: 创建调拨单不动分配行；库存只在结算(发运/收货/取消)时变动
// ==========================================

use crate::domain::types::TransferStatus;
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

// ==========================================
// TransferOrder - 调拨单
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferOrder {
    pub transfer_id: String,              // 调拨单ID
    pub sku_id: String,                   // SKU ID
    pub from_location_id: String,         // 源库位
    pub to_location_id: String,           // 目的库位
    pub quantity: i64,                    // 调拨量 (> 0)
    pub status: TransferStatus,           // 状态
    pub run_id: Option<String>,           // 来源再平衡运行 (人工单为 None)
    pub requested_at: NaiveDateTime,      // 创建时间
    pub required_by: Option<NaiveDate>,   // 要求到货日期
    pub created_by: String,               // 创建人
    pub dispatched_at: Option<NaiveDateTime>, // 发运时间
    pub received_at: Option<NaiveDateTime>,   // 收货时间
    pub received_by: Option<String>,      // 收货人
    pub cancelled_at: Option<NaiveDateTime>,  // 取消时间
    pub cancel_reason: Option<String>,    // 取消原因
}

impl TransferOrder {
    /// 新建待发运调拨单
    pub fn new_requested(
        transfer_id: &str,
        sku_id: &str,
        from_location_id: &str,
        to_location_id: &str,
        quantity: i64,
        created_by: &str,
        requested_at: NaiveDateTime,
    ) -> Self {
        Self {
            transfer_id: transfer_id.to_string(),
            sku_id: sku_id.to_string(),
            from_location_id: from_location_id.to_string(),
            to_location_id: to_location_id.to_string(),
            quantity,
            status: TransferStatus::Requested,
            run_id: None,
            requested_at,
            required_by: None,
            created_by: created_by.to_string(),
            dispatched_at: None,
            received_at: None,
            received_by: None,
            cancelled_at: None,
            cancel_reason: None,
        }
    }
}

// ==========================================
// TransferRequest - 人工调拨请求
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRequest {
    pub sku_id: String,                 // SKU ID
    pub from_location_id: String,       // 源库位
    pub to_location_id: String,         // 目的库位
    pub quantity: i64,                  // 请求量
    pub required_by: Option<NaiveDate>, // 要求到货日期
}

// ==========================================
// ManualTransferOutcome - 人工调拨结果
// ==========================================
// 容量不足按部分满足返回，不做硬失败；shortfall 永远如实上报
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualTransferOutcome {
    pub transfer_id: Option<String>, // 实际创建的调拨单 (fulfilled=0 时为 None)
    pub requested: i64,              // 请求量
    pub fulfilled: i64,              // 实际满足量 (<= 源库位现货)
    pub shortfall: i64,              // 缺口量 = requested - fulfilled
}

impl ManualTransferOutcome {
    /// 是否发生容量不足（部分或完全无法满足）
    pub fn is_capacity_limited(&self) -> bool {
        self.shortfall > 0
    }
}

// ==========================================
// TransferDraft - 计划派生的调拨腿 (未落库)
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferDraft {
    pub from_location_id: String, // 源库位
    pub to_location_id: String,   // 目的库位
    pub quantity: i64,            // 调拨量
}

// ==========================================
// DroppedLeg - 被约束丢弃的调拨腿
// ==========================================
// 低于最小调拨量的腿被丢弃并如实上报，绝不虚增凑整
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DroppedLeg {
    pub from_location_id: String, // 源库位
    pub to_location_id: String,   // 目的库位
    pub quantity: i64,            // 原始腿量
    pub reason: String,           // 丢弃原因
}

// ==========================================
// TransferDraftSet - 单 SKU 调拨草案集
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferDraftSet {
    pub sku_id: String,             // SKU ID
    pub legs: Vec<TransferDraft>,   // 保留的调拨腿 (数量 <= max_transfers_per_sku)
    pub dropped: Vec<DroppedLeg>,   // 被丢弃的腿
    pub merged_count: usize,        // 合并发生次数
    pub shortfall_units: i64,       // 合并后超出源现货被削减的量
}

impl TransferDraftSet {
    /// 保留腿的总搬运量
    pub fn total_moved(&self) -> i64 {
        self.legs.iter().map(|l| l.quantity).sum()
    }
}

// ==========================================
// TransferFilter - 调拨单查询过滤条件
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct TransferFilter {
    pub sku_id: Option<String>,         // 按 SKU 过滤
    pub status: Option<TransferStatus>, // 按状态过滤
    pub run_id: Option<String>,         // 按来源运行过滤
}
