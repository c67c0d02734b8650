// ==========================================
// 库存调拨与再平衡引擎 - 操作日志领域模型
// ==========================================
// 红线: 所有外部触发的写入都必须记录
// 用途: 审计追踪，回答"谁在何时改了什么"
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

// ==========================================
// ActionLog - 操作日志
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionLog {
    pub action_id: String,               // 日志ID (UUID)
    pub action_type: String,             // 操作类型 (存储为字符串)
    pub action_ts: NaiveDateTime,        // 操作时间戳
    pub actor: String,                   // 操作人
    pub sku_id: Option<String>,          // 关联 SKU (跨 SKU 操作可为 None)
    pub payload_json: Option<JsonValue>, // 操作参数 (JSON)
    pub detail: Option<String>,          // 详细描述
}

// ==========================================
// ActionType - 操作类型
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionType {
    CreateAllocation,   // 创建分配行
    UpdateAllocation,   // 更新分配行
    PreviewRebalance,   // 再平衡预演
    ExecuteRebalance,   // 再平衡执行
    CreateTransfer,     // 创建调拨单
    DispatchTransfer,   // 调拨发运
    ReceiveTransfer,    // 调拨收货
    CancelTransfer,     // 调拨取消
    GenerateAlerts,     // 告警生成
    AcknowledgeAlert,   // 告警确认
    DismissAlert,       // 告警关闭
    UpdateConfig,       // 配置更新
}

impl ActionType {
    /// 转换为字符串 (用于数据库存储)
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::CreateAllocation => "CreateAllocation",
            ActionType::UpdateAllocation => "UpdateAllocation",
            ActionType::PreviewRebalance => "PreviewRebalance",
            ActionType::ExecuteRebalance => "ExecuteRebalance",
            ActionType::CreateTransfer => "CreateTransfer",
            ActionType::DispatchTransfer => "DispatchTransfer",
            ActionType::ReceiveTransfer => "ReceiveTransfer",
            ActionType::CancelTransfer => "CancelTransfer",
            ActionType::GenerateAlerts => "GenerateAlerts",
            ActionType::AcknowledgeAlert => "AcknowledgeAlert",
            ActionType::DismissAlert => "DismissAlert",
            ActionType::UpdateConfig => "UpdateConfig",
        }
    }

    /// 从字符串解析
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "CreateAllocation" => Some(ActionType::CreateAllocation),
            "UpdateAllocation" => Some(ActionType::UpdateAllocation),
            "PreviewRebalance" => Some(ActionType::PreviewRebalance),
            "ExecuteRebalance" => Some(ActionType::ExecuteRebalance),
            "CreateTransfer" => Some(ActionType::CreateTransfer),
            "DispatchTransfer" => Some(ActionType::DispatchTransfer),
            "ReceiveTransfer" => Some(ActionType::ReceiveTransfer),
            "CancelTransfer" => Some(ActionType::CancelTransfer),
            "GenerateAlerts" => Some(ActionType::GenerateAlerts),
            "AcknowledgeAlert" => Some(ActionType::AcknowledgeAlert),
            "DismissAlert" => Some(ActionType::DismissAlert),
            "UpdateConfig" => Some(ActionType::UpdateConfig),
            _ => None,
        }
    }
}

// ==========================================
// ActionLog 辅助方法
// ==========================================
impl ActionLog {
    /// 创建新的操作日志
    ///
    /// # 参数
    /// - `action_id`: 日志ID (通常使用UUID)
    /// - `action_type`: 操作类型
    /// - `actor`: 操作人
    pub fn new(action_id: String, action_type: ActionType, actor: String) -> Self {
        Self {
            action_id,
            action_type: action_type.as_str().to_string(),
            action_ts: chrono::Utc::now().naive_utc(),
            actor,
            sku_id: None,
            payload_json: None,
            detail: None,
        }
    }

    /// 设置关联 SKU
    pub fn with_sku(mut self, sku_id: &str) -> Self {
        self.sku_id = Some(sku_id.to_string());
        self
    }

    /// 设置操作负载 (转换为JSON)
    pub fn with_payload<T: Serialize>(mut self, payload: &T) -> Self {
        self.payload_json = serde_json::to_value(payload).ok();
        self
    }

    /// 设置详细描述
    pub fn with_detail(mut self, detail: &str) -> Self {
        self.detail = Some(detail.to_string());
        self
    }
}
