// ==========================================
// 库存调拨与再平衡引擎 - 告警领域模型
// ==========================================
// 告警是派生的例外记录，自然身份 = (sku, location, alert_type)
// 同一身份最多一条未关闭告警；关闭后条件复发则生成新记录
// ==========================================

use crate::domain::types::{AlertSeverity, AlertStatus, AlertType};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// Alert - 告警记录
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub alert_id: String,                   // 告警ID
    pub sku_id: String,                     // SKU ID
    pub location_id: String,                // 库位ID
    pub alert_type: AlertType,              // 告警类型
    pub severity: AlertSeverity,            // 告警级别
    pub status: AlertStatus,                // 告警状态
    pub reason: Option<String>,             // 触发原因 (JSON，可解释性)
    pub triggered_at: NaiveDateTime,        // 触发时间
    pub acknowledged_at: Option<NaiveDateTime>, // 确认时间
    pub acknowledged_by: Option<String>,    // 确认人
    pub resolved_at: Option<NaiveDateTime>, // 消除时间
    pub dismissed_at: Option<NaiveDateTime>,// 关闭时间
    pub dismissed_by: Option<String>,       // 关闭人
}

impl Alert {
    /// 是否未关闭（参与去重）
    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }

    /// 告警自然身份键
    pub fn identity(&self) -> AlertIdentity {
        AlertIdentity {
            sku_id: self.sku_id.clone(),
            location_id: self.location_id.clone(),
            alert_type: self.alert_type,
        }
    }
}

// ==========================================
// AlertIdentity - 告警自然身份
// ==========================================
// 去重与自动消除均以该键为口径
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AlertIdentity {
    pub sku_id: String,        // SKU ID
    pub location_id: String,   // 库位ID
    pub alert_type: AlertType, // 告警类型
}

// ==========================================
// AlertCandidate - 评估产出的告警候选
// ==========================================
// 引擎只评估不落库；落库与去重由 API 层完成
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertCandidate {
    pub sku_id: String,          // SKU ID
    pub location_id: String,     // 库位ID
    pub alert_type: AlertType,   // 告警类型
    pub severity: AlertSeverity, // 告警级别
    pub reason: String,          // 触发原因 (JSON)
}

impl AlertCandidate {
    /// 候选对应的自然身份键
    pub fn identity(&self) -> AlertIdentity {
        AlertIdentity {
            sku_id: self.sku_id.clone(),
            location_id: self.location_id.clone(),
            alert_type: self.alert_type,
        }
    }
}

// ==========================================
// AlertFilter - 告警查询过滤条件
// ==========================================
// None 表示该维度不过滤
#[derive(Debug, Clone, Default)]
pub struct AlertFilter {
    pub sku_id: Option<String>,          // 按 SKU 过滤
    pub location_id: Option<String>,     // 按库位过滤
    pub alert_type: Option<AlertType>,   // 按类型过滤
    pub status: Option<AlertStatus>,     // 按状态过滤
    pub severity: Option<AlertSeverity>, // 按级别过滤
    pub only_open: bool,                 // 只看未关闭
}
