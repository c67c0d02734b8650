// ==========================================
// 库存调拨与再平衡引擎 - 领域类型定义
// ==========================================
// 序列化格式: SCREAMING_SNAKE_CASE (与数据库一致)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 库位角色 (Location Role)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LocationRole {
    CentralWarehouse, // 中心仓
    Hub,              // 区域枢纽
    Store,            // 门店
}

impl fmt::Display for LocationRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocationRole::CentralWarehouse => write!(f, "CENTRAL_WAREHOUSE"),
            LocationRole::Hub => write!(f, "HUB"),
            LocationRole::Store => write!(f, "STORE"),
        }
    }
}

impl LocationRole {
    /// 从字符串解析库位角色
    pub fn from_str(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "CENTRAL_WAREHOUSE" => LocationRole::CentralWarehouse,
            "HUB" => LocationRole::Hub,
            "STORE" => LocationRole::Store,
            _ => LocationRole::Store, // 默认值
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            LocationRole::CentralWarehouse => "CENTRAL_WAREHOUSE",
            LocationRole::Hub => "HUB",
            LocationRole::Store => "STORE",
        }
    }
}

// ==========================================
// 告警类型 (Alert Type)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    LowStock, // 低库存
    Expiry,   // 临期/过期
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertType::LowStock => write!(f, "LOW_STOCK"),
            AlertType::Expiry => write!(f, "EXPIRY"),
        }
    }
}

impl AlertType {
    /// 从字符串解析告警类型
    pub fn from_str(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "LOW_STOCK" => AlertType::LowStock,
            "EXPIRY" => AlertType::Expiry,
            _ => AlertType::LowStock, // 默认值
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            AlertType::LowStock => "LOW_STOCK",
            AlertType::Expiry => "EXPIRY",
        }
    }
}

// ==========================================
// 告警级别 (Alert Severity)
// ==========================================
// 顺序: Info < Warning < Critical
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertSeverity {
    Info,     // 提示
    Warning,  // 预警
    Critical, // 严重
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertSeverity::Info => write!(f, "INFO"),
            AlertSeverity::Warning => write!(f, "WARNING"),
            AlertSeverity::Critical => write!(f, "CRITICAL"),
        }
    }
}

impl AlertSeverity {
    /// 从字符串解析告警级别
    pub fn from_str(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "INFO" => AlertSeverity::Info,
            "WARNING" => AlertSeverity::Warning,
            "CRITICAL" => AlertSeverity::Critical,
            _ => AlertSeverity::Info, // 默认值
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            AlertSeverity::Info => "INFO",
            AlertSeverity::Warning => "WARNING",
            AlertSeverity::Critical => "CRITICAL",
        }
    }
}

// ==========================================
// 告警状态 (Alert Status)
// ==========================================
// 状态流: ACTIVE → ACKNOWLEDGED → RESOLVED / DISMISSED
// 同一 (sku, location, alert_type) 最多一条未关闭告警
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertStatus {
    Active,       // 激活
    Acknowledged, // 已确认
    Resolved,     // 已消除(条件不再成立)
    Dismissed,    // 人工关闭
}

impl fmt::Display for AlertStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertStatus::Active => write!(f, "ACTIVE"),
            AlertStatus::Acknowledged => write!(f, "ACKNOWLEDGED"),
            AlertStatus::Resolved => write!(f, "RESOLVED"),
            AlertStatus::Dismissed => write!(f, "DISMISSED"),
        }
    }
}

impl AlertStatus {
    /// 从字符串解析告警状态
    pub fn from_str(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "ACTIVE" => AlertStatus::Active,
            "ACKNOWLEDGED" => AlertStatus::Acknowledged,
            "RESOLVED" => AlertStatus::Resolved,
            "DISMISSED" => AlertStatus::Dismissed,
            _ => AlertStatus::Active, // 默认值
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            AlertStatus::Active => "ACTIVE",
            AlertStatus::Acknowledged => "ACKNOWLEDGED",
            AlertStatus::Resolved => "RESOLVED",
            AlertStatus::Dismissed => "DISMISSED",
        }
    }

    /// 是否未关闭（参与去重判定）
    pub fn is_open(&self) -> bool {
        matches!(self, AlertStatus::Active | AlertStatus::Acknowledged)
    }

    /// 是否终态
    pub fn is_terminal(&self) -> bool {
        matches!(self, AlertStatus::Resolved | AlertStatus::Dismissed)
    }
}

// ==========================================
// 调拨单状态 (Transfer Status)
// ==========================================
// 状态流: REQUESTED → IN_TRANSIT → RECEIVED
//         REQUESTED / IN_TRANSIT → CANCELLED
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransferStatus {
    Requested, // 已创建待发运
    InTransit, // 在途
    Received,  // 已收货(结算完成)
    Cancelled, // 已取消
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferStatus::Requested => write!(f, "REQUESTED"),
            TransferStatus::InTransit => write!(f, "IN_TRANSIT"),
            TransferStatus::Received => write!(f, "RECEIVED"),
            TransferStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

impl TransferStatus {
    /// 从字符串解析调拨单状态
    pub fn from_str(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "REQUESTED" => TransferStatus::Requested,
            "IN_TRANSIT" => TransferStatus::InTransit,
            "RECEIVED" => TransferStatus::Received,
            "CANCELLED" => TransferStatus::Cancelled,
            _ => TransferStatus::Requested, // 默认值
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            TransferStatus::Requested => "REQUESTED",
            TransferStatus::InTransit => "IN_TRANSIT",
            TransferStatus::Received => "RECEIVED",
            TransferStatus::Cancelled => "CANCELLED",
        }
    }

    /// 是否终态
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferStatus::Received | TransferStatus::Cancelled)
    }

    /// 判断状态迁移是否合法
    pub fn can_transition_to(&self, next: TransferStatus) -> bool {
        matches!(
            (self, next),
            (TransferStatus::Requested, TransferStatus::InTransit)
                | (TransferStatus::Requested, TransferStatus::Cancelled)
                | (TransferStatus::InTransit, TransferStatus::Received)
                | (TransferStatus::InTransit, TransferStatus::Cancelled)
        )
    }
}

// ==========================================
// 再平衡目标 (Rebalance Objective)
// ==========================================
// 目标决定默认策略，二者解耦：目标是业务意图，策略是分配算法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RebalanceObjective {
    MinimizeStockouts, // 降低缺货风险
    BalanceForecast,   // 按销量预测平衡
    PromoPriority,     // 促销/毛利优先
}

impl fmt::Display for RebalanceObjective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RebalanceObjective::MinimizeStockouts => write!(f, "MINIMIZE_STOCKOUTS"),
            RebalanceObjective::BalanceForecast => write!(f, "BALANCE_FORECAST"),
            RebalanceObjective::PromoPriority => write!(f, "PROMO_PRIORITY"),
        }
    }
}

impl RebalanceObjective {
    /// 从字符串解析再平衡目标
    pub fn from_str(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "MINIMIZE_STOCKOUTS" => RebalanceObjective::MinimizeStockouts,
            "BALANCE_FORECAST" => RebalanceObjective::BalanceForecast,
            "PROMO_PRIORITY" => RebalanceObjective::PromoPriority,
            _ => RebalanceObjective::MinimizeStockouts, // 默认值
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            RebalanceObjective::MinimizeStockouts => "MINIMIZE_STOCKOUTS",
            RebalanceObjective::BalanceForecast => "BALANCE_FORECAST",
            RebalanceObjective::PromoPriority => "PROMO_PRIORITY",
        }
    }
}

// ==========================================
// 再平衡运行状态 (Run State)
// ==========================================
// 状态流: SCOPED → PREVIEWED → EXECUTING → COMPLETED / PARTIALLY_COMPLETED / FAILED
// 状态机以值对象形式在步骤间传递，可脱离界面独立测试
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    Scoped,             // 已圈定范围
    Previewed,          // 已预演
    Executing,          // 执行中
    Completed,          // 全部成功
    PartiallyCompleted, // 部分成功
    Failed,             // 全部失败
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Scoped => write!(f, "SCOPED"),
            RunState::Previewed => write!(f, "PREVIEWED"),
            RunState::Executing => write!(f, "EXECUTING"),
            RunState::Completed => write!(f, "COMPLETED"),
            RunState::PartiallyCompleted => write!(f, "PARTIALLY_COMPLETED"),
            RunState::Failed => write!(f, "FAILED"),
        }
    }
}

impl RunState {
    /// 从字符串解析运行状态
    pub fn from_str(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "SCOPED" => RunState::Scoped,
            "PREVIEWED" => RunState::Previewed,
            "EXECUTING" => RunState::Executing,
            "COMPLETED" => RunState::Completed,
            "PARTIALLY_COMPLETED" => RunState::PartiallyCompleted,
            "FAILED" => RunState::Failed,
            _ => RunState::Scoped, // 默认值
        }
    }

    /// 转换为数据库存储的字符串
    pub fn to_db_str(&self) -> &'static str {
        match self {
            RunState::Scoped => "SCOPED",
            RunState::Previewed => "PREVIEWED",
            RunState::Executing => "EXECUTING",
            RunState::Completed => "COMPLETED",
            RunState::PartiallyCompleted => "PARTIALLY_COMPLETED",
            RunState::Failed => "FAILED",
        }
    }

    /// 是否终态
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Completed | RunState::PartiallyCompleted | RunState::Failed
        )
    }

    /// 判断状态迁移是否合法
    pub fn can_transition_to(&self, next: RunState) -> bool {
        matches!(
            (self, next),
            (RunState::Scoped, RunState::Previewed)
                | (RunState::Previewed, RunState::Executing)
                | (RunState::Executing, RunState::Completed)
                | (RunState::Executing, RunState::PartiallyCompleted)
                | (RunState::Executing, RunState::Failed)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alert_status_open_and_terminal() {
        assert!(AlertStatus::Active.is_open());
        assert!(AlertStatus::Acknowledged.is_open());
        assert!(!AlertStatus::Resolved.is_open());
        assert!(AlertStatus::Dismissed.is_terminal());
    }

    #[test]
    fn test_transfer_status_transitions() {
        assert!(TransferStatus::Requested.can_transition_to(TransferStatus::InTransit));
        assert!(TransferStatus::Requested.can_transition_to(TransferStatus::Cancelled));
        assert!(TransferStatus::InTransit.can_transition_to(TransferStatus::Received));
        // 未发运不可直接收货
        assert!(!TransferStatus::Requested.can_transition_to(TransferStatus::Received));
        assert!(!TransferStatus::Received.can_transition_to(TransferStatus::Cancelled));
    }

    #[test]
    fn test_run_state_transitions() {
        assert!(RunState::Scoped.can_transition_to(RunState::Previewed));
        assert!(RunState::Previewed.can_transition_to(RunState::Executing));
        assert!(RunState::Executing.can_transition_to(RunState::PartiallyCompleted));
        // 跳过预演直接执行不允许
        assert!(!RunState::Scoped.can_transition_to(RunState::Executing));
        assert!(RunState::Completed.is_terminal());
    }

    #[test]
    fn test_severity_ordering() {
        assert!(AlertSeverity::Info < AlertSeverity::Warning);
        assert!(AlertSeverity::Warning < AlertSeverity::Critical);
    }

    #[test]
    fn test_db_str_roundtrip() {
        assert_eq!(LocationRole::from_str("CENTRAL_WAREHOUSE").to_db_str(), "CENTRAL_WAREHOUSE");
        assert_eq!(AlertType::from_str("expiry").to_db_str(), "EXPIRY");
        assert_eq!(TransferStatus::from_str("IN_TRANSIT").to_db_str(), "IN_TRANSIT");
        assert_eq!(RunState::from_str("PARTIALLY_COMPLETED").to_db_str(), "PARTIALLY_COMPLETED");
    }
}
