// ==========================================
// 库存调拨与再平衡引擎 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 决策支持系统 (分配/预警/再平衡, 人工最终控制权)
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 业务规则
pub mod engine;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 业务接口
pub mod api;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{
    AlertSeverity, AlertStatus, AlertType, LocationRole, RebalanceObjective, RunState,
    TransferStatus,
};

// 领域实体
pub use domain::{
    ActionLog, ActionType, Alert, AlertCandidate, Allocation, AllocationPatch,
    AutoRebalanceRequest, ExecutionSummary, Location, ManualTransferOutcome, RebalancePlan,
    RebalancePreview, RebalanceRun, Sku, SkuAllocationView, TransferOrder, TransferRequest,
};

// 引擎
pub use engine::{
    AlertEngine, RebalanceOrchestrator, RebalancePlanner, RebalanceStrategy, SkuAggregator,
    TransferGenerator,
};

// API
pub use api::{AlertApi, AllocationApi, RebalanceApi, TransferApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "库存调拨与再平衡引擎";

// 数据库版本
pub const DB_VERSION: &str = "v0.1";

// ==========================================
// 预编译检查
// ==========================================

// 确保编译时所有模块可见
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
