// ==========================================
// 库存调拨与再平衡引擎 - 引擎层
// ==========================================
// 职责: 实现分配/预警/再平衡的业务规则, 不拼 SQL
// 红线: Engine 不拼 SQL, 丢弃/跳过/失败必须输出 reason
// ==========================================

pub mod aggregator;
pub mod alerting;
pub mod orchestrator;
pub mod planner;
pub mod signals;
pub mod strategy;
pub mod transfer_gen;

// 重导出核心引擎
pub use aggregator::SkuAggregator;
pub use alerting::AlertEngine;
pub use orchestrator::RebalanceOrchestrator;
pub use planner::{PlanError, RebalancePlanner};
pub use signals::{
    BatchLot, BatchMetadataSource, SignalSnapshot, SignalSource, StaticBatchSource,
    StaticSignalSource,
};
pub use strategy::RebalanceStrategy;
pub use transfer_gen::TransferGenerator;
