// ==========================================
// 库存调拨与再平衡引擎 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型、值对象
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod action_log;
pub mod alert;
pub mod allocation;
pub mod location;
pub mod rebalance;
pub mod sku;
pub mod transfer;
pub mod types;

// 重导出核心类型
pub use action_log::{ActionLog, ActionType};
pub use alert::{Alert, AlertCandidate, AlertFilter, AlertIdentity};
pub use allocation::{Allocation, AllocationPatch, LocationAllocationView, SkuAllocationView};
pub use location::Location;
pub use rebalance::{
    AutoRebalanceRequest, ExecutionSummary, InvalidRunTransition, PlanLine, RebalanceConstraints,
    RebalancePlan, RebalancePreview, RebalanceRun, ScopeFilter, SkippedSku, SkuExecution,
    SkuFailure, SkuFailureKind, SkuPreview, SkuSelection,
};
pub use sku::Sku;
pub use transfer::{
    DroppedLeg, ManualTransferOutcome, TransferDraft, TransferDraftSet, TransferFilter,
    TransferOrder, TransferRequest,
};
pub use types::{
    AlertSeverity, AlertStatus, AlertType, LocationRole, RebalanceObjective, RunState,
    TransferStatus,
};
