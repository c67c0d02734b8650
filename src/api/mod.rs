// ==========================================
// 库存调拨与再平衡引擎 - API 层
// ==========================================
// 职责: 提供业务 API 接口, 供外层服务/界面调用
// ==========================================

pub mod alert_api;
pub mod allocation_api;
pub mod error;
pub mod rebalance_api;
pub mod transfer_api;

// 重导出核心类型
pub use alert_api::{AlertApi, AlertGenerationReport};
pub use allocation_api::AllocationApi;
pub use error::{ApiError, ApiResult};
pub use rebalance_api::RebalanceApi;
pub use transfer_api::TransferApi;
