// ==========================================
// 库存调拨与再平衡引擎 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod action_log_repo;
pub mod alert_repo;
pub mod allocation_repo;
pub mod error;
pub mod location_repo;
pub mod run_repo;
pub mod sku_repo;
pub mod transfer_repo;

// 重导出核心仓储
pub use action_log_repo::ActionLogRepository;
pub use alert_repo::AlertRepository;
pub use allocation_repo::{AllocationRepository, TargetCommit};
pub use error::{RepositoryError, RepositoryResult};
pub use location_repo::LocationRepository;
pub use run_repo::{RunRecord, RunRepository};
pub use sku_repo::SkuRepository;
pub use transfer_repo::TransferRepository;
