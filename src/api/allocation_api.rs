// ==========================================
// 库存调拨与再平衡引擎 - 分配 API
// ==========================================
// 职责: 分配行查询(聚合视图)与人工维护
// 红线: 人工更新必须带 expected_revision, 所有写入记录 ActionLog
// ==========================================

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult};
use crate::domain::action_log::{ActionLog, ActionType};
use crate::domain::allocation::{Allocation, AllocationPatch, SkuAllocationView};
use crate::domain::location::Location;
use crate::domain::sku::Sku;
use crate::engine::aggregator::SkuAggregator;
use crate::repository::{
    ActionLogRepository, AllocationRepository, LocationRepository, SkuRepository,
};

// ==========================================
// AllocationApi - 分配 API
// ==========================================

/// 分配API
///
/// 职责：
/// 1. 分配行查询（按 SKU 聚合为视图）
/// 2. 分配行人工创建与更新（乐观锁保护）
/// 3. ActionLog记录
pub struct AllocationApi {
    allocation_repo: Arc<AllocationRepository>,
    sku_repo: Arc<SkuRepository>,
    location_repo: Arc<LocationRepository>,
    action_log_repo: Arc<ActionLogRepository>,
}

impl AllocationApi {
    /// 创建新的AllocationApi实例
    pub fn new(
        allocation_repo: Arc<AllocationRepository>,
        sku_repo: Arc<SkuRepository>,
        location_repo: Arc<LocationRepository>,
        action_log_repo: Arc<ActionLogRepository>,
    ) -> Self {
        Self {
            allocation_repo,
            sku_repo,
            location_repo,
            action_log_repo,
        }
    }

    // ==========================================
    // 查询接口
    // ==========================================

    /// 查询全部 SKU 的分配视图 (按行首次出现顺序)
    pub fn list_sku_allocations(&self) -> ApiResult<Vec<SkuAllocationView>> {
        let rows = self.allocation_repo.list_all()?;
        let (sku_index, location_index) = self.load_reference_indexes()?;

        let views = SkuAggregator::aggregate(&rows, &sku_index, &location_index);
        debug!(sku_count = views.len(), row_count = rows.len(), "分配视图聚合完成");
        Ok(views)
    }

    /// 查询单 SKU 的分配视图
    ///
    /// SKU 必须存在; 无分配行时返回空视图 (合计为 0)
    pub fn get_sku_allocations(&self, sku_id: &str) -> ApiResult<SkuAllocationView> {
        if sku_id.trim().is_empty() {
            return Err(ApiError::InvalidInput("SKU ID不能为空".to_string()));
        }
        if self.sku_repo.find_by_id(sku_id)?.is_none() {
            return Err(ApiError::NotFound(format!("Sku(id={})不存在", sku_id)));
        }

        let rows = self.allocation_repo.find_by_sku(sku_id)?;
        let (sku_index, location_index) = self.load_reference_indexes()?;
        Ok(SkuAggregator::aggregate_one(
            sku_id,
            &rows,
            &sku_index,
            &location_index,
        ))
    }

    // ==========================================
    // 维护接口
    // ==========================================

    /// 创建分配行
    ///
    /// # 参数
    /// - allocation: 待创建的分配行 (revision 为初始值)
    /// - operator: 操作人
    ///
    /// # 返回
    /// - Ok(String): 新分配行ID
    pub fn create_allocation(&self, allocation: &Allocation, operator: &str) -> ApiResult<String> {
        // 参数验证
        if operator.trim().is_empty() {
            return Err(ApiError::InvalidInput("操作人不能为空".to_string()));
        }
        if !self.sku_repo.exists(&allocation.sku_id)? {
            return Err(ApiError::InvalidInput(format!(
                "SKU 不存在: {}",
                allocation.sku_id
            )));
        }
        if !self.location_repo.exists(&allocation.location_id)? {
            return Err(ApiError::InvalidInput(format!(
                "库位不存在: {}",
                allocation.location_id
            )));
        }

        let allocation_id = self.allocation_repo.create(allocation)?;

        let log = ActionLog::new(
            Uuid::new_v4().to_string(),
            ActionType::CreateAllocation,
            operator.to_string(),
        )
        .with_sku(&allocation.sku_id)
        .with_payload(&serde_json::json!({
            "allocation_id": allocation_id,
            "location_id": allocation.location_id,
            "on_hand": allocation.on_hand,
            "target": allocation.target,
            "safety_stock": allocation.safety_stock,
        }))
        .with_detail(&format!(
            "创建分配行: {} @ {}",
            allocation.sku_id, allocation.location_id
        ));
        self.action_log_repo.insert(&log)?;

        Ok(allocation_id)
    }

    /// 更新分配行 (乐观锁)
    ///
    /// # 参数
    /// - allocation_id: 分配行ID
    /// - patch: 字段级更新 (未给出的字段不变)
    /// - expected_revision: 期望版本号, 不一致时返回乐观锁冲突
    /// - operator: 操作人
    ///
    /// # 返回
    /// - Ok(Allocation): 更新后的分配行 (revision 已递增)
    pub fn update_allocation(
        &self,
        allocation_id: &str,
        patch: &AllocationPatch,
        expected_revision: i32,
        operator: &str,
    ) -> ApiResult<Allocation> {
        // 参数验证
        if allocation_id.trim().is_empty() {
            return Err(ApiError::InvalidInput("分配行ID不能为空".to_string()));
        }
        if operator.trim().is_empty() {
            return Err(ApiError::InvalidInput("操作人不能为空".to_string()));
        }
        if patch.is_empty() {
            return Err(ApiError::InvalidInput(
                "更新内容为空: 至少给出一个字段".to_string(),
            ));
        }

        let updated = self
            .allocation_repo
            .update(allocation_id, patch, expected_revision, operator)?;

        let log = ActionLog::new(
            Uuid::new_v4().to_string(),
            ActionType::UpdateAllocation,
            operator.to_string(),
        )
        .with_sku(&updated.sku_id)
        .with_payload(&serde_json::json!({
            "allocation_id": allocation_id,
            "expected_revision": expected_revision,
            "patch": patch,
        }))
        .with_detail(&format!(
            "更新分配行: {} (revision {} -> {})",
            allocation_id, expected_revision, updated.revision
        ));
        self.action_log_repo.insert(&log)?;

        Ok(updated)
    }

    // ==========================================
    // 内部辅助
    // ==========================================

    /// 加载 SKU 与库位参照索引
    fn load_reference_indexes(
        &self,
    ) -> ApiResult<(HashMap<String, Sku>, HashMap<String, Location>)> {
        let sku_index: HashMap<String, Sku> = self
            .sku_repo
            .list_all()?
            .into_iter()
            .map(|s| (s.sku_id.clone(), s))
            .collect();
        let location_index: HashMap<String, Location> = self
            .location_repo
            .list_all()?
            .into_iter()
            .map(|l| (l.location_id.clone(), l))
            .collect();
        Ok((sku_index, location_index))
    }
}
