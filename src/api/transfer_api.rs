// ==========================================
// 库存调拨与再平衡引擎 - 调拨 API
// ==========================================
// 职责: 人工调拨单创建、发运/收货/取消结算、调拨补货一站式流程
// 红线: 现货不足按部分满足返回, shortfall 如实上报, 绝不虚增
// 红线: 所有写入记录 ActionLog
// ==========================================

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult};
use crate::domain::action_log::{ActionLog, ActionType};
use crate::domain::transfer::{
    ManualTransferOutcome, TransferFilter, TransferOrder, TransferRequest,
};
use crate::engine::transfer_gen::TransferGenerator;
use crate::repository::{
    ActionLogRepository, AlertRepository, AllocationRepository, LocationRepository, SkuRepository,
    TransferRepository,
};

/// 调拨后关闭告警的同步重试次数
const DISMISS_RETRY_LIMIT: usize = 3;

// ==========================================
// TransferApi - 调拨 API
// ==========================================

/// 调拨API
///
/// 职责：
/// 1. 人工调拨单创建（按源库位现货部分满足）
/// 2. 调拨结算（发运 / 收货 / 取消，幂等）
/// 3. 调拨补货流程（创建调拨 + 关闭来源告警）
/// 4. ActionLog记录
pub struct TransferApi {
    transfer_repo: Arc<TransferRepository>,
    allocation_repo: Arc<AllocationRepository>,
    alert_repo: Arc<AlertRepository>,
    sku_repo: Arc<SkuRepository>,
    location_repo: Arc<LocationRepository>,
    action_log_repo: Arc<ActionLogRepository>,
}

impl TransferApi {
    /// 创建新的TransferApi实例
    pub fn new(
        transfer_repo: Arc<TransferRepository>,
        allocation_repo: Arc<AllocationRepository>,
        alert_repo: Arc<AlertRepository>,
        sku_repo: Arc<SkuRepository>,
        location_repo: Arc<LocationRepository>,
        action_log_repo: Arc<ActionLogRepository>,
    ) -> Self {
        Self {
            transfer_repo,
            allocation_repo,
            alert_repo,
            sku_repo,
            location_repo,
            action_log_repo,
        }
    }

    // ==========================================
    // 创建
    // ==========================================

    /// 创建人工调拨单
    ///
    /// 请求量超出源库位现货时按现货部分满足; 现货为 0 时不创建调拨单,
    /// 缺口通过 `ManualTransferOutcome::shortfall` 上报。
    ///
    /// # 参数
    /// - request: 调拨请求
    /// - operator: 操作人
    pub fn create_transfer_order(
        &self,
        request: &TransferRequest,
        operator: &str,
    ) -> ApiResult<ManualTransferOutcome> {
        // 参数验证
        if operator.trim().is_empty() {
            return Err(ApiError::InvalidInput("操作人不能为空".to_string()));
        }
        if request.quantity <= 0 {
            return Err(ApiError::InvalidInput("调拨量必须大于0".to_string()));
        }
        if request.from_location_id == request.to_location_id {
            return Err(ApiError::InvalidInput(
                "源库位与目的库位不能相同".to_string(),
            ));
        }
        if !self.sku_repo.exists(&request.sku_id)? {
            return Err(ApiError::InvalidInput(format!(
                "SKU 不存在: {}",
                request.sku_id
            )));
        }
        if !self.location_repo.exists(&request.from_location_id)? {
            return Err(ApiError::InvalidInput(format!(
                "库位不存在: {}",
                request.from_location_id
            )));
        }
        if !self.location_repo.exists(&request.to_location_id)? {
            return Err(ApiError::InvalidInput(format!(
                "库位不存在: {}",
                request.to_location_id
            )));
        }

        // 源库位现货决定可满足量 (无分配行视为现货 0)
        let available = self
            .allocation_repo
            .find_by_sku_and_location(&request.sku_id, &request.from_location_id)?
            .map(|a| a.on_hand)
            .unwrap_or(0);
        let fulfilled = TransferGenerator::manual_fulfillable(request.quantity, available);

        if fulfilled == 0 {
            warn!(
                sku_id = %request.sku_id,
                from_location_id = %request.from_location_id,
                requested = request.quantity,
                available,
                "源库位现货不足，未创建调拨单"
            );
            return Ok(ManualTransferOutcome {
                transfer_id: None,
                requested: request.quantity,
                fulfilled: 0,
                shortfall: request.quantity,
            });
        }

        let mut order = TransferOrder::new_requested(
            &Uuid::new_v4().to_string(),
            &request.sku_id,
            &request.from_location_id,
            &request.to_location_id,
            fulfilled,
            operator,
            Utc::now().naive_utc(),
        );
        order.required_by = request.required_by;
        let transfer_id = self.transfer_repo.create(&order)?;

        let outcome = ManualTransferOutcome {
            transfer_id: Some(transfer_id.clone()),
            requested: request.quantity,
            fulfilled,
            shortfall: request.quantity - fulfilled,
        };

        let log = ActionLog::new(
            Uuid::new_v4().to_string(),
            ActionType::CreateTransfer,
            operator.to_string(),
        )
        .with_sku(&request.sku_id)
        .with_payload(&serde_json::json!({
            "transfer_id": transfer_id,
            "from_location_id": request.from_location_id,
            "to_location_id": request.to_location_id,
            "requested": request.quantity,
            "fulfilled": fulfilled,
            "shortfall": outcome.shortfall,
        }))
        .with_detail(&format!(
            "创建调拨单: {} {} -> {} 数量 {}",
            request.sku_id, request.from_location_id, request.to_location_id, fulfilled
        ));
        self.action_log_repo.insert(&log)?;

        Ok(outcome)
    }

    // ==========================================
    // 结算
    // ==========================================

    /// 发运: REQUESTED -> IN_TRANSIT, 目的库位在途量增加
    pub fn dispatch_transfer(&self, transfer_id: &str, operator: &str) -> ApiResult<TransferOrder> {
        Self::validate_settlement_params(transfer_id, operator)?;

        let order = self
            .transfer_repo
            .mark_in_transit(transfer_id, Utc::now().naive_utc())?;

        let log = ActionLog::new(
            Uuid::new_v4().to_string(),
            ActionType::DispatchTransfer,
            operator.to_string(),
        )
        .with_sku(&order.sku_id)
        .with_payload(&serde_json::json!({
            "transfer_id": transfer_id,
            "quantity": order.quantity,
        }))
        .with_detail(&format!("调拨发运: {}", transfer_id));
        self.action_log_repo.insert(&log)?;

        Ok(order)
    }

    /// 收货: IN_TRANSIT -> RECEIVED, 源现货减少、目的在途转现货 (单事务)
    pub fn receive_transfer(&self, transfer_id: &str, operator: &str) -> ApiResult<TransferOrder> {
        Self::validate_settlement_params(transfer_id, operator)?;

        let order = self
            .transfer_repo
            .mark_received(transfer_id, operator, Utc::now().naive_utc())?;

        let log = ActionLog::new(
            Uuid::new_v4().to_string(),
            ActionType::ReceiveTransfer,
            operator.to_string(),
        )
        .with_sku(&order.sku_id)
        .with_payload(&serde_json::json!({
            "transfer_id": transfer_id,
            "quantity": order.quantity,
        }))
        .with_detail(&format!("调拨收货: {}", transfer_id));
        self.action_log_repo.insert(&log)?;

        Ok(order)
    }

    /// 取消: 已收货的不可取消, 在途取消回退目的在途量
    pub fn cancel_transfer(
        &self,
        transfer_id: &str,
        reason: Option<&str>,
        operator: &str,
    ) -> ApiResult<TransferOrder> {
        Self::validate_settlement_params(transfer_id, operator)?;

        let order = self
            .transfer_repo
            .cancel(transfer_id, reason, Utc::now().naive_utc())?;

        let log = ActionLog::new(
            Uuid::new_v4().to_string(),
            ActionType::CancelTransfer,
            operator.to_string(),
        )
        .with_sku(&order.sku_id)
        .with_payload(&serde_json::json!({
            "transfer_id": transfer_id,
            "reason": reason,
        }))
        .with_detail(&format!("调拨取消: {}", transfer_id));
        self.action_log_repo.insert(&log)?;

        Ok(order)
    }

    // ==========================================
    // 调拨补货流程
    // ==========================================

    /// 面向告警的调拨补货: 创建调拨单, 再关闭来源告警
    ///
    /// 两步不做分布式原子性: 调拨单先提交; 告警关闭失败时同步重试
    /// DISMISS_RETRY_LIMIT 次, 仍失败则带告警标识记录错误日志,
    /// 留给下一轮告警生成对账。满足量为 0 时告警保持打开。
    ///
    /// # 参数
    /// - alert_id: 来源告警 (其 sku/库位即补货目的地)
    /// - from_location_id: 源库位
    /// - quantity: 请求量
    /// - operator: 操作人
    pub fn allocate_stock_to_location(
        &self,
        alert_id: &str,
        from_location_id: &str,
        quantity: i64,
        operator: &str,
    ) -> ApiResult<ManualTransferOutcome> {
        if alert_id.trim().is_empty() {
            return Err(ApiError::InvalidInput("告警ID不能为空".to_string()));
        }

        let alert = self
            .alert_repo
            .find_by_id(alert_id)?
            .ok_or_else(|| ApiError::NotFound(format!("Alert(id={})不存在", alert_id)))?;

        let request = TransferRequest {
            sku_id: alert.sku_id.clone(),
            from_location_id: from_location_id.to_string(),
            to_location_id: alert.location_id.clone(),
            quantity,
            required_by: None,
        };
        let outcome = self.create_transfer_order(&request, operator)?;

        if outcome.fulfilled == 0 {
            return Ok(outcome);
        }

        // 调拨已提交, 告警关闭失败不回滚调拨
        let mut dismissed = false;
        for attempt in 1..=DISMISS_RETRY_LIMIT {
            match self
                .alert_repo
                .dismiss(alert_id, operator, Utc::now().naive_utc())
            {
                Ok(_) => {
                    dismissed = true;
                    break;
                }
                Err(e) => {
                    warn!(alert_id, attempt, error = %e, "调拨后关闭告警失败，重试");
                }
            }
        }
        if !dismissed {
            error!(
                alert_id,
                sku_id = %alert.sku_id,
                location_id = %alert.location_id,
                "调拨已提交但告警关闭持续失败，等待下一轮告警生成对账"
            );
        } else {
            debug!(alert_id, "来源告警已关闭");
        }

        Ok(outcome)
    }

    // ==========================================
    // 查询
    // ==========================================

    /// 按过滤条件查询调拨单 (入库顺序)
    pub fn list_transfer_orders(&self, filter: &TransferFilter) -> ApiResult<Vec<TransferOrder>> {
        Ok(self.transfer_repo.list(filter)?)
    }

    /// 查询单条调拨单
    pub fn get_transfer_order(&self, transfer_id: &str) -> ApiResult<TransferOrder> {
        if transfer_id.trim().is_empty() {
            return Err(ApiError::InvalidInput("调拨单ID不能为空".to_string()));
        }
        self.transfer_repo
            .find_by_id(transfer_id)?
            .ok_or_else(|| ApiError::NotFound(format!("TransferOrder(id={})不存在", transfer_id)))
    }

    // ==========================================
    // 内部辅助
    // ==========================================

    fn validate_settlement_params(transfer_id: &str, operator: &str) -> ApiResult<()> {
        if transfer_id.trim().is_empty() {
            return Err(ApiError::InvalidInput("调拨单ID不能为空".to_string()));
        }
        if operator.trim().is_empty() {
            return Err(ApiError::InvalidInput("操作人不能为空".to_string()));
        }
        Ok(())
    }
}
