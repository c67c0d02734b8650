// ==========================================
// 库存调拨与再平衡引擎 - 策略配置读取 Trait
// ==========================================
// 职责: 定义告警与再平衡引擎所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use async_trait::async_trait;
use std::error::Error;

// ==========================================
// PolicyConfigReader Trait
// ==========================================
// 用途: 引擎侧的配置读取接口
// 实现者: ConfigManager（从 config_kv 表读取）
#[async_trait]
pub trait PolicyConfigReader: Send + Sync {
    // ===== 低库存告警阈值 =====

    /// 获取低库存预警比例
    ///
    /// # 返回
    /// - f64: 现货/目标 低于该比例时产生 WARNING
    ///
    /// # 默认值
    /// - 0.8
    async fn get_low_stock_warning_ratio(&self) -> Result<f64, Box<dyn Error>>;

    /// 获取低库存严重比例
    ///
    /// # 返回
    /// - f64: 现货/目标 低于该比例时产生 CRITICAL
    ///
    /// # 默认值
    /// - 0.5
    async fn get_low_stock_critical_ratio(&self) -> Result<f64, Box<dyn Error>>;

    // ===== 临期告警窗口 =====

    /// 获取临期预警窗口（天）
    ///
    /// # 返回
    /// - i64: 剩余保质期落入窗口内产生 WARNING
    ///
    /// # 默认值
    /// - 30
    async fn get_expiry_window_days(&self) -> Result<i64, Box<dyn Error>>;

    /// 获取临期严重阈值（天）
    ///
    /// # 返回
    /// - i64: 剩余保质期不超过该天数（含已过期）产生 CRITICAL
    ///
    /// # 默认值
    /// - 7
    async fn get_expiry_critical_days(&self) -> Result<i64, Box<dyn Error>>;

    // ===== 调拨约束默认值 =====

    /// 获取默认最小调拨量
    ///
    /// # 返回
    /// - i64: 低于该量的调拨腿被丢弃并上报
    ///
    /// # 默认值
    /// - 10
    async fn get_default_min_transfer_quantity(&self) -> Result<i64, Box<dyn Error>>;

    /// 获取默认单 SKU 最大调拨腿数
    ///
    /// # 返回
    /// - usize: 超出时小腿并入相近大腿
    ///
    /// # 默认值
    /// - 6
    async fn get_default_max_transfers_per_sku(&self) -> Result<usize, Box<dyn Error>>;

    // ===== 圈定与执行 =====

    /// 获取高优先级 SKU 判定比例
    ///
    /// # 返回
    /// - f64: 任一库位 allocated/max(target,1) 低于该比例的 SKU 视为高优先级
    ///
    /// # 默认值
    /// - 0.8
    async fn get_high_priority_ratio(&self) -> Result<f64, Box<dyn Error>>;

    /// 获取单 SKU 提交冲突的最大重试次数
    ///
    /// # 返回
    /// - u32: 超过后该 SKU 按失败记入汇总
    ///
    /// # 默认值
    /// - 3
    async fn get_max_execute_retries(&self) -> Result<u32, Box<dyn Error>>;

    /// 获取执行阶段的并发工作批大小
    ///
    /// # 返回
    /// - usize: 每批并发处理的 SKU 数
    ///
    /// # 默认值
    /// - 4
    async fn get_execute_worker_count(&self) -> Result<usize, Box<dyn Error>>;
}
