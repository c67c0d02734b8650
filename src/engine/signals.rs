// ==========================================
// 库存调拨与再平衡引擎 - 外部信号源
// ==========================================
// 职责: 定义策略计算所需的销量/毛利信号与批次效期元数据接口
// 红线: 引擎不直连外部系统，一律经由信号源接口注入
// ==========================================

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::error::Error;

// ==========================================
// SignalSource - 销量/毛利信号源
// ==========================================
// 实现者: 外部预测/结算系统适配层；测试用 StaticSignalSource
#[async_trait]
pub trait SignalSource: Send + Sync {
    /// 读取 (SKU, 库位) 的周销量信号
    ///
    /// # 返回
    /// - Some(f64): 周销量（按销分配策略的权重）
    /// - None: 无信号，该库位权重按 0 计
    async fn weekly_demand(
        &self,
        sku_id: &str,
        location_id: &str,
    ) -> Result<Option<f64>, Box<dyn Error>>;

    /// 读取 (SKU, 库位) 的毛利贡献分
    ///
    /// # 返回
    /// - Some(f64): 毛利分（毛利优先策略的权重）
    /// - None: 无信号，该库位权重按 0 计
    async fn margin_score(
        &self,
        sku_id: &str,
        location_id: &str,
    ) -> Result<Option<f64>, Box<dyn Error>>;
}

// ==========================================
// BatchLot - 批次效期元数据
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchLot {
    pub batch_id: String,       // 批次号
    pub sku_id: String,         // SKU ID
    pub location_id: String,    // 所在库位
    pub quantity: i64,          // 批次数量
    pub expiry_date: NaiveDate, // 到期日
}

impl BatchLot {
    /// 距到期天数（已过期为负）
    pub fn days_to_expiry(&self, today: NaiveDate) -> i64 {
        (self.expiry_date - today).num_days()
    }
}

// ==========================================
// BatchMetadataSource - 批次元数据源
// ==========================================
// 临期告警按批次粒度评估，批次台账由外部系统持有
#[async_trait]
pub trait BatchMetadataSource: Send + Sync {
    /// 读取单 SKU 的全部在库批次
    async fn list_batches(&self, sku_id: &str) -> Result<Vec<BatchLot>, Box<dyn Error>>;
}

// ==========================================
// SignalSnapshot - 单 SKU 的信号快照
// ==========================================
// 计划器一次取齐所关心库位的权重，避免策略循环内逐点请求
#[derive(Debug, Clone, Default)]
pub struct SignalSnapshot {
    pub demand: HashMap<String, f64>, // location_id -> 周销量
    pub margin: HashMap<String, f64>, // location_id -> 毛利分
}

impl SignalSnapshot {
    /// 从信号源取齐指定库位的快照（无信号的库位不入表）
    pub async fn collect(
        source: &dyn SignalSource,
        sku_id: &str,
        location_ids: &[String],
    ) -> Result<SignalSnapshot, Box<dyn Error>> {
        let mut snapshot = SignalSnapshot::default();

        for location_id in location_ids {
            if let Some(v) = source.weekly_demand(sku_id, location_id).await? {
                snapshot.demand.insert(location_id.clone(), v);
            }
            if let Some(v) = source.margin_score(sku_id, location_id).await? {
                snapshot.margin.insert(location_id.clone(), v);
            }
        }

        Ok(snapshot)
    }

    /// 指定库位的周销量权重（缺失按 0）
    pub fn demand_weight(&self, location_id: &str) -> f64 {
        self.demand.get(location_id).copied().unwrap_or(0.0)
    }

    /// 指定库位的毛利权重（缺失按 0）
    pub fn margin_weight(&self, location_id: &str) -> f64 {
        self.margin.get(location_id).copied().unwrap_or(0.0)
    }
}

// ==========================================
// StaticSignalSource - 内存信号源
// ==========================================
// 用于测试与演示数据；键为 (sku_id, location_id)
#[derive(Debug, Default)]
pub struct StaticSignalSource {
    demand: HashMap<(String, String), f64>,
    margin: HashMap<(String, String), f64>,
}

impl StaticSignalSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_demand(mut self, sku_id: &str, location_id: &str, value: f64) -> Self {
        self.demand
            .insert((sku_id.to_string(), location_id.to_string()), value);
        self
    }

    pub fn with_margin(mut self, sku_id: &str, location_id: &str, value: f64) -> Self {
        self.margin
            .insert((sku_id.to_string(), location_id.to_string()), value);
        self
    }
}

#[async_trait]
impl SignalSource for StaticSignalSource {
    async fn weekly_demand(
        &self,
        sku_id: &str,
        location_id: &str,
    ) -> Result<Option<f64>, Box<dyn Error>> {
        Ok(self
            .demand
            .get(&(sku_id.to_string(), location_id.to_string()))
            .copied())
    }

    async fn margin_score(
        &self,
        sku_id: &str,
        location_id: &str,
    ) -> Result<Option<f64>, Box<dyn Error>> {
        Ok(self
            .margin
            .get(&(sku_id.to_string(), location_id.to_string()))
            .copied())
    }
}

// ==========================================
// StaticBatchSource - 内存批次元数据源
// ==========================================
#[derive(Debug, Default)]
pub struct StaticBatchSource {
    batches: HashMap<String, Vec<BatchLot>>,
}

impl StaticBatchSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, lot: BatchLot) {
        self.batches.entry(lot.sku_id.clone()).or_default().push(lot);
    }

    pub fn with_lot(mut self, lot: BatchLot) -> Self {
        self.push(lot);
        self
    }
}

#[async_trait]
impl BatchMetadataSource for StaticBatchSource {
    async fn list_batches(&self, sku_id: &str) -> Result<Vec<BatchLot>, Box<dyn Error>> {
        Ok(self.batches.get(sku_id).cloned().unwrap_or_default())
    }
}
