// ==========================================
// 库存调拨与再平衡引擎 - SKU 领域模型
// ==========================================
// SKU 自身不携带总库存: 总量永远由分配行聚合得出
// ==========================================

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

// ==========================================
// Sku - 商品
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sku {
    pub sku_id: String,            // SKU ID
    pub sku_code: String,          // SKU 编码 (业务唯一)
    pub sku_name: String,          // SKU 名称
    pub pack_size: i32,            // 箱规 (最小搬运单位)
    pub category: Option<String>,  // 品类
    pub created_at: NaiveDateTime, // 创建时间
    pub updated_at: NaiveDateTime, // 更新时间
}
