// ==========================================
// 库存调拨与再平衡引擎 - 库位领域模型
// ==========================================
// 库位是不可变参照数据: 中心仓 / 区域枢纽 / 门店
// ==========================================

use crate::domain::types::LocationRole;
use serde::{Deserialize, Serialize};

// ==========================================
// Location - 库位
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Location {
    pub location_id: String,   // 库位ID
    pub location_name: String, // 库位名称
    pub role: LocationRole,    // 库位角色
}

impl Location {
    pub fn new(location_id: &str, location_name: &str, role: LocationRole) -> Self {
        Self {
            location_id: location_id.to_string(),
            location_name: location_name.to_string(),
            role,
        }
    }
}
