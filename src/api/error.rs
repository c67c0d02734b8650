// ==========================================
// 库存调拨与再平衡引擎 - API层错误类型
// ==========================================
// 职责: 定义API层错误类型，转换Repository错误为用户友好的错误消息
// 红线: 所有错误信息必须包含显式原因
// ==========================================

use crate::repository::error::RepositoryError;
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 业务规则错误
    // ==========================================
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("业务规则违反: {0}")]
    BusinessRuleViolation(String),

    #[error("无效的状态转换: from={from} to={to}")]
    InvalidStateTransition { from: String, to: String },

    /// 现货不足导致的部分满足 (带可满足量，不算硬失败)
    #[error("库位现货不足: location_id={location_id}, requested={requested}, available={available}")]
    CapacityShortfall {
        location_id: String,
        requested: i64,
        available: i64,
    },

    // ==========================================
    // 并发控制错误
    // ==========================================
    #[error("乐观锁冲突: {0}")]
    OptimisticLockFailure(String),

    #[error("版本冲突: {0}")]
    VersionConflict(String),

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    #[error("数据库事务失败: {0}")]
    DatabaseTransactionError(String),

    #[error("数据验证失败: {0}")]
    ValidationError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ==========================================
// 从 RepositoryError 转换
// 目的: 将Repository层的技术错误转换为用户友好的业务错误
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            // 并发控制错误
            RepositoryError::OptimisticLockFailure {
                allocation_id,
                expected,
                actual,
            } => ApiError::OptimisticLockFailure(format!(
                "分配行{}已被其他操作修改（期望revision={}，实际revision={}）",
                allocation_id, expected, actual
            )),
            RepositoryError::VersionConflict { message } => ApiError::VersionConflict(message),

            // 数据库错误
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::DatabaseConnectionError(msg) => ApiError::DatabaseConnectionError(msg),
            RepositoryError::DatabaseTransactionError(msg) => {
                ApiError::DatabaseTransactionError(msg)
            }
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseConnectionError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("唯一约束违反: {}", msg))
            }
            RepositoryError::ForeignKeyViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("外键约束违反: {}", msg))
            }

            // 业务规则错误
            RepositoryError::BusinessRuleViolation(msg) => ApiError::BusinessRuleViolation(msg),
            RepositoryError::InvalidStateTransition { from, to } => {
                ApiError::InvalidStateTransition { from, to }
            }
            RepositoryError::InsufficientStock {
                location_id,
                requested,
                available,
            } => ApiError::CapacityShortfall {
                location_id,
                requested,
                available,
            },

            // 数据质量错误
            RepositoryError::ValidationError(msg) => ApiError::ValidationError(msg),
            RepositoryError::FieldValueError { field, message } => {
                ApiError::InvalidInput(format!("字段{}错误: {}", field, message))
            }

            // 通用错误
            RepositoryError::InternalError(msg) => ApiError::InternalError(msg),
            RepositoryError::Other(err) => ApiError::Other(err),
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_conversion() {
        let repo_err = RepositoryError::NotFound {
            entity: "Allocation".to_string(),
            id: "A001".to_string(),
        };
        let api_err: ApiError = repo_err.into();
        match api_err {
            ApiError::NotFound(msg) => {
                assert!(msg.contains("Allocation"));
                assert!(msg.contains("A001"));
            }
            _ => panic!("Expected NotFound"),
        }
    }

    #[test]
    fn test_optimistic_lock_conversion() {
        let repo_err = RepositoryError::OptimisticLockFailure {
            allocation_id: "A001".to_string(),
            expected: 1,
            actual: 2,
        };
        let api_err: ApiError = repo_err.into();
        match api_err {
            ApiError::OptimisticLockFailure(msg) => {
                assert!(msg.contains("A001"));
                assert!(msg.contains("已被其他操作修改"));
            }
            _ => panic!("Expected OptimisticLockFailure"),
        }
    }

    #[test]
    fn test_insufficient_stock_maps_to_capacity_shortfall() {
        let repo_err = RepositoryError::InsufficientStock {
            location_id: "L001".to_string(),
            requested: 500,
            available: 300,
        };
        let api_err: ApiError = repo_err.into();
        match api_err {
            ApiError::CapacityShortfall {
                location_id,
                requested,
                available,
            } => {
                assert_eq!(location_id, "L001");
                assert_eq!(requested, 500);
                assert_eq!(available, 300);
            }
            _ => panic!("Expected CapacityShortfall"),
        }
    }

    #[test]
    fn test_field_value_error_maps_to_invalid_input() {
        let repo_err = RepositoryError::FieldValueError {
            field: "quantity".to_string(),
            message: "不能为负数".to_string(),
        };
        let api_err: ApiError = repo_err.into();
        match api_err {
            ApiError::InvalidInput(msg) => {
                assert!(msg.contains("quantity"));
                assert!(msg.contains("不能为负数"));
            }
            _ => panic!("Expected InvalidInput"),
        }
    }
}
