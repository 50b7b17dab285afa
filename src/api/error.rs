// ==========================================
// 服务排程编排系统 - API层错误类型
// ==========================================
// 职责: 汇总引擎/仓储/导入错误，转换为调用方可读的错误消息
// ==========================================

use crate::config::ConfigError;
use crate::engine::error::SchedulingError;
use crate::importer::error::ImportError;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 请求错误
    // ==========================================
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("请求校验失败: {0}")]
    ValidationError(String),

    // ==========================================
    // 排程错误
    // ==========================================
    /// 全部策略与兜底均失败
    #[error("{0}")]
    NoFeasibleSchedule(String),

    #[error("排程失败: {0}")]
    SchedulingFailed(String),

    #[error("配置错误: {0}")]
    ConfigurationError(String),

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    #[error("数据导入失败: {0}")]
    ImportError(String),

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
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::DatabaseConnectionError(msg) => ApiError::DatabaseConnectionError(msg),
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseConnectionError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::DatabaseError(format!("唯一约束违反: {}", msg))
            }
            RepositoryError::ForeignKeyViolation(msg) => {
                ApiError::DatabaseError(format!("外键约束违反: {}", msg))
            }
            RepositoryError::SerializationError(msg) => ApiError::InternalError(msg),
            RepositoryError::InternalError(msg) => ApiError::InternalError(msg),
            RepositoryError::Other(err) => ApiError::Other(err),
        }
    }
}

// ==========================================
// 从 SchedulingError 转换
// ==========================================
impl From<SchedulingError> for ApiError {
    fn from(err: SchedulingError) -> Self {
        match err {
            SchedulingError::Validation(msg) => ApiError::ValidationError(msg),
            SchedulingError::NoFeasibleSchedule => {
                ApiError::NoFeasibleSchedule(SchedulingError::NoFeasibleSchedule.to_string())
            }
            SchedulingError::Configuration(msg) => ApiError::ConfigurationError(msg),
            SchedulingError::Scheduling(msg) | SchedulingError::Transport(msg) => {
                ApiError::SchedulingFailed(msg)
            }
            SchedulingError::Repository(err) => err.into(),
            SchedulingError::Internal(msg) => ApiError::InternalError(msg),
        }
    }
}

impl From<ImportError> for ApiError {
    fn from(err: ImportError) -> Self {
        match err {
            ImportError::Repository(err) => err.into(),
            other => ApiError::ImportError(other.to_string()),
        }
    }
}

impl From<ConfigError> for ApiError {
    fn from(err: ConfigError) -> Self {
        ApiError::ConfigurationError(err.to_string())
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheduling_error_mapping() {
        let err: ApiError = SchedulingError::NoFeasibleSchedule.into();
        assert_eq!(err.to_string(), "No feasible schedule found by any algorithm");

        let err: ApiError = SchedulingError::Validation("missing: end_date".to_string()).into();
        assert!(matches!(err, ApiError::ValidationError(_)));

        let err: ApiError = SchedulingError::Repository(RepositoryError::LockError("poisoned".to_string())).into();
        assert!(matches!(err, ApiError::DatabaseConnectionError(_)));
    }

    #[test]
    fn test_import_error_mapping() {
        let err: ApiError = ImportError::FileNotFound("partners.csv".to_string()).into();
        assert!(matches!(err, ApiError::ImportError(msg) if msg.contains("partners.csv")));
    }
}
