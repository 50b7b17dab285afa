// ==========================================
// 服务排程编排系统 - 引擎层错误类型
// ==========================================
// 工具: thiserror 派生宏
// 传播策略: 策略内部错误在调度边界转为失败运行记录；
//           只有请求校验失败与全部失败（含兜底）才返回调用方
// ==========================================

use crate::repository::error::RepositoryError;
use thiserror::Error;

/// 全部策略与兜底均失败时的提示
pub const NO_FEASIBLE_SCHEDULE: &str = "No feasible schedule found by any algorithm";

/// 引擎层错误类型
#[derive(Error, Debug)]
pub enum SchedulingError {
    /// 策略初始化时参数/凭证缺失（该策略被排除）
    #[error("策略配置错误: {0}")]
    Configuration(String),

    /// 策略完成但没有可行合作方
    #[error("排程失败: {0}")]
    Scheduling(String),

    /// 外部顾问网络/超时失败
    #[error("外部服务调用失败: {0}")]
    Transport(String),

    /// 请求校验失败（编排在调度前中止）
    #[error("请求校验失败: {0}")]
    Validation(String),

    #[error("{}", NO_FEASIBLE_SCHEDULE)]
    NoFeasibleSchedule,

    #[error("仓储错误: {0}")]
    Repository(#[from] RepositoryError),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl SchedulingError {
    /// 外部传输错误重试耗尽后按排程失败处理
    pub fn into_scheduling(self) -> Self {
        match self {
            SchedulingError::Transport(msg) => {
                SchedulingError::Scheduling(format!("外部顾问重试耗尽: {}", msg))
            }
            other => other,
        }
    }
}

/// Result 类型别名
pub type SchedulingResult<T> = Result<T, SchedulingError>;
