// ==========================================
// 服务排程编排系统 - API 层
// ==========================================
// 职责: 面向调用方（CLI/上层服务）的业务接口
// ==========================================

pub mod error;
pub mod schedule_api;

pub use error::{ApiError, ApiResult};
pub use schedule_api::{parse_date, ScheduleApi, StrategyStatus};
