// ==========================================
// 服务排程编排系统 - 核心库
// ==========================================
// 技术栈: Rust + Tokio + SQLite
// 系统定位: 多策略并发排程，按评分/置信度/可靠度择优，确定性兜底
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 协作方接口与实现
pub mod repository;

// 引擎层 - 评分、策略与编排
pub mod engine;

// 导入层 - CSV 数据目录
pub mod importer;

// 配置层 - 编排与策略配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一/建表）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 业务接口
pub mod api;

// 应用层 - 实例组装
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

pub use domain::{
    Contract, HistoricalSchedule, Installation, Partner, ScheduleRequest, SchedulingContext,
    Schedule, StrategyKind, StrategyResult, Visit,
};

pub use engine::{
    OrchestrationOutcome, PerformanceLedger, SchedulingError, SchedulingOrchestrator,
    SchedulingResult, SchedulingStrategy,
};

pub use api::{ApiError, ApiResult, ScheduleApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "服务排程编排系统";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
