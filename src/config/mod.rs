// ==========================================
// 服务排程编排系统 - 配置层
// ==========================================
// 职责: 编排器与各策略的配置，支持文件 + 环境变量覆写
// ==========================================

pub mod scheduler_config;

pub use scheduler_config::{
    get_default_db_path, ConfigError, ConfigResult, OrchestratorConfig, SchedulerConfig,
};
