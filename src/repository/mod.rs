// ==========================================
// 服务排程编排系统 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供编排所需的目录、历史、法规与写入接口，屏蔽存储细节
// 约束: 所有 SQL 使用参数化查询
// ==========================================

pub mod collaborators;
pub mod error;
pub mod memory;
pub mod metrics_repo;
pub mod regulatory;
pub mod schedule_repo;

pub use collaborators::{
    ContractDirectory, HistoryStore, InstallationDirectory, MetricsStore, PartnerDirectory,
    RegulatoryRulesProvider, ScheduleStore,
};
pub use error::{RepositoryError, RepositoryResult};
pub use memory::{InMemoryDirectory, InMemoryMetricsStore, InMemoryScheduleStore};
pub use metrics_repo::SqliteMetricsStore;
pub use regulatory::DefaultRegulatoryRules;
pub use schedule_repo::SqliteScheduleStore;
