// ==========================================
// 服务排程编排系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型、只读上下文
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod algorithm;
pub mod context;
pub mod installation;
pub mod partner;
pub mod requirement;
pub mod result;
pub mod schedule;
pub mod types;

// 重导出核心类型
pub use algorithm::{AlgorithmRecord, AlgorithmRunDelta};
pub use context::{months_touched, ScheduleRequest, SchedulingContext, ValidatedRequest};
pub use installation::{Contract, Installation, WorkingHours};
pub use partner::{AvailabilityLedger, Partner, PartnerFilter};
pub use requirement::{RegulatoryRequirement, SchedulingConstraints};
pub use result::{StrategyComparison, StrategyResult, StrategyRun};
pub use schedule::{HistoricalSchedule, Schedule, Visit};
pub use types::{
    FlexibilityLevel, RiskCategory, RunStatus, StrategyKind, VisitFrequency, VisitType,
};
