// ==========================================
// 服务排程编排系统 - 引擎层
// ==========================================
// 职责: 评分工具、访问日历、五种排程策略、绩效台账与编排器
// 红线: Engine 不拼 SQL，数据访问只经协作方接口
// ==========================================

pub mod calendar;
pub mod error;
pub mod ledger;
pub mod orchestrator;
pub mod repositories;
pub mod scoring;
pub mod strategies;
pub mod strategy;
pub mod validation;

// 重导出核心引擎
pub use error::{SchedulingError, SchedulingResult, NO_FEASIBLE_SCHEDULE};
pub use ledger::PerformanceLedger;
pub use orchestrator::{OrchestrationOutcome, OrchestratorSettings, RankingWeights, SchedulingOrchestrator};
pub use repositories::SchedulingRepositories;
pub use scoring::{CompositeScore, CompositeWeights, ScoreBreakdown};
pub use strategies::{
    AdvisorTransport, EvolutionaryStrategy, ExternalAdvisorStrategy, HeuristicGreedyStrategy,
    HttpAdvisorTransport, PatternMatchStrategy, RuleEngineStrategy,
};
pub use strategy::{composite_selection, SchedulingStrategy, StrategyConfig};
pub use validation::validate_schedule_request;
