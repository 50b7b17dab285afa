// ==========================================
// 服务排程编排系统 - 排程策略集合
// ==========================================
// 五种策略均实现 SchedulingStrategy:
// - heuristic      贪心规划（"linear_programming"，带惩罚系数的约束贪心）
// - evolutionary   遗传进化（"genetic_algorithm"）
// - pattern_match  模式匹配（"machine_learning"，规则近似的特征质心匹配）
// - rule_engine    规则引擎（"rule_based"）
// - advisor        外部顾问（"llm_based"，远程文本推理服务）
// ==========================================

pub mod advisor;
pub mod evolutionary;
pub mod heuristic;
pub mod pattern_match;
pub mod rule_engine;

pub use advisor::{AdvisorTransport, ExternalAdvisorStrategy, HttpAdvisorTransport};
pub use evolutionary::EvolutionaryStrategy;
pub use heuristic::HeuristicGreedyStrategy;
pub use pattern_match::PatternMatchStrategy;
pub use rule_engine::RuleEngineStrategy;

use crate::engine::error::{SchedulingError, SchedulingResult};
use crate::engine::scoring::CompositeWeights;
use crate::engine::strategy::StrategyConfig;

/// 读取可选的综合评分权重覆盖（parameters.weights）
pub(crate) fn weights_from_config(config: &StrategyConfig) -> SchedulingResult<Option<CompositeWeights>> {
    match config.param("weights") {
        None => Ok(None),
        Some(value) => serde_json::from_value(value.clone())
            .map(Some)
            .map_err(|e| SchedulingError::Configuration(format!("weights 参数无效: {}", e))),
    }
}
