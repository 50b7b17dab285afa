// ==========================================
// 服务排程编排系统 - 领域类型定义
// ==========================================
// 职责: 风险等级、访问频率、访问类型、算法类型等枚举
// 序列化格式: snake_case (与存储/配置一致)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ==========================================
// 风险类别 (Risk Category)
// ==========================================
// 决定法定最低服务时长的放大系数
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskCategory {
    Low,      // 低风险
    Medium,   // 中风险
    High,     // 高风险
    VeryHigh, // 极高风险
}

impl RiskCategory {
    /// 分类序号（0..=3），用于特征向量
    pub fn tier(&self) -> u8 {
        match self {
            RiskCategory::Low => 0,
            RiskCategory::Medium => 1,
            RiskCategory::High => 2,
            RiskCategory::VeryHigh => 3,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskCategory::Low => "low",
            RiskCategory::Medium => "medium",
            RiskCategory::High => "high",
            RiskCategory::VeryHigh => "very_high",
        }
    }
}

impl Default for RiskCategory {
    fn default() -> Self {
        RiskCategory::Medium
    }
}

impl fmt::Display for RiskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RiskCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "low" | "bajo" => Ok(RiskCategory::Low),
            "medium" | "medio" => Ok(RiskCategory::Medium),
            "high" | "alto" => Ok(RiskCategory::High),
            "very_high" | "muy_alto" => Ok(RiskCategory::VeryHigh),
            other => Err(format!("未知风险类别: {}", other)),
        }
    }
}

// ==========================================
// 访问频率 (Visit Frequency)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisitFrequency {
    Weekly,  // 每周
    Monthly, // 每月
}

impl VisitFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            VisitFrequency::Weekly => "weekly",
            VisitFrequency::Monthly => "monthly",
        }
    }

    /// 频率编码（特征向量用）
    pub fn code(&self) -> f64 {
        match self {
            VisitFrequency::Weekly => 1.0,
            VisitFrequency::Monthly => 0.0,
        }
    }

    /// 每月最少访问次数
    pub fn min_visits_per_month(&self) -> u32 {
        match self {
            VisitFrequency::Weekly => 4,
            VisitFrequency::Monthly => 1,
        }
    }
}

impl Default for VisitFrequency {
    fn default() -> Self {
        VisitFrequency::Monthly
    }
}

impl fmt::Display for VisitFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for VisitFrequency {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "weekly" | "semanal" => Ok(VisitFrequency::Weekly),
            "monthly" | "mensual" => Ok(VisitFrequency::Monthly),
            other => Err(format!("未知访问频率: {}", other)),
        }
    }
}

// ==========================================
// 访问类型 (Visit Type)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VisitType {
    Initial,  // 首次
    FollowUp, // 跟进
    Final,    // 末次
}

impl VisitType {
    pub fn as_str(&self) -> &'static str {
        match self {
            VisitType::Initial => "initial",
            VisitType::FollowUp => "follow_up",
            VisitType::Final => "final",
        }
    }

    /// 根据序号推导访问类型
    pub fn for_position(index: usize, total: usize) -> Self {
        if index == 0 {
            VisitType::Initial
        } else if index + 1 == total {
            VisitType::Final
        } else {
            VisitType::FollowUp
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "initial" => VisitType::Initial,
            "final" => VisitType::Final,
            _ => VisitType::FollowUp,
        }
    }
}

impl fmt::Display for VisitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 排程灵活度 (Flexibility Level)
// ==========================================
// 规则引擎据此决定是否放宽硬约束
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlexibilityLevel {
    Low,
    Medium,
    High,
}

impl Default for FlexibilityLevel {
    fn default() -> Self {
        FlexibilityLevel::Medium
    }
}

// ==========================================
// 算法类型 (Strategy Kind)
// ==========================================
// 五种可插拔排程策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    LinearProgramming,
    GeneticAlgorithm,
    MachineLearning,
    RuleBased,
    LlmBased,
    /// 确定性兜底（不注册为策略，仅用于结果标识）
    Fallback,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::LinearProgramming => "linear_programming",
            StrategyKind::GeneticAlgorithm => "genetic_algorithm",
            StrategyKind::MachineLearning => "machine_learning",
            StrategyKind::RuleBased => "rule_based",
            StrategyKind::LlmBased => "llm_based",
            StrategyKind::Fallback => "fallback",
        }
    }

    pub fn title_cn(&self) -> &'static str {
        match self {
            StrategyKind::LinearProgramming => "贪心规划",
            StrategyKind::GeneticAlgorithm => "遗传进化",
            StrategyKind::MachineLearning => "模式匹配",
            StrategyKind::RuleBased => "规则引擎",
            StrategyKind::LlmBased => "外部顾问",
            StrategyKind::Fallback => "确定性兜底",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "linear_programming" => Ok(StrategyKind::LinearProgramming),
            "genetic_algorithm" => Ok(StrategyKind::GeneticAlgorithm),
            "machine_learning" => Ok(StrategyKind::MachineLearning),
            "rule_based" => Ok(StrategyKind::RuleBased),
            "llm_based" => Ok(StrategyKind::LlmBased),
            "fallback" => Ok(StrategyKind::Fallback),
            other => Err(format!("未知算法类型: {}", other)),
        }
    }
}

// ==========================================
// 策略运行状态 (Run Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded, // 完成且可行
    Infeasible, // 完成但不可行
    Failed,    // 抛出错误
    TimedOut,  // 超时被放弃
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Succeeded => "succeeded",
            RunStatus::Infeasible => "infeasible",
            RunStatus::Failed => "failed",
            RunStatus::TimedOut => "timed_out",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_kind_round_trip_names() {
        assert_eq!(
            "linear-programming".parse::<StrategyKind>().unwrap(),
            StrategyKind::LinearProgramming
        );
        assert_eq!(StrategyKind::LlmBased.as_str(), "llm_based");
        assert!("simplex".parse::<StrategyKind>().is_err());
    }

    #[test]
    fn test_visit_type_for_position() {
        assert_eq!(VisitType::for_position(0, 3), VisitType::Initial);
        assert_eq!(VisitType::for_position(1, 3), VisitType::FollowUp);
        assert_eq!(VisitType::for_position(2, 3), VisitType::Final);
        assert_eq!(VisitType::for_position(0, 1), VisitType::Initial);
    }

    #[test]
    fn test_risk_category_parse_spanish_alias() {
        assert_eq!("alto".parse::<RiskCategory>().unwrap(), RiskCategory::High);
        assert_eq!(RiskCategory::VeryHigh.tier(), 3);
    }
}
